use crate::record::TypeTag;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Sidecar document: OID -> UI metadata. BTreeMap keeps the serialized
/// order stable across saves.
pub type MetaMap = BTreeMap<String, MetaEntry>;

/// How the UI should render a record's value. Stored in the sidecar as a
/// display string; values live only in the record file, never here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UiHint {
    #[default]
    TextEntry,
    Slider,
    Toggle,
}

impl UiHint {
    pub fn as_str(&self) -> &'static str {
        match self {
            UiHint::TextEntry => "Text Entry",
            UiHint::Slider => "Slider",
            UiHint::Toggle => "Toggle",
        }
    }

    /// Whether this hint makes sense for a record of the given type. A
    /// slider needs a numeric value; a toggle needs an integer.
    pub fn applies_to(&self, tag: &TypeTag) -> bool {
        match self {
            UiHint::TextEntry => true,
            UiHint::Slider => tag.is_numeric(),
            UiHint::Toggle => *tag == TypeTag::Integer,
        }
    }
}

impl fmt::Display for UiHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UiHint {
    type Err = ();

    // Tolerant: sidecars written by hand or by older builds may carry an
    // empty or unknown string; those render as a plain text entry.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(match value {
            "Slider" => UiHint::Slider,
            "Toggle" => UiHint::Toggle,
            _ => UiHint::TextEntry,
        })
    }
}

impl Serialize for UiHint {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for UiHint {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Ok(value.parse().unwrap_or_default())
    }
}

/// UI-facing metadata for one OID: a friendly label and a control hint.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MetaEntry {
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "ui_type")]
    pub ui_hint: UiHint,
}

impl MetaEntry {
    pub fn new(name: impl Into<String>, ui_hint: UiHint) -> Self {
        Self {
            name: name.into(),
            ui_hint,
        }
    }

    /// Entries with no label and the default hint carry no information and
    /// are omitted from the sidecar on save.
    pub fn is_default(&self) -> bool {
        self.name.is_empty() && self.ui_hint == UiHint::TextEntry
    }
}
