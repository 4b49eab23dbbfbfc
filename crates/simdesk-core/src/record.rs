use regex::Regex;
use std::fmt;
use thiserror::Error;

/// OID of the sysName scalar. Records under this OID carry the device's
/// display name; callers treat it specially instead of assuming a default.
pub const SYS_NAME_OID: &str = "1.3.6.1.2.1.1.5.0";

/// File extension of a device record file. The file stem doubles as the
/// device's SNMP community string.
pub const RECORD_EXTENSION: &str = "snmprec";

const DELIMITER: char = '|';

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed record line (expected oid|tag|value): {0:?}")]
    Malformed(String),
    #[error("record value may not contain '|': {0:?}")]
    DelimiterInValue(String),
}

/// Numeric type tag of a snmprec record. Tags this tool does not know are
/// carried verbatim so files written by other tools survive a load/save
/// cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeTag {
    Integer,
    OctetString,
    IpAddress,
    Counter32,
    Gauge32,
    TimeTicks,
    Other(String),
}

impl TypeTag {
    pub fn code(&self) -> &str {
        match self {
            TypeTag::Integer => "2",
            TypeTag::OctetString => "4",
            TypeTag::IpAddress => "64",
            TypeTag::Counter32 => "65",
            TypeTag::Gauge32 => "66",
            TypeTag::TimeTicks => "67",
            TypeTag::Other(code) => code,
        }
    }

    /// Human-readable label; unknown tags fall back to their raw code.
    pub fn label(&self) -> &str {
        match self {
            TypeTag::Integer => "Integer",
            TypeTag::OctetString => "String (Octet)",
            TypeTag::IpAddress => "IP Address",
            TypeTag::Counter32 => "Counter32",
            TypeTag::Gauge32 => "Gauge32",
            TypeTag::TimeTicks => "TimeTicks",
            TypeTag::Other(code) => code,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            TypeTag::Integer | TypeTag::Counter32 | TypeTag::Gauge32 | TypeTag::TimeTicks
        )
    }
}

impl From<&str> for TypeTag {
    fn from(code: &str) -> Self {
        match code {
            "2" => TypeTag::Integer,
            "4" => TypeTag::OctetString,
            "64" => TypeTag::IpAddress,
            "65" => TypeTag::Counter32,
            "66" => TypeTag::Gauge32,
            "67" => TypeTag::TimeTicks,
            other => TypeTag::Other(other.to_string()),
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// One device attribute record: `oid|tag|value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordLine {
    pub oid: String,
    pub tag: TypeTag,
    pub value: String,
}

impl RecordLine {
    /// Builds a record, rejecting values that would break the line format.
    pub fn new(
        oid: impl Into<String>,
        tag: TypeTag,
        value: impl Into<String>,
    ) -> Result<Self, CodecError> {
        let value = value.into();
        if value.contains(DELIMITER) {
            return Err(CodecError::DelimiterInValue(value));
        }
        Ok(Self {
            oid: oid.into(),
            tag,
            value,
        })
    }

    /// Parses one line of a record file. A line is well-formed iff it has at
    /// least three `|`-delimited fields; fields beyond the third are
    /// ignored. Callers skip malformed lines rather than aborting the load.
    pub fn parse(line: &str) -> Result<Self, CodecError> {
        let line = line.trim();
        let mut fields = line.split(DELIMITER);
        match (fields.next(), fields.next(), fields.next()) {
            (Some(oid), Some(tag), Some(value)) if !oid.is_empty() => Ok(Self {
                oid: oid.to_string(),
                tag: TypeTag::from(tag),
                value: value.to_string(),
            }),
            _ => Err(CodecError::Malformed(line.to_string())),
        }
    }

    pub fn to_line(&self) -> String {
        format!("{}{}{}{}{}", self.oid, DELIMITER, self.tag, DELIMITER, self.value)
    }

    pub fn set_value(&mut self, value: impl Into<String>) -> Result<(), CodecError> {
        let value = value.into();
        if value.contains(DELIMITER) {
            return Err(CodecError::DelimiterInValue(value));
        }
        self.value = value;
        Ok(())
    }

    pub fn is_sys_name(&self) -> bool {
        self.oid == SYS_NAME_OID
    }
}

impl fmt::Display for RecordLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_line())
    }
}

/// Syntactic OID check: dot-separated non-empty numeric arcs.
pub fn is_valid_oid(oid: &str) -> bool {
    let pattern = Regex::new(r"^[0-9]+(\.[0-9]+)*$").expect("valid regex");
    pattern.is_match(oid)
}
