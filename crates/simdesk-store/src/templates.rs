use crate::device::{record_file_name, sidecar_path, DeviceStore};
use crate::StoreError;
use serde::{Deserialize, Deserializer, Serialize};
use simdesk_core::MetaMap;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Name of the always-available blank template. It never hits the registry
/// file; removing it is not allowed.
pub const BUILTIN_TEMPLATE_NAME: &str = "Empty Device";

/// A reusable device: raw record-file text plus the UI metadata to seed the
/// sidecar with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Template {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub meta: MetaMap,
}

// Older registry files stored a template as a bare content string.
impl<'de> Deserialize<'de> for Template {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Shape {
            Full {
                #[serde(default)]
                content: String,
                #[serde(default)]
                meta: MetaMap,
            },
            Legacy(String),
        }

        Ok(match Shape::deserialize(deserializer)? {
            Shape::Full { content, meta } => Template { content, meta },
            Shape::Legacy(content) => Template {
                content,
                meta: MetaMap::new(),
            },
        })
    }
}

/// Registry of named templates, persisted as one JSON document mapping
/// template name to `{content, meta}`.
pub struct TemplateRegistry {
    path: PathBuf,
    templates: BTreeMap<String, Template>,
}

impl TemplateRegistry {
    /// Loads the registry file. A missing or corrupt file degrades to the
    /// built-in-only set rather than failing the application.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let templates = match fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(parsed) => parsed,
                Err(err) => {
                    warn!(path = %path.display(), %err, "ignoring unreadable template registry");
                    BTreeMap::new()
                }
            },
            Err(_) => BTreeMap::new(),
        };
        Self { path, templates }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Template names, the built-in first.
    pub fn names(&self) -> Vec<String> {
        let mut names = vec![BUILTIN_TEMPLATE_NAME.to_string()];
        names.extend(
            self.templates
                .keys()
                .filter(|name| name.as_str() != BUILTIN_TEMPLATE_NAME)
                .cloned(),
        );
        names
    }

    pub fn get(&self, name: &str) -> Option<Template> {
        if let Some(template) = self.templates.get(name) {
            return Some(template.clone());
        }
        (name == BUILTIN_TEMPLATE_NAME).then(Template::default)
    }

    /// Writes a new device from `template_name` into `dir`: record content
    /// verbatim, metadata as the sidecar (always written, `{}` when empty).
    /// Returns the opened store.
    pub fn instantiate(
        &self,
        template_name: &str,
        device_name: &str,
        dir: impl AsRef<Path>,
    ) -> Result<DeviceStore, StoreError> {
        let template = self
            .get(template_name)
            .ok_or_else(|| StoreError::TemplateNotFound(template_name.to_string()))?;
        let dir = dir.as_ref();
        if !dir.exists() {
            return Err(StoreError::DirectoryNotFound(dir.to_path_buf()));
        }

        let record_path = dir.join(record_file_name(device_name));
        if record_path.exists() {
            return Err(StoreError::AlreadyExists(record_path));
        }

        fs::write(&record_path, &template.content)?;
        let sidecar = serde_json::to_string_pretty(&template.meta)?;
        fs::write(sidecar_path(&record_path), sidecar).map_err(StoreError::SidecarWrite)?;

        DeviceStore::open(record_path)
    }

    /// Captures the store's current serialized content and its non-default
    /// metadata under `name`, overwriting any same-name template, and
    /// persists the registry.
    pub fn save_as_template(&mut self, name: &str, store: &DeviceStore) -> Result<(), StoreError> {
        let template = Template {
            content: store.serialized_records(),
            meta: store.minimized_meta(),
        };
        self.templates.insert(name.to_string(), template);
        self.persist()
    }

    pub fn remove_template(&mut self, name: &str) -> Result<(), StoreError> {
        if name == BUILTIN_TEMPLATE_NAME {
            return Err(StoreError::BuiltinTemplate);
        }
        if self.templates.remove(name).is_none() {
            return Err(StoreError::TemplateNotFound(name.to_string()));
        }
        self.persist()
    }

    fn persist(&self) -> Result<(), StoreError> {
        let text = serde_json::to_string_pretty(&self.templates)?;
        fs::write(&self.path, text)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simdesk_core::{TypeTag, UiHint};
    use tempfile::tempdir;

    #[test]
    fn missing_registry_degrades_to_builtin_only() {
        let dir = tempdir().unwrap();
        let registry = TemplateRegistry::open(dir.path().join("templates.json"));
        assert_eq!(registry.names(), vec![BUILTIN_TEMPLATE_NAME.to_string()]);
        assert_eq!(registry.get(BUILTIN_TEMPLATE_NAME), Some(Template::default()));
    }

    #[test]
    fn corrupt_registry_degrades_to_builtin_only() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("templates.json");
        fs::write(&path, "{ definitely not json").unwrap();
        let registry = TemplateRegistry::open(&path);
        assert_eq!(registry.names(), vec![BUILTIN_TEMPLATE_NAME.to_string()]);
    }

    #[test]
    fn legacy_bare_string_values_still_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("templates.json");
        fs::write(&path, r#"{"Old Switch": "1.2.3|2|1\n"}"#).unwrap();
        let registry = TemplateRegistry::open(&path);
        let template = registry.get("Old Switch").expect("legacy template");
        assert_eq!(template.content, "1.2.3|2|1\n");
        assert!(template.meta.is_empty());
    }

    #[test]
    fn blank_template_instantiation_scenario() {
        let dir = tempdir().unwrap();
        let registry = TemplateRegistry::open(dir.path().join("templates.json"));
        let store = registry
            .instantiate(BUILTIN_TEMPLATE_NAME, "router", dir.path())
            .unwrap();

        let record_path = dir.path().join("router.snmprec");
        assert!(record_path.exists());
        assert_eq!(fs::read_to_string(&record_path).unwrap(), "");
        assert_eq!(
            fs::read_to_string(sidecar_path(&record_path)).unwrap(),
            "{}"
        );
        assert!(store.is_empty());
        assert_eq!(store.community(), "router");
    }

    #[test]
    fn instantiate_refuses_existing_device() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("router.snmprec"), "").unwrap();
        let registry = TemplateRegistry::open(dir.path().join("templates.json"));
        let result = registry.instantiate(BUILTIN_TEMPLATE_NAME, "router", dir.path());
        assert!(matches!(result, Err(StoreError::AlreadyExists(_))));
    }

    #[test]
    fn instantiate_writes_content_and_metadata_verbatim() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("templates.json");
        fs::write(
            &path,
            r#"{"Rack Fan": {"content": "1.2.3|66|40\n", "meta": {"1.2.3": {"name": "Fan", "ui_type": "Slider"}}}}"#,
        )
        .unwrap();
        let registry = TemplateRegistry::open(&path);
        let store = registry.instantiate("Rack Fan", "fan-1", dir.path()).unwrap();

        assert_eq!(store.records().len(), 1);
        assert_eq!(store.meta_for("1.2.3").ui_hint, UiHint::Slider);
    }

    #[test]
    fn save_as_template_round_trips_through_the_registry_file() {
        let dir = tempdir().unwrap();
        let registry_path = dir.path().join("templates.json");

        let mut store = DeviceStore::open(dir.path().join("dev.snmprec")).unwrap();
        store.add("1.2.3", TypeTag::Gauge32, "40").unwrap();
        store
            .update_meta(
                "1.2.3",
                simdesk_core::MetaEntry::new("Fan", UiHint::Slider),
            )
            .unwrap();
        store.add("1.2.4", TypeTag::Integer, "1").unwrap();

        let mut registry = TemplateRegistry::open(&registry_path);
        registry.save_as_template("Fan Unit", &store).unwrap();

        let reloaded = TemplateRegistry::open(&registry_path);
        let template = reloaded.get("Fan Unit").expect("saved template");
        assert_eq!(template.content, "1.2.3|66|40\n1.2.4|2|1\n");
        // Only the non-default metadata is captured.
        assert_eq!(template.meta.len(), 1);
        assert!(template.meta.contains_key("1.2.3"));
    }

    #[test]
    fn remove_template_guards_the_builtin() {
        let dir = tempdir().unwrap();
        let mut registry = TemplateRegistry::open(dir.path().join("templates.json"));
        assert!(matches!(
            registry.remove_template(BUILTIN_TEMPLATE_NAME),
            Err(StoreError::BuiltinTemplate)
        ));
        assert!(matches!(
            registry.remove_template("ghost"),
            Err(StoreError::TemplateNotFound(_))
        ));
    }
}
