use crate::StoreError;
use simdesk_core::{MetaEntry, MetaMap, RecordLine, TypeTag, SYS_NAME_OID};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// One simulated device on disk: an ordered `.snmprec` record file plus an
/// optional JSON metadata sidecar. The file stem is the device's SNMP
/// community string, so renaming the file changes the device's effective
/// community; that contract is kept behind [`DeviceStore::rename_community`]
/// so callers never touch the filesystem identity directly.
///
/// Mutations are in-memory until [`DeviceStore::save`], which rewrites both
/// files wholesale. Record files hold tens of lines, so rewrite-on-write is
/// a deliberate simplicity tradeoff.
///
/// A store instance is meant for a single logical caller; nothing here
/// serializes concurrent access to the same path.
pub struct DeviceStore {
    path: PathBuf,
    records: Vec<RecordLine>,
    meta: MetaMap,
}

impl DeviceStore {
    /// Opens the record file at `path`, merging the sidecar when present.
    ///
    /// A missing record file yields an empty store (the "new, unsaved
    /// device" state); only a missing parent directory is an error.
    /// Malformed record lines and a corrupt sidecar degrade with a warning
    /// instead of failing the load.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let parent = parent_dir(&path);
        if !parent.exists() {
            return Err(StoreError::DirectoryNotFound(parent.to_path_buf()));
        }

        let mut records = Vec::new();
        if path.exists() {
            let contents = fs::read_to_string(&path)?;
            for line in contents.lines() {
                if line.trim().is_empty() {
                    continue;
                }
                match RecordLine::parse(line) {
                    Ok(record) => records.push(record),
                    Err(err) => warn!(path = %path.display(), %err, "skipping record line"),
                }
            }
        }

        let sidecar = sidecar_path(&path);
        let mut meta: MetaMap = MetaMap::new();
        if sidecar.exists() {
            match fs::read_to_string(&sidecar)
                .map_err(StoreError::from)
                .and_then(|text| serde_json::from_str::<MetaMap>(&text).map_err(StoreError::from))
            {
                Ok(parsed) => meta = parsed,
                Err(err) => {
                    warn!(path = %sidecar.display(), %err, "ignoring unreadable sidecar")
                }
            }
        }
        // Metadata is an overlay on the record set; entries for OIDs the
        // record file no longer has are dropped on the next save anyway.
        meta.retain(|oid, _| records.iter().any(|record| &record.oid == oid));

        Ok(Self {
            path,
            records,
            meta,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn sidecar_path(&self) -> PathBuf {
        sidecar_path(&self.path)
    }

    /// The device's community string, i.e. the record file's stem.
    pub fn community(&self) -> &str {
        self.path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or_default()
    }

    pub fn records(&self) -> &[RecordLine] {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Metadata for an OID; absent entries read as the defaults (empty
    /// label, text entry).
    pub fn meta_for(&self, oid: &str) -> MetaEntry {
        self.meta.get(oid).cloned().unwrap_or_default()
    }

    /// Value of the sysName record, when the device has one. Callers are
    /// expected to offer creating it rather than assume a default name.
    pub fn sys_name(&self) -> Option<&str> {
        self.records
            .iter()
            .find(|record| record.is_sys_name())
            .map(|record| record.value.as_str())
    }

    /// Inserts or updates the sysName record; new entries go to the front
    /// of the record set and get a "System Name" label.
    pub fn set_sys_name(&mut self, value: impl Into<String>) -> Result<(), StoreError> {
        let value = value.into();
        if let Some(record) = self.records.iter_mut().find(|record| record.is_sys_name()) {
            record.set_value(value)?;
        } else {
            let record = RecordLine::new(SYS_NAME_OID, TypeTag::OctetString, value)?;
            self.records.insert(0, record);
            self.meta.insert(
                SYS_NAME_OID.to_string(),
                MetaEntry::new("System Name", Default::default()),
            );
        }
        Ok(())
    }

    pub fn add(
        &mut self,
        oid: impl Into<String>,
        tag: TypeTag,
        value: impl Into<String>,
    ) -> Result<(), StoreError> {
        let oid = oid.into();
        if self.records.iter().any(|record| record.oid == oid) {
            return Err(StoreError::DuplicateOid(oid));
        }
        self.records.push(RecordLine::new(oid, tag, value)?);
        Ok(())
    }

    pub fn update_value(&mut self, oid: &str, value: impl Into<String>) -> Result<(), StoreError> {
        let record = self
            .records
            .iter_mut()
            .find(|record| record.oid == oid)
            .ok_or_else(|| StoreError::OidNotFound(oid.to_string()))?;
        record.set_value(value)?;
        Ok(())
    }

    pub fn update_meta(&mut self, oid: &str, entry: MetaEntry) -> Result<(), StoreError> {
        if !self.records.iter().any(|record| record.oid == oid) {
            return Err(StoreError::OidNotFound(oid.to_string()));
        }
        self.meta.insert(oid.to_string(), entry);
        Ok(())
    }

    pub fn remove(&mut self, oid: &str) -> Result<(), StoreError> {
        let index = self
            .records
            .iter()
            .position(|record| record.oid == oid)
            .ok_or_else(|| StoreError::OidNotFound(oid.to_string()))?;
        self.records.remove(index);
        self.meta.remove(oid);
        Ok(())
    }

    /// Serialized record-file text for the current in-memory state.
    pub fn serialized_records(&self) -> String {
        let mut text = String::new();
        for record in &self.records {
            text.push_str(&record.to_line());
            text.push('\n');
        }
        text
    }

    /// Metadata restricted to entries worth persisting: anything with a
    /// label or a non-default control hint.
    pub fn minimized_meta(&self) -> MetaMap {
        self.meta
            .iter()
            .filter(|(_, entry)| !entry.is_default())
            .map(|(oid, entry)| (oid.clone(), entry.clone()))
            .collect()
    }

    /// Rewrites the record file, then the sidecar. A sidecar failure after
    /// the record file is already on disk is surfaced as
    /// [`StoreError::SidecarWrite`] without rolling the record file back;
    /// both files are regenerated together on the next save.
    pub fn save(&self) -> Result<(), StoreError> {
        fs::write(&self.path, self.serialized_records())?;
        let sidecar = serde_json::to_string_pretty(&self.minimized_meta())?;
        fs::write(self.sidecar_path(), sidecar).map_err(StoreError::SidecarWrite)?;
        debug!(path = %self.path.display(), records = self.records.len(), "saved device");
        Ok(())
    }

    /// Renames the record file (and its sidecar, when present) so the
    /// device answers to a new community string. Returns the new record
    /// path. If the sidecar rename fails after the record file has moved,
    /// the store is already re-addressed at the new path and the on-disk
    /// metadata is considered lost; the error reports that.
    pub fn rename_community(&mut self, new_community: &str) -> Result<PathBuf, StoreError> {
        let new_path = sibling_record_path(&self.path, new_community);
        if new_path.exists() && new_path != self.path {
            return Err(StoreError::AlreadyExists(new_path));
        }

        let old_sidecar = self.sidecar_path();
        fs::rename(&self.path, &new_path)?;
        self.path = new_path.clone();

        if old_sidecar.exists() {
            if let Err(err) = fs::rename(&old_sidecar, sidecar_path(&new_path)) {
                return Err(StoreError::SidecarRename(err));
            }
        }
        Ok(new_path)
    }

    /// Copies the record file's bytes to a sibling file. The sidecar is
    /// deliberately not copied: a duplicate starts with default UI hints.
    pub fn duplicate(&self, new_community: &str) -> Result<PathBuf, StoreError> {
        let new_path = sibling_record_path(&self.path, new_community);
        if new_path.exists() {
            return Err(StoreError::AlreadyExists(new_path));
        }
        fs::copy(&self.path, &new_path)?;
        Ok(new_path)
    }

    /// Removes the record file and the sidecar. An already-missing record
    /// file counts as deleted.
    pub fn delete(self) -> Result<(), StoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        let sidecar = self.sidecar_path();
        if sidecar.exists() {
            fs::remove_file(&sidecar)?;
        }
        Ok(())
    }
}

/// Sorted `.snmprec` files in a data directory.
pub fn list_devices(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>, StoreError> {
    let dir = dir.as_ref();
    if !dir.exists() {
        return Err(StoreError::DirectoryNotFound(dir.to_path_buf()));
    }
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|ext| ext.to_str()) == Some(simdesk_core::RECORD_EXTENSION) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// Sidecar lives next to the record file as `<file name>.meta.json`.
pub fn sidecar_path(record_path: &Path) -> PathBuf {
    let file_name = record_path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default();
    record_path.with_file_name(format!("{file_name}.meta.json"))
}

/// Record path for `community` in the same directory as `path`, the fixed
/// extension appended when missing.
pub fn sibling_record_path(path: &Path, community: &str) -> PathBuf {
    path.with_file_name(record_file_name(community))
}

pub fn record_file_name(community: &str) -> String {
    let suffix = format!(".{}", simdesk_core::RECORD_EXTENSION);
    if community.ends_with(&suffix) {
        community.to_string()
    } else {
        format!("{community}{suffix}")
    }
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}
