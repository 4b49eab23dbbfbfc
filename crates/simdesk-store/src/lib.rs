pub mod device;
pub mod profiles;
pub mod templates;

pub use device::DeviceStore;
pub use profiles::{Profile, ProfileStore};
pub use templates::{Template, TemplateRegistry, BUILTIN_TEMPLATE_NAME};

use simdesk_core::CodecError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("directory does not exist: {0}")]
    DirectoryNotFound(PathBuf),
    #[error("OID not present in this device: {0}")]
    OidNotFound(String),
    #[error("OID already present in this device: {0}")]
    DuplicateOid(String),
    #[error("destination already exists: {0}")]
    AlreadyExists(PathBuf),
    #[error("unknown template: {0}")]
    TemplateNotFound(String),
    #[error("the built-in template cannot be removed")]
    BuiltinTemplate,
    #[error("unknown profile: {0}")]
    ProfileNotFound(String),
    #[error("record file saved, but the sidecar write failed: {0}")]
    SidecarWrite(#[source] std::io::Error),
    #[error("record file renamed, but the sidecar rename failed: {0}")]
    SidecarRename(#[source] std::io::Error),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
