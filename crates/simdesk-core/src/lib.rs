pub mod endpoint;
pub mod meta;
pub mod record;

pub use endpoint::{Endpoint, EndpointError};
pub use meta::{MetaEntry, MetaMap, UiHint};
pub use record::{CodecError, RecordLine, TypeTag, RECORD_EXTENSION, SYS_NAME_OID};
