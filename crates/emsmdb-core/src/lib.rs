//! Core types: property tags, typed values, status codes, entry IDs

pub mod entry_id;
pub mod error;
pub mod ids;
pub mod status;
pub mod tag;
pub mod time;
pub mod tracing;
pub mod value;

pub use self::tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
pub use entry_id::{AddressBookEntryIds, EntryIdBuilder};
pub use error::{PropertyError, PropertyResult};
pub use ids::{folder_id, folder_id_string, id_to_string};
pub use status::MapiStatus;
pub use tag::{PropertyTag, PropertyType, tags};
pub use time::FileTime;
pub use value::{NativeValue, PropertyValue, check_compatible};
