//! Provider side of the emsmdb interface.
//!
//! This crate holds the per-session state behind Rop processing:
//! - property stores attached to mailbox, folder and message objects
//! - the handle table mapping session handles to live objects
//! - the Rop dispatcher that builds GetPropertiesSpecific replies
//! - an in-memory [`MessageStore`] backend
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use emsmdb_core::{AddressBookEntryIds, tags};
//! use emsmdb_protocol::{GetPropertiesRequest, RopRequest};
//! use emsmdb_server::{
//!     MailboxIdentity, MemoryStore, ObjectKind, ObjectRef, RopDispatcher, ServerConfig, Session,
//! };
//!
//! let store = MemoryStore::new().with_object(ObjectRef::new(ObjectKind::Mailbox, 1), vec![]);
//! let mut session = Session::new(
//!     Arc::new(store),
//!     Arc::new(AddressBookEntryIds),
//!     ServerConfig::default(),
//! )
//! .unwrap();
//! let mailbox = session
//!     .open_mailbox(MailboxIdentity::owned_by(1, "Jane Doe", "/o=Org/cn=jane"))
//!     .unwrap();
//!
//! let request = RopRequest::get_properties(
//!     0,
//!     0,
//!     GetPropertiesRequest::new(vec![tags::PR_MAILBOX_OWNER_NAME]),
//! );
//! let dispatched = RopDispatcher::new()
//!     .dispatch(Some(&mut session), &request, &[mailbox])
//!     .unwrap();
//! assert!(dispatched.reply.unwrap().is_success());
//! ```

mod config;
mod dispatcher;
mod error;
mod handles;
mod memory;
mod object;
mod session;
mod store;

pub use config::{LoggingSettings, ServerConfig};
pub use dispatcher::{DispatchStage, Dispatched, RopDispatcher};
pub use error::{ServerError, ServerResult, StoreError, StoreResult};
pub use handles::{Handle, HandleEntry, HandleTable, INVALID_HANDLE};
pub use memory::MemoryStore;
pub use object::{
    BodyFormat, FolderObject, MailboxObject, MessageObject, ObjectArena, ObjectKind, OpenMode,
    ServerObject,
};
pub use session::{MailboxIdentity, Session, SharedSession, new_shared_session};
pub use store::{MessageStore, ObjectRef, PropertyStore, SetOutcome, pairs_from_args};
