//! Entry ID construction for directory principals.

use tracing::trace;

/// Address-book provider UID (MUIDEMSAB).
pub const ADDRESS_BOOK_PROVIDER_UID: [u8; 16] = [
    0xDC, 0xA7, 0x40, 0xC8, 0xC0, 0x42, 0x10, 0x1A, 0xB4, 0xB9, 0x08, 0x00, 0x2B, 0x2F, 0xE1, 0x82,
];

/// Entry ID version written by [`AddressBookEntryIds`].
pub const ENTRY_ID_VERSION: u32 = 0x0000_0001;

/// Display type for a mail user.
pub const DT_MAILUSER: u32 = 0x0000_0000;

/// Builds opaque, addressable identifier blobs for directory principals.
pub trait EntryIdBuilder: Send + Sync {
    /// Synthesizes the entry ID for a distinguished name.
    fn build_entry_id(&self, directory_name: &str) -> Vec<u8>;
}

/// Builds permanent address-book entry IDs.
///
/// ```text
/// +-----------+--------------------+-------------+----------+-------------+
/// | flags (4) | provider UID (16)  | version (4) | type (4) | DN + NUL    |
/// +-----------+--------------------+-------------+----------+-------------+
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct AddressBookEntryIds;

impl EntryIdBuilder for AddressBookEntryIds {
    fn build_entry_id(&self, directory_name: &str) -> Vec<u8> {
        let mut blob = Vec::with_capacity(28 + directory_name.len() + 1);
        blob.extend_from_slice(&[0u8; 4]);
        blob.extend_from_slice(&ADDRESS_BOOK_PROVIDER_UID);
        blob.extend_from_slice(&ENTRY_ID_VERSION.to_le_bytes());
        blob.extend_from_slice(&DT_MAILUSER.to_le_bytes());
        blob.extend_from_slice(directory_name.as_bytes());
        blob.push(0);
        trace!(dn = %directory_name, len = blob.len(), "Built address book entry ID");
        blob
    }
}
