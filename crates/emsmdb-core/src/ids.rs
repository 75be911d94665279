//! Object identifier helpers.
//!
//! Folder and message identifiers are 64-bit values built from a store-wide
//! global counter and the replica the object belongs to.

/// Renders a 64-bit identifier the way it is shown to application code.
pub fn id_to_string(id: u64) -> String {
    format!("0x{:016x}", id)
}

/// Builds a folder identifier: global count in the high 48 bits, replica ID
/// in the low 16 bits.
pub fn folder_id(global_count: u64, replica_id: u16) -> u64 {
    ((global_count & 0xFFFF_FFFF_FFFF) << 16) | replica_id as u64
}

/// Renders a folder identifier as stored in the directory (`0x%.12x%.4x`).
pub fn folder_id_string(global_count: u64, replica_id: u16) -> String {
    let global_count = global_count & 0xFFFF_FFFF_FFFF;
    format!("0x{:012x}{:04x}", global_count, replica_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_string_is_zero_padded_hex() {
        assert_eq!(id_to_string(0), "0x0000000000000000");
        assert_eq!(id_to_string(u64::MAX), "0xffffffffffffffff");
    }

    #[test]
    fn folder_id_layout() {
        assert_eq!(folder_id(0x1, 0x1), 0x0000_0000_0001_0001);
        assert_eq!(folder_id(0x2A, 0x0003), 0x002A_0003);
        assert_eq!(folder_id_string(0x2A, 0x0003), "0x00000000002a0003");
        assert_eq!(id_to_string(folder_id(0x2A, 0x0003)), "0x00000000002a0003");
    }
}
