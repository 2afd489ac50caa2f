//! Byte-key encoding for the partition's LMDB databases.
//!
//! Every database here is declared `Database<Bytes, Bytes>` and keys are
//! hand-encoded fixed-or-delimited byte strings, the same approach the
//! cache layer this crate is descended from used for `TenantScopedKey`:
//! a private encoding that can't be constructed except through these
//! functions, keeping cross-index key confusion a compile-time-adjacent
//! impossibility (you can't pass a `children` key to the `dn2id` database
//! without going through `decode_id`/`split_*` first).

use dirsrv_core::EntryId;

const SEPARATOR: u8 = 0x00;

pub fn encode_id(id: EntryId) -> [u8; 8] {
    id.get().to_be_bytes()
}

pub fn decode_id(bytes: &[u8]) -> Option<EntryId> {
    let arr: [u8; 8] = bytes.try_into().ok()?;
    Some(EntryId::new(u64::from_be_bytes(arr)))
}

/// `children` and `sublevel` index key: `parent_id || child_id`, 16 bytes.
/// Fixed width lets a prefix scan on the first 8 bytes enumerate one
/// parent's/ancestor's children without a separator.
pub fn encode_adjacency_key(left: EntryId, right: EntryId) -> [u8; 16] {
    let mut out = [0u8; 16];
    out[0..8].copy_from_slice(&encode_id(left));
    out[8..16].copy_from_slice(&encode_id(right));
    out
}

pub fn adjacency_prefix(left: EntryId) -> [u8; 8] {
    encode_id(left)
}

pub fn decode_adjacency_key(bytes: &[u8]) -> Option<(EntryId, EntryId)> {
    if bytes.len() != 16 {
        return None;
    }
    Some((decode_id(&bytes[0..8])?, decode_id(&bytes[8..16])?))
}

/// Forward attribute index key: `attr_oid 0x00 normalized_value 0x00 entry_id`.
/// OIDs and normalized values never contain a NUL byte, so the separator
/// is unambiguous. Prefixing with just `attr_oid\0` and scanning yields
/// attribute presence; prefixing with `attr_oid\0value\0` yields equality.
pub fn encode_index_key(attr_oid: &str, normalized_value: &str, id: EntryId) -> Vec<u8> {
    let mut out = Vec::with_capacity(attr_oid.len() + normalized_value.len() + 9);
    out.extend_from_slice(attr_oid.as_bytes());
    out.push(SEPARATOR);
    out.extend_from_slice(normalized_value.as_bytes());
    out.push(SEPARATOR);
    out.extend_from_slice(&encode_id(id));
    out
}

pub fn index_presence_prefix(attr_oid: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(attr_oid.len() + 1);
    out.extend_from_slice(attr_oid.as_bytes());
    out.push(SEPARATOR);
    out
}

pub fn index_equality_prefix(attr_oid: &str, normalized_value: &str) -> Vec<u8> {
    let mut out = index_presence_prefix(attr_oid);
    out.extend_from_slice(normalized_value.as_bytes());
    out.push(SEPARATOR);
    out
}

/// Pulls the trailing `entry_id` back out of a full index key.
pub fn index_key_entry_id(bytes: &[u8]) -> Option<EntryId> {
    if bytes.len() < 8 {
        return None;
    }
    decode_id(&bytes[bytes.len() - 8..])
}

pub const NEXT_ENTRY_ID_KEY: &[u8] = b"next_entry_id";
