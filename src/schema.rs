/// Reserved system namespace and the per-service prefix allocator.
///
/// Every non-core key begins with a 2-byte service prefix assigned here;
/// the system namespace itself lives under `0x00 0x00`.
use crate::errors::{IndexError, Result};
use crate::store::Store;

pub const SYSTEM_PREFIX: [u8; 2] = [0x00, 0x00];
pub const FIRST_SERVICE_PREFIX: u16 = 0x0001;

fn system_key(suffix: &[u8]) -> Vec<u8> {
    let mut key = SYSTEM_PREFIX.to_vec();
    key.extend_from_slice(suffix);
    key
}

pub fn tip_key() -> Vec<u8> {
    system_key(b"tip")
}

pub fn concurrent_tip_key() -> Vec<u8> {
    system_key(b"concurrentTip")
}

pub fn version_key() -> Vec<u8> {
    system_key(b"version")
}

pub fn next_unused_key() -> Vec<u8> {
    system_key(b"nextUnused")
}

pub fn prefix_key(service_name: &str) -> Vec<u8> {
    system_key(format!("prefix-{service_name}").as_bytes())
}

/// Assigns a stable two-byte prefix to `service_name`, persisting the
/// assignment so it survives restarts and is never reused.
///
/// Idempotent: if `prefix-<name>` already exists its value wins, even if
/// called again after a crash between the read and the two writes below.
pub fn assign_prefix(store: &Store, service_name: &str) -> Result<[u8; 2]> {
    let existing_key = prefix_key(service_name);
    if let Some(bytes) = store.get(&existing_key)? {
        return Ok(decode_prefix(&bytes));
    }

    let next_unused = match store.get(&next_unused_key())? {
        Some(bytes) if bytes.len() == 2 => u16::from_be_bytes([bytes[0], bytes[1]]),
        _ => FIRST_SERVICE_PREFIX,
    };

    let assigned = next_unused;
    let next = next_unused
        .checked_add(1)
        .ok_or(IndexError::PrefixExhausted)?;

    store.put(&existing_key, &assigned.to_be_bytes())?;
    store.put(&next_unused_key(), &next.to_be_bytes())?;

    Ok(assigned.to_be_bytes())
}

fn decode_prefix(bytes: &[u8]) -> [u8; 2] {
    let mut out = [0u8; 2];
    out.copy_from_slice(&bytes[..2.min(bytes.len())]);
    out
}

/// Checks that `key` begins with either the system prefix or `prefix`.
pub fn key_in_namespace(key: &[u8], prefix: &[u8; 2]) -> bool {
    key.starts_with(&SYSTEM_PREFIX) || key.starts_with(prefix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_temp() -> (Store, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path(), 64).unwrap();
        (store, dir)
    }

    #[test]
    fn first_assignment_starts_at_one() {
        let (store, _dir) = open_temp();
        let prefix = assign_prefix(&store, "addr").unwrap();
        assert_eq!(prefix, [0x00, 0x01]);
    }

    #[test]
    fn assignments_are_unique_and_increasing() {
        let (store, _dir) = open_temp();
        let a = assign_prefix(&store, "addr").unwrap();
        let b = assign_prefix(&store, "tx").unwrap();
        assert_ne!(a, b);
        assert_eq!(a, [0x00, 0x01]);
        assert_eq!(b, [0x00, 0x02]);
    }

    #[test]
    fn repeated_assignment_is_idempotent() {
        let (store, _dir) = open_temp();
        let first = assign_prefix(&store, "addr").unwrap();
        let second = assign_prefix(&store, "addr").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn assignment_survives_reassignment_after_other_services() {
        let (store, _dir) = open_temp();
        assign_prefix(&store, "addr").unwrap();
        assign_prefix(&store, "tx").unwrap();
        let addr_again = assign_prefix(&store, "addr").unwrap();
        assert_eq!(addr_again, [0x00, 0x01]);
    }
}
