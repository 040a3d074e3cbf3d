/// Version Guard: refuses to start against a database written by an
/// incompatible schema version. Schema changes to indexer key layouts are
/// not backward-compatible, so this forces an explicit reindex rather than
/// risking silent corruption.
use tracing::info;

use crate::errors::{IndexError, Result};
use crate::schema::{tip_key, version_key};
use crate::store::Store;

/// Current compiled schema version. Bump this whenever a released indexer's
/// on-disk key layout changes incompatibly.
pub const CURRENT_VERSION: u32 = 2;

/// Legacy on-disk databases that predate the `version` key are implicitly
/// version 1.
const LEGACY_VERSION: u32 = 1;

/// Runs the startup version check. Must be called before any other
/// component touches the store.
pub fn check_version(store: &Store) -> Result<()> {
    let is_fresh = store.get(&tip_key())?.is_none();

    if is_fresh {
        store.put(&version_key(), &CURRENT_VERSION.to_be_bytes())?;
        info!(version = CURRENT_VERSION, "initialized fresh database");
        return Ok(());
    }

    let on_disk = match store.get(&version_key())? {
        Some(bytes) if bytes.len() == 4 => {
            u32::from_be_bytes(bytes.try_into().expect("checked length"))
        }
        Some(_) | None => LEGACY_VERSION,
    };

    if on_disk != CURRENT_VERSION {
        return Err(IndexError::VersionMismatch {
            on_disk,
            compiled: CURRENT_VERSION,
        });
    }

    Ok(())
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
    fn fresh_db_gets_current_version() {
        let (store, _dir) = open_temp();
        check_version(&store).unwrap();
        let bytes = store.get(&version_key()).unwrap().unwrap();
        assert_eq!(u32::from_be_bytes(bytes.try_into().unwrap()), CURRENT_VERSION);
    }

    #[test]
    fn mismatched_version_is_fatal_before_any_mutation() {
        let (store, _dir) = open_temp();
        // Simulate a pre-existing DB at version 1 with a tip already set.
        store.put(&tip_key(), &[0u8; 36]).unwrap();
        store.put(&version_key(), &1u32.to_be_bytes()).unwrap();

        let err = check_version(&store).unwrap_err();
        match err {
            IndexError::VersionMismatch { on_disk, compiled } => {
                assert_eq!(on_disk, 1);
                assert_eq!(compiled, CURRENT_VERSION);
            }
            other => panic!("expected VersionMismatch, got {other:?}"),
        }
        // No other key should have been written as a side effect.
        assert!(store.get(&crate::schema::next_unused_key()).unwrap().is_none());
    }

    #[test]
    fn legacy_db_with_no_version_key_is_treated_as_v1() {
        let (store, _dir) = open_temp();
        store.put(&tip_key(), &[0u8; 36]).unwrap();
        let err = check_version(&store).unwrap_err();
        assert!(matches!(err, IndexError::VersionMismatch { on_disk: 1, .. }));
    }
}
