/// The Store: an ordered, byte-keyed, byte-valued embedded KV engine with
/// atomic multi-key write batches, prefix iteration, and crash-safe
/// durability. Backed by RocksDB: one `WriteBatch`, one `db.write()`,
/// all or nothing.
use std::path::Path;
use std::sync::Arc;

use rocksdb::{IteratorMode, Options, WriteBatch, DB};

use crate::errors::{IndexError, Result};
use crate::model::BatchOp;

/// Default value for `maxOpenFiles`, matching the configuration option
/// recognized by the core.
pub const DEFAULT_MAX_OPEN_FILES: i32 = 200;

/// A single column-family-backed store. Every key in this database either
/// starts with the reserved system prefix or an assigned service prefix;
/// the Store itself does not enforce that — `schema` and `applier` do.
pub struct Store {
    db: Arc<DB>,
}

impl Store {
    pub fn open(path: impl AsRef<Path>, max_open_files: i32) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_max_open_files(max_open_files);
        let db = DB::open(&opts, path)?;
        Ok(Self { db: Arc::new(db) })
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.db.get(key)?)
    }

    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        Ok(self.db.put(key, value)?)
    }

    pub fn del(&self, key: &[u8]) -> Result<()> {
        Ok(self.db.delete(key)?)
    }

    /// Commit a set of put/del operations atomically: either every op is
    /// durable after this returns, or none is.
    pub fn batch(&self, ops: &[BatchOp]) -> Result<()> {
        if ops.is_empty() {
            return Ok(());
        }
        let mut batch = WriteBatch::default();
        for op in ops {
            match op {
                BatchOp::Put { key, value } => batch.put(key, value),
                BatchOp::Del { key } => batch.delete(key),
            }
        }
        self.db.write(batch)?;
        Ok(())
    }

    /// Ordered scan of every key starting with `prefix`.
    pub fn iterate_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut out = Vec::new();
        let iter = self.db.prefix_iterator(prefix);
        for item in iter {
            let (key, value) = item.map_err(IndexError::StoreIO)?;
            if !key.starts_with(prefix) {
                break;
            }
            out.push((key.to_vec(), value.to_vec()));
        }
        Ok(out)
    }

    /// Full ordered scan, used only by diagnostics/tests.
    pub fn iterate_all(&self) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut out = Vec::new();
        for item in self.db.iterator(IteratorMode::Start) {
            let (key, value) = item.map_err(IndexError::StoreIO)?;
            out.push((key.to_vec(), value.to_vec()));
        }
        Ok(out)
    }

    pub fn close(self) {
        drop(self.db);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_temp() -> (Store, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path(), DEFAULT_MAX_OPEN_FILES).unwrap();
        (store, dir)
    }

    #[test]
    fn put_get_roundtrip() {
        let (store, _dir) = open_temp();
        store.put(b"k1", b"v1").unwrap();
        assert_eq!(store.get(b"k1").unwrap(), Some(b"v1".to_vec()));
        assert_eq!(store.get(b"missing").unwrap(), None);
    }

    #[test]
    fn batch_is_all_or_nothing_on_success() {
        let (store, _dir) = open_temp();
        let ops = vec![
            BatchOp::put(b"a".to_vec(), b"1".to_vec()),
            BatchOp::put(b"b".to_vec(), b"2".to_vec()),
        ];
        store.batch(&ops).unwrap();
        assert_eq!(store.get(b"a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(store.get(b"b").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn prefix_iteration_is_ordered_and_scoped() {
        let (store, _dir) = open_temp();
        store.put(b"\x01\x01a", b"1").unwrap();
        store.put(b"\x01\x01b", b"2").unwrap();
        store.put(b"\x02\x01z", b"3").unwrap();
        let items = store.iterate_prefix(b"\x01\x01").unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].0, b"\x01\x01a");
        assert_eq!(items[1].0, b"\x01\x01b");
    }

    #[test]
    fn del_removes_key() {
        let (store, _dir) = open_temp();
        store.put(b"k", b"v").unwrap();
        store.del(b"k").unwrap();
        assert_eq!(store.get(b"k").unwrap(), None);
    }
}
