/// Tip Bookkeeper: reads and writes the two persisted cursors — the serial
/// tip (advances after serial handlers commit) and the concurrent tip
/// (advances after parallel handlers commit). Normally equal; may diverge
/// transiently across a crash between the two tip-update ops in one batch.
use crate::errors::Result;
use crate::model::TipRecord;
use crate::schema::{concurrent_tip_key, tip_key};
use crate::store::Store;

#[derive(Debug, Clone, Copy)]
pub enum Cursor {
    Serial,
    Concurrent,
}

impl Cursor {
    fn key(self) -> Vec<u8> {
        match self {
            Cursor::Serial => tip_key(),
            Cursor::Concurrent => concurrent_tip_key(),
        }
    }
}

pub fn read(store: &Store, cursor: Cursor) -> Result<Option<TipRecord>> {
    match store.get(&cursor.key())? {
        Some(bytes) => Ok(TipRecord::decode(&bytes)),
        None => Ok(None),
    }
}

/// Builds the batch op that advances `cursor` to `record`. Callers append
/// this alongside handler ops so the tip update lands in the same atomic
/// batch as the mutations it reflects.
pub fn advance_op(cursor: Cursor, record: TipRecord) -> crate::model::BatchOp {
    crate::model::BatchOp::put(cursor.key(), record.encode().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn absent_tip_reads_as_none() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path(), 64).unwrap();
        assert!(read(&store, Cursor::Serial).unwrap().is_none());
    }

    #[test]
    fn advance_op_round_trips_through_store() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path(), 64).unwrap();
        let record = TipRecord {
            hash: [9u8; 32],
            height: 42,
        };
        store
            .batch(&[advance_op(Cursor::Serial, record)])
            .unwrap();
        let read_back = read(&store, Cursor::Serial).unwrap().unwrap();
        assert_eq!(read_back, record);
        assert!(read(&store, Cursor::Concurrent).unwrap().is_none());
    }
}
