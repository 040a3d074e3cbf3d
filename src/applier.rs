/// Block Applier: gathers per-service mutations for one block and commits
/// them as a single atomic batch alongside the tip update.
///
/// Step order:
///   1. every service's concurrent handler, fanned out in parallel
///   2. every service's serial handler, in declared (dependency) order
///   3. two tip-update ops (serial + concurrent cursor)
///   4. one atomic `Store::batch`
///   5. publish `block`/`transaction` events on success
use std::sync::Arc;

use futures::future::join_all;
use tracing::{error, info};

use crate::errors::{IndexError, Result};
use crate::events::EventBus;
use crate::metrics;
use crate::model::{BatchOp, Block, Direction, TipRecord};
use crate::registry::ServiceRegistry;
use crate::store::Store;
use crate::tip::{advance_op, Cursor};

pub struct BlockApplier<'a> {
    store: &'a Store,
    registry: &'a ServiceRegistry,
    events: &'a EventBus,
}

impl<'a> BlockApplier<'a> {
    pub fn new(store: &'a Store, registry: &'a ServiceRegistry, events: &'a EventBus) -> Self {
        Self {
            store,
            registry,
            events,
        }
    }

    pub async fn apply(&self, block: &Block, direction: Direction) -> Result<()> {
        let timer = metrics::apply_timer(direction);
        let mut ops = self.run_concurrent_handlers(block, direction).await?;
        ops.extend(self.run_serial_handlers(block, direction).await?);

        let (serial_tip, concurrent_tip) = tip_targets(block, direction);
        ops.push(advance_op(Cursor::Serial, serial_tip));
        ops.push(advance_op(Cursor::Concurrent, concurrent_tip));

        self.store.batch(&ops)?;
        timer.observe_duration();
        metrics::record_block_applied(direction);
        metrics::set_chain_tip_height(serial_tip.height);

        info!(
            height = block.height,
            hash = %hex::encode(block.hash),
            direction = ?direction,
            ops = ops.len(),
            "committed block"
        );

        self.events.publish_block(block.clone());
        for tx in &block.transactions {
            self.events.publish_transaction(tx.clone());
        }

        Ok(())
    }

    async fn run_concurrent_handlers(
        &self,
        block: &Block,
        direction: Direction,
    ) -> Result<Vec<BatchOp>> {
        let futures = self
            .registry
            .services()
            .iter()
            .filter(|s| s.has_concurrent_handler())
            .map(|svc| {
                let svc = Arc::clone(svc);
                let block = block.clone();
                async move {
                    let name = svc.name().to_string();
                    svc.concurrent_block_handler(&block, direction)
                        .await
                        .map_err(|e| {
                            metrics::record_handler_failure(&name);
                            handler_err(&name, block.height, e)
                        })
                }
            });

        let mut ops = Vec::new();
        for result in join_all(futures).await {
            ops.extend(result?);
        }
        Ok(ops)
    }

    async fn run_serial_handlers(&self, block: &Block, direction: Direction) -> Result<Vec<BatchOp>> {
        let mut ops = Vec::new();
        for svc in self.registry.services() {
            if !svc.has_block_handler() {
                continue;
            }
            match svc.block_handler(block, direction).await {
                Ok(mut new_ops) => ops.append(&mut new_ops),
                Err(e) => {
                    let err = handler_err(svc.name(), block.height, e);
                    metrics::record_handler_failure(svc.name());
                    error!(service = svc.name(), height = block.height, error = %err, "serial handler failed");
                    return Err(err);
                }
            }
        }
        Ok(ops)
    }
}

fn handler_err(service: &str, height: u32, source: IndexError) -> IndexError {
    IndexError::HandlerFailure {
        service: service.to_string(),
        height: height as i64,
        reason: source.to_string(),
    }
}

/// Tip targets after applying `block` in `direction`: connecting names
/// the block itself; disconnecting rolls the tip back to its parent.
fn tip_targets(block: &Block, direction: Direction) -> (TipRecord, TipRecord) {
    let record = match direction {
        Direction::Connect => TipRecord {
            hash: block.hash,
            height: block.height,
        },
        Direction::Disconnect => TipRecord {
            hash: block.parent_hash,
            height: block.height.saturating_sub(1),
        },
    };
    (record, record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use crate::model::{OutPoint, Transaction, TxOutput};
    use crate::registry::Indexer;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn block(height: u32, hash: u8, parent: u8) -> Block {
        Block {
            hash: [hash; 32],
            parent_hash: [parent; 32],
            height,
            header: vec![],
            transactions: vec![Transaction {
                txid: [hash; 32],
                inputs: vec![OutPoint {
                    prev_txid: [0; 32],
                    prev_vout: 0,
                }],
                outputs: vec![TxOutput { value_sat: 100 }],
                raw: vec![],
                height: None,
                timestamp: None,
                input_values: vec![],
            }],
        }
    }

    struct RecordingIndexer {
        name: &'static str,
        deps: Vec<String>,
        prefix: u8,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Indexer for RecordingIndexer {
        fn name(&self) -> &str {
            self.name
        }
        fn dependencies(&self) -> &[String] {
            &self.deps
        }
        fn has_block_handler(&self) -> bool {
            true
        }
        async fn block_handler(&self, block: &Block, _direction: Direction) -> Result<Vec<BatchOp>> {
            self.calls.lock().unwrap().push(self.name.to_string());
            Ok(vec![BatchOp::put(
                vec![0x00, self.prefix, b'h'],
                block.height.to_be_bytes().to_vec(),
            )])
        }
    }

    struct FailingIndexer;

    #[async_trait]
    impl Indexer for FailingIndexer {
        fn name(&self) -> &str {
            "failing"
        }
        fn dependencies(&self) -> &[String] {
            &[]
        }
        fn has_block_handler(&self) -> bool {
            true
        }
        async fn block_handler(&self, _block: &Block, _direction: Direction) -> Result<Vec<BatchOp>> {
            Err(IndexError::NotFound)
        }
    }

    struct CountingConcurrentIndexer {
        name: &'static str,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Indexer for CountingConcurrentIndexer {
        fn name(&self) -> &str {
            self.name
        }
        fn dependencies(&self) -> &[String] {
            &[]
        }
        fn has_concurrent_handler(&self) -> bool {
            true
        }
        async fn concurrent_block_handler(
            &self,
            block: &Block,
            _direction: Direction,
        ) -> Result<Vec<BatchOp>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![BatchOp::put(
                vec![0x00, 0x09, b'c'],
                block.height.to_be_bytes().to_vec(),
            )])
        }
    }

    #[tokio::test]
    async fn applies_serial_handlers_in_dependency_order_and_updates_tip() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path(), 64).unwrap();
        let a = Arc::new(RecordingIndexer {
            name: "address",
            deps: vec![],
            prefix: 1,
            calls: Mutex::new(vec![]),
        });
        let b = Arc::new(RecordingIndexer {
            name: "tx",
            deps: vec!["address".to_string()],
            prefix: 2,
            calls: Mutex::new(vec![]),
        });
        let registry = ServiceRegistry::build(vec![b.clone(), a.clone()]).unwrap();
        let events = EventBus::new(16);
        let applier = BlockApplier::new(&store, &registry, &events);

        let blk = block(1, 1, 0);
        applier.apply(&blk, Direction::Connect).await.unwrap();

        let tip = crate::tip::read(&store, Cursor::Serial).unwrap().unwrap();
        assert_eq!(tip.height, 1);
        assert_eq!(tip.hash, [1; 32]);

        let concurrent_tip = crate::tip::read(&store, Cursor::Concurrent).unwrap().unwrap();
        assert_eq!(concurrent_tip, tip);
    }

    #[tokio::test]
    async fn handler_failure_commits_nothing() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path(), 64).unwrap();
        let registry = ServiceRegistry::build(vec![Arc::new(FailingIndexer)]).unwrap();
        let events = EventBus::new(16);
        let applier = BlockApplier::new(&store, &registry, &events);

        let blk = block(1, 1, 0);
        let err = applier.apply(&blk, Direction::Connect).await.unwrap_err();
        assert!(matches!(err, IndexError::HandlerFailure { .. }));
        assert!(crate::tip::read(&store, Cursor::Serial).unwrap().is_none());
    }

    #[tokio::test]
    async fn concurrent_handlers_run_and_contribute_ops() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path(), 64).unwrap();
        let svc = Arc::new(CountingConcurrentIndexer {
            name: "concurrent",
            calls: AtomicUsize::new(0),
        });
        let registry = ServiceRegistry::build(vec![svc.clone()]).unwrap();
        let events = EventBus::new(16);
        let applier = BlockApplier::new(&store, &registry, &events);

        let blk = block(5, 5, 4);
        applier.apply(&blk, Direction::Connect).await.unwrap();

        assert_eq!(svc.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            store.get(&[0x00, 0x09, b'c']).unwrap(),
            Some(5u32.to_be_bytes().to_vec())
        );
    }

    #[tokio::test]
    async fn disconnect_sets_tip_to_parent() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path(), 64).unwrap();
        let registry = ServiceRegistry::build(vec![]).unwrap();
        let events = EventBus::new(16);
        let applier = BlockApplier::new(&store, &registry, &events);

        let blk = block(5, 5, 4);
        applier.apply(&blk, Direction::Disconnect).await.unwrap();

        let tip = crate::tip::read(&store, Cursor::Serial).unwrap().unwrap();
        assert_eq!(tip.height, 4);
        assert_eq!(tip.hash, [4; 32]);
    }
}
