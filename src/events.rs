/// Event Bus: broadcasts confirmed blocks and transactions to any in-process
/// subscriber (e.g. a websocket layer sitting above this crate). Built on
/// `tokio::sync::broadcast`, with two typed topics instead of one shared
/// JSON channel.
///
/// Lagging subscribers drop the oldest events rather than blocking the
/// publisher (broadcast channel semantics); the Block Applier never waits on
/// a subscriber.
use tokio::sync::broadcast;

use crate::model::{Block, Transaction};

pub const DEFAULT_CAPACITY: usize = 1024;

pub struct EventBus {
    block_tx: broadcast::Sender<Block>,
    transaction_tx: broadcast::Sender<Transaction>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (block_tx, _) = broadcast::channel(capacity);
        let (transaction_tx, _) = broadcast::channel(capacity);
        Self {
            block_tx,
            transaction_tx,
        }
    }

    /// Publishes `block`. Returns the number of active subscribers that
    /// received it; a send with no subscribers is not an error.
    pub fn publish_block(&self, block: Block) -> usize {
        self.block_tx.send(block).unwrap_or(0)
    }

    pub fn publish_transaction(&self, tx: Transaction) -> usize {
        self.transaction_tx.send(tx).unwrap_or(0)
    }

    pub fn subscribe_blocks(&self) -> broadcast::Receiver<Block> {
        self.block_tx.subscribe()
    }

    pub fn subscribe_transactions(&self) -> broadcast::Receiver<Transaction> {
        self.transaction_tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
