/// The external collaborator surface: wherever blocks actually come from.
/// Implementing a production node client is out of scope here — callers
/// supply one — but the engine needs a stable async trait to drive.
use async_trait::async_trait;

use crate::errors::Result;
use crate::model::{Block, BlockHash};

#[async_trait]
pub trait UpstreamNode: Send + Sync {
    /// Current chain tip as seen by the upstream. `None` if it has no blocks
    /// at all (should not happen against a live node).
    async fn tip(&self) -> Result<Option<(BlockHash, u32)>>;

    /// Fetches the full block at `height`, including transactions. `None` if
    /// the upstream has no block at that height (it is behind `height`, or
    /// `height` is beyond its current tip).
    async fn block_at_height(&self, height: u32) -> Result<Option<Block>>;

    /// Fetches the full block by hash. Used while walking back during a
    /// reorg to confirm whether a given hash is still on the upstream's
    /// canonical chain.
    async fn block_by_hash(&self, hash: &BlockHash) -> Result<Option<Block>>;

    /// The raw genesis block buffer, for nodes that bootstrap their own
    /// genesis rather than trusting a hardcoded constant.
    async fn genesis_buffer(&self) -> Result<Vec<u8>>;

    /// Unconfirmed transaction ids currently in the upstream's mempool.
    async fn mempool(&self) -> Result<Vec<[u8; 32]>>;

    /// Raw transaction bytes for `txid`. When `include_mempool` is false,
    /// only confirmed transactions are considered.
    async fn get_transaction(&self, txid: &[u8; 32], include_mempool: bool) -> Result<Option<Vec<u8>>>;

    /// Submits a raw transaction, returning its txid hex on acceptance.
    async fn send_transaction(&self, raw_hex: &str) -> Result<String>;

    /// Estimated fee rate, in satoshis per kilobyte, for confirmation
    /// within `blocks` blocks.
    async fn estimate_fee(&self, blocks: u32) -> Result<f64>;
}
