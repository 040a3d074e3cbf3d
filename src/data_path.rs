/// Public data-path API: thin forwarding functions over an `UpstreamNode`
/// so higher-level services have one place to call instead of re-deriving
/// upstream glue. None of this implements indexing logic — it is a plain
/// async function layer, not an HTTP surface.
use crate::errors::{IndexError, Result};
use crate::model::{Block, BlockHash, Transaction};
use crate::upstream::UpstreamNode;

pub async fn get_block(upstream: &dyn UpstreamNode, height: u32) -> Result<Option<Block>> {
    upstream.block_at_height(height).await
}

pub async fn get_block_by_hash(upstream: &dyn UpstreamNode, hash: &BlockHash) -> Result<Option<Block>> {
    upstream.block_by_hash(hash).await
}

/// Looks a transaction up among the blocks the upstream still knows about,
/// falling back to its mempool when `include_mempool` is set and no
/// confirmed copy exists.
pub async fn get_transaction(
    upstream: &dyn UpstreamNode,
    txid: &[u8; 32],
    include_mempool: bool,
) -> Result<Option<Transaction>> {
    if let Some(raw) = upstream.get_transaction(txid, include_mempool).await? {
        return Ok(Some(Transaction {
            txid: *txid,
            inputs: Vec::new(),
            outputs: Vec::new(),
            raw,
            height: None,
            timestamp: None,
            input_values: Vec::new(),
        }));
    }
    Ok(None)
}

pub async fn send_transaction(upstream: &dyn UpstreamNode, raw_hex: &str) -> Result<String> {
    upstream.send_transaction(raw_hex).await
}

pub async fn estimate_fee(upstream: &dyn UpstreamNode, blocks: u32) -> Result<f64> {
    upstream.estimate_fee(blocks).await
}

/// The parent hash of the block named by `hash`, or `NotFound` if the
/// upstream no longer knows it.
pub async fn get_prev_hash(upstream: &dyn UpstreamNode, hash: &BlockHash) -> Result<BlockHash> {
    upstream
        .block_by_hash(hash)
        .await?
        .map(|b| b.parent_hash)
        .ok_or(IndexError::NotFound)
}
