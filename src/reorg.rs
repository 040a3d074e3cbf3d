/// Reorg Handler: finds the greatest common ancestor between the local tip
/// and the upstream chain, disconnects the local suffix most-recent-first,
/// then hands control back to the caller. Walks backwards over the
/// `UpstreamNode` trait and applies each disconnect through the
/// `BlockApplier`.
use std::sync::Arc;

use tracing::info;

use crate::applier::BlockApplier;
use crate::errors::{IndexError, Result};
use crate::metrics;
use crate::model::{Block, Direction, TipRecord};
use crate::tip::{self, Cursor};
use crate::upstream::UpstreamNode;
use crate::store::Store;

pub struct ReorgHandler<'a> {
    store: &'a Store,
    upstream: Arc<dyn UpstreamNode>,
}

impl<'a> ReorgHandler<'a> {
    pub fn new(store: &'a Store, upstream: Arc<dyn UpstreamNode>) -> Self {
        Self { store, upstream }
    }

    /// Walks back from the current local (serial) tip until the upstream's
    /// canonical block at that height matches, disconnecting every orphaned
    /// block along the way through `applier`. Returns the post-reorg tip.
    pub async fn handle(&self, applier: &BlockApplier<'_>) -> Result<TipRecord> {
        let mut local = tip::read(self.store, Cursor::Serial)?
            .ok_or_else(|| IndexError::ReorgFailed("no local tip to reorg from".to_string()))?;

        let mut suffix: Vec<Block> = Vec::new();

        loop {
            let canonical = self.upstream.block_at_height(local.height).await?;
            if canonical.as_ref().map(|b| b.hash) == Some(local.hash) {
                break;
            }

            let local_block = self
                .upstream
                .block_by_hash(&local.hash)
                .await?
                .ok_or_else(|| {
                    IndexError::ReorgFailed(format!(
                        "upstream no longer knows block {} at height {}",
                        hex::encode(local.hash),
                        local.height
                    ))
                })?;

            suffix.push(local_block.clone());

            if local.height == 0 {
                return Err(IndexError::ReorgFailed(
                    "diverged all the way back to genesis".to_string(),
                ));
            }
            local = TipRecord {
                hash: local_block.parent_hash,
                height: local.height - 1,
            };
        }

        let depth = suffix.len() as u32;
        for block in &suffix {
            applier
                .apply(block, Direction::Disconnect)
                .await
                .map_err(|e| IndexError::ReorgFailed(e.to_string()))?;
        }

        if depth > 0 {
            metrics::record_reorg(depth);
            info!(depth, new_height = local.height, "reorg complete");
        }

        tip::read(self.store, Cursor::Serial)?
            .ok_or_else(|| IndexError::ReorgFailed("tip missing after reorg".to_string()))
    }
}
