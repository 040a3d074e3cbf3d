/// Sync Driver: the state machine that walks the upstream chain forward
/// from the local tip, applying one block at a time, and escalates to the
/// Reorg Handler on divergence. Polls the `UpstreamNode` trait with bounded
/// retry and drives the `BlockApplier`/Tip Bookkeeper forward one block at
/// a time.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::applier::BlockApplier;
use crate::errors::{IndexError, Result};
use crate::metrics;
use crate::model::{Block, Direction, TipRecord};
use crate::reorg::ReorgHandler;
use crate::store::Store;
use crate::tip::{self, Cursor};
use crate::upstream::UpstreamNode;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Syncing,
    Reorging,
    Stopping,
}

pub struct SyncDriver<'a> {
    store: &'a Store,
    upstream: Arc<dyn UpstreamNode>,
    max_retries: u32,
    retry_delay: Duration,
    state: State,
    stopping: Arc<AtomicBool>,
}

impl<'a> SyncDriver<'a> {
    pub fn new(store: &'a Store, upstream: Arc<dyn UpstreamNode>) -> Self {
        Self {
            store,
            upstream,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            state: State::Idle,
            stopping: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Overrides the retry backoff — production defaults to 3 tries 60s
    /// apart; tests use a zero delay to stay fast.
    pub fn with_retry_policy(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = retry_delay;
        self
    }

    /// Wires an externally owned stop flag in place of the driver's own, so
    /// a caller can hold the handle *before* `run_to_tip` starts and flip it
    /// while a (possibly long) catch-up is in progress.
    pub fn with_stop_handle(mut self, handle: Arc<AtomicBool>) -> Self {
        self.stopping = handle;
        self
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// A cooperative stop handle: the driver finishes its current block
    /// before honoring it.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stopping)
    }

    /// Drives the state machine until the local tip matches the upstream
    /// tip (→Idle) or a stop/fatal condition ends the run.
    pub async fn run_to_tip(&mut self, applier: &BlockApplier<'_>) -> Result<()> {
        loop {
            if self.stopping.load(Ordering::SeqCst) {
                self.state = State::Stopping;
                info!("sync driver stopping on request");
                return Ok(());
            }

            let local =
                tip::read(self.store, Cursor::Serial)?.unwrap_or(TipRecord::genesis([0; 32]));
            let upstream_tip = self.upstream.tip().await?;

            let Some((upstream_hash, upstream_height)) = upstream_tip else {
                self.state = State::Idle;
                return Ok(());
            };

            if local.hash == upstream_hash && local.height == upstream_height {
                self.state = State::Idle;
                return Ok(());
            }

            self.state = State::Syncing;
            let next_height = local.height + 1;
            let candidate = self.fetch_with_retry(next_height).await?;

            match candidate {
                Some(block) if block.parent_hash == local.hash => {
                    applier.apply(&block, Direction::Connect).await?;
                    info!(height = block.height, "advanced local tip");
                }
                _ => {
                    self.state = State::Reorging;
                    warn!(local_height = local.height, "divergence detected, reorging");
                    let reorg = ReorgHandler::new(self.store, Arc::clone(&self.upstream));
                    reorg.handle(applier).await?;
                    self.state = State::Syncing;
                }
            }
        }
    }

    /// Fetches the block at `height`, retrying up to `max_retries` times
    /// with `retry_delay` between attempts before giving up fatally.
    async fn fetch_with_retry(&self, height: u32) -> Result<Option<Block>> {
        let mut attempts = 0;
        loop {
            match self.upstream.block_at_height(height).await {
                Ok(Some(block)) => return Ok(Some(block)),
                Ok(None) => {
                    attempts += 1;
                    if attempts >= self.max_retries {
                        return Err(IndexError::UpstreamLost {
                            attempts,
                            reason: format!("upstream has no block at height {height}"),
                        });
                    }
                }
                Err(e) => {
                    metrics::record_upstream_fetch_failure();
                    attempts += 1;
                    if attempts >= self.max_retries {
                        return Err(IndexError::UpstreamLost {
                            attempts,
                            reason: e.to_string(),
                        });
                    }
                }
            }
            if !self.retry_delay.is_zero() {
                tokio::time::sleep(self.retry_delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use crate::registry::ServiceRegistry;
    use crate::upstream::mock::MockUpstreamNode;
    use tempfile::TempDir;

    fn block(height: u32, hash: u8, parent: u8) -> Block {
        Block {
            hash: [hash; 32],
            parent_hash: [parent; 32],
            height,
            header: vec![],
            transactions: vec![],
        }
    }

    /// The driver assumes tip load has already connected genesis before it
    /// ever runs; starting it with no local tip at all but a non-empty
    /// upstream drives forward from height 1 onward, by design — genesis
    /// connect itself is `Lifecycle`'s job, exercised in lifecycle.rs.
    #[tokio::test]
    async fn linear_growth_catches_up_to_upstream_tip() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path(), 64).unwrap();
        let registry = ServiceRegistry::build(vec![]).unwrap();
        let events = EventBus::new(16);
        let applier = BlockApplier::new(&store, &registry, &events);

        let chain = vec![
            block(0, 0, 0),
            block(1, 1, 0),
            block(2, 2, 1),
            block(3, 3, 2),
        ];
        let upstream = Arc::new(MockUpstreamNode::new(chain));
        let mut driver = SyncDriver::new(&store, upstream).with_retry_policy(3, Duration::ZERO);
        driver.run_to_tip(&applier).await.unwrap();

        let tip = tip::read(&store, Cursor::Serial).unwrap().unwrap();
        assert_eq!(tip.height, 3);
        assert_eq!(tip.hash, [3; 32]);
    }

    #[tokio::test]
    async fn divergence_triggers_reorg_then_resumes_syncing() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path(), 64).unwrap();
        let registry = ServiceRegistry::build(vec![]).unwrap();
        let events = EventBus::new(16);
        let applier = BlockApplier::new(&store, &registry, &events);

        // Sync onto an initial chain ending at an orphan.
        let initial = vec![block(0, 0, 0), block(1, 1, 0), block(2, 0xAA, 1)];
        let upstream = Arc::new(MockUpstreamNode::new(initial));
        {
            let mut driver = SyncDriver::new(&store, Arc::clone(&upstream))
                .with_retry_policy(3, Duration::ZERO);
            driver.run_to_tip(&applier).await.unwrap();
        }
        assert_eq!(
            tip::read(&store, Cursor::Serial).unwrap().unwrap().hash,
            [0xAA; 32]
        );

        // Upstream reorgs onto a longer, different branch at height 2.
        upstream.set_canonical(vec![
            block(0, 0, 0),
            block(1, 1, 0),
            block(2, 0xBB, 1),
            block(3, 0xCC, 0xBB),
        ]);

        let mut driver = SyncDriver::new(&store, upstream).with_retry_policy(3, Duration::ZERO);
        driver.run_to_tip(&applier).await.unwrap();

        let tip = tip::read(&store, Cursor::Serial).unwrap().unwrap();
        assert_eq!(tip.height, 3);
        assert_eq!(tip.hash, [0xCC; 32]);
    }

    #[tokio::test]
    async fn upstream_with_no_blocks_settles_idle() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path(), 64).unwrap();
        let registry = ServiceRegistry::build(vec![]).unwrap();
        let events = EventBus::new(16);
        let applier = BlockApplier::new(&store, &registry, &events);

        let upstream = Arc::new(MockUpstreamNode::new(vec![]));
        let mut driver = SyncDriver::new(&store, upstream).with_retry_policy(2, Duration::ZERO);
        driver.run_to_tip(&applier).await.unwrap();

        assert_eq!(driver.state(), State::Idle);
        assert!(tip::read(&store, Cursor::Serial).unwrap().is_none());
    }

    #[tokio::test]
    async fn stop_handle_halts_before_the_next_block() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path(), 64).unwrap();
        let registry = ServiceRegistry::build(vec![]).unwrap();
        let events = EventBus::new(16);
        let applier = BlockApplier::new(&store, &registry, &events);

        let upstream = Arc::new(MockUpstreamNode::new(vec![block(0, 0, 0), block(1, 1, 0)]));
        let mut driver = SyncDriver::new(&store, upstream).with_retry_policy(3, Duration::ZERO);
        driver.stop_handle().store(true, Ordering::SeqCst);
        driver.run_to_tip(&applier).await.unwrap();

        assert_eq!(driver.state(), State::Stopping);
        assert!(tip::read(&store, Cursor::Serial).unwrap().is_none());
    }
}
