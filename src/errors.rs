/// Typed error kinds for the chain-indexing core.
///
/// Every kind here corresponds 1:1 to an error named in the error-handling
/// section of the design: store I/O, startup gates, handler/apply failures,
/// and upstream/reorg failures. `is_fatal` is the single place callers
/// consult to decide between "log and keep going" and "stop the node".
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("store I/O error: {0}")]
    StoreIO(#[from] rocksdb::Error),

    #[error("schema version mismatch: on-disk={on_disk}, compiled={compiled} — reindex required")]
    VersionMismatch { on_disk: u32, compiled: u32 },

    #[error("service prefix space exhausted (nextUnused would overflow u16)")]
    PrefixExhausted,

    #[error("service '{0}' does not satisfy the plugin contract (missing start/stop/dependencies)")]
    ServiceContract(String),

    #[error("dependency cycle detected among services: {0:?}")]
    DependencyCycle(Vec<String>),

    #[error("handler '{service}' failed while applying block {height}: {reason}")]
    HandlerFailure {
        service: String,
        height: i64,
        reason: String,
    },

    #[error("lost contact with upstream node after {attempts} attempts: {reason}")]
    UpstreamLost { attempts: u32, reason: String },

    #[error("reorg failed: {0}")]
    ReorgFailed(String),

    #[error("not found")]
    NotFound,

    #[error("broadcast failed: {0}")]
    Broadcast(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl IndexError {
    /// Anything that could leave tip and indexer state inconsistent is
    /// fatal and must trigger a clean shutdown. Lookup errors are not.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            IndexError::VersionMismatch { .. }
                | IndexError::PrefixExhausted
                | IndexError::ServiceContract(_)
                | IndexError::DependencyCycle(_)
                | IndexError::HandlerFailure { .. }
                | IndexError::UpstreamLost { .. }
                | IndexError::ReorgFailed(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, IndexError>;
