/// Core data types shared across the indexing engine: blocks, transactions,
/// the tip cursor record, and the tagged batch-op variant handlers hand back
/// to the Block Applier.
use serde::{Deserialize, Serialize};

pub type BlockHash = [u8; 32];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub hash: BlockHash,
    pub parent_hash: BlockHash,
    pub height: u32,
    pub header: Vec<u8>,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn is_genesis(&self) -> bool {
        self.height == 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutPoint {
    pub prev_txid: [u8; 32],
    pub prev_vout: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxOutput {
    pub value_sat: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub txid: [u8; 32],
    pub inputs: Vec<OutPoint>,
    pub outputs: Vec<TxOutput>,
    pub raw: Vec<u8>,
    /// Decorations attached by indexers during apply: height of the
    /// containing block, its timestamp, and the satoshi value of each
    /// input's previous output (parallel to `inputs`, when resolved).
    pub height: Option<u32>,
    pub timestamp: Option<u32>,
    pub input_values: Vec<Option<i64>>,
}

impl Transaction {
    pub fn txid_hex(&self) -> String {
        hex::encode(self.txid)
    }
}

/// One mutation a service contributes for a block. Keys must begin with the
/// service's assigned two-byte prefix (enforced by the Block Applier, not by
/// this type — the type itself carries no namespace information).
#[derive(Debug, Clone)]
pub enum BatchOp {
    Put { key: Vec<u8>, value: Vec<u8> },
    Del { key: Vec<u8> },
}

impl BatchOp {
    pub fn put(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        BatchOp::Put {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn del(key: impl Into<Vec<u8>>) -> Self {
        BatchOp::Del { key: key.into() }
    }
}

/// A persisted tip cursor: 32-byte block hash followed by a 4-byte
/// big-endian height. Exactly 36 bytes on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TipRecord {
    pub hash: BlockHash,
    pub height: u32,
}

impl TipRecord {
    pub const ENCODED_LEN: usize = 36;

    pub fn genesis(hash: BlockHash) -> Self {
        Self { hash, height: 0 }
    }

    pub fn encode(&self) -> [u8; Self::ENCODED_LEN] {
        let mut buf = [0u8; Self::ENCODED_LEN];
        buf[..32].copy_from_slice(&self.hash);
        buf[32..].copy_from_slice(&self.height.to_be_bytes());
        buf
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != Self::ENCODED_LEN {
            return None;
        }
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&bytes[..32]);
        let height = u32::from_be_bytes(bytes[32..36].try_into().ok()?);
        Some(Self { hash, height })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Connect,
    Disconnect,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tip_record_round_trips() {
        let rec = TipRecord {
            hash: [7u8; 32],
            height: 12345,
        };
        let encoded = rec.encode();
        assert_eq!(encoded.len(), TipRecord::ENCODED_LEN);
        let decoded = TipRecord::decode(&encoded).unwrap();
        assert_eq!(decoded, rec);
    }

    #[test]
    fn tip_record_rejects_wrong_length() {
        assert!(TipRecord::decode(&[0u8; 10]).is_none());
    }
}
