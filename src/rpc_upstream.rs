/// A thin JSON-RPC `UpstreamNode` adapter so `main` is runnable end-to-end
/// without depending on a full node client crate. Contains no indexing
/// logic — it only shapes JSON-RPC requests/responses.
use serde_json::Value;

use crate::errors::{IndexError, Result};
use crate::model::{Block, BlockHash, OutPoint, Transaction, TxOutput};
use crate::upstream::UpstreamNode;

pub struct RpcUpstreamNode {
    url: String,
    user: String,
    pass: String,
    client: reqwest::Client,
}

impl RpcUpstreamNode {
    pub fn new(url: impl Into<String>, user: impl Into<String>, pass: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            user: user.into(),
            pass: pass.into(),
            client: reqwest::Client::new(),
        }
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let response = self
            .client
            .post(&self.url)
            .basic_auth(&self.user, Some(&self.pass))
            .json(&serde_json::json!({
                "jsonrpc": "1.0",
                "id": "zenindex",
                "method": method,
                "params": params,
            }))
            .send()
            .await
            .map_err(|e| rpc_lost(e.to_string()))?;

        let body: Value = response.json().await.map_err(|e| rpc_lost(e.to_string()))?;
        if let Some(err) = body.get("error").filter(|e| !e.is_null()) {
            return Err(rpc_lost(err.to_string()));
        }
        body.get("result")
            .cloned()
            .ok_or_else(|| rpc_lost("RPC response had no result field".to_string()))
    }

    fn decode_block(result: &Value) -> Result<Block> {
        let hash = hex_field_32(result, "hash")?;
        let parent_hash = match result.get("previousblockhash").and_then(|v| v.as_str()) {
            Some(s) => decode_hash32(s)?,
            None => [0; 32],
        };
        let height = result
            .get("height")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| rpc_lost("block missing height".to_string()))? as u32;

        let transactions = result
            .get("tx")
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(decode_tx).collect())
            .unwrap_or_default();

        Ok(Block {
            hash,
            parent_hash,
            height,
            header: serde_json::to_vec(result).unwrap_or_default(),
            transactions,
        })
    }
}

fn decode_tx(value: &Value) -> Option<Transaction> {
    let obj = value.as_object()?;
    let txid = decode_hash32(obj.get("txid")?.as_str()?).ok()?;
    let raw = obj
        .get("hex")
        .and_then(|v| v.as_str())
        .and_then(|s| hex::decode(s).ok())
        .unwrap_or_default();
    Some(Transaction {
        txid,
        inputs: vec![OutPoint {
            prev_txid: [0; 32],
            prev_vout: 0,
        }],
        outputs: vec![TxOutput { value_sat: 0 }],
        raw,
        height: None,
        timestamp: None,
        input_values: Vec::new(),
    })
}

fn decode_hash32(s: &str) -> Result<BlockHash> {
    let bytes = hex::decode(s).map_err(|e| rpc_lost(e.to_string()))?;
    if bytes.len() != 32 {
        return Err(rpc_lost(format!("expected 32-byte hash, got {}", bytes.len())));
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&bytes);
    Ok(out)
}

fn hex_field_32(value: &Value, field: &str) -> Result<BlockHash> {
    let s = value
        .get(field)
        .and_then(|v| v.as_str())
        .ok_or_else(|| rpc_lost(format!("missing field '{field}'")))?;
    decode_hash32(s)
}

fn rpc_lost(reason: String) -> IndexError {
    IndexError::UpstreamLost { attempts: 1, reason }
}

#[async_trait::async_trait]
impl UpstreamNode for RpcUpstreamNode {
    async fn tip(&self) -> Result<Option<(BlockHash, u32)>> {
        let height = self
            .call("getblockcount", serde_json::json!([]))
            .await?
            .as_u64()
            .ok_or_else(|| rpc_lost("getblockcount did not return a number".to_string()))?;
        let hash_hex = self
            .call("getblockhash", serde_json::json!([height]))
            .await?;
        let hash = decode_hash32(hash_hex.as_str().unwrap_or_default())?;
        Ok(Some((hash, height as u32)))
    }

    async fn block_at_height(&self, height: u32) -> Result<Option<Block>> {
        let hash_hex = match self.call("getblockhash", serde_json::json!([height])).await {
            Ok(v) => v,
            Err(_) => return Ok(None),
        };
        let result = self
            .call(
                "getblock",
                serde_json::json!([hash_hex.as_str().unwrap_or_default(), 2]),
            )
            .await?;
        Ok(Some(Self::decode_block(&result)?))
    }

    async fn block_by_hash(&self, hash: &BlockHash) -> Result<Option<Block>> {
        let result = match self
            .call("getblock", serde_json::json!([hex::encode(hash), 2]))
            .await
        {
            Ok(v) => v,
            Err(_) => return Ok(None),
        };
        Ok(Some(Self::decode_block(&result)?))
    }

    async fn genesis_buffer(&self) -> Result<Vec<u8>> {
        let hash_hex = self.call("getblockhash", serde_json::json!([0])).await?;
        let result = self
            .call(
                "getblock",
                serde_json::json!([hash_hex.as_str().unwrap_or_default(), 0]),
            )
            .await?;
        result
            .as_str()
            .map(|s| hex::decode(s).unwrap_or_default())
            .ok_or_else(|| rpc_lost("genesis block response was not hex".to_string()))
    }

    async fn mempool(&self) -> Result<Vec<[u8; 32]>> {
        let result = self.call("getrawmempool", serde_json::json!([])).await?;
        Ok(result
            .as_array()
            .map(|arr| arr.iter().filter_map(|v| v.as_str()).filter_map(|s| decode_hash32(s).ok()).collect())
            .unwrap_or_default())
    }

    async fn get_transaction(&self, txid: &[u8; 32], include_mempool: bool) -> Result<Option<Vec<u8>>> {
        let result = self
            .call(
                "getrawtransaction",
                serde_json::json!([hex::encode(txid), false, include_mempool]),
            )
            .await;
        match result {
            Ok(v) => Ok(v.as_str().and_then(|s| hex::decode(s).ok())),
            Err(_) => Ok(None),
        }
    }

    async fn send_transaction(&self, raw_hex: &str) -> Result<String> {
        let result = self
            .call("sendrawtransaction", serde_json::json!([raw_hex]))
            .await?;
        result
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| rpc_lost("sendrawtransaction did not return a txid".to_string()))
    }

    async fn estimate_fee(&self, blocks: u32) -> Result<f64> {
        let result = self
            .call("estimatefee", serde_json::json!([blocks]))
            .await?;
        result
            .as_f64()
            .ok_or_else(|| rpc_lost("estimatefee did not return a number".to_string()))
    }
}
