//! Ledger queries and broadcasts.

use std::sync::Arc;

use serde_json::Value;

use meridian_types::{AccountAddress, BlockHash, TxHash, WireEnvelope};

use super::{required, to_value};
use crate::rpc::RpcError;
use crate::DaemonState;

type Result = std::result::Result<Value, RpcError>;

/// Look up a block by `hash` or by `height`.
pub async fn get_block(state: &Arc<DaemonState>, params: &Value) -> Result {
    let block = if params.get("hash").is_some() {
        let hash: BlockHash = required(params, "hash")?;
        state.chain.block_by_hash(&hash)
    } else if params.get("height").is_some() {
        let height: u64 = required(params, "height")?;
        state.chain.block_at(height)
    } else {
        return Err(RpcError::invalid_params("hash or height required"));
    };
    let block = block.ok_or_else(|| RpcError::not_found("block"))?;
    to_value(&block)
}

pub async fn get_transaction(state: &Arc<DaemonState>, params: &Value) -> Result {
    let hash: TxHash = required(params, "hash")?;
    let tx = state
        .chain
        .transaction(&hash)
        .ok_or_else(|| RpcError::not_found("transaction"))?;
    to_value(&tx)
}

/// Balance and stake of `address`. Unknown accounts hold zero.
pub async fn get_account_balance(state: &Arc<DaemonState>, params: &Value) -> Result {
    let address: AccountAddress = required(params, "address")?;
    to_value(&state.chain.balance(&address))
}

/// Pool a transaction sent as canonical envelope bytes plus signature.
pub async fn broadcast_transaction(state: &Arc<DaemonState>, params: &Value) -> Result {
    let envelope: WireEnvelope = required(params, "envelope")?;
    let tx_hash = state.chain.submit_transaction(&envelope)?;
    Ok(serde_json::json!({ "tx_hash": tx_hash }))
}

/// Accept a block whose leader proof verifies under the proposer's key.
pub async fn broadcast_new_block(state: &Arc<DaemonState>, params: &Value) -> Result {
    let envelope: WireEnvelope = required(params, "envelope")?;
    let (block_hash, height) = state.chain.submit_block(&envelope)?;
    Ok(serde_json::json!({
        "block_hash": block_hash,
        "height": height,
    }))
}
