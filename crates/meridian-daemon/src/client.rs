//! JSON-RPC client for another node's socket.
//!
//! Speaks the same newline-delimited JSON-RPC 2.0 the server does: one
//! request per line, one response per line. After `refactor_network` the
//! connection is handed over whole for frame exchange.

use std::path::Path;

use serde::de::DeserializeOwned;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tracing::debug;

use meridian_transport::messages;
use meridian_types::{TopologySnapshot, WireEnvelope};

use crate::rpc::{write_line, RpcError, RpcRequest, RpcResponse};

/// Errors talking to a remote node.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Failed to connect to the socket.
    #[error("failed to connect to '{path}': {reason}")]
    ConnectionFailed { path: String, reason: String },

    /// Reading or writing the socket failed.
    #[error("i/o error: {0}")]
    Io(String),

    /// The node closed the connection before answering.
    #[error("node disconnected (EOF)")]
    Disconnected,

    /// The response line was not a JSON-RPC response.
    #[error("failed to parse response: {reason} (raw: {raw})")]
    ParseFailed { reason: String, raw: String },

    /// The node answered with an error.
    #[error("rpc error: {0}")]
    Rpc(#[from] RpcError),
}

/// One connection to a node.
pub struct RpcClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    next_id: u64,
}

impl RpcClient {
    pub async fn connect(path: &Path) -> Result<Self, ClientError> {
        let stream = UnixStream::connect(path)
            .await
            .map_err(|e| ClientError::ConnectionFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        debug!(socket = %path.display(), "connected");
        let (reader, writer) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(reader),
            writer,
            next_id: 1,
        })
    }

    /// Send one request and wait for its response.
    pub async fn call(
        &mut self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, ClientError> {
        let request = RpcRequest::new(self.next_id, method, params);
        self.next_id += 1;
        write_line(&mut self.writer, &request)
            .await
            .map_err(|e| ClientError::Io(e.to_string()))?;

        let mut line = String::new();
        let bytes_read = self
            .reader
            .read_line(&mut line)
            .await
            .map_err(|e| ClientError::Io(e.to_string()))?;
        if bytes_read == 0 {
            return Err(ClientError::Disconnected);
        }

        let response: RpcResponse =
            serde_json::from_str(&line).map_err(|e| ClientError::ParseFailed {
                reason: e.to_string(),
                raw: line.clone(),
            })?;
        if let Some(error) = response.error {
            return Err(error.into());
        }
        Ok(response.result.unwrap_or(serde_json::Value::Null))
    }

    /// Call `method` and decode its result as `T`.
    pub async fn call_as<T: DeserializeOwned>(
        &mut self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T, ClientError> {
        let value = self.call(method, params).await?;
        serde_json::from_value(value).map_err(|e| ClientError::ParseFailed {
            reason: e.to_string(),
            raw: String::new(),
        })
    }

    pub async fn get_identity(&mut self) -> Result<WireEnvelope, ClientError> {
        self.call_as(messages::METHOD_GET_IDENTITY, serde_json::json!({}))
            .await
    }

    pub async fn get_topology(&mut self) -> Result<TopologySnapshot, ClientError> {
        self.call_as(messages::METHOD_GET_TOPOLOGY, serde_json::json!({}))
            .await
    }

    /// Call `refactor_network` and give up the connection for frame exchange.
    pub async fn into_frames(
        mut self,
    ) -> Result<(BufReader<OwnedReadHalf>, OwnedWriteHalf), ClientError> {
        self.call(messages::METHOD_REFACTOR_NETWORK, serde_json::json!({}))
            .await?;
        Ok((self.reader, self.writer))
    }
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient")
            .field("next_id", &self.next_id)
            .finish()
    }
}
