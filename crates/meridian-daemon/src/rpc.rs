//! JSON-RPC server over Unix socket.
//!
//! Listens on a Unix domain socket, accepts connections, and dispatches
//! newline-delimited JSON-RPC calls to the command handlers. A
//! `refactor_network` call switches its connection into frame mode for the
//! rest of its life: one `RequestFrame` or `ResponseFrame` JSON value per line.
//! Lines longer than `network.max_line_bytes` end the connection.

use std::path::PathBuf;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::net::UnixListener;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use meridian_auth::AuthError;
use meridian_negotiation::driver::run_responder;
use meridian_negotiation::{AbortReason, NegotiationError, ResponderSession};
use meridian_transport::messages::{self, RequestFrame, ResponseFrame};
use meridian_transport::stream::{duplex, FrameStream, DEFAULT_CAPACITY};

use crate::chain::ChainError;
use crate::commands;
use crate::DaemonState;

/// JSON-RPC request.
#[derive(Debug, Serialize, Deserialize)]
pub struct RpcRequest {
    /// JSON-RPC version (must be "2.0").
    pub jsonrpc: String,
    pub id: serde_json::Value,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

impl RpcRequest {
    pub fn new(id: u64, method: &str, params: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: serde_json::json!(id),
            method: method.to_string(),
            params,
        }
    }
}

/// JSON-RPC response.
#[derive(Debug, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: serde_json::Value,
    /// Result or error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

/// JSON-RPC error object.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, thiserror::Error)]
#[error("{message} ({code})")]
pub struct RpcError {
    pub code: i32,
    /// Error name.
    pub message: String,
    /// Optional structured data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl RpcResponse {
    /// Create a success response.
    pub fn success(id: serde_json::Value, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response.
    pub fn error(id: serde_json::Value, error: RpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

impl RpcError {
    // Standard JSON-RPC errors

    /// Parse error (-32700).
    pub fn parse_error() -> Self {
        Self {
            code: -32700,
            message: "PARSE_ERROR".to_string(),
            data: None,
        }
    }

    /// Invalid request (-32600).
    pub fn invalid_request() -> Self {
        Self {
            code: -32600,
            message: "INVALID_REQUEST".to_string(),
            data: None,
        }
    }

    /// Method not found (-32601).
    pub fn method_not_found(method: &str) -> Self {
        Self {
            code: -32601,
            message: "METHOD_NOT_FOUND".to_string(),
            data: Some(serde_json::json!({"method": method})),
        }
    }

    /// Invalid params (-32602).
    pub fn invalid_params(detail: &str) -> Self {
        Self {
            code: -32602,
            message: "INVALID_PARAMS".to_string(),
            data: Some(serde_json::json!({"detail": detail})),
        }
    }

    /// Internal error (-32603).
    pub fn internal_error(detail: &str) -> Self {
        Self {
            code: -32603,
            message: "INTERNAL_ERROR".to_string(),
            data: Some(serde_json::json!({"detail": detail})),
        }
    }

    /// Request line over the configured limit (-32600). The connection is
    /// closed after this is sent.
    pub fn line_too_long(limit: usize) -> Self {
        Self {
            code: -32600,
            message: "INVALID_REQUEST".to_string(),
            data: Some(serde_json::json!({"detail": format!("line exceeds {limit} bytes")})),
        }
    }

    /// Unknown block or transaction (-32040).
    pub fn not_found(what: &str) -> Self {
        Self {
            code: -32040,
            message: "NOT_FOUND".to_string(),
            data: Some(serde_json::json!({"detail": what})),
        }
    }

    /// Block rejected by chain rules (-32041).
    pub fn block_rejected(detail: &str) -> Self {
        Self {
            code: -32041,
            message: "BLOCK_REJECTED".to_string(),
            data: Some(serde_json::json!({"detail": detail})),
        }
    }

    /// This node cannot answer `refactor_network` (-32042).
    pub fn not_a_member() -> Self {
        Self {
            code: -32042,
            message: "NOT_A_MEMBER".to_string(),
            data: None,
        }
    }

    /// Negotiation or authentication failure, one code per abort reason.
    pub fn abort(reason: AbortReason, detail: &str) -> Self {
        let code = match reason {
            AbortReason::MalformedEnvelope => -32020,
            AbortReason::AddressMismatch => -32021,
            AbortReason::UnknownScheme => -32022,
            AbortReason::InvalidSignature => -32023,
            AbortReason::StaleTimestamp => -32024,
            AbortReason::ReplayDetected => -32025,
            AbortReason::NotEligible => -32030,
            AbortReason::MalformedTopology => -32031,
            AbortReason::NonImprovingProposal => -32032,
            AbortReason::StaleTopology => -32033,
            AbortReason::SessionTimeout => -32034,
            AbortReason::PeerClosed => -32035,
            AbortReason::ProtocolViolation => -32036,
        };
        Self {
            code,
            message: reason.to_string().to_uppercase(),
            data: Some(serde_json::json!({"detail": detail})),
        }
    }
}

impl From<AuthError> for RpcError {
    fn from(err: AuthError) -> Self {
        let detail = err.to_string();
        Self::abort(NegotiationError::from(err).reason(), &detail)
    }
}

impl From<NegotiationError> for RpcError {
    fn from(err: NegotiationError) -> Self {
        Self::abort(err.reason(), &err.to_string())
    }
}

impl From<ChainError> for RpcError {
    fn from(err: ChainError) -> Self {
        match err {
            ChainError::Auth(auth) => auth.into(),
            ChainError::Duplicate(_) => Self::abort(AbortReason::ReplayDetected, &err.to_string()),
            other => Self::block_rejected(&other.to_string()),
        }
    }
}

/// The RPC server.
pub struct RpcServer {
    state: Arc<DaemonState>,
    socket_path: PathBuf,
}

impl RpcServer {
    pub fn new(state: Arc<DaemonState>, socket_path: PathBuf) -> Self {
        Self { state, socket_path }
    }

    /// Bind the socket. Split from [`serve`](Self::serve) so callers know the
    /// socket exists before the first connection.
    pub fn bind(&self) -> anyhow::Result<UnixListener> {
        // Remove stale socket file
        let _ = std::fs::remove_file(&self.socket_path);
        let listener = UnixListener::bind(&self.socket_path)?;
        info!(socket = %self.socket_path.display(), "RPC server listening");
        Ok(listener)
    }

    /// Run the server, accepting connections.
    pub async fn run(&self) -> anyhow::Result<()> {
        let listener = self.bind()?;
        self.serve(listener).await
    }

    pub async fn serve(&self, listener: UnixListener) -> anyhow::Result<()> {
        let permits = Arc::new(Semaphore::new(self.state.config.network.max_connections.max(1)));
        loop {
            let permit = permits.clone().acquire_owned().await?;
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    let state = self.state.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(state, stream).await {
                            warn!(error = %e, "connection error");
                        }
                        drop(permit);
                    });
                }
                Err(e) => {
                    error!(error = %e, "accept error");
                }
            }
        }
    }
}

/// A line longer than the configured maximum.
#[derive(Debug, thiserror::Error)]
#[error("line exceeds {limit} bytes")]
pub struct LineTooLong {
    pub limit: usize,
}

/// Read one newline-terminated line into `buf`, reading at most `limit`
/// bytes before the newline. Returns 0 at end of stream; a longer line is an
/// `InvalidData` error wrapping [`LineTooLong`].
pub async fn read_line_bounded<R>(reader: &mut R, buf: &mut Vec<u8>, limit: usize) -> std::io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let cap = u64::try_from(limit).unwrap_or(u64::MAX).saturating_add(1);
    let read = (&mut *reader).take(cap).read_until(b'\n', buf).await?;
    if read > limit && !buf.ends_with(b"\n") {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            LineTooLong { limit },
        ));
    }
    Ok(read)
}

fn is_blank(line: &[u8]) -> bool {
    line.iter().all(u8::is_ascii_whitespace)
}

/// Handle a single client connection.
async fn handle_connection(
    state: Arc<DaemonState>,
    stream: tokio::net::UnixStream,
) -> anyhow::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();
    let limit = state.config.network.max_line_bytes;

    loop {
        let bytes_read = match read_line_bounded(&mut reader, &mut line, limit).await {
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                warn!(limit, "request line too long, closing connection");
                let response = RpcResponse::error(serde_json::Value::Null, RpcError::line_too_long(limit));
                write_line(&mut writer, &response).await?;
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        if bytes_read == 0 {
            break; // EOF
        }
        if is_blank(&line) {
            continue;
        }

        let request = match serde_json::from_slice::<RpcRequest>(&line) {
            Ok(request) => request,
            Err(_) => {
                let response = RpcResponse::error(serde_json::Value::Null, RpcError::parse_error());
                write_line(&mut writer, &response).await?;
                continue;
            }
        };

        if request.method == messages::METHOD_REFACTOR_NETWORK {
            if !state.is_member() {
                write_line(&mut writer, &RpcResponse::error(request.id, RpcError::not_a_member())).await?;
                continue;
            }
            let ack = serde_json::json!({"mode": "frames"});
            write_line(&mut writer, &RpcResponse::success(request.id, ack)).await?;
            serve_negotiation(&state, reader, writer).await;
            return Ok(());
        }

        let response = dispatch_request(state.clone(), request).await;
        write_line(&mut writer, &response).await?;
    }

    Ok(())
}

/// Dispatch a JSON-RPC request to the appropriate command handler.
async fn dispatch_request(state: Arc<DaemonState>, request: RpcRequest) -> RpcResponse {
    let id = request.id.clone();
    if request.jsonrpc != "2.0" {
        return RpcResponse::error(id, RpcError::invalid_request());
    }
    let method = request.method.as_str();

    debug!(method, "dispatching RPC method");

    let result = match method {
        messages::METHOD_GET_IDENTITY => commands::network::get_identity(&state).await,
        messages::METHOD_GET_TOPOLOGY => commands::network::get_topology(&state).await,
        messages::METHOD_GET_BLOCK => commands::chain::get_block(&state, &request.params).await,
        messages::METHOD_GET_TRANSACTION => {
            commands::chain::get_transaction(&state, &request.params).await
        }
        messages::METHOD_GET_ACCOUNT_BALANCE => {
            commands::chain::get_account_balance(&state, &request.params).await
        }
        messages::METHOD_BROADCAST_TRANSACTION => {
            commands::chain::broadcast_transaction(&state, &request.params).await
        }
        messages::METHOD_BROADCAST_NEW_BLOCK => {
            commands::chain::broadcast_new_block(&state, &request.params).await
        }
        _ => Err(RpcError::method_not_found(method)),
    };

    match result {
        Ok(value) => RpcResponse::success(id, value),
        Err(err) => RpcResponse::error(id, err),
    }
}

/// Run the responder side of `refactor_network` over a connection in frame
/// mode. The connection closes when the session ends.
async fn serve_negotiation<Rd, Wr>(state: &Arc<DaemonState>, reader: Rd, writer: Wr)
where
    Rd: AsyncBufRead + Unpin + Send + 'static,
    Wr: AsyncWrite + Unpin + Send + 'static,
{
    let session = ResponderSession::new(
        state.session_context(),
        state.registry.clone(),
        state.chain.clone(),
    );
    let (driver_end, bridge_end) = duplex::<ResponseFrame, RequestFrame>(DEFAULT_CAPACITY);
    let driver = tokio::spawn(run_responder(session, driver_end));

    let limit = state.config.network.max_line_bytes;
    if let Err(e) = bridge_frames(reader, writer, bridge_end, limit).await {
        warn!(error = %e, "frame bridge failed");
    }

    match driver.await {
        Ok(Ok(outcome)) => info!(
            version = ?outcome.committed_version,
            rounds = outcome.rounds,
            "served refactor_network"
        ),
        Ok(Err(e)) => warn!(reason = %e.reason(), error = %e, "refactor_network aborted"),
        Err(e) => error!(error = %e, "responder task failed"),
    }
}

/// Pump frames between a line-oriented connection and a driver's stream.
///
/// Lines read are parsed as `In` and handed to the driver; frames the driver
/// emits are written as `Out` lines. Returns once the driver has dropped its
/// end and everything it sent is written, or once the connection ends. A
/// line over `max_line_bytes` is an error.
pub async fn bridge_frames<In, Out, Rd, Wr>(
    mut reader: Rd,
    mut writer: Wr,
    stream: FrameStream<In, Out>,
    max_line_bytes: usize,
) -> anyhow::Result<()>
where
    In: DeserializeOwned + Send,
    Out: Serialize + Send,
    Rd: AsyncBufRead + Unpin,
    Wr: AsyncWrite + Unpin,
{
    let (tx, mut rx) = stream.into_parts();

    let inbound = async move {
        let mut line = Vec::new();
        while read_line_bounded(&mut reader, &mut line, max_line_bytes).await? > 0 {
            if is_blank(&line) {
                continue;
            }
            let frame: In = serde_json::from_slice(&line)?;
            if tx.send(frame).await.is_err() {
                break;
            }
        }
        anyhow::Ok(())
    };
    let outbound = async move {
        while let Some(frame) = rx.recv().await {
            write_line(&mut writer, &frame).await?;
        }
        anyhow::Ok(())
    };
    tokio::pin!(outbound);

    tokio::select! {
        biased;
        result = inbound => {
            // Connection ended; let the driver notice and flush what it has.
            result?;
            outbound.await
        }
        result = &mut outbound => result,
    }
}

/// Write one JSON value followed by a newline.
pub async fn write_line<W, T>(writer: &mut W, value: &T) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut json = serde_json::to_string(value)?;
    json.push('\n');
    writer.write_all(json.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}
