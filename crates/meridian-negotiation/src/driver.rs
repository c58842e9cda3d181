//! Async drivers running a session over a [`FrameStream`].
//!
//! Each wait for a peer frame is bounded by the round timeout and by the
//! session deadline, whichever comes first. On failure the driver aborts the
//! session and tells the peer why with a best-effort `Close` frame.

use std::time::Duration;

use tokio::time::Instant;

use meridian_transport::messages::{RequestFrame, ResponseFrame};
use meridian_transport::stream::FrameStream;

use crate::session::{JoinerSession, NegotiationOutcome, ResponderSession};
use crate::{AbortReason, NegotiationError, Result};

/// Drive a joiner session until it closes or aborts.
pub async fn run_joiner(
    mut session: JoinerSession,
    mut stream: FrameStream<RequestFrame, ResponseFrame>,
) -> Result<NegotiationOutcome> {
    let result = joiner_loop(&mut session, &mut stream).await;
    if let Err(err) = &result {
        session.abort(err.reason());
        notify_close(&stream, err, |reason| RequestFrame::Close { reason }).await;
    }
    result
}

async fn joiner_loop(
    session: &mut JoinerSession,
    stream: &mut FrameStream<RequestFrame, ResponseFrame>,
) -> Result<NegotiationOutcome> {
    let round_timeout = session.config().round_timeout;
    let deadline = Instant::now() + session.config().session_timeout;

    for frame in session.start()? {
        send(stream, frame).await?;
    }
    while !session.is_finished() {
        let frame = recv(stream, round_timeout, deadline).await?;
        tracing::debug!(kind = frame.kind(), session = %session.session_id(), "joiner received");
        if let Some(reply) = session.handle(frame)? {
            send(stream, reply).await?;
        }
    }
    session
        .take_outcome()
        .ok_or_else(|| NegotiationError::ProtocolViolation("closed without outcome".to_string()))
}

/// Drive a responder session until it closes or aborts.
pub async fn run_responder(
    mut session: ResponderSession,
    mut stream: FrameStream<ResponseFrame, RequestFrame>,
) -> Result<NegotiationOutcome> {
    let result = responder_loop(&mut session, &mut stream).await;
    if let Err(err) = &result {
        session.abort(err.reason());
        notify_close(&stream, err, |reason| ResponseFrame::Close { reason }).await;
    }
    result
}

async fn responder_loop(
    session: &mut ResponderSession,
    stream: &mut FrameStream<ResponseFrame, RequestFrame>,
) -> Result<NegotiationOutcome> {
    let round_timeout = session.config().round_timeout;
    let deadline = Instant::now() + session.config().session_timeout;

    while !session.is_finished() {
        let frame = recv(stream, round_timeout, deadline).await?;
        tracing::debug!(kind = frame.kind(), session = %session.session_id(), "responder received");
        for reply in session.handle(frame)? {
            send(stream, reply).await?;
        }
    }
    session
        .take_outcome()
        .ok_or_else(|| NegotiationError::ProtocolViolation("closed without outcome".to_string()))
}

async fn recv<S, R>(
    stream: &mut FrameStream<S, R>,
    round_timeout: Duration,
    deadline: Instant,
) -> Result<R> {
    let round_deadline = (Instant::now() + round_timeout).min(deadline);
    match tokio::time::timeout_at(round_deadline, stream.recv()).await {
        Ok(Some(frame)) => Ok(frame),
        Ok(None) => Err(NegotiationError::PeerClosed("stream ended".to_string())),
        Err(_) if round_deadline == deadline => Err(NegotiationError::SessionTimeout(
            "session deadline passed".to_string(),
        )),
        Err(_) => Err(NegotiationError::SessionTimeout(format!(
            "no frame within {round_timeout:?}"
        ))),
    }
}

async fn send<S, R>(stream: &FrameStream<S, R>, frame: S) -> Result<()> {
    stream
        .send(frame)
        .await
        .map_err(|e| NegotiationError::PeerClosed(e.to_string()))
}

async fn notify_close<S, R>(
    stream: &FrameStream<S, R>,
    err: &NegotiationError,
    close: impl FnOnce(String) -> S,
) {
    if err.reason() == AbortReason::PeerClosed {
        return;
    }
    if stream.send(close(err.reason().to_string())).await.is_err() {
        tracing::debug!("peer gone before close frame");
    }
}
