//! In-memory bidirectional frame streams.
//!
//! A session driver never touches a socket; it reads and writes frames on a
//! [`FrameStream`]. The daemon bridges one end to a Unix socket connection,
//! tests wire two drivers back to back with [`duplex`].

use tokio::sync::mpsc;

use crate::{Result, TransportError};

/// Default number of frames buffered in each direction.
pub const DEFAULT_CAPACITY: usize = 16;

/// One end of a bidirectional channel: sends `S`, receives `R`.
#[derive(Debug)]
pub struct FrameStream<S, R> {
    tx: mpsc::Sender<S>,
    rx: mpsc::Receiver<R>,
}

impl<S, R> FrameStream<S, R> {
    /// Assemble a stream from existing channel halves.
    pub fn from_parts(tx: mpsc::Sender<S>, rx: mpsc::Receiver<R>) -> Self {
        Self { tx, rx }
    }

    pub fn into_parts(self) -> (mpsc::Sender<S>, mpsc::Receiver<R>) {
        (self.tx, self.rx)
    }

    /// Send a frame.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] if the other end was dropped.
    pub async fn send(&self, frame: S) -> Result<()> {
        self.tx.send(frame).await.map_err(|_| TransportError::Closed)
    }

    /// Receive the next frame, or `None` once the other end is gone.
    pub async fn recv(&mut self) -> Option<R> {
        self.rx.recv().await
    }
}

/// Create two connected stream ends.
pub fn duplex<A, B>(capacity: usize) -> (FrameStream<A, B>, FrameStream<B, A>) {
    let (a_tx, a_rx) = mpsc::channel(capacity);
    let (b_tx, b_rx) = mpsc::channel(capacity);
    (
        FrameStream::from_parts(a_tx, b_rx),
        FrameStream::from_parts(b_tx, a_rx),
    )
}
