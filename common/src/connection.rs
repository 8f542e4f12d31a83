//! Message-level connections over TCP.
//!
//! A socket is split into a [`MessageReader`] and a [`MessageWriter`], each
//! with its own [`Chunker`]. Writers are usually moved into a background task
//! with [`MessageWriter::spawn`] so any number of handlers can send through a
//! cloned [`Outbox`].

use futures::StreamExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, error, warn};

use crate::codec::{ChunkError, Chunker, FrameCodec};
use crate::message::Message;
use crate::{MAX_CHUNK_SIZE, MAX_FRAME_LENGTH};

/// Sending half of a spawned writer.
pub type Outbox = mpsc::UnboundedSender<Message>;

/// Split a connected socket into its reading and writing halves.
///
/// `chunk_size` is clamped to [`MAX_CHUNK_SIZE`].
pub fn split(stream: TcpStream, chunk_size: usize) -> (MessageReader, MessageWriter) {
    if let Err(e) = stream.set_nodelay(true) {
        warn!("Failed to set TCP_NODELAY: {e}");
    }

    let chunk_size = chunk_size.min(MAX_CHUNK_SIZE);
    let (read, write) = stream.into_split();

    let reader = MessageReader {
        frames: FramedRead::new(read, FrameCodec::new(MAX_FRAME_LENGTH)),
        chunker: Chunker::new(chunk_size),
    };
    let writer = MessageWriter {
        frames: FramedWrite::new(write, FrameCodec::new(MAX_FRAME_LENGTH)),
        chunker: Chunker::new(chunk_size),
    };
    (reader, writer)
}

pub struct MessageReader {
    frames: FramedRead<OwnedReadHalf, FrameCodec>,
    chunker: Chunker<Message>,
}

impl MessageReader {
    /// Wait for the next complete message. `Ok(None)` means the peer closed
    /// the connection.
    ///
    /// On a protocol error every open session on this connection is
    /// discarded; the caller is expected to drop the connection.
    ///
    /// Cancel safe: partially received sessions stay buffered.
    pub async fn recv(&mut self) -> Result<Option<Message>, ChunkError> {
        while let Some(frame) = self.frames.next().await {
            let fed = frame.and_then(|frame| self.chunker.feed(frame));
            match fed {
                Ok(Some(message)) => {
                    debug!("Received a `{}` message.", message.kind());
                    return Ok(Some(message));
                }
                Ok(None) => {}
                Err(e) => {
                    self.chunker.reset();
                    return Err(e);
                }
            }
        }

        if self.chunker.open_sessions() > 0 {
            warn!(
                "Connection closed with {} unfinished chunk sessions.",
                self.chunker.open_sessions()
            );
            self.chunker.reset();
        }
        Ok(None)
    }
}

pub struct MessageWriter {
    frames: FramedWrite<OwnedWriteHalf, FrameCodec>,
    chunker: Chunker<Message>,
}

impl MessageWriter {
    pub async fn send(&mut self, message: &Message) -> Result<(), ChunkError> {
        debug!("Sending a `{}` message.", message.kind());
        self.chunker.send_message(&mut self.frames, message).await
    }

    /// Move the writer into a task that drains the returned outbox in order.
    /// The task ends when every outbox clone is dropped or a write fails.
    pub fn spawn(mut self) -> Outbox {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Message>();

        tokio::spawn(async move {
            while let Some(message) = receiver.recv().await {
                if let Err(e) = self.send(&message).await {
                    error!("Failed to write a `{}` message: {e}", message.kind());
                    break;
                }
            }
        });

        sender
    }
}
