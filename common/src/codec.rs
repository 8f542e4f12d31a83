//! Chunked transport.
//!
//! A message is serialized to JSON. If the text is longer than the chunk
//! size it travels as a `start`, a run of `chunk`s and an `end` sharing a
//! random session id; otherwise it travels as a single `fullChunk`. The
//! receiving [`Chunker`] reassembles sessions and hands each complete message
//! to its callback.
//!
//! Frames of one session arrive in order. Frames of different sessions may
//! interleave on the same connection.

use std::collections::HashMap;
use std::convert::Infallible;
use std::io;
use std::marker::PhantomData;

use bytes::{Bytes, BytesMut};
use futures::{Sink, SinkExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};
use tracing::{debug, trace};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ChunkError {
    /// A `chunk` or `end` arrived for a session that was never started.
    #[error("unknown chunk session {0}")]
    UnknownSession(Uuid),

    /// Bytes on the wire did not decode to a frame.
    #[error("malformed frame: {0}")]
    MalformedFrame(#[source] serde_json::Error),

    /// A payload failed to serialize, or a reassembled payload failed to
    /// deserialize.
    #[error("payload codec error: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("transport I/O error: {0}")]
    Io(#[from] io::Error),
}

impl From<Infallible> for ChunkError {
    fn from(never: Infallible) -> Self {
        match never {}
    }
}

/// One unit on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Frame {
    Start { id: Uuid },
    Chunk { id: Uuid, data: String },
    End { id: Uuid },
    FullChunk { data: String },
}

type Callback<T> = Box<dyn FnMut(T) + Send + Sync>;

/// Splits outbound messages into frames and reassembles inbound ones.
pub struct Chunker<T> {
    chunk_size: usize,
    sessions: HashMap<Uuid, String>,
    callback: Option<Callback<T>>,
    _message: PhantomData<fn() -> T>,
}

impl<T> Chunker<T>
where
    T: Serialize + DeserializeOwned,
{
    /// A zero chunk size is treated as one byte.
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            sessions: HashMap::new(),
            callback: None,
            _message: PhantomData,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Register the function invoked with every reassembled message. A later
    /// registration replaces the earlier one.
    pub fn register_callback<F>(&mut self, callback: F)
    where
        F: FnMut(T) + Send + Sync + 'static,
    {
        self.callback = Some(Box::new(callback));
    }

    /// Serialize `message` into the frames that carry it, in emission order.
    pub fn frames(&self, message: &T) -> Result<Vec<Frame>, ChunkError> {
        let serialized = serde_json::to_string(message)?;

        if serialized.len() <= self.chunk_size {
            debug!("Serialized message is not too large, sending as one block.");
            return Ok(vec![Frame::FullChunk { data: serialized }]);
        }

        debug!(
            "Serialized message is large ({} bytes), chunking it up.",
            serialized.len()
        );
        let id = Uuid::new_v4();
        let pieces = split_on_char_boundaries(&serialized, self.chunk_size);

        let mut frames = Vec::with_capacity(pieces.len() + 2);
        frames.push(Frame::Start { id });
        frames.extend(pieces.into_iter().map(|piece| Frame::Chunk {
            id,
            data: piece.to_owned(),
        }));
        frames.push(Frame::End { id });
        Ok(frames)
    }

    /// Write `message` to `sink` as frames and flush.
    pub async fn send_message<S>(&self, sink: &mut S, message: &T) -> Result<(), ChunkError>
    where
        S: Sink<Frame> + Unpin,
        S::Error: Into<ChunkError>,
    {
        for frame in self.frames(message)? {
            sink.feed(frame).await.map_err(Into::into)?;
        }
        sink.flush().await.map_err(Into::into)
    }

    /// Feed one inbound frame. Returns the message it completed, if any.
    pub fn feed(&mut self, frame: Frame) -> Result<Option<T>, ChunkError> {
        match frame {
            Frame::Start { id } => {
                trace!("Starting a new chunk for ID {id}");
                self.sessions.insert(id, String::new());
                Ok(None)
            }
            Frame::Chunk { id, data } => {
                trace!("Adding to an existing chunk for ID {id}");
                let buffer = self
                    .sessions
                    .get_mut(&id)
                    .ok_or(ChunkError::UnknownSession(id))?;
                buffer.push_str(&data);
                Ok(None)
            }
            Frame::End { id } => {
                let buffer = self
                    .sessions
                    .remove(&id)
                    .ok_or(ChunkError::UnknownSession(id))?;
                let message = serde_json::from_str(&buffer)?;
                debug!("Rehydrated a stream of chunks ({} bytes).", buffer.len());
                Ok(Some(message))
            }
            Frame::FullChunk { data } => {
                let message = serde_json::from_str(&data)?;
                debug!("Handled a full chunk.");
                Ok(Some(message))
            }
        }
    }

    /// Feed one inbound frame and hand any completed message to the
    /// registered callback.
    pub fn on_message(&mut self, frame: Frame) -> Result<(), ChunkError> {
        if let Some(message) = self.feed(frame)? {
            if let Some(callback) = self.callback.as_mut() {
                callback(message);
            }
        }
        Ok(())
    }

    /// Number of sessions between `start` and `end`.
    pub fn open_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Drop every partially received session.
    pub fn reset(&mut self) {
        self.sessions.clear();
    }
}

/// Cut `text` into pieces of at most `size` bytes without splitting a UTF-8
/// sequence. A character wider than `size` becomes a piece of its own.
fn split_on_char_boundaries(text: &str, size: usize) -> Vec<&str> {
    let mut pieces = Vec::with_capacity(text.len().div_ceil(size));
    let mut rest = text;

    while !rest.is_empty() {
        let mut end = size.min(rest.len());
        while !rest.is_char_boundary(end) {
            end -= 1;
        }
        if end == 0 {
            end = rest.chars().next().map_or(rest.len(), char::len_utf8);
        }

        let (head, tail) = rest.split_at(end);
        pieces.push(head);
        rest = tail;
    }

    pieces
}

/// Length-delimited JSON frames on a byte stream.
#[derive(Debug)]
pub struct FrameCodec {
    inner: LengthDelimitedCodec,
}

impl FrameCodec {
    pub fn new(max_frame_length: usize) -> Self {
        Self {
            inner: LengthDelimitedCodec::builder()
                .max_frame_length(max_frame_length)
                .new_codec(),
        }
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = ChunkError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, ChunkError> {
        match self.inner.decode(src)? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(ChunkError::MalformedFrame),
            None => Ok(None),
        }
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = ChunkError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), ChunkError> {
        let bytes = serde_json::to_vec(&frame)?;
        self.inner.encode(Bytes::from(bytes), dst)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    fn collecting_chunker(chunk_size: usize) -> (Chunker<Vec<u64>>, Arc<Mutex<Vec<Vec<u64>>>>) {
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        let mut chunker = Chunker::new(chunk_size);
        chunker.register_callback(move |message| sink.lock().unwrap().push(message));
        (chunker, received)
    }

    #[tokio::test]
    async fn small_message_is_one_full_chunk() {
        let input: Vec<u64> = (1..5).collect();
        let (mut chunker, received) = collecting_chunker(1024);

        let mut wire: Vec<Frame> = Vec::new();
        chunker.send_message(&mut wire, &input).await.unwrap();

        assert_eq!(wire.len(), 1);
        assert!(matches!(wire[0], Frame::FullChunk { .. }));

        for frame in wire {
            chunker.on_message(frame).unwrap();
        }
        assert_eq!(*received.lock().unwrap(), vec![input]);
        assert_eq!(chunker.open_sessions(), 0);
    }

    #[tokio::test]
    async fn large_message_is_chunked_and_reassembled() {
        let input: Vec<u64> = (1..=500_000).collect();
        let chunk_size = 1024 * 1000;
        let (mut chunker, received) = collecting_chunker(chunk_size);
        let payload_len = serde_json::to_string(&input).unwrap().len();
        assert!(payload_len > chunk_size);

        let mut wire: Vec<Frame> = Vec::new();
        chunker.send_message(&mut wire, &input).await.unwrap();

        assert_eq!(wire.len(), payload_len.div_ceil(chunk_size) + 2);
        assert!(matches!(wire.first(), Some(Frame::Start { .. })));
        assert!(matches!(wire.last(), Some(Frame::End { .. })));
        for frame in &wire[1..wire.len() - 1] {
            match frame {
                Frame::Chunk { data, .. } => assert!(data.len() <= chunk_size),
                other => panic!("expected a chunk, got {other:?}"),
            }
        }

        for frame in wire {
            chunker.on_message(frame).unwrap();
        }
        assert_eq!(*received.lock().unwrap(), vec![input]);
    }

    #[test]
    fn interleaved_sessions_reassemble_independently() {
        let sender: Chunker<Vec<u64>> = Chunker::new(8);
        let first: Vec<u64> = (0..20).collect();
        let second: Vec<u64> = (100..120).collect();
        let a = sender.frames(&first).unwrap();
        let b = sender.frames(&second).unwrap();
        assert!(a.len() > 3 && b.len() > 3);

        let mut interleaved = Vec::new();
        let mut a = a.into_iter();
        let mut b = b.into_iter();
        loop {
            match (a.next(), b.next()) {
                (None, None) => break,
                (x, y) => interleaved.extend(x.into_iter().chain(y)),
            }
        }

        let mut receiver: Chunker<Vec<u64>> = Chunker::new(8);
        let completed: Vec<Vec<u64>> = interleaved
            .into_iter()
            .filter_map(|frame| receiver.feed(frame).unwrap())
            .collect();

        assert_eq!(completed.len(), 2);
        assert!(completed.contains(&first));
        assert!(completed.contains(&second));
    }

    #[test]
    fn chunk_for_unknown_session_is_rejected() {
        let mut chunker: Chunker<Vec<u64>> = Chunker::new(8);
        let id = Uuid::new_v4();

        let err = chunker
            .on_message(Frame::Chunk {
                id,
                data: "[1".into(),
            })
            .unwrap_err();
        assert!(matches!(err, ChunkError::UnknownSession(got) if got == id));

        let err = chunker.on_message(Frame::End { id }).unwrap_err();
        assert!(matches!(err, ChunkError::UnknownSession(_)));
    }

    #[test]
    fn restart_overwrites_a_stale_session() {
        let mut chunker: Chunker<Vec<u64>> = Chunker::new(8);
        let id = Uuid::new_v4();

        chunker.feed(Frame::Start { id }).unwrap();
        chunker
            .feed(Frame::Chunk {
                id,
                data: "garbage".into(),
            })
            .unwrap();
        chunker.feed(Frame::Start { id }).unwrap();
        chunker
            .feed(Frame::Chunk {
                id,
                data: "[7,8]".into(),
            })
            .unwrap();

        assert_eq!(chunker.feed(Frame::End { id }).unwrap(), Some(vec![7, 8]));
    }

    #[test]
    fn multibyte_text_is_not_split_inside_a_character() {
        let sender: Chunker<String> = Chunker::new(3);
        let input = "héllo wörld ✓".to_string();

        let frames = sender.frames(&input).unwrap();
        let mut receiver: Chunker<String> = Chunker::new(3);
        let mut out = None;
        for frame in frames {
            if let Frame::Chunk { data, .. } = &frame {
                assert!(data.len() <= 3);
            }
            out = receiver.feed(frame).unwrap().or(out);
        }
        assert_eq!(out, Some(input));
    }

    #[test]
    fn frames_round_trip_through_the_wire_codec() {
        let mut codec = FrameCodec::new(1024);
        let frame = Frame::Chunk {
            id: Uuid::new_v4(),
            data: r#"{"quoted":"text"}"#.into(),
        };

        let mut buf = BytesMut::new();
        codec.encode(frame.clone(), &mut buf).unwrap();
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(frame));
        assert!(buf.is_empty());
    }

    #[test]
    fn chunker_can_be_held_across_awaits_in_spawned_tasks() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Chunker<crate::Message>>();
    }

    #[tokio::test]
    async fn sending_from_a_spawned_task() {
        let chunker: Chunker<Vec<u64>> = Chunker::new(4);
        let sent = tokio::spawn(async move {
            let mut wire: Vec<Frame> = Vec::new();
            chunker.send_message(&mut wire, &vec![1, 2, 3]).await?;
            Ok::<_, ChunkError>(wire)
        })
        .await
        .unwrap()
        .unwrap();

        let mut receiver: Chunker<Vec<u64>> = Chunker::new(4);
        let out: Vec<_> = sent
            .into_iter()
            .filter_map(|frame| receiver.feed(frame).unwrap())
            .collect();
        assert_eq!(out, vec![vec![1, 2, 3]]);
    }

    #[test]
    fn garbage_frame_is_malformed() {
        let mut codec = FrameCodec::new(1024);
        let mut buf = BytesMut::new();
        LengthDelimitedCodec::new()
            .encode(Bytes::from_static(b"{\"type\":\"nope\"}"), &mut buf)
            .unwrap();

        assert!(matches!(
            codec.decode(&mut buf),
            Err(ChunkError::MalformedFrame(_))
        ));
    }
}
