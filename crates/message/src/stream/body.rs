use std::fmt;
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use bytes::Bytes;
use http_body::{Body as HttpBody, Frame, SizeHint};
use triomphe::Arc;

use crate::protocol::StreamError;
use crate::stream::Stream;

/// Size of the frames [`Body`] yields when polled as an [`http_body::Body`].
pub const BODY_FRAME_SIZE: usize = 8 * 1024;

/// A shared handle to the [`Stream`] a message body is backed by.
///
/// Cloning a `Body` does not copy the stream: every message derived from
/// another shares the same body until one of them is given a new one.
#[derive(Clone)]
pub struct Body {
    inner: Arc<Mutex<Stream>>,
}

impl Body {
    pub fn new(stream: Stream) -> Self {
        Self { inner: Arc::new(Mutex::new(stream)) }
    }

    /// Locks the underlying stream for reading, writing or seeking.
    pub fn lock(&self) -> MutexGuard<'_, Stream> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether both handles point at the same stream.
    pub fn ptr_eq(&self, other: &Body) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn size(&self) -> Option<u64> {
        self.lock().size()
    }

    /// The full body, rewinding first when the stream is seekable.
    ///
    /// Any failure yields empty bytes.
    pub fn bytes(&self) -> Bytes {
        self.lock().read_all()
    }
}

impl Default for Body {
    fn default() -> Self {
        Self::new(Stream::temp())
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_lock() {
            Ok(stream) => f.debug_tuple("Body").field(&*stream).finish(),
            Err(_) => f.write_str("Body(<locked>)"),
        }
    }
}

impl fmt::Display for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.lock().to_string_lossy())
    }
}

impl From<Stream> for Body {
    fn from(stream: Stream) -> Self {
        Self::new(stream)
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Self::new(Stream::from_bytes(bytes))
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(Stream::from_bytes(bytes))
    }
}

impl From<String> for Body {
    fn from(content: String) -> Self {
        Self::new(Stream::from_bytes(content))
    }
}

impl From<&str> for Body {
    fn from(content: &str) -> Self {
        Self::new(Stream::from_bytes(content))
    }
}

impl HttpBody for Body {
    type Data = Bytes;
    type Error = StreamError;

    fn poll_frame(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let mut stream = self.lock();
        if stream.eof() {
            return Poll::Ready(None);
        }

        match stream.read(BODY_FRAME_SIZE) {
            Ok(bytes) if bytes.is_empty() => Poll::Ready(None),
            Ok(bytes) => Poll::Ready(Some(Ok(Frame::data(bytes)))),
            Err(e) => Poll::Ready(Some(Err(e))),
        }
    }

    fn is_end_stream(&self) -> bool {
        self.lock().eof()
    }

    fn size_hint(&self) -> SizeHint {
        let mut stream = self.lock();
        if !stream.is_seekable() {
            return SizeHint::default();
        }

        match (stream.size(), stream.tell()) {
            (Some(size), Ok(position)) => SizeHint::with_exact(size.saturating_sub(position)),
            _ => SizeHint::default(),
        }
    }
}
