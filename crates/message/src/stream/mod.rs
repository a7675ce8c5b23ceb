//! Byte streams backing message bodies and uploaded files.
//!
//! A [`Stream`] wraps an underlying [`Handle`] and derives its capabilities
//! once, from the handle kind and the mode string it was opened with:
//!
//! - readable when the mode contains `r` or `+`
//! - writable when the mode contains `w`, `+`, `x`, `c` or `a`
//! - seekable for files and in-memory buffers
//!
//! After [`Stream::detach`] or [`Stream::close`] the stream reports no
//! capability at all and every operation fails with
//! [`StreamError::StreamUnavailable`].
//!
//! Messages hold streams through the shared [`Body`] handle.

mod body;

pub use body::BODY_FRAME_SIZE;
pub use body::Body;

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;

use bytes::Bytes;
use tracing::{debug, trace};

use crate::protocol::StreamError;

/// The resource a [`Stream`] operates on.
pub enum Handle {
    File(File),
    Memory(Cursor<Vec<u8>>),
    Reader(Box<dyn Read + Send>),
    Writer(Box<dyn Write + Send>),
}

impl Handle {
    const fn kind(&self) -> &'static str {
        match self {
            Handle::File(_) => "FILE",
            Handle::Memory(_) => "MEMORY",
            Handle::Reader(_) => "READER",
            Handle::Writer(_) => "WRITER",
        }
    }

    const fn can_read(&self) -> bool {
        !matches!(self, Handle::Writer(_))
    }

    const fn can_write(&self) -> bool {
        !matches!(self, Handle::Reader(_))
    }

    const fn can_seek(&self) -> bool {
        matches!(self, Handle::File(_) | Handle::Memory(_))
    }

    fn reader(&mut self) -> Option<&mut dyn Read> {
        match self {
            Handle::File(file) => Some(file),
            Handle::Memory(cursor) => Some(cursor),
            Handle::Reader(reader) => Some(reader),
            Handle::Writer(_) => None,
        }
    }

    fn writer(&mut self) -> Option<&mut dyn Write> {
        match self {
            Handle::File(file) => Some(file),
            Handle::Memory(cursor) => Some(cursor),
            Handle::Writer(writer) => Some(writer),
            Handle::Reader(_) => None,
        }
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handle::File(file) => f.debug_tuple("File").field(file).finish(),
            Handle::Memory(cursor) => f.debug_struct("Memory").field("len", &cursor.get_ref().len()).finish(),
            Handle::Reader(_) => f.write_str("Reader"),
            Handle::Writer(_) => f.write_str("Writer"),
        }
    }
}

/// Access mode parsed from an `fopen` style mode string such as `"r"`, `"wb+"` or `"a+"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenMode {
    raw: String,
    base: char,
    plus: bool,
}

impl OpenMode {
    pub fn parse(mode: &str) -> Result<Self, StreamError> {
        let mut chars = mode.chars();
        let base = match chars.next() {
            Some(c @ ('r' | 'w' | 'a' | 'x' | 'c')) => c,
            _ => return Err(StreamError::invalid_mode(mode)),
        };

        let mut plus = false;
        for c in chars {
            match c {
                '+' => plus = true,
                'b' | 't' => {}
                _ => return Err(StreamError::invalid_mode(mode)),
            }
        }

        Ok(Self { raw: mode.to_owned(), base, plus })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn is_readable(&self) -> bool {
        self.base == 'r' || self.plus
    }

    pub fn is_writable(&self) -> bool {
        self.base != 'r' || self.plus
    }

    fn open_options(&self) -> OpenOptions {
        let mut options = OpenOptions::new();
        options.read(self.is_readable());
        match self.base {
            'r' => {
                options.write(self.plus);
            }
            'w' => {
                options.write(true).create(true).truncate(true);
            }
            'a' => {
                options.append(true).create(true);
            }
            'x' => {
                options.write(true).create_new(true);
            }
            _ => {
                options.write(true).create(true);
            }
        }
        options
    }
}

/// Metadata describing an attached stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub stream_type: &'static str,
    pub mode: String,
    pub seekable: bool,
    pub uri: Option<String>,
    pub eof: bool,
}

impl Metadata {
    /// Looks up a single entry by key: `stream_type`, `mode`, `seekable`, `uri` or `eof`.
    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "stream_type" => Some(self.stream_type.to_owned()),
            "mode" => Some(self.mode.clone()),
            "seekable" => Some(self.seekable.to_string()),
            "uri" => self.uri.clone(),
            "eof" => Some(self.eof.to_string()),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct Stream {
    handle: Option<Handle>,
    mode: String,
    uri: Option<String>,
    readable: bool,
    writable: bool,
    seekable: bool,
    size: Option<u64>,
    // position and eof of handles that can't seek
    position: u64,
    eof: bool,
}

impl Stream {
    /// Wraps a handle, deriving the capabilities from the handle kind and `mode`.
    pub fn new(handle: Handle, mode: &str) -> Result<Self, StreamError> {
        let open_mode = OpenMode::parse(mode)?;
        Ok(Self::with_mode(handle, &open_mode, None))
    }

    fn with_mode(handle: Handle, mode: &OpenMode, uri: Option<String>) -> Self {
        Self {
            readable: mode.is_readable() && handle.can_read(),
            writable: mode.is_writable() && handle.can_write(),
            seekable: handle.can_seek(),
            handle: Some(handle),
            mode: mode.as_str().to_owned(),
            uri,
            size: None,
            position: 0,
            eof: false,
        }
    }

    /// Opens the file at `path` with an `fopen` style mode.
    pub fn open(path: impl AsRef<Path>, mode: &str) -> Result<Self, StreamError> {
        let path = path.as_ref();
        let open_mode = OpenMode::parse(mode)?;

        let file = open_mode
            .open_options()
            .open(path)
            .map_err(|source| StreamError::Open { path: path.to_path_buf(), source })?;

        trace!(path = %path.display(), mode, "opened stream");
        Ok(Self::with_mode(Handle::File(file), &open_mode, Some(path.display().to_string())))
    }

    /// An empty, readable and writable in-memory stream.
    pub fn temp() -> Self {
        Self::from_bytes(Vec::new())
    }

    /// A readable and writable in-memory stream positioned at the start of `content`.
    pub fn from_bytes(content: impl Into<Vec<u8>>) -> Self {
        let handle = Handle::Memory(Cursor::new(content.into()));
        let mode = OpenMode { raw: "wb+".to_owned(), base: 'w', plus: true };
        Self::with_mode(handle, &mode, None)
    }

    /// A read-only stream over an arbitrary reader, such as a request body pipe.
    pub fn from_reader(reader: impl Read + Send + 'static) -> Self {
        let mode = OpenMode { raw: "r".to_owned(), base: 'r', plus: false };
        Self::with_mode(Handle::Reader(Box::new(reader)), &mode, None)
    }

    pub fn is_readable(&self) -> bool {
        self.readable
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    pub fn is_seekable(&self) -> bool {
        self.seekable
    }

    pub fn is_detached(&self) -> bool {
        self.handle.is_none()
    }

    /// Total size in bytes, when it can be determined.
    pub fn size(&mut self) -> Option<u64> {
        if self.size.is_some() {
            return self.size;
        }

        let size = match self.handle.as_ref()? {
            Handle::File(file) => file.metadata().ok().map(|metadata| metadata.len()),
            Handle::Memory(cursor) => Some(cursor.get_ref().len() as u64),
            Handle::Reader(_) | Handle::Writer(_) => None,
        };
        self.size = size;
        size
    }

    /// Current position of the read/write pointer.
    pub fn tell(&self) -> Result<u64, StreamError> {
        match self.handle.as_ref() {
            None => Err(StreamError::unavailable("tell position")),
            Some(Handle::File(file)) => {
                let mut file = file;
                Ok(file.stream_position()?)
            }
            Some(Handle::Memory(cursor)) => Ok(cursor.position()),
            Some(Handle::Reader(_) | Handle::Writer(_)) => Ok(self.position),
        }
    }

    /// Whether the pointer is at the end of the stream. A detached stream is always at its end.
    pub fn eof(&self) -> bool {
        match self.handle.as_ref() {
            None => true,
            Some(Handle::File(file)) => {
                let mut handle = file;
                match (handle.stream_position(), file.metadata()) {
                    (Ok(position), Ok(metadata)) => position >= metadata.len(),
                    _ => self.eof,
                }
            }
            Some(Handle::Memory(cursor)) => cursor.position() >= cursor.get_ref().len() as u64,
            Some(Handle::Reader(_) | Handle::Writer(_)) => self.eof,
        }
    }

    pub fn seek(&mut self, position: SeekFrom) -> Result<u64, StreamError> {
        let handle = self.handle.as_mut().ok_or_else(|| StreamError::unavailable("seek position"))?;

        let position = match handle {
            Handle::File(file) => file.seek(position)?,
            Handle::Memory(cursor) => cursor.seek(position)?,
            Handle::Reader(_) | Handle::Writer(_) => return Err(StreamError::StreamNotSeekable),
        };
        self.eof = false;
        Ok(position)
    }

    pub fn rewind(&mut self) -> Result<(), StreamError> {
        self.seek(SeekFrom::Start(0)).map(|_| ())
    }

    /// Reads up to `length` bytes, at least one byte is always requested.
    pub fn read(&mut self, length: usize) -> Result<Bytes, StreamError> {
        let handle = self.handle.as_mut().ok_or_else(|| StreamError::unavailable("read"))?;
        if !self.readable {
            return Err(StreamError::StreamNotReadable);
        }
        let reader = handle.reader().ok_or(StreamError::StreamNotReadable)?;

        let length = length.max(1);
        let mut buf = Vec::with_capacity(length.min(BODY_FRAME_SIZE * 64));
        reader.take(length as u64).read_to_end(&mut buf)?;

        if buf.len() < length {
            self.eof = true;
        }
        self.position += buf.len() as u64;
        Ok(Bytes::from(buf))
    }

    /// Writes all of `data`, returning the number of bytes written.
    pub fn write(&mut self, data: &[u8]) -> Result<usize, StreamError> {
        let handle = self.handle.as_mut().ok_or_else(|| StreamError::unavailable("write"))?;
        if !self.writable {
            return Err(StreamError::StreamNotWritable);
        }
        let writer = handle.writer().ok_or(StreamError::StreamNotWritable)?;

        writer.write_all(data)?;
        self.size = None;
        self.position += data.len() as u64;
        Ok(data.len())
    }

    /// Everything from the current position to the end.
    ///
    /// A stream with nothing left yields empty bytes.
    pub fn contents(&mut self) -> Result<Bytes, StreamError> {
        let handle = self.handle.as_mut().ok_or_else(|| StreamError::unavailable("read contents"))?;
        if !self.readable {
            return Err(StreamError::StreamNotReadable);
        }
        let reader = handle.reader().ok_or(StreamError::StreamNotReadable)?;

        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;

        self.eof = true;
        self.position += buf.len() as u64;
        Ok(Bytes::from(buf))
    }

    /// Metadata of the attached handle, `None` once detached.
    pub fn metadata(&self) -> Option<Metadata> {
        let handle = self.handle.as_ref()?;
        Some(Metadata {
            stream_type: handle.kind(),
            mode: self.mode.clone(),
            seekable: self.seekable,
            uri: self.uri.clone(),
            eof: self.eof(),
        })
    }

    /// Separates the underlying handle from the stream, leaving it unusable.
    pub fn detach(&mut self) -> Option<Handle> {
        let handle = self.handle.take()?;

        self.readable = false;
        self.writable = false;
        self.seekable = false;
        self.size = None;
        self.uri = None;
        self.eof = false;

        debug!(stream_type = handle.kind(), "detached stream");
        Some(handle)
    }

    /// Detaches and releases the underlying handle; closing twice has no effect.
    pub fn close(&mut self) {
        if let Some(handle) = self.detach() {
            flush(handle);
        }
    }

    /// Rewinds when possible and reads everything; any failure yields an empty string.
    pub fn to_string_lossy(&mut self) -> String {
        String::from_utf8_lossy(&self.read_all()).into_owned()
    }

    pub(crate) fn read_all(&mut self) -> Bytes {
        if self.seekable && self.rewind().is_err() {
            return Bytes::new();
        }
        self.contents().unwrap_or_default()
    }
}

fn flush(handle: Handle) {
    let result = match handle {
        Handle::File(mut file) => file.flush(),
        Handle::Writer(mut writer) => writer.flush(),
        Handle::Memory(_) | Handle::Reader(_) => Ok(()),
    };

    if let Err(e) = result {
        debug!(error = %e, "failed to flush stream on close");
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        self.close();
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let bytes = Stream::read(self, buf.len()).map_err(io::Error::other)?;
        buf[..bytes.len()].copy_from_slice(&bytes);
        Ok(bytes.len())
    }
}
