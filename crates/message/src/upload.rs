//! Uploaded files with move-once semantics.
//!
//! An [`UploadedFile`] is backed either by a path on disk or by a [`Body`].
//! Its stream is opened lazily and cached, and the file can be moved exactly
//! once: after a successful [`UploadedFile::move_to`] neither the stream nor
//! another move is available. Clones share this state.
//!
//! Files received by a server (see [`crate::Environment`]) are moved with a
//! stricter strategy that only accepts regular files and falls back to copy
//! and remove when a rename crosses file systems.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use indexmap::IndexMap;
use tracing::{debug, warn};
use triomphe::Arc;

use crate::protocol::UploadedFileError;
use crate::stream::{Body, Stream};

/// Chunk size used when copying a stream-backed upload to its target.
pub const MOVE_CHUNK_SIZE: usize = 512_000;

/// Outcome of an upload, as reported by the server that received it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UploadErrorCode {
    Ok,
    ExceedsServerLimit,
    ExceedsFormLimit,
    Partial,
    NoFile,
    MissingTmpDir,
    WriteFailed,
    ExtensionStopped,
}

impl UploadErrorCode {
    pub const fn code(self) -> i64 {
        match self {
            UploadErrorCode::Ok => 0,
            UploadErrorCode::ExceedsServerLimit => 1,
            UploadErrorCode::ExceedsFormLimit => 2,
            UploadErrorCode::Partial => 3,
            UploadErrorCode::NoFile => 4,
            UploadErrorCode::MissingTmpDir => 6,
            UploadErrorCode::WriteFailed => 7,
            UploadErrorCode::ExtensionStopped => 8,
        }
    }

    pub const fn description(self) -> &'static str {
        match self {
            UploadErrorCode::Ok => "There is no error, the file uploaded with success.",
            UploadErrorCode::ExceedsServerLimit => "The uploaded file exceeds the maximum upload size of the server.",
            UploadErrorCode::ExceedsFormLimit => {
                "The uploaded file exceeds the MAX_FILE_SIZE directive that was specified in the HTML form."
            }
            UploadErrorCode::Partial => "The uploaded file was only partially uploaded.",
            UploadErrorCode::NoFile => "No file was uploaded.",
            UploadErrorCode::MissingTmpDir => "Missing a temporary folder.",
            UploadErrorCode::WriteFailed => "Failed to write file to disk.",
            UploadErrorCode::ExtensionStopped => "A server extension stopped the file upload.",
        }
    }

    pub const fn is_ok(self) -> bool {
        matches!(self, UploadErrorCode::Ok)
    }
}

impl TryFrom<i64> for UploadErrorCode {
    type Error = UploadedFileError;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(UploadErrorCode::Ok),
            1 => Ok(UploadErrorCode::ExceedsServerLimit),
            2 => Ok(UploadErrorCode::ExceedsFormLimit),
            3 => Ok(UploadErrorCode::Partial),
            4 => Ok(UploadErrorCode::NoFile),
            6 => Ok(UploadErrorCode::MissingTmpDir),
            7 => Ok(UploadErrorCode::WriteFailed),
            8 => Ok(UploadErrorCode::ExtensionStopped),
            _ => Err(UploadedFileError::InvalidUploadError { code }),
        }
    }
}

/// Where the content of an uploaded file lives.
#[derive(Debug, Clone)]
pub enum UploadSource {
    Path(PathBuf),
    Stream(Body),
}

impl From<PathBuf> for UploadSource {
    fn from(path: PathBuf) -> Self {
        UploadSource::Path(path)
    }
}

impl From<&Path> for UploadSource {
    fn from(path: &Path) -> Self {
        UploadSource::Path(path.to_path_buf())
    }
}

impl From<Body> for UploadSource {
    fn from(body: Body) -> Self {
        UploadSource::Stream(body)
    }
}

impl From<Stream> for UploadSource {
    fn from(stream: Stream) -> Self {
        UploadSource::Stream(Body::new(stream))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MoveStrategy {
    Rename,
    // files received by the server itself
    TrustedUpload,
}

#[derive(Debug)]
struct UploadState {
    stream: Option<Body>,
    moved: bool,
}

#[derive(Debug)]
struct Inner {
    path: Option<PathBuf>,
    size: u64,
    error: UploadErrorCode,
    client_filename: Option<String>,
    client_media_type: Option<String>,
    strategy: MoveStrategy,
    state: Mutex<UploadState>,
}

#[derive(Debug, Clone)]
pub struct UploadedFile {
    inner: Arc<Inner>,
}

impl UploadedFile {
    /// Creates an uploaded file.
    ///
    /// `error` must be one of the codes of [`UploadErrorCode`], otherwise
    /// [`UploadedFileError::InvalidUploadError`] is returned.
    pub fn new(
        source: impl Into<UploadSource>,
        size: u64,
        error: i64,
        client_filename: Option<String>,
        client_media_type: Option<String>,
    ) -> Result<Self, UploadedFileError> {
        let error = UploadErrorCode::try_from(error)?;
        Ok(Self::with_strategy(source.into(), size, error, client_filename, client_media_type, MoveStrategy::Rename))
    }

    pub(crate) fn from_server_upload(
        path: PathBuf,
        size: u64,
        error: i64,
        client_filename: Option<String>,
        client_media_type: Option<String>,
    ) -> Result<Self, UploadedFileError> {
        let error = UploadErrorCode::try_from(error)?;
        let source = UploadSource::Path(path);
        Ok(Self::with_strategy(source, size, error, client_filename, client_media_type, MoveStrategy::TrustedUpload))
    }

    fn with_strategy(
        source: UploadSource,
        size: u64,
        error: UploadErrorCode,
        client_filename: Option<String>,
        client_media_type: Option<String>,
        strategy: MoveStrategy,
    ) -> Self {
        let (path, stream) = match source {
            UploadSource::Path(path) => (Some(path), None),
            UploadSource::Stream(body) => (None, Some(body)),
        };

        let inner = Inner {
            path,
            size,
            error,
            client_filename,
            client_media_type,
            strategy,
            state: Mutex::new(UploadState { stream, moved: false }),
        };
        Self { inner: Arc::new(inner) }
    }

    pub fn size(&self) -> u64 {
        self.inner.size
    }

    pub fn error(&self) -> UploadErrorCode {
        self.inner.error
    }

    pub fn client_filename(&self) -> Option<&str> {
        self.inner.client_filename.as_deref()
    }

    pub fn client_media_type(&self) -> Option<&str> {
        self.inner.client_media_type.as_deref()
    }

    /// The client media type, when present and well formed.
    pub fn client_media_type_mime(&self) -> Option<mime::Mime> {
        self.client_media_type()?.parse().ok()
    }

    pub fn is_moved(&self) -> bool {
        self.state().moved
    }

    /// The content of the upload; a path-backed file is opened on first call.
    pub fn stream(&self) -> Result<Body, UploadedFileError> {
        self.ensure_ok()?;

        let mut state = self.state();
        if state.moved {
            return Err(UploadedFileError::AlreadyMoved);
        }

        if let Some(body) = &state.stream {
            return Ok(body.clone());
        }

        let path = self.inner.path.as_deref().ok_or_else(|| UploadedFileError::invalid_argument("no file or stream"))?;
        let body = Body::new(Stream::open(path, "r+")?);
        state.stream = Some(body.clone());
        Ok(body)
    }

    /// Moves the upload to `target`; succeeds at most once.
    pub fn move_to(&self, target: impl AsRef<Path>) -> Result<(), UploadedFileError> {
        let target = target.as_ref();
        self.ensure_ok()?;

        let mut state = self.state();
        if state.moved {
            return Err(UploadedFileError::AlreadyMoved);
        }

        if target.as_os_str().is_empty() {
            return Err(UploadedFileError::invalid_argument("target path must be a non-empty path"));
        }

        let directory = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        if !is_writable_dir(directory) {
            return Err(UploadedFileError::TargetNotWritable { directory: directory.to_path_buf() });
        }

        match (&self.inner.path, &state.stream) {
            (Some(path), _) => self.move_file(path, target)?,
            (None, Some(body)) => copy_stream(body, target)?,
            (None, None) => return Err(UploadedFileError::invalid_argument("no file or stream")),
        }

        state.moved = true;
        debug!(target = %target.display(), size = self.inner.size, "moved uploaded file");
        Ok(())
    }

    fn move_file(&self, path: &Path, target: &Path) -> Result<(), UploadedFileError> {
        match self.inner.strategy {
            MoveStrategy::Rename => fs::rename(path, target).map_err(|e| UploadedFileError::move_failed(target, e)),
            MoveStrategy::TrustedUpload => {
                let is_file = fs::symlink_metadata(path).map(|metadata| metadata.is_file()).unwrap_or(false);
                if !is_file {
                    warn!(path = %path.display(), "refusing to move a path that is not an uploaded regular file");
                    return Err(UploadedFileError::move_failed(
                        target,
                        io::Error::new(io::ErrorKind::InvalidInput, "source is not an uploaded regular file"),
                    ));
                }

                if let Err(e) = fs::rename(path, target) {
                    debug!(error = %e, "rename failed, falling back to copy");
                    fs::copy(path, target).map_err(|e| UploadedFileError::move_failed(target, e))?;
                    fs::remove_file(path).map_err(|e| UploadedFileError::move_failed(target, e))?;
                }
                Ok(())
            }
        }
    }

    fn ensure_ok(&self) -> Result<(), UploadedFileError> {
        if self.inner.error.is_ok() {
            Ok(())
        } else {
            Err(UploadedFileError::UploadError { code: self.inner.error })
        }
    }

    fn state(&self) -> MutexGuard<'_, UploadState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn is_writable_dir(directory: &Path) -> bool {
    fs::metadata(directory).is_ok_and(|metadata| metadata.is_dir() && !metadata.permissions().readonly())
}

fn copy_stream(body: &Body, target: &Path) -> Result<(), UploadedFileError> {
    let mut file = File::create(target).map_err(|e| UploadedFileError::move_failed(target, e))?;

    let mut stream = body.lock();
    if stream.is_seekable() {
        stream.rewind()?;
    }

    while !stream.eof() {
        let chunk = stream.read(MOVE_CHUNK_SIZE)?;
        if chunk.is_empty() {
            break;
        }
        file.write_all(&chunk).map_err(|e| UploadedFileError::move_failed(target, e))?;
    }

    file.flush().map_err(|e| UploadedFileError::move_failed(target, e))
}

/// A tree of uploaded files keyed by form field name.
#[derive(Debug, Clone)]
pub enum UploadedFiles {
    File(UploadedFile),
    Nested(IndexMap<String, UploadedFiles>),
}

impl UploadedFiles {
    pub fn get(&self, key: &str) -> Option<&UploadedFiles> {
        match self {
            UploadedFiles::Nested(map) => map.get(key),
            UploadedFiles::File(_) => None,
        }
    }

    pub fn as_file(&self) -> Option<&UploadedFile> {
        match self {
            UploadedFiles::File(file) => Some(file),
            UploadedFiles::Nested(_) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, UploadedFiles::Nested(map) if map.is_empty())
    }

    /// Every file of the tree, depth first.
    pub fn files(&self) -> Vec<&UploadedFile> {
        let mut files = Vec::new();
        self.collect_files(&mut files);
        files
    }

    fn collect_files<'a>(&'a self, files: &mut Vec<&'a UploadedFile>) {
        match self {
            UploadedFiles::File(file) => files.push(file),
            UploadedFiles::Nested(map) => map.values().for_each(|nested| nested.collect_files(files)),
        }
    }
}

impl Default for UploadedFiles {
    fn default() -> Self {
        UploadedFiles::Nested(IndexMap::new())
    }
}

impl From<UploadedFile> for UploadedFiles {
    fn from(file: UploadedFile) -> Self {
        UploadedFiles::File(file)
    }
}

impl From<IndexMap<String, UploadedFiles>> for UploadedFiles {
    fn from(map: IndexMap<String, UploadedFiles>) -> Self {
        UploadedFiles::Nested(map)
    }
}

impl<K: Into<String>> FromIterator<(K, UploadedFiles)> for UploadedFiles {
    fn from_iter<T: IntoIterator<Item = (K, UploadedFiles)>>(iter: T) -> Self {
        UploadedFiles::Nested(iter.into_iter().map(|(key, value)| (key.into(), value)).collect())
    }
}
