//! File operations for Holo.
//!
//! This module handles:
//! - Reading outgoing files one piece at a time ([`FileSource`])
//! - Planning piece boundaries ([`PiecePlan`])
//! - Handing completed incoming files to a consumer ([`ArtifactSink`])
//! - Path sanitization and size formatting
//!
//! ## Memory Bounds
//!
//! Sources never load a whole file. The chunker asks for one range at a
//! time, so only a single piece is resident on the sending side.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::protocol::TransferId;

/// Something the chunker can read an outgoing transfer from.
pub trait FileSource: Send {
    /// Total length in bytes.
    fn size(&self) -> u64;

    /// Read exactly `len` bytes starting at `offset`.
    ///
    /// Callers only ask for ranges inside `[0, size)`.
    fn read_range(&mut self, offset: u64, len: usize)
        -> impl Future<Output = Result<Vec<u8>>> + Send;
}

/// A file on the local filesystem.
#[derive(Debug)]
pub struct LocalFileSource {
    path: PathBuf,
    file: tokio::fs::File,
    size: u64,
}

impl LocalFileSource {
    /// Open a regular file for sending.
    ///
    /// # Errors
    ///
    /// Returns an error if the path does not exist, is not a regular file,
    /// or cannot be opened.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|_| Error::FileNotFound(path.display().to_string()))?;
        if !metadata.is_file() {
            return Err(Error::InvalidPath(format!(
                "{} is not a regular file",
                path.display()
            )));
        }

        let file = tokio::fs::File::open(path).await?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
            size: metadata.len(),
        })
    }

    /// The file's base name, used as the transfer's display name.
    #[must_use]
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map_or_else(|| self.path.display().to_string(), |n| n.to_string_lossy().into_owned())
    }

    /// Content type guessed from the file extension.
    #[must_use]
    pub fn mime_type(&self) -> String {
        guess_mime_type(&self.path)
    }
}

impl FileSource for LocalFileSource {
    fn size(&self) -> u64 {
        self.size
    }

    async fn read_range(&mut self, offset: u64, len: usize) -> Result<Vec<u8>> {
        use tokio::io::{AsyncReadExt, AsyncSeekExt};

        self.file.seek(std::io::SeekFrom::Start(offset)).await?;

        let mut buffer = vec![0u8; len];
        self.file.read_exact(&mut buffer).await?;

        Ok(buffer)
    }
}

/// An in-memory source.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    data: Vec<u8>,
}

impl MemorySource {
    /// Wrap a byte buffer.
    #[must_use]
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into() }
    }
}

impl FileSource for MemorySource {
    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    async fn read_range(&mut self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let start = usize::try_from(offset)
            .map_err(|_| Error::Internal(format!("offset {offset} out of range")))?;
        let end = start.saturating_add(len);

        self.data
            .get(start..end)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| {
                Error::Internal(format!(
                    "range {start}..{end} outside source of {} bytes",
                    self.data.len()
                ))
            })
    }
}

/// One planned piece of an outgoing transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Piece {
    /// Byte offset within the file
    pub offset: u64,
    /// Piece length in bytes
    pub len: usize,
    /// Whether this is the last piece
    pub is_final: bool,
}

/// Splits a file of known size into fixed-size pieces.
///
/// Always yields at least one piece: a zero-byte file is a single empty
/// final piece at offset 0.
#[derive(Debug, Clone)]
pub struct PiecePlan {
    size: u64,
    piece_size: usize,
    next_offset: u64,
    done: bool,
}

impl PiecePlan {
    /// Plan pieces of `piece_size` bytes over `size` bytes.
    ///
    /// A `piece_size` of zero is treated as one.
    #[must_use]
    pub fn new(size: u64, piece_size: usize) -> Self {
        Self {
            size,
            piece_size: piece_size.max(1),
            next_offset: 0,
            done: false,
        }
    }

    /// Total number of pieces the plan yields.
    #[must_use]
    pub fn piece_count(&self) -> u64 {
        self.size.div_ceil(self.piece_size as u64).max(1)
    }
}

impl Iterator for PiecePlan {
    type Item = Piece;

    fn next(&mut self) -> Option<Piece> {
        if self.done {
            return None;
        }

        let remaining = self.size - self.next_offset;
        let len = remaining.min(self.piece_size as u64);
        let piece = Piece {
            offset: self.next_offset,
            len: len as usize,
            is_final: len == remaining,
        };

        self.next_offset += len;
        self.done = piece.is_final;

        Some(piece)
    }
}

/// A fully reassembled incoming file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Transfer that produced the artifact
    pub transfer_id: TransferId,
    /// Display name announced by the sender
    pub name: String,
    /// Announced content type
    pub mime_type: String,
    /// File contents
    pub bytes: Vec<u8>,
}

/// Where a delivered artifact can be retrieved from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactHandle {
    /// Written to this path
    Saved(PathBuf),
    /// Held by a [`MemorySink`] under this transfer id
    Memory(TransferId),
}

impl std::fmt::Display for ArtifactHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Saved(path) => write!(f, "{}", path.display()),
            Self::Memory(id) => write!(f, "memory:{id}"),
        }
    }
}

/// Consumer of completed incoming files.
pub trait ArtifactSink: Send + Sync + 'static {
    /// Take ownership of an artifact and return a handle to it.
    fn deliver(&self, artifact: Artifact) -> impl Future<Output = Result<ArtifactHandle>> + Send;
}

/// Saves artifacts as files in a directory.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
    overwrite: bool,
}

impl DirectorySink {
    /// Save into `dir`, creating it on first delivery.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            overwrite: false,
        }
    }

    /// Replace existing files instead of picking a free name.
    #[must_use]
    pub const fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Output directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn create_target(&self, file_name: &str) -> Result<(PathBuf, tokio::fs::File)> {
        let first = self.dir.join(file_name);

        if self.overwrite {
            let file = tokio::fs::File::create(&first).await?;
            return Ok((first, file));
        }

        for attempt in 0..MAX_NAME_ATTEMPTS {
            let candidate = if attempt == 0 {
                first.clone()
            } else {
                self.dir.join(numbered_name(file_name, attempt))
            };

            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&candidate)
                .await
            {
                Ok(file) => return Ok((candidate, file)),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
                Err(e) => return Err(e.into()),
            }
        }

        Err(Error::Internal(format!(
            "no free name for {file_name} in {}",
            self.dir.display()
        )))
    }
}

const MAX_NAME_ATTEMPTS: u32 = 10_000;

impl ArtifactSink for DirectorySink {
    async fn deliver(&self, artifact: Artifact) -> Result<ArtifactHandle> {
        use tokio::io::AsyncWriteExt;

        let file_name = safe_file_name(&artifact.name)?;
        if sanitize_path(&self.dir, Path::new(&file_name)).is_none() {
            return Err(Error::InvalidPath(artifact.name));
        }

        tokio::fs::create_dir_all(&self.dir).await?;

        let (path, mut file) = self.create_target(&file_name).await?;
        file.write_all(&artifact.bytes).await?;
        file.flush().await?;

        tracing::debug!(
            transfer_id = %artifact.transfer_id,
            path = %path.display(),
            bytes = artifact.bytes.len(),
            "Saved artifact"
        );

        Ok(ArtifactHandle::Saved(path))
    }
}

/// Keeps artifacts in memory until taken.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    artifacts: Arc<Mutex<HashMap<TransferId, Artifact>>>,
}

impl MemorySink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a delivered artifact.
    pub async fn get(&self, id: &TransferId) -> Option<Artifact> {
        self.artifacts.lock().await.get(id).cloned()
    }

    /// Remove and return a delivered artifact.
    pub async fn take(&self, id: &TransferId) -> Option<Artifact> {
        self.artifacts.lock().await.remove(id)
    }

    /// Number of artifacts held.
    pub async fn len(&self) -> usize {
        self.artifacts.lock().await.len()
    }

    /// Whether no artifact is held.
    pub async fn is_empty(&self) -> bool {
        self.artifacts.lock().await.is_empty()
    }
}

impl ArtifactSink for MemorySink {
    async fn deliver(&self, artifact: Artifact) -> Result<ArtifactHandle> {
        let id = artifact.transfer_id.clone();
        self.artifacts.lock().await.insert(id.clone(), artifact);
        Ok(ArtifactHandle::Memory(id))
    }
}

/// Reduce an announced name to a single safe file name.
///
/// Names are chosen by the remote peer, so any directory part is dropped
/// and names that try to climb out of the output directory are refused.
///
/// # Errors
///
/// Returns [`Error::InvalidPath`] if the name contains a `..` component or
/// has no usable file name.
pub fn safe_file_name(name: &str) -> Result<String> {
    let parts: Vec<&str> = name.split(['/', '\\']).collect();

    if parts.iter().any(|p| p.trim() == "..") {
        return Err(Error::InvalidPath(name.to_string()));
    }

    let last = parts
        .iter()
        .rev()
        .map(|p| p.trim())
        .find(|p| !p.is_empty() && *p != ".")
        .ok_or_else(|| Error::InvalidPath(name.to_string()))?;

    let cleaned: String = last.chars().filter(|c| !c.is_control()).collect();
    if cleaned.is_empty() {
        return Err(Error::InvalidPath(name.to_string()));
    }

    Ok(cleaned)
}

/// `report.pdf` -> `report (n).pdf`; names without an extension get the
/// suffix at the end.
fn numbered_name(file_name: &str, n: u32) -> String {
    match file_name.rfind('.') {
        Some(dot) if dot > 0 => {
            let (stem, ext) = file_name.split_at(dot);
            format!("{stem} ({n}){ext}")
        }
        _ => format!("{file_name} ({n})"),
    }
}

/// Sanitize a path to prevent directory traversal attacks.
///
/// # Arguments
///
/// * `base` - Base directory
/// * `relative` - Relative path from base
///
/// # Returns
///
/// The sanitized path, or None if the path is invalid.
#[must_use]
pub fn sanitize_path(base: &Path, relative: &Path) -> Option<PathBuf> {
    for component in relative.components() {
        if component == std::path::Component::ParentDir {
            return None;
        }
    }

    let full_path = base.join(relative);

    if full_path.starts_with(base) {
        Some(full_path)
    } else {
        None
    }
}

/// Guess a content type from a path's extension.
#[must_use]
pub fn guess_mime_type(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_raw()
        .unwrap_or(crate::DEFAULT_MIME_TYPE)
        .to_string()
}

/// Format a file size for display.
///
/// Values of 10 or more in their unit, and plain byte counts, are shown
/// without decimals.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if unit == 0 || value >= 10.0 {
        format!("{value:.0} {}", UNITS[unit])
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
