//! Deterministic recording and playback of authoritative command streams.
//!
//! A [`Recorder`] appends every confirmed command to a write target as it is
//! applied, so a session can be reproduced exactly by replaying the file.
//! A [`Player`] owns a [`CommandSource`] and hands commands back to the
//! engine's normal apply path, which makes playback indistinguishable from
//! network input.
//!
//! Two formats are supported, selected by file extension:
//!
//! - **text** (`.jsonl` / `.txt`): a JSON header line followed by one
//!   JSON-encoded command per line. Diffable and greppable.
//! - **binary** (anything else): a fixed magic/version/flags header followed
//!   by u32-length-prefixed protobuf records from `commands::encode_command`.
//!
//! Both headers carry a `resume_from_dump` flag so a player can tell a
//! stream that begins with a full-state dump ("resume from dump") apart
//! from one that must be replayed from an empty canvas.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use commands::{Command, decode_command, encode_command};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;

const BINARY_MAGIC: [u8; 4] = *b"ESLR";
const TEXT_MAGIC: &str = "easel-recording";
const FORMAT_VERSION: u8 = 1;
const FLAG_RESUME_FROM_DUMP: u8 = 0x01;

/// Upper bound on a single binary record. Anything larger is treated as a
/// corrupt length prefix rather than an allocation request.
const MAX_RECORD_LEN: u32 = 64 * 1024 * 1024;

/// On-disk encoding of a recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// JSON header line plus one JSON command per line.
    Text,
    /// Magic header plus length-prefixed protobuf records.
    Binary,
}

impl Format {
    /// Pick the format for a path: `.jsonl`/`.txt` record as text,
    /// everything else as binary.
    #[must_use]
    pub fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("jsonl" | "txt") => Self::Text,
            _ => Self::Binary,
        }
    }
}

/// Self-describing recording header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version: u32,
    /// Whether the stream begins with a full-state dump that reproduces the
    /// canvas as it was when recording started.
    pub resume_from_dump: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct TextHeader {
    magic: String,
    version: u32,
    resume_from_dump: bool,
}

/// Error raised while writing a recording.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    /// The write target could not be acquired. Distinct from write failures
    /// so callers can report "could not start recording" precisely.
    #[error("failed to open recording target {path}: {source}")]
    Open { path: PathBuf, source: io::Error },
    /// A write or flush on an already-open target failed.
    #[error("failed to write recording: {0}")]
    Io(#[from] io::Error),
}

/// Error raised while reading a recording. End-of-stream is *not* an error;
/// sources signal it with `Ok(None)`.
#[derive(Debug, thiserror::Error)]
pub enum PlayError {
    /// The source could not be acquired.
    #[error("failed to open recording source {path}: {source}")]
    Open { path: PathBuf, source: io::Error },
    /// A read on an already-open source failed.
    #[error("failed to read recording: {0}")]
    Io(#[from] io::Error),
    /// The stream contents are not a valid recording.
    #[error("corrupt recording at record {index}: {reason}")]
    Corrupt { index: u64, reason: String },
}

// =============================================================================
// RECORDER
// =============================================================================

/// Scoped append-only writer for an authoritative command stream.
///
/// All buffered output is flushed by [`Recorder::finish`]; dropping an
/// unfinished recorder flushes best-effort and logs instead of failing.
pub struct Recorder {
    writer: BufWriter<Box<dyn Write + Send>>,
    format: Format,
    header: Header,
    records: u64,
    finished: bool,
}

impl Recorder {
    /// Create a recording file at `path`, picking the format from the
    /// extension, and write the header.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::Open`] if the file cannot be created, and
    /// [`RecordError::Io`] if the header write fails.
    pub fn create(path: &Path, resume_from_dump: bool) -> Result<Self, RecordError> {
        let file = File::create(path)
            .map_err(|source| RecordError::Open { path: path.to_path_buf(), source })?;
        let recorder =
            Self::from_writer(Box::new(file), Format::for_path(path), resume_from_dump)?;
        info!(path = %path.display(), format = ?recorder.format, "recording started");
        Ok(recorder)
    }

    /// Wrap an arbitrary write target and write the header immediately.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::Io`] if the header write fails.
    pub fn from_writer(
        target: Box<dyn Write + Send>,
        format: Format,
        resume_from_dump: bool,
    ) -> Result<Self, RecordError> {
        let mut recorder = Self {
            writer: BufWriter::new(target),
            format,
            header: Header { version: u32::from(FORMAT_VERSION), resume_from_dump },
            records: 0,
            finished: false,
        };
        recorder.write_header()?;
        Ok(recorder)
    }

    fn write_header(&mut self) -> Result<(), RecordError> {
        match self.format {
            Format::Text => {
                let header = TextHeader {
                    magic: TEXT_MAGIC.to_owned(),
                    version: self.header.version,
                    resume_from_dump: self.header.resume_from_dump,
                };
                // TextHeader is a plain struct of scalars; serialization
                // cannot fail.
                let line = serde_json::to_string(&header).unwrap_or_default();
                self.writer.write_all(line.as_bytes())?;
                self.writer.write_all(b"\n")?;
            }
            Format::Binary => {
                let mut flags = 0u8;
                if self.header.resume_from_dump {
                    flags |= FLAG_RESUME_FROM_DUMP;
                }
                self.writer.write_all(&BINARY_MAGIC)?;
                self.writer.write_all(&[FORMAT_VERSION, flags])?;
            }
        }
        Ok(())
    }

    /// Append one command.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::Io`] on write failure.
    pub fn record(&mut self, command: &Command) -> Result<(), RecordError> {
        match self.format {
            Format::Text => {
                // Command serializes through the same closed Payload enum as
                // the wire codec; this cannot fail.
                let line = serde_json::to_string(command).unwrap_or_default();
                self.writer.write_all(line.as_bytes())?;
                self.writer.write_all(b"\n")?;
            }
            Format::Binary => {
                let bytes = encode_command(command);
                let len = u32::try_from(bytes.len()).map_err(|_| {
                    RecordError::Io(io::Error::other("command exceeds record size limit"))
                })?;
                self.writer.write_all(&len.to_le_bytes())?;
                self.writer.write_all(&bytes)?;
            }
        }
        self.records += 1;
        Ok(())
    }

    /// Flush everything and release the target. Returns the record count.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::Io`] if the final flush fails.
    pub fn finish(mut self) -> Result<u64, RecordError> {
        self.writer.flush()?;
        self.finished = true;
        info!(records = self.records, "recording stopped");
        Ok(self.records)
    }

    /// Number of commands recorded so far.
    #[must_use]
    pub fn records(&self) -> u64 {
        self.records
    }

    /// The header written at the start of this recording.
    #[must_use]
    pub fn header(&self) -> Header {
        self.header
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.writer.flush() {
                warn!(error = %e, "recorder dropped without finish; flush failed");
            }
        }
    }
}

// =============================================================================
// SOURCES
// =============================================================================

/// An ordered source of commands for playback. `Ok(None)` is a clean
/// end-of-stream; errors mean the source itself failed or is corrupt.
pub trait CommandSource {
    /// The header describing this stream.
    fn header(&self) -> Header;

    /// The next command, or `Ok(None)` at end-of-stream.
    ///
    /// # Errors
    ///
    /// Returns [`PlayError`] when the source fails or its contents are
    /// corrupt.
    fn next_command(&mut self) -> Result<Option<Command>, PlayError>;
}

/// File-backed command source for either recording format.
pub struct RecordingFile {
    header: Header,
    reader: FileReader,
    index: u64,
}

enum FileReader {
    Text(BufReader<File>),
    Binary(BufReader<File>),
}

impl RecordingFile {
    /// Open a recording and validate its header.
    ///
    /// # Errors
    ///
    /// Returns [`PlayError::Open`] if the file cannot be opened and
    /// [`PlayError::Corrupt`] if the header is not a valid recording header.
    pub fn open(path: &Path) -> Result<Self, PlayError> {
        let file = File::open(path)
            .map_err(|source| PlayError::Open { path: path.to_path_buf(), source })?;
        match Format::for_path(path) {
            Format::Text => Self::open_text(file),
            Format::Binary => Self::open_binary(file),
        }
    }

    fn open_text(file: File) -> Result<Self, PlayError> {
        let mut reader = BufReader::new(file);
        let mut line = String::new();
        reader.read_line(&mut line)?;
        let header: TextHeader = serde_json::from_str(line.trim_end()).map_err(|e| {
            PlayError::Corrupt { index: 0, reason: format!("bad text header: {e}") }
        })?;
        if header.magic != TEXT_MAGIC {
            return Err(PlayError::Corrupt {
                index: 0,
                reason: format!("unexpected magic {:?}", header.magic),
            });
        }
        Ok(Self {
            header: Header {
                version: header.version,
                resume_from_dump: header.resume_from_dump,
            },
            reader: FileReader::Text(reader),
            index: 0,
        })
    }

    fn open_binary(file: File) -> Result<Self, PlayError> {
        let mut reader = BufReader::new(file);
        let mut head = [0u8; 6];
        reader.read_exact(&mut head).map_err(|e| PlayError::Corrupt {
            index: 0,
            reason: format!("short binary header: {e}"),
        })?;
        if head[..4] != BINARY_MAGIC {
            return Err(PlayError::Corrupt {
                index: 0,
                reason: "unexpected magic bytes".to_owned(),
            });
        }
        Ok(Self {
            header: Header {
                version: u32::from(head[4]),
                resume_from_dump: head[5] & FLAG_RESUME_FROM_DUMP != 0,
            },
            reader: FileReader::Binary(reader),
            index: 0,
        })
    }

    fn next_text(reader: &mut BufReader<File>, index: u64) -> Result<Option<Command>, PlayError> {
        let mut line = String::new();
        loop {
            line.clear();
            let n = reader.read_line(&mut line)?;
            if n == 0 {
                return Ok(None);
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            return serde_json::from_str(trimmed)
                .map(Some)
                .map_err(|e| PlayError::Corrupt { index, reason: e.to_string() });
        }
    }

    fn next_binary(reader: &mut BufReader<File>, index: u64) -> Result<Option<Command>, PlayError> {
        let mut len_buf = [0u8; 4];
        // A clean stream ends exactly on a record boundary; anything between
        // zero and four length bytes is a truncated recording.
        let mut filled = 0usize;
        while filled < 4 {
            let n = reader.read(&mut len_buf[filled..])?;
            if n == 0 {
                if filled == 0 {
                    return Ok(None);
                }
                return Err(PlayError::Corrupt {
                    index,
                    reason: "truncated record length".to_owned(),
                });
            }
            filled += n;
        }
        let len = u32::from_le_bytes(len_buf);
        if len > MAX_RECORD_LEN {
            return Err(PlayError::Corrupt {
                index,
                reason: format!("record length {len} exceeds limit"),
            });
        }
        let mut bytes = vec![0u8; len as usize];
        reader.read_exact(&mut bytes).map_err(|e| PlayError::Corrupt {
            index,
            reason: format!("truncated record body: {e}"),
        })?;
        decode_command(&bytes)
            .map(Some)
            .map_err(|e| PlayError::Corrupt { index, reason: e.to_string() })
    }
}

impl CommandSource for RecordingFile {
    fn header(&self) -> Header {
        self.header
    }

    fn next_command(&mut self) -> Result<Option<Command>, PlayError> {
        let result = match &mut self.reader {
            FileReader::Text(reader) => Self::next_text(reader, self.index),
            FileReader::Binary(reader) => Self::next_binary(reader, self.index),
        };
        if matches!(result, Ok(Some(_))) {
            self.index += 1;
        }
        result
    }
}

/// In-memory command source, for tests and synthetic playback.
pub struct VecSource {
    commands: std::vec::IntoIter<Command>,
    header: Header,
}

impl VecSource {
    /// A source that replays `commands` from an empty canvas.
    #[must_use]
    pub fn new(commands: Vec<Command>) -> Self {
        Self {
            commands: commands.into_iter(),
            header: Header { version: u32::from(FORMAT_VERSION), resume_from_dump: false },
        }
    }

    /// Mark this source as beginning with a full-state dump.
    #[must_use]
    pub fn with_dump(mut self) -> Self {
        self.header.resume_from_dump = true;
        self
    }
}

impl CommandSource for VecSource {
    fn header(&self) -> Header {
        self.header
    }

    fn next_command(&mut self) -> Result<Option<Command>, PlayError> {
        Ok(self.commands.next())
    }
}

// =============================================================================
// PLAYER
// =============================================================================

/// Playback cursor over a [`CommandSource`].
///
/// The player owns its source, so callers cannot tell a recording file from
/// a synthetic generator. Once the source reports end-of-stream the player
/// stays finished.
pub struct Player {
    source: Box<dyn CommandSource>,
    position: u64,
    finished: bool,
}

impl Player {
    /// Wrap a source, taking ownership of it.
    #[must_use]
    pub fn new(source: Box<dyn CommandSource>) -> Self {
        Self { source, position: 0, finished: false }
    }

    /// Open a recording file for playback.
    ///
    /// # Errors
    ///
    /// Returns [`PlayError`] if the file cannot be opened or its header is
    /// invalid.
    pub fn from_file(path: &Path) -> Result<Self, PlayError> {
        Ok(Self::new(Box::new(RecordingFile::open(path)?)))
    }

    /// Whether the stream begins with a full-state dump.
    #[must_use]
    pub fn resume_from_dump(&self) -> bool {
        self.source.header().resume_from_dump
    }

    /// Number of commands handed out so far.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Whether the source has reported end-of-stream.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// The next command, or `Ok(None)` once the stream ends.
    ///
    /// # Errors
    ///
    /// Propagates source failures as [`PlayError`]; playback stops there.
    pub fn next_command(&mut self) -> Result<Option<Command>, PlayError> {
        if self.finished {
            return Ok(None);
        }
        match self.source.next_command() {
            Ok(Some(command)) => {
                self.position += 1;
                Ok(Some(command))
            }
            Ok(None) => {
                self.finished = true;
                info!(position = self.position, "playback reached end of stream");
                Ok(None)
            }
            Err(e) => {
                self.finished = true;
                Err(e)
            }
        }
    }

    /// Up to `max` commands; shorter only at end-of-stream.
    ///
    /// # Errors
    ///
    /// Propagates source failures as [`PlayError`]. Commands read before the
    /// failure are lost; callers treat the whole batch as failed.
    pub fn next_batch(&mut self, max: usize) -> Result<Vec<Command>, PlayError> {
        let mut batch = Vec::with_capacity(max.min(64));
        while batch.len() < max {
            match self.next_command()? {
                Some(command) => batch.push(command),
                None => break,
            }
        }
        Ok(batch)
    }
}
