//! Binary snapshot storage for the vectorizer and vector index.
//!
//! File format (all integers little-endian):
//!
//! Header (33 bytes):
//! - magic: [u8; 4] (`KSTO`)
//! - version: u8 (1)
//! - dimensions: u32
//! - entry_count: u64
//! - next_id: u64
//! - vectorizer_len: u32 (0 when the vectorizer was never fitted)
//! - checksum: u32 (CRC32 of header fields before checksum)
//!
//! Body:
//! - vectorizer: [u8; vectorizer_len] (JSON)
//! - entries (repeated entry_count times):
//!   - id: u64
//!   - metadata_len: u32
//!   - metadata: [u8; metadata_len] (JSON object)
//!   - vector: [f32; dimensions]
//! - checksum: u32 (CRC32 of the body bytes before it)

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::semantic::index::{FlatIndex, IndexEntry};
use crate::semantic::metadata::Metadata;
use crate::semantic::vectorizer::TfIdfVectorizer;

/// File magic
const MAGIC: [u8; 4] = *b"KSTO";

/// Current file format version
const FORMAT_VERSION: u8 = 1;

/// Header size in bytes: magic(4) + version(1) + dimensions(4) + entry_count(8)
/// + next_id(8) + vectorizer_len(4) + checksum(4)
const HEADER_SIZE: usize = 33;

/// Upper bound for a single metadata blob; anything larger is corruption
const MAX_METADATA_LEN: u32 = 16 * 1024 * 1024;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("Version mismatch: file version {0}, supported version {1}")]
    VersionMismatch(u8, u8),

    #[error("Checksum mismatch: file may be corrupted")]
    ChecksumMismatch,

    #[error("Dimension mismatch: expected {expected}, file has {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// Contents of a snapshot file.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub vectorizer: Option<TfIdfVectorizer>,
    pub index: FlatIndex,
}

/// Storage manager for store snapshots.
pub struct VectorStorage {
    path: PathBuf,
}

impl VectorStorage {
    /// Create a new storage manager for the given path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Load a snapshot, checking that it was written with `expected_dimensions`.
    pub fn load(&self, expected_dimensions: usize) -> Result<Snapshot, StorageError> {
        let file = File::open(&self.path)?;
        let mut reader = BufReader::new(file);

        let header = Self::read_header(&mut reader)?;
        if header.dimensions as usize != expected_dimensions {
            return Err(StorageError::DimensionMismatch {
                expected: expected_dimensions,
                got: header.dimensions as usize,
            });
        }

        let mut body = ChecksumReader::new(&mut reader);
        let dimensions = header.dimensions as usize;

        let vectorizer = if header.vectorizer_len == 0 {
            None
        } else {
            let bytes = read_vec(&mut body, header.vectorizer_len as usize)?;
            let vectorizer: TfIdfVectorizer = serde_json::from_slice(&bytes)
                .map_err(|e| StorageError::InvalidFormat(format!("vectorizer: {e}")))?;
            if vectorizer.dimensions() != dimensions {
                return Err(StorageError::InvalidFormat(format!(
                    "vectorizer produces {} dimensions, header says {}",
                    vectorizer.dimensions(),
                    dimensions
                )));
            }
            vectorizer
                .validate()
                .map_err(|e| StorageError::InvalidFormat(format!("vectorizer: {e}")))?;
            Some(vectorizer)
        };

        let capacity = usize::try_from(header.entry_count).unwrap_or(0).min(1 << 20);
        let mut entries = Vec::with_capacity(capacity);
        for _ in 0..header.entry_count {
            entries.push(Self::read_entry(&mut body, dimensions)?);
        }

        let computed = body.finalize();
        let stored = read_u32(&mut reader)?;
        if stored != computed {
            return Err(StorageError::ChecksumMismatch);
        }

        let mut trailing = [0u8; 1];
        if reader.read(&mut trailing)? != 0 {
            return Err(StorageError::InvalidFormat("trailing data after checksum".into()));
        }

        let index = FlatIndex::from_parts(dimensions, entries, header.next_id)
            .map_err(|e| StorageError::InvalidFormat(e.to_string()))?;

        Ok(Snapshot { vectorizer, index })
    }

    /// Save a snapshot of `vectorizer` and `index`.
    ///
    /// Uses atomic write: temp file -> fsync -> rename
    pub fn save(
        &self,
        vectorizer: Option<&TfIdfVectorizer>,
        index: &FlatIndex,
    ) -> Result<(), StorageError> {
        let temp_path = self.path.with_extension("tmp");

        let result = Self::write_to_file(&temp_path, vectorizer, index);

        if result.is_err() {
            // Clean up temp file on error
            let _ = std::fs::remove_file(&temp_path);
            return result;
        }

        std::fs::rename(&temp_path, &self.path)?;

        Ok(())
    }

    fn write_to_file(
        path: &Path,
        vectorizer: Option<&TfIdfVectorizer>,
        index: &FlatIndex,
    ) -> Result<(), StorageError> {
        let vectorizer_bytes = match vectorizer {
            Some(v) => serde_json::to_vec(v)
                .map_err(|e| StorageError::InvalidFormat(format!("vectorizer: {e}")))?,
            None => Vec::new(),
        };

        let dimensions = u32::try_from(index.dimensions()).map_err(|_| {
            StorageError::InvalidFormat(format!("dimensions {} exceed u32", index.dimensions()))
        })?;
        let vectorizer_len = u32::try_from(vectorizer_bytes.len())
            .map_err(|_| StorageError::InvalidFormat("vectorizer state too large".into()))?;

        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        let header = Header {
            version: FORMAT_VERSION,
            dimensions,
            entry_count: index.len() as u64,
            next_id: index.next_id(),
            vectorizer_len,
        };
        Self::write_header(&mut writer, &header)?;

        let mut body = ChecksumWriter::new(&mut writer);
        body.write_all(&vectorizer_bytes)?;
        for entry in index.iter() {
            Self::write_entry(&mut body, entry)?;
        }
        let checksum = body.finalize();
        writer.write_all(&checksum.to_le_bytes())?;

        // Flush and sync
        writer.flush()?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;

        Ok(())
    }

    fn read_header(reader: &mut impl Read) -> Result<Header, StorageError> {
        let mut header_bytes = [0u8; HEADER_SIZE];
        reader.read_exact(&mut header_bytes).map_err(truncated)?;

        if header_bytes[0..4] != MAGIC {
            return Err(StorageError::InvalidFormat("not a knowledge store snapshot".into()));
        }

        let version = header_bytes[4];
        if version > FORMAT_VERSION {
            return Err(StorageError::VersionMismatch(version, FORMAT_VERSION));
        }

        let stored_checksum = u32::from_le_bytes(le_array(&header_bytes[29..33]));
        let computed_checksum = crc32fast::hash(&header_bytes[0..29]);
        if stored_checksum != computed_checksum {
            return Err(StorageError::ChecksumMismatch);
        }

        Ok(Header {
            version,
            dimensions: u32::from_le_bytes(le_array(&header_bytes[5..9])),
            entry_count: u64::from_le_bytes(le_array(&header_bytes[9..17])),
            next_id: u64::from_le_bytes(le_array(&header_bytes[17..25])),
            vectorizer_len: u32::from_le_bytes(le_array(&header_bytes[25..29])),
        })
    }

    fn write_header(writer: &mut impl Write, header: &Header) -> Result<(), StorageError> {
        let mut header_bytes = [0u8; HEADER_SIZE];

        header_bytes[0..4].copy_from_slice(&MAGIC);
        header_bytes[4] = header.version;
        header_bytes[5..9].copy_from_slice(&header.dimensions.to_le_bytes());
        header_bytes[9..17].copy_from_slice(&header.entry_count.to_le_bytes());
        header_bytes[17..25].copy_from_slice(&header.next_id.to_le_bytes());
        header_bytes[25..29].copy_from_slice(&header.vectorizer_len.to_le_bytes());

        let checksum = crc32fast::hash(&header_bytes[0..29]);
        header_bytes[29..33].copy_from_slice(&checksum.to_le_bytes());

        writer.write_all(&header_bytes)?;
        Ok(())
    }

    fn read_entry(reader: &mut impl Read, dimensions: usize) -> Result<IndexEntry, StorageError> {
        let id = read_u64(reader)?;

        let metadata_len = read_u32(reader)?;
        if metadata_len > MAX_METADATA_LEN {
            return Err(StorageError::InvalidFormat(format!(
                "metadata for entry {id} claims {metadata_len} bytes"
            )));
        }
        let metadata_bytes = read_vec(reader, metadata_len as usize)?;
        let metadata: Metadata = serde_json::from_slice(&metadata_bytes)
            .map_err(|e| StorageError::InvalidFormat(format!("metadata for entry {id}: {e}")))?;

        let vector_bytes = read_vec(reader, dimensions * 4)?;
        let vector = vector_bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes(le_array(b)))
            .collect();

        Ok(IndexEntry {
            id,
            vector,
            metadata,
        })
    }

    fn write_entry(writer: &mut impl Write, entry: &IndexEntry) -> Result<(), StorageError> {
        let metadata = serde_json::to_vec(&entry.metadata)
            .map_err(|e| StorageError::InvalidFormat(format!("metadata for entry {}: {e}", entry.id)))?;
        let metadata_len = u32::try_from(metadata.len())
            .ok()
            .filter(|len| *len <= MAX_METADATA_LEN)
            .ok_or_else(|| {
                StorageError::InvalidFormat(format!("metadata for entry {} is too large", entry.id))
            })?;

        writer.write_all(&entry.id.to_le_bytes())?;
        writer.write_all(&metadata_len.to_le_bytes())?;
        writer.write_all(&metadata)?;
        for &value in &entry.vector {
            writer.write_all(&value.to_le_bytes())?;
        }

        Ok(())
    }
}

/// File header structure.
#[derive(Debug)]
struct Header {
    version: u8,
    dimensions: u32,
    entry_count: u64,
    next_id: u64,
    vectorizer_len: u32,
}

/// Writer that tracks a CRC32 of everything written through it.
struct ChecksumWriter<W> {
    inner: W,
    hasher: crc32fast::Hasher,
}

impl<W: Write> ChecksumWriter<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: crc32fast::Hasher::new(),
        }
    }

    fn finalize(self) -> u32 {
        self.hasher.finalize()
    }
}

impl<W: Write> Write for ChecksumWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.hasher.update(&buf[..written]);
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Reader that tracks a CRC32 of everything read through it.
struct ChecksumReader<R> {
    inner: R,
    hasher: crc32fast::Hasher,
}

impl<R: Read> ChecksumReader<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            hasher: crc32fast::Hasher::new(),
        }
    }

    fn finalize(self) -> u32 {
        self.hasher.finalize()
    }
}

impl<R: Read> Read for ChecksumReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read = self.inner.read(buf)?;
        self.hasher.update(&buf[..read]);
        Ok(read)
    }
}

fn truncated(err: io::Error) -> StorageError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        StorageError::InvalidFormat("file is truncated".into())
    } else {
        StorageError::Io(err)
    }
}

fn read_vec(reader: &mut impl Read, len: usize) -> Result<Vec<u8>, StorageError> {
    let mut buf = Vec::new();
    reader
        .take(len as u64)
        .read_to_end(&mut buf)
        .map_err(StorageError::Io)?;
    if buf.len() != len {
        return Err(StorageError::InvalidFormat("file is truncated".into()));
    }
    Ok(buf)
}

fn read_u32(reader: &mut impl Read) -> Result<u32, StorageError> {
    let mut bytes = [0u8; 4];
    reader.read_exact(&mut bytes).map_err(truncated)?;
    Ok(u32::from_le_bytes(bytes))
}

fn read_u64(reader: &mut impl Read) -> Result<u64, StorageError> {
    let mut bytes = [0u8; 8];
    reader.read_exact(&mut bytes).map_err(truncated)?;
    Ok(u64::from_le_bytes(bytes))
}

fn le_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    out
}
