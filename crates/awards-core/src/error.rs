use std::fmt;

use thiserror::Error;

/// Pipeline stage a fatal error surfaced from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Config,
    Split,
    Assemble,
    Aggregate,
    Search,
    Store,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Config => "config",
            Stage::Split => "split",
            Stage::Assemble => "assemble",
            Stage::Aggregate => "aggregate",
            Stage::Search => "search",
            Stage::Store => "store",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Operation failed: {0}")]
    Operation(String),

    #[error("Invalid input {path}:{line}: {message}")]
    InvalidInput { path: String, line: usize, message: String },

    #[error("Dataset is empty")]
    EmptyDataset,

    #[error("Row {row_index} encodes to {row_bytes} bytes (with chunk header), above max_chunk_bytes {max_chunk_bytes}")]
    ThresholdTooSmall { row_index: u64, row_bytes: u64, max_chunk_bytes: u64 },

    #[error("Embedded schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Chunk truncated while reading {section}: needed {needed} bytes, {available} available")]
    Truncated { section: &'static str, needed: u64, available: u64 },

    #[error("Chunk corrupt: {0}")]
    ChunkCorrupt(String),

    #[error("Chunk {part_index} is missing: {reason}")]
    MissingChunk { part_index: u32, reason: String },

    #[error("Chunk {part_index} schema does not match the manifest fingerprint")]
    SchemaDrift { part_index: u32 },

    #[error("Chunk {part_index} content hash mismatch: manifest {expected}, chunk {actual}")]
    ChecksumMismatch { part_index: u32, expected: String, actual: String },

    #[error("Row count mismatch: manifest declares {expected}, assembled {actual}")]
    RowCountMismatch { expected: u64, actual: u64 },

    #[error("Manifest corrupt: {0}")]
    ManifestCorrupt(String),

    #[error("Artifact {table} mismatch: {reason}")]
    ArtifactMismatch { table: String, reason: String },

    #[error("Chunk {part_index}: {source}")]
    Chunk { part_index: u32, source: Box<Error> },

    #[error("{stage} failed [{key}]: {source}")]
    Stage { stage: Stage, key: String, source: Box<Error> },

    #[error("Store error: {0}")]
    Store(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Attach the part index of the chunk being processed.
    #[must_use]
    pub fn in_chunk(self, part_index: u32) -> Self {
        Error::Chunk { part_index, source: Box::new(self) }
    }

    /// Attach the stage and identifying key (part index, entity type, table).
    #[must_use]
    pub fn at_stage(self, stage: Stage, key: impl Into<String>) -> Self {
        Error::Stage { stage, key: key.into(), source: Box::new(self) }
    }

    /// The innermost error, with stage and chunk wrappers removed.
    pub fn root(&self) -> &Error {
        match self {
            Error::Chunk { source, .. } | Error::Stage { source, .. } => source.root(),
            other => other,
        }
    }

    /// Chunk the error is about, if it names one.
    pub fn part_index(&self) -> Option<u32> {
        match self {
            Error::MissingChunk { part_index, .. }
            | Error::SchemaDrift { part_index }
            | Error::ChecksumMismatch { part_index, .. }
            | Error::Chunk { part_index, .. } => Some(*part_index),
            Error::Stage { source, .. } => source.part_index(),
            _ => None,
        }
    }

    /// Stage recorded on the outermost wrapper, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Error::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Tag the error side of a result with a pipeline stage.
pub trait StageContext<T> {
    fn stage(self, stage: Stage, key: impl Into<String>) -> Result<T>;
}

impl<T, E: Into<Error>> StageContext<T> for std::result::Result<T, E> {
    fn stage(self, stage: Stage, key: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().at_stage(stage, key))
    }
}
