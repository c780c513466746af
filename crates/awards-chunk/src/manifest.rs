use serde::{Deserialize, Serialize};

use awards_core::error::{Error, Result};

pub const MANIFEST_FORMAT_VERSION: u32 = 1;

/// One stored chunk, addressed by `(manifest_id, part_index)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRef {
    pub part_index: u32,
    pub row_count: u64,
    pub byte_size: u64,
    /// blake3 of the encoded chunk bytes, hex.
    pub content_hash: String,
}

/// Index over a chunk set. Immutable once produced; passed explicitly to the assembler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub format_version: u32,
    pub manifest_id: String,
    pub dataset: String,
    pub schema_fingerprint: String,
    pub total_row_count: u64,
    pub max_chunk_bytes: u64,
    pub chunks: Vec<ChunkRef>,
}

impl Manifest {
    pub fn new(dataset: &str, schema_fingerprint: String, max_chunk_bytes: u64, chunks: Vec<ChunkRef>) -> Self {
        let total_row_count = chunks.iter().map(|c| c.row_count).sum();
        let manifest_id = compute_id(&schema_fingerprint, total_row_count, &chunks);
        Self {
            format_version: MANIFEST_FORMAT_VERSION,
            manifest_id,
            dataset: dataset.to_string(),
            schema_fingerprint,
            total_row_count,
            max_chunk_bytes,
            chunks,
        }
    }

    pub fn chunk_count(&self) -> usize { self.chunks.len() }

    /// Structural checks, done before any chunk is fetched.
    pub fn validate(&self) -> Result<()> {
        if self.format_version != MANIFEST_FORMAT_VERSION {
            return Err(Error::ManifestCorrupt(format!("unsupported format_version {}", self.format_version)));
        }
        if self.manifest_id.is_empty() || self.schema_fingerprint.is_empty() {
            return Err(Error::ManifestCorrupt("manifest_id and schema_fingerprint are required".into()));
        }
        if self.chunks.is_empty() {
            return Err(Error::ManifestCorrupt("no chunks listed".into()));
        }
        for (expected, chunk) in (0u32..).zip(&self.chunks) {
            if chunk.part_index != expected {
                return Err(Error::ManifestCorrupt(format!(
                    "part indices must be contiguous from 0: found {} at position {expected}",
                    chunk.part_index
                )));
            }
            if chunk.row_count == 0 {
                return Err(Error::ManifestCorrupt(format!("chunk {} lists zero rows", chunk.part_index)));
            }
            if chunk.byte_size > self.max_chunk_bytes {
                return Err(Error::ManifestCorrupt(format!(
                    "chunk {} is {} bytes, above max_chunk_bytes {}",
                    chunk.part_index, chunk.byte_size, self.max_chunk_bytes
                )));
            }
        }
        let sum: u64 = self.chunks.iter().map(|c| c.row_count).sum();
        if sum != self.total_row_count {
            return Err(Error::ManifestCorrupt(format!(
                "chunk row counts sum to {sum}, total_row_count is {}",
                self.total_row_count
            )));
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String> { Ok(serde_json::to_string_pretty(self)?) }

    pub fn from_json(s: &str) -> Result<Self> {
        serde_json::from_str(s).map_err(|e| Error::ManifestCorrupt(format!("unreadable manifest: {e}")))
    }
}

/// First 16 hex chars of blake3 over the fingerprint, total and every chunk ref.
fn compute_id(schema_fingerprint: &str, total_row_count: u64, chunks: &[ChunkRef]) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(schema_fingerprint.as_bytes());
    hasher.update(&total_row_count.to_le_bytes());
    for c in chunks {
        hasher.update(&c.part_index.to_le_bytes());
        hasher.update(&c.row_count.to_le_bytes());
        hasher.update(&c.byte_size.to_le_bytes());
        hasher.update(c.content_hash.as_bytes());
    }
    hasher.finalize().to_hex().as_str()[..16].to_string()
}
