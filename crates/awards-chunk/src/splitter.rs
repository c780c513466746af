use std::ops::Range;

use rayon::prelude::*;
use tracing::{debug, info};

use awards_core::config::{PipelineConfig, STORAGE_HARD_LIMIT_BYTES};
use awards_core::error::{Error, Result};
use awards_core::schema::fact_schema;
use awards_core::types::{Dataset, FactRow};

use crate::codec;
use crate::manifest::{ChunkRef, Manifest};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitOptions {
    pub dataset: String,
    pub max_chunk_bytes: u64,
    /// Seal a chunk once it holds this many rows, even if it still fits.
    pub rows_per_chunk: Option<u64>,
}

impl SplitOptions {
    pub fn new(dataset: impl Into<String>, max_chunk_bytes: u64) -> Self {
        Self { dataset: dataset.into(), max_chunk_bytes, rows_per_chunk: None }
    }

    #[must_use]
    pub fn with_rows_per_chunk(mut self, rows: u64) -> Self { self.rows_per_chunk = Some(rows); self }

    pub fn from_config(cfg: &PipelineConfig) -> Self {
        Self { dataset: cfg.dataset.clone(), max_chunk_bytes: cfg.max_chunk_bytes, rows_per_chunk: cfg.rows_per_chunk }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_chunk_bytes == 0 || self.max_chunk_bytes > STORAGE_HARD_LIMIT_BYTES {
            return Err(Error::InvalidConfig(format!(
                "max_chunk_bytes {} must be in 1..={STORAGE_HARD_LIMIT_BYTES}",
                self.max_chunk_bytes
            )));
        }
        if self.rows_per_chunk == Some(0) {
            return Err(Error::InvalidConfig("rows_per_chunk must be positive".into()));
        }
        Ok(())
    }
}

/// One encoded chunk ready for storage.
#[derive(Debug, Clone)]
pub struct EncodedChunk {
    pub part_index: u32,
    pub row_count: u64,
    pub bytes: Vec<u8>,
    pub content_hash: String,
}

#[derive(Debug, Clone)]
pub struct SplitOutput {
    pub manifest: Manifest,
    pub chunks: Vec<EncodedChunk>,
}

/// Greedy forward packing: row ranges such that each encoded chunk stays
/// within `max_chunk_bytes` and, if set, within `rows_per_chunk` rows.
pub fn plan_boundaries(rows: &[FactRow], opts: &SplitOptions) -> Result<Vec<Range<usize>>> {
    opts.validate()?;
    if rows.is_empty() {
        return Err(Error::EmptyDataset);
    }
    let header = codec::header_len(fact_schema());
    let row_lens: Vec<u64> = rows.par_iter().map(codec::row_encoded_len).collect();
    let row_cap = opts.rows_per_chunk.unwrap_or(u64::MAX);

    let mut ranges = Vec::new();
    let mut start = 0usize;
    let mut size = header;
    for (i, len) in row_lens.iter().copied().enumerate() {
        if header + len > opts.max_chunk_bytes {
            return Err(Error::ThresholdTooSmall {
                row_index: i as u64,
                row_bytes: header + len,
                max_chunk_bytes: opts.max_chunk_bytes,
            });
        }
        let held = (i - start) as u64;
        if i > start && (size + len > opts.max_chunk_bytes || held >= row_cap) {
            ranges.push(start..i);
            start = i;
            size = header;
        }
        size += len;
    }
    ranges.push(start..rows.len());
    Ok(ranges)
}

/// Split `dataset` into size-bounded chunks and the manifest indexing them.
pub fn split(dataset: &Dataset, opts: &SplitOptions) -> Result<SplitOutput> {
    let rows = dataset.rows();
    let ranges = plan_boundaries(rows, opts)?;
    let part_count = u32::try_from(ranges.len())
        .map_err(|_| Error::InvalidConfig(format!("{} chunks exceed the part index range", ranges.len())))?;
    debug!(parts = part_count, "planned chunk boundaries");

    let chunks: Vec<EncodedChunk> = (0..part_count)
        .into_par_iter()
        .zip(ranges.into_par_iter())
        .map(|(part_index, range)| {
            let slice = &rows[range];
            let bytes = codec::encode(slice).map_err(|e| e.in_chunk(part_index))?;
            let content_hash = blake3::hash(&bytes).to_hex().to_string();
            Ok(EncodedChunk { part_index, row_count: slice.len() as u64, bytes, content_hash })
        })
        .collect::<Result<Vec<_>>>()?;

    let refs = chunks
        .iter()
        .map(|c| ChunkRef {
            part_index: c.part_index,
            row_count: c.row_count,
            byte_size: c.bytes.len() as u64,
            content_hash: c.content_hash.clone(),
        })
        .collect();
    let manifest = Manifest::new(&opts.dataset, fact_schema().fingerprint(), opts.max_chunk_bytes, refs);
    info!(
        dataset = %manifest.dataset,
        manifest_id = %manifest.manifest_id,
        rows = manifest.total_row_count,
        chunks = manifest.chunk_count(),
        "split dataset"
    );
    Ok(SplitOutput { manifest, chunks })
}
