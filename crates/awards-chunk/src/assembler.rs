use rayon::prelude::*;
use tracing::{debug, info};

use awards_core::error::{Error, Result};
use awards_core::traits::ChunkStore;
use awards_core::types::{Dataset, FactRow};

use crate::codec;
use crate::manifest::{ChunkRef, Manifest};

/// Rebuild the canonical dataset from a manifest and its chunks.
///
/// Chunks are fetched and decoded in parallel; the first failure in
/// `part_index` order is the one reported. Nothing partial is returned.
pub fn assemble(manifest: &Manifest, store: &dyn ChunkStore) -> Result<Dataset> {
    manifest.validate()?;

    let decoded: Vec<Result<Vec<FactRow>>> =
        manifest.chunks.par_iter().map(|chunk| load_chunk(manifest, chunk, store)).collect();

    let mut rows = Vec::with_capacity(usize::try_from(manifest.total_row_count).unwrap_or(0));
    for part in decoded {
        rows.extend(part?);
    }

    let actual = rows.len() as u64;
    if actual != manifest.total_row_count {
        return Err(Error::RowCountMismatch { expected: manifest.total_row_count, actual });
    }
    info!(manifest_id = %manifest.manifest_id, rows = actual, chunks = manifest.chunk_count(), "assembled dataset");
    Ok(Dataset::new(rows))
}

fn load_chunk(manifest: &Manifest, chunk: &ChunkRef, store: &dyn ChunkStore) -> Result<Vec<FactRow>> {
    let part_index = chunk.part_index;
    let bytes = store
        .get_chunk(&manifest.manifest_id, part_index)
        .map_err(|e| Error::MissingChunk { part_index, reason: e.to_string() })?;

    let schema = match codec::read_schema(&bytes) {
        Ok(schema) => schema,
        Err(Error::SchemaMismatch(_)) => return Err(Error::SchemaDrift { part_index }),
        Err(e) => return Err(e.in_chunk(part_index)),
    };
    if schema.fingerprint() != manifest.schema_fingerprint {
        return Err(Error::SchemaDrift { part_index });
    }

    let actual = blake3::hash(&bytes).to_hex().to_string();
    if actual != chunk.content_hash {
        return Err(Error::ChecksumMismatch { part_index, expected: chunk.content_hash.clone(), actual });
    }

    let (_, rows) = codec::decode(&bytes).map_err(|e| e.in_chunk(part_index))?;
    debug!(part_index, rows = rows.len(), "decoded chunk");
    Ok(rows)
}
