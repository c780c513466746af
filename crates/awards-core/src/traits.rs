use crate::error::Result;

/// Chunk storage collaborator: `(manifest_id, part_index) -> bytes`.
///
/// A missing chunk is reported as `Error::NotFound`; the assembler turns it
/// into `MissingChunk` for the part.
pub trait ChunkStore: Send + Sync {
    fn put_chunk(&self, manifest_id: &str, part_index: u32, bytes: &[u8]) -> Result<()>;
    fn get_chunk(&self, manifest_id: &str, part_index: u32) -> Result<Vec<u8>>;
}
