//! Size-bounded chunking of the fact table and its deterministic reassembly.

pub mod assembler;
pub mod codec;
pub mod manifest;
pub mod splitter;
pub mod store;

pub use assembler::assemble;
pub use manifest::{ChunkRef, Manifest};
pub use splitter::{split, SplitOptions, SplitOutput};
pub use store::{FsChunkStore, MemoryChunkStore};
