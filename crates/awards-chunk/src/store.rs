use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use tracing::{debug, info, warn};

use awards_core::error::{Error, Result};
use awards_core::traits::ChunkStore;

use crate::manifest::Manifest;
use crate::splitter::SplitOutput;

const MANIFEST_SUFFIX: &str = ".manifest.json";

/// Chunks under `<root>/<manifest_id>/part-NNNNN.chunk`, manifests as
/// `<root>/<dataset>.manifest.json`. All writes go through a temp file and rename.
#[derive(Debug, Clone)]
pub struct FsChunkStore {
    root: PathBuf,
}

impl FsChunkStore {
    pub fn new(root: impl Into<PathBuf>) -> Self { Self { root: root.into() } }

    pub fn root(&self) -> &Path { &self.root }

    pub fn chunk_path(&self, manifest_id: &str, part_index: u32) -> PathBuf {
        self.root.join(manifest_id).join(format!("part-{part_index:05}.chunk"))
    }

    pub fn manifest_path(&self, dataset: &str) -> PathBuf {
        self.root.join(format!("{dataset}{MANIFEST_SUFFIX}"))
    }

    /// Write every chunk, then the manifest. A reader never sees a manifest
    /// whose chunks are not all in place.
    pub fn persist(&self, output: &SplitOutput) -> Result<PathBuf> {
        for chunk in &output.chunks {
            self.put_chunk(&output.manifest.manifest_id, chunk.part_index, &chunk.bytes)?;
        }
        let path = self.write_manifest(&output.manifest)?;
        info!(manifest = %path.display(), chunks = output.chunks.len(), "persisted chunk set");
        Ok(path)
    }

    pub fn write_manifest(&self, manifest: &Manifest) -> Result<PathBuf> {
        let path = self.manifest_path(&manifest.dataset);
        write_atomic(&path, manifest.to_json()?.as_bytes())?;
        Ok(path)
    }

    pub fn read_manifest(&self, dataset: &str) -> Result<Manifest> {
        read_manifest_file(&self.manifest_path(dataset))
    }

    /// Remove chunk directories no manifest in the root refers to. Only
    /// directories that look like a chunk set (a manifest id holding nothing
    /// but part files) are candidates; anything else under the root is left alone.
    pub fn prune(&self) -> Result<Vec<PathBuf>> {
        if !self.root.exists() {
            return Ok(vec![]);
        }
        let mut entries: Vec<PathBuf> = walkdir::WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(std::result::Result::ok)
            .map(walkdir::DirEntry::into_path)
            .collect();
        entries.sort();

        let mut live = HashSet::new();
        for path in entries.iter().filter(|p| is_manifest(p)) {
            live.insert(read_manifest_file(path)?.manifest_id);
        }

        let mut removed = Vec::new();
        for dir in entries.iter().filter(|p| p.is_dir()) {
            let name = dir.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            if live.contains(name) { continue; }
            if !is_manifest_id(name) || !holds_only_parts(dir)? {
                debug!(dir = %dir.display(), "not a chunk set, leaving in place");
                continue;
            }
            fs::remove_dir_all(dir)?;
            info!(dir = %dir.display(), "pruned unreferenced chunk set");
            removed.push(dir.clone());
        }
        Ok(removed)
    }
}

impl ChunkStore for FsChunkStore {
    fn put_chunk(&self, manifest_id: &str, part_index: u32, bytes: &[u8]) -> Result<()> {
        write_atomic(&self.chunk_path(manifest_id, part_index), bytes)
    }

    fn get_chunk(&self, manifest_id: &str, part_index: u32) -> Result<Vec<u8>> {
        let path = self.chunk_path(manifest_id, part_index);
        fs::read(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => Error::NotFound(path.display().to_string()),
            _ => Error::Io(e),
        })
    }
}

fn is_manifest(path: &Path) -> bool {
    path.is_file() && path.file_name().and_then(|n| n.to_str()).is_some_and(|n| n.ends_with(MANIFEST_SUFFIX))
}

fn is_manifest_id(name: &str) -> bool {
    name.len() == 16 && name.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// `part-NNNNN.chunk`, five digits.
fn is_part_file_name(name: &str) -> bool {
    name.strip_prefix("part-")
        .and_then(|rest| rest.strip_suffix(".chunk"))
        .is_some_and(|digits| digits.len() == 5 && digits.bytes().all(|b| b.is_ascii_digit()))
}

fn holds_only_parts(dir: &Path) -> Result<bool> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let is_part = entry.file_type()?.is_file()
            && entry.file_name().to_str().is_some_and(is_part_file_name);
        if !is_part {
            return Ok(false);
        }
    }
    Ok(true)
}

fn read_manifest_file(path: &Path) -> Result<Manifest> {
    let text = fs::read_to_string(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => Error::NotFound(format!("manifest {}", path.display())),
        _ => Error::Io(e),
    })?;
    Manifest::from_json(&text)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path.parent().ok_or_else(|| Error::InvalidConfig(format!("no parent directory for {}", path.display())))?;
    fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

/// In-process chunk store.
#[derive(Debug, Default)]
pub struct MemoryChunkStore {
    chunks: RwLock<HashMap<(String, u32), Vec<u8>>>,
}

impl MemoryChunkStore {
    pub fn new() -> Self { Self::default() }

    pub fn from_output(output: &SplitOutput) -> Result<Self> {
        let store = Self::new();
        for chunk in &output.chunks {
            store.put_chunk(&output.manifest.manifest_id, chunk.part_index, &chunk.bytes)?;
        }
        Ok(store)
    }

    pub fn remove(&self, manifest_id: &str, part_index: u32) -> Result<Option<Vec<u8>>> {
        let mut map = self.chunks.write().map_err(|_| Error::Operation("chunk map lock poisoned".into()))?;
        Ok(map.remove(&(manifest_id.to_string(), part_index)))
    }

    pub fn len(&self) -> usize {
        match self.chunks.read() {
            Ok(map) => map.len(),
            Err(_) => {
                warn!("chunk map lock poisoned");
                0
            }
        }
    }

    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

impl ChunkStore for MemoryChunkStore {
    fn put_chunk(&self, manifest_id: &str, part_index: u32, bytes: &[u8]) -> Result<()> {
        let mut map = self.chunks.write().map_err(|_| Error::Operation("chunk map lock poisoned".into()))?;
        map.insert((manifest_id.to_string(), part_index), bytes.to_vec());
        Ok(())
    }

    fn get_chunk(&self, manifest_id: &str, part_index: u32) -> Result<Vec<u8>> {
        let map = self.chunks.read().map_err(|_| Error::Operation("chunk map lock poisoned".into()))?;
        map.get(&(manifest_id.to_string(), part_index))
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("chunk {manifest_id}/{part_index}")))
    }
}
