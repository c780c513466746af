use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::{EntityType, PeriodGranularity, SearchField};

/// Per-object ceiling of the storage system chunks are pushed to.
pub const STORAGE_HARD_LIMIT_BYTES: u64 = 100 * 1024 * 1024;

/// Default chunk ceiling, leaving headroom under the hard limit.
pub const DEFAULT_MAX_CHUNK_BYTES: u64 = 45 * 1024 * 1024;

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        Ok(Self { figment: Self::figment_for(&env_name, Path::new(".")) })
    }

    /// Same layering as [`Config::load`], reading the TOML files from `dir`.
    pub fn load_from(dir: &Path, env_name: &str) -> Self {
        Self { figment: Self::figment_for(env_name, dir) }
    }

    fn figment_for(env_name: &str, dir: &Path) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Root::default()))
            .merge(Toml::file(dir.join("config.toml")));
        match env_name {
            "dev" | "development" => figment = figment.merge(Toml::file(dir.join("config.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(dir.join("config.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(dir.join("config.test.toml"))),
            _ => {}
        }
        figment.merge(Env::prefixed("APP_").split("__"))
    }

    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| Error::InvalidConfig(format!("Failed to get '{key}': {e}")))
    }

    /// Typed pipeline settings under `[pipeline]`, validated.
    pub fn pipeline(&self) -> Result<PipelineConfig> {
        let cfg: PipelineConfig = self.get("pipeline")?;
        cfg.validate()?;
        Ok(cfg)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Root {
    pipeline: PipelineConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Canonical dataset name; also the LanceDB table it is written to.
    pub dataset: String,
    pub chunk_dir: String,
    pub lancedb_dir: String,
    pub input_dir: String,
    pub max_chunk_bytes: u64,
    pub rows_per_chunk: Option<u64>,
    pub entity_types: Vec<EntityType>,
    pub search_fields: Vec<SearchField>,
    pub search_table: String,
    /// Rows per aggregation/search partition. Independent of thread count.
    pub partition_rows: usize,
    /// Extra rollups per calendar slice of `award_date`. Empty disables them.
    pub periods: Vec<PeriodGranularity>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dataset: "facts_awards_all_time".to_string(),
            chunk_dir: "data/chunks".to_string(),
            lancedb_dir: "data/lancedb".to_string(),
            input_dir: "data/raw".to_string(),
            max_chunk_bytes: DEFAULT_MAX_CHUNK_BYTES,
            rows_per_chunk: None,
            entity_types: EntityType::ALL.to_vec(),
            search_fields: SearchField::DEFAULT_ORDER.to_vec(),
            search_table: "facts_awards_title_optimized".to_string(),
            partition_rows: 65_536,
            periods: vec![PeriodGranularity::Year, PeriodGranularity::Quarter],
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.dataset.trim().is_empty() {
            return Err(Error::InvalidConfig("dataset must not be empty".into()));
        }
        if self.search_table.trim().is_empty() || self.search_table == self.dataset {
            return Err(Error::InvalidConfig(format!("search_table '{}' must be set and differ from dataset", self.search_table)));
        }
        if self.max_chunk_bytes == 0 || self.max_chunk_bytes > STORAGE_HARD_LIMIT_BYTES {
            return Err(Error::InvalidConfig(format!(
                "max_chunk_bytes {} must be in 1..={STORAGE_HARD_LIMIT_BYTES}",
                self.max_chunk_bytes
            )));
        }
        if self.rows_per_chunk == Some(0) {
            return Err(Error::InvalidConfig("rows_per_chunk must be positive".into()));
        }
        if self.partition_rows == 0 {
            return Err(Error::InvalidConfig("partition_rows must be positive".into()));
        }
        if self.entity_types.is_empty() {
            return Err(Error::InvalidConfig("entity_types must not be empty".into()));
        }
        if !all_distinct(&self.entity_types) {
            return Err(Error::InvalidConfig("entity_types contains duplicates".into()));
        }
        if self.search_fields.is_empty() {
            return Err(Error::InvalidConfig("search_fields must not be empty".into()));
        }
        if !all_distinct(&self.search_fields) {
            return Err(Error::InvalidConfig("search_fields contains duplicates".into()));
        }
        if !all_distinct(&self.periods) {
            return Err(Error::InvalidConfig("periods contains duplicates".into()));
        }
        // Pruning the chunk root must never reach the store or the raw input.
        let chunk_dir = expand_path(&self.chunk_dir);
        for (key, other) in [("lancedb_dir", &self.lancedb_dir), ("input_dir", &self.input_dir)] {
            if expand_path(other).starts_with(&chunk_dir) {
                return Err(Error::InvalidConfig(format!(
                    "{key} '{other}' must not sit inside chunk_dir '{}'",
                    self.chunk_dir
                )));
            }
        }
        Ok(())
    }
}

fn all_distinct<T: Eq + std::hash::Hash>(items: &[T]) -> bool {
    let mut seen = HashSet::new();
    items.iter().all(|i| seen.insert(i))
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
