//! Batch orchestration: split, assemble, derive, store, verify.
//!
//! Every fatal error leaving this crate is an `Error::Stage` naming the stage
//! and the key (dataset, part index, entity type or table) it concerns.

pub mod verify;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use awards_chunk::{assemble, split, FsChunkStore, Manifest, SplitOptions};
use awards_core::config::{resolve_with_base, Config, PipelineConfig};
use awards_core::data_loader::DataLoader;
use awards_core::error::{Error, Result, Stage, StageContext};
use awards_core::types::{AggregationRow, Dataset, EntityType};
use awards_derive::{
    aggregate, derive_rollups, derive_search, global_totals, profile, DatasetProfile, DerivedArtifacts, GlobalTotals,
};
use awards_store::ArtifactStore;

pub use verify::{ExpectedTable, VerifyReport};

pub const META_BUILT_MANIFEST: &str = "built_manifest_id";
pub const META_GLOBAL_TOTALS: &str = "global_totals";
pub const META_PROFILE: &str = "dataset_profile";
/// JSON list of the period rollup tables the last build wrote.
pub const META_PERIOD_TABLES: &str = "period_tables";

#[derive(Debug, Clone, Copy, Default)]
pub struct BuildOptions {
    /// Rebuild even if the store already holds artifacts for this manifest.
    pub force: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildReport {
    pub manifest_id: String,
    pub skipped: bool,
    pub fact_rows: u64,
    pub rollups: Vec<(EntityType, u64)>,
    pub period_rollups: Vec<(String, u64)>,
    pub search_rows: u64,
}

/// Store failures arrive as `anyhow`; tag them with the table they concern.
fn store_err(table: &str) -> impl FnOnce(anyhow::Error) -> Error + '_ {
    move |e| Error::Store(format!("{e:#}")).at_stage(Stage::Store, table)
}

fn join_err(stage: Stage, key: &str) -> impl FnOnce(tokio::task::JoinError) -> Error + '_ {
    move |e| Error::Operation(format!("worker failed: {e}")).at_stage(stage, key)
}

pub struct Pipeline {
    config: PipelineConfig,
    base_dir: PathBuf,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, base_dir: impl Into<PathBuf>) -> Result<Self> {
        config.validate().stage(Stage::Config, "pipeline")?;
        Ok(Self { config, base_dir: base_dir.into() })
    }

    pub fn from_config(cfg: &Config, base_dir: impl Into<PathBuf>) -> Result<Self> {
        let pipeline = cfg.pipeline().stage(Stage::Config, "pipeline")?;
        Self::new(pipeline, base_dir)
    }

    pub fn config(&self) -> &PipelineConfig { &self.config }

    pub fn chunk_store(&self) -> FsChunkStore { FsChunkStore::new(resolve_with_base(&self.base_dir, &self.config.chunk_dir)) }

    pub fn lancedb_path(&self) -> PathBuf { resolve_with_base(&self.base_dir, &self.config.lancedb_dir) }

    pub fn input_dir(&self) -> PathBuf { resolve_with_base(&self.base_dir, &self.config.input_dir) }

    pub async fn open_store(&self) -> Result<ArtifactStore> {
        let path = self.lancedb_path();
        ArtifactStore::open(&path).await.map_err(store_err(&self.config.dataset))
    }

    /// Split and persist a dataset; returns the manifest written.
    pub fn split_dataset(&self, dataset: &Dataset) -> Result<Manifest> {
        let key = self.config.dataset.as_str();
        let opts = SplitOptions::from_config(&self.config);
        let output = split(dataset, &opts).map_err(|e| split_stage(e, key))?;
        self.chunk_store().persist(&output).stage(Stage::Split, key)?;
        Ok(output.manifest)
    }

    /// Load JSON-lines input from `path` (or the configured input dir) and split it.
    /// `path` may name a single `.jsonl` file or a directory of them.
    pub fn split_input(&self, path: Option<&Path>) -> Result<Manifest> {
        let path = path.map_or_else(|| self.input_dir(), Path::to_path_buf);
        let loader = DataLoader::new();
        let loaded = if path.is_file() { loader.load_file(&path) } else { loader.load_directory(&path) };
        let dataset = loaded.stage(Stage::Split, path.display().to_string())?;
        self.split_dataset(&dataset)
    }

    /// Split the canonical table currently held by the artifact store.
    pub async fn split_from_store(&self) -> Result<Manifest> {
        let store = self.open_store().await?;
        let dataset = store.read_facts(&self.config.dataset).await.map_err(store_err(&self.config.dataset))?;
        self.split_dataset(&dataset)
    }

    pub fn load_manifest(&self) -> Result<Manifest> {
        self.chunk_store().read_manifest(&self.config.dataset).stage(Stage::Assemble, self.config.dataset.as_str())
    }

    pub fn assemble(&self, manifest: &Manifest) -> Result<Dataset> {
        assemble(manifest, &self.chunk_store()).map_err(|e| assemble_stage(e, manifest))
    }

    pub fn profile(&self, dataset: &Dataset) -> DatasetProfile { profile(dataset, self.config.partition_rows) }

    pub fn prune(&self) -> Result<Vec<PathBuf>> {
        self.chunk_store().prune().stage(Stage::Split, self.config.chunk_dir.as_str())
    }

    /// Assemble the stored chunk set and regenerate every artifact.
    ///
    /// All artifacts are computed before the first write. The built manifest id
    /// is removed before the first write and recorded last, so an interrupted
    /// run (forced or not) is rebuilt next time.
    pub async fn build(&self, opts: BuildOptions) -> Result<BuildReport> {
        let manifest = self.load_manifest()?;
        let store = self.open_store().await?;
        let built = store.get_meta(META_BUILT_MANIFEST).await.map_err(store_err(awards_store::META_TABLE))?;
        if !opts.force && built.as_deref() == Some(manifest.manifest_id.as_str()) {
            info!(manifest_id = %manifest.manifest_id, "artifacts already built for this manifest; skipping");
            return Ok(BuildReport {
                manifest_id: manifest.manifest_id,
                skipped: true,
                fact_rows: 0,
                rollups: vec![],
                period_rollups: vec![],
                search_rows: 0,
            });
        }

        let dataset = {
            let chunk_store = self.chunk_store();
            let m = manifest.clone();
            tokio::task::spawn_blocking(move || assemble(&m, &chunk_store).map_err(|e| assemble_stage(e, &m)))
                .await
                .map_err(join_err(Stage::Assemble, &manifest.manifest_id))??
        };
        let dataset = Arc::new(dataset);

        let rollup_worker = {
            let ds = Arc::clone(&dataset);
            let cfg = self.config.clone();
            tokio::task::spawn_blocking(move || -> Result<_> {
                let rollups = derive_rollups(&ds, &cfg)?;
                let totals = totals_for(&ds, &rollups.all_time, cfg.partition_rows)?;
                Ok((rollups, totals, profile(&ds, cfg.partition_rows)))
            })
        };
        let search_worker = {
            let ds = Arc::clone(&dataset);
            let cfg = self.config.clone();
            tokio::task::spawn_blocking(move || derive_search(&ds, &cfg))
        };
        let (rollup_done, search_done) = tokio::join!(rollup_worker, search_worker);
        let (rollups, totals, dataset_profile) =
            rollup_done.map_err(join_err(Stage::Aggregate, &manifest.manifest_id))??;
        let search_rows = search_done.map_err(join_err(Stage::Search, &self.config.search_table))??;
        let derived = DerivedArtifacts::new(rollups, search_rows);
        if dataset_profile.invalid_amounts > 0 {
            warn!(rows = dataset_profile.invalid_amounts, "non-positive or non-finite contract amounts");
        }

        store.delete_meta(META_BUILT_MANIFEST).await.map_err(store_err(awards_store::META_TABLE))?;
        let report = self.write_artifacts(&store, &dataset, &derived, &totals, &dataset_profile, &manifest).await?;
        verify::check(&store, &verify::expected_for(&self.config, &report)).await?;
        store
            .set_meta(META_BUILT_MANIFEST, &manifest.manifest_id)
            .await
            .map_err(store_err(awards_store::META_TABLE))?;
        info!(manifest_id = %manifest.manifest_id, rows = report.fact_rows, "build complete");
        Ok(report)
    }

    async fn write_artifacts(
        &self,
        store: &ArtifactStore,
        dataset: &Dataset,
        derived: &DerivedArtifacts,
        totals: &GlobalTotals,
        dataset_profile: &DatasetProfile,
        manifest: &Manifest,
    ) -> Result<BuildReport> {
        let facts_table = self.config.dataset.as_str();
        let fact_rows = store.write_facts(facts_table, dataset).await.map_err(store_err(facts_table))?;

        let mut rollups = Vec::with_capacity(derived.rollups.len());
        for (entity, rows) in &derived.rollups {
            let table = entity.table_name();
            let n = store.write_rollup(*entity, rows).await.map_err(store_err(&table))?;
            rollups.push((*entity, n));
        }

        let mut period_rollups = Vec::with_capacity(derived.period_rollups.len());
        for rollup in &derived.period_rollups {
            let table = rollup.table_name();
            let n = store.write_rollup_table(&table, &rollup.rows).await.map_err(store_err(&table))?;
            period_rollups.push((table, n));
        }

        let search_table = self.config.search_table.as_str();
        let search_rows = store.write_search(search_table, &derived.search_rows).await.map_err(store_err(search_table))?;

        let meta = awards_store::META_TABLE;
        for stale in period_tables(store).await?.iter().filter(|t| !period_rollups.iter().any(|(n, _)| n == *t)) {
            store.clear_table(stale).await.map_err(store_err(stale))?;
        }
        let names: Vec<&str> = period_rollups.iter().map(|(n, _)| n.as_str()).collect();
        let names_json = serde_json::to_string(&names).stage(Stage::Store, meta)?;
        store.set_meta(META_PERIOD_TABLES, &names_json).await.map_err(store_err(meta))?;
        let totals_json = serde_json::to_string(totals).stage(Stage::Store, meta)?;
        store.set_meta(META_GLOBAL_TOTALS, &totals_json).await.map_err(store_err(meta))?;
        let profile_json = serde_json::to_string(dataset_profile).stage(Stage::Store, meta)?;
        store.set_meta(META_PROFILE, &profile_json).await.map_err(store_err(meta))?;

        Ok(BuildReport {
            manifest_id: manifest.manifest_id.clone(),
            skipped: false,
            fact_rows,
            rollups,
            period_rollups,
            search_rows,
        })
    }

    /// Re-count the artifact tables against the stored manifest.
    pub async fn verify(&self) -> Result<VerifyReport> {
        let manifest = self.load_manifest()?;
        let store = self.open_store().await?;
        let recorded = period_tables(&store).await?;
        let expected = verify::expected_for_manifest(&self.config, &manifest, &recorded);
        verify::check(&store, &expected).await
    }

    pub async fn global_totals(&self) -> Result<Option<GlobalTotals>> {
        let store = self.open_store().await?;
        let raw = store.get_meta(META_GLOBAL_TOTALS).await.map_err(store_err(awards_store::META_TABLE))?;
        raw.map(|s| serde_json::from_str::<GlobalTotals>(&s).stage(Stage::Store, awards_store::META_TABLE)).transpose()
    }
}

/// Period rollup tables recorded by the last build.
async fn period_tables(store: &ArtifactStore) -> Result<Vec<String>> {
    let meta = awards_store::META_TABLE;
    let raw = store.get_meta(META_PERIOD_TABLES).await.map_err(store_err(meta))?;
    raw.map(|s| serde_json::from_str::<Vec<String>>(&s).stage(Stage::Store, meta))
        .transpose()
        .map(Option::unwrap_or_default)
}

fn totals_for(
    dataset: &Dataset,
    rollups: &[(EntityType, Vec<AggregationRow>)],
    partition_rows: usize,
) -> Result<GlobalTotals> {
    let rollup = |entity: EntityType| -> Result<Vec<_>> {
        match rollups.iter().find(|(e, _)| *e == entity) {
            Some((_, rows)) => Ok(rows.clone()),
            None => aggregate(dataset, entity, partition_rows).stage(Stage::Aggregate, entity.as_str()),
        }
    };
    let categories = rollup(EntityType::BusinessCategory)?;
    let contractors = rollup(EntityType::Contractor)?;
    Ok(global_totals(&categories, &contractors, dataset.len() as u64))
}

fn split_stage(e: Error, dataset: &str) -> Error {
    match e.part_index() {
        Some(part) => e.at_stage(Stage::Split, format!("part {part}")),
        None => e.at_stage(Stage::Split, dataset),
    }
}

fn assemble_stage(e: Error, manifest: &Manifest) -> Error {
    match e.part_index() {
        Some(part) => e.at_stage(Stage::Assemble, format!("part {part}")),
        None => e.at_stage(Stage::Assemble, manifest.manifest_id.as_str()),
    }
}
