use serde::{Deserialize, Serialize};
use tracing::info;

use awards_chunk::Manifest;
use awards_core::config::PipelineConfig;
use awards_core::error::{Error, Result, Stage};
use awards_store::ArtifactStore;

use crate::BuildReport;

/// A table that must exist, with an exact row count when one is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedTable {
    pub name: String,
    pub rows: Option<u64>,
}

impl ExpectedTable {
    pub fn exact(name: impl Into<String>, rows: u64) -> Self { Self { name: name.into(), rows: Some(rows) } }
    pub fn present(name: impl Into<String>) -> Self { Self { name: name.into(), rows: None } }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyReport {
    pub tables: Vec<(String, u64)>,
}

/// Expectations right after a build: every count is known.
pub fn expected_for(cfg: &PipelineConfig, report: &BuildReport) -> Vec<ExpectedTable> {
    let mut out = vec![ExpectedTable::exact(&cfg.dataset, report.fact_rows)];
    out.extend(report.rollups.iter().map(|(entity, n)| ExpectedTable::exact(entity.table_name(), *n)));
    out.extend(report.period_rollups.iter().map(|(table, n)| ExpectedTable::exact(table, *n)));
    out.push(ExpectedTable::exact(&cfg.search_table, report.search_rows));
    out
}

/// Expectations from the manifest and the recorded period tables: facts and
/// search rows equal the manifest total; rollup sizes are only known to exist.
pub fn expected_for_manifest(cfg: &PipelineConfig, manifest: &Manifest, period_tables: &[String]) -> Vec<ExpectedTable> {
    let mut out = vec![ExpectedTable::exact(&cfg.dataset, manifest.total_row_count)];
    out.extend(cfg.entity_types.iter().map(|e| ExpectedTable::present(e.table_name())));
    out.extend(period_tables.iter().map(ExpectedTable::present));
    out.push(ExpectedTable::exact(&cfg.search_table, manifest.total_row_count));
    out
}

pub async fn check(store: &ArtifactStore, expected: &[ExpectedTable]) -> Result<VerifyReport> {
    let mut tables = Vec::with_capacity(expected.len());
    for table in expected {
        let count = store
            .row_count(&table.name)
            .await
            .map_err(|e| Error::Store(format!("{e:#}")).at_stage(Stage::Store, table.name.as_str()))?;
        let mismatch = |reason: String| {
            Error::ArtifactMismatch { table: table.name.clone(), reason }.at_stage(Stage::Store, table.name.as_str())
        };
        let actual = count.ok_or_else(|| mismatch("table is missing".into()))?;
        if let Some(want) = table.rows {
            if want != actual {
                return Err(mismatch(format!("expected {want} rows, found {actual}")));
            }
        }
        tables.push((table.name.clone(), actual));
    }
    info!(tables = tables.len(), "artifacts verified");
    Ok(VerifyReport { tables })
}
