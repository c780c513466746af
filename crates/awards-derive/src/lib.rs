//! Derived views of the canonical dataset: per-dimension rollups, the search
//! projection, a data-quality profile and global totals.

pub mod aggregate;
pub mod analyzer;
pub mod profile;
pub mod search;
pub mod totals;

use awards_core::config::PipelineConfig;
use awards_core::error::{Error, Result, Stage};
use awards_core::types::{AggregationRow, Dataset, EntityType, Period, SearchRow};

pub use aggregate::{aggregate, aggregate_all, aggregate_periods, PartialAggregate};
pub use profile::{profile, DatasetProfile};
pub use search::SearchProjector;
pub use totals::{global_totals, GlobalTotals};

/// Rollup of one entity type over one calendar period.
#[derive(Debug, Clone)]
pub struct PeriodRollup {
    pub entity: EntityType,
    pub period: Period,
    pub rows: Vec<AggregationRow>,
}

impl PeriodRollup {
    pub fn table_name(&self) -> String { self.period.table_name(self.entity) }
}

/// All-time and per-period rollups for the configured entity types.
#[derive(Debug, Clone, Default)]
pub struct Rollups {
    pub all_time: Vec<(EntityType, Vec<AggregationRow>)>,
    pub periods: Vec<PeriodRollup>,
}

/// Everything computed from one dataset, held in memory until written.
#[derive(Debug, Clone)]
pub struct DerivedArtifacts {
    pub rollups: Vec<(EntityType, Vec<AggregationRow>)>,
    pub period_rollups: Vec<PeriodRollup>,
    pub search_rows: Vec<SearchRow>,
}

impl DerivedArtifacts {
    pub fn new(rollups: Rollups, search_rows: Vec<SearchRow>) -> Self {
        Self { rollups: rollups.all_time, period_rollups: rollups.periods, search_rows }
    }

    pub fn rollup(&self, entity: EntityType) -> Option<&[AggregationRow]> {
        self.rollups.iter().find(|(e, _)| *e == entity).map(|(_, rows)| rows.as_slice())
    }
}

/// Every configured rollup. Per entity: the all-time table, then each
/// configured granularity's periods in ascending order.
pub fn derive_rollups(dataset: &Dataset, cfg: &PipelineConfig) -> Result<Rollups> {
    let mut out = Rollups::default();
    for &entity in &cfg.entity_types {
        let tag = |e: Error| e.at_stage(Stage::Aggregate, entity.as_str());
        out.all_time.push((entity, aggregate(dataset, entity, cfg.partition_rows).map_err(tag)?));
        for &granularity in &cfg.periods {
            let periods = aggregate_periods(dataset, entity, granularity, cfg.partition_rows).map_err(tag)?;
            out.periods.extend(periods.into_iter().map(|(period, rows)| PeriodRollup { entity, period, rows }));
        }
    }
    Ok(out)
}

pub fn derive_search(dataset: &Dataset, cfg: &PipelineConfig) -> Result<Vec<SearchRow>> {
    let tag = |e: Error| e.at_stage(Stage::Search, &cfg.search_table);
    let projector = SearchProjector::new(&cfg.search_fields).map_err(tag)?;
    projector.project(dataset, cfg.partition_rows).map_err(tag)
}

/// Rollups and search projection, run side by side.
pub fn derive(dataset: &Dataset, cfg: &PipelineConfig) -> Result<DerivedArtifacts> {
    let (rollups, search_rows) = rayon::join(|| derive_rollups(dataset, cfg), || derive_search(dataset, cfg));
    Ok(DerivedArtifacts::new(rollups?, search_rows?))
}
