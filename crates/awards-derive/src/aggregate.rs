//! Per-dimension rollups over the canonical dataset.
//!
//! The dataset is cut into fixed `partition_rows` ranges. Each range yields a
//! [`PartialAggregate`]; partials are merged in partition order, so group order
//! (first seen) and floating-point sums do not depend on the thread count.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::NaiveDate;
use rayon::prelude::*;
use tracing::debug;

use awards_core::error::{Error, Result};
use awards_core::types::{AggregationRow, Dataset, EntityType, FactRow, Period, PeriodGranularity};

#[derive(Debug, Default)]
struct GroupAcc<'a> {
    contract_count: u64,
    total_value: f64,
    categories: HashSet<&'a str>,
    contractors: HashSet<&'a str>,
    organizations: HashSet<&'a str>,
    first_date: Option<NaiveDate>,
    last_date: Option<NaiveDate>,
}

impl<'a> GroupAcc<'a> {
    fn add(&mut self, row: &'a FactRow) {
        self.contract_count += 1;
        self.total_value += row.contract_amount;
        self.categories.extend(row.dimension(EntityType::BusinessCategory));
        self.contractors.extend(row.dimension(EntityType::Contractor));
        self.organizations.extend(row.dimension(EntityType::Organization));
        if let Some(d) = row.award_date {
            self.first_date = Some(self.first_date.map_or(d, |f| f.min(d)));
            self.last_date = Some(self.last_date.map_or(d, |l| l.max(d)));
        }
    }

    fn merge(&mut self, other: GroupAcc<'a>) {
        self.contract_count += other.contract_count;
        self.total_value += other.total_value;
        self.categories.extend(other.categories);
        self.contractors.extend(other.contractors);
        self.organizations.extend(other.organizations);
        self.first_date = min_opt(self.first_date, other.first_date);
        self.last_date = max_opt(self.last_date, other.last_date);
    }

    fn finish(self, entity: &str) -> AggregationRow {
        let average = if self.contract_count == 0 { 0.0 } else { self.total_value / self.contract_count as f64 };
        AggregationRow {
            entity: entity.to_string(),
            contract_count: self.contract_count,
            category_count: self.categories.len() as u64,
            contractor_count: self.contractors.len() as u64,
            organization_count: self.organizations.len() as u64,
            total_contract_value: self.total_value,
            average_contract_value: average,
            first_contract_date: self.first_date,
            last_contract_date: self.last_date,
        }
    }
}

fn min_opt(a: Option<NaiveDate>, b: Option<NaiveDate>) -> Option<NaiveDate> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.min(y)),
        (x, y) => x.or(y),
    }
}

fn max_opt(a: Option<NaiveDate>, b: Option<NaiveDate>) -> Option<NaiveDate> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.max(y)),
        (x, y) => x.or(y),
    }
}

/// Group state for one row range, keyed by borrowed dimension values.
#[derive(Debug, Default)]
pub struct PartialAggregate<'a> {
    order: Vec<&'a str>,
    groups: HashMap<&'a str, GroupAcc<'a>>,
}

impl<'a> PartialAggregate<'a> {
    pub fn from_rows(rows: &'a [FactRow], entity: EntityType) -> Self {
        let mut partial = Self::default();
        for row in rows {
            partial.add(row, entity);
        }
        partial
    }

    pub fn add(&mut self, row: &'a FactRow, entity: EntityType) {
        // Null or empty dimension: no group.
        let Some(key) = row.dimension(entity) else { return };
        let order = &mut self.order;
        self.groups
            .entry(key)
            .or_insert_with(|| {
                order.push(key);
                GroupAcc::default()
            })
            .add(row);
    }

    /// Fold a later partition into this one.
    pub fn merge(&mut self, other: PartialAggregate<'a>) {
        let PartialAggregate { order, mut groups } = other;
        for key in order {
            let Some(acc) = groups.remove(key) else { continue };
            match self.groups.get_mut(key) {
                Some(existing) => existing.merge(acc),
                None => {
                    self.order.push(key);
                    self.groups.insert(key, acc);
                }
            }
        }
    }

    pub fn group_count(&self) -> usize { self.order.len() }

    pub fn finish(mut self) -> Vec<AggregationRow> {
        self.order
            .iter()
            .filter_map(|key| self.groups.remove(key).map(|acc| acc.finish(key)))
            .collect()
    }
}

fn check_partition_rows(partition_rows: usize) -> Result<()> {
    if partition_rows == 0 {
        return Err(Error::InvalidConfig("partition_rows must be positive".into()));
    }
    Ok(())
}

/// One rollup table for `entity`, groups in first-seen order.
pub fn aggregate(dataset: &Dataset, entity: EntityType, partition_rows: usize) -> Result<Vec<AggregationRow>> {
    check_partition_rows(partition_rows)?;
    let partials: Vec<PartialAggregate<'_>> = dataset
        .rows()
        .par_chunks(partition_rows)
        .map(|rows| PartialAggregate::from_rows(rows, entity))
        .collect();
    let partitions = partials.len();
    let merged = partials.into_iter().fold(PartialAggregate::default(), |mut acc, p| {
        acc.merge(p);
        acc
    });
    debug!(entity = %entity, partitions, groups = merged.group_count(), "aggregated");
    Ok(merged.finish())
}

/// Rollups for several entity types, computed concurrently, returned in the given order.
pub fn aggregate_all(
    dataset: &Dataset,
    entities: &[EntityType],
    partition_rows: usize,
) -> Result<Vec<(EntityType, Vec<AggregationRow>)>> {
    entities
        .par_iter()
        .map(|&entity| aggregate(dataset, entity, partition_rows).map(|rows| (entity, rows)))
        .collect()
}

/// Rollups for `entity` restricted to each calendar period of `award_date`,
/// periods ascending. Rows without an award date belong to no period; a
/// period with no group is left out.
pub fn aggregate_periods(
    dataset: &Dataset,
    entity: EntityType,
    granularity: PeriodGranularity,
    partition_rows: usize,
) -> Result<Vec<(Period, Vec<AggregationRow>)>> {
    check_partition_rows(partition_rows)?;
    let partials: Vec<BTreeMap<Period, PartialAggregate<'_>>> = dataset
        .rows()
        .par_chunks(partition_rows)
        .map(|rows| {
            let mut by_period: BTreeMap<Period, PartialAggregate<'_>> = BTreeMap::new();
            for row in rows {
                let Some(date) = row.award_date else { continue };
                by_period.entry(Period::of(date, granularity)).or_default().add(row, entity);
            }
            by_period
        })
        .collect();

    let mut merged: BTreeMap<Period, PartialAggregate<'_>> = BTreeMap::new();
    for by_period in partials {
        for (period, partial) in by_period {
            merged.entry(period).or_default().merge(partial);
        }
    }
    let out: Vec<_> = merged
        .into_iter()
        .filter(|(_, p)| p.group_count() > 0)
        .map(|(period, p)| (period, p.finish()))
        .collect();
    debug!(entity = %entity, ?granularity, periods = out.len(), "aggregated periods");
    Ok(out)
}
