use std::collections::HashSet;

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use awards_core::types::{Dataset, EntityType, FactRow};

/// Rows whose value is null (or empty) per column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NullCounts {
    pub awardee_name: u64,
    pub organization_name: u64,
    pub area_of_delivery: u64,
    pub business_category: u64,
    pub award_date: u64,
}

/// Shape and data-quality summary of a dataset. Quality findings are counts, never errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetProfile {
    pub total_rows: u64,
    pub distinct_contractors: u64,
    pub distinct_organizations: u64,
    pub distinct_areas: u64,
    pub distinct_categories: u64,
    pub first_award_date: Option<NaiveDate>,
    pub last_award_date: Option<NaiveDate>,
    pub total_contract_value: f64,
    pub average_contract_value: f64,
    pub nulls: NullCounts,
    /// Non-positive or non-finite amounts.
    pub invalid_amounts: u64,
}

#[derive(Default)]
struct ProfileAcc<'a> {
    rows: u64,
    contractors: HashSet<&'a str>,
    organizations: HashSet<&'a str>,
    areas: HashSet<&'a str>,
    categories: HashSet<&'a str>,
    first: Option<NaiveDate>,
    last: Option<NaiveDate>,
    total: f64,
    nulls: NullCounts,
    invalid_amounts: u64,
}

impl<'a> ProfileAcc<'a> {
    fn from_rows(rows: &'a [FactRow]) -> Self {
        let mut acc = Self::default();
        for row in rows {
            acc.rows += 1;
            acc.total += row.contract_amount;
            if !(row.contract_amount.is_finite() && row.contract_amount > 0.0) { acc.invalid_amounts += 1; }
            track(&mut acc.contractors, &mut acc.nulls.awardee_name, row.dimension(EntityType::Contractor));
            track(&mut acc.organizations, &mut acc.nulls.organization_name, row.dimension(EntityType::Organization));
            track(&mut acc.areas, &mut acc.nulls.area_of_delivery, row.dimension(EntityType::Area));
            track(&mut acc.categories, &mut acc.nulls.business_category, row.dimension(EntityType::BusinessCategory));
            match row.award_date {
                Some(d) => {
                    acc.first = Some(acc.first.map_or(d, |f| f.min(d)));
                    acc.last = Some(acc.last.map_or(d, |l| l.max(d)));
                }
                None => acc.nulls.award_date += 1,
            }
        }
        acc
    }

    fn merge(mut self, other: ProfileAcc<'a>) -> Self {
        self.rows += other.rows;
        self.total += other.total;
        self.invalid_amounts += other.invalid_amounts;
        self.contractors.extend(other.contractors);
        self.organizations.extend(other.organizations);
        self.areas.extend(other.areas);
        self.categories.extend(other.categories);
        self.first = [self.first, other.first].into_iter().flatten().min();
        self.last = [self.last, other.last].into_iter().flatten().max();
        self.nulls.awardee_name += other.nulls.awardee_name;
        self.nulls.organization_name += other.nulls.organization_name;
        self.nulls.area_of_delivery += other.nulls.area_of_delivery;
        self.nulls.business_category += other.nulls.business_category;
        self.nulls.award_date += other.nulls.award_date;
        self
    }
}

fn track<'a>(set: &mut HashSet<&'a str>, nulls: &mut u64, value: Option<&'a str>) {
    match value {
        Some(v) => { set.insert(v); }
        None => *nulls += 1,
    }
}

pub fn profile(dataset: &Dataset, partition_rows: usize) -> DatasetProfile {
    let acc = dataset
        .rows()
        .par_chunks(partition_rows.max(1))
        .map(ProfileAcc::from_rows)
        .collect::<Vec<_>>()
        .into_iter()
        .fold(ProfileAcc::default(), ProfileAcc::merge);
    let average = if acc.rows == 0 { 0.0 } else { acc.total / acc.rows as f64 };
    DatasetProfile {
        total_rows: acc.rows,
        distinct_contractors: acc.contractors.len() as u64,
        distinct_organizations: acc.organizations.len() as u64,
        distinct_areas: acc.areas.len() as u64,
        distinct_categories: acc.categories.len() as u64,
        first_award_date: acc.first,
        last_award_date: acc.last,
        total_contract_value: acc.total,
        average_contract_value: average,
        nulls: acc.nulls,
        invalid_amounts: acc.invalid_amounts,
    }
}
