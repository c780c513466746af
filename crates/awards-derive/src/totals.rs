use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use awards_core::types::AggregationRow;

pub const TOP_CATEGORIES: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryShare {
    pub entity: String,
    pub contract_count: u64,
    pub total_contract_value: f64,
    /// Percent of the global contract value.
    pub share: f64,
}

/// Headline numbers the dashboard uses for percentages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalTotals {
    pub total_contracts: u64,
    pub total_contract_value: f64,
    pub total_categories: u64,
    pub total_contractors: u64,
    pub total_detailed_contracts: u64,
    pub average_contract_value: f64,
    pub top_categories: Vec<CategoryShare>,
    pub top_categories_value: f64,
    pub top_categories_share: f64,
    pub remaining_share: f64,
}

fn percent(part: f64, whole: f64) -> f64 {
    if whole > 0.0 { part / whole * 100.0 } else { 0.0 }
}

/// Totals from the business-category and contractor rollups plus the fact row count.
pub fn global_totals(
    categories: &[AggregationRow],
    contractors: &[AggregationRow],
    detailed_contracts: u64,
) -> GlobalTotals {
    let total_contracts: u64 = categories.iter().map(|c| c.contract_count).sum();
    let total_value: f64 = categories.iter().map(|c| c.total_contract_value).sum();
    let average = if total_contracts == 0 { 0.0 } else { total_value / total_contracts as f64 };

    let mut ranked: Vec<&AggregationRow> = categories.iter().collect();
    ranked.sort_by(|a, b| {
        b.total_contract_value
            .partial_cmp(&a.total_contract_value)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.entity.cmp(&b.entity))
    });
    let top_categories: Vec<CategoryShare> = ranked
        .into_iter()
        .take(TOP_CATEGORIES)
        .map(|c| CategoryShare {
            entity: c.entity.clone(),
            contract_count: c.contract_count,
            total_contract_value: c.total_contract_value,
            share: percent(c.total_contract_value, total_value),
        })
        .collect();
    let top_value: f64 = top_categories.iter().map(|c| c.total_contract_value).sum();
    let top_share = percent(top_value, total_value);

    GlobalTotals {
        total_contracts,
        total_contract_value: total_value,
        total_categories: categories.len() as u64,
        total_contractors: contractors.len() as u64,
        total_detailed_contracts: detailed_contracts,
        average_contract_value: average,
        top_categories,
        top_categories_value: top_value,
        top_categories_share: top_share,
        remaining_share: 100.0 - top_share,
    }
}
