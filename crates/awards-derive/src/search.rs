use rayon::prelude::*;
use tantivy::tokenizer::TextAnalyzer;
use tracing::debug;

use awards_core::error::{Error, Result};
use awards_core::types::{Dataset, FactRow, SearchField, SearchRow};

use crate::analyzer::{fold_case, title_analyzer, tokenize};

/// Builds the search-optimized projection: one [`SearchRow`] per fact row.
#[derive(Clone)]
pub struct SearchProjector {
    fields: Vec<SearchField>,
    analyzer: TextAnalyzer,
}

impl SearchProjector {
    pub fn new(fields: &[SearchField]) -> Result<Self> {
        if fields.is_empty() {
            return Err(Error::InvalidConfig("search_fields must not be empty".into()));
        }
        Ok(Self { fields: fields.to_vec(), analyzer: title_analyzer() })
    }

    /// Configured fields joined by a single space; absent and empty values are skipped.
    pub fn search_text(&self, row: &FactRow) -> String {
        join_present(self.fields.iter().map(|f| f.value(row)))
    }

    fn project_row(&self, analyzer: &mut TextAnalyzer, row: &FactRow) -> SearchRow {
        let search_text = self.search_text(row);
        let title_words = tokenize(analyzer, &search_text);
        SearchRow {
            id: row.id.clone(),
            contract_number: row.contract_number.clone(),
            award_date: row.award_date,
            contract_amount: row.contract_amount,
            award_title: row.award_title.clone(),
            notice_title: row.notice_title.clone(),
            award_title_lower: row.award_title.as_deref().map(fold_case),
            notice_title_lower: row.notice_title.as_deref().map(fold_case),
            title_combined_lower: fold_case(&join_present([row.award_title.as_deref(), row.notice_title.as_deref()])),
            search_text_lower: fold_case(&search_text),
            search_text,
            title_words,
            awardee_name: row.awardee_name.clone(),
            organization_name: row.organization_name.clone(),
            business_category: row.business_category.clone(),
            area_of_delivery: row.area_of_delivery.clone(),
        }
    }

    pub fn project_one(&self, row: &FactRow) -> SearchRow {
        let mut analyzer = self.analyzer.clone();
        self.project_row(&mut analyzer, row)
    }

    /// Project every row, in input order. Each partition tokenizes with its own analyzer.
    pub fn project(&self, dataset: &Dataset, partition_rows: usize) -> Result<Vec<SearchRow>> {
        if partition_rows == 0 {
            return Err(Error::InvalidConfig("partition_rows must be positive".into()));
        }
        let parts: Vec<Vec<SearchRow>> = dataset
            .rows()
            .par_chunks(partition_rows)
            .map(|rows| {
                let mut analyzer = self.analyzer.clone();
                rows.iter().map(|r| self.project_row(&mut analyzer, r)).collect()
            })
            .collect();
        let out: Vec<SearchRow> = parts.into_iter().flatten().collect();
        debug!(rows = out.len(), "built search projection");
        Ok(out)
    }
}

fn join_present<'a>(values: impl IntoIterator<Item = Option<&'a str>>) -> String {
    let mut out = String::new();
    for v in values.into_iter().flatten().filter(|v| !v.is_empty()) {
        if !out.is_empty() { out.push(' '); }
        out.push_str(v);
    }
    out
}
