//! Row structs to and from Arrow record batches.

use anyhow::{anyhow, Result};
use arrow_array::builder::{ListBuilder, StringBuilder};
use arrow_array::{Array, Date32Array, Float64Array, RecordBatch, StringArray, UInt64Array};
use chrono::{Datelike, NaiveDate};
use std::sync::Arc;

use awards_core::types::{AggregationRow, FactRow, SearchRow};

use crate::schema::{aggregation_arrow_schema, fact_arrow_schema, search_arrow_schema, ROW_ORDINAL};

/// Days from 0001-01-01 to 1970-01-01, as counted by `num_days_from_ce`.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

pub fn date_to_days(d: NaiveDate) -> i32 { d.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE }

pub fn days_to_date(days: i32) -> Option<NaiveDate> {
	days.checked_add(UNIX_EPOCH_DAYS_FROM_CE).and_then(NaiveDate::from_num_days_from_ce_opt)
}

fn dates(values: impl Iterator<Item = Option<NaiveDate>>) -> Date32Array {
	Date32Array::from(values.map(|d| d.map(date_to_days)).collect::<Vec<_>>())
}

fn strings<'a>(values: impl Iterator<Item = Option<&'a str>>) -> StringArray {
	StringArray::from(values.collect::<Vec<_>>())
}

pub fn facts_to_batch(rows: &[FactRow], first_ordinal: u64) -> Result<RecordBatch> {
	let ordinals: Vec<u64> = (first_ordinal..).take(rows.len()).collect();
	let rb = RecordBatch::try_new(fact_arrow_schema(), vec![
		Arc::new(UInt64Array::from(ordinals)),
		Arc::new(StringArray::from(rows.iter().map(|r| r.id.as_str()).collect::<Vec<_>>())),
		Arc::new(strings(rows.iter().map(|r| r.contract_number.as_deref()))),
		Arc::new(dates(rows.iter().map(|r| r.award_date))),
		Arc::new(dates(rows.iter().map(|r| r.published_date))),
		Arc::new(dates(rows.iter().map(|r| r.closing_date))),
		Arc::new(Float64Array::from(rows.iter().map(|r| r.contract_amount).collect::<Vec<_>>())),
		Arc::new(strings(rows.iter().map(|r| r.award_title.as_deref()))),
		Arc::new(strings(rows.iter().map(|r| r.notice_title.as_deref()))),
		Arc::new(strings(rows.iter().map(|r| r.awardee_name.as_deref()))),
		Arc::new(strings(rows.iter().map(|r| r.organization_name.as_deref()))),
		Arc::new(strings(rows.iter().map(|r| r.area_of_delivery.as_deref()))),
		Arc::new(strings(rows.iter().map(|r| r.business_category.as_deref()))),
	])?;
	Ok(rb)
}

fn counts(rows: &[AggregationRow], f: impl Fn(&AggregationRow) -> u64) -> UInt64Array {
	UInt64Array::from(rows.iter().map(f).collect::<Vec<_>>())
}

pub fn aggregations_to_batch(rows: &[AggregationRow]) -> Result<RecordBatch> {
	let rb = RecordBatch::try_new(aggregation_arrow_schema(), vec![
		Arc::new(StringArray::from(rows.iter().map(|r| r.entity.as_str()).collect::<Vec<_>>())),
		Arc::new(counts(rows, |r| r.contract_count)),
		Arc::new(counts(rows, |r| r.category_count)),
		Arc::new(counts(rows, |r| r.contractor_count)),
		Arc::new(counts(rows, |r| r.organization_count)),
		Arc::new(Float64Array::from(rows.iter().map(|r| r.total_contract_value).collect::<Vec<_>>())),
		Arc::new(Float64Array::from(rows.iter().map(|r| r.average_contract_value).collect::<Vec<_>>())),
		Arc::new(dates(rows.iter().map(|r| r.first_contract_date))),
		Arc::new(dates(rows.iter().map(|r| r.last_contract_date))),
	])?;
	Ok(rb)
}

pub fn search_rows_to_batch(rows: &[SearchRow]) -> Result<RecordBatch> {
	let mut words = ListBuilder::new(StringBuilder::new());
	for row in rows {
		for w in &row.title_words { words.values().append_value(w); }
		words.append(true);
	}
	let rb = RecordBatch::try_new(search_arrow_schema(), vec![
		Arc::new(StringArray::from(rows.iter().map(|r| r.id.as_str()).collect::<Vec<_>>())),
		Arc::new(strings(rows.iter().map(|r| r.contract_number.as_deref()))),
		Arc::new(dates(rows.iter().map(|r| r.award_date))),
		Arc::new(Float64Array::from(rows.iter().map(|r| r.contract_amount).collect::<Vec<_>>())),
		Arc::new(strings(rows.iter().map(|r| r.award_title.as_deref()))),
		Arc::new(strings(rows.iter().map(|r| r.notice_title.as_deref()))),
		Arc::new(strings(rows.iter().map(|r| r.award_title_lower.as_deref()))),
		Arc::new(strings(rows.iter().map(|r| r.notice_title_lower.as_deref()))),
		Arc::new(StringArray::from(rows.iter().map(|r| r.title_combined_lower.as_str()).collect::<Vec<_>>())),
		Arc::new(StringArray::from(rows.iter().map(|r| r.search_text.as_str()).collect::<Vec<_>>())),
		Arc::new(StringArray::from(rows.iter().map(|r| r.search_text_lower.as_str()).collect::<Vec<_>>())),
		Arc::new(words.finish()),
		Arc::new(strings(rows.iter().map(|r| r.awardee_name.as_deref()))),
		Arc::new(strings(rows.iter().map(|r| r.organization_name.as_deref()))),
		Arc::new(strings(rows.iter().map(|r| r.business_category.as_deref()))),
		Arc::new(strings(rows.iter().map(|r| r.area_of_delivery.as_deref()))),
	])?;
	Ok(rb)
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
	batch
		.column_by_name(name)
		.and_then(|c| c.as_any().downcast_ref::<T>())
		.ok_or_else(|| anyhow!("column '{name}' missing or of unexpected type"))
}

fn opt_str(a: &StringArray, i: usize) -> Option<String> {
	a.is_valid(i).then(|| a.value(i).to_string())
}

fn opt_date(a: &Date32Array, i: usize) -> Result<Option<NaiveDate>> {
	if a.is_null(i) { return Ok(None); }
	let days = a.value(i);
	days_to_date(days).map(Some).ok_or_else(|| anyhow!("date out of range: {days}"))
}

/// Rows of a facts batch with their stored ordinals.
pub fn batch_to_facts(batch: &RecordBatch) -> Result<Vec<(u64, FactRow)>> {
	let ordinal = column::<UInt64Array>(batch, ROW_ORDINAL)?;
	let id = column::<StringArray>(batch, "id")?;
	let contract_number = column::<StringArray>(batch, "contract_number")?;
	let award_date = column::<Date32Array>(batch, "award_date")?;
	let published_date = column::<Date32Array>(batch, "published_date")?;
	let closing_date = column::<Date32Array>(batch, "closing_date")?;
	let amount = column::<Float64Array>(batch, "contract_amount")?;
	let award_title = column::<StringArray>(batch, "award_title")?;
	let notice_title = column::<StringArray>(batch, "notice_title")?;
	let awardee = column::<StringArray>(batch, "awardee_name")?;
	let organization = column::<StringArray>(batch, "organization_name")?;
	let area = column::<StringArray>(batch, "area_of_delivery")?;
	let category = column::<StringArray>(batch, "business_category")?;

	let mut out = Vec::with_capacity(batch.num_rows());
	for i in 0..batch.num_rows() {
		out.push((ordinal.value(i), FactRow {
			id: id.value(i).to_string(),
			contract_number: opt_str(contract_number, i),
			award_date: opt_date(award_date, i)?,
			published_date: opt_date(published_date, i)?,
			closing_date: opt_date(closing_date, i)?,
			contract_amount: amount.value(i),
			award_title: opt_str(award_title, i),
			notice_title: opt_str(notice_title, i),
			awardee_name: opt_str(awardee, i),
			organization_name: opt_str(organization, i),
			area_of_delivery: opt_str(area, i),
			business_category: opt_str(category, i),
		}));
	}
	Ok(out)
}

pub fn batch_to_aggregations(batch: &RecordBatch) -> Result<Vec<AggregationRow>> {
	let entity = column::<StringArray>(batch, "entity")?;
	let contract_count = column::<UInt64Array>(batch, "contract_count")?;
	let category_count = column::<UInt64Array>(batch, "category_count")?;
	let contractor_count = column::<UInt64Array>(batch, "contractor_count")?;
	let organization_count = column::<UInt64Array>(batch, "organization_count")?;
	let total = column::<Float64Array>(batch, "total_contract_value")?;
	let average = column::<Float64Array>(batch, "average_contract_value")?;
	let first = column::<Date32Array>(batch, "first_contract_date")?;
	let last = column::<Date32Array>(batch, "last_contract_date")?;

	(0..batch.num_rows())
		.map(|i| {
			Ok(AggregationRow {
				entity: entity.value(i).to_string(),
				contract_count: contract_count.value(i),
				category_count: category_count.value(i),
				contractor_count: contractor_count.value(i),
				organization_count: organization_count.value(i),
				total_contract_value: total.value(i),
				average_contract_value: average.value(i),
				first_contract_date: opt_date(first, i)?,
				last_contract_date: opt_date(last, i)?,
			})
		})
		.collect()
}
