use arrow_schema::{DataType, Field, Schema};
use std::sync::Arc;

/// Column that pins canonical row order in the facts table.
pub const ROW_ORDINAL: &str = "row_ordinal";

pub fn fact_arrow_schema() -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new(ROW_ORDINAL, DataType::UInt64, false),
		Field::new("id", DataType::Utf8, false),
		Field::new("contract_number", DataType::Utf8, true),
		Field::new("award_date", DataType::Date32, true),
		Field::new("published_date", DataType::Date32, true),
		Field::new("closing_date", DataType::Date32, true),
		Field::new("contract_amount", DataType::Float64, false),
		Field::new("award_title", DataType::Utf8, true),
		Field::new("notice_title", DataType::Utf8, true),
		Field::new("awardee_name", DataType::Utf8, true),
		Field::new("organization_name", DataType::Utf8, true),
		Field::new("area_of_delivery", DataType::Utf8, true),
		Field::new("business_category", DataType::Utf8, true),
	]))
}

pub fn aggregation_arrow_schema() -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new("entity", DataType::Utf8, false),
		Field::new("contract_count", DataType::UInt64, false),
		Field::new("category_count", DataType::UInt64, false),
		Field::new("contractor_count", DataType::UInt64, false),
		Field::new("organization_count", DataType::UInt64, false),
		Field::new("total_contract_value", DataType::Float64, false),
		Field::new("average_contract_value", DataType::Float64, false),
		Field::new("first_contract_date", DataType::Date32, true),
		Field::new("last_contract_date", DataType::Date32, true),
	]))
}

pub fn search_arrow_schema() -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new("id", DataType::Utf8, false),
		Field::new("contract_number", DataType::Utf8, true),
		Field::new("award_date", DataType::Date32, true),
		Field::new("contract_amount", DataType::Float64, false),
		Field::new("award_title", DataType::Utf8, true),
		Field::new("notice_title", DataType::Utf8, true),
		Field::new("award_title_lower", DataType::Utf8, true),
		Field::new("notice_title_lower", DataType::Utf8, true),
		Field::new("title_combined_lower", DataType::Utf8, false),
		Field::new("search_text", DataType::Utf8, false),
		Field::new("search_text_lower", DataType::Utf8, false),
		Field::new("title_words", DataType::List(Arc::new(Field::new("item", DataType::Utf8, true))), false),
		Field::new("awardee_name", DataType::Utf8, true),
		Field::new("organization_name", DataType::Utf8, true),
		Field::new("business_category", DataType::Utf8, true),
		Field::new("area_of_delivery", DataType::Utf8, true),
	]))
}

pub fn meta_arrow_schema() -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new("key", DataType::Utf8, false),
		Field::new("value", DataType::Utf8, false),
		Field::new("updated_at", DataType::Timestamp(arrow_schema::TimeUnit::Millisecond, None), false),
	]))
}
