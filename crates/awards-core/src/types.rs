//! Domain types shared by the chunk, derive and store crates.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One procurement-contract record.
///
/// - `id`: stable award identifier, never null
/// - `contract_amount`: never null; non-positive values are kept and flagged by profiling
/// - dimension columns (`awardee_name`, `organization_name`, `area_of_delivery`,
///   `business_category`) may be absent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FactRow {
    pub id: String,
    #[serde(default)]
    pub contract_number: Option<String>,
    #[serde(default)]
    pub award_date: Option<NaiveDate>,
    #[serde(default)]
    pub published_date: Option<NaiveDate>,
    #[serde(default)]
    pub closing_date: Option<NaiveDate>,
    pub contract_amount: f64,
    #[serde(default)]
    pub award_title: Option<String>,
    #[serde(default)]
    pub notice_title: Option<String>,
    #[serde(default)]
    pub awardee_name: Option<String>,
    #[serde(default)]
    pub organization_name: Option<String>,
    #[serde(default)]
    pub area_of_delivery: Option<String>,
    #[serde(default)]
    pub business_category: Option<String>,
}

/// Columns of [`FactRow`] in canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactColumn {
    Id,
    ContractNumber,
    AwardDate,
    PublishedDate,
    ClosingDate,
    ContractAmount,
    AwardTitle,
    NoticeTitle,
    AwardeeName,
    OrganizationName,
    AreaOfDelivery,
    BusinessCategory,
}

impl FactColumn {
    pub const ALL: [FactColumn; 12] = [
        FactColumn::Id,
        FactColumn::ContractNumber,
        FactColumn::AwardDate,
        FactColumn::PublishedDate,
        FactColumn::ClosingDate,
        FactColumn::ContractAmount,
        FactColumn::AwardTitle,
        FactColumn::NoticeTitle,
        FactColumn::AwardeeName,
        FactColumn::OrganizationName,
        FactColumn::AreaOfDelivery,
        FactColumn::BusinessCategory,
    ];

    pub fn name(self) -> &'static str {
        match self {
            FactColumn::Id => "id",
            FactColumn::ContractNumber => "contract_number",
            FactColumn::AwardDate => "award_date",
            FactColumn::PublishedDate => "published_date",
            FactColumn::ClosingDate => "closing_date",
            FactColumn::ContractAmount => "contract_amount",
            FactColumn::AwardTitle => "award_title",
            FactColumn::NoticeTitle => "notice_title",
            FactColumn::AwardeeName => "awardee_name",
            FactColumn::OrganizationName => "organization_name",
            FactColumn::AreaOfDelivery => "area_of_delivery",
            FactColumn::BusinessCategory => "business_category",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }
}

/// Borrowed view of one cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldRef<'a> {
    Text(&'a str),
    OptText(Option<&'a str>),
    Float(f64),
    OptDate(Option<NaiveDate>),
}

/// Owned cell, produced by decoders.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    OptText(Option<String>),
    Float(f64),
    OptDate(Option<NaiveDate>),
}

impl FactRow {
    pub fn field(&self, column: FactColumn) -> FieldRef<'_> {
        match column {
            FactColumn::Id => FieldRef::Text(&self.id),
            FactColumn::ContractNumber => FieldRef::OptText(self.contract_number.as_deref()),
            FactColumn::AwardDate => FieldRef::OptDate(self.award_date),
            FactColumn::PublishedDate => FieldRef::OptDate(self.published_date),
            FactColumn::ClosingDate => FieldRef::OptDate(self.closing_date),
            FactColumn::ContractAmount => FieldRef::Float(self.contract_amount),
            FactColumn::AwardTitle => FieldRef::OptText(self.award_title.as_deref()),
            FactColumn::NoticeTitle => FieldRef::OptText(self.notice_title.as_deref()),
            FactColumn::AwardeeName => FieldRef::OptText(self.awardee_name.as_deref()),
            FactColumn::OrganizationName => FieldRef::OptText(self.organization_name.as_deref()),
            FactColumn::AreaOfDelivery => FieldRef::OptText(self.area_of_delivery.as_deref()),
            FactColumn::BusinessCategory => FieldRef::OptText(self.business_category.as_deref()),
        }
    }

    /// Store a decoded cell. The value kind must match the column's layout.
    pub fn set_field(&mut self, column: FactColumn, value: FieldValue) -> Result<()> {
        match (column, value) {
            (FactColumn::Id, FieldValue::Text(v)) => self.id = v,
            (FactColumn::ContractAmount, FieldValue::Float(v)) => self.contract_amount = v,
            (FactColumn::AwardDate, FieldValue::OptDate(v)) => self.award_date = v,
            (FactColumn::PublishedDate, FieldValue::OptDate(v)) => self.published_date = v,
            (FactColumn::ClosingDate, FieldValue::OptDate(v)) => self.closing_date = v,
            (FactColumn::ContractNumber, FieldValue::OptText(v)) => self.contract_number = v,
            (FactColumn::AwardTitle, FieldValue::OptText(v)) => self.award_title = v,
            (FactColumn::NoticeTitle, FieldValue::OptText(v)) => self.notice_title = v,
            (FactColumn::AwardeeName, FieldValue::OptText(v)) => self.awardee_name = v,
            (FactColumn::OrganizationName, FieldValue::OptText(v)) => self.organization_name = v,
            (FactColumn::AreaOfDelivery, FieldValue::OptText(v)) => self.area_of_delivery = v,
            (FactColumn::BusinessCategory, FieldValue::OptText(v)) => self.business_category = v,
            (column, value) => {
                return Err(Error::SchemaMismatch(format!(
                    "column {} cannot hold {value:?}",
                    column.name()
                )))
            }
        }
        Ok(())
    }

    /// Grouping key for `entity`. Null and empty values have no group.
    pub fn dimension(&self, entity: EntityType) -> Option<&str> {
        let value = match entity {
            EntityType::Area => self.area_of_delivery.as_deref(),
            EntityType::BusinessCategory => self.business_category.as_deref(),
            EntityType::Contractor => self.awardee_name.as_deref(),
            EntityType::Organization => self.organization_name.as_deref(),
        };
        value.filter(|v| !v.is_empty())
    }
}

/// Ordered, homogeneous rows sharing the fact schema. Shared read-only as `Arc<Dataset>`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    rows: Vec<FactRow>,
}

impl Dataset {
    pub fn new(rows: Vec<FactRow>) -> Self { Self { rows } }
    pub fn rows(&self) -> &[FactRow] { &self.rows }
    pub fn len(&self) -> usize { self.rows.len() }
    pub fn is_empty(&self) -> bool { self.rows.is_empty() }
    pub fn iter(&self) -> std::slice::Iter<'_, FactRow> { self.rows.iter() }
    pub fn into_rows(self) -> Vec<FactRow> { self.rows }
}

impl From<Vec<FactRow>> for Dataset {
    fn from(rows: Vec<FactRow>) -> Self { Self::new(rows) }
}

impl FromIterator<FactRow> for Dataset {
    fn from_iter<I: IntoIterator<Item = FactRow>>(iter: I) -> Self { Self::new(iter.into_iter().collect()) }
}

impl<'a> IntoIterator for &'a Dataset {
    type Item = &'a FactRow;
    type IntoIter = std::slice::Iter<'a, FactRow>;
    fn into_iter(self) -> Self::IntoIter { self.rows.iter() }
}

/// Dimension a rollup groups by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Area,
    BusinessCategory,
    Contractor,
    Organization,
}

impl EntityType {
    pub const ALL: [EntityType; 4] =
        [EntityType::Area, EntityType::BusinessCategory, EntityType::Contractor, EntityType::Organization];

    pub fn as_str(self) -> &'static str {
        match self {
            EntityType::Area => "area",
            EntityType::BusinessCategory => "business_category",
            EntityType::Contractor => "contractor",
            EntityType::Organization => "organization",
        }
    }

    /// Artifact table holding this rollup.
    pub fn table_name(self) -> String { format!("agg_{}", self.as_str()) }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for EntityType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| Error::InvalidConfig(format!("unknown entity type '{s}'")))
    }
}

/// Calendar slice a period rollup is restricted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodGranularity {
    Year,
    Quarter,
}

/// One year, or one quarter of a year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Period {
    pub year: i32,
    pub quarter: Option<u32>,
}

impl Period {
    pub fn of(date: NaiveDate, granularity: PeriodGranularity) -> Self {
        let quarter = match granularity {
            PeriodGranularity::Year => None,
            PeriodGranularity::Quarter => Some((date.month() - 1) / 3 + 1),
        };
        Self { year: date.year(), quarter }
    }

    /// `year_2021` or `year_2021_q3`.
    pub fn suffix(&self) -> String {
        match self.quarter {
            Some(q) => format!("year_{}_q{q}", self.year),
            None => format!("year_{}", self.year),
        }
    }

    pub fn table_name(&self, entity: EntityType) -> String {
        format!("{}_{}", entity.table_name(), self.suffix())
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.quarter {
            Some(q) => write!(f, "{}-Q{q}", self.year),
            None => write!(f, "{}", self.year),
        }
    }
}

/// Text fields that feed the search blob, in concatenation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchField {
    AwardTitle,
    NoticeTitle,
    AwardeeName,
    OrganizationName,
    BusinessCategory,
    AreaOfDelivery,
}

impl SearchField {
    pub const DEFAULT_ORDER: [SearchField; 6] = [
        SearchField::AwardTitle,
        SearchField::NoticeTitle,
        SearchField::AwardeeName,
        SearchField::OrganizationName,
        SearchField::BusinessCategory,
        SearchField::AreaOfDelivery,
    ];

    pub fn value(self, row: &FactRow) -> Option<&str> {
        match self {
            SearchField::AwardTitle => row.award_title.as_deref(),
            SearchField::NoticeTitle => row.notice_title.as_deref(),
            SearchField::AwardeeName => row.awardee_name.as_deref(),
            SearchField::OrganizationName => row.organization_name.as_deref(),
            SearchField::BusinessCategory => row.business_category.as_deref(),
            SearchField::AreaOfDelivery => row.area_of_delivery.as_deref(),
        }
    }
}

/// One group of a per-dimension rollup. Exactly nine columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationRow {
    pub entity: String,
    pub contract_count: u64,
    pub category_count: u64,
    pub contractor_count: u64,
    pub organization_count: u64,
    pub total_contract_value: f64,
    pub average_contract_value: f64,
    pub first_contract_date: Option<NaiveDate>,
    pub last_contract_date: Option<NaiveDate>,
}

/// Search projection of one [`FactRow`], keyed by `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRow {
    pub id: String,
    pub contract_number: Option<String>,
    pub award_date: Option<NaiveDate>,
    pub contract_amount: f64,
    pub award_title: Option<String>,
    pub notice_title: Option<String>,
    pub award_title_lower: Option<String>,
    pub notice_title_lower: Option<String>,
    pub title_combined_lower: String,
    pub search_text: String,
    pub search_text_lower: String,
    pub title_words: Vec<String>,
    pub awardee_name: Option<String>,
    pub organization_name: Option<String>,
    pub business_category: Option<String>,
    pub area_of_delivery: Option<String>,
}
