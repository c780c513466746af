//! Self-describing schema embedded in every chunk and fingerprinted into the manifest.

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::types::FactColumn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Utf8,
    Float64,
    Date,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ColumnType,
    pub nullable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnDef>,
}

impl TableSchema {
    /// blake3 over the canonical JSON form, hex encoded.
    pub fn fingerprint(&self) -> String {
        let bytes = self.to_bytes();
        blake3::hash(&bytes).to_hex().to_string()
    }

    /// Canonical JSON bytes. Field order is fixed by the struct layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        // Serializing plain strings, enums and bools cannot fail.
        serde_json::to_vec(self).unwrap_or_default()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }
}

fn column_def(column: FactColumn) -> ColumnDef {
    let (ty, nullable) = match column {
        FactColumn::Id => (ColumnType::Utf8, false),
        FactColumn::ContractAmount => (ColumnType::Float64, false),
        FactColumn::AwardDate | FactColumn::PublishedDate | FactColumn::ClosingDate => (ColumnType::Date, true),
        _ => (ColumnType::Utf8, true),
    };
    ColumnDef { name: column.name().to_string(), ty, nullable }
}

/// Schema of the procurement fact table.
pub fn fact_schema() -> &'static TableSchema {
    static SCHEMA: OnceLock<TableSchema> = OnceLock::new();
    SCHEMA.get_or_init(|| TableSchema {
        name: "facts_awards".to_string(),
        columns: FactColumn::ALL.into_iter().map(column_def).collect(),
    })
}
