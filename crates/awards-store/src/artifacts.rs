use anyhow::{anyhow, Result};
use arrow_array::RecordBatch;
use arrow_schema::Schema;
use indicatif::{ProgressBar, ProgressStyle};
use lancedb::Connection;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use awards_core::types::{AggregationRow, Dataset, EntityType, SearchRow};

use crate::convert::{aggregations_to_batch, batch_to_aggregations, batch_to_facts, facts_to_batch, search_rows_to_batch};
use crate::schema::{aggregation_arrow_schema, fact_arrow_schema, search_arrow_schema};
use crate::table;

pub const META_TABLE: &str = "meta";
const WRITE_BATCH_ROWS: usize = 10_000;

/// LanceDB-backed sink for the canonical table and its derived artifacts.
pub struct ArtifactStore {
    conn: Connection,
    uri: String,
}

impl ArtifactStore {
    pub async fn open(path: &Path) -> Result<Self> {
        std::fs::create_dir_all(path)?;
        let uri = path.to_string_lossy().to_string();
        let conn = table::open_db(&uri).await?;
        Ok(Self { conn, uri })
    }

    /// Replace `name` with the dataset, preserving row order via the ordinal column.
    pub async fn write_facts(&self, name: &str, dataset: &Dataset) -> Result<u64> {
        let rows = dataset.rows();
        let pb = progress(rows.len() as u64, name)?;
        table::truncate_table(&self.conn, name, fact_arrow_schema()).await?;
        let mut written = 0u64;
        for part in rows.chunks(WRITE_BATCH_ROWS) {
            table::append_batch(&self.conn, name, facts_to_batch(part, written)?).await?;
            written += part.len() as u64;
            pb.set_position(written);
        }
        pb.finish_and_clear();
        info!(table = name, rows = written, "wrote canonical facts");
        Ok(written)
    }

    /// The canonical dataset, in stored ordinal order.
    pub async fn read_facts(&self, name: &str) -> Result<Dataset> {
        if !table::table_exists(&self.conn, name).await? {
            return Err(anyhow!("table '{name}' not found in {}", self.uri));
        }
        let mut rows = Vec::new();
        for batch in table::scan_table(&self.conn, name).await? {
            rows.extend(batch_to_facts(&batch)?);
        }
        rows.sort_by_key(|(ordinal, _)| *ordinal);
        Ok(rows.into_iter().map(|(_, row)| row).collect())
    }

    pub async fn write_rollup(&self, entity: EntityType, rows: &[AggregationRow]) -> Result<u64> {
        self.write_rollup_table(&entity.table_name(), rows).await
    }

    pub async fn read_rollup(&self, entity: EntityType) -> Result<Vec<AggregationRow>> {
        self.read_rollup_table(&entity.table_name()).await
    }

    /// Replace any rollup-shaped table, e.g. a period rollup.
    pub async fn write_rollup_table(&self, name: &str, rows: &[AggregationRow]) -> Result<u64> {
        self.replace(name, aggregation_arrow_schema(), rows, aggregations_to_batch).await
    }

    pub async fn read_rollup_table(&self, name: &str) -> Result<Vec<AggregationRow>> {
        let mut rows = Vec::new();
        for batch in table::scan_table(&self.conn, name).await? {
            rows.extend(batch_to_aggregations(&batch)?);
        }
        Ok(rows)
    }

    /// Empty `name` if it exists. Used for artifacts a newer build no longer produces.
    pub async fn clear_table(&self, name: &str) -> Result<()> {
        if table::table_exists(&self.conn, name).await? {
            table::truncate_table(&self.conn, name, aggregation_arrow_schema()).await?;
            info!(table = name, "cleared stale artifact table");
        }
        Ok(())
    }

    pub async fn write_search(&self, name: &str, rows: &[SearchRow]) -> Result<u64> {
        self.replace(name, search_arrow_schema(), rows, search_rows_to_batch).await
    }

    async fn replace<T>(
        &self,
        name: &str,
        schema: Arc<Schema>,
        rows: &[T],
        to_batch: fn(&[T]) -> Result<RecordBatch>,
    ) -> Result<u64> {
        let pb = progress(rows.len() as u64, name)?;
        table::truncate_table(&self.conn, name, schema).await?;
        let mut written = 0u64;
        for part in rows.chunks(WRITE_BATCH_ROWS) {
            table::append_batch(&self.conn, name, to_batch(part)?).await?;
            written += part.len() as u64;
            pb.set_position(written);
        }
        pb.finish_and_clear();
        info!(table = name, rows = written, "wrote artifact table");
        Ok(written)
    }

    pub async fn row_count(&self, name: &str) -> Result<Option<u64>> {
        table::count_rows(&self.conn, name).await
    }

    pub async fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        table::set_meta(&self.conn, META_TABLE, key, value).await
    }

    pub async fn get_meta(&self, key: &str) -> Result<Option<String>> {
        table::get_meta(&self.conn, META_TABLE, key).await
    }

    pub async fn delete_meta(&self, key: &str) -> Result<()> {
        table::delete_meta(&self.conn, META_TABLE, key).await
    }
}

fn progress(len: u64, table: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} rows ({percent}%) {msg}")?
            .progress_chars("#>-"),
    );
    pb.set_message(table.to_string());
    Ok(pb)
}
