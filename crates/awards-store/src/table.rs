//! LanceDB connection and housekeeping helpers.
//!
//! Open/ensure helpers, whole-table replacement for derived artifacts, and a
//! key/value meta table recording the last built manifest and global totals.
use anyhow::Result;
use lancedb::{connect, Connection};

use arrow_array::{RecordBatch, RecordBatchIterator, StringArray, TimestampMillisecondArray};
use arrow_schema::Schema;
use chrono::Utc;
use lancedb::query::{ExecutableQuery, QueryBase};
use std::sync::Arc;

use crate::schema::meta_arrow_schema;

pub async fn open_db(uri: &str) -> Result<Connection> {
    Ok(connect(uri).execute().await?)
}

pub async fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    Ok(conn.table_names().execute().await?.iter().any(|n| n == name))
}

pub async fn ensure_table(conn: &Connection, name: &str, schema: Arc<Schema>) -> Result<()> {
    if table_exists(conn, name).await? {
        return Ok(());
    }
    // create empty table with 0 rows
    let iter = RecordBatchIterator::new(vec![].into_iter(), schema.clone());
    conn.create_table(name, Box::new(iter)).execute().await?;
    Ok(())
}

/// Drop every row of `name` (creating it if absent) so the next appends form
/// the table's entire content.
pub async fn truncate_table(conn: &Connection, name: &str, schema: Arc<Schema>) -> Result<()> {
    if table_exists(conn, name).await? {
        let t = conn.open_table(name).execute().await?;
        let _ = t.delete("true").await?;
        return Ok(());
    }
    ensure_table(conn, name, schema).await
}

pub async fn append_batch(conn: &Connection, name: &str, batch: RecordBatch) -> Result<()> {
    if batch.num_rows() == 0 { return Ok(()); }
    let schema = batch.schema();
    let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
    conn.open_table(name).execute().await?.add(reader).execute().await?;
    Ok(())
}

/// Row count, or `None` when the table does not exist.
pub async fn count_rows(conn: &Connection, name: &str) -> Result<Option<u64>> {
    if !table_exists(conn, name).await? { return Ok(None); }
    let t = conn.open_table(name).execute().await?;
    Ok(Some(t.count_rows(None).await? as u64))
}

/// Every batch of `name`, in scan order.
pub async fn scan_table(conn: &Connection, name: &str) -> Result<Vec<RecordBatch>> {
    let t = conn.open_table(name).execute().await?;
    let total = t.count_rows(None).await?;
    if total == 0 { return Ok(vec![]); }
    let mut stream = t.query().limit(total).execute().await?;
    let mut batches = Vec::new();
    while let Some(batch) = futures::TryStreamExt::try_next(&mut stream).await? {
        if batch.num_rows() > 0 { batches.push(batch); }
    }
    Ok(batches)
}

pub async fn ensure_meta_table(conn: &Connection, name: &str) -> Result<()> {
    ensure_table(conn, name, meta_arrow_schema()).await
}

pub async fn set_meta(conn: &Connection, table: &str, key: &str, value: &str) -> Result<()> {
    ensure_meta_table(conn, table).await?;
    let t = conn.open_table(table).execute().await?;
    let rb = RecordBatch::try_new(
        meta_arrow_schema(),
        vec![
            Arc::new(StringArray::from(vec![key.to_string()])),
            Arc::new(StringArray::from(vec![value.to_string()])),
            Arc::new(TimestampMillisecondArray::from(vec![Utc::now().timestamp_millis()])),
        ],
    )?;
    let reader = Box::new(RecordBatchIterator::new(vec![Ok(rb)].into_iter(), meta_arrow_schema()));
    // Upsert behavior via merge_insert: key is unique
    let mut mi = t.merge_insert(&["key"]);
    mi.when_matched_update_all(None).when_not_matched_insert_all();
    let _ = mi.execute(reader).await?;
    Ok(())
}

fn key_filter(key: &str) -> String {
    format!("key = '{}'", key.replace('\'', "''"))
}

pub async fn get_meta(conn: &Connection, table: &str, key: &str) -> Result<Option<String>> {
    if !table_exists(conn, table).await? { return Ok(None); }
    let t = conn.open_table(table).execute().await?;
    let mut stream = t.query().only_if(key_filter(key)).execute().await?;
    while let Some(batch) = futures::TryStreamExt::try_next(&mut stream).await? {
        if batch.num_rows() == 0 { continue; }
        let val = batch
            .column_by_name("value")
            .and_then(|c| c.as_any().downcast_ref::<StringArray>())
            .ok_or_else(|| anyhow::anyhow!("meta.value column missing"))?;
        return Ok(Some(val.value(0).to_string()));
    }
    Ok(None)
}

pub async fn delete_meta(conn: &Connection, table: &str, key: &str) -> Result<()> {
    if !table_exists(conn, table).await? { return Ok(()); }
    let t = conn.open_table(table).execute().await?;
    let _ = t.delete(&key_filter(key)).await?;
    Ok(())
}
