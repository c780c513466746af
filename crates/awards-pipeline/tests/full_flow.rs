use std::fs;
use std::path::Path;

use chrono::NaiveDate;

use awards_core::config::PipelineConfig;
use awards_core::error::{Error, Stage};
use awards_core::types::{Dataset, EntityType, FactRow, PeriodGranularity};
use awards_pipeline::{BuildOptions, Pipeline};
use awards_store::ArtifactStore;

const AREAS: [&str; 4] = ["NCR", "Cebu", "", "Davao"];

fn dataset(n: usize) -> Dataset {
    (0..n)
        .map(|i| FactRow {
            id: format!("AW-{i:03}"),
            contract_number: Some(format!("C-{i}")),
            award_date: NaiveDate::from_ymd_opt(2019 + (i % 3) as i32, 1 + (i % 12) as u32, 10),
            contract_amount: 100.0 * (i + 1) as f64,
            award_title: Some(format!("Supply and Delivery of Lot {i}")),
            notice_title: Some("Public Bidding".to_string()),
            awardee_name: Some(format!("Contractor {}", i % 3)),
            organization_name: Some(format!("Agency {}", i % 2)),
            area_of_delivery: Some(AREAS[i % 4].to_string()),
            business_category: Some(format!("Category {}", i % 5)),
            ..FactRow::default()
        })
        .collect()
}

fn pipeline(base: &Path) -> Pipeline {
    let cfg = PipelineConfig {
        chunk_dir: "chunks".into(),
        lancedb_dir: "lancedb".into(),
        input_dir: "raw".into(),
        rows_per_chunk: Some(4),
        partition_rows: 3,
        periods: vec![PeriodGranularity::Year],
        ..PipelineConfig::default()
    };
    Pipeline::new(cfg, base).unwrap()
}

#[tokio::test]
async fn split_build_verify_and_skip() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let p = pipeline(tmp.path());
    let manifest = p.split_dataset(&dataset(10))?;
    assert_eq!(manifest.chunks.iter().map(|c| c.row_count).collect::<Vec<_>>(), vec![4, 4, 2]);

    let report = p.build(BuildOptions::default()).await?;
    assert!(!report.skipped);
    assert_eq!(report.fact_rows, 10);
    assert_eq!(report.search_rows, 10);
    assert_eq!(report.rollups.len(), 4);
    let area = report.rollups.iter().find(|(e, _)| *e == EntityType::Area).map(|(_, n)| *n);
    assert_eq!(area, Some(3), "empty area values form no group");
    assert_eq!(report.period_rollups.len(), 12);
    assert!(report.period_rollups.contains(&("agg_area_year_2019".to_string(), 3)));
    assert!(report.period_rollups.contains(&("agg_area_year_2021".to_string(), 2)));

    let again = p.build(BuildOptions::default()).await?;
    assert!(again.skipped);
    let forced = p.build(BuildOptions { force: true }).await?;
    assert!(!forced.skipped);

    let verified = p.verify().await?;
    assert_eq!(verified.tables.len(), 6 + 12);

    let totals = p.global_totals().await?.expect("totals recorded");
    assert_eq!(totals.total_contracts, 10);
    assert_eq!(totals.total_categories, 5);

    let store = ArtifactStore::open(&p.lancedb_path()).await?;
    assert_eq!(store.read_facts("facts_awards_all_time").await?, dataset(10));
    let areas = store.read_rollup(EntityType::Area).await?;
    let ncr = areas.iter().find(|r| r.entity == "NCR").expect("NCR group");
    assert_eq!(ncr.contract_count, 3);
    Ok(())
}

#[tokio::test]
async fn schema_drift_aborts_before_any_write() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let p = pipeline(tmp.path());
    let manifest = p.split_dataset(&dataset(10))?;

    let chunk = p.chunk_store().chunk_path(&manifest.manifest_id, 1);
    let mut bytes = fs::read(&chunk)?;
    let needle = b"business_category";
    let at = bytes.windows(needle.len()).position(|w| w == needle).expect("schema header");
    bytes[at] = b'B';
    fs::write(&chunk, bytes)?;

    let err = p.build(BuildOptions::default()).await.unwrap_err();
    assert_eq!(err.stage(), Some(Stage::Assemble));
    assert!(matches!(err.root(), Error::SchemaDrift { part_index: 1 }), "got {err}");
    assert!(err.to_string().contains("[part 1]"));

    let store = ArtifactStore::open(&p.lancedb_path()).await?;
    assert_eq!(store.row_count("facts_awards_all_time").await?, None);
    assert_eq!(store.get_meta(awards_pipeline::META_BUILT_MANIFEST).await?, None);
    Ok(())
}

#[tokio::test]
async fn verify_flags_tampered_tables() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let p = pipeline(tmp.path());
    p.split_dataset(&dataset(10))?;
    p.build(BuildOptions::default()).await?;

    let store = ArtifactStore::open(&p.lancedb_path()).await?;
    store.write_facts("facts_awards_all_time", &dataset(7)).await?;

    let err = p.verify().await.unwrap_err();
    assert_eq!(err.stage(), Some(Stage::Store));
    match err.root() {
        Error::ArtifactMismatch { table, .. } => assert_eq!(table, "facts_awards_all_time"),
        other => panic!("unexpected {other}"),
    }
    Ok(())
}

#[tokio::test]
async fn failed_forced_rebuild_is_not_mistaken_for_current() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let p = pipeline(tmp.path());
    p.split_dataset(&dataset(10))?;
    p.build(BuildOptions::default()).await?;

    // Same chunks and store, but the search table collides with a rollup
    // table, so the forced rebuild fails after the facts and rollups are written.
    let cfg = PipelineConfig { search_table: "agg_area".into(), ..p.config().clone() };
    let colliding = Pipeline::new(cfg, tmp.path())?;
    let err = colliding.build(BuildOptions { force: true }).await.unwrap_err();
    assert_eq!(err.stage(), Some(Stage::Store));
    assert!(err.to_string().contains("[agg_area]"), "got {err}");

    let store = ArtifactStore::open(&p.lancedb_path()).await?;
    assert_eq!(store.get_meta(awards_pipeline::META_BUILT_MANIFEST).await?, None);

    let retry = p.build(BuildOptions::default()).await?;
    assert!(!retry.skipped);
    p.verify().await?;
    Ok(())
}

#[tokio::test]
async fn rebuild_clears_period_tables_it_no_longer_produces() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let p = pipeline(tmp.path());
    p.split_dataset(&dataset(10))?;
    p.build(BuildOptions::default()).await?;

    // Two rows only cover 2019 and 2020.
    p.split_dataset(&dataset(2))?;
    let report = p.build(BuildOptions::default()).await?;
    assert_eq!(report.period_rollups.len(), 8);

    let store = ArtifactStore::open(&p.lancedb_path()).await?;
    assert_eq!(store.row_count("agg_area_year_2021").await?, Some(0));
    let y2019 = store.read_rollup_table("agg_area_year_2019").await?;
    assert_eq!(y2019.iter().map(|r| r.entity.as_str()).collect::<Vec<_>>(), vec!["NCR"]);

    let verified = p.verify().await?;
    assert_eq!(verified.tables.len(), 6 + 8);
    assert!(verified.tables.iter().all(|(t, _)| t != "agg_area_year_2021"));
    Ok(())
}

#[test]
fn split_input_accepts_a_single_file() {
    let tmp = tempfile::tempdir().unwrap();
    let p = pipeline(tmp.path());
    let file = tmp.path().join("awards.jsonl");
    let lines: Vec<String> = dataset(5).iter().map(|r| serde_json::to_string(r).unwrap()).collect();
    fs::write(&file, lines.join("\n")).unwrap();

    let manifest = p.split_input(Some(&file)).unwrap();
    assert_eq!(manifest.total_row_count, 5);
    assert_eq!(p.assemble(&manifest).unwrap(), dataset(5));
}

#[test]
fn split_input_reads_jsonl_and_prunes_stale_sets() {
    let tmp = tempfile::tempdir().unwrap();
    let p = pipeline(tmp.path());
    let raw = tmp.path().join("raw");
    fs::create_dir_all(&raw).unwrap();
    let lines: Vec<String> = dataset(6).iter().map(|r| serde_json::to_string(r).unwrap()).collect();
    fs::write(raw.join("awards.jsonl"), lines.join("\n")).unwrap();

    let first = p.split_input(None).unwrap();
    assert_eq!(first.total_row_count, 6);
    assert_eq!(p.assemble(&first).unwrap(), dataset(6));

    let second = p.split_dataset(&dataset(9)).unwrap();
    assert_ne!(first.manifest_id, second.manifest_id);
    let removed = p.prune().unwrap();
    assert_eq!(removed.len(), 1);
    assert!(removed[0].ends_with(&first.manifest_id));
    assert_eq!(p.assemble(&second).unwrap(), dataset(9));
    assert!(raw.join("awards.jsonl").exists());
}

#[test]
fn empty_input_is_a_split_error() {
    let tmp = tempfile::tempdir().unwrap();
    let p = pipeline(tmp.path());
    let err = p.split_dataset(&Dataset::default()).unwrap_err();
    assert_eq!(err.stage(), Some(Stage::Split));
    assert!(matches!(err.root(), Error::EmptyDataset));
}

#[test]
fn invalid_config_is_rejected_up_front() {
    let cfg = PipelineConfig { entity_types: vec![], ..PipelineConfig::default() };
    let err = Pipeline::new(cfg, ".").err().expect("invalid config");
    assert_eq!(err.stage(), Some(Stage::Config));
    assert!(matches!(err.root(), Error::InvalidConfig(_)));
}
