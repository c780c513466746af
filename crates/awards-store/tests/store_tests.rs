use chrono::NaiveDate;

use awards_core::types::{AggregationRow, Dataset, EntityType, FactRow, SearchRow};
use awards_store::ArtifactStore;

fn facts(n: usize) -> Dataset {
    (0..n)
        .map(|i| FactRow {
            id: format!("AW-{i}"),
            contract_number: (i % 2 == 0).then(|| format!("C-{i}")),
            award_date: NaiveDate::from_ymd_opt(2021, 1 + (i % 12) as u32, 15),
            contract_amount: 100.0 + i as f64,
            award_title: Some(format!("Title {i}")),
            area_of_delivery: Some("NCR".to_string()),
            ..FactRow::default()
        })
        .collect()
}

fn rollup(entity: &str, count: u64) -> AggregationRow {
    AggregationRow {
        entity: entity.to_string(),
        contract_count: count,
        category_count: 1,
        contractor_count: 2,
        organization_count: 3,
        total_contract_value: 10.0 * count as f64,
        average_contract_value: 10.0,
        first_contract_date: NaiveDate::from_ymd_opt(2019, 12, 31),
        last_contract_date: None,
    }
}

#[tokio::test]
async fn facts_table_round_trips_in_order() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let store = ArtifactStore::open(tmp.path()).await?;
    let ds = facts(25_123);

    assert_eq!(store.write_facts("facts_awards_all_time", &ds).await?, 25_123);
    assert_eq!(store.row_count("facts_awards_all_time").await?, Some(25_123));
    let back = store.read_facts("facts_awards_all_time").await?;
    assert_eq!(back, ds);
    Ok(())
}

#[tokio::test]
async fn rollups_are_replaced_wholesale() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let store = ArtifactStore::open(tmp.path()).await?;

    store.write_rollup(EntityType::Area, &[rollup("NCR", 2), rollup("Cebu", 1), rollup("Davao", 4)]).await?;
    store.write_rollup(EntityType::Area, &[rollup("NCR", 5)]).await?;
    assert_eq!(store.row_count("agg_area").await?, Some(1));

    let rows = store.read_rollup(EntityType::Area).await?;
    assert_eq!(rows, vec![rollup("NCR", 5)]);
    Ok(())
}

#[tokio::test]
async fn empty_rollup_still_creates_table() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let store = ArtifactStore::open(tmp.path()).await?;
    assert_eq!(store.row_count("agg_contractor").await?, None);
    store.write_rollup(EntityType::Contractor, &[]).await?;
    assert_eq!(store.row_count("agg_contractor").await?, Some(0));
    Ok(())
}

#[tokio::test]
async fn search_table_holds_word_lists() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let store = ArtifactStore::open(tmp.path()).await?;
    let row = SearchRow {
        id: "AW-1".into(),
        contract_number: None,
        award_date: None,
        contract_amount: 1.0,
        award_title: Some("Road Works".into()),
        notice_title: None,
        award_title_lower: Some("road works".into()),
        notice_title_lower: None,
        title_combined_lower: "road works".into(),
        search_text: "Road Works".into(),
        search_text_lower: "road works".into(),
        title_words: vec!["road".into(), "works".into()],
        awardee_name: None,
        organization_name: None,
        business_category: None,
        area_of_delivery: None,
    };
    let empty_words = SearchRow { id: "AW-2".into(), title_words: vec![], ..row.clone() };
    assert_eq!(store.write_search("facts_awards_title_optimized", &[row, empty_words]).await?, 2);
    assert_eq!(store.row_count("facts_awards_title_optimized").await?, Some(2));
    Ok(())
}

#[tokio::test]
async fn meta_values_upsert() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let store = ArtifactStore::open(tmp.path()).await?;
    assert_eq!(store.get_meta("built_manifest").await?, None);
    store.set_meta("built_manifest", "abc").await?;
    store.set_meta("built_manifest", "def").await?;
    store.set_meta("it's", "quoted").await?;
    assert_eq!(store.get_meta("built_manifest").await?.as_deref(), Some("def"));
    assert_eq!(store.get_meta("it's").await?.as_deref(), Some("quoted"));

    store.delete_meta("built_manifest").await?;
    assert_eq!(store.get_meta("built_manifest").await?, None);
    assert_eq!(store.get_meta("it's").await?.as_deref(), Some("quoted"));
    store.delete_meta("never_set").await?;
    Ok(())
}

#[tokio::test]
async fn period_rollup_tables_write_read_and_clear() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let store = ArtifactStore::open(tmp.path()).await?;
    let name = "agg_area_year_2021_q3";
    assert_eq!(store.write_rollup_table(name, &[rollup("NCR", 2), rollup("Cebu", 1)]).await?, 2);
    assert_eq!(store.read_rollup_table(name).await?, vec![rollup("NCR", 2), rollup("Cebu", 1)]);

    store.clear_table(name).await?;
    assert_eq!(store.row_count(name).await?, Some(0));
    store.clear_table("agg_area_year_1999").await?;
    assert_eq!(store.row_count("agg_area_year_1999").await?, None);
    Ok(())
}
