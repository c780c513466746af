use chrono::NaiveDate;

use awards_core::config::PipelineConfig;
use awards_core::error::{Error, Stage};
use awards_core::types::{Dataset, EntityType, FactRow, Period, PeriodGranularity, SearchField};
use awards_derive::{
    aggregate, aggregate_all, aggregate_periods, derive, derive_rollups, derive_search, global_totals, profile, SearchProjector,
};

fn date(s: &str) -> Option<NaiveDate> { NaiveDate::parse_from_str(s, "%Y-%m-%d").ok() }

fn ncr_cebu() -> Dataset {
    [("NCR", 100.0, "2020-01-01"), ("NCR", 200.0, "2020-06-01"), ("Cebu", 300.0, "2019-12-31")]
        .iter()
        .enumerate()
        .map(|(i, (area, amount, d))| FactRow {
            id: format!("r{i}"),
            area_of_delivery: Some((*area).to_string()),
            contract_amount: *amount,
            award_date: date(d),
            ..FactRow::default()
        })
        .collect()
}

fn mixed(n: usize) -> Dataset {
    (0..n)
        .map(|i| FactRow {
            id: format!("AW-{i}"),
            award_date: NaiveDate::from_ymd_opt(2018 + (i % 5) as i32, 1 + (i % 12) as u32, 1 + (i % 28) as u32),
            contract_amount: 0.1 * i as f64 + 1234.56,
            award_title: Some(format!("Repair of Building {} - Phase {}", i % 13, i % 3)),
            notice_title: (i % 4 != 0).then(|| format!("Procurement No. {i}/PH")),
            awardee_name: (i % 6 != 0).then(|| format!("Builder {}", i % 11)),
            organization_name: Some(format!("Agency {}", i % 9)),
            area_of_delivery: match i % 5 {
                0 => None,
                1 => Some(String::new()),
                k => Some(format!("Region {k}")),
            },
            business_category: Some(format!("Category {}", i % 17)),
            ..FactRow::default()
        })
        .collect()
}

#[test]
fn ncr_cebu_area_rollup() {
    let rows = aggregate(&ncr_cebu(), EntityType::Area, 2).unwrap();
    assert_eq!(rows.len(), 2);

    let ncr = &rows[0];
    assert_eq!(ncr.entity, "NCR");
    assert_eq!(ncr.contract_count, 2);
    assert_eq!(ncr.total_contract_value, 300.0);
    assert_eq!(ncr.average_contract_value, 150.0);
    assert_eq!(ncr.first_contract_date, date("2020-01-01"));
    assert_eq!(ncr.last_contract_date, date("2020-06-01"));

    let cebu = &rows[1];
    assert_eq!(cebu.entity, "Cebu");
    assert_eq!(cebu.contract_count, 1);
    assert_eq!(cebu.total_contract_value, 300.0);
    assert_eq!(cebu.average_contract_value, 300.0);
    assert_eq!(cebu.first_contract_date, date("2019-12-31"));
    assert_eq!(cebu.last_contract_date, date("2019-12-31"));
}

#[test]
fn null_and_empty_dimensions_are_excluded() {
    let ds = mixed(100);
    for entity in EntityType::ALL {
        let rows = aggregate(&ds, entity, 7).unwrap();
        let counted: u64 = rows.iter().map(|r| r.contract_count).sum();
        let expected = ds.iter().filter(|r| r.dimension(entity).is_some()).count() as u64;
        assert_eq!(counted, expected, "{entity}");
        assert!(rows.iter().all(|r| !r.entity.is_empty()));
    }
}

#[test]
fn distinct_counts_ignore_nulls() {
    let ds: Dataset = vec![
        FactRow { id: "1".into(), area_of_delivery: Some("NCR".into()), awardee_name: Some("A".into()), ..FactRow::default() },
        FactRow { id: "2".into(), area_of_delivery: Some("NCR".into()), awardee_name: Some("A".into()), ..FactRow::default() },
        FactRow { id: "3".into(), area_of_delivery: Some("NCR".into()), awardee_name: None, ..FactRow::default() },
        FactRow { id: "4".into(), area_of_delivery: Some("NCR".into()), awardee_name: Some("B".into()), ..FactRow::default() },
    ]
    .into();
    let rows = aggregate(&ds, EntityType::Area, 1).unwrap();
    assert_eq!(rows[0].contractor_count, 2);
    assert_eq!(rows[0].category_count, 0);
    assert_eq!(rows[0].first_contract_date, None);
}

#[test]
fn output_is_identical_across_runs() {
    let ds = mixed(5_000);
    let a = aggregate(&ds, EntityType::BusinessCategory, 256).unwrap();
    let b = aggregate(&ds, EntityType::BusinessCategory, 256).unwrap();
    assert_eq!(a.len(), b.len());
    for (x, y) in a.iter().zip(&b) {
        assert_eq!(x.entity, y.entity);
        assert_eq!(x.contract_count, y.contract_count);
        assert_eq!(x.total_contract_value.to_bits(), y.total_contract_value.to_bits());
        assert_eq!(x.average_contract_value.to_bits(), y.average_contract_value.to_bits());
    }
}

#[test]
fn groups_keep_first_seen_order_across_partitions() {
    let ds = mixed(300);
    let whole = aggregate(&ds, EntityType::Contractor, 1_000).unwrap();
    let split = aggregate(&ds, EntityType::Contractor, 3).unwrap();
    let names = |rows: &[awards_core::AggregationRow]| rows.iter().map(|r| r.entity.clone()).collect::<Vec<_>>();
    assert_eq!(names(&whole), names(&split));
    for (w, s) in whole.iter().zip(&split) {
        assert_eq!(w.contract_count, s.contract_count);
        assert_eq!(w.category_count, s.category_count);
        assert_eq!(w.organization_count, s.organization_count);
        assert_eq!(w.first_contract_date, s.first_contract_date);
        assert!((w.total_contract_value - s.total_contract_value).abs() < 1e-6);
    }
}

#[test]
fn aggregate_all_keeps_requested_order() {
    let ds = mixed(40);
    let all = aggregate_all(&ds, &[EntityType::Organization, EntityType::Area], 8).unwrap();
    assert_eq!(all.iter().map(|(e, _)| *e).collect::<Vec<_>>(), vec![EntityType::Organization, EntityType::Area]);
    assert!(matches!(aggregate(&ds, EntityType::Area, 0), Err(Error::InvalidConfig(_))));
}

#[test]
fn yearly_rollups_split_by_award_year() {
    let years = aggregate_periods(&ncr_cebu(), EntityType::Area, PeriodGranularity::Year, 2).unwrap();
    let periods: Vec<Period> = years.iter().map(|(p, _)| *p).collect();
    assert_eq!(periods, vec![Period { year: 2019, quarter: None }, Period { year: 2020, quarter: None }]);

    let (_, y2019) = &years[0];
    assert_eq!(y2019.len(), 1);
    assert_eq!(y2019[0].entity, "Cebu");
    let (_, y2020) = &years[1];
    assert_eq!(y2020.len(), 1);
    assert_eq!(y2020[0].entity, "NCR");
    assert_eq!(y2020[0].contract_count, 2);
    assert_eq!(y2020[0].total_contract_value, 300.0);
}

#[test]
fn quarterly_rollups_skip_undated_rows_and_empty_periods() {
    let mut rows = ncr_cebu().into_rows();
    rows.push(FactRow { id: "undated".into(), area_of_delivery: Some("NCR".into()), contract_amount: 50.0, ..FactRow::default() });
    rows.push(FactRow { id: "no-area".into(), award_date: date("2021-05-05"), contract_amount: 70.0, ..FactRow::default() });
    let ds = Dataset::new(rows);

    let quarters = aggregate_periods(&ds, EntityType::Area, PeriodGranularity::Quarter, 1).unwrap();
    let names: Vec<String> = quarters.iter().map(|(p, _)| p.table_name(EntityType::Area)).collect();
    assert_eq!(names, vec!["agg_area_year_2019_q4", "agg_area_year_2020_q1", "agg_area_year_2020_q2"]);
    let counted: u64 = quarters.iter().flat_map(|(_, r)| r).map(|r| r.contract_count).sum();
    assert_eq!(counted, 3);
}

#[test]
fn period_rollups_sum_to_the_dated_all_time_rollup() {
    let ds = mixed(400);
    let quarters = aggregate_periods(&ds, EntityType::Organization, PeriodGranularity::Quarter, 13).unwrap();
    let whole = aggregate_periods(&ds, EntityType::Organization, PeriodGranularity::Quarter, 10_000).unwrap();
    assert_eq!(quarters.len(), whole.len());
    for ((p, a), (q, b)) in quarters.iter().zip(&whole) {
        assert_eq!(p, q);
        assert_eq!(a.iter().map(|r| &r.entity).collect::<Vec<_>>(), b.iter().map(|r| &r.entity).collect::<Vec<_>>());
    }
    let per_quarter: u64 = quarters.iter().flat_map(|(_, r)| r).map(|r| r.contract_count).sum();
    let all_time: u64 = aggregate(&ds, EntityType::Organization, 13).unwrap().iter().map(|r| r.contract_count).sum();
    assert_eq!(per_quarter, all_time);
    assert!(matches!(
        aggregate_periods(&ds, EntityType::Area, PeriodGranularity::Year, 0),
        Err(Error::InvalidConfig(_))
    ));
}

#[test]
fn derive_rollups_follow_configured_periods() {
    let ds = ncr_cebu();
    let yearly = PipelineConfig {
        entity_types: vec![EntityType::Area],
        periods: vec![PeriodGranularity::Year],
        partition_rows: 2,
        ..PipelineConfig::default()
    };
    let out = derive_rollups(&ds, &yearly).unwrap();
    assert_eq!(out.all_time.len(), 1);
    let tables: Vec<String> = out.periods.iter().map(|p| p.table_name()).collect();
    assert_eq!(tables, vec!["agg_area_year_2019", "agg_area_year_2020"]);

    let none = PipelineConfig { periods: vec![], ..yearly };
    assert!(derive_rollups(&ds, &none).unwrap().periods.is_empty());
}

#[test]
fn search_projection_is_one_to_one_and_tokens_are_in_blob() {
    let ds = mixed(250);
    let projector = SearchProjector::new(&SearchField::DEFAULT_ORDER).unwrap();
    let out = projector.project(&ds, 16).unwrap();
    assert_eq!(out.len(), ds.len());
    for (row, fact) in out.iter().zip(ds.iter()) {
        assert_eq!(row.id, fact.id);
        assert!(!row.title_words.is_empty());
        for word in &row.title_words {
            assert!(row.search_text_lower.contains(word.as_str()), "{word} not in {}", row.search_text_lower);
            assert!(!word.is_empty());
        }
    }
}

#[test]
fn search_row_fields() {
    let fact = FactRow {
        id: "AW-9".into(),
        contract_amount: 10.0,
        award_title: Some("Road Concreting".into()),
        notice_title: None,
        awardee_name: Some("ACME, Inc.".into()),
        area_of_delivery: Some(String::new()),
        ..FactRow::default()
    };
    let projector = SearchProjector::new(&[SearchField::AwardTitle, SearchField::NoticeTitle, SearchField::AwardeeName, SearchField::AreaOfDelivery]).unwrap();
    let row = projector.project_one(&fact);
    assert_eq!(row.search_text, "Road Concreting ACME, Inc.");
    assert_eq!(row.search_text_lower, "road concreting acme, inc.");
    assert_eq!(row.award_title_lower.as_deref(), Some("road concreting"));
    assert_eq!(row.notice_title_lower, None);
    assert_eq!(row.title_combined_lower, "road concreting");
    assert_eq!(row.title_words, vec!["road", "concreting", "acme", "inc"]);
}

#[test]
fn empty_search_fields_are_rejected() {
    assert!(matches!(SearchProjector::new(&[]), Err(Error::InvalidConfig(_))));
}

#[test]
fn derive_runs_configured_rollups_and_projection() {
    let ds = mixed(120);
    let cfg = PipelineConfig { partition_rows: 10, ..PipelineConfig::default() };
    let out = derive(&ds, &cfg).unwrap();
    assert_eq!(out.rollups.len(), 4);
    assert_eq!(out.search_rows.len(), 120);
    assert!(out.rollup(EntityType::Contractor).is_some());

    let bad = PipelineConfig { partition_rows: 0, ..PipelineConfig::default() };
    let err = derive(&ds, &bad).unwrap_err();
    assert!(matches!(err.stage(), Some(Stage::Aggregate | Stage::Search)));
}

#[test]
fn each_half_of_derive_tags_its_own_stage() {
    let ds = mixed(20);
    let bad = PipelineConfig { partition_rows: 0, ..PipelineConfig::default() };
    let rollup_err = derive_rollups(&ds, &bad).unwrap_err();
    assert_eq!(rollup_err.stage(), Some(Stage::Aggregate));
    let search_err = derive_search(&ds, &bad).unwrap_err();
    assert_eq!(search_err.stage(), Some(Stage::Search));
    assert!(search_err.to_string().contains("[facts_awards_title_optimized]"), "{search_err}");
}

#[test]
fn profile_counts_quality_issues() {
    let mut rows = mixed(30).into_rows();
    rows[3].contract_amount = -5.0;
    rows[4].contract_amount = f64::NAN;
    rows[5].award_date = None;
    let ds = Dataset::new(rows);
    let p = profile(&ds, 7);
    assert_eq!(p.total_rows, 30);
    assert_eq!(p.invalid_amounts, 2);
    assert_eq!(p.nulls.award_date, 1);
    assert_eq!(p.nulls.area_of_delivery, 12);
    assert_eq!(p.nulls.awardee_name, 5);
    assert_eq!(p.distinct_areas, 3);
    assert_eq!(p.distinct_organizations, 9);
}

#[test]
fn global_totals_rank_top_categories() {
    let ds = mixed(200);
    let categories = aggregate(&ds, EntityType::BusinessCategory, 64).unwrap();
    let contractors = aggregate(&ds, EntityType::Contractor, 64).unwrap();
    let totals = global_totals(&categories, &contractors, ds.len() as u64);

    assert_eq!(totals.total_contracts, 200);
    assert_eq!(totals.total_categories, 17);
    assert_eq!(totals.total_contractors, 11);
    assert_eq!(totals.top_categories.len(), 10);
    assert!(totals
        .top_categories
        .windows(2)
        .all(|w| w[0].total_contract_value >= w[1].total_contract_value));
    assert!((totals.top_categories_share + totals.remaining_share - 100.0).abs() < 1e-9);

    let empty = global_totals(&[], &[], 0);
    assert_eq!(empty.average_contract_value, 0.0);
    assert_eq!(empty.top_categories_share, 0.0);
}
