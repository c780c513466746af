use std::env;
use std::path::PathBuf;

use tracing::info;

use awards_core::config::Config;
use awards_pipeline::{BuildOptions, Pipeline};

const USAGE: &str = "Usage: awards <split [PATH] [--from-store]|assemble|build [--force]|verify|profile|totals|prune>";

fn parse_args() -> (String, Vec<String>) {
    let mut args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() { eprintln!("{USAGE}"); std::process::exit(1); }
    let cmd = args.remove(0);
    (cmd, args)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,lance=warn,lancedb=warn".into()),
        )
        .init();

    let config = Config::load().map_err(|e| { eprintln!("Error loading config: {e}"); e })?;
    let pipeline = Pipeline::from_config(&config, env::current_dir()?)?;
    let (cmd, args) = parse_args();

    match cmd.as_str() {
        "split" => {
            let from_store = args.iter().any(|a| a == "--from-store");
            let manifest = if from_store {
                pipeline.split_from_store().await?
            } else {
                let path = args.iter().find(|a| !a.starts_with('-')).map(PathBuf::from);
                pipeline.split_input(path.as_deref())?
            };
            println!(
                "✅ Split {} rows into {} chunks (manifest {})",
                manifest.total_row_count,
                manifest.chunk_count(),
                manifest.manifest_id
            );
        }
        "assemble" => {
            let manifest = pipeline.load_manifest()?;
            let dataset = pipeline.assemble(&manifest)?;
            println!("✅ Assembled {} rows from {} chunks", dataset.len(), manifest.chunk_count());
        }
        "build" => {
            let force = args.iter().any(|a| a == "--force" || a == "-f");
            let report = pipeline.build(BuildOptions { force }).await?;
            if report.skipped {
                println!("Artifacts already current for manifest {}; use --force to rebuild", report.manifest_id);
            } else {
                println!("✅ Built artifacts for manifest {}", report.manifest_id);
                println!("📊 {} fact rows, {} search rows", report.fact_rows, report.search_rows);
                for (entity, n) in &report.rollups {
                    println!("📊 {}: {n} groups", entity.table_name());
                }
                if !report.period_rollups.is_empty() {
                    let groups: u64 = report.period_rollups.iter().map(|(_, n)| n).sum();
                    println!("📊 {} period tables, {groups} groups", report.period_rollups.len());
                }
            }
        }
        "verify" => {
            let report = pipeline.verify().await?;
            for (table, n) in &report.tables {
                println!("{table}: {n} rows");
            }
            println!("✅ Artifacts match the manifest");
        }
        "profile" => {
            let manifest = pipeline.load_manifest()?;
            let dataset = pipeline.assemble(&manifest)?;
            println!("{}", serde_json::to_string_pretty(&pipeline.profile(&dataset))?);
        }
        "totals" => match pipeline.global_totals().await? {
            Some(totals) => println!("{}", serde_json::to_string_pretty(&totals)?),
            None => println!("No totals recorded yet; run `awards build` first"),
        },
        "prune" => {
            let removed = pipeline.prune()?;
            for dir in &removed {
                info!(path = %dir.display(), "removed stale chunk set");
            }
            println!("✅ Pruned {} chunk sets", removed.len());
        }
        _ => { eprintln!("Unknown command: {cmd}\n{USAGE}"); std::process::exit(1); }
    }
    Ok(())
}
