use anyhow::{anyhow, Context, Result};
use broadband_reconcile::{
    aggregate, classify, compare_with_reference, count_selected, load_features,
    load_group_averages, load_tabular, select_ranked_by, Pipeline, PipelineConfig, RankOrder,
    RepairPolicy, TabularLoad, Threshold,
};
use clap::{Args, Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "broadband-reconcile",
    version,
    about = "Join county geometries with broadband metrics and query the result."
)]
struct Cli {
    /// Pipeline config (JSON). Defaults apply when omitted.
    #[arg(long, global = true, env = "BROADBAND_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Reconcile and merge, print the report (optionally write merged entities).
    Reconcile(ReconcileArgs),
    /// Count entities at or above a percentage threshold.
    Classify(ClassifyArgs),
    /// Mean/median per metric, overall and per group.
    Stats(StatsArgs),
    /// Filtered, sorted top-K records.
    Rank(RankArgs),
}

#[derive(Debug, Args)]
struct SourceArgs {
    /// GeoJSON FeatureCollection of counties
    #[arg(long)]
    geo: PathBuf,

    /// Broadband CSV
    #[arg(long)]
    data: PathBuf,

    /// Override the repair policy from the config
    #[arg(long, value_enum)]
    policy: Option<PolicyArg>,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum PolicyArg {
    DropOrphans,
    PatchByName,
}

impl From<PolicyArg> for RepairPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::DropOrphans => RepairPolicy::DropOrphans,
            PolicyArg::PatchByName => RepairPolicy::PatchByName,
        }
    }
}

#[derive(Debug, Args)]
struct ReconcileArgs {
    #[command(flatten)]
    sources: SourceArgs,

    /// Write merged entities as JSON here
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct ClassifyArgs {
    #[command(flatten)]
    sources: SourceArgs,

    #[arg(long, default_value = "availability")]
    metric: String,

    /// Slider position, 0-100
    #[arg(long, default_value_t = 50, value_parser = clap::value_parser!(u8).range(0..=100))]
    percent: u8,
}

#[derive(Debug, Args)]
struct StatsArgs {
    /// Broadband CSV
    #[arg(long)]
    data: PathBuf,

    /// Categorical column to group by (e.g. area_type)
    #[arg(long)]
    group_by: Option<String>,

    /// Published per-group averages to compare against
    #[arg(long)]
    averages: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct RankArgs {
    /// Broadband CSV
    #[arg(long)]
    data: PathBuf,

    #[arg(long, default_value = "usage")]
    metric: String,

    /// Tag filter, repeatable: --filter area_type=rural
    #[arg(long = "filter", value_parser = parse_filter)]
    filters: Vec<(String, String)>,

    #[arg(long, default_value_t = 10)]
    limit: usize,

    #[arg(long)]
    descending: bool,
}

fn parse_filter(raw: &str) -> Result<(String, String)> {
    let (field, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("expected FIELD=VALUE, got '{}'", raw))?;
    Ok((field.trim().to_string(), value.trim().to_string()))
}

fn main() -> ExitCode {
    if let Err(e) = real_main() {
        error!("{:?}", e);
        eprintln!("❌ {:#}", e);
        return ExitCode::from(1);
    }
    ExitCode::from(0)
}

fn real_main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::default(),
    };

    match cli.cmd {
        Command::Reconcile(args) => cmd_reconcile(config, args),
        Command::Classify(args) => cmd_classify(config, args),
        Command::Stats(args) => cmd_stats(config, args),
        Command::Rank(args) => cmd_rank(config, args),
    }
}

fn load_records(config: &PipelineConfig, path: &Path) -> Result<TabularLoad> {
    let load = load_tabular(path, &config.schema, config.max_primary_code)?;
    println!(
        "✓ Loaded {} broadband records ({} territory rows skipped)",
        load.records.len(),
        load.skipped_territories.len()
    );
    Ok(load)
}

fn run_pipeline(
    mut config: PipelineConfig,
    sources: &SourceArgs,
) -> Result<broadband_reconcile::PipelineOutput> {
    if let Some(policy) = sources.policy {
        config.policy = policy.into();
    }

    let geo = load_features(&sources.geo)?;
    println!("✓ Loaded {} geometries", geo.len());

    let load = load_records(&config, &sources.data)?;
    let output = Pipeline::new(config)
        .run(geo, &load.records)
        .context("Pipeline run failed")?;

    println!("✓ {}", output.report.summary());
    Ok(output)
}

fn cmd_reconcile(config: PipelineConfig, args: ReconcileArgs) -> Result<()> {
    println!("⚖️  Reconciling geometries with broadband data");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let output = run_pipeline(config, &args.sources)?;

    for patch in &output.report.patches {
        println!("  ↪ {} → {} ('{}' matched {})", patch.from, patch.to, patch.token, patch.geo_name);
    }
    if !output.report.is_aligned() {
        println!("  ⚠️  {} geometries without metrics", output.report.unmatched_geo.len());
    }

    if let Some(out) = args.out {
        let json = serde_json::to_string(&output.merged).context("Failed to serialize merged entities")?;
        std::fs::write(&out, json).with_context(|| format!("Failed to write {:?}", out))?;
        println!("💾 Wrote {} merged entities to {:?}", output.merged.len(), out);
    }

    println!("\n✅ {} counties ready", output.merged.len());
    Ok(())
}

fn cmd_classify(config: PipelineConfig, args: ClassifyArgs) -> Result<()> {
    let output = run_pipeline(config, &args.sources)?;

    let threshold = Threshold::from_percent(args.percent)?;
    let selections = classify(&output.merged, &args.metric, threshold.fraction())?;

    println!(
        "\n📊 {} of {} counties have {} {}",
        count_selected(&output.merged, &selections),
        output.merged.len(),
        args.metric,
        threshold.label()
    );
    Ok(())
}

fn cmd_stats(config: PipelineConfig, args: StatsArgs) -> Result<()> {
    let load = load_records(&config, &args.data)?;
    let stats = aggregate(&load.records, args.group_by.as_deref());

    for group in stats.values() {
        println!("\n📊 {} ({} counties)", group.group_key, group.count);
        for (field, mean) in &group.mean {
            let median = group.median.get(field).copied().unwrap_or(f64::NAN);
            println!("   {:<24} mean {:>12.4}  median {:>12.4}", field, mean, median);
        }
    }

    if let Some(path) = args.averages {
        let reference = load_group_averages(&path)?;
        let deviations = compare_with_reference(&stats, &reference);

        println!("\n🔍 Against published averages:");
        for d in deviations {
            println!(
                "   {:<12} {:<16} computed {:.4}  published {:.4}  Δ {:+.4}",
                d.group_key, d.field, d.computed, d.reference, d.delta
            );
        }
    }

    Ok(())
}

fn cmd_rank(config: PipelineConfig, args: RankArgs) -> Result<()> {
    let load = load_records(&config, &args.data)?;
    let filters: BTreeMap<String, String> = args.filters.into_iter().collect();
    let order = if args.descending {
        RankOrder::Descending
    } else {
        RankOrder::Ascending
    };

    let ranked = select_ranked_by(&load.records, &args.metric, &filters, args.limit, order);

    println!("\n🏆 {} counties by {}", ranked.len(), args.metric);
    for (rank, record) in ranked.iter().enumerate() {
        println!(
            "   {:>3}. {} {:<32} {:<3} {:.4}",
            rank + 1,
            record.id,
            record.name,
            record.state,
            record.metric(&args.metric).unwrap_or_default()
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_records_takes_plain_path() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = dir.path().join("broadband.csv");
        std::fs::write(
            &csv_path,
            "id,name,state,availability,usage\n1001,Autauga County,AL,0.81,0.40\n",
        )
        .unwrap();

        let load = load_records(&PipelineConfig::default(), csv_path.as_path()).unwrap();
        assert_eq!(load.records.len(), 1);
    }

    #[test]
    fn test_classify_percent_limited_to_hundred() {
        let args = |percent: &str| {
            Cli::try_parse_from([
                "broadband-reconcile",
                "classify",
                "--geo",
                "counties.geojson",
                "--data",
                "broadband.csv",
                "--percent",
                percent,
            ])
        };

        assert!(args("100").is_ok());
        assert!(args("101").is_err());
        assert!(args("250").is_err());
    }
}
