use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

mod analyzers;
mod config;
mod db;
mod error;
mod insights;
mod models;
mod pipeline;
mod provider;
mod quality;
mod seed;

use config::WatchConfig;
use provider::{PeriodRange, WorldBankProvider};

#[derive(Parser)]
#[command(name = "au-indicator-watch")]
#[command(about = "Development-indicator warehouse for AU member states: extract-load pipeline, quality scoring, insight generation", long_about = None)]
struct Cli {
    /// TOML file overriding analyzer and quality thresholds
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Seed regions, goals, member states, and the indicator catalog
    Seed,
    /// Run the extract-load pipeline and regenerate insights
    Run {
        /// Indicator codes to fetch (default: full catalog)
        #[arg(long, value_delimiter = ',')]
        indicators: Option<Vec<String>>,
        /// Entity ISO codes to fetch (default: all member states)
        #[arg(long, value_delimiter = ',')]
        entities: Option<Vec<String>>,
        #[arg(long, default_value_t = 2000)]
        start_year: i32,
        #[arg(long, default_value_t = 2024)]
        end_year: i32,
        /// Leave the previous insight generation in place
        #[arg(long)]
        skip_insights: bool,
        /// Override the provider base URL
        #[arg(long)]
        provider_url: Option<String>,
    },
    /// Import observations from a CSV file (country_iso, indicator_code, year, value)
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Recompute quality scores for every (state, indicator) pair
    AssessQuality,
    /// Retire the active insight set and generate a new one
    GenerateInsights {
        #[arg(long)]
        run_id: Option<i64>,
    },
    /// Continental data-quality overview
    QualityOverview,
    /// Data-quality ranking by member state
    QualityByState,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("au_indicator_watch=info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = WatchConfig::load(cli.config.as_deref())?;

    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a Postgres instance")?;
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            seed::seed(&pool).await?;
            println!("Reference data seeded.");
        }
        Commands::Run {
            indicators,
            entities,
            start_year,
            end_year,
            skip_insights,
            provider_url,
        } => {
            let provider = match provider_url {
                Some(url) => WorldBankProvider::with_base_url(url),
                None => WorldBankProvider::new(),
            }
            .context("failed to build provider client")?;

            let opts = pipeline::PipelineOptions {
                indicator_codes: indicators,
                entity_codes: entities,
                range: PeriodRange {
                    start_year,
                    end_year,
                },
            };
            let mut summary = pipeline::run_pipeline(&pool, &provider, &cfg, &opts).await?;
            if !skip_insights {
                let generated =
                    insights::generate_insights(&pool, &cfg, Some(summary.run_id)).await?;
                summary.insights_generated = generated.total;
            }
            println!(
                "Run {} {}: {} processed, {} failed, {} skipped across {} indicators; {} insights.",
                summary.run_id,
                summary.status.as_str(),
                summary.records_processed,
                summary.records_failed,
                summary.records_skipped,
                summary.indicators_fetched,
                summary.insights_generated
            );
        }
        Commands::Import { csv } => {
            let summary = pipeline::import_csv(&pool, &csv).await?;
            println!(
                "Imported {} records from {} ({} failed).",
                summary.records_processed,
                csv.display(),
                summary.records_failed
            );
        }
        Commands::AssessQuality => {
            let summary = quality::assess_quality(&pool, &cfg.quality).await?;
            println!("Assessed {} (state, indicator) pairs.", summary.total_scores);
        }
        Commands::GenerateInsights { run_id } => {
            let summary = insights::generate_insights(&pool, &cfg, run_id).await?;
            println!("Generation {}: {} insights.", summary.generation_id, summary.total);
            let counts = &summary.counts;
            println!(
                "  findings {}, alerts {}, trends {}, recommendations {}, comparisons {}, milestones {}",
                counts.finding,
                counts.alert,
                counts.trend,
                counts.recommendation,
                counts.comparison,
                counts.milestone
            );
        }
        Commands::QualityOverview => {
            let overview = quality::quality_overview(&pool).await?;
            println!("Continental average quality score: {:.1}", overview.continental_avg_score);
            println!("States with good data (>70): {}", overview.states_with_good_data);
            println!("States with poor data (<40): {}", overview.states_with_poor_data);
            println!("Most complete indicators:");
            for entry in &overview.most_complete_indicators {
                println!("- {} ({:.1})", entry.indicator, entry.score);
            }
            println!("Least complete indicators:");
            for entry in &overview.least_complete_indicators {
                println!("- {} ({:.1})", entry.indicator, entry.score);
            }
            if !overview.gaps.is_empty() {
                println!("Pairs with no data in the expected window:");
                for gap in &overview.gaps {
                    println!("- {} / {}", gap.state, gap.indicator);
                }
            }
        }
        Commands::QualityByState => {
            for entry in quality::quality_by_state(&pool).await? {
                println!(
                    "- {} ({}) overall {:.1}, completeness {:.1}, {} indicators",
                    entry.state_name,
                    entry.iso_code,
                    entry.overall_score,
                    entry.completeness,
                    entry.indicators_covered
                );
            }
        }
    }

    Ok(())
}
