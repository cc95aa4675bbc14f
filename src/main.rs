use std::path::PathBuf;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{ArgGroup, Parser, Subcommand, ValueEnum};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

mod aggregate;
mod config;
mod db;
mod engine;
mod filter;
mod models;
mod render;
mod report;
mod resolver;
mod store;

use config::Settings;
use engine::ReportSettings;
use filter::{DateWindow, Filter};
use report::ReportPayload;

#[derive(Parser)]
#[command(name = "survey-report")]
#[command(about = "Aggregate reports over shop survey responses", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Markdown,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load sample shops, employees, questions and responses
    Seed,
    /// Import responses from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Dashboard report across shops
    #[command(group(
        ArgGroup::new("window")
            .args(["since_days", "from"])
            .multiple(false)
    ))]
    Dashboard {
        #[arg(long)]
        shop: Option<i64>,
        #[arg(long)]
        employee: Option<i64>,
        #[arg(long)]
        since_days: Option<i64>,
        /// First day to include (YYYY-MM-DD)
        #[arg(long)]
        from: Option<NaiveDate>,
        /// Last day to include (YYYY-MM-DD)
        #[arg(long, conflicts_with = "since_days")]
        to: Option<NaiveDate>,
        /// Include per-question averages
        #[arg(long)]
        averages: bool,
        #[arg(long, value_enum, default_value_t = Format::Markdown)]
        format: Format,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Per-employee evaluation report
    Evaluate {
        #[arg(long)]
        shop: Option<i64>,
        #[arg(long)]
        employee: Option<i64>,
        #[arg(long, value_enum, default_value_t = Format::Markdown)]
        format: Format,
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = Settings::from_env().context("invalid configuration")?;

    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .connect(&settings.database_url)
        .await
        .context("failed to connect to Postgres")?;
    let report_settings = ReportSettings {
        zone: settings.zone,
        recent_limit: settings.recent_limit,
    };

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            tracing::info!("schema ready");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
        }
        Commands::Import { csv } => {
            let inserted = db::import_csv(&pool, &csv).await?;
            println!("Inserted {inserted} responses from {}.", csv.display());
        }
        Commands::Dashboard {
            shop,
            employee,
            since_days,
            from,
            to,
            averages,
            format,
            out,
        } => {
            let window = match (since_days, from, to) {
                (Some(days), _, _) => Some(DateWindow::since_days(Utc::now(), days, settings.zone)?),
                (None, None, None) => None,
                (None, from, to) => Some(DateWindow::between_days(from, to, settings.zone)?),
            };
            let filter = Filter {
                shop_id: shop,
                employee_id: employee,
                window,
            };
            filter.validate()?;

            let survey_store = db::PgStore::new(pool);
            let inputs = store::fetch_report_inputs(&survey_store, &filter, settings.fetch_timeout)
                .await
                .context("failed to load dashboard data")?;
            let payload = engine::build_dashboard_report(&inputs, &filter, &report_settings, averages);
            emit(&payload, format, out.as_ref())?;
        }
        Commands::Evaluate {
            shop,
            employee,
            format,
            out,
        } => {
            let filter = Filter::by_shop_and_employee(shop, employee);
            let survey_store = db::PgStore::new(pool);
            let inputs = store::fetch_report_inputs(&survey_store, &filter, settings.fetch_timeout)
                .await
                .context("failed to load evaluation data")?;
            let payload = engine::build_employee_report(&inputs, shop, employee, &report_settings);
            emit(&payload, format, out.as_ref())?;
        }
    }

    Ok(())
}

fn emit(payload: &ReportPayload, format: Format, out: Option<&PathBuf>) -> anyhow::Result<()> {
    let rendered = match format {
        Format::Markdown => render::markdown(payload),
        Format::Json => render::json(payload)?,
    };

    match out {
        Some(path) => {
            std::fs::write(path, rendered)
                .with_context(|| format!("failed to write {}", path.display()))?;
            tracing::info!(path = %path.display(), "report written");
        }
        None => print!("{rendered}"),
    }
    Ok(())
}
