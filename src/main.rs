mod bill_db;
mod config;
mod error;
mod extract;
mod normalize;
mod pipeline;
mod report;
mod review;
mod upload;
mod vision;

use anyhow::Context;
use bill_db::BillStore;
use clap::{Parser, Subcommand};
use config::{Config, Provider};
use std::path::{Path, PathBuf};
use tracing::info;
use upload::Upload;

#[derive(Parser)]
#[command(name = "bill_ledger", version, about = "Read bills with a vision model and keep them in a local ledger")]
struct Cli {
    /// Config file (TOML)
    #[arg(long, global = true, default_value = config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Ledger database, overriding `db_path` from the config
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Read a bill (PDF, PNG or JPEG), review the fields and save them
    Scan {
        file: PathBuf,
        /// Save the proposed fields without reviewing them
        #[arg(long)]
        yes: bool,
    },
    /// Show every saved bill, newest first
    List,
    /// Show bills whose invoice number or company contains TERM
    Search { term: String },
    /// Write saved bills to a CSV file
    Export {
        path: PathBuf,
        /// Only export bills matching this search term
        #[arg(long)]
        term: Option<String>,
    },
    /// Choose the vision provider (together or gemini)
    Provider { name: String },
}

#[tokio::main]
async fn main() {
    // init tracing; stdout is kept for tables and CSV
    tracing_subscriber::fmt()
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Provider { name } => {
            let provider: Provider = name.parse()?;
            Config::set_provider(&cli.config, provider)
                .with_context(|| format!("updating {}", cli.config.display()))?;
            println!("Vision provider set to {provider}");
        }
        Command::Scan { file, yes } => {
            let (cfg, store) = open_ledger(&cli.config, cli.db.as_deref())?;
            info!(file = %file.display(), "Scanning bill");

            let upload = Upload::from_path(&file)?;
            let model = vision::from_settings(cfg.vision_settings()?)?;
            let proposal = pipeline::propose(model.as_ref(), &upload).await?;

            let confirmed = if yes {
                Some(proposal)
            } else {
                review::review(proposal)?
            };

            match confirmed {
                Some(fields) => {
                    let id = pipeline::commit(&store, &fields)?;
                    println!("Saved bill #{id}");
                }
                None => {
                    info!("Bill discarded by user");
                    println!("Discarded.");
                }
            }
        }
        Command::List => {
            let (_, store) = open_ledger(&cli.config, cli.db.as_deref())?;
            let bills = store.list_all()?;
            let total = store.total_cost_sum(None)?;
            println!("Bills\n{}", report::bills_table(&bills, total));
        }
        Command::Search { term } => {
            let (_, store) = open_ledger(&cli.config, cli.db.as_deref())?;
            let bills = store.search(&term)?;
            let total = store.total_cost_sum(Some(&term))?;
            info!(term = %term, count = bills.len(), "Search complete");
            println!("Bills matching {term:?}\n{}", report::bills_table(&bills, total));
        }
        Command::Export { path, term } => {
            let (_, store) = open_ledger(&cli.config, cli.db.as_deref())?;
            let bills = match term.as_deref() {
                Some(term) => store.search(term)?,
                None => store.list_all()?,
            };
            report::export_csv(&path, &bills)?;
            info!(path = %path.display(), count = bills.len(), "CSV exported");
            println!("Wrote {} bills to {}", bills.len(), path.display());
        }
    }

    Ok(())
}

/// Load the config and open the ledger it points at (or the `--db` override).
fn open_ledger(config_path: &Path, db: Option<&Path>) -> anyhow::Result<(Config, BillStore)> {
    let cfg = Config::load_or_default(config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    let db_path = db.map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from(&cfg.db_path));
    let store = BillStore::open(&db_path)
        .with_context(|| format!("opening ledger {}", db_path.display()))?;
    Ok((cfg, store))
}
