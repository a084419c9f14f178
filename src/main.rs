use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};

use prodtrack::config::Settings;
use prodtrack::server::{ServerConfig, start_server};
use prodtrack::store::TrackerDb;

#[derive(Parser)]
#[command(name = "prodtrack")]
#[command(version, about = "Manufacturing-process launch tracking backend")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to listen on (overrides PRODTRACK_PORT)
        #[arg(short, long)]
        port: Option<u16>,

        /// Database file path (overrides PRODTRACK_DB)
        #[arg(long)]
        db: Option<PathBuf>,

        /// Bind on all interfaces and allow any CORS origin
        #[arg(long)]
        dev: bool,
    },
    /// Initialize the database and exit
    Init {
        /// Database file path (overrides PRODTRACK_DB)
        #[arg(long)]
        db: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "prodtrack=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let settings = Settings::from_env();

    match cli.command {
        Commands::Serve { port, db, dev } => {
            let mut config = ServerConfig::from_settings(settings);
            if let Some(port) = port {
                config.port = port;
            }
            if let Some(db) = db {
                config.db_path = db;
            }
            config.dev_mode = dev;
            config.sweep_interval = config.sweep_interval.max(Duration::from_secs(1));
            start_server(config).await
        }
        Commands::Init { db } => {
            let db_path = db.unwrap_or(settings.db_path);
            if let Some(parent) = db_path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            TrackerDb::new(&db_path)
                .map_err(|e| anyhow::anyhow!("Failed to initialize database: {}", e))?;
            println!("Database initialized at {}", db_path.display());
            Ok(())
        }
    }
}
