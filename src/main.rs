use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use sqlx::postgres::PgPoolOptions;

use referral_network::repositories::{
    identity::MemoryIdentity,
    postgres::PgStore,
    store::{MemoryStore, Store},
};
use referral_network::services;
use referral_network::settings::{Backend, Settings};

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "referrals.toml")]
    config: String,
    #[arg(long, default_value = "log4rs.yaml")]
    log4rs: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    init_logging(&args.log4rs)?;
    let settings = Settings::new(&args.config)?;
    log::info!("Starting referral network.");

    let store: Arc<dyn Store> = match settings.store.backend {
        Backend::Memory => {
            log::warn!("Using the in-memory store. Nothing will survive a restart.");
            Arc::new(MemoryStore::new())
        }
        Backend::Postgres => {
            let postgres = settings
                .postgres
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("[postgres] section is required for this backend"))?;

            let conn = PgPoolOptions::new()
                .max_connections(postgres.max_connections)
                .connect(&postgres.url)
                .await?;

            let store = PgStore::new(conn);
            store.migrate().await?;
            Arc::new(store)
        }
    };

    services::start_services(store, Arc::new(MemoryIdentity::new()), settings).await
}

fn init_logging(path: &str) -> Result<(), anyhow::Error> {
    if !Path::new("logs").exists() {
        fs::create_dir("logs")?;
    }

    match log4rs::init_file(path, Default::default()) {
        Ok(_) => {
            println!("[*] Logging initialized successfully.");
            Ok(())
        }
        Err(e) => {
            println!("[ERROR] Failed to initialize logging: {}", e);
            Err(anyhow::anyhow!("Could not initialize logging: {}", e))
        }
    }
}
