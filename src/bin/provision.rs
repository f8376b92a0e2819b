//! Operator tool: provision a device id so it can be registered.
//!
//! Connects to the database named by `DATABASE_URL`, applies the schema and
//! inserts the device in the unregistered state.
//!
//! ```text
//! provision ABC123
//! ```
use anyhow::{bail, Result};
use clap::Parser;
use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;

use terradetect::credentials::Credentials;
use terradetect::store::Store;
use terradetect::{config, schema, AdvisorError};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Six-character device id printed on the unit
    device_id: String,

    /// Log level
    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    let args = Args::parse();
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&args.log_level))
        .init();

    let cfg = config::load_from_env()?;
    let Some(db_url) = cfg.db_url.as_deref() else {
        bail!("DATABASE_URL must be set to provision devices");
    };

    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(db_url)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to database: {}", e))?;
    schema::create_schema(&pool).await?;

    let credentials = Credentials::new(Store::postgres(pool));
    match credentials.provision(&args.device_id).await {
        Ok(()) => println!("Device ID {} added successfully.", args.device_id),
        Err(AdvisorError::AlreadyExists(_)) => {
            println!("Device ID {} already exists.", args.device_id)
        }
        Err(e) => return Err(e.into()),
    }

    Ok(())
}
