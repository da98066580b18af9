//! Register enum array types on a connection and print what was found.
//!
//! ```sh
//! DATABASE_URL=postgres://localhost/app RUST_LOG=debug cargo run --example register_enums
//! ```

use anyhow::{Context, Result};
use pg_enum_arrays::{register_enum_array_types_with, Config, TypedPgConnection};
use sqlx::{Connection, PgConnection};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let url = std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
    let config = Config::load_or_default()?;

    let conn = PgConnection::connect(&url)
        .await
        .with_context(|| format!("connecting to {url}"))?;
    let mut conn = TypedPgConnection::new(conn);

    let report = register_enum_array_types_with(&mut conn, &config).await?;

    for t in &report.registered {
        println!("{:>8}  {}", t.oid, t.name);
    }
    for skipped in &report.skipped {
        eprintln!("skipped: {skipped}");
    }
    println!(
        "{} enum array types registered, {} rows skipped",
        report.registered.len(),
        report.skipped.len()
    );

    conn.into_inner().close().await?;
    Ok(())
}
