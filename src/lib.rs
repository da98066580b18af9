//! Decode PostgreSQL arrays of user-defined enum types.
//!
//! Enum types are created at runtime (`CREATE TYPE mood AS ENUM (...)`), so
//! their array types (`_mood`) get oids no driver knows in advance. This crate
//! looks those oids up in `pg_type` and registers an enum array decoder for
//! each one on the connection's type registry.
//!
//! # Example
//! ```no_run
//! use pg_enum_arrays::TypedPgConnection;
//! use sqlx::{Connection, PgConnection};
//!
//! async fn example(url: &str) -> Result<(), Box<dyn std::error::Error>> {
//!     let conn = PgConnection::connect(url).await?;
//!     let mut conn = TypedPgConnection::new(conn);
//!     let report = conn.register_enum_array_types().await?;
//!     println!("registered {} enum array types", report.registered.len());
//!
//!     let row = sqlx::query("SELECT ARRAY['happy', 'sad']::mood[] AS moods")
//!         .fetch_one(conn.connection_mut())
//!         .await?;
//!     let moods = conn.decode_enum_array(&row, "moods")?;
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod registry;

pub use catalog::{
    probe_enum_array_types, CatalogRow, CatalogSource, EnumArrayType, ProbeOutcome,
    ENUM_ARRAY_TYPES_QUERY,
};
pub use codec::{ArrayDimension, Codec, EnumArray, Format};
pub use config::{Config, ScanErrorPolicy};
pub use connection::TypedPgConnection;
pub use error::{ConfigError, DecodeError, Error, QueryError, Result, ScanError};
pub use registry::{register_enum_array_types_into, DataType, RegisterDataType, TypeRegistry};

use tracing::info;

/// Outcome of a successful registration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationReport {
    /// Types registered, ordered by oid.
    pub registered: Vec<EnumArrayType>,
    /// Catalog rows that could not be decoded and were skipped.
    pub skipped: Vec<ScanError>,
}

/// Register an enum array decoder for every enum array type in the catalog.
///
/// The catalog is probed completely before anything is registered, so a query
/// failure leaves the registry untouched. Running this twice is the same as
/// running it once.
pub async fn register_enum_array_types<C>(conn: &mut C) -> Result<RegistrationReport>
where
    C: CatalogSource + RegisterDataType + ?Sized,
{
    register_enum_array_types_with(conn, &Config::default()).await
}

/// [`register_enum_array_types`] with explicit settings.
pub async fn register_enum_array_types_with<C>(
    conn: &mut C,
    config: &Config,
) -> Result<RegistrationReport>
where
    C: CatalogSource + RegisterDataType + ?Sized,
{
    let outcome = probe_enum_array_types(&mut *conn, config.scan.on_error).await?;
    let registered = outcome.descriptors();

    register_enum_array_types_into(&mut *conn, registered.iter().cloned());

    info!(
        registered = registered.len(),
        skipped = outcome.skipped.len(),
        "registered enum array types"
    );
    Ok(RegistrationReport {
        registered,
        skipped: outcome.skipped,
    })
}
