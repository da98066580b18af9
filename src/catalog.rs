//! Catalog probing: find every array type whose element type is an enum.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::postgres::types::Oid;
use sqlx::postgres::{PgConnection, PgRow};
use sqlx::Row;
use tracing::{debug, warn};

use crate::config::ScanErrorPolicy;
use crate::error::{Error, QueryError, ScanError};

/// Array types (`typcategory = 'A'`) whose element type is an enum (`typcategory = 'E'`).
pub const ENUM_ARRAY_TYPES_QUERY: &str = "SELECT arrtype.oid, arrtype.typname FROM pg_type arrtype
JOIN pg_type enumtype ON arrtype.typelem = enumtype.oid AND arrtype.typcategory = 'A'
WHERE enumtype.typcategory = 'E'";

/// An enum array type as found in `pg_type`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnumArrayType {
    pub oid: u32,
    pub name: String,
}

impl EnumArrayType {
    pub fn new(oid: u32, name: impl Into<String>) -> Self {
        Self {
            oid,
            name: name.into(),
        }
    }
}

/// One scanned result row: a descriptor, or the reason it could not be decoded.
pub type CatalogRow = Result<EnumArrayType, ScanError>;

/// Anything that can run a catalog query and scan `(oid, typname)` rows.
#[async_trait]
pub trait CatalogSource {
    /// Run `sql` and scan every result row.
    ///
    /// A failure to execute the query is an `Err`; per-row decode failures
    /// are returned in place so the caller decides whether they are fatal.
    async fn fetch_enum_array_rows(&mut self, sql: &str) -> Result<Vec<CatalogRow>, QueryError>;
}

#[async_trait]
impl CatalogSource for PgConnection {
    async fn fetch_enum_array_rows(&mut self, sql: &str) -> Result<Vec<CatalogRow>, QueryError> {
        let rows = sqlx::query(sql).fetch_all(&mut *self).await?;
        Ok(rows
            .iter()
            .enumerate()
            .map(|(i, row)| scan_row(i, row))
            .collect())
    }
}

fn scan_row(index: usize, row: &PgRow) -> CatalogRow {
    let oid: Oid = row
        .try_get("oid")
        .map_err(|e| ScanError::new(index, "oid", e.to_string()))?;
    let name: String = row
        .try_get("typname")
        .map_err(|e| ScanError::new(index, "typname", e.to_string()))?;
    Ok(EnumArrayType::new(oid.0, name))
}

/// Result of a successful probe.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeOutcome {
    /// Discovered types keyed by oid.
    pub types: HashMap<u32, String>,
    /// Rows that could not be decoded and were left out of `types`.
    pub skipped: Vec<ScanError>,
}

impl ProbeOutcome {
    /// Descriptors ordered by oid.
    pub fn descriptors(&self) -> Vec<EnumArrayType> {
        let mut out: Vec<_> = self
            .types
            .iter()
            .map(|(&oid, name)| EnumArrayType::new(oid, name.clone()))
            .collect();
        out.sort_by_key(|t| t.oid);
        out
    }
}

/// Run [`ENUM_ARRAY_TYPES_QUERY`] against `source`.
///
/// Query failures are returned immediately. Under [`ScanErrorPolicy::Warn`]
/// undecodable rows are logged and collected in [`ProbeOutcome::skipped`];
/// under [`ScanErrorPolicy::Strict`] the first one is returned as an error.
pub async fn probe_enum_array_types<S>(
    source: &mut S,
    policy: ScanErrorPolicy,
) -> Result<ProbeOutcome, Error>
where
    S: CatalogSource + ?Sized,
{
    debug!(query = ENUM_ARRAY_TYPES_QUERY, "probing pg_type for enum array types");
    let rows = source.fetch_enum_array_rows(ENUM_ARRAY_TYPES_QUERY).await?;

    let mut outcome = ProbeOutcome::default();
    for row in rows {
        match row {
            Ok(t) => {
                outcome.types.insert(t.oid, t.name);
            }
            Err(e) if policy == ScanErrorPolicy::Strict => return Err(e.into()),
            Err(e) => {
                warn!(row = e.row, column = e.column, reason = %e.reason, "skipping undecodable pg_type row");
                outcome.skipped.push(e);
            }
        }
    }
    Ok(outcome)
}
