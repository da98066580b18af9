//! sqlx connection paired with its enum array registry.

use std::fmt::Display;

use async_trait::async_trait;
use sqlx::postgres::types::Oid;
use sqlx::postgres::{PgConnection, PgRow};
use sqlx::{ColumnIndex, Row, ValueRef};

use crate::catalog::{CatalogRow, CatalogSource};
use crate::codec::EnumArray;
use crate::error::{DecodeError, Error, QueryError, Result};
use crate::registry::{DataType, RegisterDataType, TypeRegistry};
use crate::RegistrationReport;

/// A caller-supplied [`PgConnection`] with a [`TypeRegistry`] attached.
///
/// Opening, authenticating and closing the connection stay with the caller;
/// use [`TypedPgConnection::into_inner`] to get it back.
pub struct TypedPgConnection {
    conn: PgConnection,
    registry: TypeRegistry,
}

impl TypedPgConnection {
    pub fn new(conn: PgConnection) -> Self {
        Self {
            conn,
            registry: TypeRegistry::new(),
        }
    }

    pub fn into_inner(self) -> PgConnection {
        self.conn
    }

    pub fn connection_mut(&mut self) -> &mut PgConnection {
        &mut self.conn
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Probe the catalog and register every enum array type on this connection.
    pub async fn register_enum_array_types(&mut self) -> Result<RegistrationReport> {
        crate::register_enum_array_types(self).await
    }

    /// Decode an enum array column using the registered decoder for its type.
    ///
    /// Returns `Ok(None)` for SQL NULL, [`Error::UnregisteredType`] when the
    /// column's type oid was never registered and [`Error::MissingTypeOid`]
    /// when the column carries no oid at all.
    pub fn decode_enum_array<I>(&self, row: &PgRow, index: I) -> Result<Option<EnumArray>>
    where
        I: ColumnIndex<PgRow> + Display,
    {
        let column = index.to_string();
        let value = row
            .try_get_raw(index)
            .map_err(|source| Error::Column {
                column: column.clone(),
                source,
            })?;
        if value.is_null() {
            return Ok(None);
        }

        let data_type = lookup_data_type(&self.registry, value.type_info().oid(), &column)?;

        let bytes = value
            .as_bytes()
            .map_err(|e| DecodeError::Binary(e.to_string()))?;
        Ok(Some(data_type.codec.decode(value.format().into(), bytes)?))
    }
}

fn lookup_data_type<'a>(
    registry: &'a TypeRegistry,
    oid: Option<Oid>,
    column: &str,
) -> Result<&'a DataType> {
    match oid {
        Some(Oid(oid)) => registry.get(oid).ok_or(Error::UnregisteredType(oid)),
        None => Err(Error::MissingTypeOid(column.to_string())),
    }
}

#[async_trait]
impl CatalogSource for TypedPgConnection {
    async fn fetch_enum_array_rows(&mut self, sql: &str) -> std::result::Result<Vec<CatalogRow>, QueryError> {
        self.conn.fetch_enum_array_rows(sql).await
    }
}

impl RegisterDataType for TypedPgConnection {
    fn register_data_type(&mut self, data_type: DataType) {
        self.registry.register_data_type(data_type);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> TypeRegistry {
        let mut registry = TypeRegistry::new();
        registry.register_data_type(DataType::enum_array(16402, "_mood"));
        registry
    }

    #[test]
    fn test_lookup_registered_oid() {
        let registry = registry();
        let data_type = lookup_data_type(&registry, Some(Oid(16402)), "moods").unwrap();
        assert_eq!(data_type.name, "_mood");
    }

    #[test]
    fn test_lookup_unregistered_oid() {
        let err = lookup_data_type(&registry(), Some(Oid(1009)), "labels").unwrap_err();
        assert!(matches!(err, Error::UnregisteredType(1009)));
    }

    #[test]
    fn test_lookup_without_oid() {
        let err = lookup_data_type(&registry(), None, "moods").unwrap_err();
        assert!(matches!(err, Error::MissingTypeOid(ref c) if c == "moods"));
    }

    #[test]
    fn test_oid_zero_is_not_missing() {
        let err = lookup_data_type(&registry(), Some(Oid(0)), "moods").unwrap_err();
        assert!(matches!(err, Error::UnregisteredType(0)));
    }
}
