//! Per-connection type registry.

use std::collections::HashMap;

use tracing::debug;

use crate::catalog::EnumArrayType;
use crate::codec::Codec;

/// A decoding strategy registered under a type oid and name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataType {
    pub oid: u32,
    pub name: String,
    pub codec: Codec,
}

impl DataType {
    pub fn enum_array(oid: u32, name: impl Into<String>) -> Self {
        Self {
            oid,
            name: name.into(),
            codec: Codec::EnumArray,
        }
    }
}

/// Extension point for anything that owns a type registry.
///
/// Registering an oid that is already present replaces the previous entry.
pub trait RegisterDataType {
    fn register_data_type(&mut self, data_type: DataType);
}

/// Map from type oid to its decoding strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeRegistry {
    types: HashMap<u32, DataType>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, oid: u32) -> Option<&DataType> {
        self.types.get(&oid)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&DataType> {
        self.types.values().find(|t| t.name == name)
    }

    pub fn contains(&self, oid: u32) -> bool {
        self.types.contains_key(&oid)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DataType> {
        self.types.values()
    }
}

impl RegisterDataType for TypeRegistry {
    fn register_data_type(&mut self, data_type: DataType) {
        self.types.insert(data_type.oid, data_type);
    }
}

/// Register an enum array decoder for every descriptor.
pub fn register_enum_array_types_into<R, I>(registry: &mut R, types: I)
where
    R: RegisterDataType + ?Sized,
    I: IntoIterator<Item = EnumArrayType>,
{
    for t in types {
        debug!(oid = t.oid, name = %t.name, "registering enum array type");
        registry.register_data_type(DataType::enum_array(t.oid, t.name));
    }
}
