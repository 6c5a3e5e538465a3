//! Table definitions
//!
//! An [`EntityTable`] names the physical table, its key column and the mapped
//! fields. Query properties resolve through the alias map it derives, so a
//! property is either a field alias or a column name.

use crate::query::{
    AliasMap, BOOLEAN_VALUE_CONVERTER, QueryTranslator, SubSelectMap, Value, ValueConverterMap,
};

/// Column storage type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Integer,
    Float,
    Text,
    /// Boolean stored as `Y`/`N`
    Char,
    /// Encoded permission
    Permission,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Property name used in queries
    pub alias: String,
    pub column: String,
    pub data_type: DataType,
    /// Written on update, otherwise only on insert
    pub updatable: bool,
}

#[derive(Debug, Clone)]
pub struct EntityTable {
    name: String,
    id_column: String,
    fields: Vec<Field>,
}

impl EntityTable {
    /// Table with only its key column mapped, as property `id`
    pub fn new(name: impl Into<String>, id_column: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id_column: id_column.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, alias: impl Into<String>, column: impl Into<String>, data_type: DataType) -> Self {
        self.fields.push(Field {
            alias: alias.into(),
            column: column.into(),
            data_type,
            updatable: true,
        });
        self
    }

    /// Field that is written once on insert
    pub fn insert_only_field(
        mut self,
        alias: impl Into<String>,
        column: impl Into<String>,
        data_type: DataType,
    ) -> Self {
        self.fields.push(Field {
            alias: alias.into(),
            column: column.into(),
            data_type,
            updatable: false,
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id_column(&self) -> &str {
        &self.id_column
    }

    /// Mapped fields in insert order, key excluded
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field_by_alias(&self, alias: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.alias == alias)
    }

    /// Property to column, for aliases and bare column names
    pub fn alias_map(&self) -> AliasMap {
        let mut map = AliasMap::new();
        map.insert("id".to_string(), self.id_column.clone());
        map.insert(self.id_column.clone(), self.id_column.clone());
        for f in &self.fields {
            map.insert(f.column.clone(), f.column.clone());
            map.insert(f.alias.clone(), f.column.clone());
        }
        map
    }

    /// `Y`/`N` conversion for every [`DataType::Char`] field
    pub fn value_converter_map(&self) -> ValueConverterMap {
        let mut map = ValueConverterMap::new();
        for f in self.fields.iter().filter(|f| f.data_type == DataType::Char) {
            map.insert(f.alias.clone(), BOOLEAN_VALUE_CONVERTER.clone());
            map.insert(f.column.clone(), BOOLEAN_VALUE_CONVERTER.clone());
        }
        map
    }

    pub fn translator(&self, sub_select_map: SubSelectMap) -> QueryTranslator {
        QueryTranslator::new(self.alias_map(), sub_select_map, self.value_converter_map())
    }
}

/// Store a boolean the way [`DataType::Char`] columns expect it
pub fn bool_to_char(value: bool) -> Value {
    Value::Text(if value { "Y" } else { "N" }.to_string())
}

/// Read a [`DataType::Char`] column, anything but `Y` is false
pub fn char_to_bool(value: &Value) -> bool {
    matches!(value, Value::Text(s) if s == "Y") || value.as_bool() == Some(true)
}
