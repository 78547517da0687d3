//! # Tables, Aliases and Schemas
//!
//! A base [`Table`] is catalog metadata: its name, its schema and the statistics
//! gathered for it. A query never works with a base table directly. Each entry of
//! the FROM list binds a table to an alias, producing a [`TableRef`]. The same base
//! table may be bound twice (a self-join); the two references share the schema
//! shape but are different relations, and every attribute they expose is qualified
//! by the alias.
//!
//! Schemas are append-only while being built and are not modified afterwards. The
//! schemas flowing through the optimizer (target schemas, node output schemas) hold
//! alias-qualified attributes.

use crate::stats::ColumnStatistics;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Attribute types understood by the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttrType {
    Int,
    Double,
    String,
    Bool,
    Date,
}

impl fmt::Display for AttrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AttrType::Int => "int",
            AttrType::Double => "double",
            AttrType::String => "string",
            AttrType::Bool => "bool",
            AttrType::Date => "date",
        };
        write!(f, "{}", s)
    }
}

/// One attribute of a schema. `relation` is the alias for qualified attributes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Attribute {
    pub relation: Option<String>,
    pub name: String,
    pub ty: AttrType,
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.relation {
            Some(r) => write!(f, "{}.{}: {}", r, self.name, self.ty),
            None => write!(f, "{}: {}", self.name, self.ty),
        }
    }
}

/// Ordered sequence of attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    attrs: Vec<Attribute>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Schema::append`] for unqualified base-table attributes.
    pub fn with_attr(mut self, name: impl Into<String>, ty: AttrType) -> Self {
        self.append(Attribute {
            relation: None,
            name: name.into(),
            ty,
        });
        self
    }

    pub fn append(&mut self, attr: Attribute) {
        self.attrs.push(attr);
    }

    pub fn attrs(&self) -> &[Attribute] {
        &self.attrs
    }

    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    pub fn find(&self, name: &str) -> Option<&Attribute> {
        self.attrs.iter().find(|a| a.name == name)
    }

    /// True if the schema holds `alias.name`.
    pub fn contains(&self, alias: &str, name: &str) -> bool {
        self.attrs
            .iter()
            .any(|a| a.relation.as_deref() == Some(alias) && a.name == name)
    }
}

/// A base table as stored in the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub schema: Schema,
    /// Number of tuples stored in the table.
    pub tuple_count: f64,
    /// Per-attribute statistics keyed by the unqualified attribute name.
    pub column_stats: HashMap<String, ColumnStatistics>,
}

impl Table {
    pub fn new(name: impl Into<String>, schema: Schema, tuple_count: f64) -> Self {
        Self {
            name: name.into(),
            schema,
            tuple_count,
            column_stats: HashMap::new(),
        }
    }

    pub fn with_column_stats(mut self, attribute: impl Into<String>, stats: ColumnStatistics) -> Self {
        self.column_stats.insert(attribute.into(), stats);
        self
    }

    /// Bind this table to `alias`, producing a new relation with its own identity.
    pub fn alias(self: &Arc<Self>, alias: impl Into<String>) -> TableRef {
        TableRef {
            alias: alias.into(),
            table: Arc::clone(self),
        }
    }
}

/// A base table bound to an alias within one query.
#[derive(Debug, Clone)]
pub struct TableRef {
    alias: String,
    table: Arc<Table>,
}

impl TableRef {
    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    /// Rebind the same base table under another alias.
    pub fn realias(&self, alias: impl Into<String>) -> TableRef {
        self.table.alias(alias)
    }

    /// The table's attributes, qualified by this reference's alias.
    pub fn schema(&self) -> Schema {
        let mut schema = Schema::new();
        for attr in self.table.schema.attrs() {
            schema.append(Attribute {
                relation: Some(self.alias.clone()),
                name: attr.name.clone(),
                ty: attr.ty,
            });
        }
        schema
    }
}

/// Identity is the alias: within a query an alias names exactly one relation.
impl PartialEq for TableRef {
    fn eq(&self, other: &Self) -> bool {
        self.alias == other.alias && self.table.name == other.table.name
    }
}

impl Eq for TableRef {}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.alias == self.table.name {
            write!(f, "{}", self.alias)
        } else {
            write!(f, "{} AS {}", self.table.name, self.alias)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn employees() -> Arc<Table> {
        Arc::new(Table::new(
            "employees",
            Schema::new()
                .with_attr("id", AttrType::Int)
                .with_attr("manager_id", AttrType::Int)
                .with_attr("name", AttrType::String),
            500.0,
        ))
    }

    #[test]
    fn test_alias_qualifies_schema() {
        let t = employees();
        let e = t.alias("e");
        let schema = e.schema();

        assert_eq!(schema.len(), 3);
        assert!(schema.contains("e", "manager_id"));
        assert!(!schema.contains("employees", "manager_id"));
        assert_eq!(schema.attrs()[2].to_string(), "e.name: string");
    }

    #[test]
    fn test_self_join_aliases_are_distinct_relations() {
        let t = employees();
        let e = t.alias("e");
        let m = e.realias("m");

        assert_ne!(e, m);
        assert_eq!(m.table().name, "employees");
        assert_eq!(e.schema().len(), m.schema().len());
        assert!(m.schema().contains("m", "id"));
        assert!(!m.schema().contains("e", "id"));
        assert_eq!(m.to_string(), "employees AS m");
    }

    #[test]
    fn test_base_schema_is_unqualified() {
        let t = employees();
        assert!(t.schema.find("id").is_some());
        assert!(t.schema.attrs().iter().all(|a| a.relation.is_none()));
    }
}
