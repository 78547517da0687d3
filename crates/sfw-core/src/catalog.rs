//! # Catalog Interface
//!
//! The catalog resolves the table names of a FROM list to base tables: their schema
//! and the statistics the estimator bootstraps from. It sits behind a trait object so
//! the binder does not care where the metadata comes from.
//!
//! `InMemoryCatalog` is a HashMap-backed implementation populated programmatically.

use crate::schema::Table;
use std::collections::HashMap;
use std::sync::Arc;

/// Catalog provides base tables by name.
pub trait Catalog: Send + Sync {
    fn get_table(&self, name: &str) -> Option<Arc<Table>>;

    fn table_names(&self) -> Vec<String>;
}

/// In-memory catalog for tests, the HTTP service and embedding.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    pub tables: HashMap<String, Arc<Table>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table under its own name, replacing any previous definition.
    pub fn add_table(&mut self, table: Table) -> Arc<Table> {
        let table = Arc::new(table);
        self.tables.insert(table.name.clone(), Arc::clone(&table));
        table
    }
}

impl Catalog for InMemoryCatalog {
    fn get_table(&self, name: &str) -> Option<Arc<Table>> {
        self.tables.get(name).cloned()
    }

    fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.keys().cloned().collect();
        names.sort();
        names
    }
}
