//! The process-wide table registry.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::table::Table;

#[derive(Default)]
pub struct Database {
    tables: RwLock<HashMap<String, Arc<Table>>>,
}

impl Database {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn get_table(&self, name: &str) -> Option<Arc<Table>> {
        self.tables.read().unwrap().get(name).cloned()
    }

    pub fn add_table(&self, table: Arc<Table>) {
        self.tables
            .write()
            .unwrap()
            .insert(table.name().to_string(), table);
    }

    /// Remove a table from the registry. The caller is responsible for
    /// purging its open-loops from the scheduler.
    pub fn drop_table(&self, name: &str) -> Option<Arc<Table>> {
        self.tables.write().unwrap().remove(name)
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.read().unwrap().keys().cloned().collect()
    }
}
