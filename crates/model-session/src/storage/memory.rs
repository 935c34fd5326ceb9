//! In-memory table service.

use std::{collections::HashMap, sync::RwLock};

use async_trait::async_trait;

use super::{StorageError, TableEntity, TableService};

/// In-memory table service.
///
/// Useful for development and tests. Enforces key uniqueness per table the
/// way the hosted service does. Data is lost on restart.
#[derive(Debug, Default)]
pub struct MemoryTableService {
    tables: RwLock<HashMap<String, Vec<TableEntity>>>,
}

impl MemoryTableService {
    /// Create an empty service.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Entities inserted into `table`, in insertion order.
    #[must_use]
    pub fn entities(&self, table: &str) -> Vec<TableEntity> {
        self.tables
            .read()
            .map(|tables| tables.get(table).cloned().unwrap_or_default())
            .unwrap_or_default()
    }
}

#[async_trait]
impl TableService for MemoryTableService {
    async fn insert_entity(&self, table: &str, entity: TableEntity) -> Result<(), StorageError> {
        let mut tables = self
            .tables
            .write()
            .map_err(|e| StorageError::Internal(e.to_string()))?;
        let rows = tables.entry(table.to_string()).or_default();

        if rows
            .iter()
            .any(|r| r.partition_key == entity.partition_key && r.row_key == entity.row_key)
        {
            return Err(StorageError::Conflict {
                table: table.to_string(),
                partition_key: entity.partition_key,
                row_key: entity.row_key,
            });
        }

        rows.push(entity);
        Ok(())
    }
}
