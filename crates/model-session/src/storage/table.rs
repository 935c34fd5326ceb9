//! Table-service backed persistence.

use std::sync::Arc;

use model_session_core::RequestRecord;
use rand::Rng;
use uuid::Uuid;

use super::{FileStorage, Persistence, TableEntity, TableService};

const DEFAULT_SESSIONS_TABLE: &str = "webtoolsessions";
const DEFAULT_INTERACTIONS_TABLE: &str = "webtoolinteractions";
const DEFAULT_PARTITIONS: u32 = 8;

/// A new snapshot lineage, recorded on every reset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lineage {
    pub snapshot_string: String,
    pub hostname: String,
    pub argv: String,
    /// Cached base model the lineage starts from.
    pub base_model: Option<String>,
}

impl Lineage {
    /// Describe a lineage started by this process.
    #[must_use]
    pub fn new(snapshot_string: impl Into<String>, base_model: Option<String>) -> Self {
        let hostname = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "unknown".to_string());
        Self {
            snapshot_string: snapshot_string.into(),
            hostname,
            argv: std::env::args().collect::<Vec<_>>().join(" "),
            base_model,
        }
    }
}

/// Writes lineage and interaction entities to a table service.
///
/// Model snapshots still go to local files; request lists are never
/// bulk-written because every interaction is inserted as it happens.
#[derive(Clone)]
pub struct TableStorage {
    files: FileStorage,
    service: Arc<dyn TableService>,
    sessions_table: String,
    interactions_table: String,
    partitions: u32,
}

impl std::fmt::Debug for TableStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableStorage")
            .field("files", &self.files)
            .field("sessions_table", &self.sessions_table)
            .field("interactions_table", &self.interactions_table)
            .field("partitions", &self.partitions)
            .finish_non_exhaustive()
    }
}

impl TableStorage {
    /// Create table storage with the default table names.
    #[must_use]
    pub fn new(files: FileStorage, service: Arc<dyn TableService>) -> Self {
        Self {
            files,
            service,
            sessions_table: DEFAULT_SESSIONS_TABLE.to_string(),
            interactions_table: DEFAULT_INTERACTIONS_TABLE.to_string(),
            partitions: DEFAULT_PARTITIONS,
        }
    }

    /// Override the table names.
    #[must_use]
    pub fn with_tables(mut self, sessions: &str, interactions: &str) -> Self {
        self.sessions_table = sessions.to_string();
        self.interactions_table = interactions.to_string();
        self
    }

    /// Spread lineage entities over `partitions` partition keys.
    #[must_use]
    pub fn with_partitions(mut self, partitions: u32) -> Self {
        self.partitions = partitions.max(1);
        self
    }

    /// Local snapshot files.
    #[must_use]
    pub const fn files(&self) -> &FileStorage {
        &self.files
    }

    /// Table receiving lineage entities.
    #[must_use]
    pub fn sessions_table(&self) -> &str {
        &self.sessions_table
    }

    /// Table receiving interaction entities.
    #[must_use]
    pub fn interactions_table(&self) -> &str {
        &self.interactions_table
    }

    /// Entity describing a lineage; random partition, unique row key.
    #[must_use]
    pub fn lineage_entity(&self, lineage: &Lineage) -> TableEntity {
        let partition = rand::thread_rng().gen_range(0..self.partitions);
        TableEntity::new(partition.to_string(), Uuid::new_v4().to_string())
            .with_property("session_id", lineage.snapshot_string.clone())
            .with_property("server_hostname", lineage.hostname.clone())
            .with_property("server_sys_argv", lineage.argv.clone())
            .with_property("base_model", lineage.base_model.clone())
    }

    /// Entity for one interaction, keyed by lineage and `{experiment}_{request_index}`.
    #[must_use]
    pub fn interaction_entity(
        snapshot_string: &str,
        experiment: &str,
        record: &RequestRecord,
    ) -> TableEntity {
        TableEntity {
            partition_key: snapshot_string.to_string(),
            row_key: format!("{experiment}_{}", record.current_request_index),
            properties: record.to_flat_properties(),
        }
    }

    /// Record a new lineage. Best effort: failures are logged and returned.
    pub async fn record_lineage(&self, lineage: &Lineage) -> Persistence {
        let entity = self.lineage_entity(lineage);
        self.insert(&self.sessions_table, entity).await
    }

    /// Record one interaction. Best effort: failures are logged and returned.
    pub async fn record_interaction(
        &self,
        snapshot_string: &str,
        experiment: &str,
        record: &RequestRecord,
    ) -> Persistence {
        let entity = Self::interaction_entity(snapshot_string, experiment, record);
        self.insert(&self.interactions_table, entity).await
    }

    async fn insert(&self, table: &str, entity: TableEntity) -> Persistence {
        let row_key = entity.row_key.clone();
        match self.service.insert_entity(table, entity).await {
            Ok(()) => Persistence::Stored,
            Err(e) => {
                tracing::warn!(table, row_key = %row_key, error = %e, "Table insert failed");
                Persistence::Failed(e)
            }
        }
    }
}
