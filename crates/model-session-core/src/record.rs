//! Interaction records.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Arbitrary interaction fields supplied by the caller.
pub type Fields = Map<String, Value>;

/// Field every interaction must carry.
pub const EXPERIMENT_FIELD: &str = "experiment";

/// Fields stamped by the session; caller-supplied values under these keys are replaced.
const STAMPED_FIELDS: [&str; 3] = ["time", "current_snapshot_index", "current_request_index"];

/// One logged interaction, stamped with time and snapshot/request indices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestRecord {
    /// Caller-supplied fields.
    #[serde(flatten)]
    pub fields: Fields,
    /// Wall-clock time at insertion.
    pub time: DateTime<Utc>,
    /// Snapshot index current when the record was added.
    pub current_snapshot_index: u64,
    /// Post-increment request counter value.
    pub current_request_index: u64,
}

impl RequestRecord {
    /// Copy `fields` and stamp the copy.
    #[must_use]
    pub fn stamp(
        fields: &Fields,
        time: DateTime<Utc>,
        current_snapshot_index: u64,
        current_request_index: u64,
    ) -> Self {
        let mut fields = fields.clone();
        for key in STAMPED_FIELDS {
            fields.remove(key);
        }
        Self {
            fields,
            time,
            current_snapshot_index,
            current_request_index,
        }
    }

    /// The `experiment` value as text, if present.
    #[must_use]
    pub fn experiment(&self) -> Option<String> {
        experiment_of(&self.fields)
    }

    /// Flatten into scalar-only properties for table storage.
    ///
    /// Objects and arrays become JSON text, `null`s are dropped and the
    /// timestamp is rendered as RFC 3339.
    #[must_use]
    pub fn to_flat_properties(&self) -> Fields {
        let mut flat: Fields = self
            .fields
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| (k.clone(), flatten_value(v)))
            .collect();
        flat.insert(
            "time".to_string(),
            Value::String(self.time.to_rfc3339_opts(SecondsFormat::Micros, true)),
        );
        flat.insert(
            "current_snapshot_index".to_string(),
            Value::from(self.current_snapshot_index),
        );
        flat.insert(
            "current_request_index".to_string(),
            Value::from(self.current_request_index),
        );
        flat
    }
}

/// Read the `experiment` field as text.
///
/// String values are used verbatim; any other non-null value uses its JSON text.
#[must_use]
pub fn experiment_of(fields: &Fields) -> Option<String> {
    match fields.get(EXPERIMENT_FIELD)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Encode nested structures as JSON text; scalars pass through.
#[must_use]
pub fn flatten_value(value: &Value) -> Value {
    match value {
        Value::Object(_) | Value::Array(_) => Value::String(value.to_string()),
        scalar => scalar.clone(),
    }
}
