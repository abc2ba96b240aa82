use crate::errors::PluginError;
use chrono::DateTime;
use serde::Deserialize;
use serde_json::{json, Map, Value};

/// One page of a platform resource listing
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResourcePage {
    #[serde(default)]
    pub resources: Vec<ResourceRecord>,
    #[serde(default)]
    pub next_url: Option<String>,
}

/// A raw listing record; the entity schema depends on the endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResourceRecord {
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub entity: Map<String, Value>,
}

impl ResourceRecord {
    pub fn guid(&self) -> Option<&str> {
        self.metadata.get("guid").and_then(Value::as_str)
    }

    /// Look up a named field, entity first, then metadata
    pub fn field(&self, name: &str) -> Option<&str> {
        self.entity
            .get(name)
            .or_else(|| self.metadata.get(name))
            .and_then(Value::as_str)
    }

    fn owned_field(&self, name: &str) -> String {
        self.field(name).unwrap_or_default().to_string()
    }
}

/// Backup entry as reported by the broker
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BackupRecord {
    #[serde(default)]
    pub backup_guid: String,
    #[serde(default)]
    pub instance_guid: String,
    #[serde(default)]
    pub username: String,
    #[serde(rename = "type", default)]
    pub backup_type: String,
    #[serde(default)]
    pub trigger: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub operation: String,
    #[serde(default)]
    pub service_id: String,
    #[serde(default)]
    pub plan_id: String,
    #[serde(default)]
    pub started_at: String,
    #[serde(default)]
    pub finished_at: Option<String>,
}

impl BackupRecord {
    pub fn finished_at_display(&self) -> &str {
        self.finished_at.as_deref().unwrap_or("null")
    }
}

/// Last restore operation of an instance as reported by the broker
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RestoreRecord {
    #[serde(default)]
    pub status: Option<Value>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub backup_guid: Option<String>,
    #[serde(default)]
    pub instance_guid: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub time_stamp: Option<Value>,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub finished_at: Option<String>,
}

/// Instance lifecycle event flattened from an audit-event record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventRecord {
    pub actee: String,
    pub actee_name: String,
    pub event_type: String,
    pub actor_name: String,
    pub created_at: String,
}

impl EventRecord {
    pub fn from_resource(record: &ResourceRecord) -> Self {
        EventRecord {
            actee: record.owned_field("actee"),
            actee_name: record.owned_field("actee_name"),
            event_type: record.owned_field("type"),
            actor_name: record.owned_field("actor_name"),
            created_at: record.owned_field("created_at"),
        }
    }
}

/// Result of an abort request that the broker accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortOutcome {
    Aborted,
    NothingInProgress,
}

/// Validate an RFC3339 timestamp locally and convert it to epoch milliseconds
pub fn parse_restore_timestamp(input: &str) -> Result<i64, PluginError> {
    let parsed =
        DateTime::parse_from_rfc3339(input).map_err(|source| PluginError::InvalidTimestamp {
            input: input.to_string(),
            source,
        })?;
    Ok(parsed.timestamp_millis())
}

/// Restore body, either from a specific backup or from a point in time
#[derive(Debug, Clone, PartialEq)]
pub enum RestoreRequest {
    FromBackup {
        backup_guid: String,
    },
    AtTimestamp {
        epoch_millis: i64,
        source_instance_guid: Option<String>,
    },
}

impl RestoreRequest {
    pub fn body(&self, space_guid: &str) -> Value {
        match self {
            RestoreRequest::FromBackup { backup_guid } => json!({ "backup_guid": backup_guid }),
            RestoreRequest::AtTimestamp {
                epoch_millis,
                source_instance_guid,
            } => {
                let mut body = json!({
                    "time_stamp": epoch_millis.to_string(),
                    "space_guid": space_guid,
                });
                if let Some(source) = source_instance_guid {
                    body["instance_guid"] = Value::String(source.clone());
                }
                body
            }
        }
    }
}

/// Everything the resolver chain knows about one instance
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstanceDescriptor {
    pub name: String,
    pub guid: String,
    pub service_plan_guid: String,
    pub service_guid: Option<String>,
    pub service_id: Option<String>,
    pub plan_id: Option<String>,
    pub service_label: Option<String>,
    pub plan_name: Option<String>,
}
