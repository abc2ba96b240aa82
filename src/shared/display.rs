use crate::config::SpaceContext;
use crate::shared::models::{BackupRecord, EventRecord, RestoreRecord};
use colored::Colorize;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Table};
use serde_json::Value;

pub const UNKNOWN: &str = "unknown";
pub const INSTANCE_ALREADY_DELETED: &str = "Instance already deleted";

/// A listed backup together with the instance column shown for it
#[derive(Debug, Clone)]
pub struct BackupRow {
    pub record: BackupRecord,
    pub instance: String,
}

/// Backup record enriched with catalog names for the details view
#[derive(Debug, Clone)]
pub struct BackupDetails {
    pub record: BackupRecord,
    pub instance_name: String,
    pub service_name: Option<String>,
    pub plan_name: Option<String>,
}

/// Terminal output of command results
pub struct DisplayFormatter;

impl DisplayFormatter {
    pub fn ok() {
        println!("{}", "OK".green().bold());
    }

    pub fn failed(message: &str) {
        eprintln!("{}", "FAILED".red().bold());
        eprintln!("{}", message);
    }

    /// Announce an operation against the current org/space and user
    pub fn action(verb: &str, target: &str, space: &SpaceContext, username: Option<&str>) {
        let mut line = format!(
            "{} {} in org {} / space {}",
            verb,
            target.cyan(),
            space.org_name.cyan(),
            space.name.cyan()
        );
        if let Some(username) = username {
            line.push_str(&format!(" as {}", username.cyan()));
        }
        println!("{}...", line);
    }

    pub fn message(text: &str) {
        println!("{}", text);
    }

    pub fn print_backups(rows: &[BackupRow]) {
        Self::ok();
        if rows.is_empty() {
            println!("No backups found.");
            return;
        }
        println!("{}", Self::backup_table(rows));
    }

    pub fn backup_table(rows: &[BackupRow]) -> Table {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec![
                "BACKUP ID",
                "INSTANCE",
                "USERNAME",
                "TYPE",
                "TRIGGER",
                "STATE",
                "STARTED AT",
                "FINISHED AT",
            ]);

        for row in rows {
            let record = &row.record;
            table.add_row(vec![
                record.backup_guid.clone(),
                row.instance.clone(),
                record.username.clone(),
                record.backup_type.clone(),
                record.trigger.clone(),
                record.state.clone(),
                record.started_at.clone(),
                record.finished_at_display().to_string(),
            ]);
        }
        table
    }

    pub fn print_backup_details(details: &BackupDetails, space: &SpaceContext) {
        Self::ok();
        println!("{}", Self::backup_details_table(details, space));
    }

    pub fn backup_details_table(details: &BackupDetails, space: &SpaceContext) -> Table {
        let record = &details.record;
        let instance = if details.instance_name.is_empty() {
            INSTANCE_ALREADY_DELETED.to_string()
        } else {
            details.instance_name.clone()
        };

        let rows = [
            ("Org", space.org_name.clone()),
            ("Space", space.name.clone()),
            ("Instance", instance),
            ("Instance GUID", record.instance_guid.clone()),
            ("Service", Self::or_unknown(&details.service_name)),
            ("Plan", Self::or_unknown(&details.plan_name)),
            ("Username", record.username.clone()),
            ("Operation", record.operation.clone()),
            ("Type", record.backup_type.clone()),
            ("Backup GUID", record.backup_guid.clone()),
            ("Trigger", record.trigger.clone()),
            ("State", record.state.clone()),
            ("Started At", record.started_at.clone()),
            ("Finished At", record.finished_at_display().to_string()),
        ];
        Self::key_value_table(&rows)
    }

    pub fn print_restore(record: &RestoreRecord) {
        Self::ok();
        println!("{}", Self::restore_table(record));
    }

    pub fn restore_table(record: &RestoreRecord) -> Table {
        let text = |value: &Option<String>| value.clone().unwrap_or_default();

        let rows = [
            ("Status", Self::value_text(record.status.as_ref())),
            ("State", text(&record.state)),
            ("Description", text(&record.description)),
            ("Backup GUID", text(&record.backup_guid)),
            ("Instance GUID", text(&record.instance_guid)),
            ("Time Stamp", Self::value_text(record.time_stamp.as_ref())),
            ("Username", text(&record.username)),
            ("Started At", text(&record.started_at)),
            (
                "Finished At",
                record
                    .finished_at
                    .clone()
                    .unwrap_or_else(|| "null".to_string()),
            ),
        ];
        Self::key_value_table(&rows)
    }

    pub fn print_events(events: &[EventRecord]) {
        Self::ok();
        if events.is_empty() {
            println!("No events found.");
            return;
        }
        println!("{}", Self::event_table(events));
    }

    pub fn event_table(events: &[EventRecord]) -> Table {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec!["TIME", "EVENT", "INSTANCE", "INSTANCE GUID", "ACTOR"]);

        for event in events {
            table.add_row(vec![
                event.created_at.clone(),
                event.event_type.clone(),
                event.actee_name.clone(),
                event.actee.clone(),
                event.actor_name.clone(),
            ]);
        }
        table
    }

    fn key_value_table(rows: &[(&str, String)]) -> Table {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS);
        for (key, value) in rows {
            table.add_row(vec![key.to_string(), value.clone()]);
        }
        table
    }

    fn or_unknown(value: &Option<String>) -> String {
        value.clone().unwrap_or_else(|| UNKNOWN.to_string())
    }

    fn value_text(value: Option<&Value>) -> String {
        match value {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(text)) => text.clone(),
            Some(other) => other.to_string(),
        }
    }
}
