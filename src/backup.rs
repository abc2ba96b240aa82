use crate::context::CommandContext;
use crate::errors::PluginError;
use crate::shared::constants::BACKUP_CAPABLE_SERVICES;
use crate::shared::display::{BackupDetails, BackupRow, DisplayFormatter, INSTANCE_ALREADY_DELETED};
use crate::shared::models::{AbortOutcome, BackupRecord};
use crate::shared::resolver::{PageSource, Resolver};
use crate::shared::ui::{confirm_action, create_resolution_progress_bar};
use colored::Colorize;
use tracing::{info, warn};

/// Which backups `list-backup` should show
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub name: Option<String>,
    pub guid: Option<String>,
    pub deleted: bool,
    pub no_name: bool,
}

pub async fn start_backup(context: &CommandContext, name: &str) -> Result<(), PluginError> {
    let resolver = context.resolver();
    let descriptor = resolver.describe_instance(name).await?;
    info!(
        instance = %name,
        guid = %descriptor.guid,
        plan_guid = %descriptor.service_plan_guid,
        service_id = %descriptor.service_id.as_deref().unwrap_or_default(),
        plan_id = %descriptor.plan_id.as_deref().unwrap_or_default(),
        plan = %descriptor.plan_name.as_deref().unwrap_or_default(),
        "Described instance"
    );

    match descriptor.service_label.as_deref() {
        Some(label) if BACKUP_CAPABLE_SERVICES.contains(&label) => {}
        label => warn!(
            instance = %name,
            service = %label.unwrap_or("unknown"),
            "Service is not known to support backups"
        ),
    }

    DisplayFormatter::action(
        "Starting backup for",
        name,
        resolver.space(),
        context.username().as_deref(),
    );
    confirm_action(
        &format!("Do you want to start a backup of service instance {}?", name),
        context.force,
    )?;

    let backup_guid = context.broker().start_backup(&descriptor.guid).await?;

    DisplayFormatter::ok();
    DisplayFormatter::message(&format!(
        "Backup has been initiated for the instance name: {} and the backup ID is: {}",
        name,
        backup_guid.cyan()
    ));
    DisplayFormatter::message(&format!(
        "Check the state of the backup using cf backup {} command.",
        backup_guid
    ));
    Ok(())
}

pub async fn abort_backup(context: &CommandContext, name: &str) -> Result<(), PluginError> {
    let resolver = context.resolver();
    let guid = resolver.resolve_instance_guid(name, None).await?;

    DisplayFormatter::action(
        "Aborting backup for",
        name,
        resolver.space(),
        context.username().as_deref(),
    );
    confirm_action(
        &format!("Do you want to abort the backup of service instance {}?", name),
        context.force,
    )?;

    let outcome = context.broker().abort_backup(&guid).await?;

    DisplayFormatter::ok();
    match outcome {
        AbortOutcome::Aborted => {
            DisplayFormatter::message(&format!(
                "Backup has been aborted for the instance name: {}",
                name
            ));
            DisplayFormatter::message("Check the state of the backup using cf backup BACKUP_ID command.");
        }
        AbortOutcome::NothingInProgress => {
            DisplayFormatter::message("currently no backup in progress for this service instance");
        }
    }
    Ok(())
}

pub async fn list_backups(
    context: &CommandContext,
    options: &ListOptions,
) -> Result<(), PluginError> {
    let rows = backup_rows(context, options).await?;

    info!(count = rows.len(), "Listing backups");
    DisplayFormatter::print_backups(&rows);
    Ok(())
}

async fn backup_rows(
    context: &CommandContext,
    options: &ListOptions,
) -> Result<Vec<BackupRow>, PluginError> {
    let resolver = context.resolver();
    let broker = context.broker();

    let rows = match (&options.guid, &options.name) {
        (Some(guid), _) => {
            let backups = broker.list_backups(Some(guid.as_str())).await?;
            if backups.is_empty() {
                return Err(PluginError::GuidNotFound(guid.clone()));
            }
            label_backups(&resolver, backups, options.no_name).await?
        }
        (None, Some(name)) => {
            let guid = if options.deleted {
                context
                    .event_resolver()
                    .await?
                    .resolve_deleted_instance_guid(name)
                    .await?
            } else {
                resolver.resolve_instance_guid(name, None).await?
            };

            let instance = if options.no_name { &guid } else { name };
            broker
                .list_backups(Some(guid.as_str()))
                .await?
                .into_iter()
                .filter(|record| record.instance_guid == guid)
                .map(|record| BackupRow {
                    record,
                    instance: instance.clone(),
                })
                .collect()
        }
        (None, None) => {
            let backups = broker.list_backups(None).await?;
            label_backups(&resolver, backups, options.no_name).await?
        }
    };
    Ok(rows)
}

/// Attach the instance column to each backup, resolving names one record at a time
async fn label_backups<S: PageSource>(
    resolver: &Resolver<S>,
    backups: Vec<BackupRecord>,
    no_name: bool,
) -> Result<Vec<BackupRow>, PluginError> {
    if no_name {
        return Ok(backups
            .into_iter()
            .map(|record| BackupRow {
                instance: record.instance_guid.clone(),
                record,
            })
            .collect());
    }

    let pb = create_resolution_progress_bar(backups.len())?;
    let mut rows = Vec::with_capacity(backups.len());

    for record in backups {
        pb.set_message(format!("Resolving instance {}", record.instance_guid));
        let name = resolver.resolve_instance_name(&record.instance_guid).await?;
        pb.inc(1);

        let instance = if name.is_empty() {
            INSTANCE_ALREADY_DELETED.to_string()
        } else {
            name
        };
        rows.push(BackupRow { record, instance });
    }

    pb.finish_and_clear();
    Ok(rows)
}

pub async fn backup_details(context: &CommandContext, backup_guid: &str) -> Result<(), PluginError> {
    let details = load_backup_details(context, backup_guid).await?;
    DisplayFormatter::print_backup_details(&details, &context.space());
    Ok(())
}

/// Fetch a backup and resolve its instance, service and plan names
async fn load_backup_details(
    context: &CommandContext,
    backup_guid: &str,
) -> Result<BackupDetails, PluginError> {
    let resolver = context.resolver();
    let record = context.broker().backup_info(backup_guid).await?;

    Ok(BackupDetails {
        instance_name: resolver.resolve_instance_name(&record.instance_guid).await?,
        service_name: resolver.resolve_service_name(&record.service_id).await?,
        plan_name: resolver.resolve_plan_name(&record.plan_id).await?,
        record,
    })
}

pub async fn delete_backup(context: &CommandContext, backup_guid: &str) -> Result<(), PluginError> {
    DisplayFormatter::action(
        "Deleting backup",
        backup_guid,
        &context.space(),
        context.username().as_deref(),
    );
    confirm_action(
        &format!("Do you want to delete backup {}?", backup_guid),
        context.force,
    )?;

    context.broker().delete_backup(backup_guid).await?;

    DisplayFormatter::ok();
    DisplayFormatter::message("The corresponding backup dataset has been deleted.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::context_for;
    use crate::shared::resolver::tests::{instance_listing, space};
    use httpmock::prelude::*;
    use serde_json::json;

    fn backup(guid: &str, instance: &str) -> BackupRecord {
        BackupRecord {
            backup_guid: guid.into(),
            instance_guid: instance.into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_label_backups_marks_deleted_instances() -> Result<(), PluginError> {
        let resolver = Resolver::new(instance_listing(), space());
        let rows = label_backups(
            &resolver,
            vec![backup("b-1", "g-3"), backup("b-2", "gone")],
            false,
        )
        .await?;

        assert_eq!(rows[0].instance, "cache");
        assert_eq!(rows[1].instance, INSTANCE_ALREADY_DELETED);
        Ok(())
    }

    #[tokio::test]
    async fn test_label_backups_without_names_skips_resolution() -> Result<(), PluginError> {
        let resolver = Resolver::new(instance_listing(), space());
        let rows = label_backups(&resolver, vec![backup("b-1", "g-3")], true).await?;

        assert_eq!(rows[0].instance, "g-3");
        Ok(())
    }

    #[tokio::test]
    async fn test_list_backup_by_unknown_guid_is_not_found() -> Result<(), PluginError> {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/v1/backups")
                    .query_param("instance_id", "no-such-guid");
                then.status(200).json_body(json!([]));
            })
            .await;

        let context = context_for(&server.base_url())?;
        let options = ListOptions {
            guid: Some("no-such-guid".into()),
            ..Default::default()
        };
        let err = list_backups(&context, &options).await.unwrap_err();

        assert!(matches!(err, PluginError::GuidNotFound(ref g) if g == "no-such-guid"));
        assert_eq!(err.exit_code(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_start_backup_for_instance_in_other_space() -> Result<(), PluginError> {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v2/service_instances");
                then.status(200).json_body(json!({
                    "next_url": null,
                    "resources": [{
                        "metadata": { "guid": "g-1" },
                        "entity": { "name": "orders-db", "space_guid": "space-b", "service_plan_guid": "p-1" }
                    }]
                }));
            })
            .await;
        let backup_call = server
            .mock_async(|when, then| {
                when.method(POST).path("/api/v1/service_instances/g-1/backup");
                then.status(202).json_body(json!({ "guid": "b-1" }));
            })
            .await;

        let context = context_for(&server.base_url())?;
        let err = start_backup(&context, "orders-db").await.unwrap_err();

        assert_eq!(err.exit_code(), 2);
        assert_eq!(backup_call.hits_async().await, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_backup_details_resolves_catalog_names() -> Result<(), PluginError> {
        let server = MockServer::start_async().await;
        let info = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/v1/backups/b-1")
                    .query_param("space_guid", "space-a");
                then.status(200).json_body(json!({
                    "backup_guid": "b-1",
                    "instance_guid": "gone-guid",
                    "service_id": "svc-unique-1",
                    "plan_id": "plan-unique-4",
                    "state": "succeeded",
                    "type": "online"
                }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v2/service_instances");
                then.status(200).json_body(json!({
                    "next_url": null,
                    "resources": [{
                        "metadata": { "guid": "g-2" },
                        "entity": { "name": "db", "space_guid": "space-a", "service_plan_guid": "p-2" }
                    }]
                }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v2/services");
                then.status(200).json_body(json!({
                    "next_url": null,
                    "resources": [
                        { "metadata": { "guid": "s-0" }, "entity": { "label": "redis", "unique_id": "svc-unique-0" } },
                        { "metadata": { "guid": "s-1" }, "entity": { "label": "postgresql", "unique_id": "svc-unique-1" } }
                    ]
                }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v2/service_plans");
                then.status(200).json_body(json!({
                    "next_url": null,
                    "resources": [
                        { "metadata": { "guid": "p-4" }, "entity": { "name": "v11-small", "unique_id": "plan-unique-4" } }
                    ]
                }));
            })
            .await;

        let context = context_for(&server.base_url())?;
        let details = load_backup_details(&context, "b-1").await?;

        assert_eq!(details.record.backup_guid, "b-1");
        assert_eq!(details.instance_name, "");
        assert_eq!(details.service_name.as_deref(), Some("postgresql"));
        assert_eq!(details.plan_name.as_deref(), Some("v11-small"));
        info.assert_async().await;

        backup_details(&context, "b-1").await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_list_backup_of_deleted_instance_keeps_only_its_records() -> Result<(), PluginError> {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/oauth/token");
                then.status(200).json_body(json!({ "access_token": "minted" }));
            })
            .await;
        let deleted = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/v2/events")
                    .header("authorization", "bearer minted")
                    .query_param("q", "type:audit.service_instance.delete;space_guid:space-a");
                then.status(200).json_body(json!({
                    "next_url": null,
                    "resources": [
                        {
                            "metadata": { "guid": "e-1" },
                            "entity": { "type": "audit.service_instance.delete", "actee": "old-guid", "actee_name": "legacy-db" }
                        },
                        {
                            "metadata": { "guid": "e-2" },
                            "entity": { "type": "audit.service_instance.delete", "actee": "other-guid", "actee_name": "scratch" }
                        }
                    ]
                }));
            })
            .await;
        let listing = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/v1/backups")
                    .query_param("space_guid", "space-a")
                    .query_param("instance_id", "old-guid")
                    .header("authorization", "bearer session-token");
                then.status(200).json_body(json!([
                    { "backup_guid": "b-1", "instance_guid": "old-guid" },
                    { "backup_guid": "b-2", "instance_guid": "" },
                    { "backup_guid": "b-3", "instance_guid": "other-guid" },
                    { "backup_guid": "b-4" }
                ]));
            })
            .await;

        let context = context_for(&server.base_url())?;
        let options = ListOptions {
            name: Some("legacy-db".into()),
            deleted: true,
            ..Default::default()
        };
        let rows = backup_rows(&context, &options).await?;

        let listed: Vec<(&str, &str)> = rows
            .iter()
            .map(|row| (row.record.backup_guid.as_str(), row.instance.as_str()))
            .collect();
        assert_eq!(listed, vec![("b-1", "legacy-db")]);
        deleted.assert_async().await;
        listing.assert_async().await;
        Ok(())
    }
}
