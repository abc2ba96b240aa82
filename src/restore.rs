use crate::context::CommandContext;
use crate::errors::PluginError;
use crate::shared::display::DisplayFormatter;
use crate::shared::models::{parse_restore_timestamp, AbortOutcome, RestoreRequest};
use crate::shared::ui::confirm_action;
use tracing::debug;

/// Where a restore takes its data from
#[derive(Debug, Clone, PartialEq)]
pub enum RestoreSource {
    Backup(String),
    PointInTime {
        timestamp: String,
        source: Option<SourceInstance>,
    },
}

/// Instance whose backups feed a point-in-time restore
#[derive(Debug, Clone, PartialEq)]
pub enum SourceInstance {
    Name { name: String, deleted: bool },
    Guid(String),
}

/// Turn the requested source into a broker request body.
///
/// The timestamp is parsed before any lookup, so malformed input never
/// reaches the network.
async fn build_request(
    context: &CommandContext,
    source: &RestoreSource,
) -> Result<RestoreRequest, PluginError> {
    let (timestamp, source) = match source {
        RestoreSource::Backup(backup_guid) => {
            return Ok(RestoreRequest::FromBackup {
                backup_guid: backup_guid.clone(),
            })
        }
        RestoreSource::PointInTime { timestamp, source } => (timestamp, source),
    };

    let epoch_millis = parse_restore_timestamp(timestamp)?;
    let source_instance_guid = match source {
        None => None,
        Some(SourceInstance::Guid(guid)) => Some(guid.clone()),
        Some(SourceInstance::Name {
            name,
            deleted: false,
        }) => Some(context.resolver().resolve_instance_guid(name, None).await?),
        Some(SourceInstance::Name {
            name,
            deleted: true,
        }) => Some(
            context
                .event_resolver()
                .await?
                .resolve_deleted_instance_guid(name)
                .await?,
        ),
    };

    Ok(RestoreRequest::AtTimestamp {
        epoch_millis,
        source_instance_guid,
    })
}

pub async fn start_restore(
    context: &CommandContext,
    name: &str,
    source: &RestoreSource,
) -> Result<(), PluginError> {
    let request = build_request(context, source).await?;

    let resolver = context.resolver();
    let guid = resolver.resolve_instance_guid(name, None).await?;
    debug!(instance = %name, guid = %guid, request = ?request, "Prepared restore request");

    DisplayFormatter::action(
        "Starting restore for",
        name,
        resolver.space(),
        context.username().as_deref(),
    );
    confirm_action(
        &format!("Do you want to restore service instance {}?", name),
        context.force,
    )?;

    context.broker().start_restore(&guid, &request).await?;

    DisplayFormatter::ok();
    DisplayFormatter::message(&format!(
        "Restore has been initiated for the instance name: {}",
        name
    ));
    DisplayFormatter::message(&format!(
        "Check the state of the restore using cf restore-info {} command.",
        name
    ));
    Ok(())
}

pub async fn restore_info(context: &CommandContext, name: &str) -> Result<(), PluginError> {
    let guid = context.resolver().resolve_instance_guid(name, None).await?;
    let record = context.broker().restore_info(&guid).await?;

    DisplayFormatter::print_restore(&record);
    Ok(())
}

pub async fn abort_restore(context: &CommandContext, name: &str) -> Result<(), PluginError> {
    let resolver = context.resolver();
    let guid = resolver.resolve_instance_guid(name, None).await?;

    DisplayFormatter::action(
        "Aborting restore for",
        name,
        resolver.space(),
        context.username().as_deref(),
    );
    confirm_action(
        &format!("Do you want to abort the restore of service instance {}?", name),
        context.force,
    )?;

    match context.broker().abort_restore(&guid).await? {
        AbortOutcome::Aborted => {
            DisplayFormatter::ok();
            DisplayFormatter::message(&format!(
                "Restore has been aborted for the instance name: {}",
                name
            ));
        }
        AbortOutcome::NothingInProgress => {
            DisplayFormatter::ok();
            DisplayFormatter::message("currently no restore in progress for this service instance");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::context_for;
    use httpmock::prelude::*;
    use serde_json::json;

    fn instances_page() -> serde_json::Value {
        json!({
            "next_url": null,
            "resources": [
                {
                    "metadata": { "guid": "target-guid" },
                    "entity": { "name": "orders-db", "space_guid": "space-a", "service_plan_guid": "p-1" }
                },
                {
                    "metadata": { "guid": "source-guid" },
                    "entity": { "name": "orders-db-old", "space_guid": "space-a", "service_plan_guid": "p-1" }
                }
            ]
        })
    }

    #[tokio::test]
    async fn test_malformed_timestamp_fails_before_any_request() -> Result<(), PluginError> {
        let server = MockServer::start_async().await;
        let any_request = server
            .mock_async(|_when, then| {
                then.status(200).json_body(json!({}));
            })
            .await;

        let context = context_for(&server.base_url())?;
        let source = RestoreSource::PointInTime {
            timestamp: "not-a-date".into(),
            source: None,
        };
        let err = start_restore(&context, "orders-db", &source)
            .await
            .unwrap_err();

        assert!(matches!(err, PluginError::InvalidTimestamp { .. }));
        assert_eq!(err.exit_code(), 1);
        assert_eq!(any_request.hits_async().await, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_point_in_time_restore_from_named_source() -> Result<(), PluginError> {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v2/service_instances");
                then.status(200).json_body(instances_page());
            })
            .await;
        let restore = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/v1/service_instances/target-guid/restore")
                    .json_body(json!({
                        "time_stamp": "1542023126000",
                        "space_guid": "space-a",
                        "instance_guid": "source-guid"
                    }));
                then.status(202).json_body(json!({ "status": 202 }));
            })
            .await;

        let context = context_for(&server.base_url())?;
        let source = RestoreSource::PointInTime {
            timestamp: "2018-11-12T11:45:26Z".into(),
            source: Some(SourceInstance::Name {
                name: "orders-db-old".into(),
                deleted: false,
            }),
        };
        start_restore(&context, "orders-db", &source).await?;

        restore.assert_async().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_restore_from_deleted_source_uses_fresh_token() -> Result<(), PluginError> {
        let server = MockServer::start_async().await;
        let token = server
            .mock_async(|when, then| {
                when.method(POST).path("/oauth/token");
                then.status(200).json_body(json!({ "access_token": "fresh" }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/v2/events")
                    .header("authorization", "bearer fresh");
                then.status(200).json_body(json!({
                    "next_url": null,
                    "resources": [{
                        "metadata": { "guid": "e-1" },
                        "entity": {
                            "type": "audit.service_instance.delete",
                            "actee": "deleted-guid",
                            "actee_name": "legacy-db"
                        }
                    }]
                }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v2/service_instances");
                then.status(200).json_body(instances_page());
            })
            .await;
        let restore = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/v1/service_instances/target-guid/restore")
                    .json_body_partial(r#"{ "instance_guid": "deleted-guid" }"#);
                then.status(200).json_body(json!({ "status": 202 }));
            })
            .await;

        let context = context_for(&server.base_url())?;
        let source = RestoreSource::PointInTime {
            timestamp: "2018-11-12T11:45:26.371Z".into(),
            source: Some(SourceInstance::Name {
                name: "legacy-db".into(),
                deleted: true,
            }),
        };
        start_restore(&context, "orders-db", &source).await?;

        token.assert_async().await;
        restore.assert_async().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_restore_rejected_in_body() -> Result<(), PluginError> {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v2/service_instances");
                then.status(200).json_body(instances_page());
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/v1/service_instances/target-guid/restore");
                then.status(200).json_body(json!({
                    "status": 400,
                    "error": "x",
                    "description": "y"
                }));
            })
            .await;

        let context = context_for(&server.base_url())?;
        let err = start_restore(
            &context,
            "orders-db",
            &RestoreSource::Backup("b-1".into()),
        )
        .await
        .unwrap_err();

        assert_eq!(err.to_string(), "Error: x\nMessage: y");
        assert_eq!(err.exit_code(), 4);
        Ok(())
    }

    #[tokio::test]
    async fn test_restore_info_reads_status_from_body() -> Result<(), PluginError> {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v2/service_instances");
                then.status(200).json_body(instances_page());
            })
            .await;
        let info = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/v1/service_instances/target-guid/restore")
                    .query_param("space_guid", "space-a")
                    .header("authorization", "bearer session-token");
                then.status(200).json_body(json!({
                    "status": 200,
                    "state": "succeeded",
                    "backup_guid": "b-1",
                    "instance_guid": "target-guid"
                }));
            })
            .await;

        let context = context_for(&server.base_url())?;
        restore_info(&context, "orders-db").await?;

        info.assert_async().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_restore_info_without_restore_is_broker_error() -> Result<(), PluginError> {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v2/service_instances");
                then.status(200).json_body(instances_page());
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/v1/service_instances/target-guid/restore");
                then.status(200).json_body(json!({
                    "status": 404,
                    "error": "Not Found",
                    "description": "no restore found"
                }));
            })
            .await;

        let context = context_for(&server.base_url())?;
        let err = restore_info(&context, "orders-db").await.unwrap_err();

        assert!(matches!(err, PluginError::Broker(_)));
        assert_eq!(err.exit_code(), 4);
        Ok(())
    }

    #[tokio::test]
    async fn test_abort_restore_of_resolved_instance() -> Result<(), PluginError> {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v2/service_instances");
                then.status(200).json_body(instances_page());
            })
            .await;
        let abort = server
            .mock_async(|when, then| {
                when.method(DELETE)
                    .path("/api/v1/service_instances/target-guid/restore")
                    .query_param("space_guid", "space-a");
                then.status(200).json_body(json!({ "status": 202 }));
            })
            .await;
        let other = server
            .mock_async(|when, then| {
                when.method(DELETE)
                    .path("/api/v1/service_instances/source-guid/restore");
                then.status(200).json_body(json!({ "status": 202 }));
            })
            .await;

        let context = context_for(&server.base_url())?;
        abort_restore(&context, "orders-db").await?;

        abort.assert_async().await;
        assert_eq!(other.hits_async().await, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_abort_restore_of_unknown_instance_sends_nothing() -> Result<(), PluginError> {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v2/service_instances");
                then.status(200).json_body(instances_page());
            })
            .await;
        let abort = server
            .mock_async(|when, then| {
                when.method(DELETE);
                then.status(200).json_body(json!({ "status": 202 }));
            })
            .await;

        let context = context_for(&server.base_url())?;
        let err = abort_restore(&context, "missing-db").await.unwrap_err();

        assert_eq!(err.exit_code(), 3);
        assert_eq!(abort.hits_async().await, 0);
        Ok(())
    }
}
