use clap::{ArgGroup, Parser, Subcommand};
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;

mod backup;
mod config;
mod context;
mod errors;
mod events;
mod restore;
mod shared;

use crate::backup::ListOptions;
use crate::context::CommandContext;
use crate::errors::PluginError;
use crate::restore::{RestoreSource, SourceInstance};
use crate::shared::constants::{LOG_DIR, LOG_FILE};
use crate::shared::display::DisplayFormatter;
use crate::shared::events::EventFilter;

#[derive(Parser)]
#[command(name = "cf-sf-backup", version)]
#[command(about = "Backup and restore service instances through the Service Fabrik broker", long_about = None)]
struct Cli {
    /// Skip confirmation prompts
    #[arg(short, long, global = true)]
    force: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an online backup of a service instance
    StartBackup {
        /// Service instance name
        name: String,
    },
    /// Abort the backup in progress for a service instance
    AbortBackup {
        name: String,
    },
    /// List backups of the space or of one service instance
    ListBackup {
        /// Service instance name
        name: Option<String>,
        /// Service instance GUID, for instances that no longer exist
        #[arg(long, conflicts_with = "name")]
        guid: Option<String>,
        /// Look the name up among deleted instances
        #[arg(long, requires = "name")]
        deleted: bool,
        /// Show instance GUIDs instead of resolving names
        #[arg(long)]
        no_name: bool,
    },
    /// Show details of a backup
    Backup {
        backup_id: String,
    },
    /// Delete a backup
    DeleteBackup {
        backup_id: String,
    },
    /// Restore a service instance from a backup or a point in time
    #[command(group(
        ArgGroup::new("restore_source")
            .required(true)
            .args(["backup_guid", "timestamp"])
    ))]
    StartRestore {
        /// Service instance name
        name: String,
        #[arg(long)]
        backup_guid: Option<String>,
        /// Point in time, e.g. 2018-11-12T11:45:26.371Z
        #[arg(long)]
        timestamp: Option<String>,
        /// Instance whose backups are used for the point-in-time restore
        #[arg(long, requires = "timestamp", conflicts_with_all = ["source_id", "backup_guid"])]
        source: Option<String>,
        /// GUID of the source instance
        #[arg(long, requires = "timestamp", conflicts_with = "backup_guid")]
        source_id: Option<String>,
        /// Look the source name up among deleted instances
        #[arg(long, requires = "source")]
        deleted: bool,
    },
    /// Show the last restore operation of a service instance
    RestoreInfo {
        name: String,
    },
    /// Abort the restore in progress for a service instance
    AbortRestore {
        name: String,
    },
    /// List create, update and delete events of service instances in the space
    #[command(group(ArgGroup::new("event_type").args(["create", "update", "delete"])))]
    InstanceEvents {
        #[arg(long)]
        create: bool,
        #[arg(long)]
        update: bool,
        #[arg(long)]
        delete: bool,
    },
}

fn init_logging() -> Result<WorkerGuard, PluginError> {
    use tracing::Level;
    use tracing_appender::rolling;
    use tracing_subscriber::{fmt::writer::MakeWriterExt, EnvFilter};

    let log_dir = config::cf_dir()?.join(LOG_DIR);
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = rolling::daily(&log_dir, LOG_FILE);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr.with_max_level(Level::WARN).and(non_blocking))
        .with_env_filter(env_filter)
        .init();

    Ok(guard)
}

/// Parse arguments; usage errors exit with code 1, help and version exit normally
fn parse_cli() -> Cli {
    match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            use clap::error::ErrorKind;
            if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) {
                err.exit();
            }
            let _ = err.print();
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> Result<(), PluginError> {
    let context = CommandContext::load(cli.force)?;

    match cli.command {
        Commands::StartBackup { name } => backup::start_backup(&context, &name).await,
        Commands::AbortBackup { name } => backup::abort_backup(&context, &name).await,
        Commands::ListBackup {
            name,
            guid,
            deleted,
            no_name,
        } => {
            let options = ListOptions {
                name,
                guid,
                deleted,
                no_name,
            };
            backup::list_backups(&context, &options).await
        }
        Commands::Backup { backup_id } => backup::backup_details(&context, &backup_id).await,
        Commands::DeleteBackup { backup_id } => backup::delete_backup(&context, &backup_id).await,
        Commands::StartRestore {
            name,
            backup_guid,
            timestamp,
            source,
            source_id,
            deleted,
        } => {
            let source = match (backup_guid, timestamp) {
                (Some(backup_guid), _) => RestoreSource::Backup(backup_guid),
                (None, Some(timestamp)) => RestoreSource::PointInTime {
                    timestamp,
                    source: match (source, source_id) {
                        (Some(name), _) => Some(SourceInstance::Name { name, deleted }),
                        (None, Some(guid)) => Some(SourceInstance::Guid(guid)),
                        (None, None) => None,
                    },
                },
                (None, None) => {
                    return Err(PluginError::InvalidArguments(
                        "either --backup-guid or --timestamp is required".to_string(),
                    ))
                }
            };
            restore::start_restore(&context, &name, &source).await
        }
        Commands::RestoreInfo { name } => restore::restore_info(&context, &name).await,
        Commands::AbortRestore { name } => restore::abort_restore(&context, &name).await,
        Commands::InstanceEvents {
            create,
            update,
            delete,
        } => {
            let filter = EventFilter::from_flags(create, update, delete);
            events::instance_events(&context, filter).await
        }
    }
}

/// Single error boundary: print the failure and map it to the process exit code
fn report(result: Result<(), PluginError>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(err) => {
            error!(error = %err, exit_code = err.exit_code(), "Command failed");
            DisplayFormatter::failed(&err.to_string());
            err.exit_code()
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = parse_cli();

    let code = match init_logging() {
        Ok(guard) => {
            info!(version = env!("CARGO_PKG_VERSION"), "Plugin invoked");
            let code = report(run(cli).await);
            drop(guard);
            code
        }
        Err(err) => report(Err(err)),
    };

    std::process::exit(code);
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_start_restore_requires_a_source() {
        assert!(Cli::try_parse_from(["cf-sf-backup", "start-restore", "db"]).is_err());
        assert!(Cli::try_parse_from([
            "cf-sf-backup",
            "start-restore",
            "db",
            "--backup-guid",
            "b-1",
            "--timestamp",
            "2018-11-12T11:45:26Z"
        ])
        .is_err());
        assert!(Cli::try_parse_from([
            "cf-sf-backup",
            "start-restore",
            "db",
            "--backup-guid",
            "b-1",
            "--source",
            "other"
        ])
        .is_err());
        assert!(Cli::try_parse_from([
            "cf-sf-backup",
            "start-restore",
            "db",
            "--backup-guid",
            "b-1",
            "--source-id",
            "g-9"
        ])
        .is_err());
    }

    #[test]
    fn test_point_in_time_restore_arguments() {
        let cli = Cli::try_parse_from([
            "cf-sf-backup",
            "start-restore",
            "db",
            "--timestamp",
            "2018-11-12T11:45:26Z",
            "--source",
            "old-db",
            "--deleted",
            "--force",
        ])
        .unwrap();

        assert!(cli.force);
        match cli.command {
            Commands::StartRestore {
                source, deleted, ..
            } => {
                assert_eq!(source.as_deref(), Some("old-db"));
                assert!(deleted);
            }
            _ => panic!("expected start-restore"),
        }
    }

    #[test]
    fn test_list_backup_flag_combinations() {
        assert!(Cli::try_parse_from(["cf-sf-backup", "list-backup"]).is_ok());
        assert!(Cli::try_parse_from(["cf-sf-backup", "list-backup", "db", "--deleted"]).is_ok());
        assert!(Cli::try_parse_from(["cf-sf-backup", "list-backup", "--deleted"]).is_err());
        assert!(
            Cli::try_parse_from(["cf-sf-backup", "list-backup", "db", "--guid", "g-1"]).is_err()
        );
    }

    #[test]
    fn test_instance_events_single_filter() {
        assert!(Cli::try_parse_from(["cf-sf-backup", "instance-events", "--create"]).is_ok());
        assert!(Cli::try_parse_from([
            "cf-sf-backup",
            "instance-events",
            "--create",
            "--delete"
        ])
        .is_err());
    }
}
