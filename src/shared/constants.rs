// Shared constants used across the plugin

/// Host CLI session layout
pub const CF_DIR: &str = ".cf";
pub const CF_CONFIG_FILE: &str = "config.json";
pub const PLUGIN_CONFIG_FILE: &str = "conf.json";
pub const LOG_DIR: &str = "sf-backup/logs";
pub const LOG_FILE: &str = "sf-backup-plugin.log";

/// Plugin configuration defaults
pub const DEFAULT_SERVICE_BROKER: &str = "service-fabrik-broker";
pub const DEFAULT_BROKER_EXT_URL: &str = "/api/v1";
pub const DEFAULT_SKIP_SSL: bool = true;

/// Per-request timeout in seconds
pub const REQUEST_TIMEOUT_SECS: u64 = 180;

/// Platform resource listings
pub const SERVICE_INSTANCES_PATH: &str = "/v2/service_instances";
pub const SERVICES_PATH: &str = "/v2/services";
pub const SERVICE_PLANS_PATH: &str = "/v2/service_plans";
pub const EVENTS_PATH: &str = "/v2/events";

/// Instance lifecycle audit event types
pub const EVENT_INSTANCE_CREATE: &str = "audit.service_instance.create";
pub const EVENT_INSTANCE_UPDATE: &str = "audit.service_instance.update";
pub const EVENT_INSTANCE_DELETE: &str = "audit.service_instance.delete";

/// OAuth client used by the host CLI for refresh-token grants
pub const OAUTH_TOKEN_PATH: &str = "/oauth/token";
pub const OAUTH_CLIENT_ID: &str = "cf";
pub const OAUTH_BASIC_AUTH: &str = "Basic Y2Y6";

/// Services the broker knows how to back up
pub const BACKUP_CAPABLE_SERVICES: &[&str] = &["blueprint", "postgresql", "mongodb", "redis"];

/// Backup type requested when starting a backup
pub const BACKUP_TYPE_ONLINE: &str = "online";
