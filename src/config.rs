use crate::errors::PluginError;
use crate::shared::constants::{
    CF_CONFIG_FILE, CF_DIR, DEFAULT_BROKER_EXT_URL, DEFAULT_SERVICE_BROKER, DEFAULT_SKIP_SSL,
    PLUGIN_CONFIG_FILE,
};
use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Resolve the `.cf` directory from `CF_HOME` or the user's home directory
pub fn cf_dir() -> Result<PathBuf, PluginError> {
    dotenv::dotenv().ok();

    let base = match env::var("CF_HOME") {
        Ok(home) if !home.is_empty() => PathBuf::from(home),
        _ => dirs::home_dir().ok_or(PluginError::HomeDirNotFound)?,
    };
    Ok(base.join(CF_DIR))
}

fn read_file(path: &Path) -> Result<String, PluginError> {
    fs::read_to_string(path).map_err(|source| PluginError::FileRead {
        path: path.to_path_buf(),
        source,
    })
}

/// Layout of the host CLI's persisted session file
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SessionFile {
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    refresh_token: String,
    #[serde(default)]
    space_fields: NamedFields,
    #[serde(default)]
    organization_fields: NamedFields,
    #[serde(default)]
    target: String,
    #[serde(default)]
    authorization_endpoint: String,
}

#[derive(Debug, Default, Deserialize)]
struct NamedFields {
    #[serde(rename = "GUID", default)]
    guid: String,
    #[serde(rename = "Name", default)]
    name: String,
}

/// Read-only view of the host CLI session, loaded once per invocation
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub space_guid: String,
    pub space_name: String,
    pub org_name: String,
    pub api_endpoint: String,
    pub login_endpoint: String,
}

impl Session {
    pub fn load() -> Result<Self, PluginError> {
        Self::load_from(&cf_dir()?.join(CF_CONFIG_FILE))
    }

    pub fn load_from(path: &Path) -> Result<Self, PluginError> {
        debug!(path = %path.display(), "Loading session");
        Self::from_json(&read_file(path)?)
    }

    pub fn from_json(content: &str) -> Result<Self, PluginError> {
        let file: SessionFile = serde_json::from_str(content)?;

        if file.access_token.is_empty() {
            return Err(PluginError::MissingSessionField("Access Token"));
        }
        if file.space_fields.guid.is_empty() {
            return Err(PluginError::MissingSessionField("Space Fields"));
        }
        if file.target.is_empty() {
            return Err(PluginError::MissingSessionField("Api Endpoint"));
        }
        if file.authorization_endpoint.is_empty() {
            return Err(PluginError::MissingSessionField("Authorization Endpoint"));
        }

        Ok(Session {
            access_token: file.access_token,
            refresh_token: file.refresh_token,
            space_guid: file.space_fields.guid.trim_matches('"').to_string(),
            space_name: file.space_fields.name.trim_matches('"').to_string(),
            org_name: file.organization_fields.name.trim_matches('"').to_string(),
            api_endpoint: file.target.trim_end_matches('/').to_string(),
            login_endpoint: file.authorization_endpoint.trim_end_matches('/').to_string(),
        })
    }

    pub fn space_context(&self) -> SpaceContext {
        SpaceContext {
            guid: self.space_guid.clone(),
            name: self.space_name.clone(),
            org_name: self.org_name.clone(),
        }
    }

    pub fn token_info(&self) -> Option<TokenInfo> {
        TokenInfo::from_access_token(&self.access_token)
    }
}

/// The org/space the caller is targeting
#[derive(Debug, Clone, PartialEq)]
pub struct SpaceContext {
    pub guid: String,
    pub name: String,
    pub org_name: String,
}

/// Plugin settings persisted next to the session file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginConfig {
    pub service_broker: String,
    pub service_broker_ext_url: String,
    pub skip_ssl_flag: bool,
}

impl Default for PluginConfig {
    fn default() -> Self {
        PluginConfig {
            service_broker: DEFAULT_SERVICE_BROKER.to_string(),
            service_broker_ext_url: DEFAULT_BROKER_EXT_URL.to_string(),
            skip_ssl_flag: DEFAULT_SKIP_SSL,
        }
    }
}

impl PluginConfig {
    pub fn load() -> Result<Self, PluginError> {
        let config = Self::load_or_create(&cf_dir()?.join(PLUGIN_CONFIG_FILE))?;
        config.with_env_overrides()
    }

    /// Load the config file, writing the defaults first if it does not exist
    pub fn load_or_create(path: &Path) -> Result<Self, PluginError> {
        if !path.exists() {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let defaults = PluginConfig::default();
            fs::write(path, serde_json::to_string_pretty(&defaults)?)?;
            info!(file = %path.display(), "Created default plugin configuration");
            return Ok(defaults);
        }

        Ok(serde_json::from_str(&read_file(path)?)?)
    }

    fn with_env_overrides(mut self) -> Result<Self, PluginError> {
        if let Ok(broker) = env::var("SF_SERVICE_BROKER") {
            self.service_broker = broker;
        }
        if let Ok(ext_url) = env::var("SF_SERVICE_BROKER_EXT_URL") {
            self.service_broker_ext_url = ext_url;
        }
        if let Ok(skip) = env::var("SF_SKIP_SSL_VALIDATION") {
            self.skip_ssl_flag = skip.parse().map_err(|_| {
                PluginError::ConfigurationError(format!(
                    "SF_SKIP_SSL_VALIDATION must be true or false, got {}",
                    skip
                ))
            })?;
        }
        Ok(self)
    }
}

/// Claims decoded from the session's access token
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TokenInfo {
    #[serde(rename = "user_name", default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(rename = "user_id", default)]
    pub user_guid: String,
    #[serde(default)]
    pub scope: Vec<String>,
}

impl TokenInfo {
    /// Decode the JWT payload of a `bearer <jwt>` token; any malformation yields None
    pub fn from_access_token(access_token: &str) -> Option<Self> {
        let token = access_token.split_whitespace().nth(1)?;
        let payload = token.split('.').nth(1)?;
        let trimmed = payload.trim_end_matches('=');

        let decoded = URL_SAFE_NO_PAD
            .decode(trimmed)
            .or_else(|_| STANDARD_NO_PAD.decode(trimmed))
            .ok()?;
        serde_json::from_slice(&decoded).ok()
    }
}
