use crate::errors::PluginError;
use crate::shared::constants::BACKUP_TYPE_ONLINE;
use crate::shared::http::{HttpClient, HttpResponse};
use crate::shared::models::{AbortOutcome, BackupRecord, RestoreRecord, RestoreRequest};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info};
use url::{Host, Url};

/// Derive the broker base URL from the platform API endpoint.
///
/// The leading label of the API host is replaced by the broker name and the
/// configured extension path is appended, so `https://api.cf.example.com`
/// becomes `https://service-fabrik-broker.cf.example.com/api/v1`.
pub fn broker_base_url(
    api_endpoint: &str,
    broker_name: &str,
    ext_url: &str,
) -> Result<String, PluginError> {
    let mut url = Url::parse(api_endpoint)?;

    let host = match url.host() {
        Some(Host::Domain(domain)) => domain.to_string(),
        _ => {
            return Err(PluginError::ConfigurationError(format!(
                "API endpoint {} has no domain name to derive the broker host from",
                api_endpoint
            )))
        }
    };
    let broker_host = match host.split_once('.') {
        Some((_, rest)) => format!("{}.{}", broker_name, rest),
        None => broker_name.to_string(),
    };
    url.set_host(Some(&broker_host))?;

    let ext = ext_url.trim_end_matches('/');
    let path = if ext.starts_with('/') || ext.is_empty() {
        ext.to_string()
    } else {
        format!("/{}", ext)
    };
    url.set_path(&path);

    Ok(url.as_str().trim_end_matches('/').to_string())
}

/// Authenticated client for the backup/restore broker
#[derive(Debug, Clone)]
pub struct BrokerClient {
    http: HttpClient,
    base_url: String,
    access_token: String,
    space_guid: String,
}

impl BrokerClient {
    /// `access_token` is the session token as stored, including its `bearer` prefix
    pub fn new(http: HttpClient, base_url: &str, access_token: &str, space_guid: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: access_token.to_string(),
            space_guid: space_guid.to_string(),
        }
    }

    fn endpoint(&self, path: &str, query: &[(&str, &str)]) -> Result<String, PluginError> {
        let mut url = Url::parse(&format!("{}{}", self.base_url, path))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url.into())
    }

    async fn call(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> Result<HttpResponse, PluginError> {
        let url = self.endpoint(path, query)?;
        let response = self
            .http
            .send(method.clone(), &url, &self.access_token, body)
            .await?;
        debug!(method = %method, path = %path, status = %response.status, "Broker call finished");
        Ok(response)
    }

    /// Start an online backup; returns the new backup's identifier
    pub async fn start_backup(&self, instance_guid: &str) -> Result<String, PluginError> {
        let path = format!("/service_instances/{}/backup", instance_guid);
        let body = json!({ "type": BACKUP_TYPE_ONLINE });
        let response = self.call(Method::POST, &path, &[], Some(&body)).await?;

        if response.status != 202 {
            return Err(PluginError::broker(response.status, &response.body));
        }

        let accepted: Value = response.json()?;
        let backup_guid = ["guid", "backup_guid"]
            .iter()
            .find_map(|key| accepted.get(*key).and_then(Value::as_str))
            .ok_or_else(|| {
                PluginError::UnexpectedResponse(format!(
                    "backup accepted but no backup guid in response: {}",
                    response.body
                ))
            })?;

        info!(instance = %instance_guid, backup = %backup_guid, "Backup started");
        Ok(backup_guid.to_string())
    }

    pub async fn abort_backup(&self, instance_guid: &str) -> Result<AbortOutcome, PluginError> {
        let path = format!("/service_instances/{}/backup", instance_guid);
        let response = self.call(Method::DELETE, &path, &[], None).await?;

        match response.status {
            202 => {
                info!(instance = %instance_guid, "Backup abort accepted");
                Ok(AbortOutcome::Aborted)
            }
            200 => Ok(AbortOutcome::NothingInProgress),
            status => Err(PluginError::broker(status, &response.body)),
        }
    }

    pub async fn backup_info(&self, backup_guid: &str) -> Result<BackupRecord, PluginError> {
        let path = format!("/backups/{}", backup_guid);
        let response = self
            .call(Method::GET, &path, &[("space_guid", self.space_guid.as_str())], None)
            .await?;

        if response.status != 200 {
            return Err(PluginError::broker(response.status, &response.body));
        }
        response.json()
    }

    /// Backups of the space, optionally narrowed to one instance
    pub async fn list_backups(
        &self,
        instance_guid: Option<&str>,
    ) -> Result<Vec<BackupRecord>, PluginError> {
        let mut query = vec![("space_guid", self.space_guid.as_str())];
        if let Some(instance_guid) = instance_guid {
            query.push(("instance_id", instance_guid));
        }
        let response = self.call(Method::GET, "/backups", &query, None).await?;

        if response.status != 200 {
            return Err(PluginError::broker(response.status, &response.body));
        }
        let backups: Vec<BackupRecord> = response.json()?;
        debug!(count = backups.len(), "Listed backups");
        Ok(backups)
    }

    pub async fn delete_backup(&self, backup_guid: &str) -> Result<(), PluginError> {
        let path = format!("/backups/{}", backup_guid);
        let response = self
            .call(Method::DELETE, &path, &[("space_guid", self.space_guid.as_str())], None)
            .await?;

        if response.status != 200 {
            return Err(PluginError::broker(response.status, &response.body));
        }
        info!(backup = %backup_guid, "Backup deleted");
        Ok(())
    }

    pub async fn start_restore(
        &self,
        instance_guid: &str,
        request: &RestoreRequest,
    ) -> Result<(), PluginError> {
        let path = format!("/service_instances/{}/restore", instance_guid);
        let body = request.body(&self.space_guid);
        let response = self.call(Method::POST, &path, &[], Some(&body)).await?;

        match restore_status(&response) {
            202 => {
                info!(instance = %instance_guid, "Restore started");
                Ok(())
            }
            status => Err(PluginError::broker(status, &response.body)),
        }
    }

    pub async fn restore_info(&self, instance_guid: &str) -> Result<RestoreRecord, PluginError> {
        let path = format!("/service_instances/{}/restore", instance_guid);
        let response = self
            .call(Method::GET, &path, &[("space_guid", self.space_guid.as_str())], None)
            .await?;

        match restore_status(&response) {
            200 => response.json(),
            status => Err(PluginError::broker(status, &response.body)),
        }
    }

    pub async fn abort_restore(&self, instance_guid: &str) -> Result<AbortOutcome, PluginError> {
        let path = format!("/service_instances/{}/restore", instance_guid);
        let response = self
            .call(Method::DELETE, &path, &[("space_guid", self.space_guid.as_str())], None)
            .await?;

        match restore_status(&response) {
            202 => {
                info!(instance = %instance_guid, "Restore abort accepted");
                Ok(AbortOutcome::Aborted)
            }
            200 => Ok(AbortOutcome::NothingInProgress),
            status => Err(PluginError::broker(status, &response.body)),
        }
    }
}

/// Restore endpoints report their outcome in the body's `status` field
fn restore_status(response: &HttpResponse) -> u16 {
    response.body_status().unwrap_or(response.status)
}
