use crate::config::{PluginConfig, Session, SpaceContext};
use crate::errors::PluginError;
use crate::shared::broker::{broker_base_url, BrokerClient};
use crate::shared::events::refresh_access_token;
use crate::shared::http::{HttpClient, PlatformApi};
use crate::shared::resolver::Resolver;
use tracing::debug;

/// Everything a command needs, loaded once per invocation
pub struct CommandContext {
    pub session: Session,
    pub http: HttpClient,
    pub broker_url: String,
    pub force: bool,
}

impl CommandContext {
    pub fn load(force: bool) -> Result<Self, PluginError> {
        let session = Session::load()?;
        let config = PluginConfig::load()?;
        let broker_url = broker_base_url(
            &session.api_endpoint,
            &config.service_broker,
            &config.service_broker_ext_url,
        )?;
        debug!(broker = %broker_url, space = %session.space_guid, "Command context loaded");
        if let Some(user) = session.token_info() {
            debug!(
                user = %user.username,
                email = %user.email,
                user_guid = %user.user_guid,
                scopes = ?user.scope,
                "Session user"
            );
        }

        Ok(Self {
            http: HttpClient::new(config.skip_ssl_flag)?,
            session,
            broker_url,
            force,
        })
    }

    pub fn space(&self) -> SpaceContext {
        self.session.space_context()
    }

    pub fn username(&self) -> Option<String> {
        self.session
            .token_info()
            .map(|info| info.username)
            .filter(|name| !name.is_empty())
    }

    /// Resolver over the platform API using the session's access token
    pub fn resolver(&self) -> Resolver<PlatformApi> {
        let api = PlatformApi::new(
            self.http.clone(),
            &self.session.api_endpoint,
            self.session.access_token.clone(),
        );
        Resolver::new(api, self.space())
    }

    /// Platform API authorized with a token minted from the refresh token
    pub async fn fresh_platform_api(&self) -> Result<PlatformApi, PluginError> {
        let token = refresh_access_token(
            &self.http,
            &self.session.login_endpoint,
            &self.session.refresh_token,
        )
        .await?;
        Ok(PlatformApi::new(
            self.http.clone(),
            &self.session.api_endpoint,
            format!("bearer {}", token),
        ))
    }

    /// Resolver whose audit-event scans run with a freshly minted token
    pub async fn event_resolver(&self) -> Result<Resolver<PlatformApi>, PluginError> {
        Ok(Resolver::new(self.fresh_platform_api().await?, self.space()))
    }

    pub fn broker(&self) -> BrokerClient {
        BrokerClient::new(
            self.http.clone(),
            &self.broker_url,
            &self.session.access_token,
            &self.session.space_guid,
        )
    }
}
