use crate::errors::{BrokerFailure, PluginError};
use crate::shared::constants::{
    EVENTS_PATH, EVENT_INSTANCE_CREATE, EVENT_INSTANCE_DELETE, EVENT_INSTANCE_UPDATE,
    OAUTH_BASIC_AUTH, OAUTH_CLIENT_ID, OAUTH_TOKEN_PATH,
};
use crate::shared::http::HttpClient;
use crate::shared::models::EventRecord;
use crate::shared::resolver::PageSource;
use futures::stream::{self, Stream, TryStreamExt};
use serde::Deserialize;
use tracing::{debug, info};

/// Which instance lifecycle events to query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFilter {
    Create,
    Update,
    Delete,
    All,
}

impl EventFilter {
    pub fn from_flags(create: bool, update: bool, delete: bool) -> Self {
        match (create, update, delete) {
            (true, false, false) => EventFilter::Create,
            (false, true, false) => EventFilter::Update,
            (false, false, true) => EventFilter::Delete,
            _ => EventFilter::All,
        }
    }

    /// Operator-facing name of the filter
    pub fn as_str(&self) -> &'static str {
        match self {
            EventFilter::Create => "create",
            EventFilter::Update => "update",
            EventFilter::Delete => "delete",
            EventFilter::All => "create, update and delete",
        }
    }

    /// Event-type query predicate scoped to one space
    pub fn predicate(&self, space_guid: &str) -> String {
        let event_type = match self {
            EventFilter::Create => format!("type:{}", EVENT_INSTANCE_CREATE),
            EventFilter::Update => format!("type:{}", EVENT_INSTANCE_UPDATE),
            EventFilter::Delete => format!("type:{}", EVENT_INSTANCE_DELETE),
            EventFilter::All => format!(
                "type IN {},{},{}",
                EVENT_INSTANCE_DELETE, EVENT_INSTANCE_CREATE, EVENT_INSTANCE_UPDATE
            ),
        };
        format!("{};space_guid:{}", event_type, space_guid)
    }

    /// First-page path of the event listing for this filter
    pub fn listing_path(&self, space_guid: &str) -> String {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("q", &self.predicate(space_guid))
            .finish();
        format!("{}?{}", EVENTS_PATH, query)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
}

/// Mint a fresh access token from the stored refresh token.
///
/// The session's cached access token may already be stale when events are
/// queried, so the event client never uses it.
pub async fn refresh_access_token(
    http: &HttpClient,
    login_endpoint: &str,
    refresh_token: &str,
) -> Result<String, PluginError> {
    let url = format!("{}{}", login_endpoint.trim_end_matches('/'), OAUTH_TOKEN_PATH);
    debug!(url = %url, "Exchanging refresh token");

    let response = http
        .post_form(
            &url,
            OAUTH_BASIC_AUTH,
            &[
                ("grant_type", "refresh_token"),
                ("client_id", OAUTH_CLIENT_ID),
                ("client_secret", ""),
                ("refresh_token", refresh_token),
            ],
        )
        .await?;

    if !(200..300).contains(&response.status) {
        let failure = BrokerFailure::from_body(response.status, &response.body);
        return Err(PluginError::TokenRefresh(failure.to_string()));
    }

    let token: TokenResponse = response.json()?;
    match token.access_token {
        Some(access_token) if !access_token.is_empty() => {
            info!("Obtained fresh access token");
            Ok(access_token)
        }
        _ => Err(PluginError::TokenRefresh(
            "token response carried no access_token".to_string(),
        )),
    }
}

type PageItems = stream::Iter<std::vec::IntoIter<Result<EventRecord, PluginError>>>;

/// Audit-event queries over a paginated listing
pub struct EventClient<S> {
    source: S,
}

impl<S: PageSource> EventClient<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    /// Lazily walk every page of matching events, starting from page one on each call
    pub fn events<'a>(
        &'a self,
        filter: EventFilter,
        space_guid: &str,
    ) -> impl Stream<Item = Result<EventRecord, PluginError>> + 'a {
        let first_page = filter.listing_path(space_guid);
        debug!(filter = ?filter, path = %first_page, "Querying instance events");

        stream::try_unfold(Some(first_page), move |cursor| self.next_page(cursor)).try_flatten()
    }

    async fn next_page(
        &self,
        cursor: Option<String>,
    ) -> Result<Option<(PageItems, Option<String>)>, PluginError> {
        let Some(path) = cursor else {
            return Ok(None);
        };

        let page = self.source.fetch_page(&path).await?;
        let records: Vec<Result<EventRecord, PluginError>> = page
            .resources
            .iter()
            .map(|record| Ok(EventRecord::from_resource(record)))
            .collect();

        Ok(Some((stream::iter(records), page.next_url)))
    }

    pub async fn collect_events(
        &self,
        filter: EventFilter,
        space_guid: &str,
    ) -> Result<Vec<EventRecord>, PluginError> {
        self.events(filter, space_guid).try_collect().await
    }
}
