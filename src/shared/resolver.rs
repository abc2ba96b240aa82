use crate::config::SpaceContext;
use crate::errors::PluginError;
use crate::shared::constants::{SERVICES_PATH, SERVICE_INSTANCES_PATH, SERVICE_PLANS_PATH};
use crate::shared::events::EventFilter;
use crate::shared::models::{InstanceDescriptor, ResourcePage, ResourceRecord};
use tracing::{debug, info};

/// Source of paginated resource listings; `path` is a first-page path or a `next_url` cursor
#[allow(async_fn_in_trait)]
pub trait PageSource {
    async fn fetch_page(&self, path: &str) -> Result<ResourcePage, PluginError>;
}

/// Name/GUID translation over the platform's resource listings.
///
/// Every lookup is a fresh linear scan of the listing: pages are fetched in
/// order until a match is found or the cursor runs out. Nothing is cached
/// between lookups.
pub struct Resolver<S> {
    source: S,
    space: SpaceContext,
}

impl<S: PageSource> Resolver<S> {
    pub fn new(source: S, space: SpaceContext) -> Self {
        Self { source, space }
    }

    pub fn space(&self) -> &SpaceContext {
        &self.space
    }

    /// Scan `first_page` and every following page, returning the first value `matcher` yields
    async fn scan<T, F>(&self, first_page: &str, mut matcher: F) -> Result<Option<T>, PluginError>
    where
        F: FnMut(&ResourceRecord) -> Option<T>,
    {
        let mut cursor = Some(first_page.to_string());
        let mut pages = 0usize;

        while let Some(path) = cursor {
            let page = self.source.fetch_page(&path).await?;
            pages += 1;

            if let Some(found) = page.resources.iter().find_map(&mut matcher) {
                debug!(listing = %first_page, pages = %pages, "Match found");
                return Ok(Some(found));
            }
            cursor = page.next_url;
        }

        debug!(listing = %first_page, pages = %pages, "No match in listing");
        Ok(None)
    }

    /// Find the instance record named `name` in the target space.
    ///
    /// A name that exists only in other spaces is a space mismatch, a name
    /// that exists nowhere is not-found.
    async fn find_instance(
        &self,
        name: &str,
        space_guid_hint: Option<&str>,
    ) -> Result<ResourceRecord, PluginError> {
        let target_space = space_guid_hint.unwrap_or(&self.space.guid);
        let mut name_seen = false;

        let found = self
            .scan(SERVICE_INSTANCES_PATH, |record| {
                if record.field("name") != Some(name) {
                    return None;
                }
                name_seen = true;

                let in_space = record.field("space_guid") == Some(target_space);
                let has_plan = record.field("service_plan_guid").is_some();
                (in_space && has_plan).then(|| record.clone())
            })
            .await?;

        match found {
            Some(record) => Ok(record),
            None if !name_seen => Err(PluginError::InstanceNotFound(name.to_string())),
            None => Err(PluginError::SpaceMismatch {
                org: self.space.org_name.clone(),
                space: self.space.name.clone(),
            }),
        }
    }

    pub async fn resolve_instance_guid(
        &self,
        name: &str,
        space_guid_hint: Option<&str>,
    ) -> Result<String, PluginError> {
        let record = self.find_instance(name, space_guid_hint).await?;
        let guid = record.guid().ok_or_else(|| {
            PluginError::UnexpectedResponse(format!("instance record for {} has no guid", name))
        })?;

        info!(instance = %name, guid = %guid, "Resolved instance guid");
        Ok(guid.to_string())
    }

    pub async fn resolve_service_plan_guid(
        &self,
        name: &str,
        space_guid_hint: Option<&str>,
    ) -> Result<String, PluginError> {
        let record = self.find_instance(name, space_guid_hint).await?;
        Ok(record.field("service_plan_guid").unwrap_or_default().to_string())
    }

    /// Reverse lookup; an empty name means the instance no longer exists
    pub async fn resolve_instance_name(&self, guid: &str) -> Result<String, PluginError> {
        let name = self
            .scan(SERVICE_INSTANCES_PATH, |record| {
                (record.guid() == Some(guid))
                    .then(|| record.field("name").unwrap_or_default().to_string())
            })
            .await?;
        Ok(name.unwrap_or_default())
    }

    /// Service label for a service's broker-side unique id
    pub async fn resolve_service_name(
        &self,
        service_unique_id: &str,
    ) -> Result<Option<String>, PluginError> {
        self.lookup(SERVICES_PATH, "unique_id", service_unique_id, "label")
            .await
    }

    /// Plan name for a plan's broker-side unique id
    pub async fn resolve_plan_name(
        &self,
        plan_unique_id: &str,
    ) -> Result<Option<String>, PluginError> {
        self.lookup(SERVICE_PLANS_PATH, "unique_id", plan_unique_id, "name")
            .await
    }

    pub async fn resolve_service_id(
        &self,
        service_guid: &str,
    ) -> Result<Option<String>, PluginError> {
        self.lookup(SERVICES_PATH, "guid", service_guid, "unique_id")
            .await
    }

    pub async fn resolve_service_plan_id(
        &self,
        plan_guid: &str,
    ) -> Result<Option<String>, PluginError> {
        self.lookup(SERVICE_PLANS_PATH, "guid", plan_guid, "unique_id")
            .await
    }

    pub async fn resolve_service_guid_from_plan(
        &self,
        plan_guid: &str,
    ) -> Result<Option<String>, PluginError> {
        self.lookup(SERVICE_PLANS_PATH, "guid", plan_guid, "service_guid")
            .await
    }

    /// Match `key_field == key` and return `value_field` of the same record
    async fn lookup(
        &self,
        listing: &str,
        key_field: &str,
        key: &str,
        value_field: &str,
    ) -> Result<Option<String>, PluginError> {
        self.scan(listing, |record| {
            let key_value = if key_field == "guid" {
                record.guid()
            } else {
                record.field(key_field)
            };
            if key_value != Some(key) {
                return None;
            }
            record.field(value_field).map(str::to_string)
        })
        .await
    }

    /// GUIDs of deleted instances that carried `name`, in first-deleted order
    pub async fn resolve_deleted_instance_guids(
        &self,
        name: &str,
    ) -> Result<Vec<String>, PluginError> {
        let listing = EventFilter::Delete.listing_path(&self.space.guid);
        let mut guids: Vec<String> = Vec::new();

        self.scan::<(), _>(&listing, |record| {
            if record.field("actee_name") == Some(name) {
                if let Some(actee) = record.field("actee") {
                    if !guids.iter().any(|g| g.as_str() == actee) {
                        guids.push(actee.to_string());
                    }
                }
            }
            None
        })
        .await?;

        debug!(instance = %name, matches = guids.len(), "Deleted instance lookup finished");
        Ok(guids)
    }

    /// The single GUID a deleted instance name maps to
    pub async fn resolve_deleted_instance_guid(&self, name: &str) -> Result<String, PluginError> {
        let mut guids = self.resolve_deleted_instance_guids(name).await?;
        match guids.len() {
            0 => Err(PluginError::InstanceNotFound(name.to_string())),
            1 => Ok(guids.remove(0)),
            count => Err(PluginError::AmbiguousGuid {
                name: name.to_string(),
                count,
            }),
        }
    }

    /// Walk the full resolver chain for an instance in the caller's space
    pub async fn describe_instance(&self, name: &str) -> Result<InstanceDescriptor, PluginError> {
        let record = self.find_instance(name, None).await?;
        let guid = record
            .guid()
            .ok_or_else(|| {
                PluginError::UnexpectedResponse(format!("instance record for {} has no guid", name))
            })?
            .to_string();
        let service_plan_guid = record
            .field("service_plan_guid")
            .unwrap_or_default()
            .to_string();

        let service_guid = self.resolve_service_guid_from_plan(&service_plan_guid).await?;
        let service_id = match &service_guid {
            Some(service_guid) => self.resolve_service_id(service_guid).await?,
            None => None,
        };
        let plan_id = self.resolve_service_plan_id(&service_plan_guid).await?;
        let service_label = match &service_id {
            Some(id) => self.resolve_service_name(id).await?,
            None => None,
        };
        let plan_name = match &plan_id {
            Some(id) => self.resolve_plan_name(id).await?,
            None => None,
        };

        Ok(InstanceDescriptor {
            name: name.to_string(),
            guid,
            service_plan_guid,
            service_guid,
            service_id,
            plan_id,
            service_label,
            plan_name,
        })
    }
}
