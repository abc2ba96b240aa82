use crate::context::CommandContext;
use crate::errors::PluginError;
use crate::shared::display::DisplayFormatter;
use crate::shared::events::{EventClient, EventFilter};
use tracing::info;

pub async fn instance_events(
    context: &CommandContext,
    filter: EventFilter,
) -> Result<(), PluginError> {
    let space = context.space();
    DisplayFormatter::action(
        "Getting service instance events of type",
        filter.as_str(),
        &space,
        context.username().as_deref(),
    );

    let client = EventClient::new(context.fresh_platform_api().await?);
    let events = client.collect_events(filter, &space.guid).await?;

    info!(filter = ?filter, count = events.len(), "Fetched instance events");
    DisplayFormatter::print_events(&events);
    Ok(())
}
