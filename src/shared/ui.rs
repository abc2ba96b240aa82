use crate::errors::PluginError;
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};

/// Ask the operator before a state-changing call; `force` skips the prompt
pub fn confirm_action(prompt: &str, force: bool) -> Result<(), PluginError> {
    if force {
        return Ok(());
    }

    let confirmed = Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()?;

    if confirmed {
        Ok(())
    } else {
        Err(PluginError::Declined)
    }
}

/// Progress bar for per-record instance name resolution
pub fn create_resolution_progress_bar(total: usize) -> Result<ProgressBar, PluginError> {
    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );
    Ok(pb)
}
