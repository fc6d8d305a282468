use anyhow::{Context, Result};

use crate::tracker::FetchCoordinator;

use super::state::AppState;

/// Side effects triggered from the event loop: background fetches and the clipboard.
pub struct ActionDispatcher<'a> {
    fetcher: &'a mut FetchCoordinator,
}

impl<'a> ActionDispatcher<'a> {
    pub fn new(fetcher: &'a mut FetchCoordinator) -> Self {
        Self { fetcher }
    }

    /// Starts a fetch for the current draft; earlier in-flight results become stale.
    pub fn refetch(&mut self, state: &mut AppState) -> u64 {
        let generation = self.fetcher.request(state.criteria());
        state.loading = self.fetcher.is_loading();
        generation
    }

    pub fn load_repos(&self) {
        self.fetcher.request_repos();
    }

    pub fn copy_message(&self, state: &AppState) -> Result<()> {
        copy_to_clipboard(&state.message_text())
    }
}

pub fn copy_to_clipboard(text: &str) -> Result<()> {
    let mut clipboard = arboard::Clipboard::new().context("opening system clipboard")?;
    clipboard
        .set_text(text.to_owned())
        .context("writing to clipboard")?;
    Ok(())
}
