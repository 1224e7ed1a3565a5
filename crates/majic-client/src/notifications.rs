//! Foreground handling of agent notifications.
//!
//! Update prompts are held back for a short window after the page loads,
//! since the first revalidation of a fresh page tends to report changes the
//! user is already looking at. Offline notices are shown at once and go away
//! by themselves.

use std::time::Duration;

use majic_agent::{AgentError, CacheAgent, ClientConnection, Network, UpdateNotification};
use majic_core::ClientConfig;
use tokio::time::Instant;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(5);
pub const DEFAULT_OFFLINE_DISPLAY: Duration = Duration::from_secs(10);

/// A notice the foreground shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Banner {
    UpdateAvailable,
    Offline,
}

/// Per-page notification state.
#[derive(Debug)]
pub struct NotificationCenter {
    loaded_at: Instant,
    debounce: Duration,
    offline_display: Duration,
    update_visible: bool,
    offline_until: Option<Instant>,
}

impl Default for NotificationCenter {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE, DEFAULT_OFFLINE_DISPLAY)
    }
}

impl NotificationCenter {
    /// State for a page loaded now.
    pub fn new(debounce: Duration, offline_display: Duration) -> Self {
        Self {
            loaded_at: Instant::now(),
            debounce,
            offline_display,
            update_visible: false,
            offline_until: None,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(
            Duration::from_millis(config.debounce_ms),
            Duration::from_millis(config.offline_display_ms),
        )
    }

    /// Apply one notification. Returns the banner it raised, if any.
    pub fn receive(&mut self, notification: UpdateNotification) -> Option<Banner> {
        match notification {
            UpdateNotification::NewVersionAvailable { .. } => {
                let since_load = self.loaded_at.elapsed();
                if since_load > self.debounce {
                    self.update_visible = true;
                    Some(Banner::UpdateAvailable)
                } else {
                    tracing::debug!(?since_load, "Update notice suppressed right after load");
                    None
                }
            }
            UpdateNotification::OfflineMode { .. } => {
                self.offline_until = Some(Instant::now() + self.offline_display);
                Some(Banner::Offline)
            }
        }
    }

    /// Wait for the next notification on `connection` and apply it.
    ///
    /// Returns `None` once the agent side is gone.
    pub async fn listen(&mut self, connection: &mut ClientConnection) -> Option<Option<Banner>> {
        let notification = connection.recv().await?;
        Some(self.receive(notification))
    }

    pub fn is_update_visible(&self) -> bool {
        self.update_visible
    }

    pub fn is_offline_visible(&self) -> bool {
        self.offline_until
            .is_some_and(|until| Instant::now() < until)
    }

    pub fn visible(&self) -> Vec<Banner> {
        let mut banners = Vec::new();
        if self.is_update_visible() {
            banners.push(Banner::UpdateAvailable);
        }
        if self.is_offline_visible() {
            banners.push(Banner::Offline);
        }
        banners
    }

    pub fn dismiss_update(&mut self) {
        self.update_visible = false;
    }

    pub fn dismiss_offline(&mut self) {
        self.offline_until = None;
    }

    /// The user asked for the new version: hide the prompt and drop the
    /// agent's versioned partitions so the reload refetches everything.
    pub fn accept_update<N: Network>(
        &mut self,
        agent: &CacheAgent<N>,
    ) -> Result<Vec<String>, AgentError> {
        self.dismiss_update();
        agent.clear_for_update()
    }
}
