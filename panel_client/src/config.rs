use std::time::Duration;

use ppg_common::Secret;

pub const DEFAULT_PANEL_TIMEOUT: Duration = Duration::from_secs(15);

/// Connection details for one remote panel server. One [`crate::PanelClient`] is built per panel.
#[derive(Clone, Debug)]
pub struct PanelConfig {
    /// Base URL of the panel, e.g. "https://panel1.example.com:2053"
    pub base_url: String,
    pub username: String,
    pub password: Secret<String>,
    /// Per-call timeout. Panel calls block on external HTTP and must never hang a worker indefinitely.
    pub timeout: Duration,
}

impl PanelConfig {
    pub fn new(base_url: impl Into<String>, username: impl Into<String>, password: Secret<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url, username: username.into(), password, timeout: DEFAULT_PANEL_TIMEOUT }
    }
}
