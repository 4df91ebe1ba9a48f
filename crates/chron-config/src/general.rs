//! General application configuration.

use serde::{Deserialize, Serialize};

/// Default number of revisions per history page.
const fn default_page_size() -> u32 {
    20
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GeneralConfig {
    /// Revisions per page for history listings.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
        }
    }
}
