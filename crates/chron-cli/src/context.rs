use std::path::Path;

use anyhow::Context;
use chron_config::{ChronConfig, ConfigError};
use chron_db::service::AuditService;

/// Everything a command handler needs.
pub struct AppContext {
    pub service: AuditService,
    pub settings: ChronConfig,
}

impl AppContext {
    /// Build the audit configuration and open the configured database,
    /// creating its directory if needed.
    pub async fn init(settings: ChronConfig) -> anyhow::Result<Self> {
        if settings.audit.tracked.is_empty() {
            return Err(ConfigError::NotConfigured {
                section: "audit.tracked".into(),
            }
            .into());
        }

        let parent = Path::new(&settings.database.path)
            .parent()
            .filter(|p| !p.as_os_str().is_empty());
        if let (false, Some(parent)) = (settings.database.is_in_memory(), parent) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let service = AuditService::open(&settings).await?;
        tracing::debug!(
            path = %settings.database.path,
            tracked = settings.audit.tracked.len(),
            "audit service ready"
        );
        Ok(Self { service, settings })
    }

    /// Revisions per page for history listings.
    pub const fn page_size(&self) -> u32 {
        self.settings.general.page_size
    }
}
