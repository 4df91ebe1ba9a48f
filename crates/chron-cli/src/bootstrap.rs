use anyhow::Context;
use chron_config::ChronConfig;

use crate::cli::GlobalFlags;

/// Load `.env`, then the layered configuration (plus `--config` if given).
pub fn load_config(flags: &GlobalFlags) -> anyhow::Result<ChronConfig> {
    match dotenvy::dotenv() {
        Err(error) if !error.not_found() => {
            return Err(error).context("failed to load .env");
        }
        _ => {}
    }

    let loaded = match &flags.config {
        Some(path) => ChronConfig::load_from(path),
        None => ChronConfig::load(),
    };
    loaded.context("failed to load chronicle configuration")
}
