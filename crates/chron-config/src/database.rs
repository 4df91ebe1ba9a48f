//! Database location.

use serde::{Deserialize, Serialize};

fn default_path() -> String {
    ".chronicle/chronicle.db".into()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Path to the libSQL database file, or `:memory:`.
    #[serde(default = "default_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
        }
    }
}

impl DatabaseConfig {
    pub fn is_in_memory(&self) -> bool {
        self.path == ":memory:"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_project_local_file() {
        let config = DatabaseConfig::default();
        assert_eq!(config.path, ".chronicle/chronicle.db");
        assert!(!config.is_in_memory());
    }
}
