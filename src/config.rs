//! Ambient runtime configuration, loaded from the environment via `dotenvy`.

use std::path::PathBuf;

/// Engine-wide configuration: where workflow documents and prompt templates
/// live on disk, and a cap on map-over-list fan-out.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub workflows_root: PathBuf,
    pub shared_prompts_root: PathBuf,
    pub max_concurrent_map_iterations: usize,
}

impl EngineConfig {
    /// Loads `.env` (if present) then reads `LOOMGRAPH_WORKFLOWS_ROOT`,
    /// `LOOMGRAPH_SHARED_PROMPTS_ROOT`, and `LOOMGRAPH_MAX_MAP_CONCURRENCY`,
    /// falling back to sane defaults so the engine runs without any
    /// environment configured at all.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        let workflows_root = std::env::var("LOOMGRAPH_WORKFLOWS_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("workflows"));

        let shared_prompts_root = std::env::var("LOOMGRAPH_SHARED_PROMPTS_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| workflows_root.join("../shared_prompts"));

        let max_concurrent_map_iterations = std::env::var("LOOMGRAPH_MAX_MAP_CONCURRENCY")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(32);

        Self {
            workflows_root,
            shared_prompts_root,
            max_concurrent_map_iterations,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workflows_root: PathBuf::from("workflows"),
            shared_prompts_root: PathBuf::from("shared_prompts"),
            max_concurrent_map_iterations: 32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable_without_env() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.max_concurrent_map_iterations, 32);
    }
}
