//! Prompt template loading: a workflow-local search path, falling back to a
//! shared directory.

use crate::config::EngineConfig;
use crate::error::PromptError;
use std::path::PathBuf;

pub struct PromptLoader<'a> {
    config: &'a EngineConfig,
}

impl<'a> PromptLoader<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    /// Loads `<workflows_root>/<workflow_name>/prompts/<file>`, falling back
    /// to `<shared_prompts_root>/<file>`. On failure the error names both
    /// searched paths.
    pub fn load(&self, workflow_name: &str, file: &str) -> Result<String, PromptError> {
        let workflow_path = self
            .config
            .workflows_root
            .join(workflow_name)
            .join("prompts")
            .join(file);
        if let Ok(text) = std::fs::read_to_string(&workflow_path) {
            return Ok(text);
        }

        let shared_path = self.config.shared_prompts_root.join(file);
        match std::fs::read_to_string(&shared_path) {
            Ok(text) => Ok(text),
            Err(_) => Err(PromptError::NotFound {
                name: file.to_string(),
                workflow_path: display(&workflow_path),
                shared_path: display(&shared_path),
            }),
        }
    }
}

fn display(p: &PathBuf) -> String {
    p.display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_shared_path() {
        let dir = tempfile::tempdir().unwrap();
        let shared = dir.path().join("shared_prompts");
        std::fs::create_dir_all(&shared).unwrap();
        std::fs::write(shared.join("greet.txt"), "hello <name>").unwrap();

        let config = EngineConfig {
            workflows_root: dir.path().join("workflows"),
            shared_prompts_root: shared,
            max_concurrent_map_iterations: 1,
        };
        let loader = PromptLoader::new(&config);
        let text = loader.load("my_workflow", "greet.txt").unwrap();
        assert_eq!(text, "hello <name>");
    }

    #[test]
    fn workflow_local_path_wins() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("workflows/my_workflow/prompts");
        std::fs::create_dir_all(&local).unwrap();
        std::fs::write(local.join("greet.txt"), "local").unwrap();
        let shared = dir.path().join("shared_prompts");
        std::fs::create_dir_all(&shared).unwrap();
        std::fs::write(shared.join("greet.txt"), "shared").unwrap();

        let config = EngineConfig {
            workflows_root: dir.path().join("workflows"),
            shared_prompts_root: shared,
            max_concurrent_map_iterations: 1,
        };
        let loader = PromptLoader::new(&config);
        assert_eq!(loader.load("my_workflow", "greet.txt").unwrap(), "local");
    }

    #[test]
    fn error_names_both_paths() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            workflows_root: dir.path().join("workflows"),
            shared_prompts_root: dir.path().join("shared_prompts"),
            max_concurrent_map_iterations: 1,
        };
        let loader = PromptLoader::new(&config);
        let err = loader.load("my_workflow", "missing.txt").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("missing.txt"));
    }
}
