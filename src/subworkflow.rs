//! Sub-workflow Cache: process-wide, key = workflow name, value = compiled
//! graph. First compile on demand, subsequent lookups hit the cache; no
//! eviction. Compilation is pure given the document, so a repeat compile
//! triggered by a racing cache miss is harmless.

use crate::compiler::{self, CompiledGraph};
use crate::document::WorkflowDocument;
use crate::error::ValidationError;
use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum SubWorkflowError {
    #[error(transparent)]
    Load(#[from] crate::document::DocumentLoadError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

#[derive(Clone)]
pub struct SubWorkflowCache {
    workflows_root: PathBuf,
    graphs: Arc<DashMap<String, Arc<CompiledGraph>>>,
}

impl SubWorkflowCache {
    pub fn new(workflows_root: PathBuf) -> Self {
        Self {
            workflows_root,
            graphs: Arc::new(DashMap::new()),
        }
    }

    /// Returns the cached graph for `name`, compiling it on first use.
    pub fn get_or_compile(&self, name: &str) -> Result<Arc<CompiledGraph>, SubWorkflowError> {
        if let Some(graph) = self.graphs.get(name) {
            return Ok(graph.clone());
        }

        tracing::debug!(sub_workflow = name, "compiling sub-workflow on first use");
        let document = WorkflowDocument::load_from_dir(&self.workflows_root.join(name))?;
        let graph = Arc::new(compiler::compile(&document)?);
        // A racing compile of the same name is harmless and pure; whichever
        // insert lands last simply wins, both are equivalent.
        self.graphs.insert(name.to_string(), graph.clone());
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_workflow(root: &std::path::Path, name: &str, yaml: &str) {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        let mut file = std::fs::File::create(dir.join("workflow.yaml")).unwrap();
        file.write_all(yaml.as_bytes()).unwrap();
    }

    #[test]
    fn compiles_once_and_caches() {
        let dir = tempfile::tempdir().unwrap();
        write_workflow(
            dir.path(),
            "inner",
            "name: inner\nsteps: []\n",
        );
        let cache = SubWorkflowCache::new(dir.path().to_path_buf());
        let first = cache.get_or_compile("inner").unwrap();
        let second = cache.get_or_compile("inner").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
