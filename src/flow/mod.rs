#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::TaskgoError;
use crate::task::storage::write_json_atomic;

/// A named set of resources (links, app names) for a focused work session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Flow {
    pub name: String,
    #[serde(default)]
    pub resources: Vec<String>,
}

/// Saved flows, stored as one JSON object keyed by flow name.
#[derive(Debug, Clone)]
pub struct FlowStore {
    path: PathBuf,
}

impl FlowStore {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, Flow>, TaskgoError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let data = std::fs::read(&self.path).map_err(|e| TaskgoError::storage(&self.path, e))?;
        let flows: BTreeMap<String, Flow> =
            serde_json::from_slice(&data).map_err(|e| TaskgoError::storage(&self.path, e))?;
        debug!(path = %self.path.display(), count = flows.len(), "loaded flows");
        Ok(flows)
    }

    fn save(&self, flows: &BTreeMap<String, Flow>) -> Result<(), TaskgoError> {
        write_json_atomic(&self.path, flows)?;
        debug!(path = %self.path.display(), count = flows.len(), "saved flows");
        Ok(())
    }

    /// Creates an empty flow; an existing name is an error.
    pub fn create(&self, name: &str) -> Result<Flow, TaskgoError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(TaskgoError::EmptyFlowName);
        }
        let mut flows = self.load()?;
        if flows.contains_key(name) {
            return Err(TaskgoError::FlowExists(name.to_owned()));
        }

        let flow = Flow {
            name: name.to_owned(),
            resources: Vec::new(),
        };
        flows.insert(flow.name.clone(), flow.clone());
        self.save(&flows)?;
        info!(flow = name, "flow created");
        Ok(flow)
    }

    /// Appends `resources` to the flow in the given order. Blank entries are skipped.
    pub fn add_resources(&self, name: &str, resources: &[String]) -> Result<Flow, TaskgoError> {
        let name = name.trim();
        let mut flows = self.load()?;
        let flow = flows
            .get_mut(name)
            .ok_or_else(|| TaskgoError::FlowNotFound(name.to_owned()))?;

        let before = flow.resources.len();
        flow.resources.extend(
            resources
                .iter()
                .map(|r| r.trim())
                .filter(|r| !r.is_empty())
                .map(str::to_owned),
        );
        let added = flow.resources.len() - before;
        let flow = flow.clone();

        if added > 0 {
            self.save(&flows)?;
        }
        info!(flow = name, added, "flow resources added");
        Ok(flow)
    }

    pub fn get(&self, name: &str) -> Result<Flow, TaskgoError> {
        let name = name.trim();
        self.load()?
            .remove(name)
            .ok_or_else(|| TaskgoError::FlowNotFound(name.to_owned()))
    }

    /// Flow names in sorted order.
    pub fn list(&self) -> Result<Vec<String>, TaskgoError> {
        Ok(self.load()?.into_keys().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(dir: &tempfile::TempDir) -> FlowStore {
        FlowStore::new(dir.path().join("flows.json"))
    }

    fn words(ws: &[&str]) -> Vec<String> {
        ws.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn missing_file_has_no_flows() {
        let dir = tempfile::tempdir().expect("tempdir");
        let flows = store(&dir);
        assert!(flows.list().unwrap().is_empty());
        assert!(matches!(
            flows.get("coding"),
            Err(TaskgoError::FlowNotFound(name)) if name == "coding"
        ));
    }

    #[test]
    fn create_rejects_duplicates_and_blank_names() {
        let dir = tempfile::tempdir().expect("tempdir");
        let flows = store(&dir);

        let created = flows.create(" coding ").unwrap();
        assert_eq!(created.name, "coding");
        assert!(created.resources.is_empty());

        assert!(matches!(flows.create("coding"), Err(TaskgoError::FlowExists(_))));
        assert!(matches!(flows.create("  "), Err(TaskgoError::EmptyFlowName)));
        assert_eq!(flows.list().unwrap(), ["coding"]);
    }

    #[test]
    fn resources_are_appended_in_order_and_persisted() {
        let dir = tempfile::tempdir().expect("tempdir");
        let flows = store(&dir);
        flows.create("coding").unwrap();

        flows
            .add_resources("coding", &words(&["https://github.com", "code"]))
            .unwrap();
        let flow = flows
            .add_resources("coding", &words(&["", "https://docs.rs"]))
            .unwrap();
        assert_eq!(flow.resources, ["https://github.com", "code", "https://docs.rs"]);

        let reopened = store(&dir);
        assert_eq!(reopened.get("coding").unwrap(), flow);
    }

    #[test]
    fn adding_to_an_unknown_flow_writes_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let flows = store(&dir);
        let err = flows
            .add_resources("reading", &words(&["https://lwn.net"]))
            .unwrap_err();
        assert!(matches!(err, TaskgoError::FlowNotFound(name) if name == "reading"));
        assert!(!flows.path().exists());
    }

    #[test]
    fn list_is_sorted_by_name() {
        let dir = tempfile::tempdir().expect("tempdir");
        let flows = store(&dir);
        for name in ["writing", "coding", "reading"] {
            flows.create(name).unwrap();
        }
        assert_eq!(flows.list().unwrap(), ["coding", "reading", "writing"]);
    }

    #[test]
    fn reads_name_keyed_object_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let flows = store(&dir);
        std::fs::write(
            flows.path(),
            r#"{"deep": {"name": "deep", "resources": ["obsidian"]}, "bare": {"name": "bare"}}"#,
        )
        .unwrap();

        assert_eq!(flows.get("deep").unwrap().resources, ["obsidian"]);
        assert!(flows.get("bare").unwrap().resources.is_empty());
    }

    #[test]
    fn malformed_file_is_a_storage_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let flows = store(&dir);
        std::fs::write(flows.path(), "[1, 2]").unwrap();
        assert!(flows.create("coding").unwrap_err().is_storage());
        assert_eq!(std::fs::read_to_string(flows.path()).unwrap(), "[1, 2]");
    }
}
