#![forbid(unsafe_code)]

use std::cell::{Cell, RefCell};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::TaskgoError;
use crate::task::model::Task;

/// Whole-collection persistence used by the task engine.
pub trait TaskRepository {
    /// Returns every stored task in stored order; an absent store is empty.
    fn load(&self) -> Result<Vec<Task>, TaskgoError>;

    /// Replaces the stored collection with `tasks`.
    fn save(&self, tasks: &[Task]) -> Result<(), TaskgoError>;
}

/// Tasks kept as one pretty-printed JSON array on disk.
#[derive(Debug, Clone)]
pub struct JsonTaskStorage {
    path: PathBuf,
}

impl JsonTaskStorage {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TaskRepository for JsonTaskStorage {
    fn load(&self) -> Result<Vec<Task>, TaskgoError> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "task file missing, starting empty");
            return Ok(Vec::new());
        }
        let data = std::fs::read(&self.path).map_err(|e| TaskgoError::storage(&self.path, e))?;
        let tasks: Vec<Task> =
            serde_json::from_slice(&data).map_err(|e| TaskgoError::storage(&self.path, e))?;
        debug!(path = %self.path.display(), count = tasks.len(), "loaded tasks");
        Ok(tasks)
    }

    fn save(&self, tasks: &[Task]) -> Result<(), TaskgoError> {
        write_json_atomic(&self.path, &tasks)?;
        debug!(path = %self.path.display(), count = tasks.len(), "saved tasks");
        Ok(())
    }
}

/// Writes `value` next to `path` and renames it into place.
pub(crate) fn write_json_atomic(
    path: &Path,
    value: &impl serde::Serialize,
) -> Result<(), TaskgoError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| TaskgoError::storage(parent, e))?;
    }
    let data = serde_json::to_vec_pretty(value).map_err(|e| TaskgoError::storage(path, e))?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, &data).map_err(|e| TaskgoError::storage(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| TaskgoError::storage(path, e))?;
    Ok(())
}

/// In-process repository; counts writes so callers can observe save avoidance.
#[derive(Debug, Default)]
pub struct MemoryTaskStorage {
    tasks: RefCell<Vec<Task>>,
    saves: Cell<usize>,
}

impl MemoryTaskStorage {
    #[must_use]
    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        Self {
            tasks: RefCell::new(tasks),
            saves: Cell::new(0),
        }
    }

    #[must_use]
    pub fn save_count(&self) -> usize {
        self.saves.get()
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<Task> {
        self.tasks.borrow().clone()
    }
}

impl TaskRepository for MemoryTaskStorage {
    fn load(&self) -> Result<Vec<Task>, TaskgoError> {
        Ok(self.tasks.borrow().clone())
    }

    fn save(&self, tasks: &[Task]) -> Result<(), TaskgoError> {
        *self.tasks.borrow_mut() = tasks.to_vec();
        self.saves.set(self.saves.get() + 1);
        Ok(())
    }
}
