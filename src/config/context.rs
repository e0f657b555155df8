#![forbid(unsafe_code)]

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::TaskgoError;
use crate::task::duration::{NONE_SENTINEL, Validity};
use crate::task::model::{DEFAULT_GROUP, normalize_group};
use crate::task::policy::validate_validity;
use crate::task::storage::write_json_atomic;

/// Default validity applied to General when no context has been saved yet.
pub const DEFAULT_GENERAL_VALIDITY: &str = "24h";

/// Active group plus the per-group default validity policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Context {
    pub current_group: String,
    pub group_validity: BTreeMap<String, String>,
}

impl Default for Context {
    fn default() -> Self {
        let mut group_validity = BTreeMap::new();
        group_validity.insert(
            DEFAULT_GROUP.to_owned(),
            DEFAULT_GENERAL_VALIDITY.to_owned(),
        );
        Self {
            current_group: String::new(),
            group_validity,
        }
    }
}

impl Context {
    /// The group new tasks join when none is given.
    #[must_use]
    pub fn current_group_name(&self) -> &str {
        normalize_group(&self.current_group)
    }

    /// Points the context at `group`; General is stored as the empty name.
    pub fn checkout(&mut self, group: &str) {
        let g = group.trim();
        self.current_group = if g.eq_ignore_ascii_case("default")
            || g.eq_ignore_ascii_case(DEFAULT_GROUP)
        {
            String::new()
        } else {
            g.to_owned()
        };
    }

    #[must_use]
    pub fn validity_for(&self, group: &str) -> Option<&str> {
        self.group_validity
            .get(normalize_group(group))
            .map(String::as_str)
    }

    pub fn set_validity(&mut self, group: &str, validity: &str) {
        self.group_validity
            .insert(normalize_group(group).to_owned(), validity.trim().to_owned());
    }

    /// Validates `raw` and records it as `group`'s default validity.
    ///
    /// `none` is stored as an entry of its own: removing General's entry would
    /// bring back the 24h fallback.
    pub fn set_policy(&mut self, group: &str, raw: &str) -> Result<Validity, TaskgoError> {
        let validity = validate_validity(raw)?;
        match validity {
            Validity::Clear => self.set_validity(group, NONE_SENTINEL),
            Validity::For(_) => self.set_validity(group, raw),
        }
        Ok(validity)
    }
}

pub trait ContextStore {
    fn load(&self) -> Result<Context, TaskgoError>;
    fn save(&self, ctx: &Context) -> Result<(), TaskgoError>;
}

#[derive(Debug, Clone)]
pub struct JsonContextStore {
    path: PathBuf,
}

impl JsonContextStore {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ContextStore for JsonContextStore {
    fn load(&self) -> Result<Context, TaskgoError> {
        if !self.path.exists() {
            return Ok(Context::default());
        }
        let data = std::fs::read(&self.path).map_err(|e| TaskgoError::storage(&self.path, e))?;
        let ctx: Context =
            serde_json::from_slice(&data).map_err(|e| TaskgoError::storage(&self.path, e))?;
        debug!(path = %self.path.display(), group = %ctx.current_group_name(), "loaded context");
        Ok(ctx)
    }

    fn save(&self, ctx: &Context) -> Result<(), TaskgoError> {
        write_json_atomic(&self.path, ctx)?;
        debug!(path = %self.path.display(), "saved context");
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryContextStore {
    ctx: RefCell<Option<Context>>,
}

impl ContextStore for MemoryContextStore {
    fn load(&self) -> Result<Context, TaskgoError> {
        Ok(self.ctx.borrow().clone().unwrap_or_default())
    }

    fn save(&self, ctx: &Context) -> Result<(), TaskgoError> {
        *self.ctx.borrow_mut() = Some(ctx.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::manager::{FixedClock, TaskManager};
    use crate::task::storage::MemoryTaskStorage;
    use time::macros::datetime;

    #[test]
    fn default_context_has_general_policy() {
        let ctx = Context::default();
        assert_eq!(ctx.current_group, "");
        assert_eq!(ctx.current_group_name(), "General");
        assert_eq!(ctx.validity_for(""), Some("24h"));
        assert_eq!(ctx.validity_for("work"), None);
    }

    #[test]
    fn checkout_maps_default_names_to_general() {
        let mut ctx = Context::default();
        ctx.checkout("work");
        assert_eq!(ctx.current_group, "work");
        ctx.checkout("DEFAULT");
        assert_eq!(ctx.current_group, "");
        ctx.checkout("general");
        assert_eq!(ctx.current_group, "");
    }

    #[test]
    fn missing_file_yields_default_and_save_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonContextStore::new(dir.path().join(".taskgo").join("context.json"));
        assert_eq!(store.load().unwrap(), Context::default());

        let mut ctx = Context::default();
        ctx.checkout("work");
        ctx.set_validity("work", "2h");
        ctx.group_validity.remove("General");
        store.save(&ctx).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded, ctx);
        assert_eq!(loaded.validity_for("General"), None);
        assert_eq!(loaded.validity_for("work"), Some("2h"));
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("context.json");
        std::fs::write(&path, r#"{"current_group":"home"}"#).unwrap();
        let ctx = JsonContextStore::new(path).load().unwrap();
        assert_eq!(ctx.current_group, "home");
        assert_eq!(ctx.validity_for("General"), Some("24h"));
    }

    #[test]
    fn memory_store_defaults_until_saved() {
        let store = MemoryContextStore::default();
        assert_eq!(store.load().unwrap(), Context::default());
        let mut ctx = Context::default();
        ctx.checkout("errands");
        store.save(&ctx).unwrap();
        assert_eq!(store.load().unwrap().current_group, "errands");
    }

    #[test]
    fn none_policy_keeps_general_tasks_from_expiring() {
        let store = MemoryContextStore::default();
        let mut ctx = store.load().unwrap();
        assert_eq!(ctx.set_policy("General", " NONE ").unwrap(), Validity::Clear);
        store.save(&ctx).unwrap();

        let ctx = store.load().unwrap();
        assert_eq!(ctx.validity_for(""), Some("none"));

        let tasks = TaskManager::with_clock(
            MemoryTaskStorage::default(),
            FixedClock::new(datetime!(2025-06-01 12:00 UTC)),
        );
        let task = tasks.add("Buy milk", "", "", &ctx).unwrap();
        assert_eq!(task.valid_until, None);
    }

    #[test]
    fn set_policy_stores_trimmed_durations_and_rejects_garbage() {
        let mut ctx = Context::default();
        assert!(matches!(
            ctx.set_policy("work", " 2h "),
            Ok(Validity::For(d)) if d.as_secs() == 7200
        ));
        assert_eq!(ctx.validity_for("work"), Some("2h"));

        let before = ctx.clone();
        assert!(matches!(
            ctx.set_policy("work", "soon"),
            Err(TaskgoError::InvalidDuration(_))
        ));
        assert!(ctx.set_policy("work", "").is_err());
        assert_eq!(ctx, before);
    }
}
