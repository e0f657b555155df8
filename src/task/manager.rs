#![forbid(unsafe_code)]

use std::cell::Cell;
use std::time::Duration;

use time::OffsetDateTime;
use tracing::{debug, info};

use crate::config::context::Context;
use crate::error::TaskgoError;
use crate::task::duration::Validity;
use crate::task::model::{Task, TaskStatus, next_id, normalize_group};
use crate::task::policy::resolve_validity;
use crate::task::storage::TaskRepository;

/// Source of "now" for expiry and timestamps.
pub trait Clock {
    fn now(&self) -> OffsetDateTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct FixedClock {
    now: Cell<OffsetDateTime>,
}

impl FixedClock {
    #[must_use]
    pub fn new(now: OffsetDateTime) -> Self {
        Self {
            now: Cell::new(now),
        }
    }

    pub fn advance(&self, by: time::Duration) {
        self.now.set(self.now.get() + by);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> OffsetDateTime {
        self.now.get()
    }
}

/// Task lifecycle engine.
///
/// Every operation loads the whole collection from the repository, mutates it
/// and writes it back; nothing is cached between calls.
#[derive(Debug)]
pub struct TaskManager<R, C = SystemClock> {
    repo: R,
    clock: C,
}

impl<R: TaskRepository> TaskManager<R, SystemClock> {
    #[must_use]
    pub fn new(repo: R) -> Self {
        Self::with_clock(repo, SystemClock)
    }
}

impl<R: TaskRepository, C: Clock> TaskManager<R, C> {
    #[must_use]
    pub fn with_clock(repo: R, clock: C) -> Self {
        Self { repo, clock }
    }

    #[must_use]
    pub fn repository(&self) -> &R {
        &self.repo
    }

    /// The instant expiry is judged against.
    #[must_use]
    pub fn now(&self) -> OffsetDateTime {
        self.clock.now()
    }

    pub fn add(
        &self,
        title: &str,
        group: &str,
        validity: &str,
        policy: &Context,
    ) -> Result<Task, TaskgoError> {
        let title = non_empty_title(title)?;
        let group = normalize_group(group).to_owned();
        let lifetime = resolve_validity(validity, &group, policy)?;

        let mut tasks = self.repo.load()?;
        let now = self.clock.now();
        let valid_until = lifetime.map(|d| deadline(now, d, validity)).transpose()?;

        let task = Task {
            id: next_id(&tasks),
            title,
            group,
            status: TaskStatus::Todo,
            created_at: now,
            completed_at: None,
            valid_until,
        };
        tasks.push(task.clone());
        self.repo.save(&tasks)?;

        info!(id = task.id, group = %task.group, expires = task.valid_until.is_some(), "task added");
        Ok(task)
    }

    /// Sweeps expired tasks, then returns the collection in stored order.
    pub fn list(&self) -> Result<Vec<Task>, TaskgoError> {
        self.cleanup_expired()?;
        self.repo.load()
    }

    /// Distinct group names in order of first appearance.
    pub fn groups(&self) -> Result<Vec<String>, TaskgoError> {
        let mut groups: Vec<String> = Vec::new();
        for task in self.list()? {
            let name = task.group_name();
            if !groups.iter().any(|g| g == name) {
                groups.push(name.to_owned());
            }
        }
        Ok(groups)
    }

    /// Drops tasks whose deadline has passed. Writes only if something was dropped.
    pub fn cleanup_expired(&self) -> Result<usize, TaskgoError> {
        let mut tasks = self.repo.load()?;
        let now = self.clock.now();
        let before = tasks.len();
        tasks.retain(|t| !t.is_expired(now));
        let removed = before - tasks.len();

        if removed == 0 {
            debug!("no expired tasks");
            return Ok(0);
        }
        self.repo.save(&tasks)?;
        info!(removed, "expired tasks swept");
        Ok(removed)
    }

    pub fn update(&self, id: u64, status: TaskStatus) -> Result<Task, TaskgoError> {
        let now = self.clock.now();
        let task = self.modify(id, |t| {
            t.set_status(status, now);
            Ok(())
        })?;
        info!(id, %status, "task status updated");
        Ok(task)
    }

    pub fn update_title(&self, id: u64, title: &str) -> Result<Task, TaskgoError> {
        let title = non_empty_title(title)?;
        let task = self.modify(id, |t| {
            t.title = title;
            Ok(())
        })?;
        info!(id, "task renamed");
        Ok(task)
    }

    /// Sets or clears (`""` / `none`) the deadline of one task.
    pub fn update_validity(&self, id: u64, validity: &str) -> Result<Task, TaskgoError> {
        let parsed = Validity::parse(validity)?;
        let now = self.clock.now();
        let task = self.modify(id, |t| apply_validity(t, parsed, now, validity))?;
        info!(id, cleared = task.valid_until.is_none(), "task validity updated");
        Ok(task)
    }

    /// Applies a validity to every task of `group`. No matching task is not an error.
    ///
    /// The string is validated before anything is loaded, so an invalid value
    /// fails even for a group with no tasks.
    pub fn update_group_validity(&self, group: &str, validity: &str) -> Result<usize, TaskgoError> {
        let parsed = Validity::parse(validity)?;
        let target = normalize_group(group);

        let mut tasks = self.repo.load()?;
        let now = self.clock.now();
        let mut touched = 0usize;
        for task in tasks.iter_mut().filter(|t| t.group_name() == target) {
            apply_validity(task, parsed, now, validity)?;
            touched += 1;
        }

        if touched == 0 {
            debug!(group = target, "no tasks in group, nothing to update");
            return Ok(0);
        }
        self.repo.save(&tasks)?;
        info!(group = target, touched, "group validity applied");
        Ok(touched)
    }

    pub fn remove(&self, id: u64) -> Result<Task, TaskgoError> {
        let mut tasks = self.repo.load()?;
        let idx = tasks
            .iter()
            .position(|t| t.id == id)
            .ok_or(TaskgoError::NotFound(id))?;
        let removed = tasks.remove(idx);
        self.repo.save(&tasks)?;
        info!(id, "task removed");
        Ok(removed)
    }

    /// Deletes every task in `group`, returning how many went.
    pub fn remove_by_group(&self, group: &str) -> Result<usize, TaskgoError> {
        let target = normalize_group(group);
        let mut tasks = self.repo.load()?;
        let before = tasks.len();
        tasks.retain(|t| t.group_name() != target);
        let removed = before - tasks.len();

        self.repo.save(&tasks)?;
        info!(group = target, removed, "group cleared");
        Ok(removed)
    }

    fn modify(
        &self,
        id: u64,
        f: impl FnOnce(&mut Task) -> Result<(), TaskgoError>,
    ) -> Result<Task, TaskgoError> {
        let mut tasks = self.repo.load()?;
        let task = tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(TaskgoError::NotFound(id))?;
        f(task)?;
        let updated = task.clone();
        self.repo.save(&tasks)?;
        Ok(updated)
    }
}

fn non_empty_title(title: &str) -> Result<String, TaskgoError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(TaskgoError::EmptyTitle);
    }
    Ok(title.to_owned())
}

fn deadline(now: OffsetDateTime, d: Duration, raw: &str) -> Result<OffsetDateTime, TaskgoError> {
    time::Duration::try_from(d)
        .ok()
        .and_then(|d| now.checked_add(d))
        .ok_or_else(|| TaskgoError::InvalidDuration(raw.to_owned()))
}

fn apply_validity(
    task: &mut Task,
    validity: Validity,
    now: OffsetDateTime,
    raw: &str,
) -> Result<(), TaskgoError> {
    task.valid_until = match validity {
        Validity::Clear => None,
        Validity::For(d) => Some(deadline(now, d, raw)?),
    };
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::storage::MemoryTaskStorage;
    use time::macros::datetime;

    const NOW: OffsetDateTime = datetime!(2025-06-01 12:00 UTC);

    fn engine(tasks: Vec<Task>) -> TaskManager<MemoryTaskStorage, FixedClock> {
        TaskManager::with_clock(MemoryTaskStorage::with_tasks(tasks), FixedClock::new(NOW))
    }

    fn stored(id: u64, group: &str, valid_until: Option<OffsetDateTime>) -> Task {
        Task {
            id,
            title: format!("task {id}"),
            group: group.to_owned(),
            status: TaskStatus::Todo,
            created_at: NOW - time::Duration::hours(1),
            completed_at: None,
            valid_until,
        }
    }

    fn ids(tasks: &[Task]) -> Vec<u64> {
        tasks.iter().map(|t| t.id).collect()
    }

    #[test]
    fn add_to_empty_store_defaults_to_general_with_a_day() {
        let m = engine(Vec::new());
        let t = m.add("Buy milk", "", "", &Context::default()).unwrap();
        assert_eq!(t.id, 1);
        assert_eq!(t.group, "General");
        assert_eq!(t.status, TaskStatus::Todo);
        assert_eq!(t.created_at, NOW);
        assert_eq!(t.completed_at, None);
        assert_eq!(t.valid_until, Some(NOW + time::Duration::hours(24)));
        assert_eq!(m.repository().snapshot(), vec![t]);
    }

    #[test]
    fn add_without_policy_still_gives_general_a_day() {
        let m = engine(Vec::new());
        let policy = Context {
            current_group: String::new(),
            group_validity: Default::default(),
        };
        let t = m.add("Water plants", "General", "", &policy).unwrap();
        assert_eq!(t.valid_until, Some(t.created_at + time::Duration::hours(24)));
    }

    #[test]
    fn add_uses_group_policy_and_explicit_override() {
        let m = engine(Vec::new());
        let mut policy = Context::default();
        policy.set_validity("work", "2h");

        let a = m.add("Standup", "work", "", &policy).unwrap();
        assert_eq!(a.valid_until, Some(a.created_at + time::Duration::hours(2)));

        let b = m.add("Review", "work", "45m", &policy).unwrap();
        assert_eq!(b.valid_until, Some(b.created_at + time::Duration::minutes(45)));

        let c = m.add("Read book", "home", "", &policy).unwrap();
        assert_eq!(c.valid_until, None);
    }

    #[test]
    fn add_rejects_bad_input_without_writing() {
        let m = engine(Vec::new());
        assert!(matches!(
            m.add("Call mom", "", "tomorrow", &Context::default()),
            Err(TaskgoError::InvalidDuration(_))
        ));
        assert!(matches!(
            m.add("   ", "", "", &Context::default()),
            Err(TaskgoError::EmptyTitle)
        ));
        assert_eq!(m.repository().save_count(), 0);
    }

    #[test]
    fn ids_continue_from_max_after_removal() {
        let m = engine(vec![stored(1, "", None), stored(2, "", None), stored(3, "", None)]);
        m.remove(2).unwrap();
        assert_eq!(ids(&m.list().unwrap()), vec![1, 3]);
        let t = m.add("Next", "", "", &Context::default()).unwrap();
        assert_eq!(t.id, 4);
    }

    #[test]
    fn remove_unknown_id_is_not_found() {
        let m = engine(vec![stored(1, "", None)]);
        assert!(matches!(m.remove(9), Err(TaskgoError::NotFound(9))));
        assert_eq!(m.repository().save_count(), 0);
    }

    #[test]
    fn list_sweeps_expired_tasks_and_persists() {
        let past = Some(NOW - time::Duration::minutes(1));
        let future = Some(NOW + time::Duration::minutes(1));
        let m = engine(vec![
            stored(1, "", future),
            stored(2, "", past),
            stored(3, "work", None),
        ]);

        assert_eq!(m.repository().load().unwrap().len(), 3);
        let listed = m.list().unwrap();
        assert_eq!(ids(&listed), vec![1, 3]);
        assert_eq!(ids(&m.repository().snapshot()), vec![1, 3]);
        assert_eq!(m.repository().save_count(), 1);
    }

    #[test]
    fn cleanup_is_idempotent_and_skips_needless_writes() {
        let m = engine(vec![
            stored(1, "", Some(NOW - time::Duration::seconds(1))),
            stored(2, "", None),
        ]);
        assert_eq!(m.cleanup_expired().unwrap(), 1);
        let first = m.repository().snapshot();
        assert_eq!(m.cleanup_expired().unwrap(), 0);
        assert_eq!(m.repository().snapshot(), first);
        assert_eq!(m.repository().save_count(), 1);

        let untouched = engine(vec![stored(1, "", None)]);
        untouched.list().unwrap();
        assert_eq!(untouched.repository().save_count(), 0);
    }

    #[test]
    fn now_follows_the_sweep_clock() {
        let m = engine(vec![stored(1, "", Some(NOW + time::Duration::minutes(5)))]);
        assert_eq!(m.now(), NOW);
        m.clock.advance(time::Duration::minutes(6));
        assert_eq!(m.now(), NOW + time::Duration::minutes(6));
        assert!(m.list().unwrap().is_empty());
    }

    #[test]
    fn completed_tasks_still_expire() {
        let m = engine(vec![stored(1, "", Some(NOW + time::Duration::minutes(5)))]);
        m.update(1, TaskStatus::Completed).unwrap();
        m.clock.advance(time::Duration::minutes(10));
        assert!(m.list().unwrap().is_empty());
    }

    #[test]
    fn status_updates_track_completion_time() {
        let m = engine(vec![stored(1, "", None)]);
        let done = m.update(1, TaskStatus::Completed).unwrap();
        assert_eq!(done.completed_at, Some(NOW));

        let back = m.update(1, TaskStatus::Todo).unwrap();
        assert_eq!(back.status, TaskStatus::Todo);
        assert_eq!(back.completed_at, None);

        let wip = m.update(1, TaskStatus::InProgress).unwrap();
        assert_eq!(wip.completed_at, None);
        assert!(matches!(
            m.update(42, TaskStatus::Completed),
            Err(TaskgoError::NotFound(42))
        ));
    }

    #[test]
    fn update_title_replaces_title() {
        let m = engine(vec![stored(1, "", None)]);
        let t = m.update_title(1, "Buy oat milk").unwrap();
        assert_eq!(t.title, "Buy oat milk");
        assert_eq!(m.repository().snapshot()[0].title, "Buy oat milk");
        assert!(matches!(m.update_title(2, "x"), Err(TaskgoError::NotFound(2))));
        assert!(matches!(m.update_title(1, ""), Err(TaskgoError::EmptyTitle)));
    }

    #[test]
    fn update_validity_sets_and_clears() {
        let m = engine(vec![stored(1, "", Some(NOW + time::Duration::minutes(1)))]);

        let t = m.update_validity(1, "3h").unwrap();
        assert_eq!(t.valid_until, Some(NOW + time::Duration::hours(3)));

        let t = m.update_validity(1, "none").unwrap();
        assert_eq!(t.valid_until, None);

        m.clock.advance(time::Duration::days(365));
        assert_eq!(m.cleanup_expired().unwrap(), 0);
        assert_eq!(ids(&m.list().unwrap()), vec![1]);

        let t = m.update_validity(1, "1h").unwrap();
        assert!(t.valid_until.is_some());
        let t = m.update_validity(1, "").unwrap();
        assert_eq!(t.valid_until, None);
    }

    #[test]
    fn update_validity_errors() {
        let m = engine(vec![stored(1, "", None)]);
        assert!(matches!(
            m.update_validity(1, "forever"),
            Err(TaskgoError::InvalidDuration(_))
        ));
        assert!(matches!(
            m.update_validity(5, "1h"),
            Err(TaskgoError::NotFound(5))
        ));
        assert_eq!(m.repository().save_count(), 0);
    }

    #[test]
    fn group_validity_touches_only_that_group() {
        let m = engine(vec![
            stored(1, "", None),
            stored(2, "work", None),
            stored(3, "General", None),
            stored(4, "work", Some(NOW + time::Duration::minutes(5))),
        ]);

        assert_eq!(m.update_group_validity("work", "2h").unwrap(), 2);
        let snap = m.repository().snapshot();
        assert_eq!(snap[0].valid_until, None);
        assert_eq!(snap[1].valid_until, Some(NOW + time::Duration::hours(2)));
        assert_eq!(snap[3].valid_until, Some(NOW + time::Duration::hours(2)));

        assert_eq!(m.update_group_validity("General", "30m").unwrap(), 2);
        let snap = m.repository().snapshot();
        assert_eq!(snap[0].valid_until, Some(NOW + time::Duration::minutes(30)));
        assert_eq!(snap[2].valid_until, Some(NOW + time::Duration::minutes(30)));

        assert_eq!(m.update_group_validity("work", "none").unwrap(), 2);
        assert!(m.repository().snapshot()[1].valid_until.is_none());
    }

    #[test]
    fn group_validity_for_empty_group_is_a_no_op() {
        let m = engine(vec![stored(1, "", None)]);
        let before = m.repository().snapshot();
        assert_eq!(m.update_group_validity("work", "2h").unwrap(), 0);
        assert_eq!(m.repository().snapshot(), before);
        assert_eq!(m.repository().save_count(), 0);
    }

    #[test]
    fn group_validity_rejects_bad_duration_even_without_tasks() {
        let m = engine(Vec::new());
        assert!(matches!(
            m.update_group_validity("work", "eventually"),
            Err(TaskgoError::InvalidDuration(_))
        ));
    }

    #[test]
    fn remove_by_group_treats_empty_as_general() {
        let m = engine(vec![
            stored(1, "", None),
            stored(2, "work", None),
            stored(3, "General", None),
        ]);
        assert_eq!(m.remove_by_group("General").unwrap(), 2);
        assert_eq!(ids(&m.repository().snapshot()), vec![2]);
        assert_eq!(m.remove_by_group("home").unwrap(), 0);
        assert_eq!(ids(&m.repository().snapshot()), vec![2]);
    }

    #[test]
    fn groups_are_listed_in_first_seen_order() {
        let m = engine(vec![
            stored(1, "work", None),
            stored(2, "", None),
            stored(3, "work", None),
            stored(4, "home", None),
            stored(5, "gone", Some(NOW - time::Duration::hours(1))),
        ]);
        assert_eq!(m.groups().unwrap(), vec!["work", "General", "home"]);
    }
}
