#![forbid(unsafe_code)]

use std::time::Duration;

use tracing::warn;

use crate::config::context::Context;
use crate::error::TaskgoError;
use crate::task::duration::Validity;
use crate::task::model::{DEFAULT_GROUP, normalize_group};

/// Expiry applied to General tasks when the policy has no entry for it.
pub const GENERAL_FALLBACK: Duration = Duration::from_secs(24 * 60 * 60);

/// Picks the expiry for a new task in `group`.
///
/// An explicit validity wins (`none` meaning "never expires"), then the
/// group's policy entry, then the General fallback. `None` means no expiry.
pub fn resolve_validity(
    explicit: &str,
    group: &str,
    policy: &Context,
) -> Result<Option<Duration>, TaskgoError> {
    let group = normalize_group(group);

    let chosen = if explicit.trim().is_empty() {
        match policy.validity_for(group) {
            Some(raw) => match Validity::parse(raw) {
                Ok(Validity::For(d)) => Some(d),
                Ok(Validity::Clear) => None,
                Err(err) => {
                    warn!(group, validity = raw, %err, "ignoring unparseable group validity");
                    None
                }
            },
            None if group == DEFAULT_GROUP => Some(GENERAL_FALLBACK),
            None => None,
        }
    } else {
        match Validity::parse(explicit)? {
            Validity::For(d) => Some(d),
            Validity::Clear => None,
        }
    };

    Ok(chosen.filter(|d| !d.is_zero()))
}

/// Checks a validity typed on the command line: a duration or `none`.
pub fn validate_validity(input: &str) -> Result<Validity, TaskgoError> {
    if input.trim().is_empty() {
        return Err(TaskgoError::InvalidDuration(input.to_owned()));
    }
    Validity::parse(input)
}
