// SPDX-License-Identifier: MIT

//! Sentinel error kinds shared across crate boundaries (spec.md §6.6, §7).
//!
//! Sentinels cross component boundaries unwrapped-for-match, wrapped-for-context:
//! every higher-level error enum carries a `#[source]` back to one of these,
//! and [`Sentinel::find_in`] walks the `std::error::Error` source chain so
//! callers can match on the underlying kind regardless of how many layers of
//! `thiserror` wrapping sit on top.

use std::error::Error as StdError;
use std::fmt;

/// Identifiable error categories a UI renders as human-readable summaries
/// (spec.md §6.6: BUDGET EXCEEDED, MAX ITERATIONS REACHED, TIMEOUT, INTERRUPTED).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sentinel {
    BudgetExceeded,
    MaxIterationsReached,
    MaxGateRetriesExceeded,
    NotGitRepository,
    DetachedHead,
    Cancelled,
    DeadlineExceeded,
}

impl Sentinel {
    /// Human-readable summary per spec.md §6.6.
    pub fn summary(&self) -> &'static str {
        match self {
            Sentinel::BudgetExceeded => "BUDGET EXCEEDED",
            Sentinel::MaxIterationsReached => "MAX ITERATIONS REACHED",
            Sentinel::MaxGateRetriesExceeded => "MAX GATE RETRIES EXCEEDED",
            Sentinel::NotGitRepository => "NOT A GIT REPOSITORY",
            Sentinel::DetachedHead => "DETACHED HEAD",
            Sentinel::Cancelled => "INTERRUPTED",
            Sentinel::DeadlineExceeded => "TIMEOUT",
        }
    }

    /// Walk an error's source chain looking for a matching sentinel,
    /// so wrapping layers never hide the underlying category from callers.
    pub fn find_in(err: &(dyn StdError + 'static)) -> Option<Sentinel> {
        let mut cur: Option<&(dyn StdError + 'static)> = Some(err);
        while let Some(e) = cur {
            if let Some(carrier) = (e as &dyn std::any::Any).downcast_ref::<OrbitalError>() {
                return Some(carrier.sentinel);
            }
            cur = e.source();
        }
        None
    }
}

impl fmt::Display for Sentinel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary())
    }
}

/// A sentinel error carrying context. Produced at the point a policy limit
/// or terminal condition fires; wrapped by higher-level error enums via
/// `#[from]` / `#[source]` without losing the sentinel identity.
#[derive(Debug)]
pub struct OrbitalError {
    pub sentinel: Sentinel,
    pub context: String,
}

impl OrbitalError {
    pub fn new(sentinel: Sentinel, context: impl Into<String>) -> Self {
        Self {
            sentinel,
            context: context.into(),
        }
    }

    pub fn is(&self, s: Sentinel) -> bool {
        self.sentinel == s
    }
}

impl fmt::Display for OrbitalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.sentinel, self.context)
    }
}

impl StdError for OrbitalError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("wrapped: {0}")]
    struct Wrapper(#[from] OrbitalError);

    #[test]
    fn find_in_sees_through_one_layer_of_wrapping() {
        let inner = OrbitalError::new(Sentinel::BudgetExceeded, "3 iterations * 4.0 >= 10.0");
        let wrapped: Wrapper = inner.into();
        let found = Sentinel::find_in(&wrapped);
        assert_eq!(found, Some(Sentinel::BudgetExceeded));
    }

    #[test]
    fn summary_text_matches_spec() {
        assert_eq!(Sentinel::BudgetExceeded.summary(), "BUDGET EXCEEDED");
        assert_eq!(
            Sentinel::MaxIterationsReached.summary(),
            "MAX ITERATIONS REACHED"
        );
        assert_eq!(Sentinel::Cancelled.summary(), "INTERRUPTED");
        assert_eq!(Sentinel::DeadlineExceeded.summary(), "TIMEOUT");
    }
}
