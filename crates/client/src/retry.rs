//! Refresh-and-retry budget.

use smallvec::{SmallVec, smallvec};

/// HTTP status that triggers a credential refresh by default.
pub const UNAUTHORIZED: u16 = 401;

/// How many credential refreshes a single call may spend, and which
/// response statuses spend one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Refreshes one call may spend.
    pub max_refreshes: u8,
    /// Statuses that spend a refresh.
    pub refresh_statuses: SmallVec<[u16; 2]>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_refreshes: 1,
            refresh_statuses: smallvec![UNAUTHORIZED],
        }
    }
}

impl RetryPolicy {
    /// Whether a response with `status` should spend a refresh.
    #[must_use]
    pub fn triggers_refresh(&self, status: u16) -> bool {
        self.refresh_statuses.contains(&status)
    }

    /// Start tracking one call under this policy.
    #[must_use]
    pub fn budget(&self, allow_refresh: bool) -> RetryBudget {
        RetryBudget {
            remaining: if allow_refresh { self.max_refreshes } else { 0 },
        }
    }
}

/// Remaining refreshes for one in-flight call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    remaining: u8,
}

impl RetryBudget {
    /// Spend one refresh. Returns `false` once the budget is exhausted.
    pub fn consume(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }

        self.remaining -= 1;

        true
    }

    /// Refreshes still available.
    #[must_use]
    pub const fn remaining(self) -> u8 {
        self.remaining
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_refreshes_once_on_401() {
        let policy = RetryPolicy::default();
        let mut budget = policy.budget(true);

        assert!(policy.triggers_refresh(401));
        assert!(!policy.triggers_refresh(403));
        assert!(budget.consume(), "first refresh should be allowed");
        assert!(!budget.consume(), "second refresh must be refused");
    }

    #[test]
    fn disallowed_refresh_starts_empty() {
        let mut budget = RetryPolicy::default().budget(false);

        assert_eq!(budget.remaining(), 0);
        assert!(!budget.consume());
    }

    #[test]
    fn zero_refresh_policy_has_no_budget() {
        let policy = RetryPolicy {
            max_refreshes: 0,
            ..RetryPolicy::default()
        };

        assert_eq!(policy.budget(true).remaining(), 0);
    }
}
