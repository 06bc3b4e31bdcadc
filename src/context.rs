//! Explicit application context passed to the services that need it.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::model::PlanId;

/// Subscription state of the signed-in account, as known locally.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountState {
    pub subscribed: bool,
    pub active_plan: Option<PlanId>,
}

impl AccountState {
    pub fn activate(&mut self, plan_id: PlanId) {
        self.subscribed = true;
        self.active_plan = Some(plan_id);
    }
}

/// Shared count of unread conversations. Clones observe the same counter.
#[derive(Debug, Clone, Default)]
pub struct UnreadCounter {
    count: Arc<AtomicUsize>,
}

impl UnreadCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    pub fn set(&self, value: usize) {
        self.count.store(value, Ordering::Release);
    }

    pub fn increment(&self) -> usize {
        self.count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Mark `n` conversations read, saturating at zero.
    pub fn mark_read(&self, n: usize) -> usize {
        let previous = self
            .count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(current.saturating_sub(n))
            })
            .unwrap_or_else(|current| current);
        previous.saturating_sub(n)
    }
}

/// Per-session application context, created at sign-in and reset at
/// sign-out.
#[derive(Debug, Clone, Default)]
pub struct AppContext {
    pub account: AccountState,
    pub unread: UnreadCounter,
    pub locale: Option<String>,
}

impl AppContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tear down session state. Outstanding `UnreadCounter` clones keep
    /// their old counter; the context gets a fresh one.
    pub fn reset(&mut self) {
        self.account = AccountState::default();
        self.unread = UnreadCounter::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unread_counter_shared() {
        let counter = UnreadCounter::new();
        let badge = counter.clone();

        counter.increment();
        counter.increment();
        assert_eq!(badge.get(), 2);

        assert_eq!(badge.mark_read(5), 0);
        assert_eq!(counter.get(), 0);

        counter.set(3);
        assert_eq!(counter.mark_read(1), 2);
    }

    #[test]
    fn test_reset_detaches_counter() {
        let mut ctx = AppContext::new();
        ctx.locale = Some("tr".to_string());
        let old = ctx.unread.clone();
        old.set(4);
        ctx.account.activate(9);

        ctx.reset();
        assert_eq!(ctx.unread.get(), 0);
        assert_eq!(old.get(), 4);
        assert!(!ctx.account.subscribed);
        assert_eq!(ctx.locale.as_deref(), Some("tr"));
    }
}
