//! View load state.
//!
//! A screen mounts a [`ViewScope`] and holds one [`ViewSlot`] per resource it
//! displays. Each fetch takes a [`Ticket`] when it is issued; only the most
//! recently issued ticket may settle the slot, and nothing settles once the
//! scope is unmounted. Late or out-of-order replies are dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::ApiError;

#[derive(Debug, Clone, PartialEq)]
pub enum LoadState<T> {
    Idle,
    Loading,
    Loaded(T),
    Failed(ApiError),
}

impl<T> LoadState<T> {
    pub fn is_loading(&self) -> bool {
        matches!(self, LoadState::Loading)
    }

    pub fn loaded(&self) -> Option<&T> {
        match self {
            LoadState::Loaded(value) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&ApiError> {
        match self {
            LoadState::Failed(err) => Some(err),
            _ => None,
        }
    }
}

impl<T> Default for LoadState<T> {
    fn default() -> Self {
        LoadState::Idle
    }
}

/// Liveness of one mounted screen.
#[derive(Debug, Clone)]
pub struct ViewScope {
    name: Arc<str>,
    alive: Arc<AtomicBool>,
}

impl ViewScope {
    pub fn mount(name: &str) -> Self {
        debug!("Mounting view '{}'", name);
        Self {
            name: Arc::from(name),
            alive: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_mounted(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    pub fn unmount(&self) {
        if self.alive.swap(false, Ordering::SeqCst) {
            debug!("Unmounted view '{}'", self.name);
        }
    }

    pub fn slot<T>(&self, resource: &str) -> ViewSlot<T> {
        ViewSlot {
            resource: Arc::from(resource),
            scope: self.clone(),
            inner: Arc::new(Mutex::new(SlotInner {
                state: LoadState::Idle,
                issued: 0,
            })),
        }
    }
}

/// Proof of issuance for one fetch into a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct Ticket {
    generation: u64,
}

struct SlotInner<T> {
    state: LoadState<T>,
    issued: u64,
}

pub struct ViewSlot<T> {
    resource: Arc<str>,
    scope: ViewScope,
    inner: Arc<Mutex<SlotInner<T>>>,
}

impl<T> Clone for ViewSlot<T> {
    fn clone(&self) -> Self {
        Self {
            resource: self.resource.clone(),
            scope: self.scope.clone(),
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone> ViewSlot<T> {
    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn state(&self) -> LoadState<T> {
        self.inner.lock().state.clone()
    }

    /// Issue a new fetch. Any fetch issued earlier is superseded.
    pub fn begin(&self) -> Ticket {
        let mut inner = self.inner.lock();
        inner.issued += 1;
        if self.scope.is_mounted() {
            inner.state = LoadState::Loading;
        }
        Ticket {
            generation: inner.issued,
        }
    }

    /// Apply a fetch outcome. Returns `false` when the outcome was discarded.
    pub fn settle(&self, ticket: Ticket, outcome: Result<T, ApiError>) -> bool {
        if !self.scope.is_mounted() {
            debug!(
                "Dropping reply for '{}' on unmounted view '{}'",
                self.resource,
                self.scope.name()
            );
            return false;
        }

        let mut inner = self.inner.lock();
        if ticket.generation != inner.issued {
            debug!(
                "Dropping superseded reply #{} for '{}' (latest #{})",
                ticket.generation, self.resource, inner.issued
            );
            return false;
        }

        inner.state = match outcome {
            Ok(value) => LoadState::Loaded(value),
            Err(err) => LoadState::Failed(err),
        };
        true
    }

    /// Show a value without a fetch (e.g. an item picked from a list).
    pub fn show(&self, value: T) {
        let ticket = self.begin();
        self.settle(ticket, Ok(value));
    }

    /// Back to `Idle`, discarding anything in flight.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.issued += 1;
        if self.scope.is_mounted() {
            inner.state = LoadState::Idle;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot() -> (ViewScope, ViewSlot<&'static str>) {
        let scope = ViewScope::mount("test");
        let slot = scope.slot("feed-list");
        (scope, slot)
    }

    #[test]
    fn test_idle_loading_loaded() {
        let (_scope, slot) = slot();
        assert_eq!(slot.state(), LoadState::Idle);

        let ticket = slot.begin();
        assert!(slot.state().is_loading());

        assert!(slot.settle(ticket, Ok("feeds")));
        assert_eq!(slot.state().loaded(), Some(&"feeds"));
    }

    #[test]
    fn test_failure_reaches_state() {
        let (_scope, slot) = slot();
        let ticket = slot.begin();
        slot.settle(ticket, Err(ApiError::Unreachable("timeout".into())));
        assert_eq!(
            slot.state().error(),
            Some(&ApiError::Unreachable("timeout".into()))
        );
    }

    #[test]
    fn test_later_issue_wins_regardless_of_arrival() {
        let (_scope, slot) = slot();
        let a = slot.begin();
        let b = slot.begin();

        assert!(slot.settle(b, Ok("B")));
        assert!(!slot.settle(a, Ok("A")));
        assert_eq!(slot.state(), LoadState::Loaded("B"));
    }

    #[test]
    fn test_stale_reply_does_not_end_loading() {
        let (_scope, slot) = slot();
        let a = slot.begin();
        let _b = slot.begin();

        assert!(!slot.settle(a, Ok("A")));
        assert!(slot.state().is_loading());
    }

    #[test]
    fn test_unmounted_view_is_not_mutated() {
        let (scope, slot) = slot();
        let ticket = slot.begin();
        scope.unmount();

        assert!(!slot.settle(ticket, Ok("late")));
        assert!(slot.state().is_loading());
        assert!(!scope.is_mounted());
    }

    #[test]
    fn test_slots_share_scope_liveness() {
        let scope = ViewScope::mount("dashboard");
        let profile: ViewSlot<u32> = scope.slot("profile");
        let articles: ViewSlot<u32> = scope.slot("articles");
        let (p, a) = (profile.begin(), articles.begin());

        scope.unmount();
        assert!(!profile.settle(p, Ok(1)));
        assert!(!articles.settle(a, Ok(2)));
    }

    #[test]
    fn test_show_and_reset() {
        let (_scope, slot) = slot();
        slot.show("picked");
        assert_eq!(slot.state(), LoadState::Loaded("picked"));

        let ticket = slot.begin();
        slot.reset();
        assert_eq!(slot.state(), LoadState::Idle);
        assert!(!slot.settle(ticket, Ok("late")));
    }

    #[test]
    fn test_clones_share_state() {
        let (_scope, slot) = slot();
        let other = slot.clone();
        other.show("shared");
        assert_eq!(slot.state().loaded(), Some(&"shared"));
        assert_eq!(other.resource(), "feed-list");
    }
}
