//! Copy-on-write collection of immortals.
//!
//! Readers take an `Arc` snapshot of the current vector and iterate it without
//! holding any lock; writers build a new vector and publish it. A snapshot is
//! never affected by later removals, so iteration cannot observe a partially
//! applied change.

use crate::immortal::Immortal;
use std::sync::{Arc, PoisonError, RwLock};

/// Immutable view of the population at one instant.
pub type Snapshot = Arc<Vec<Arc<Immortal>>>;

#[derive(Debug, Default)]
pub struct Population {
    members: RwLock<Snapshot>,
}

impl Population {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a population from an initial roster.
    pub fn from_members(members: Vec<Arc<Immortal>>) -> Self {
        Self {
            members: RwLock::new(Arc::new(members)),
        }
    }

    pub fn add(&self, immortal: Arc<Immortal>) {
        let mut members = self.members.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = Vec::with_capacity(members.len() + 1);
        next.extend(members.iter().cloned());
        next.push(immortal);
        *members = Arc::new(next);
    }

    /// Remove every member matching `predicate` and return them.
    ///
    /// The predicate runs under the write lock, so it must not block.
    pub fn remove_where<F>(&self, mut predicate: F) -> Vec<Arc<Immortal>>
    where
        F: FnMut(&Arc<Immortal>) -> bool,
    {
        let mut members = self.members.write().unwrap_or_else(PoisonError::into_inner);
        let (removed, kept): (Vec<_>, Vec<_>) =
            members.iter().cloned().partition(|member| predicate(member));
        if !removed.is_empty() {
            *members = Arc::new(kept);
        }
        removed
    }

    /// Evict every member that is no longer alive and return the evicted.
    ///
    /// Liveness is evaluated on a snapshot, outside the write lock; a member
    /// never comes back to life, so removing it afterwards is sound.
    pub async fn reap_dead(&self) -> Vec<Arc<Immortal>> {
        let snapshot = self.snapshot();
        let mut dead = Vec::new();
        for member in snapshot.iter() {
            if !member.is_alive().await {
                dead.push(Arc::clone(member));
            }
        }
        if dead.is_empty() {
            return dead;
        }
        self.remove_where(|member| dead.iter().any(|d| Arc::ptr_eq(d, member)))
    }

    /// Stable view of the current members.
    pub fn snapshot(&self) -> Snapshot {
        Arc::clone(&*self.members.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, immortal: &Arc<Immortal>) -> bool {
        self.snapshot()
            .iter()
            .any(|member| Arc::ptr_eq(member, immortal))
    }
}
