//! At most one request per (owner, feature) is in flight.
//!
//! `try_begin` hands out a guard; the slot frees when the guard drops, whether
//! the call succeeded, failed or its future was dropped mid-way.

use std::{
  collections::HashSet,
  sync::{Arc, Mutex},
};

use crate::domain::FeatureKind;

type Slot = (String, FeatureKind);

#[derive(Clone, Default)]
pub struct InFlight {
  active: Arc<Mutex<HashSet<Slot>>>,
}

impl InFlight {
  pub fn new() -> Self {
    Self::default()
  }

  /// `None` when the same owner already has a request of this kind running.
  pub fn try_begin(&self, owner: &str, kind: FeatureKind) -> Option<InFlightGuard> {
    let slot = (owner.to_string(), kind);
    let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
    if !active.insert(slot.clone()) {
      return None;
    }
    Some(InFlightGuard { active: Arc::clone(&self.active), slot })
  }

  pub fn is_active(&self, owner: &str, kind: FeatureKind) -> bool {
    let active = self.active.lock().unwrap_or_else(|e| e.into_inner());
    active.contains(&(owner.to_string(), kind))
  }
}

pub struct InFlightGuard {
  active: Arc<Mutex<HashSet<Slot>>>,
  slot: Slot,
}

impl Drop for InFlightGuard {
  fn drop(&mut self) {
    let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
    active.remove(&self.slot);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn second_request_for_same_pair_is_refused() {
    let in_flight = InFlight::new();
    let guard = in_flight.try_begin("alice", FeatureKind::Quiz).unwrap();
    assert!(in_flight.try_begin("alice", FeatureKind::Quiz).is_none());
    assert!(in_flight.is_active("alice", FeatureKind::Quiz));

    drop(guard);
    assert!(!in_flight.is_active("alice", FeatureKind::Quiz));
    assert!(in_flight.try_begin("alice", FeatureKind::Quiz).is_some());
  }

  #[test]
  fn other_features_and_owners_overlap() {
    let in_flight = InFlight::new();
    let _a = in_flight.try_begin("alice", FeatureKind::Quiz).unwrap();
    assert!(in_flight.try_begin("alice", FeatureKind::Essay).is_some());
    assert!(in_flight.try_begin("bob", FeatureKind::Quiz).is_some());
  }
}
