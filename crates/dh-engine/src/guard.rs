//! Per-section in-flight guard
//!
//! At most one save or workflow action runs per section at a time. What a
//! second caller experiences depends on [`InFlightPolicy`].

use crate::config::InFlightPolicy;
use crate::error::{EngineError, EngineResult};
use dashmap::DashMap;
use dh_model::SectionKey;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Held for the duration of one section operation
#[derive(Debug)]
pub(crate) struct InFlight {
    _permit: OwnedMutexGuard<()>,
}

/// Section locks, created on first use
#[derive(Debug)]
pub(crate) struct InFlightGuards {
    policy: InFlightPolicy,
    locks: DashMap<SectionKey, Arc<Mutex<()>>>,
}

impl InFlightGuards {
    pub(crate) fn new(policy: InFlightPolicy) -> Self {
        Self {
            policy,
            locks: DashMap::new(),
        }
    }

    /// Claim the section
    ///
    /// # Errors
    /// `EngineError::Busy` under the reject policy when the section is taken
    pub(crate) async fn acquire(&self, key: &SectionKey) -> EngineResult<InFlight> {
        let lock = Arc::clone(self.locks.entry(key.clone()).or_default().value());
        let permit = match self.policy {
            InFlightPolicy::Reject => lock.try_lock_owned().map_err(|_| EngineError::Busy(key.clone()))?,
            InFlightPolicy::Serialize => lock.lock_owned().await,
        };
        Ok(InFlight { _permit: permit })
    }

    /// Whether the section has an operation in flight
    pub(crate) fn is_busy(&self, key: &SectionKey) -> bool {
        self.locks.get(key).is_some_and(|lock| lock.try_lock().is_err())
    }

    /// Any section with an operation in flight
    pub(crate) fn first_busy(&self) -> Option<SectionKey> {
        self.locks
            .iter()
            .find(|entry| entry.value().try_lock().is_err())
            .map(|entry| entry.key().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reject_policy_fails_fast() {
        let guards = InFlightGuards::new(InFlightPolicy::Reject);
        let key = SectionKey::new("collar");

        let held = guards.acquire(&key).await.unwrap();
        assert!(guards.is_busy(&key));
        assert_eq!(guards.first_busy(), Some(key.clone()));
        assert!(matches!(guards.acquire(&key).await, Err(EngineError::Busy(_))));

        drop(held);
        assert!(!guards.is_busy(&key));
        assert!(guards.acquire(&key).await.is_ok());
    }

    #[tokio::test]
    async fn sections_are_independent() {
        let guards = InFlightGuards::new(InFlightPolicy::Reject);
        let _collar = guards.acquire(&SectionKey::new("collar")).await.unwrap();
        assert!(guards.acquire(&SectionKey::new("survey")).await.is_ok());
    }

    #[tokio::test]
    async fn serialize_policy_waits() {
        let guards = Arc::new(InFlightGuards::new(InFlightPolicy::Serialize));
        let key = SectionKey::new("survey");
        let held = guards.acquire(&key).await.unwrap();

        let waiter = {
            let guards = Arc::clone(&guards);
            let key = key.clone();
            tokio::spawn(async move { guards.acquire(&key).await.map(|_| ()) })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        drop(held);
        assert!(waiter.await.unwrap().is_ok());
    }
}
