//! In-memory mirror of the persisted policy set
//!
//! Reads take the shared lock. Every mutation holds the exclusive lock from
//! the first adapter write until the mirror has been reloaded, so a check
//! sees either the whole old set or the whole new one.

use std::collections::HashSet;
use std::sync::Arc;

use common::error::DatabaseResult;
use tokio::sync::{RwLock, RwLockWriteGuard};
use tracing::{debug, info};

use crate::models::Policy;
use crate::models::policy::{canonical_action, canonical_object};
use crate::repositories::PolicyAdapter;

pub struct PolicyStore {
    adapter: Arc<dyn PolicyAdapter>,
    policies: RwLock<HashSet<Policy>>,
}

impl PolicyStore {
    /// Empty mirror; call [`PolicyStore::load`] before serving
    pub fn new(adapter: Arc<dyn PolicyAdapter>) -> Self {
        Self {
            adapter,
            policies: RwLock::new(HashSet::new()),
        }
    }

    /// Replace the mirror with the persisted set
    pub async fn load(&self) -> DatabaseResult<()> {
        let mut guard = self.policies.write().await;
        self.reload(&mut guard).await
    }

    async fn reload(&self, guard: &mut RwLockWriteGuard<'_, HashSet<Policy>>) -> DatabaseResult<()> {
        let loaded: HashSet<Policy> = self
            .adapter
            .load()
            .await?
            .into_iter()
            .map(Policy::canonical)
            .collect();
        debug!("Loaded {} policies", loaded.len());
        **guard = loaded;
        Ok(())
    }

    pub async fn add(&self, policies: Vec<Policy>) -> DatabaseResult<()> {
        let policies = canonical(policies);
        let mut guard = self.policies.write().await;
        self.adapter.add(&policies).await?;
        self.reload(&mut guard).await
    }

    pub async fn remove(&self, policies: Vec<Policy>) -> DatabaseResult<()> {
        let policies = canonical(policies);
        let mut guard = self.policies.write().await;
        self.adapter.remove(&policies).await?;
        self.reload(&mut guard).await
    }

    /// Add `added`, then remove `removed`, then reload, all under one lock
    async fn swap(
        &self,
        guard: &mut RwLockWriteGuard<'_, HashSet<Policy>>,
        added: Vec<Policy>,
        removed: Vec<Policy>,
    ) -> DatabaseResult<()> {
        let removed: Vec<Policy> = removed
            .into_iter()
            .filter(|policy| !added.contains(policy))
            .collect();
        self.adapter.add(&added).await?;
        self.adapter.remove(&removed).await?;
        self.reload(guard).await
    }

    /// All triples whose subject is `subject`, sorted
    pub async fn filtered_by_subject(&self, subject: &str) -> Vec<Policy> {
        let guard = self.policies.read().await;
        let mut policies: Vec<Policy> = guard
            .iter()
            .filter(|policy| policy.subject == subject)
            .cloned()
            .collect();
        policies.sort();
        policies
    }

    /// Grant `new` every triple `old` holds, keeping `old` intact
    ///
    /// First half of a role keyword rename; [`PolicyStore::remove_subject`]
    /// on the old keyword completes it.
    ///
    /// Returns the triples that did not exist before, which is exactly what
    /// [`PolicyStore::remove`] must take to undo the copy.
    pub async fn copy_subject(&self, old: &str, new: &str) -> DatabaseResult<Vec<Policy>> {
        if old == new {
            return Ok(Vec::new());
        }
        let mut guard = self.policies.write().await;
        let added: Vec<Policy> = guard
            .iter()
            .filter(|policy| policy.subject == old)
            .map(|policy| policy.with_subject(new))
            .filter(|policy| !guard.contains(policy))
            .collect();
        if added.is_empty() {
            return Ok(added);
        }
        info!("Copying {} policies from {} to {}", added.len(), old, new);
        self.adapter.add(&added).await?;
        self.reload(&mut guard).await?;
        Ok(added)
    }

    /// Make `subject` hold exactly `policies`
    pub async fn replace_subject(&self, subject: &str, policies: Vec<Policy>) -> DatabaseResult<()> {
        let wanted = canonical(policies);
        let mut guard = self.policies.write().await;
        let stale: Vec<Policy> = guard
            .iter()
            .filter(|policy| policy.subject == subject && !wanted.contains(policy))
            .cloned()
            .collect();
        self.swap(&mut guard, wanted, stale).await
    }

    pub async fn remove_subject(&self, subject: &str) -> DatabaseResult<()> {
        let mut guard = self.policies.write().await;
        let owned: Vec<Policy> = guard
            .iter()
            .filter(|policy| policy.subject == subject)
            .cloned()
            .collect();
        self.adapter.remove(&owned).await?;
        self.reload(&mut guard).await
    }

    /// Re-point every triple on `(old_object, old_action)` at the new route
    pub async fn rename_object(
        &self,
        old_object: &str,
        old_action: &str,
        new_object: &str,
        new_action: &str,
    ) -> DatabaseResult<()> {
        let (old_object, old_action) = (canonical_object(old_object), canonical_action(old_action));
        let mut guard = self.policies.write().await;
        let previous: Vec<Policy> = guard
            .iter()
            .filter(|p| p.object == old_object && p.action == old_action)
            .cloned()
            .collect();
        let moved: Vec<Policy> = previous
            .iter()
            .map(|p| Policy::new(p.subject.clone(), new_object, new_action))
            .collect();
        self.swap(&mut guard, moved, previous).await
    }

    pub async fn remove_object(&self, object: &str, action: &str) -> DatabaseResult<()> {
        let (object, action) = (canonical_object(object), canonical_action(action));
        let mut guard = self.policies.write().await;
        let matching: Vec<Policy> = guard
            .iter()
            .filter(|p| p.object == object && p.action == action)
            .cloned()
            .collect();
        self.adapter.remove(&matching).await?;
        self.reload(&mut guard).await
    }

    /// Whether any subject holds `(object, action)`; inputs are canonicalized
    pub async fn allows(&self, subjects: &[String], object: &str, action: &str) -> bool {
        let (object, action) = (canonical_object(object), canonical_action(action));
        let guard = self.policies.read().await;
        subjects.iter().any(|subject| {
            guard.contains(&Policy {
                subject: subject.clone(),
                object: object.clone(),
                action: action.clone(),
            })
        })
    }

    pub async fn len(&self) -> usize {
        self.policies.read().await.len()
    }
}

fn canonical(policies: Vec<Policy>) -> Vec<Policy> {
    let mut seen = HashSet::new();
    policies
        .into_iter()
        .map(Policy::canonical)
        .filter(|policy| seen.insert(policy.clone()))
        .collect()
}
