//! Collaborator contracts consumed while building a digest.
//!
//! All lookups are read-only bulk operations. Implementations decide their
//! own I/O, caching and locking; the builder only awaits them in sequence.

use crate::error::Result;
use crate::model::{Entity, EntityId, Owner, OwnerId, Rule, RuleId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Time-series metric queried from the counter service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    /// Events seen per issue group
    EntityEvents,

    /// Distinct users affected per issue group
    EntityUsers,
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::EntityEvents => f.write_str("entity_events"),
            Metric::EntityUsers => f.write_str("entity_users"),
        }
    }
}

/// Owner lookup by type tag and id. Fails with `DigestError::NotFound`.
#[async_trait]
pub trait OwnerStore: Send + Sync {
    async fn get_by_id(&self, type_tag: &str, id: OwnerId) -> Result<Arc<Owner>>;
}

/// Bulk issue-group lookup. Unknown ids are simply absent from the result.
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn get_many_by_id(&self, ids: &HashSet<EntityId>) -> Result<HashMap<EntityId, Entity>>;
}

/// Bulk rule lookup. Unknown ids are simply absent from the result.
#[async_trait]
pub trait RuleStore: Send + Sync {
    async fn get_many_by_id(&self, ids: &HashSet<RuleId>) -> Result<HashMap<RuleId, Rule>>;
}

/// Per-entity counters over an inclusive time window
#[async_trait]
pub trait CounterService: Send + Sync {
    async fn sum_counts(
        &self,
        metric: Metric,
        ids: &HashSet<EntityId>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<HashMap<EntityId, u64>>;

    async fn distinct_count_totals(
        &self,
        metric: Metric,
        ids: &HashSet<EntityId>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<HashMap<EntityId, u64>>;
}

/// Services the state fetcher reads from
#[derive(Clone)]
pub struct Backends {
    pub entities: Arc<dyn EntityStore>,
    pub rules: Arc<dyn RuleStore>,
    pub counters: Arc<dyn CounterService>,
}

impl Backends {
    pub fn new(
        entities: Arc<dyn EntityStore>,
        rules: Arc<dyn RuleStore>,
        counters: Arc<dyn CounterService>,
    ) -> Self {
        Self {
            entities,
            rules,
            counters,
        }
    }

    /// Use one service for every lookup
    pub fn shared<B>(backend: Arc<B>) -> Self
    where
        B: EntityStore + RuleStore + CounterService + 'static,
    {
        Self {
            entities: backend.clone(),
            rules: backend.clone(),
            counters: backend,
        }
    }
}

impl fmt::Debug for Backends {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backends").finish_non_exhaustive()
    }
}
