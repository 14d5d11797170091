use crate::error::{DigestError, Result};
use crate::key::OWNER_TYPE_TAG;
use crate::model::{Entity, EntityId, Owner, OwnerId, Rule, RuleId};
use crate::store::{CounterService, EntityStore, Metric, OwnerStore, RuleStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Single observed event, the raw material for counters
#[derive(Debug, Clone, PartialEq)]
struct Occurrence {
    entity_id: EntityId,
    at: DateTime<Utc>,
    user: Option<String>,
}

/// Map-backed implementation of every collaborator contract.
///
/// Counters are computed from recorded occurrences, so the window passed
/// by the state fetcher is honoured.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    owners: HashMap<OwnerId, Arc<Owner>>,
    entities: HashMap<EntityId, Entity>,
    rules: HashMap<RuleId, Rule>,
    occurrences: Vec<Occurrence>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_owner(&mut self, owner: Owner) -> Arc<Owner> {
        let owner = Arc::new(owner);
        self.owners.insert(owner.id, Arc::clone(&owner));
        owner
    }

    pub fn insert_entity(&mut self, entity: Entity) {
        self.entities.insert(entity.id, entity);
    }

    pub fn insert_rule(&mut self, rule: Rule) {
        self.rules.insert(rule.id, rule);
    }

    /// Count one event for `entity_id`, optionally attributed to a user
    pub fn record_occurrence(
        &mut self,
        entity_id: impl Into<EntityId>,
        at: DateTime<Utc>,
        user: Option<&str>,
    ) {
        self.occurrences.push(Occurrence {
            entity_id: entity_id.into(),
            at,
            user: user.map(str::to_string),
        });
    }

    pub fn owner(&self, id: OwnerId) -> Option<Arc<Owner>> {
        self.owners.get(&id).cloned()
    }

    fn in_window<'a>(
        &'a self,
        ids: &'a HashSet<EntityId>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> impl Iterator<Item = &'a Occurrence> + 'a {
        self.occurrences
            .iter()
            .filter(move |o| ids.contains(&o.entity_id) && o.at >= start && o.at <= end)
    }
}

#[async_trait]
impl OwnerStore for InMemoryBackend {
    async fn get_by_id(&self, type_tag: &str, id: OwnerId) -> Result<Arc<Owner>> {
        if type_tag != OWNER_TYPE_TAG {
            return Err(DigestError::NotFound(format!(
                "owner type '{type_tag}' (id {id})"
            )));
        }
        self.owner(id)
            .ok_or_else(|| DigestError::NotFound(format!("owner {id}")))
    }
}

#[async_trait]
impl EntityStore for InMemoryBackend {
    async fn get_many_by_id(&self, ids: &HashSet<EntityId>) -> Result<HashMap<EntityId, Entity>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.entities.get(id).map(|entity| (*id, entity.clone())))
            .collect())
    }
}

#[async_trait]
impl RuleStore for InMemoryBackend {
    async fn get_many_by_id(&self, ids: &HashSet<RuleId>) -> Result<HashMap<RuleId, Rule>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.rules.get(id).map(|rule| (*id, rule.clone())))
            .collect())
    }
}

#[async_trait]
impl CounterService for InMemoryBackend {
    async fn sum_counts(
        &self,
        metric: Metric,
        ids: &HashSet<EntityId>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<HashMap<EntityId, u64>> {
        if metric != Metric::EntityEvents {
            return Err(DigestError::Backend(format!(
                "metric {metric} does not support sums"
            )));
        }
        let mut counts: HashMap<EntityId, u64> = ids.iter().map(|id| (*id, 0)).collect();
        for occurrence in self.in_window(ids, start, end) {
            *counts.entry(occurrence.entity_id).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn distinct_count_totals(
        &self,
        metric: Metric,
        ids: &HashSet<EntityId>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<HashMap<EntityId, u64>> {
        if metric != Metric::EntityUsers {
            return Err(DigestError::Backend(format!(
                "metric {metric} does not support distinct counts"
            )));
        }
        let mut users: HashMap<EntityId, HashSet<&str>> =
            ids.iter().map(|id| (*id, HashSet::new())).collect();
        for occurrence in self.in_window(ids, start, end) {
            if let Some(user) = occurrence.user.as_deref() {
                users.entry(occurrence.entity_id).or_default().insert(user);
            }
        }
        Ok(users
            .into_iter()
            .map(|(id, distinct)| (id, distinct.len() as u64))
            .collect())
    }
}
