use crate::error::{DigestError, Result};
use crate::model::{Entity, EntityId, Owner, Rule, RuleId};
use crate::record::Record;
use crate::store::{Backends, Metric};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Snapshot of everything one digest build needs, as fetched
#[derive(Debug, Clone, PartialEq)]
pub struct StateBundle {
    pub owner: Arc<Owner>,
    pub entities: HashMap<EntityId, Entity>,
    pub rules: HashMap<RuleId, Rule>,
    pub event_counts: HashMap<EntityId, u64>,
    pub user_counts: HashMap<EntityId, u64>,
}

impl StateBundle {
    /// Bundle without counters, for callers assembling state by hand
    pub fn new(owner: Arc<Owner>) -> Self {
        Self {
            owner,
            entities: HashMap::new(),
            rules: HashMap::new(),
            event_counts: HashMap::new(),
            user_counts: HashMap::new(),
        }
    }

    pub fn with_entity(mut self, entity: Entity) -> Self {
        self.entities.insert(entity.id, entity);
        self
    }

    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.insert(rule.id, rule);
        self
    }

    pub fn with_counts(mut self, id: impl Into<EntityId>, events: u64, users: u64) -> Self {
        let id = id.into();
        self.event_counts.insert(id, events);
        self.user_counts.insert(id, users);
        self
    }
}

/// Fetch the state referenced by `records`.
///
/// Records are expected newest first, so the counter window runs from the
/// last record's time to the first one's.
pub async fn fetch_state(
    owner: Arc<Owner>,
    records: &[Record],
    backends: &Backends,
) -> Result<StateBundle> {
    let (Some(newest), Some(oldest)) = (records.first(), records.last()) else {
        return Err(DigestError::EmptyBatch);
    };
    let start = oldest.datetime()?;
    let end = newest.datetime()?;

    let entity_ids: HashSet<EntityId> = records
        .iter()
        .map(|record| record.value.event.entity_id)
        .collect();
    let entities = backends.entities.get_many_by_id(&entity_ids).await?;

    let rule_ids: HashSet<RuleId> = records
        .iter()
        .flat_map(|record| record.value.rule_ids.iter().copied())
        .collect();
    let rules = backends.rules.get_many_by_id(&rule_ids).await?;

    // Counters only for the groups that still exist.
    let resolved_ids: HashSet<EntityId> = entities.keys().copied().collect();
    let event_counts = backends
        .counters
        .sum_counts(Metric::EntityEvents, &resolved_ids, start, end)
        .await?;
    let user_counts = backends
        .counters
        .distinct_count_totals(Metric::EntityUsers, &resolved_ids, start, end)
        .await?;

    log::debug!(
        "Fetched state for owner {}: {}/{} entities, {}/{} rules, window {} .. {}",
        owner.id,
        entities.len(),
        entity_ids.len(),
        rules.len(),
        rule_ids.len(),
        start,
        end
    );

    Ok(StateBundle {
        owner,
        entities,
        rules,
        event_counts,
        user_counts,
    })
}
