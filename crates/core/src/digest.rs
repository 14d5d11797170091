use crate::attach::{attach_state, AttachedState};
use crate::error::{DigestError, Result};
use crate::model::{Entity, EntityId, Owner, Rule, RuleId};
use crate::record::{DigestRecord, Record, ResolvedNotification};
use crate::state::{fetch_state, StateBundle};
use crate::store::Backends;
use digest_pipeline::{Cardinality, Pipeline};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Records of one issue group under one rule
#[derive(Debug, Clone, PartialEq)]
pub struct EntityGroup {
    pub entity: Arc<Entity>,
    pub records: Vec<DigestRecord>,
}

/// Issue groups matched by one rule, highest activity first once sorted
#[derive(Debug, Clone, PartialEq)]
pub struct RuleGroup {
    pub rule: Arc<Rule>,
    entities: Vec<EntityGroup>,
    slots: HashMap<EntityId, usize>,
}

impl RuleGroup {
    fn new(rule: Arc<Rule>) -> Self {
        Self {
            rule,
            entities: Vec::new(),
            slots: HashMap::new(),
        }
    }

    pub fn entities(&self) -> &[EntityGroup] {
        &self.entities
    }

    pub fn get(&self, id: EntityId) -> Option<&EntityGroup> {
        self.slots.get(&id).map(|&slot| &self.entities[slot])
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    fn push(&mut self, entity: &Arc<Entity>, record: DigestRecord) {
        let slot = match self.slots.get(&entity.id) {
            Some(&slot) => slot,
            None => {
                self.entities.push(EntityGroup {
                    entity: Arc::clone(entity),
                    records: Vec::new(),
                });
                self.slots.insert(entity.id, self.entities.len() - 1);
                self.entities.len() - 1
            }
        };
        self.entities[slot].records.push(record);
    }

    fn sort_entities(&mut self) {
        self.entities
            .sort_by(|a, b| b.entity.sort_key().cmp(&a.entity.sort_key()));
        self.slots = index_by(&self.entities, |group| group.entity.id);
    }
}

/// Records grouped by rule, then by issue group, in delivery order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Digest {
    rules: Vec<RuleGroup>,
    slots: HashMap<RuleId, usize>,
}

impl Digest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rules(&self) -> &[RuleGroup] {
        &self.rules
    }

    pub fn get(&self, id: RuleId) -> Option<&RuleGroup> {
        self.slots.get(&id).map(|&slot| &self.rules[slot])
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Number of (rule, record) placements
    pub fn placement_count(&self) -> usize {
        self.rules
            .iter()
            .flat_map(|rule| rule.entities.iter())
            .map(|group| group.records.len())
            .sum()
    }

    fn push(&mut self, rule: &Arc<Rule>, entity: &Arc<Entity>, record: DigestRecord) {
        let slot = match self.slots.get(&rule.id) {
            Some(&slot) => slot,
            None => {
                self.rules.push(RuleGroup::new(Arc::clone(rule)));
                self.slots.insert(rule.id, self.rules.len() - 1);
                self.rules.len() - 1
            }
        };
        self.rules[slot].push(entity, record);
    }

    fn sort_rules(&mut self) {
        self.rules.sort_by(|a, b| b.len().cmp(&a.len()));
        self.slots = index_by(&self.rules, |group| group.rule.id);
    }

    pub fn summary(&self) -> DigestSummary {
        DigestSummary {
            rules: self
                .rules
                .iter()
                .map(|group| RuleSummary {
                    rule_id: group.rule.id,
                    label: group.rule.label.clone(),
                    entities: group
                        .entities
                        .iter()
                        .map(|entry| EntitySummary {
                            entity_id: entry.entity.id,
                            title: entry.entity.title.clone(),
                            event_count: entry.entity.event_count,
                            user_count: entry.entity.user_count,
                            records: entry.records.iter().map(|r| r.key.clone()).collect(),
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

impl Cardinality for Digest {
    fn cardinality(&self) -> Option<usize> {
        Some(self.len())
    }
}

/// Serializable view of a digest for rendering and previews
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DigestSummary {
    pub rules: Vec<RuleSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleSummary {
    pub rule_id: RuleId,
    pub label: String,
    pub entities: Vec<EntitySummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntitySummary {
    pub entity_id: EntityId,
    pub title: String,
    pub event_count: u64,
    pub user_count: u64,
    pub records: Vec<String>,
}

/// Where the builder gets its state from
#[derive(Debug)]
pub enum StateSource<'a> {
    /// Fetch through the collaborator services
    Fetch(&'a Backends),

    /// Use state assembled by the caller; no I/O (mock and preview digests)
    Prefetched(StateBundle),
}

/// Build the digest for `records` (newest first).
///
/// Returns `Ok(None)` for an empty batch. A non-empty batch always yields a
/// digest, possibly with no groups left after filtering.
pub async fn build_digest<I>(
    owner: Arc<Owner>,
    records: I,
    source: StateSource<'_>,
) -> Result<Option<Digest>>
where
    I: IntoIterator<Item = Record>,
{
    let records: Vec<Record> = records.into_iter().collect();
    if records.is_empty() {
        return Ok(None);
    }

    let state = match source {
        StateSource::Fetch(backends) => fetch_state(Arc::clone(&owner), &records, backends).await?,
        StateSource::Prefetched(state) => {
            if state.owner.id != owner.id {
                return Err(DigestError::OwnershipViolation {
                    kind: "State",
                    id: state.owner.id.0,
                    expected: owner.id.0,
                    actual: state.owner.id.0,
                });
            }
            state
        }
    };

    let attached = Arc::new(attach_state(state)?);
    let input = records.len();
    let digest = digest_pipeline(attached).run(records);

    log::debug!(
        "Built digest for owner {}: {} records into {} rules",
        owner.id,
        input,
        digest.len()
    );

    Ok(Some(digest))
}

/// Stage chain turning raw records into a sorted digest
pub fn digest_pipeline(state: Arc<AttachedState>) -> Pipeline<Vec<Record>, Digest> {
    Pipeline::new()
        .map("rewrite_record", move |record: Record| {
            rewrite_record(record, &state)
        })
        .filter_some("drop_unresolvable")
        .filter("unresolved_only", |record: &DigestRecord| {
            record.value.entity.status.is_unresolved()
        })
        .reduce("group_records", group_records, |_: &[DigestRecord]| {
            Digest::new()
        })
        .apply("sort_group_contents", sort_group_contents)
        .apply("sort_rule_groups", sort_rule_groups)
}

/// Re-attach the issue group and resolve rule ids against `state`.
///
/// `None` when the group no longer exists. Rule ids that no longer resolve
/// are dropped silently.
pub fn rewrite_record(record: Record, state: &AttachedState) -> Option<DigestRecord> {
    let Record {
        key,
        value,
        timestamp,
    } = record;

    let Some(entity) = state.entities.get(&value.event.entity_id) else {
        log::debug!("Record {key} could not be associated with an entity.");
        return None;
    };

    let rules = value
        .rule_ids
        .iter()
        .filter_map(|id| state.rules.get(id).cloned())
        .collect();

    Some(Record {
        key,
        value: ResolvedNotification {
            event: value.event,
            entity: Arc::clone(entity),
            rules,
        },
        timestamp,
    })
}

fn group_records(mut digest: Digest, record: DigestRecord) -> Digest {
    let rules = record.value.rules.clone();
    if rules.is_empty() {
        log::debug!(
            "Record {} has no associated rules, and will not be added to any groups.",
            record.key
        );
    }

    let entity = Arc::clone(&record.value.entity);
    for rule in &rules {
        digest.push(rule, &entity, record.clone());
    }
    digest
}

fn sort_group_contents(mut digest: Digest) -> Digest {
    for group in &mut digest.rules {
        group.sort_entities();
    }
    digest
}

fn sort_rule_groups(mut digest: Digest) -> Digest {
    digest.sort_rules();
    digest
}

fn index_by<T, K>(items: &[T], key: impl Fn(&T) -> K) -> HashMap<K, usize>
where
    K: std::hash::Hash + Eq,
{
    items
        .iter()
        .enumerate()
        .map(|(slot, item)| (key(item), slot))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EntityStatus, Event};
    use crate::record::record_from_event;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn owner() -> Arc<Owner> {
        Arc::new(Owner::new(1, "web"))
    }

    fn record(id: &str, entity: u64, rules: &[u64], secs: i64) -> Record {
        let event = Event::new(id, entity, Utc.timestamp_opt(secs, 0).unwrap());
        let rules: Vec<Rule> = rules.iter().map(|&r| Rule::new(r, 1)).collect();
        record_from_event(event, &rules)
    }

    fn attached(state: StateBundle) -> Arc<AttachedState> {
        Arc::new(attach_state(state).unwrap())
    }

    #[test]
    fn test_rewrite_drops_unknown_rules() {
        let state = attached(
            StateBundle::new(owner())
                .with_entity(Entity::new(10, 1))
                .with_rule(Rule::new(1, 1)),
        );

        let rewritten = rewrite_record(record("a", 10, &[1, 2], 5), &state).unwrap();
        let ids: Vec<RuleId> = rewritten.value.rules.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![RuleId(1)]);
        assert_eq!(rewritten.value.entity.id, EntityId(10));
        assert_eq!(rewritten.key, "a");
        assert_eq!(rewritten.timestamp, 5.0);
    }

    #[test]
    fn test_rewrite_without_entity_yields_nothing() {
        let state = attached(StateBundle::new(owner()).with_rule(Rule::new(1, 1)));
        assert!(rewrite_record(record("a", 42, &[1], 5), &state).is_none());
    }

    #[test]
    fn test_grouping_skips_records_without_rules() {
        let state = attached(
            StateBundle::new(owner())
                .with_entity(Entity::new(10, 1))
                .with_rule(Rule::new(1, 1)),
        );

        let digest = digest_pipeline(state).run(vec![record("a", 10, &[9], 1)]);
        assert!(digest.is_empty());
    }

    #[test]
    fn test_record_under_every_matched_rule() {
        let state = attached(
            StateBundle::new(owner())
                .with_entity(Entity::new(10, 1))
                .with_rule(Rule::new(1, 1))
                .with_rule(Rule::new(2, 1)),
        );

        let digest = digest_pipeline(state).run(vec![record("a", 10, &[1, 2], 1)]);
        assert_eq!(digest.len(), 2);
        assert_eq!(digest.placement_count(), 2);
        for id in [RuleId(1), RuleId(2)] {
            let group = digest.get(id).unwrap();
            assert_eq!(group.get(EntityId(10)).unwrap().records[0].key, "a");
        }
    }

    #[test]
    fn test_status_filter_uses_current_status() {
        let state = attached(
            StateBundle::new(owner())
                .with_entity(Entity::new(10, 1).with_status(EntityStatus::Resolved))
                .with_entity(Entity::new(11, 1).with_status(EntityStatus::Ignored))
                .with_entity(Entity::new(12, 1))
                .with_rule(Rule::new(1, 1)),
        );

        let digest = digest_pipeline(state).run(vec![
            record("a", 10, &[1], 3),
            record("b", 11, &[1], 2),
            record("c", 12, &[1], 1),
        ]);

        let group = digest.get(RuleId(1)).unwrap();
        let ids: Vec<EntityId> = group.entities().iter().map(|g| g.entity.id).collect();
        assert_eq!(ids, vec![EntityId(12)]);
    }

    #[test]
    fn test_rules_sorted_by_entity_count_with_stable_ties() {
        let state = attached(
            StateBundle::new(owner())
                .with_entity(Entity::new(10, 1))
                .with_entity(Entity::new(11, 1))
                .with_entity(Entity::new(12, 1))
                .with_rule(Rule::new(1, 1))
                .with_rule(Rule::new(2, 1))
                .with_rule(Rule::new(3, 1)),
        );

        let digest = digest_pipeline(state).run(vec![
            record("a", 10, &[1, 3], 4),
            record("b", 11, &[2], 3),
            record("c", 12, &[2], 2),
            record("d", 12, &[3], 1),
        ]);

        // rule 2 and rule 3 both hold two entities; rule 3 was seen first.
        let order: Vec<RuleId> = digest.rules().iter().map(|g| g.rule.id).collect();
        assert_eq!(order, vec![RuleId(3), RuleId(2), RuleId(1)]);
        assert_eq!(digest.get(RuleId(1)).unwrap().len(), 1);
    }

    #[test]
    fn test_entities_with_equal_counters_keep_first_seen_order() {
        let state = attached(
            StateBundle::new(owner())
                .with_entity(Entity::new(3, 1))
                .with_entity(Entity::new(5, 1))
                .with_entity(Entity::new(7, 1))
                .with_entity(Entity::new(9, 1))
                .with_rule(Rule::new(1, 1))
                .with_counts(3, 4, 2)
                .with_counts(5, 4, 2)
                .with_counts(7, 8, 1)
                .with_counts(9, 4, 2),
        );

        let digest = digest_pipeline(state).run(vec![
            record("a", 9, &[1], 5),
            record("b", 3, &[1], 4),
            record("c", 7, &[1], 3),
            record("d", 5, &[1], 2),
            record("e", 9, &[1], 1),
        ]);

        // 7 leads on events; 9, 3 and 5 tie and keep the order they were queued.
        let ids: Vec<u64> = digest
            .get(RuleId(1))
            .unwrap()
            .entities()
            .iter()
            .map(|g| g.entity.id.0)
            .collect();
        assert_eq!(ids, vec![7, 9, 3, 5]);
    }

    #[test]
    fn test_records_stay_in_input_order_within_entity() {
        let state = attached(
            StateBundle::new(owner())
                .with_entity(Entity::new(10, 1))
                .with_rule(Rule::new(1, 1)),
        );

        let digest = digest_pipeline(state).run(vec![
            record("newest", 10, &[1], 3),
            record("middle", 10, &[1], 2),
            record("oldest", 10, &[1], 1),
        ]);

        let keys: Vec<&str> = digest.get(RuleId(1)).unwrap().entities()[0]
            .records
            .iter()
            .map(|r| r.key.as_str())
            .collect();
        assert_eq!(keys, vec!["newest", "middle", "oldest"]);
    }

    #[test]
    fn test_summary_lists_record_keys() {
        let state = attached(
            StateBundle::new(owner())
                .with_entity(Entity::new(10, 1).with_title("TypeError"))
                .with_rule(Rule::new(1, 1).with_label("New issues"))
                .with_counts(10, 3, 1),
        );

        let summary = digest_pipeline(state)
            .run(vec![record("a", 10, &[1], 2), record("b", 10, &[1], 1)])
            .summary();

        assert_eq!(
            summary,
            DigestSummary {
                rules: vec![RuleSummary {
                    rule_id: RuleId(1),
                    label: "New issues".to_string(),
                    entities: vec![EntitySummary {
                        entity_id: EntityId(10),
                        title: "TypeError".to_string(),
                        event_count: 3,
                        user_count: 1,
                        records: vec!["a".to_string(), "b".to_string()],
                    }],
                }],
            }
        );

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["rules"][0]["entities"][0]["event_count"], 3);
    }

    #[test]
    fn test_pipeline_stage_names() {
        let state = attached(StateBundle::new(owner()));
        let names: Vec<String> = digest_pipeline(state)
            .stages()
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "map(rewrite_record)",
                "filter(drop_unresolvable)",
                "filter(unresolved_only)",
                "reduce(group_records)",
                "apply(sort_group_contents)",
                "apply(sort_rule_groups)",
            ]
        );
    }
}
