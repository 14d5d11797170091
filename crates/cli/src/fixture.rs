use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use digest_core::{
    record_from_event, ChannelRegistry, Entity, EntityId, Event, InMemoryBackend, Owner, OwnerId,
    Record, Rule, RuleId, StateBundle,
};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

/// Offline description of one owner's queued records and stored state
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Fixture {
    pub owner: Owner,
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default)]
    pub entities: Vec<Entity>,
    #[serde(default)]
    pub rules: Vec<Rule>,
    /// Raw events feeding the counter service
    #[serde(default)]
    pub occurrences: Vec<FixtureOccurrence>,
    /// Counters used as-is by `--prefetched`
    #[serde(default)]
    pub counts: HashMap<EntityId, FixtureCounts>,
    /// Queued events, in any order
    #[serde(default)]
    pub events: Vec<FixtureEvent>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FixtureOccurrence {
    pub entity_id: EntityId,
    pub at: DateTime<Utc>,
    #[serde(default)]
    pub user: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FixtureCounts {
    pub events: u64,
    pub users: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FixtureEvent {
    #[serde(flatten)]
    pub event: Event,
    #[serde(default)]
    pub rule_ids: Vec<RuleId>,
}

impl Fixture {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read fixture {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Invalid fixture {}", path.display()))
    }

    /// Queue records, newest first
    pub fn records(&self) -> Vec<Record> {
        let stored: HashMap<RuleId, &Rule> = self.rules.iter().map(|r| (r.id, r)).collect();
        let mut records: Vec<Record> = self
            .events
            .iter()
            .map(|queued| {
                // Ids missing from the fixture stand for rules deleted after queueing.
                let rules: Vec<Rule> = queued
                    .rule_ids
                    .iter()
                    .map(|id| {
                        stored
                            .get(id)
                            .map(|rule| (*rule).clone())
                            .unwrap_or_else(|| Rule::new(*id, self.owner.id))
                    })
                    .collect();
                record_from_event(queued.event.clone(), &rules)
            })
            .collect();
        records.sort_by(|a, b| b.timestamp.total_cmp(&a.timestamp));
        records
    }

    pub fn backend(&self) -> InMemoryBackend {
        let mut backend = InMemoryBackend::new();
        backend.insert_owner(self.owner.clone());
        for entity in &self.entities {
            backend.insert_entity(entity.clone());
        }
        for rule in &self.rules {
            backend.insert_rule(rule.clone());
        }
        for occurrence in &self.occurrences {
            backend.record_occurrence(occurrence.entity_id, occurrence.at, occurrence.user.as_deref());
        }
        backend
    }

    pub fn state(&self, owner: Arc<Owner>) -> StateBundle {
        let mut state = StateBundle::new(owner);
        for entity in &self.entities {
            state = state.with_entity(entity.clone());
        }
        for rule in &self.rules {
            state = state.with_rule(rule.clone());
        }
        for (id, counts) in &self.counts {
            state = state.with_counts(*id, counts.events, counts.users);
        }
        state
    }

    pub fn owner_id(&self) -> OwnerId {
        self.owner.id
    }
}

/// Channel registry backed by a fixed set of slugs
#[derive(Debug, Clone)]
pub struct SlugRegistry {
    known: HashSet<String>,
    targeted: String,
}

impl SlugRegistry {
    pub fn new(known: impl IntoIterator<Item = String>, targeted: impl Into<String>) -> Self {
        Self {
            known: known.into_iter().collect(),
            targeted: targeted.into(),
        }
    }
}

impl ChannelRegistry for SlugRegistry {
    type Channel = String;

    fn get(&self, slug: &str) -> Option<String> {
        self.known.get(slug).cloned()
    }

    fn targeted(&self) -> String {
        self.targeted.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"{
        "owner": {"id": 1, "slug": "web"},
        "entities": [{"id": 5, "owner_id": 1}],
        "rules": [{"id": 9, "owner_id": 1, "label": "New issue"}],
        "counts": {"5": {"events": 3, "users": 2}},
        "events": [
            {"event_id": "old", "entity_id": 5, "occurred_at": "2024-01-01T00:00:00Z", "rule_ids": [9]},
            {"event_id": "new", "entity_id": 5, "occurred_at": "2024-01-02T00:00:00Z", "rule_ids": [9, 77]}
        ]
    }"#;

    #[test]
    fn records_are_newest_first_and_keep_deleted_rule_ids() {
        let fixture: Fixture = serde_json::from_str(FIXTURE).unwrap();
        let records = fixture.records();

        let keys: Vec<&str> = records.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["new", "old"]);
        assert_eq!(records[0].value.rule_ids, vec![RuleId(9), RuleId(77)]);
    }

    #[test]
    fn prefetched_state_carries_counts() {
        let fixture: Fixture = serde_json::from_str(FIXTURE).unwrap();
        let state = fixture.state(Arc::new(fixture.owner.clone()));

        assert_eq!(state.event_counts[&EntityId(5)], 3);
        assert_eq!(state.user_counts[&EntityId(5)], 2);
        assert_eq!(state.rules.len(), 1);
    }

    #[test]
    fn registry_resolves_known_slugs_only() {
        let registry = SlugRegistry::new(vec!["slack".to_string()], "mail");
        assert_eq!(registry.get("slack").as_deref(), Some("slack"));
        assert_eq!(registry.get("mail"), None);
        assert_eq!(registry.targeted(), "mail");
    }
}
