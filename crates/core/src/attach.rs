use crate::error::{DigestError, Result};
use crate::model::{Entity, EntityId, Owner, OwnerId, Rule, RuleId};
use crate::state::StateBundle;
use std::collections::HashMap;
use std::sync::Arc;

/// Validated, cross-linked state. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct AttachedState {
    pub owner: Arc<Owner>,
    pub entities: HashMap<EntityId, Arc<Entity>>,
    pub rules: HashMap<RuleId, Arc<Rule>>,
}

/// Link every entity and rule back to the owner and copy counters onto the
/// entities.
///
/// Any entity or rule owned by someone else is an `OwnershipViolation`,
/// which aborts the build. Counters for unknown entities are ignored;
/// entities without counters keep zero.
pub fn attach_state(state: StateBundle) -> Result<AttachedState> {
    let StateBundle {
        owner,
        mut entities,
        rules,
        event_counts,
        user_counts,
    } = state;

    for entity in entities.values_mut() {
        ensure_owner("Entity", entity.id.0, owner.id, entity.owner_id)?;
        entity.owner = Some(Arc::clone(&owner));
        entity.event_count = 0;
        entity.user_count = 0;
    }

    let mut attached_rules = HashMap::with_capacity(rules.len());
    for (id, mut rule) in rules {
        ensure_owner("Rule", rule.id.0, owner.id, rule.owner_id)?;
        rule.owner = Some(Arc::clone(&owner));
        attached_rules.insert(id, Arc::new(rule));
    }

    for (id, count) in event_counts {
        match entities.get_mut(&id) {
            Some(entity) => entity.event_count = count,
            None => log::debug!("Ignoring event count for unknown entity {id}"),
        }
    }

    for (id, count) in user_counts {
        match entities.get_mut(&id) {
            Some(entity) => entity.user_count = count,
            None => log::debug!("Ignoring user count for unknown entity {id}"),
        }
    }

    Ok(AttachedState {
        owner,
        entities: entities
            .into_iter()
            .map(|(id, entity)| (id, Arc::new(entity)))
            .collect(),
        rules: attached_rules,
    })
}

fn ensure_owner(kind: &'static str, id: u64, expected: OwnerId, actual: OwnerId) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(DigestError::OwnershipViolation {
            kind,
            id,
            expected: expected.0,
            actual: actual.0,
        })
    }
}
