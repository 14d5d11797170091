use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }
    };
}

id_type!(
    /// Identifier of the owning project
    OwnerId
);
id_type!(
    /// Identifier of an issue group
    EntityId
);
id_type!(
    /// Identifier of an alert rule
    RuleId
);

/// Project all entities, rules and records of one digest belong to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    pub id: OwnerId,
    pub slug: String,
}

impl Owner {
    pub fn new(id: impl Into<OwnerId>, slug: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            slug: slug.into(),
        }
    }
}

/// Lifecycle status of an issue group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityStatus {
    #[default]
    Unresolved,
    Resolved,
    Ignored,
    PendingDeletion,
    DeletionInProgress,
    PendingMerge,
}

impl EntityStatus {
    pub fn is_unresolved(self) -> bool {
        matches!(self, EntityStatus::Unresolved)
    }
}

/// Issue group events are aggregated into.
///
/// `event_count` and `user_count` stay zero until state is attached; they
/// are then filled from the counter service for the digest window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub owner_id: OwnerId,
    #[serde(default)]
    pub status: EntityStatus,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub event_count: u64,
    #[serde(default)]
    pub user_count: u64,
    #[serde(skip)]
    pub owner: Option<Arc<Owner>>,
}

impl Entity {
    pub fn new(id: impl Into<EntityId>, owner_id: impl Into<OwnerId>) -> Self {
        Self {
            id: id.into(),
            owner_id: owner_id.into(),
            status: EntityStatus::Unresolved,
            title: String::new(),
            event_count: 0,
            user_count: 0,
            owner: None,
        }
    }

    pub fn with_status(mut self, status: EntityStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Ordering key inside a rule group (compared descending)
    pub fn sort_key(&self) -> (u64, u64) {
        (self.event_count, self.user_count)
    }
}

/// Alert rule whose match put an event into the digest queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: RuleId,
    pub owner_id: OwnerId,
    #[serde(default)]
    pub label: String,
    #[serde(skip)]
    pub owner: Option<Arc<Owner>>,
}

impl Rule {
    pub fn new(id: impl Into<RuleId>, owner_id: impl Into<OwnerId>) -> Self {
        Self {
            id: id.into(),
            owner_id: owner_id.into(),
            label: String::new(),
            owner: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

/// Single event occurrence. Carries only the id of its issue group; the
/// group itself is re-attached while the digest is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_id: String,
    pub entity_id: EntityId,
    pub occurred_at: DateTime<Utc>,
    #[serde(default)]
    pub message: String,
}

impl Event {
    pub fn new(
        event_id: impl Into<String>,
        entity_id: impl Into<EntityId>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            entity_id: entity_id.into(),
            occurred_at,
            message: String::new(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}
