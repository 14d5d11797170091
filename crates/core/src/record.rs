use crate::error::{DigestError, Result};
use crate::model::{Entity, Event, Rule, RuleId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const MICROS_PER_SECOND: i64 = 1_000_000;

/// Queued unit of digest work.
///
/// `timestamp` is the event time as fractional epoch seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record<N = Notification> {
    pub key: String,
    pub value: N,
    pub timestamp: f64,
}

impl<N> Record<N> {
    pub fn new(key: impl Into<String>, value: N, timestamp: f64) -> Self {
        Self {
            key: key.into(),
            value,
            timestamp,
        }
    }

    /// Record time as a UTC datetime (microsecond precision)
    pub fn datetime(&self) -> Result<DateTime<Utc>> {
        from_timestamp(self.timestamp)
    }
}

/// Payload of a queued record: the event and the ids of the rules it matched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub event: Event,
    pub rule_ids: Vec<RuleId>,
}

/// Payload after rewriting against fetched state: the issue group is
/// re-attached and rule ids are replaced by the rules that still exist.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedNotification {
    pub event: Event,
    pub entity: Arc<Entity>,
    pub rules: Vec<Arc<Rule>>,
}

/// Record flowing out of the rewrite stage
pub type DigestRecord = Record<ResolvedNotification>;

/// Build a queue record for `event`, keyed by the event id.
///
/// An empty `rules` slice is allowed but logged: such a record can never be
/// placed in a digest group.
pub fn record_from_event(event: Event, rules: &[Rule]) -> Record {
    if rules.is_empty() {
        log::warn!(
            "Creating record for event {} that does not contain any rules!",
            event.event_id
        );
    }

    let timestamp = to_timestamp(event.occurred_at);
    Record {
        key: event.event_id.clone(),
        value: Notification {
            event,
            rule_ids: rules.iter().map(|rule| rule.id).collect(),
        },
        timestamp,
    }
}

pub fn to_timestamp(datetime: DateTime<Utc>) -> f64 {
    datetime.timestamp_micros() as f64 / MICROS_PER_SECOND as f64
}

pub fn from_timestamp(timestamp: f64) -> Result<DateTime<Utc>> {
    if !timestamp.is_finite() {
        return Err(DigestError::InvalidTimestamp(timestamp));
    }
    let micros = (timestamp * MICROS_PER_SECOND as f64).round() as i64;
    let secs = micros.div_euclid(MICROS_PER_SECOND);
    let nanos = (micros.rem_euclid(MICROS_PER_SECOND) * 1_000) as u32;
    DateTime::from_timestamp(secs, nanos).ok_or(DigestError::InvalidTimestamp(timestamp))
}
