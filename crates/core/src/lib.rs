//! # Digest Core
//!
//! Turns a batch of queued alert records into one ordered digest: records
//! grouped by the rule that matched them, then by issue group.
//!
//! ## Build
//!
//! ```text
//! Record[] (newest first)
//!     │
//!     ├──> State Fetcher (bulk lookups + counters over the batch window)
//!     │
//!     ├──> State Attacher (ownership checks, counters onto entities)
//!     │
//!     └──> Pipeline
//!            ├─ map     rewrite_record       re-attach group, resolve rules
//!            ├─ filter  drop_unresolvable    group no longer exists
//!            ├─ filter  unresolved_only      live status, not capture-time
//!            ├─ reduce  group_records        rule -> entity -> records
//!            ├─ apply   sort_group_contents  (events, users) descending
//!            └─ apply   sort_rule_groups     entity count descending
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use digest_core::{build_digest, Backends, InMemoryBackend, StateSource};
//! use std::sync::Arc;
//!
//! # async fn run(records: Vec<digest_core::Record>) -> digest_core::Result<()> {
//! let mut backend = InMemoryBackend::new();
//! let owner = backend.insert_owner(digest_core::Owner::new(1, "web"));
//! let backends = Backends::shared(Arc::new(backend));
//!
//! if let Some(digest) = build_digest(owner, records, StateSource::Fetch(&backends)).await? {
//!     for group in digest.rules() {
//!         println!("rule {}: {} issues", group.rule.id, group.len());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod attach;
mod digest;
mod error;
mod key;
mod memory;
mod model;
mod record;
mod state;
mod store;

pub use attach::{attach_state, AttachedState};
pub use digest::{
    build_digest, digest_pipeline, rewrite_record, Digest, DigestSummary, EntityGroup,
    EntitySummary, RuleGroup, RuleSummary, StateSource,
};
pub use error::{DigestError, Result};
pub use key::{
    encode_key, encode_targeted_key, is_targeted_key, resolve_key, ChannelRegistry, DigestKey,
    ResolvedKey, TargetType, NO_TARGET_ID, OWNER_TYPE_TAG, TARGETED_KEY_SENTINEL,
};
pub use memory::InMemoryBackend;
pub use model::{Entity, EntityId, EntityStatus, Event, Owner, OwnerId, Rule, RuleId};
pub use record::{
    from_timestamp, record_from_event, to_timestamp, DigestRecord, Notification, Record,
    ResolvedNotification,
};
pub use state::{fetch_state, StateBundle};
pub use store::{Backends, CounterService, EntityStore, Metric, OwnerStore, RuleStore};
