//! Digest keys identify who a queued batch of records is for.
//!
//! Two grammars share the key space:
//!
//! ```text
//! generic:   <channel>:p:<owner_id>
//! targeted:  targeted_mail:p:<owner_id>:<target_type>:<target_id>
//! ```
//!
//! A key is targeted iff its first `:`-separated segment is exactly
//! [`TARGETED_KEY_SENTINEL`]. Targeted keys without a target id carry `-1`.

use crate::error::{DigestError, Result};
use crate::model::{Owner, OwnerId};
use crate::store::OwnerStore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

pub const TARGETED_KEY_SENTINEL: &str = "targeted_mail";
pub const OWNER_TYPE_TAG: &str = "p";
pub const NO_TARGET_ID: i64 = -1;

/// Recipient selector of a targeted key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetType {
    IssueOwners,
    Team,
    Member,
}

impl TargetType {
    pub fn as_str(self) -> &'static str {
        match self {
            TargetType::IssueOwners => "IssueOwners",
            TargetType::Team => "Team",
            TargetType::Member => "Member",
        }
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetType {
    type Err = DigestError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "IssueOwners" => Ok(TargetType::IssueOwners),
            "Team" => Ok(TargetType::Team),
            "Member" => Ok(TargetType::Member),
            other => Err(DigestError::InvalidKey(format!(
                "unknown target type '{other}'"
            ))),
        }
    }
}

/// Parsed digest key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DigestKey {
    Generic {
        channel: String,
        owner_id: OwnerId,
    },
    Targeted {
        owner_id: OwnerId,
        target_type: TargetType,
        target_id: i64,
    },
}

impl DigestKey {
    /// Generic key for `channel`. Slugs that would not parse back (the
    /// targeted sentinel, or anything containing `:`) are rejected.
    pub fn generic(channel: impl Into<String>, owner: &Owner) -> Result<Self> {
        let channel = channel.into();
        if channel == TARGETED_KEY_SENTINEL || channel.contains(':') {
            return Err(DigestError::InvalidKey(format!(
                "reserved or malformed channel slug: '{channel}'"
            )));
        }
        Ok(DigestKey::Generic {
            channel,
            owner_id: owner.id,
        })
    }

    pub fn targeted(owner: &Owner, target_type: TargetType, target_id: Option<i64>) -> Self {
        DigestKey::Targeted {
            owner_id: owner.id,
            target_type,
            target_id: target_id.unwrap_or(NO_TARGET_ID),
        }
    }

    /// Parse key text. The grammar is picked once, from the first segment.
    pub fn parse(key: &str) -> Result<Self> {
        if is_targeted_key(key) {
            let parts: Vec<&str> = key.splitn(5, ':').collect();
            let [_, tag, owner_id, target_type, target_id] = parts[..] else {
                return Err(invalid(key, "expected 5 segments"));
            };
            check_owner_tag(key, tag)?;
            Ok(DigestKey::Targeted {
                owner_id: parse_owner_id(key, owner_id)?,
                target_type: target_type.parse()?,
                target_id: target_id
                    .parse()
                    .map_err(|_| invalid(key, "target id is not an integer"))?,
            })
        } else {
            let parts: Vec<&str> = key.splitn(3, ':').collect();
            let [channel, tag, owner_id] = parts[..] else {
                return Err(invalid(key, "expected 3 segments"));
            };
            check_owner_tag(key, tag)?;
            Ok(DigestKey::Generic {
                channel: channel.to_string(),
                owner_id: parse_owner_id(key, owner_id)?,
            })
        }
    }

    pub fn owner_id(&self) -> OwnerId {
        match self {
            DigestKey::Generic { owner_id, .. } | DigestKey::Targeted { owner_id, .. } => *owner_id,
        }
    }

    pub fn is_targeted(&self) -> bool {
        matches!(self, DigestKey::Targeted { .. })
    }

    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for DigestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DigestKey::Generic { channel, owner_id } => {
                write!(f, "{channel}:{OWNER_TYPE_TAG}:{owner_id}")
            }
            DigestKey::Targeted {
                owner_id,
                target_type,
                target_id,
            } => write!(
                f,
                "{TARGETED_KEY_SENTINEL}:{OWNER_TYPE_TAG}:{owner_id}:{target_type}:{target_id}"
            ),
        }
    }
}

impl FromStr for DigestKey {
    type Err = DigestError;

    fn from_str(s: &str) -> Result<Self> {
        DigestKey::parse(s)
    }
}

/// Exact match of the first segment against the sentinel
pub fn is_targeted_key(key: &str) -> bool {
    key.split(':').next() == Some(TARGETED_KEY_SENTINEL)
}

pub fn encode_key(channel: &str, owner: &Owner) -> Result<String> {
    DigestKey::generic(channel, owner).map(|key| key.encode())
}

pub fn encode_targeted_key(owner: &Owner, target_type: TargetType, target_id: Option<i64>) -> String {
    DigestKey::targeted(owner, target_type, target_id).encode()
}

/// Resolves channel slugs found in generic keys
pub trait ChannelRegistry {
    type Channel;

    fn get(&self, slug: &str) -> Option<Self::Channel>;

    /// Channel that delivers targeted keys
    fn targeted(&self) -> Self::Channel;
}

/// Key with its channel and owner looked up
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedKey<C> {
    Generic {
        channel: C,
        owner: Arc<Owner>,
    },
    Targeted {
        channel: C,
        owner: Arc<Owner>,
        target_type: TargetType,
        target_id: i64,
    },
}

impl<C> ResolvedKey<C> {
    pub fn channel(&self) -> &C {
        match self {
            ResolvedKey::Generic { channel, .. } | ResolvedKey::Targeted { channel, .. } => channel,
        }
    }

    pub fn owner(&self) -> &Arc<Owner> {
        match self {
            ResolvedKey::Generic { owner, .. } | ResolvedKey::Targeted { owner, .. } => owner,
        }
    }
}

/// Parse `key` and look up its channel and owner.
///
/// Fails with `DigestError::NotFound` when the channel slug or the owner no
/// longer resolves.
pub async fn resolve_key<R>(
    key: &str,
    registry: &R,
    owners: &dyn OwnerStore,
) -> Result<ResolvedKey<R::Channel>>
where
    R: ChannelRegistry + ?Sized,
{
    match DigestKey::parse(key)? {
        DigestKey::Generic { channel, owner_id } => {
            let channel = registry
                .get(&channel)
                .ok_or_else(|| DigestError::NotFound(format!("channel '{channel}'")))?;
            let owner = owners.get_by_id(OWNER_TYPE_TAG, owner_id).await?;
            Ok(ResolvedKey::Generic { channel, owner })
        }
        DigestKey::Targeted {
            owner_id,
            target_type,
            target_id,
        } => {
            let owner = owners.get_by_id(OWNER_TYPE_TAG, owner_id).await?;
            Ok(ResolvedKey::Targeted {
                channel: registry.targeted(),
                owner,
                target_type,
                target_id,
            })
        }
    }
}

fn check_owner_tag(key: &str, tag: &str) -> Result<()> {
    if tag == OWNER_TYPE_TAG {
        Ok(())
    } else {
        Err(invalid(key, "unknown owner type tag"))
    }
}

fn parse_owner_id(key: &str, raw: &str) -> Result<OwnerId> {
    raw.parse::<u64>()
        .map(OwnerId)
        .map_err(|_| invalid(key, "owner id is not an integer"))
}

fn invalid(key: &str, reason: &str) -> DigestError {
    DigestError::InvalidKey(format!("{reason}: '{key}'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryBackend;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    struct Slugs;

    impl ChannelRegistry for Slugs {
        type Channel = String;

        fn get(&self, slug: &str) -> Option<String> {
            matches!(slug, "mail" | "slack").then(|| slug.to_string())
        }

        fn targeted(&self) -> String {
            "mail".to_string()
        }
    }

    fn owner() -> Owner {
        Owner::new(12, "backend")
    }

    #[test]
    fn test_generic_key_format() {
        assert_eq!(encode_key("slack", &owner()).unwrap(), "slack:p:12");
        assert_eq!(
            DigestKey::parse("slack:p:12").unwrap(),
            DigestKey::Generic {
                channel: "slack".to_string(),
                owner_id: OwnerId(12)
            }
        );
    }

    #[test]
    fn test_generic_key_rejects_slugs_that_cannot_round_trip() {
        for channel in [TARGETED_KEY_SENTINEL, "a:b", ":"] {
            assert!(
                matches!(encode_key(channel, &owner()), Err(DigestError::InvalidKey(_))),
                "{channel} should be rejected"
            );
        }
        assert!(DigestKey::generic("targeted_mailx", &owner()).is_ok());
    }

    #[test]
    fn test_targeted_key_defaults_missing_target_id() {
        let key = encode_targeted_key(&owner(), TargetType::IssueOwners, None);
        assert_eq!(key, "targeted_mail:p:12:IssueOwners:-1");

        let parsed = DigestKey::parse(&key).unwrap();
        assert_eq!(
            parsed,
            DigestKey::Targeted {
                owner_id: OwnerId(12),
                target_type: TargetType::IssueOwners,
                target_id: -1
            }
        );
    }

    #[test]
    fn test_sentinel_must_match_first_segment_exactly() {
        assert!(is_targeted_key("targeted_mail:p:1:Team:3"));
        assert!(!is_targeted_key("targeted_mailx:p:1"));
        assert!(!is_targeted_key("mail:targeted_mail:1"));
        assert!(!is_targeted_key(""));
        assert!(!DigestKey::parse("targeted_mailx:p:1").unwrap().is_targeted());
    }

    #[test]
    fn test_malformed_keys_are_rejected() {
        for key in [
            "slack",
            "slack:p",
            "slack:p:abc",
            "slack:p:1:extra",
            "slack:o:1",
            "targeted_mail:p:1:Team",
            "targeted_mail:p:1:Robot:3",
            "targeted_mail:p:1:Team:x",
        ] {
            assert!(
                matches!(DigestKey::parse(key), Err(DigestError::InvalidKey(_))),
                "expected {key:?} to be rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_resolve_generic_key() {
        let mut backend = InMemoryBackend::new();
        backend.insert_owner(owner());

        let resolved = resolve_key("slack:p:12", &Slugs, &backend).await.unwrap();
        assert!(matches!(resolved, ResolvedKey::Generic { .. }));
        assert_eq!(resolved.channel(), "slack");
        assert_eq!(resolved.owner().slug, "backend");
    }

    #[tokio::test]
    async fn test_resolve_targeted_key_uses_targeted_channel() {
        let mut backend = InMemoryBackend::new();
        backend.insert_owner(owner());

        let resolved = resolve_key("targeted_mail:p:12:Member:5", &Slugs, &backend)
            .await
            .unwrap();
        match resolved {
            ResolvedKey::Targeted {
                channel,
                owner,
                target_type,
                target_id,
            } => {
                assert_eq!(channel, "mail");
                assert_eq!(owner.id, OwnerId(12));
                assert_eq!(target_type, TargetType::Member);
                assert_eq!(target_id, 5);
            }
            other => panic!("expected targeted key, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_resolve_fails_for_missing_owner_or_channel() {
        let backend = InMemoryBackend::new();
        assert!(matches!(
            resolve_key("slack:p:12", &Slugs, &backend).await,
            Err(DigestError::NotFound(_))
        ));

        let mut backend = InMemoryBackend::new();
        backend.insert_owner(owner());
        assert!(matches!(
            resolve_key("pagerduty:p:12", &Slugs, &backend).await,
            Err(DigestError::NotFound(_))
        ));
    }

    fn target_type() -> impl Strategy<Value = TargetType> {
        prop_oneof![
            Just(TargetType::IssueOwners),
            Just(TargetType::Team),
            Just(TargetType::Member),
        ]
    }

    proptest! {
        #[test]
        fn proptest_generic_key_round_trip(channel in "[a-z][a-z0-9_-]{0,15}", id in any::<u64>()) {
            let owner = Owner::new(id, "o");
            match encode_key(&channel, &owner) {
                Ok(key) => {
                    let parsed = DigestKey::parse(&key).unwrap();
                    prop_assert_eq!(parsed, DigestKey::Generic { channel, owner_id: OwnerId(id) });
                }
                Err(err) => {
                    prop_assert_eq!(channel.as_str(), TARGETED_KEY_SENTINEL);
                    prop_assert!(matches!(err, DigestError::InvalidKey(_)));
                }
            }
        }

        #[test]
        fn proptest_targeted_key_round_trip(
            id in any::<u64>(),
            kind in target_type(),
            target in proptest::option::of(any::<i64>()),
        ) {
            let owner = Owner::new(id, "o");
            let parsed = DigestKey::parse(&encode_targeted_key(&owner, kind, target)).unwrap();
            prop_assert_eq!(parsed, DigestKey::Targeted {
                owner_id: OwnerId(id),
                target_type: kind,
                target_id: target.unwrap_or(-1),
            });
        }
    }
}
