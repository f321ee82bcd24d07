//! Topic classification.
//!
//! A topic is an opaque dotted string `<resource>.<event>`. The split is on
//! the first dot, so the event name may itself contain dots. A topic is
//! private exactly when its resource key equals the subscriber's user id;
//! everything else is public.

use thiserror::Error;

/// Returned when a topic string has no event name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid topic: {0:?}")]
pub struct InvalidTopic(pub String);

/// Whether a topic is addressed to a single user or to everyone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Public,
    Private,
}

/// A topic split into its parts, with scope resolved against a user id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classified<'a> {
    pub scope: Scope,
    /// Resource key: an instrument, or a user id for private topics.
    pub resource: &'a str,
    /// Event name, everything after the first dot.
    pub event: &'a str,
}

/// Classify `topic` for a subscriber identified by `uid`.
///
/// The topic is private exactly when its resource key equals `uid`. An
/// anonymous subscriber has an empty uid, so only topics with an empty
/// resource key classify as private for it; the access policy denies
/// those outright.
pub fn classify<'a>(topic: &'a str, uid: &str) -> Result<Classified<'a>, InvalidTopic> {
    let (resource, event) = topic
        .split_once('.')
        .ok_or_else(|| InvalidTopic(topic.to_string()))?;

    if event.is_empty() {
        return Err(InvalidTopic(topic.to_string()));
    }

    let scope = if resource == uid {
        Scope::Private
    } else {
        Scope::Public
    };

    Ok(Classified {
        scope,
        resource,
        event,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_topic_splits_on_first_dot() {
        let c = classify("eurusd.trades", "alice").unwrap();
        assert_eq!(c.scope, Scope::Public);
        assert_eq!(c.resource, "eurusd");
        assert_eq!(c.event, "trades");
    }

    #[test]
    fn event_may_contain_dots() {
        let c = classify("btcusd.depth.l2", "").unwrap();
        assert_eq!(c.resource, "btcusd");
        assert_eq!(c.event, "depth.l2");
    }

    #[test]
    fn own_user_id_is_private() {
        let c = classify("alice.order", "alice").unwrap();
        assert_eq!(c.scope, Scope::Private);
    }

    #[test]
    fn other_user_id_is_public() {
        let c = classify("bob.order", "alice").unwrap();
        assert_eq!(c.scope, Scope::Public);
    }

    #[test]
    fn named_topic_is_public_for_anonymous() {
        let c = classify("alice.order", "").unwrap();
        assert_eq!(c.scope, Scope::Public);
    }

    #[test]
    fn empty_resource_is_private_for_anonymous() {
        // ".order" has an empty resource key, which equals the anonymous
        // uid; the policy layer turns this into a deny.
        let c = classify(".order", "").unwrap();
        assert_eq!(c.scope, Scope::Private);
    }

    #[test]
    fn missing_event_name_is_invalid() {
        assert!(classify("eurusd", "alice").is_err());
        assert!(classify("eurusd.", "alice").is_err());
    }
}
