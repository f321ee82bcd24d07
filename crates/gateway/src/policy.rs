//! Access control for topic subscriptions and deliveries.
//!
//! Private topics are bound to identity: only the named user may receive
//! them, and that binding beats any role filter. Public topics consult the
//! role's allow-list when one is configured and are open otherwise.

use std::collections::HashMap;

use crate::session::Principal;
use crate::topic::{classify, Scope};

/// Role → permitted event-name patterns. Built once at startup from
/// configuration and frozen.
#[derive(Debug, Clone, Default)]
pub struct AccessMatrix {
    roles: HashMap<String, Vec<String>>,
}

impl AccessMatrix {
    /// Build a matrix from role → patterns entries. Role names are stored
    /// lower-cased; lookups lower-case the queried role to match.
    pub fn new(roles: HashMap<String, Vec<String>>) -> Self {
        let roles = roles
            .into_iter()
            .map(|(role, patterns)| (role.to_lowercase(), patterns))
            .collect();
        Self { roles }
    }

    /// A matrix with no entries: every public topic is open.
    pub fn empty() -> Self {
        Self::default()
    }

    fn patterns(&self, role: &str) -> Option<&[String]> {
        self.roles.get(&role.to_lowercase()).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}

/// Decide whether `principal` may receive `topic`.
///
/// Evaluation order:
/// 1. unparseable topics are denied;
/// 2. private topics are denied to anonymous principals;
/// 3. a private topic addressed to the principal is permitted, regardless
///    of any role filter;
/// 4. if the principal's role has an allow-list, the event name must match
///    one of its patterns;
/// 5. public topics are open to roles without an allow-list.
pub fn permit(matrix: &AccessMatrix, principal: &Principal, topic: &str) -> bool {
    let Ok(classified) = classify(topic, &principal.uid) else {
        return false;
    };

    if classified.scope == Scope::Private {
        if principal.is_anonymous() {
            return false;
        }
        if classified.resource != principal.uid {
            return false;
        }
        return true;
    }

    match matrix.patterns(&principal.role) {
        Some(patterns) => patterns
            .iter()
            .any(|p| matches_pattern(p, classified.event)),
        None => true,
    }
}

/// Check an event name against a single allow-list pattern.
///
/// Patterns are explicit names or `*` globs: `*` matches any run of
/// characters, so `order*` matches `order_created` and a bare `*` matches
/// everything.
pub fn matches_pattern(pattern: &str, event: &str) -> bool {
    if !pattern.contains('*') {
        return pattern == event;
    }

    let mut rest = event;
    let mut parts = pattern.split('*');

    // The first part is anchored at the start, the last at the end;
    // everything between matches greedily left to right.
    let first = parts.next().unwrap_or("");
    if !rest.starts_with(first) {
        return false;
    }
    rest = &rest[first.len()..];

    let mut pending: Option<&str> = None;
    for part in parts {
        if let Some(prev) = pending.take() {
            match rest.find(prev) {
                Some(idx) => rest = &rest[idx + prev.len()..],
                None => return false,
            }
        }
        pending = Some(part);
    }

    match pending {
        // Pattern ended with '*': the tail matches anything.
        Some("") => true,
        Some(last) => rest.ends_with(last) && rest.len() >= last.len(),
        None => rest.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix(entries: &[(&str, &[&str])]) -> AccessMatrix {
        AccessMatrix::new(
            entries
                .iter()
                .map(|(role, pats)| {
                    (
                        role.to_string(),
                        pats.iter().map(|p| p.to_string()).collect(),
                    )
                })
                .collect(),
        )
    }

    fn anonymous() -> Principal {
        Principal::anonymous()
    }

    fn user(uid: &str, role: &str) -> Principal {
        Principal {
            uid: uid.to_string(),
            role: role.to_string(),
        }
    }

    #[test]
    fn public_topic_open_when_role_unlisted() {
        let m = AccessMatrix::empty();
        assert!(permit(&m, &anonymous(), "eurusd.trades"));
        assert!(permit(&m, &user("alice", "member"), "eurusd.trades"));
    }

    #[test]
    fn own_private_topic_permitted() {
        let m = AccessMatrix::empty();
        assert!(permit(&m, &user("alice", "member"), "alice.order"));
    }

    #[test]
    fn private_match_beats_role_filter() {
        // "order" is not in the member allow-list, but the topic is
        // addressed to alice herself.
        let m = matrix(&[("member", &["trades"])]);
        assert!(permit(&m, &user("alice", "member"), "alice.order"));
    }

    #[test]
    fn foreign_private_topic_denied_under_role_filter() {
        let m = matrix(&[("member", &["trades"])]);
        assert!(!permit(&m, &user("alice", "member"), "bob.order"));
    }

    #[test]
    fn anonymous_denied_private() {
        let m = AccessMatrix::empty();
        assert!(!permit(&m, &anonymous(), ".order"));
    }

    #[test]
    fn role_allow_list_filters_public_topics() {
        let m = matrix(&[("trader", &["trades", "order"])]);
        let trader = user("carol", "trader");
        assert!(permit(&m, &trader, "btcusd.trades"));
        assert!(!permit(&m, &trader, "btcusd.candles"));
        // Private match still wins for the trader's own address.
        assert!(permit(&m, &user("alice", "trader"), "alice.order"));
    }

    #[test]
    fn role_lookup_is_case_insensitive() {
        let m = matrix(&[("TRADER", &["trades"])]);
        assert!(permit(&m, &user("carol", "trader"), "btcusd.trades"));
        assert!(!permit(&m, &user("carol", "Trader"), "btcusd.candles"));
    }

    #[test]
    fn malformed_topic_denied() {
        let m = AccessMatrix::empty();
        assert!(!permit(&m, &anonymous(), "eurusd"));
        assert!(!permit(&m, &user("alice", ""), "eurusd."));
    }

    #[test]
    fn pattern_matching() {
        assert!(matches_pattern("trades", "trades"));
        assert!(!matches_pattern("trades", "trade"));
        assert!(matches_pattern("*", "anything"));
        assert!(matches_pattern("order*", "order_created"));
        assert!(matches_pattern("*_created", "order_created"));
        assert!(!matches_pattern("order*", "trade_created"));
        assert!(matches_pattern("o*ed", "order_created"));
        assert!(!matches_pattern("o*x", "order_created"));
        assert!(matches_pattern("*order*", "reorder_created"));
    }
}
