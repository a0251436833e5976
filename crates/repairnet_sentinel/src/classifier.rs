//! Rule-based link classification
//!
//! Rules are evaluated top to bottom and the first match wins. The order is
//! part of the contract: several predicates can hold for the same link.

use crate::roles::{
    dominant_role, AGGREGATE_ROLES, BORDER_ROLES, CACHE_ROLES, CORE_ROLES, EDGE_ROLES,
};
use repairnet_db::LinkClass;

/// Facts about one link direction needed to classify it.
#[derive(Debug, Clone, Copy)]
pub struct LinkFacts<'a> {
    pub link_type: &'a str,
    pub hostname: &'a str,
    pub peer: &'a str,
    /// Raw role string of the host; may be a comma-separated list
    pub role_h: &'a str,
    /// Raw role string of the peer; empty when the peer is unknown
    pub role_p: &'a str,
}

/// Result of classifying a link: the label plus the resolved roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub classname: LinkClass,
    pub role_h: String,
    pub role_p: String,
}

/// Resolved view the rule predicates run against.
struct Resolved<'a> {
    link_type: &'a str,
    hostname: &'a str,
    peer: &'a str,
    role_h: &'a str,
    role_p: &'a str,
}

impl Resolved<'_> {
    /// One endpoint in `a`, the other in `b`, in either direction.
    fn either_way(&self, a: &[&str], b: &[&str]) -> bool {
        (a.contains(&self.role_h) && b.contains(&self.role_p))
            || (b.contains(&self.role_h) && a.contains(&self.role_p))
    }
}

type Predicate = fn(&Resolved<'_>) -> bool;

/// Classification rules in priority order.
const RULES: &[(LinkClass, Predicate)] = &[
    (LinkClass::PeerUplink, is_peer_link),
    (LinkClass::AggregateSpine, is_aggregate_spine),
    (LinkClass::SpineLeaf, is_spine_leaf),
    (LinkClass::CoreAggregateAccess, is_access),
    (LinkClass::CoreCache, is_core_cache),
    (LinkClass::CoreAggregateBorder, is_backbone),
];

fn is_peer_link(l: &Resolved<'_>) -> bool {
    l.link_type == "P"
}

fn is_aggregate_spine(l: &Resolved<'_>) -> bool {
    (AGGREGATE_ROLES.contains(&l.role_h) && l.peer.contains("spine"))
        || (l.hostname.contains("spine") && AGGREGATE_ROLES.contains(&l.role_p))
}

fn is_spine_leaf(l: &Resolved<'_>) -> bool {
    (l.hostname.contains("spine") && l.peer.contains("leaf"))
        || (l.hostname.contains("leaf") && l.peer.contains("spine"))
}

fn is_access(l: &Resolved<'_>) -> bool {
    l.either_way(EDGE_ROLES, CORE_ROLES) || l.either_way(EDGE_ROLES, AGGREGATE_ROLES)
}

fn is_core_cache(l: &Resolved<'_>) -> bool {
    l.either_way(CORE_ROLES, CACHE_ROLES)
}

/// Both endpoints from {core, aggregate, border}, any combination.
fn is_backbone(l: &Resolved<'_>) -> bool {
    let backbone = |role: &str| {
        CORE_ROLES.contains(&role) || AGGREGATE_ROLES.contains(&role) || BORDER_ROLES.contains(&role)
    };
    backbone(l.role_h) && backbone(l.role_p)
}

/// Classify a link. Pure: identical input always yields the identical label.
pub fn classify(link: &LinkFacts<'_>) -> Classification {
    let role_h = dominant_role(link.role_h);
    let role_p = dominant_role(link.role_p);

    let resolved = Resolved {
        link_type: link.link_type,
        hostname: link.hostname,
        peer: link.peer,
        role_h: &role_h,
        role_p: &role_p,
    };

    let classname = RULES
        .iter()
        .find(|(_, predicate)| predicate(&resolved))
        .map(|(label, _)| *label)
        .unwrap_or(LinkClass::Unclassified);

    Classification {
        classname,
        role_h,
        role_p,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link<'a>(link_type: &'a str, hostname: &'a str, peer: &'a str, role_h: &'a str, role_p: &'a str) -> LinkFacts<'a> {
        LinkFacts {
            link_type,
            hostname,
            peer,
            role_h,
            role_p,
        }
    }

    #[test]
    fn test_core_aggregate_is_border_class_not_access() {
        let result = classify(&link("I", "core1", "agg1", "core", "aggregate"));
        assert_eq!(result.classname, LinkClass::CoreAggregateBorder);
    }

    #[test]
    fn test_peer_link_type_wins_over_everything() {
        // Would also match core/cache and backbone rules
        let result = classify(&link("P", "core1", "cache1", "core", "cache"));
        assert_eq!(result.classname, LinkClass::PeerUplink);
    }

    #[test]
    fn test_rules_in_order() {
        let cases = [
            (link("U", "agg1", "spine3", "aggregate", "spine"), LinkClass::AggregateSpine),
            (link("U", "spine3", "agg1", "spine", "aggregate_hosting"), LinkClass::AggregateSpine),
            (link("I", "spine1", "leaf7", "spine", "leaf"), LinkClass::SpineLeaf),
            (link("I", "edge4", "core1", "edge_minion", "core"), LinkClass::CoreAggregateAccess),
            (link("I", "agg2", "edge4", "aggregate", "ext_edge"), LinkClass::CoreAggregateAccess),
            (link("I", "cache9", "core1", "cache", "core_p"), LinkClass::CoreCache),
            (link("I", "core1", "core2", "core", "ext_core"), LinkClass::CoreAggregateBorder),
            (link("I", "brd1", "brd2", "border", "border"), LinkClass::CoreAggregateBorder),
            (link("I", "agg1", "agg2", "aggregate", "aggregate"), LinkClass::CoreAggregateBorder),
            (link("I", "leaf1", "leaf2", "leaf", "leaf"), LinkClass::Unclassified),
            (link("U", "edge1", "isp", "edge", ""), LinkClass::Unclassified),
        ];

        for (facts, expected) in cases {
            assert_eq!(classify(&facts).classname, expected, "{:?}", facts);
        }
    }

    #[test]
    fn test_multi_role_hosts_resolved_before_rules() {
        let result = classify(&link("I", "sw1", "sw2", "edge,core", "leaf,cache"));
        assert_eq!(result.role_h, "core");
        assert_eq!(result.role_p, "leaf");
        assert_eq!(result.classname, LinkClass::Unclassified);

        let result = classify(&link("I", "sw1", "sw2", "leaf,edge", "office,aggregate"));
        assert_eq!(result.role_h, "leaf");
        assert_eq!(result.role_p, "aggregate");
        assert_eq!(result.classname, LinkClass::Unclassified);
    }

    #[test]
    fn test_classify_is_deterministic() {
        let facts = link("I", "spine1-agg", "leaf-spine2", "aggregate,edge", "core");
        let first = classify(&facts);
        for _ in 0..16 {
            assert_eq!(classify(&facts), first);
        }
        assert_eq!(first.classname, LinkClass::AggregateSpine);
    }
}
