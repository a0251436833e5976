//! Topology role ranking
//!
//! Hosts may carry several comma-separated roles. The dominant one is the
//! highest-ranked recognized role; unrecognized roles rank 0.

/// Role returned when no listed role is recognized.
pub const UNCLASSIFIED_ROLE: &str = "unclassified";

/// Base rank per role name. Higher wins.
const ROLE_RANKS: &[(&str, u32)] = &[
    ("core", 100),
    ("aggregate", 40),
    ("border", 30),
    ("spine", 20),
    ("edge", 10),
    ("leaf", 10),
    ("cache", 10),
    ("peer", 1),
    ("uplink", 1),
    ("office", 1),
    (UNCLASSIFIED_ROLE, 0),
];

/// Edge-tier role names, including site-specific variants.
pub const EDGE_ROLES: &[&str] = &[
    "edge",
    "edge_minion",
    "ddos_edge",
    "edge_hadoop",
    "edge_hosting",
    "ext_edge",
];
pub const CORE_ROLES: &[&str] = &["core", "ext_core", "core_tarm_lan", "core_p"];
pub const AGGREGATE_ROLES: &[&str] = &["aggregate", "aggregate_hosting"];
pub const BORDER_ROLES: &[&str] = &["border"];
pub const CACHE_ROLES: &[&str] = &["cache"];

/// Rank of a single role name.
///
/// Tier variants (`ext_core`, `edge_hosting`, ...) rank as their tier.
pub fn role_rank(role: &str) -> u32 {
    let tier_base = if CORE_ROLES.contains(&role) {
        "core"
    } else if AGGREGATE_ROLES.contains(&role) {
        "aggregate"
    } else if EDGE_ROLES.contains(&role) {
        "edge"
    } else {
        role
    };

    ROLE_RANKS
        .iter()
        .find(|(name, _)| *name == tier_base)
        .map(|(_, rank)| *rank)
        .unwrap_or(0)
}

/// Reduce a raw role string to its dominant role.
///
/// A single role is returned unchanged. For a list, the first role with the
/// maximum rank wins; when every role ranks 0 the result is `unclassified`.
pub fn dominant_role(raw: &str) -> String {
    let roles: Vec<&str> = raw.split(',').map(str::trim).collect();
    if roles.len() <= 1 {
        return raw.to_string();
    }

    let mut best: Option<(&str, u32)> = None;
    for role in roles {
        let rank = role_rank(role);
        if rank == 0 {
            continue;
        }
        match best {
            Some((_, best_rank)) if best_rank >= rank => {}
            _ => best = Some((role, rank)),
        }
    }

    best.map(|(role, _)| role.to_string())
        .unwrap_or_else(|| UNCLASSIFIED_ROLE.to_string())
}
