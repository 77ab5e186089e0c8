//! Message shaping between the control surface, the engine and webhooks
//!
//! - `inbound`: normalize engine payloads into webhook event bodies
//! - `outbound`: typed send requests and their engine-native commands

pub mod inbound;
pub mod outbound;

/// Suffix of group ids
pub const GROUP_SUFFIX: &str = "@g.us";

/// Suffix of individual contact ids
pub const CONTACT_SUFFIX: &str = "@c.us";

/// Qualify a target id with the right suffix
///
/// Ids already carrying a suffix pass through; otherwise a hyphenated id is
/// a group (`<creator>-<timestamp>`) and anything else an individual.
pub fn normalize_target_id(id: &str) -> String {
    if id.contains(GROUP_SUFFIX) || id.contains(CONTACT_SUFFIX) {
        return id.to_string();
    }

    if id.contains('-') {
        format!("{}{}", id, GROUP_SUFFIX)
    } else {
        format!("{}{}", id, CONTACT_SUFFIX)
    }
}

/// Whether a (normalized or raw) id addresses a group
pub fn is_group_id(id: &str) -> bool {
    id.contains(GROUP_SUFFIX)
}
