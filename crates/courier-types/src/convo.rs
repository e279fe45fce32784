use std::fmt;

use uuid::Uuid;

/// Canonical key for a pairwise conversation: the two participant ids
/// sorted and joined with `_`. Both directions of a pair map to the same
/// key, so clients can bucket live-pushed messages before (or without)
/// knowing the server-assigned conversation id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConversationKey(String);

impl ConversationKey {
    pub fn new(a: Uuid, b: Uuid) -> Self {
        let (lo, hi) = sorted_pair(a, b);
        Self(format!("{lo}_{hi}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Orders a participant pair. Uuid's byte order matches the order of its
/// hyphenated string form, so this agrees with the storage layer's
/// `(participant_lo, participant_hi)` columns.
pub fn sorted_pair(a: Uuid, b: Uuid) -> (Uuid, Uuid) {
    if a <= b { (a, b) } else { (b, a) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_order_independent() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        assert_eq!(ConversationKey::new(a, b), ConversationKey::new(b, a));
    }

    #[test]
    fn key_joins_sorted_ids() {
        let a: Uuid = "00000000-0000-0000-0000-0000000000aa".parse().unwrap();
        let b: Uuid = "00000000-0000-0000-0000-0000000000bb".parse().unwrap();

        let key = ConversationKey::new(b, a);
        assert_eq!(key.as_str(), format!("{a}_{b}"));
    }
}
