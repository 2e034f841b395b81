//! Hash-chained transition history.
//!
//! Each record's digest is `sha256(prev_digest || canonical JSON body)` in
//! lowercase hex, where the body is every field except the two digests.
//! The first transition of an item chains from [`GENESIS_DIGEST`].

use coldchain_core::{Identity, Stage, Transition};
use coldchain_storage::TransitionRecord;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// `prev_digest` of an item's first transition.
pub const GENESIS_DIGEST: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// The hashed portion of a [`TransitionRecord`]. Field order is fixed by the
/// struct, which keeps the JSON canonical.
#[derive(Serialize)]
struct SealedBody<'a> {
    item_id: u64,
    transition: Transition,
    actor: &'a Identity,
    actor_sequence: u64,
    from_stage: Stage,
    to_stage: Stage,
    from_version: i64,
    to_version: i64,
    recorded_at: &'a str,
}

impl<'a> From<&'a TransitionRecord> for SealedBody<'a> {
    fn from(r: &'a TransitionRecord) -> Self {
        SealedBody {
            item_id: r.item_id,
            transition: r.transition,
            actor: &r.actor,
            actor_sequence: r.actor_sequence,
            from_stage: r.from_stage,
            to_stage: r.to_stage,
            from_version: r.from_version,
            to_version: r.to_version,
            recorded_at: &r.recorded_at,
        }
    }
}

/// Digest of `record`'s body chained onto `prev_digest`.
pub fn compute_digest(prev_digest: &str, record: &TransitionRecord) -> String {
    // Serializing plain integers, enums and strings cannot fail.
    let body = serde_json::to_vec(&SealedBody::from(record)).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(prev_digest.as_bytes());
    hasher.update(&body);
    format!("{:x}", hasher.finalize())
}

/// Fill in `prev_digest` and `digest` for a freshly built record.
pub fn seal(mut record: TransitionRecord, prev_digest: &str) -> TransitionRecord {
    record.prev_digest = prev_digest.to_string();
    record.digest = compute_digest(prev_digest, &record);
    record
}

/// The first point at which a history stops verifying.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BrokenLink {
    /// Position in the history, oldest first.
    pub index: usize,
    /// `"prev_digest"` when the record does not point at its predecessor,
    /// `"digest"` when its body no longer hashes to the stored digest.
    pub field: &'static str,
    pub expected: String,
    pub found: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryVerification {
    pub item_id: u64,
    pub transitions: usize,
    pub head: String,
    pub broken: Option<BrokenLink>,
}

impl HistoryVerification {
    pub fn is_intact(&self) -> bool {
        self.broken.is_none()
    }
}

/// Walk `records` oldest first and report the first broken link.
pub fn verify_chain(item_id: u64, records: &[TransitionRecord]) -> HistoryVerification {
    let mut prev = GENESIS_DIGEST.to_string();
    for (index, record) in records.iter().enumerate() {
        if record.prev_digest != prev {
            return HistoryVerification {
                item_id,
                transitions: records.len(),
                head: prev.clone(),
                broken: Some(BrokenLink {
                    index,
                    field: "prev_digest",
                    expected: prev,
                    found: record.prev_digest.clone(),
                }),
            };
        }
        let recomputed = compute_digest(&prev, record);
        if record.digest != recomputed {
            return HistoryVerification {
                item_id,
                transitions: records.len(),
                head: prev,
                broken: Some(BrokenLink {
                    index,
                    field: "digest",
                    expected: recomputed,
                    found: record.digest.clone(),
                }),
            };
        }
        prev = recomputed;
    }
    HistoryVerification {
        item_id,
        transitions: records.len(),
        head: prev,
        broken: None,
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn unsealed(transition: Transition, from_version: i64) -> TransitionRecord {
        TransitionRecord {
            item_id: 1,
            transition,
            actor: Identity::new("0xactor").unwrap(),
            actor_sequence: 1,
            from_stage: transition.from(),
            to_stage: transition.to(),
            from_version,
            to_version: from_version + 1,
            recorded_at: "2025-03-01T12:00:00Z".to_string(),
            prev_digest: String::new(),
            digest: String::new(),
        }
    }

    fn chain(n: usize) -> Vec<TransitionRecord> {
        let mut prev = GENESIS_DIGEST.to_string();
        Transition::ALL
            .iter()
            .take(n)
            .enumerate()
            .map(|(i, t)| {
                let sealed = seal(unsealed(*t, i as i64), &prev);
                prev = sealed.digest.clone();
                sealed
            })
            .collect()
    }

    #[test]
    fn genesis_is_64_zeros() {
        assert_eq!(GENESIS_DIGEST.len(), 64);
        assert!(GENESIS_DIGEST.chars().all(|c| c == '0'));
    }

    #[test]
    fn digest_is_deterministic_hex() {
        let r = unsealed(Transition::SupplyRawMaterials, 0);
        let a = compute_digest(GENESIS_DIGEST, &r);
        let b = compute_digest(GENESIS_DIGEST, &r);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn digest_depends_on_predecessor() {
        let r = unsealed(Transition::SupplyRawMaterials, 0);
        assert_ne!(compute_digest(GENESIS_DIGEST, &r), compute_digest("ab", &r));
    }

    #[test]
    fn full_chain_verifies() {
        let records = chain(5);
        let report = verify_chain(1, &records);
        assert!(report.is_intact(), "{report:?}");
        assert_eq!(report.transitions, 5);
        assert_eq!(report.head, records[4].digest);
    }

    #[test]
    fn empty_history_verifies_to_genesis() {
        let report = verify_chain(9, &[]);
        assert!(report.is_intact());
        assert_eq!(report.head, GENESIS_DIGEST);
    }

    #[test]
    fn tampered_body_is_detected() {
        let mut records = chain(3);
        records[1].actor_sequence = 7;
        let broken = verify_chain(1, &records).broken.unwrap();
        assert_eq!(broken.index, 1);
        assert_eq!(broken.field, "digest");
    }

    #[test]
    fn dropped_record_is_detected() {
        let mut records = chain(3);
        records.remove(1);
        let broken = verify_chain(1, &records).broken.unwrap();
        assert_eq!(broken.index, 1);
        assert_eq!(broken.field, "prev_digest");
    }
}
