//! Winner selection: re-verify every proposal, then take the lowest hash.

use shared::{
    hash,
    types::{Candidate, WorkUnit},
};
use tracing::*;

use crate::dispatch::RoundResult;

/// A worker's claim is accepted only if the hash recomputes to the reported
/// value and is below the target.
pub fn verify(work: &WorkUnit, candidate: &Candidate) -> bool {
    let recomputed = hash::compute(&work.block, candidate.nonce);
    if recomputed != candidate.hash {
        warn!(
            "worker {} reported a wrong hash for nonce {}",
            candidate.worker_id, candidate.nonce
        );
        return false;
    }
    if !hash::meets_target(&recomputed, &work.target) {
        warn!(
            "worker {} proposed nonce {} above target",
            candidate.worker_id, candidate.nonce
        );
        return false;
    }
    true
}

/// Lowest verified hash wins; equal hashes fall back to the lowest worker id.
pub fn select_winner(work: &WorkUnit, round: &RoundResult) -> Option<Candidate> {
    lowest(round.candidates.iter().filter(|candidate| verify(work, candidate))).cloned()
}

fn lowest<'a>(candidates: impl Iterator<Item = &'a Candidate>) -> Option<&'a Candidate> {
    candidates.min_by(|a, b| a.hash.cmp(&b.hash).then_with(|| a.worker_id.cmp(&b.worker_id)))
}

#[cfg(test)]
mod tests {
    use shared::{
        types::{NonceRange, WorkerId},
        U256,
    };

    use super::*;

    fn work(target: U256) -> WorkUnit {
        WorkUnit {
            block: "abc".into(),
            target,
            request_id: "r".into(),
            issued_at: 0,
            range: NonceRange::new(0, 99),
        }
    }

    fn honest(worker: &str, nonce: u64) -> Candidate {
        Candidate { worker_id: WorkerId::from(worker), nonce, hash: hash::compute("abc", nonce) }
    }

    fn round(candidates: Vec<Candidate>) -> RoundResult {
        RoundResult { candidates, ..RoundResult::new("r") }
    }

    #[test]
    fn lowest_hash_wins() {
        let mut candidates: Vec<_> = (0..3).map(|n| honest(&format!("w{n}"), n)).collect();
        let best = candidates.iter().min_by_key(|c| c.hash).unwrap().clone();
        candidates.reverse();

        assert_eq!(select_winner(&work(U256::MAX), &round(candidates)), Some(best));
    }

    #[test]
    fn lowest_is_numeric_not_lexical() {
        let with_prefix = |worker: &str, prefix: &str| Candidate {
            worker_id: WorkerId::from(worker),
            nonce: 0,
            hash: hash::parse_hex(&format!("{prefix:0<64}")).unwrap(),
        };
        let candidates = [with_prefix("a", "0f"), with_prefix("b", "02"), with_prefix("c", "9a")];
        assert_eq!(lowest(candidates.iter()).map(|c| c.worker_id.as_str()), Some("b"));
    }

    #[test]
    fn selection_ignores_arrival_order() {
        let candidates: Vec<_> = (0..5).map(|n| honest(&format!("w{n}"), n * 7)).collect();
        let forward = select_winner(&work(U256::MAX), &round(candidates.clone()));
        let mut reversed = candidates;
        reversed.reverse();
        assert_eq!(forward, select_winner(&work(U256::MAX), &round(reversed)));
    }

    #[test]
    fn equal_hashes_prefer_lower_worker_id() {
        let candidates = vec![honest("w9", 5), honest("w2", 5), honest("w5", 5)];
        let winner = select_winner(&work(U256::MAX), &round(candidates)).unwrap();
        assert_eq!(winner.worker_id, WorkerId::from("w2"));
    }

    #[test]
    fn forged_hash_is_rejected() {
        let mut forged = honest("liar", 1);
        forged.hash = U256::zero();
        let fair = honest("fair", 2);

        let winner = select_winner(&work(U256::MAX), &round(vec![forged, fair.clone()]));
        assert_eq!(winner, Some(fair));
    }

    #[test]
    fn candidate_above_target_is_rejected() {
        let candidate = honest("w", 3);
        let target = candidate.hash;
        assert_eq!(select_winner(&work(target), &round(vec![candidate.clone()])), None);
        assert_eq!(
            select_winner(&work(target + U256::one()), &round(vec![candidate.clone()])),
            Some(candidate)
        );
    }

    #[test]
    fn no_candidates_no_winner() {
        assert_eq!(select_winner(&work(U256::MAX), &RoundResult::new("r")), None);
    }

    #[test]
    fn zero_target_rejects_everyone() {
        let candidates = vec![honest("a", 1), honest("b", 2)];
        assert_eq!(select_winner(&work(U256::zero()), &round(candidates)), None);
    }
}
