//! Selection of the batch the leader proposes

use scchain_data_structures::{chain::RequestId, peer_set::PeerSet};

/// A request the leader could process, with the peers which notified it
#[derive(Clone, Copy, Debug)]
pub struct Candidate<'a> {
    /// Request
    pub request_id: RequestId,
    /// Peers which can process the request at the current state index
    pub notifications: &'a PeerSet,
}

/// Select the batch to propose from `candidates`, given in arrival order.
///
/// Only requests notified by at least `quorum` peers are considered. They are taken by
/// decreasing number of notifications, arrival order breaking ties, and intersected one by one;
/// the first request whose inclusion would leave less than `quorum` peers in the intersection
/// ends the batch. Every peer left in the intersection can process the whole batch.
///
/// The notifications are taken as given: the operator folds the leader's own notification into
/// every ready request before calling this, so it always counts towards the quorum.
pub fn select_batch(candidates: &[Candidate<'_>], quorum: u16) -> Vec<RequestId> {
    let quorum = usize::from(quorum);
    let mut sorted: Vec<&Candidate<'_>> = candidates
        .iter()
        .filter(|c| c.notifications.count_seen() >= quorum)
        .collect();
    // Stable sort keeps arrival order among requests with as many notifications
    sorted.sort_by(|a, b| b.notifications.count_seen().cmp(&a.notifications.count_seen()));

    let mut iter = sorted.into_iter();
    let first = match iter.next() {
        Some(first) => first,
        None => return vec![],
    };
    let mut intersection = first.notifications.clone();
    let mut batch = vec![first.request_id];
    for candidate in iter {
        let next = intersection.intersect(candidate.notifications);
        if next.count_seen() < quorum {
            break;
        }
        intersection = next;
        batch.push(candidate.request_id);
    }

    batch
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(size: u16, members: &[u16]) -> PeerSet {
        let mut s = PeerSet::new(size);
        for m in members {
            s.mark_seen(*m);
        }
        s
    }

    #[test]
    fn nothing_to_select() {
        assert!(select_batch(&[], 3).is_empty());
    }

    #[test]
    fn below_quorum_is_skipped() {
        let a = set(4, &[0, 1]);
        let b = set(4, &[0, 1, 2]);
        let candidates = [
            Candidate {
                request_id: RequestId([1; 16]),
                notifications: &a,
            },
            Candidate {
                request_id: RequestId([2; 16]),
                notifications: &b,
            },
        ];

        assert_eq!(select_batch(&candidates, 3), vec![RequestId([2; 16])]);
    }

    #[test]
    fn most_notified_request_seeds_the_intersection() {
        let a = set(4, &[0, 1, 2]);
        let b = set(4, &[0, 1, 2, 3]);
        let c = set(4, &[1, 2, 3]);
        let candidates = [
            Candidate {
                request_id: RequestId([1; 16]),
                notifications: &a,
            },
            Candidate {
                request_id: RequestId([2; 16]),
                notifications: &b,
            },
            Candidate {
                request_id: RequestId([3; 16]),
                notifications: &c,
            },
        ];

        // b first, then a (arrived before c); {0,1,2} ∩ {1,2,3} has only two peers
        assert_eq!(
            select_batch(&candidates, 3),
            vec![RequestId([2; 16]), RequestId([1; 16])]
        );
    }

    #[test]
    fn batch_is_processable_by_a_quorum() {
        use rand::Rng;

        let mut rng = rand::thread_rng();
        for _ in 0..500 {
            let size = rng.gen_range(1, 12);
            let quorum = rng.gen_range(1, size + 1);
            let sets: Vec<PeerSet> = (0..rng.gen_range(0, 10))
                .map(|_| {
                    let members: Vec<u16> = (0..size).filter(|_| rng.gen_bool(0.7)).collect();
                    set(size, &members)
                })
                .collect();
            let candidates: Vec<Candidate<'_>> = sets
                .iter()
                .enumerate()
                .map(|(i, s)| Candidate {
                    request_id: RequestId([i as u8; 16]),
                    notifications: s,
                })
                .collect();

            let batch = select_batch(&candidates, quorum);
            let mut intersection = PeerSet::full(size);
            for id in &batch {
                let c = candidates.iter().find(|c| c.request_id == *id).unwrap();
                intersection.intersect_with(c.notifications);
            }
            if !batch.is_empty() {
                assert!(intersection.count_seen() >= usize::from(quorum));
            }
            let any_eligible = sets.iter().any(|s| s.count_seen() >= usize::from(quorum));
            assert_eq!(batch.is_empty(), !any_eligible);
        }
    }

    #[test]
    fn notification_count_decides_inclusion() {
        // A request notified by nodes 1 and 2 of a 4 node committee with quorum 3
        let mut notified = set(4, &[1, 2]);
        let id = RequestId([9; 16]);
        let select = |n: &PeerSet| {
            select_batch(
                &[Candidate {
                    request_id: id,
                    notifications: n,
                }],
                3,
            )
        };
        assert!(select(&notified).is_empty());

        notified.mark_seen(3);
        assert_eq!(select(&notified), vec![id]);

        notified.unmark(2);
        assert!(select(&notified).is_empty());
    }
}
