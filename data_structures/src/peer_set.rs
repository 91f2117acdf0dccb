use std::fmt;

const WORD_BITS: usize = 64;

/// Fixed-size set of peer indices of one committee.
///
/// Used to record which peers notified a request, which acknowledged a round, which are alive.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PeerSet {
    size: u16,
    words: Vec<u64>,
}

impl PeerSet {
    /// Empty set for a committee of `size` peers
    pub fn new(size: u16) -> Self {
        let words = (usize::from(size) + WORD_BITS - 1) / WORD_BITS;

        PeerSet {
            size,
            words: vec![0; words],
        }
    }

    /// Set containing every peer of the committee
    pub fn full(size: u16) -> Self {
        let mut set = Self::new(size);
        for i in 0..size {
            set.mark_seen(i);
        }

        set
    }

    /// Committee size
    pub fn size(&self) -> u16 {
        self.size
    }

    fn locate(&self, index: u16) -> (usize, u64) {
        assert!(
            index < self.size,
            "peer index {} out of range for committee of {}",
            index,
            self.size
        );
        let i = usize::from(index);

        (i / WORD_BITS, 1 << (i % WORD_BITS))
    }

    /// Add `index` to the set. Returns whether it was absent.
    pub fn mark_seen(&mut self, index: u16) -> bool {
        let (w, bit) = self.locate(index);
        let absent = self.words[w] & bit == 0;
        self.words[w] |= bit;

        absent
    }

    /// Remove `index` from the set
    pub fn unmark(&mut self, index: u16) {
        let (w, bit) = self.locate(index);
        self.words[w] &= !bit;
    }

    /// Whether `index` belongs to the set
    pub fn is_seen(&self, index: u16) -> bool {
        let (w, bit) = self.locate(index);
        self.words[w] & bit != 0
    }

    /// Number of peers in the set
    pub fn count_seen(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    /// Intersection of two sets of the same committee
    pub fn intersect(&self, other: &PeerSet) -> PeerSet {
        let mut ret = self.clone();
        ret.intersect_with(other);

        ret
    }

    /// In-place intersection
    pub fn intersect_with(&mut self, other: &PeerSet) {
        assert_eq!(self.size, other.size, "intersecting sets of different committees");
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            *a &= *b;
        }
    }

    /// Remove every peer
    pub fn clear(&mut self) {
        for w in &mut self.words {
            *w = 0;
        }
    }

    /// Peer indices in the set, in increasing order
    pub fn iter(&self) -> impl Iterator<Item = u16> + '_ {
        (0..self.size).filter(move |i| self.is_seen(*i))
    }
}

impl fmt::Debug for PeerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}
