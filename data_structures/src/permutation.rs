use crate::{chain::Hash, error::PermutationError};

/// Deterministic permutation of the peer indices `0..size`.
///
/// Every index `i` is ranked by `sha256(seed || i as little-endian u16)`, so every node using
/// the same seed walks the committee in the same order without exchanging any message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Permutation16 {
    permutation: Vec<u16>,
    cursor: usize,
}

impl Permutation16 {
    /// Create a permutation of `0..size` from `seed`.
    ///
    /// # Panics
    ///
    /// Panics if `size` is zero: a committee always has at least one member.
    pub fn new(size: u16, seed: &[u8]) -> Self {
        assert!(size > 0, "permutation of an empty committee");
        let mut perm = Permutation16 {
            permutation: (0..size).collect(),
            cursor: 0,
        };
        perm.shuffle(seed);

        perm
    }

    /// Build a permutation from an explicit sequence, checking that it is valid
    pub fn from_sequence(sequence: Vec<u16>) -> Result<Self, PermutationError> {
        if sequence.is_empty() || !valid_permutation(&sequence) {
            return Err(PermutationError::NotAPermutation {
                size: u16::try_from(sequence.len()).unwrap_or(u16::MAX),
                sequence,
            });
        }

        Ok(Permutation16 {
            permutation: sequence,
            cursor: 0,
        })
    }

    /// Reorder using a new seed and rewind the cursor
    pub fn shuffle(&mut self, seed: &[u8]) {
        let mut ranked: Vec<(Hash, u16)> = (0..self.size())
            .map(|i| (Hash::of_parts(&[seed, &i.to_le_bytes()[..]]), i))
            .collect();
        ranked.sort();
        self.permutation = ranked.into_iter().map(|(_, i)| i).collect();
        self.cursor = 0;
    }

    /// Number of elements
    pub fn size(&self) -> u16 {
        // The length always comes from a u16
        self.permutation.len() as u16
    }

    /// Element under the cursor
    pub fn current(&self) -> u16 {
        self.permutation[self.cursor]
    }

    /// Return the element under the cursor and advance it, wrapping around
    pub fn next(&mut self) -> u16 {
        let ret = self.current();
        self.cursor = (self.cursor + 1) % self.permutation.len();

        ret
    }

    /// Element following `value` in the sequence, wrapping around
    pub fn successor_of(&self, value: u16) -> Option<u16> {
        let pos = self.permutation.iter().position(|x| *x == value)?;

        Some(self.permutation[(pos + 1) % self.permutation.len()])
    }

    /// The whole sequence
    pub fn as_slice(&self) -> &[u16] {
        &self.permutation
    }
}

/// Whether `seq` contains every value in `0..seq.len()` exactly once
pub fn valid_permutation(seq: &[u16]) -> bool {
    let mut seen = vec![false; seq.len()];
    for &v in seq {
        match seen.get_mut(usize::from(v)) {
            Some(slot) if !*slot => *slot = true,
            _ => return false,
        }
    }

    true
}
