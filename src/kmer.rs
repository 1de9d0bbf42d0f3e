use serde::ser::{Serialize, SerializeMap, Serializer};

pub const NUCLEOTIDES: [u8; 4] = *b"ACGT";

pub const DINUCLEOTIDE_KEYS: usize = 16;
pub const TRINUCLEOTIDE_KEYS: usize = 64;

pub type DinucleotideCounts = KmerCounts<DINUCLEOTIDE_KEYS>;
pub type TrinucleotideCounts = KmerCounts<TRINUCLEOTIDE_KEYS>;
pub type DinucleotideProbabilities = KmerProbabilities<DINUCLEOTIDE_KEYS>;
pub type TrinucleotideProbabilities = KmerProbabilities<TRINUCLEOTIDE_KEYS>;

pub fn nucleotide_index(base: u8) -> Option<usize> {
    match base {
        b'A' => Some(0),
        b'C' => Some(1),
        b'G' => Some(2),
        b'T' => Some(3),
        _ => None,
    }
}

pub fn is_nucleotide(base: u8) -> bool {
    nucleotide_index(base).is_some()
}

pub fn encode(kmer: &[u8]) -> Option<usize> {
    kmer.iter()
        .try_fold(0usize, |acc, &base| nucleotide_index(base).map(|idx| acc * 4 + idx))
}

pub fn decode(mut index: usize, k: usize) -> String {
    let mut bytes = vec![b'A'; k];
    for slot in bytes.iter_mut().rev() {
        *slot = NUCLEOTIDES[index % 4];
        index /= 4;
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

const fn kmer_len(slots: usize) -> usize {
    (slots.trailing_zeros() / 2) as usize
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KmerCounts<const N: usize>([u64; N]);

impl<const N: usize> Default for KmerCounts<N> {
    fn default() -> Self {
        Self([0; N])
    }
}

impl<const N: usize> KmerCounts<N> {
    pub const K: usize = kmer_len(N);

    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&mut self, kmer: &[u8]) -> bool {
        if kmer.len() != Self::K {
            return false;
        }
        match encode(kmer) {
            Some(index) => {
                self.0[index] += 1;
                true
            }
            None => false,
        }
    }

    pub fn increment_slot(&mut self, index: usize) {
        self.0[index] += 1;
    }

    pub fn get(&self, kmer: &str) -> Option<u64> {
        if kmer.len() != Self::K {
            return None;
        }
        encode(kmer.as_bytes()).map(|index| self.0[index])
    }

    pub fn total(&self) -> u64 {
        self.0.iter().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (String, u64)> + '_ {
        self.0
            .iter()
            .enumerate()
            .map(|(index, count)| (decode(index, Self::K), *count))
    }

    pub fn add(&mut self, other: &Self) {
        for (slot, value) in self.0.iter_mut().zip(other.0.iter()) {
            *slot += value;
        }
    }

    pub fn growth_since(&self, before: &Self) -> [u64; N] {
        let mut delta = [0; N];
        for (index, slot) in delta.iter_mut().enumerate() {
            *slot = self.0[index].saturating_sub(before.0[index]);
        }
        delta
    }

    pub fn probabilities(&self, total: u64) -> KmerProbabilities<N> {
        let mut probabilities = [0.0; N];
        if total > 0 {
            for (slot, count) in probabilities.iter_mut().zip(self.0.iter()) {
                *slot = *count as f64 / total as f64;
            }
        }
        KmerProbabilities(probabilities)
    }
}

impl<const N: usize> Serialize for KmerCounts<N> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(N))?;
        for (key, count) in self.iter() {
            map.serialize_entry(&key, &count)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KmerProbabilities<const N: usize>([f64; N]);

impl<const N: usize> Default for KmerProbabilities<N> {
    fn default() -> Self {
        Self([0.0; N])
    }
}

impl<const N: usize> KmerProbabilities<N> {
    pub const K: usize = kmer_len(N);

    pub fn get(&self, kmer: &str) -> Option<f64> {
        if kmer.len() != Self::K {
            return None;
        }
        encode(kmer.as_bytes()).map(|index| self.0[index])
    }

    pub fn sum(&self) -> f64 {
        self.0.iter().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (String, f64)> + '_ {
        self.0
            .iter()
            .enumerate()
            .map(|(index, value)| (decode(index, Self::K), *value))
    }
}

impl<const N: usize> Serialize for KmerProbabilities<N> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(N))?;
        for (key, value) in self.iter() {
            map.serialize_entry(&key, &value)?;
        }
        map.end()
    }
}
