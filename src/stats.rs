use std::collections::BTreeMap;

use camino::Utf8PathBuf;
use serde::Serialize;

use crate::domain::RepliconType;
use crate::kmer::{
    DinucleotideCounts, DinucleotideProbabilities, TRINUCLEOTIDE_KEYS, TrinucleotideCounts,
    TrinucleotideProbabilities,
};

pub const TRINUCLEOTIDE_PHASES: usize = 3;
pub const DINUCLEOTIDE_PHASES: usize = 2;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NucleotideStats {
    pub total_cds: u64,
    pub rejected_cds: u64,
    pub total_dinucleotides: u64,
    pub total_trinucleotides: u64,
    pub total_preferences: [u64; TRINUCLEOTIDE_PHASES],
    pub trinucleotides: [TrinucleotideCounts; TRINUCLEOTIDE_PHASES],
    pub trinucleotide_preferences: [TrinucleotideCounts; TRINUCLEOTIDE_PHASES],
    pub trinucleotide_probabilities: [TrinucleotideProbabilities; TRINUCLEOTIDE_PHASES],
    pub dinucleotides: [DinucleotideCounts; DINUCLEOTIDE_PHASES],
    pub dinucleotide_probabilities: [DinucleotideProbabilities; DINUCLEOTIDE_PHASES],
}

impl NucleotideStats {
    pub fn record_accepted(&mut self) {
        self.total_cds += 1;
    }

    pub fn record_rejected(&mut self) {
        self.total_cds += 1;
        self.rejected_cds += 1;
    }

    pub fn accepted_cds(&self) -> u64 {
        self.total_cds - self.rejected_cds
    }

    pub fn count_dinucleotides(&mut self, sequence: &[u8]) {
        let len = sequence.len();
        let tail = 3 + len % 2;
        let mut windows = 0;
        let mut i = 0;
        while i + tail <= len {
            self.dinucleotides[0].increment(&sequence[i..i + 2]);
            self.dinucleotides[1].increment(&sequence[i + 1..i + 3]);
            windows += 1;
            i += 2;
        }
        self.total_dinucleotides += windows;
    }

    pub fn count_trinucleotides(&mut self, sequence: &[u8]) {
        let before = self.trinucleotides;
        let len = sequence.len();
        let mut windows = 0;
        let mut i = 0;
        while i + 5 <= len {
            for (phase, counts) in self.trinucleotides.iter_mut().enumerate() {
                counts.increment(&sequence[i + phase..i + phase + 3]);
            }
            windows += 1;
            i += 3;
        }
        self.total_trinucleotides += windows;
        self.credit_preferences(&before);
    }

    // Ties credit every phase reaching the maximum, zero growth included.
    fn credit_preferences(&mut self, before: &[TrinucleotideCounts; TRINUCLEOTIDE_PHASES]) {
        let growth: [[u64; TRINUCLEOTIDE_KEYS]; TRINUCLEOTIDE_PHASES] =
            std::array::from_fn(|phase| self.trinucleotides[phase].growth_since(&before[phase]));
        for index in 0..TRINUCLEOTIDE_KEYS {
            let max = growth.iter().map(|phase| phase[index]).max().unwrap_or(0);
            for phase in 0..TRINUCLEOTIDE_PHASES {
                if growth[phase][index] == max {
                    self.trinucleotide_preferences[phase].increment_slot(index);
                    self.total_preferences[phase] += 1;
                }
            }
        }
    }

    pub fn count_sequence(&mut self, sequence: &[u8]) {
        self.count_dinucleotides(sequence);
        self.count_trinucleotides(sequence);
    }

    pub fn count_sequences<S: AsRef<[u8]>>(&mut self, sequences: &[S]) {
        for sequence in sequences {
            self.count_sequence(sequence.as_ref());
        }
    }

    /// Adds every counter and table entry of `other`. Probabilities are not
    /// added; call [`normalize`](Self::normalize) once aggregation is done.
    pub fn absorb(&mut self, other: &NucleotideStats) {
        self.total_cds += other.total_cds;
        self.rejected_cds += other.rejected_cds;
        self.total_dinucleotides += other.total_dinucleotides;
        self.total_trinucleotides += other.total_trinucleotides;
        for phase in 0..TRINUCLEOTIDE_PHASES {
            self.total_preferences[phase] += other.total_preferences[phase];
            self.trinucleotides[phase].add(&other.trinucleotides[phase]);
            self.trinucleotide_preferences[phase].add(&other.trinucleotide_preferences[phase]);
        }
        for phase in 0..DINUCLEOTIDE_PHASES {
            self.dinucleotides[phase].add(&other.dinucleotides[phase]);
        }
    }

    pub fn normalize(&mut self) {
        for phase in 0..TRINUCLEOTIDE_PHASES {
            self.trinucleotide_probabilities[phase] =
                self.trinucleotides[phase].probabilities(self.total_trinucleotides);
        }
        for phase in 0..DINUCLEOTIDE_PHASES {
            self.dinucleotide_probabilities[phase] =
                self.dinucleotides[phase].probabilities(self.total_dinucleotides);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Gene {
    pub accession: String,
    pub replicon: RepliconType,
    pub organism_path: Option<Utf8PathBuf>,
    #[serde(flatten)]
    pub stats: NucleotideStats,
}

impl Gene {
    pub fn new(
        accession: impl Into<String>,
        replicon: RepliconType,
        organism_path: Option<Utf8PathBuf>,
    ) -> Self {
        Self {
            accession: accession.into(),
            replicon,
            organism_path,
            stats: NucleotideStats::default(),
        }
    }

    pub fn reassigned(&self, organism_path: Option<Utf8PathBuf>) -> Self {
        Self {
            organism_path,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sum {
    pub replicon: RepliconType,
    pub organism_path: Option<Utf8PathBuf>,
    pub gene_count: usize,
    #[serde(flatten)]
    pub stats: NucleotideStats,
}

impl Sum {
    pub fn new(replicon: RepliconType, organism_path: Option<Utf8PathBuf>) -> Self {
        Self {
            replicon,
            organism_path,
            gene_count: 0,
            stats: NucleotideStats::default(),
        }
    }

    pub fn add(&mut self, gene: &Gene) {
        self.stats.absorb(&gene.stats);
        self.gene_count += 1;
    }
}

#[derive(Debug, Clone, Default)]
pub struct SumSet {
    organism_path: Option<Utf8PathBuf>,
    sums: BTreeMap<RepliconType, Sum>,
}

impl SumSet {
    pub fn new(organism_path: Option<Utf8PathBuf>) -> Self {
        Self {
            organism_path,
            sums: BTreeMap::new(),
        }
    }

    pub fn add(&mut self, gene: &Gene) {
        let path = &self.organism_path;
        self.sums
            .entry(gene.replicon)
            .or_insert_with(|| Sum::new(gene.replicon, path.clone()))
            .add(gene);
    }

    pub fn finish(self) -> Vec<Sum> {
        self.sums
            .into_values()
            .map(|mut sum| {
                sum.stats.normalize();
                sum
            })
            .collect()
    }
}

pub fn summarize<'a>(
    organism_path: Option<Utf8PathBuf>,
    genes: impl IntoIterator<Item = &'a Gene>,
) -> Vec<Sum> {
    let mut set = SumSet::new(organism_path);
    for gene in genes {
        set.add(gene);
    }
    set.finish()
}
