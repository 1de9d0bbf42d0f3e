use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use rayon::prelude::*;
use serde::Serialize;
use tracing::info;

use crate::domain::{GeneRef, Kingdom, Organism, RepliconType};
use crate::error::KiraError;
use crate::eta::EtaEstimator;
use crate::fetch::HttpTransport;
use crate::gene::{GeneProcessor, GeneSlot};
use crate::harvest::CancelToken;
use crate::progress::{RunState, StatusHub};
use crate::stats::{Gene, summarize};
use crate::store::{OrganismRecord, ResultStore};

#[derive(Debug, Default)]
pub struct PlasmidCache {
    genes: Mutex<HashMap<String, Gene>>,
}

impl PlasmidCache {
    pub fn get(&self, accession: &str) -> Option<Gene> {
        self.genes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(accession)
            .cloned()
    }

    pub fn insert(&self, gene: &Gene) {
        self.genes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(gene.accession.clone())
            .or_insert_with(|| gene.clone());
    }

    pub fn len(&self) -> usize {
        self.genes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Default)]
pub struct RunTally {
    organisms: AtomicU64,
    genes: AtomicU64,
    missing: AtomicU64,
    reused: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TallySnapshot {
    pub organisms: u64,
    pub genes: u64,
    pub missing: u64,
    pub reused: u64,
}

impl RunTally {
    pub fn snapshot(&self) -> TallySnapshot {
        TallySnapshot {
            organisms: self.organisms.load(Ordering::SeqCst),
            genes: self.genes.load(Ordering::SeqCst),
            missing: self.missing.load(Ordering::SeqCst),
            reused: self.reused.load(Ordering::SeqCst),
        }
    }
}

fn uses_plasmid_cache(organism: &Organism, replicon: RepliconType) -> bool {
    organism.kingdom == Kingdom::Prokaryotes && replicon == RepliconType::Plasmid
}

pub fn assemble(organism: &Organism, slots: Vec<GeneSlot>) -> OrganismRecord {
    let mut genes = Vec::new();
    let mut missing = Vec::new();
    for slot in slots {
        match slot {
            GeneSlot::Ready(gene) => genes.push(gene),
            GeneSlot::Missing { gene, .. } => missing.push(gene),
        }
    }
    let sums = summarize(organism.path.clone(), &genes);
    OrganismRecord::new(organism.clone(), genes, missing, sums)
}

pub fn summarize_cached(organism: &Organism, genes: &BTreeMap<String, Gene>) -> OrganismRecord {
    let slots = genes
        .values()
        .map(|gene| GeneSlot::Ready(gene.reassigned(organism.path.clone())))
        .collect();
    assemble(organism, slots)
}

pub struct OrganismPipeline<'a, T: HttpTransport> {
    pub genes: &'a GeneProcessor<'a, T>,
    pub store: &'a dyn ResultStore,
    pub plasmids: &'a PlasmidCache,
    pub status: &'a StatusHub,
    pub eta: &'a EtaEstimator,
    pub tally: &'a RunTally,
    pub cancel: &'a CancelToken,
}

impl<T: HttpTransport> OrganismPipeline<'_, T> {
    pub fn process(&self, organism: &Organism) -> Result<OrganismRecord, KiraError> {
        self.cancel.check()?;
        self.status.set_state(RunState::FanningOutGenes);

        let gene_refs: Vec<_> = organism.reference_genes().collect();
        let slots = gene_refs
            .par_iter()
            .map(|gene_ref| self.resolve(organism, gene_ref))
            .collect::<Result<Vec<_>, _>>()?;
        self.cancel.check()?;

        self.status.set_state(RunState::Aggregating);
        let record = assemble(organism, slots);
        self.store.save(&record)?;

        self.tally.organisms.fetch_add(1, Ordering::SeqCst);
        self.tally
            .genes
            .fetch_add(record.genes.len() as u64, Ordering::SeqCst);
        self.tally
            .missing
            .fetch_add(record.missing.len() as u64, Ordering::SeqCst);
        let done = self.status.advance();
        self.eta.record(self.status.remaining());
        info!(
            organism = %organism.name,
            genes = record.genes.len(),
            missing = record.missing.len(),
            done,
            "organism processed"
        );
        Ok(record)
    }

    fn resolve(&self, organism: &Organism, gene_ref: &GeneRef) -> Result<GeneSlot, KiraError> {
        let cacheable = uses_plasmid_cache(organism, gene_ref.replicon);
        if cacheable {
            if let Some(gene) = self.plasmids.get(&gene_ref.accession) {
                self.tally.reused.fetch_add(1, Ordering::SeqCst);
                return Ok(GeneSlot::Ready(gene.reassigned(organism.path.clone())));
            }
        }
        let slot = self.genes.process(organism, gene_ref)?;
        if let (true, GeneSlot::Ready(gene)) = (cacheable, &slot) {
            self.plasmids.insert(gene);
        }
        Ok(slot)
    }
}
