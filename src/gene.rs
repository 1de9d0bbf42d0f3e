use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{Datelike, Local, NaiveDate};
use tracing::{debug, warn};

use crate::config::Config;
use crate::domain::{GeneRef, Organism, is_reference_accession};
use crate::error::KiraError;
use crate::fetch::{FetchService, HttpTransport};
use crate::harvest::CancelToken;
use crate::parser::{self, RawSinks, SideChannels};
use crate::progress::StatusHub;
use crate::stats::Gene;

#[derive(Debug)]
pub struct RetryLedger {
    ceiling: u32,
    attempts: Mutex<HashMap<String, u32>>,
}

impl RetryLedger {
    pub fn new(ceiling: u32) -> Self {
        Self {
            ceiling,
            attempts: Mutex::new(HashMap::new()),
        }
    }

    pub fn record_failure(&self, accession: &str) -> bool {
        if !is_reference_accession(accession) {
            return false;
        }
        let mut attempts = self
            .attempts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let count = attempts.entry(accession.to_string()).or_insert(0);
        if *count >= self.ceiling {
            return false;
        }
        *count += 1;
        *count < self.ceiling
    }

    pub fn failures(&self, accession: &str) -> u32 {
        self.attempts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(accession)
            .copied()
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone)]
pub enum GeneSlot {
    Ready(Gene),
    Missing { gene: GeneRef, reason: String },
}

pub fn replicon_url(base_url: &str, accession: &str, updated: Option<NaiveDate>) -> String {
    let date = updated.unwrap_or_else(|| Local::now().date_naive());
    format!(
        "{}/{}/{}_{}_{}",
        base_url.trim_end_matches('/'),
        accession,
        date.year(),
        date.month(),
        date.day()
    )
}

pub struct GeneProcessor<'a, T: HttpTransport> {
    fetch: &'a FetchService<T>,
    config: &'a Config,
    channels: SideChannels,
    ledger: RetryLedger,
    status: Arc<StatusHub>,
    cancel: CancelToken,
}

impl<'a, T: HttpTransport> GeneProcessor<'a, T> {
    pub fn new(
        fetch: &'a FetchService<T>,
        config: &'a Config,
        channels: SideChannels,
        status: Arc<StatusHub>,
        cancel: CancelToken,
    ) -> Self {
        Self {
            fetch,
            config,
            channels,
            ledger: RetryLedger::new(config.gene_retry_ceiling),
            status,
            cancel,
        }
    }

    /// Processes one gene, retrying failed reference accessions until the
    /// ceiling is reached. Only cancellation is returned as an error.
    pub fn process(&self, organism: &Organism, gene_ref: &GeneRef) -> Result<GeneSlot, KiraError> {
        loop {
            self.cancel.check()?;
            let err = match self.attempt(organism, gene_ref) {
                Ok(gene) => return Ok(GeneSlot::Ready(gene)),
                Err(KiraError::Interrupted) => return Err(KiraError::Interrupted),
                Err(err) => err,
            };
            if self.ledger.record_failure(&gene_ref.accession) {
                debug!(
                    accession = %gene_ref.accession,
                    attempt = self.ledger.failures(&gene_ref.accession),
                    error = %err,
                    "retrying gene"
                );
                continue;
            }
            let reason = if gene_ref.is_reference() {
                KiraError::RetryExhausted(gene_ref.accession.clone()).to_string()
            } else {
                err.to_string()
            };
            warn!(accession = %gene_ref.accession, error = %err, "gene left out");
            return Ok(GeneSlot::Missing {
                gene: gene_ref.clone(),
                reason,
            });
        }
    }

    fn attempt(&self, organism: &Organism, gene_ref: &GeneRef) -> Result<Gene, KiraError> {
        let label = format!("{} ({})", gene_ref.accession, organism.kingdom.label());
        self.status.downloading(&label);

        let url = replicon_url(
            &self.config.replicon_base_url,
            &gene_ref.accession,
            organism.updated,
        );
        let stream = self.fetch.fetch(&url)?;
        self.cancel.check()?;
        self.status.downloaded(&label);

        let mut gene = Gene::new(&gene_ref.accession, gene_ref.replicon, organism.path.clone());
        let mut sinks = RawSinks::open(
            self.config,
            self.channels,
            organism.path.as_deref(),
            &gene_ref.accession,
        )?;
        let sequences =
            parser::extract_sequences(stream, &gene_ref.accession, &mut gene.stats, &mut sinks)?;
        sinks.finish()?;

        gene.stats.count_sequences(&sequences);
        gene.stats.normalize();
        Ok(gene)
    }
}
