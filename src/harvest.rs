use std::collections::BTreeMap;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;
use camino::Utf8PathBuf;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::Serialize;
use tracing::{debug, error, info};

use crate::catalog;
use crate::config::Config;
use crate::domain::{Kingdom, Organism};
use crate::error::KiraError;
use crate::eta::EtaEstimator;
use crate::fetch::{FetchService, HttpTransport};
use crate::gene::GeneProcessor;
use crate::organism::{OrganismPipeline, PlasmidCache, RunTally, TallySnapshot, summarize_cached};
use crate::parser::SideChannels;
use crate::progress::{ProgressSink, RunState, StatusHub};
use crate::stats::Gene;
use crate::store::{OrganismRecord, ResultStore, StoredNode};

#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn check(&self) -> Result<(), KiraError> {
        if self.is_cancelled() {
            Err(KiraError::Interrupted)
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    pub kingdoms: Vec<Kingdom>,
    pub bio_project: Option<String>,
    pub channels: SideChannels,
}

impl RunRequest {
    pub fn new(kingdoms: Vec<Kingdom>) -> Self {
        Self {
            kingdoms,
            ..Self::default()
        }
    }

    pub fn scheduled_kingdoms(&self) -> Vec<Kingdom> {
        let mut scheduled = Vec::new();
        for kingdom in &self.kingdoms {
            if !scheduled.contains(kingdom) {
                scheduled.push(*kingdom);
            }
        }
        scheduled
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KingdomSummary {
    pub kingdom: Kingdom,
    pub organisms: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub kingdoms: Vec<KingdomSummary>,
    pub eligible: u64,
    pub processed: TallySnapshot,
    pub api_degraded: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum RunOutcome {
    Finished(RunSummary),
    Interrupted(RunSummary),
    NothingToProcess,
}

impl RunOutcome {
    pub fn message(&self) -> &'static str {
        match self {
            RunOutcome::Finished(_) => "Update finished.",
            RunOutcome::Interrupted(_) => "Processing interrupted.",
            RunOutcome::NothingToProcess => "Nothing to process.",
        }
    }

    pub fn summary(&self) -> Option<&RunSummary> {
        match self {
            RunOutcome::Finished(summary) | RunOutcome::Interrupted(summary) => Some(summary),
            RunOutcome::NothingToProcess => None,
        }
    }
}

struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct Harvester<T: HttpTransport, S: ResultStore> {
    config: Config,
    fetch: FetchService<T>,
    store: S,
    status: Arc<StatusHub>,
    eta: EtaEstimator,
    pool: ThreadPool,
    running: AtomicBool,
    cancel: CancelToken,
}

impl<T: HttpTransport, S: ResultStore> Harvester<T, S> {
    pub fn new(
        config: Config,
        transport: T,
        store: S,
        sinks: Vec<Arc<dyn ProgressSink>>,
    ) -> Result<Self, KiraError> {
        config.validate()?;
        let status = Arc::new(StatusHub::new(sinks));
        let fetch = FetchService::new(transport, &config, Arc::clone(&status))?;
        let eta = EtaEstimator::new(Arc::clone(&status))?;
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.processing_workers())
            .thread_name(|index| format!("kira-cu-worker-{index}"))
            .build()
            .map_err(|err| KiraError::WorkerPool(err.to_string()))?;
        Ok(Self {
            config,
            fetch,
            store,
            status,
            eta,
            pool,
            running: AtomicBool::new(false),
            cancel: CancelToken::new(),
        })
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn status(&self) -> &Arc<StatusHub> {
        &self.status
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Runs one harvest to completion. Whatever the outcome, progress and the
    /// estimate are reset and the harvester can run again.
    pub fn run(&self, request: &RunRequest) -> Result<RunOutcome, KiraError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(KiraError::AlreadyRunning);
        }
        let _guard = RunningGuard(&self.running);
        self.cancel.reset();
        self.status.reset();
        self.eta.reset();

        let result = self.execute(request);
        let state = match &result {
            Ok(RunOutcome::Interrupted(_)) => RunState::Interrupted,
            Ok(_) => RunState::Done,
            Err(err) => {
                error!(error = %err, "harvest failed");
                RunState::Failed
            }
        };
        if let Ok(outcome) = &result {
            info!(state = %state, "{}", outcome.message());
        }
        self.status.set_state(state);
        self.eta.reset();
        self.status.reset();
        result
    }

    fn execute(&self, request: &RunRequest) -> Result<RunOutcome, KiraError> {
        self.status.set_state(RunState::FetchingKingdoms);
        let listings = match self.load_kingdoms(request) {
            Ok(listings) => listings,
            Err(KiraError::Interrupted) => {
                return Ok(RunOutcome::Interrupted(self.summarize(Vec::new(), 0, None)));
            }
            Err(err) => return Err(err),
        };

        let eligible: u64 = listings.iter().map(|(_, organisms)| organisms.len() as u64).sum();
        let kingdoms: Vec<KingdomSummary> = listings
            .iter()
            .map(|(kingdom, organisms)| KingdomSummary {
                kingdom: *kingdom,
                organisms: organisms.len(),
            })
            .collect();
        if eligible == 0 {
            return Ok(RunOutcome::NothingToProcess);
        }
        self.status.set_total(eligible);

        let genes = GeneProcessor::new(
            &self.fetch,
            &self.config,
            request.channels,
            Arc::clone(&self.status),
            self.cancel.clone(),
        );
        let plasmids = PlasmidCache::default();
        let tally = RunTally::default();
        let pipeline = OrganismPipeline {
            genes: &genes,
            store: &self.store,
            plasmids: &plasmids,
            status: &self.status,
            eta: &self.eta,
            tally: &tally,
            cancel: &self.cancel,
        };

        for (kingdom, organisms) in &listings {
            self.status.set_state(RunState::FanningOutOrganisms);
            info!(kingdom = %kingdom, organisms = organisms.len(), "processing kingdom");
            let result = self.pool.install(|| {
                organisms
                    .par_iter()
                    .try_for_each(|organism| pipeline.process(organism).map(|_| ()))
            });
            match result {
                Ok(()) => {}
                Err(KiraError::Interrupted) => {
                    let summary = self.summarize(kingdoms, eligible, Some(&tally));
                    return Ok(RunOutcome::Interrupted(summary));
                }
                Err(err) => return Err(err),
            }
        }

        Ok(RunOutcome::Finished(self.summarize(kingdoms, eligible, Some(&tally))))
    }

    fn summarize(
        &self,
        kingdoms: Vec<KingdomSummary>,
        eligible: u64,
        tally: Option<&RunTally>,
    ) -> RunSummary {
        RunSummary {
            kingdoms,
            eligible,
            processed: tally.map(RunTally::snapshot).unwrap_or_default(),
            api_degraded: self.fetch.is_degraded(),
        }
    }

    fn load_kingdoms(&self, request: &RunRequest) -> Result<Vec<(Kingdom, Vec<Organism>)>, KiraError> {
        let mut reports: HashMap<&'static str, String> = HashMap::new();
        let mut scheduled: HashSet<Utf8PathBuf> = HashSet::new();
        let mut listings = Vec::new();
        for kingdom in request.scheduled_kingdoms() {
            self.cancel.check()?;
            let report = match reports.entry(kingdom.listing_file()) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => entry.insert(self.fetch_report(kingdom)?),
            };
            let listed =
                catalog::load_organisms(report.as_bytes(), kingdom, request.bio_project.as_deref())?;
            let total = listed.len();
            // An organism is filed once even when several scopes list it.
            let organisms: Vec<Organism> = listed
                .into_iter()
                .filter(|organism| {
                    let path = organism.path.clone().unwrap_or_else(|| organism.default_path());
                    scheduled.insert(path)
                })
                .collect();
            if organisms.len() < total {
                debug!(
                    kingdom = %kingdom,
                    skipped = total - organisms.len(),
                    "organisms already scheduled by an earlier scope"
                );
            }
            info!(kingdom = %kingdom, organisms = organisms.len(), "kingdom listed");
            listings.push((kingdom, organisms));
        }
        self.cancel.check()?;
        Ok(listings)
    }

    fn fetch_report(&self, kingdom: Kingdom) -> Result<String, KiraError> {
        let url = format!(
            "{}/{}",
            self.config.catalog_base_url.trim_end_matches('/'),
            kingdom.listing_file()
        );
        let mut stream = self.fetch.fetch(&url)?;
        let mut text = String::new();
        stream
            .read_to_string(&mut text)
            .map_err(|err| KiraError::Stream(format!("{url}: {err}")))?;
        Ok(text)
    }

    pub fn resummarize(
        &self,
        organism: &Organism,
        genes: &BTreeMap<String, Gene>,
    ) -> Result<OrganismRecord, KiraError> {
        let record = summarize_cached(organism, genes);
        self.store.save(&record)?;
        Ok(record)
    }

    pub fn tree(&self, kingdom: Kingdom) -> Result<StoredNode, KiraError> {
        self.store.tree(kingdom)
    }
}
