use crate::prelude::*;
use crate::cache::DataCache;
use crate::device::{ConnectionState, DeviceSession};
use crate::sunspec::ModelSnapshot;

use {
    serde::Serialize,
    std::collections::BTreeMap,
    std::sync::Mutex,
    tokio::task::JoinHandle,
    tokio::time::MissedTickBehavior,
    tokio_util::sync::CancellationToken,
};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PollSettings {
    pub model_ids: Vec<u16>,
    #[serde(rename = "interval_seconds", serialize_with = "as_secs")]
    pub interval: Duration,
    pub max_retries: u32,
    #[serde(skip)]
    pub retry_delay: Duration,
}

fn as_secs<S: serde::Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_secs())
}

impl PollSettings {
    pub fn from_config(dc: &config::DataCollection) -> Self {
        Self {
            model_ids: dc.models_to_read.clone(),
            interval: dc.poll_interval,
            max_retries: dc.max_retries,
            retry_delay: dc.retry_delay,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(Error::Configuration("poll interval must be positive".to_string()));
        }
        if self.model_ids.is_empty() {
            return Err(Error::Configuration("no models to poll".to_string()));
        }
        Ok(())
    }
}

// PollStats {{{
#[derive(Clone, Debug, Default, Serialize)]
pub struct PollStats {
    pub cycles: u64,
    pub cycles_skipped: u64,
    pub reads_ok: u64,
    pub reads_failed: u64,
    pub retries: u64,
    pub last_cycle: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    /// Most recent failure per model, cleared on its next successful read.
    pub last_errors: BTreeMap<u16, String>,
}

impl PollStats {
    pub fn print_summary(&self) {
        info!("Poll Statistics:");
        info!("  Cycles run: {}", self.cycles);
        info!("  Cycles skipped (not connected): {}", self.cycles_skipped);
        info!("  Model reads:");
        info!("    Succeeded: {}", self.reads_ok);
        info!("    Failed: {}", self.reads_failed);
        info!("    Retries: {}", self.retries);
        if let Some(err) = &self.last_error {
            info!("  Last error: {}", err);
        }
        if !self.last_errors.is_empty() {
            info!("  Last errors by model:");
            for (model_id, err) in &self.last_errors {
                info!("    {}: {}", model_id, err);
            }
        }
    }
} // }}}

/// Outcome of one poll cycle.
#[derive(Debug, Default)]
pub struct CycleReport {
    pub skipped: bool,
    pub published: Vec<u16>,
    pub failed: BTreeMap<u16, Error>,
}

#[derive(Clone, Debug, Serialize)]
pub struct PollStatus {
    pub running: bool,
    pub settings: Option<PollSettings>,
    pub last_read_time: Option<DateTime<Utc>>,
    pub stats: PollStats,
}

// PollWorker {{{
#[derive(Clone)]
struct PollWorker {
    session: Arc<DeviceSession>,
    cache: Arc<DataCache>,
    stats: Arc<Mutex<PollStats>>,
}

impl PollWorker {
    fn stats(&self) -> std::sync::MutexGuard<'_, PollStats> {
        self.stats.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn run(self, settings: PollSettings, token: CancellationToken) {
        let mut interval = tokio::time::interval(settings.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "polling models {:?} every {}s",
            settings.model_ids,
            settings.interval.as_secs()
        );

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = interval.tick() => {}
            }

            // a started cycle runs to completion
            self.run_cycle(&settings).await;
        }

        debug!("poll loop exiting");
    }

    async fn run_cycle(&self, settings: &PollSettings) -> CycleReport {
        let mut report = CycleReport::default();

        let state = self.session.state();
        if state != ConnectionState::Connected {
            debug!("skipping poll cycle, session {:?}", state);
            self.stats().cycles_skipped += 1;
            report.skipped = true;
            return report;
        }

        for model_id in &settings.model_ids {
            match self.read_with_retry(*model_id, settings).await {
                Ok(snapshot) => {
                    self.cache.publish(snapshot);
                    let mut stats = self.stats();
                    stats.reads_ok += 1;
                    stats.last_errors.remove(model_id);
                    report.published.push(*model_id);
                }
                Err(e) => {
                    warn!("poll of model {} failed: {}", model_id, e);
                    let mut stats = self.stats();
                    stats.reads_failed += 1;
                    stats.last_error = Some(format!("model {}: {}", model_id, e));
                    stats.last_errors.insert(*model_id, e.to_string());
                    report.failed.insert(*model_id, e);
                }
            }
        }

        let mut stats = self.stats();
        stats.cycles += 1;
        stats.last_cycle = Some(Utc::now());

        report
    }

    /// Transient errors are retried up to `max_retries` times; others fail at once.
    async fn read_with_retry(&self, model_id: u16, settings: &PollSettings) -> Result<ModelSnapshot> {
        let mut attempt = 0;

        loop {
            match self.session.read_model(model_id).await {
                Ok(snapshot) => return Ok(snapshot),
                Err(e) if e.is_transient() && attempt < settings.max_retries => {
                    attempt += 1;
                    debug!(
                        "model {} read failed ({}), retry {}/{}",
                        model_id, e, attempt, settings.max_retries
                    );
                    self.stats().retries += 1;
                    tokio::time::sleep(settings.retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
} // }}}

struct Running {
    settings: PollSettings,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

// PollScheduler {{{
/// Owns the background poll task. The task is the only writer to the cache.
pub struct PollScheduler {
    worker: PollWorker,
    running: tokio::sync::Mutex<Option<Running>>,
    settings: Mutex<Option<PollSettings>>,
}

impl PollScheduler {
    pub fn new(session: Arc<DeviceSession>, cache: Arc<DataCache>) -> Self {
        Self {
            worker: PollWorker {
                session,
                cache,
                stats: Arc::new(Mutex::new(PollStats::default())),
            },
            running: tokio::sync::Mutex::new(None),
            settings: Mutex::new(None),
        }
    }

    /// Starts polling, replacing any loop running with different settings.
    pub async fn start(&self, settings: PollSettings) -> Result<()> {
        settings.validate()?;

        let mut running = self.running.lock().await;
        if let Some(current) = running.as_ref() {
            if current.settings == settings && !current.handle.is_finished() {
                debug!("polling already running with these settings");
                return Ok(());
            }
        }
        if let Some(previous) = running.take() {
            Self::halt(previous).await;
        }

        let token = CancellationToken::new();
        let handle = tokio::spawn(self.worker.clone().run(settings.clone(), token.clone()));

        *self.settings.lock().unwrap_or_else(|e| e.into_inner()) = Some(settings.clone());
        *running = Some(Running {
            settings,
            token,
            handle,
        });

        Ok(())
    }

    /// Stops polling and waits for an in-flight cycle to finish. Returns the
    /// settings of the loop that was stopped; a no-op when already stopped.
    pub async fn stop(&self) -> Option<PollSettings> {
        let mut running = self.running.lock().await;
        self.settings.lock().unwrap_or_else(|e| e.into_inner()).take();

        let previous = running.take()?;
        let settings = previous.settings.clone();
        Self::halt(previous).await;
        info!("polling stopped");

        Some(settings)
    }

    async fn halt(running: Running) {
        running.token.cancel();
        if let Err(e) = running.handle.await {
            error!("poll task ended abnormally: {}", e);
        }
    }

    pub fn is_running(&self) -> bool {
        if self.settings.lock().unwrap_or_else(|e| e.into_inner()).is_none() {
            return false;
        }
        match self.running.try_lock() {
            Ok(running) => running.as_ref().map_or(false, |r| !r.handle.is_finished()),
            // start holds the lock while it replaces the loop
            Err(_) => true,
        }
    }

    /// Runs a single cycle on the caller's task.
    pub async fn poll_now(&self, settings: &PollSettings) -> CycleReport {
        self.worker.run_cycle(settings).await
    }

    pub fn stats(&self) -> PollStats {
        self.worker.stats().clone()
    }

    pub fn status(&self) -> PollStatus {
        PollStatus {
            running: self.is_running(),
            settings: self.settings.lock().unwrap_or_else(|e| e.into_inner()).clone(),
            last_read_time: self.worker.cache.last_read_time(),
            stats: self.stats(),
        }
    }
} // }}}
