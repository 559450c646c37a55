use crate::prelude::*;
use crate::cache::{CacheState, DataCache};
use crate::device::{ConnectionState, Connector, DeviceSession, ModbusConnector, SessionSettings};
use crate::scheduler::{PollScheduler, PollSettings, PollStatus};
use crate::sunspec::{DeviceInfo, ModelRegistry, ModelSnapshot, PointValue, COMMON_MODEL_ID};

use {
    serde::Serialize,
    std::collections::BTreeMap,
    std::sync::Mutex,
    tokio_util::sync::CancellationToken,
};

#[derive(Clone, Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub connected: bool,
    pub connection_state: ConnectionState,
    pub models_configured: Vec<u16>,
    pub polling: bool,
    pub last_poll: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Cached snapshots together with the models the device reports.
#[derive(Clone, Debug, Serialize)]
pub struct CachedData {
    pub data: BTreeMap<u16, ModelSnapshot>,
    pub last_read_time: Option<DateTime<Utc>>,
    pub available_models: BTreeMap<u16, String>,
}

/// The operations an HTTP front end exposes, over one device.
pub struct Gateway {
    config: ConfigWrapper,
    session: Arc<DeviceSession>,
    cache: Arc<DataCache>,
    scheduler: PollScheduler,
    /// Polling stopped by `disconnect`, restarted by the next `connect`.
    resume: Mutex<Option<PollSettings>>,
}

impl Gateway {
    pub fn new(config: ConfigWrapper) -> Self {
        let inverter = config.inverter();
        Self::with_connector(config, ModbusConnector::new(inverter))
    }

    pub fn with_connector(config: ConfigWrapper, connector: impl Connector + 'static) -> Self {
        let inverter = config.inverter();
        let session = Arc::new(DeviceSession::new(
            connector,
            ModelRegistry::standard(),
            SessionSettings::from(&inverter),
        ));
        let cache = Arc::new(DataCache::new());
        let scheduler = PollScheduler::new(session.clone(), cache.clone());

        Self {
            config,
            session,
            cache,
            scheduler,
            resume: Mutex::new(None),
        }
    }

    fn resume(&self) -> std::sync::MutexGuard<'_, Option<PollSettings>> {
        self.resume.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn session(&self) -> &Arc<DeviceSession> {
        &self.session
    }

    pub fn cache(&self) -> &Arc<DataCache> {
        &self.cache
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.session.state()
    }

    /// Connects and resumes any polling that `disconnect` stopped.
    pub async fn connect(&self) -> Result<()> {
        self.session.connect().await?;

        let resume = self.resume().take();
        if let Some(settings) = resume {
            info!("resuming polling of models {:?}", settings.model_ids);
            self.scheduler.start(settings).await?;
        }

        Ok(())
    }

    /// Stops polling, then releases the device.
    pub async fn disconnect(&self) {
        if let Some(settings) = self.scheduler.stop().await {
            *self.resume() = Some(settings);
        }
        self.session.disconnect().await;
    }

    /// Identity from the Common model; the cached copy is used when present.
    pub async fn device_info(&self) -> Result<DeviceInfo> {
        if !self.session.is_connected() {
            return Err(Error::NotConnected);
        }

        match self.cache.get(COMMON_MODEL_ID) {
            Some(snapshot) => DeviceInfo::from_common(&snapshot),
            None => DeviceInfo::from_common(&self.session.read_model(COMMON_MODEL_ID).await?),
        }
    }

    pub fn list_available_models(&self) -> Result<BTreeMap<u16, String>> {
        if !self.session.is_connected() {
            return Err(Error::NotConnected);
        }
        Ok(self.session.available_models())
    }

    pub fn cached_data(&self) -> CachedData {
        let CacheState {
            data,
            last_read_time,
        } = self.cache.get_all();

        CachedData {
            data,
            last_read_time,
            available_models: self.session.available_models(),
        }
    }

    pub fn cached_model(&self, model_id: u16) -> Option<Arc<ModelSnapshot>> {
        self.cache.get(model_id)
    }

    /// Reads models straight from the device without touching the cache.
    ///
    /// Requested IDs must all be read; the first failure is returned. With no
    /// IDs given, the configured poll list is read and configured models the
    /// device does not carry are left out.
    pub async fn live_data(&self, model_ids: Option<&[u16]>) -> Result<BTreeMap<u16, ModelSnapshot>> {
        if !self.session.is_connected() {
            return Err(Error::NotConnected);
        }

        let (model_ids, requested) = match model_ids {
            Some(ids) => (ids.to_vec(), true),
            None => (self.config.models_to_read(), false),
        };

        let mut data = BTreeMap::new();
        for model_id in model_ids {
            match self.session.read_model(model_id).await {
                Ok(snapshot) => {
                    data.insert(model_id, snapshot);
                }
                Err(Error::ModelNotPresent(id)) if !requested => {
                    debug!("configured model {} is not on the device", id);
                }
                Err(e) => {
                    warn!("live read of model {} failed: {}", model_id, e);
                    return Err(e);
                }
            }
        }

        Ok(data)
    }

    pub async fn read_model(&self, model_id: u16) -> Result<ModelSnapshot> {
        self.session.read_model(model_id).await
    }

    pub async fn write_point(&self, model_id: u16, point: &str, value: &PointValue) -> Result<()> {
        self.session.write_point(model_id, point, value).await
    }

    // polling {{{
    pub fn polling_status(&self) -> PollStatus {
        self.scheduler.status()
    }

    /// Starts or restarts polling. `None` keeps the configured value.
    pub async fn start_polling(
        &self,
        model_ids: Option<Vec<u16>>,
        interval: Option<Duration>,
    ) -> Result<()> {
        let mut settings = PollSettings::from_config(&self.config.data_collection());
        if let Some(model_ids) = model_ids {
            settings.model_ids = model_ids;
        }
        if let Some(interval) = interval {
            settings.interval = interval;
        }

        self.scheduler.start(settings.clone()).await?;
        self.resume().take();
        self.config.set_polling(settings.model_ids, settings.interval);

        Ok(())
    }

    pub async fn stop_polling(&self) {
        self.scheduler.stop().await;
        self.resume().take();
    } // }}}

    pub fn health(&self) -> Health {
        let state = self.session.state();

        Health {
            status: if state == ConnectionState::Connected {
                "ok"
            } else {
                "degraded"
            },
            connected: state == ConnectionState::Connected,
            connection_state: state,
            models_configured: self.config.models_to_read(),
            polling: self.scheduler.is_running(),
            last_poll: self.cache.last_read_time(),
            last_error: self.session.last_error(),
        }
    }

    /// Reconnects a faulted session every `reconnect_delay` until cancelled.
    /// A deliberate disconnect is left alone.
    pub async fn supervise(&self, token: CancellationToken) {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(self.config.reconnect_delay()) => {}
            }

            if self.session.state() == ConnectionState::Faulted {
                info!("reconnecting after fault");
                if let Err(e) = self.session.connect().await {
                    warn!("reconnect failed: {}", e);
                }
            }
        }
    }

    pub async fn shutdown(&self) {
        info!("shutting down gateway");
        self.scheduler.stop().await;
        self.scheduler.stats().print_summary();
        self.session.disconnect().await;
    }
}
