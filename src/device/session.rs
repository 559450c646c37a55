use crate::prelude::*;
use crate::device::discovery::{self, DiscoveryOptions};
use crate::device::transport::{
    with_timeout, Connector, ModbusConnector, RegisterTransport, MAX_READ_REGISTERS,
};
use crate::sunspec::{self, ModelInstance, ModelRegistry, ModelSnapshot, PointValue};

use {
    num_enum::{IntoPrimitive, TryFromPrimitive},
    serde::Serialize,
    std::collections::BTreeMap,
    std::sync::atomic::{AtomicU8, Ordering},
    std::sync::{Mutex, RwLock},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, IntoPrimitive, TryFromPrimitive, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// The link failed; a reconnect is needed before further I/O.
    Faulted,
}

#[derive(Clone, Debug)]
pub struct SessionSettings {
    /// Upper bound on any single transport operation.
    pub timeout: Duration,
    pub base_address: Option<u16>,
    pub max_scan_registers: u32,
}

impl From<&config::Inverter> for SessionSettings {
    fn from(inverter: &config::Inverter) -> Self {
        Self {
            timeout: inverter.timeout(),
            base_address: inverter.base_address,
            max_scan_registers: inverter.max_scan_registers,
        }
    }
}

/// One device and its model layout. Transport access is serialised by an
/// async mutex; state and the discovered layout are readable without it.
pub struct DeviceSession {
    connector: Box<dyn Connector>,
    registry: ModelRegistry,
    settings: SessionSettings,
    state: AtomicU8,
    transport: tokio::sync::Mutex<Option<Box<dyn RegisterTransport>>>,
    instances: RwLock<Vec<ModelInstance>>,
    last_error: Mutex<Option<String>>,
}

type Link<'a> = tokio::sync::MutexGuard<'a, Option<Box<dyn RegisterTransport>>>;

impl DeviceSession {
    pub fn new(
        connector: impl Connector + 'static,
        registry: ModelRegistry,
        settings: SessionSettings,
    ) -> Self {
        Self {
            connector: Box::new(connector),
            registry,
            settings,
            state: AtomicU8::new(ConnectionState::Disconnected.into()),
            transport: tokio::sync::Mutex::new(None),
            instances: RwLock::new(Vec::new()),
            last_error: Mutex::new(None),
        }
    }

    pub fn from_config(inverter: &config::Inverter) -> Self {
        Self::new(
            ModbusConnector::new(inverter.clone()),
            ModelRegistry::standard(),
            SessionSettings::from(inverter),
        )
    }

    // state {{{
    pub fn state(&self) -> ConnectionState {
        ConnectionState::try_from(self.state.load(Ordering::Acquire))
            .unwrap_or(ConnectionState::Faulted)
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    fn set_state(&self, state: ConnectionState) {
        let old = self.state.swap(state.into(), Ordering::AcqRel);
        if old != u8::from(state) {
            debug!("session {}: {:?}", self.connector.describe(), state);
        }
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn set_last_error(&self, err: Option<&Error>) {
        *self.last_error.lock().unwrap_or_else(|e| e.into_inner()) = err.map(|e| e.to_string());
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Model instances found by the last successful discovery, in device order.
    pub fn instances(&self) -> Vec<ModelInstance> {
        self.instances.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn set_instances(&self, instances: Vec<ModelInstance>) {
        *self.instances.write().unwrap_or_else(|e| e.into_inner()) = instances;
    }

    /// First instance of `model_id`; later duplicates are not addressable.
    pub fn instance(&self, model_id: u16) -> Result<ModelInstance> {
        self.instances
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|i| i.model_id == model_id)
            .copied()
            .ok_or(Error::ModelNotPresent(model_id))
    }

    /// Discovered model IDs mapped to their names, unknown IDs included.
    pub fn available_models(&self) -> BTreeMap<u16, String> {
        self.instances()
            .iter()
            .map(|i| (i.model_id, self.registry.name_of(i.model_id)))
            .collect()
    } // }}}

    // connect {{{
    /// Opens the link and discovers the model layout. Any existing link is
    /// closed first; the layout is replaced only when discovery succeeds.
    pub async fn connect(&self) -> Result<()> {
        let mut link = self.transport.lock().await;
        self.close_link(&mut link).await;

        info!("connecting to {}", self.connector.describe());
        self.set_state(ConnectionState::Connecting);

        let mut transport = match with_timeout(
            self.settings.timeout,
            "opening connection",
            self.connector.open(),
        )
        .await
        {
            Ok(transport) => transport,
            Err(e) => return Err(self.fail_connect(e)),
        };

        match discovery::discover(&mut *transport, &self.discovery_options()).await {
            Ok(instances) => {
                info!(
                    "connected to {}, {} models: {:?}",
                    self.connector.describe(),
                    instances.len(),
                    instances.iter().map(|i| i.model_id).collect::<Vec<_>>()
                );
                self.set_instances(instances);
                *link = Some(transport);
                self.set_last_error(None);
                self.set_state(ConnectionState::Connected);
                Ok(())
            }
            Err(e) => {
                if let Err(close_err) = transport.close().await {
                    debug!("closing after failed discovery: {}", close_err);
                }
                Err(self.fail_connect(e))
            }
        }
    }

    fn fail_connect(&self, err: Error) -> Error {
        warn!("connection to {} failed: {}", self.connector.describe(), err);
        self.set_last_error(Some(&err));
        self.set_state(ConnectionState::Faulted);
        err
    }

    fn discovery_options(&self) -> DiscoveryOptions {
        DiscoveryOptions {
            base_address: self.settings.base_address,
            max_scan_registers: self.settings.max_scan_registers,
            timeout: self.settings.timeout,
        }
    }

    /// Re-runs discovery on the open link.
    pub async fn discover(&self) -> Result<Vec<ModelInstance>> {
        let mut link = self.transport.lock().await;
        let transport = self.connected(&mut link).await?;

        match discovery::discover(transport, &self.discovery_options()).await {
            Ok(instances) => {
                self.set_instances(instances.clone());
                Ok(instances)
            }
            Err(e) => {
                self.note_failure(&mut link, &e).await;
                Err(e)
            }
        }
    }

    /// Releases the link. Safe to call in any state.
    pub async fn disconnect(&self) {
        let mut link = self.transport.lock().await;
        self.close_link(&mut link).await;
        self.set_instances(Vec::new());
        self.set_state(ConnectionState::Disconnected);
    }

    async fn close_link(&self, link: &mut Link<'_>) {
        if let Some(mut transport) = link.take() {
            info!("closing connection to {}", self.connector.describe());
            let closed =
                with_timeout(self.settings.timeout, "closing connection", transport.close()).await;
            if let Err(e) = closed {
                debug!("close failed: {}", e);
            }
        }
    } // }}}

    /// The open transport of a connected session. A link dropped after a
    /// timeout is reopened here; the discovered layout is kept.
    async fn connected<'a>(&self, link: &'a mut Link<'_>) -> Result<&'a mut dyn RegisterTransport> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }

        if link.is_none() {
            debug!("reopening link to {}", self.connector.describe());
            match with_timeout(
                self.settings.timeout,
                "reopening connection",
                self.connector.open(),
            )
            .await
            {
                Ok(transport) => **link = Some(transport),
                Err(e) => {
                    warn!("reopening link to {} failed: {}", self.connector.describe(), e);
                    self.set_last_error(Some(&e));
                    self.set_state(ConnectionState::Faulted);
                    return Err(e);
                }
            }
        }

        match link.as_mut() {
            Some(transport) => Ok(&mut **transport),
            None => Err(Error::NotConnected),
        }
    }

    /// Records an I/O failure. Link failures fault the session. A timeout
    /// drops the transport so a late reply cannot answer the next request.
    async fn note_failure(&self, link: &mut Link<'_>, err: &Error) {
        self.set_last_error(Some(err));
        if err.is_link_failure() {
            warn!("link to {} failed: {}", self.connector.describe(), err);
            self.close_link(link).await;
            self.set_state(ConnectionState::Faulted);
        } else if matches!(err, Error::Timeout(..)) {
            warn!("dropping link to {} after {}", self.connector.describe(), err);
            self.close_link(link).await;
        }
    }

    async fn read_span(
        &self,
        transport: &mut dyn RegisterTransport,
        start: u16,
        length: u16,
    ) -> Result<Vec<u16>> {
        let mut words = Vec::with_capacity(length as usize);
        let end = u32::from(start) + u32::from(length);
        let mut offset = u32::from(start);

        while offset < end {
            let count = (end - offset).min(u32::from(MAX_READ_REGISTERS)) as u16;
            let chunk = with_timeout(
                self.settings.timeout,
                "reading registers",
                transport.read_registers(offset as u16, count),
            )
            .await?;
            words.extend(chunk);
            offset += u32::from(count);
        }

        Ok(words)
    }

    // read_model {{{
    /// Reads and decodes one discovered model.
    pub async fn read_model(&self, model_id: u16) -> Result<ModelSnapshot> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        let instance = self.instance(model_id)?;
        let definition = self.registry.lookup(model_id)?;

        let mut link = self.transport.lock().await;
        let transport = self.connected(&mut link).await?;

        let words = match self
            .read_span(transport, instance.start_offset, instance.length)
            .await
        {
            Ok(words) => words,
            Err(e) => {
                self.note_failure(&mut link, &e).await;
                return Err(e);
            }
        };
        drop(link);

        sunspec::decode(definition, &words, &instance)
    } // }}}

    // write_point {{{
    /// Writes one fixed-block point in engineering units. All validation happens
    /// before any register is written.
    pub async fn write_point(&self, model_id: u16, name: &str, value: &PointValue) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        let instance = self.instance(model_id)?;
        let definition = self.registry.lookup(model_id)?;

        let Some((offset, point)) = definition.fixed_point(name) else {
            if definition.is_repeating_point(name) {
                return Err(Error::PointNotWritable {
                    model_id,
                    point: name.to_string(),
                });
            }
            return Err(Error::PointNotFound {
                model_id,
                point: name.to_string(),
            });
        };

        if !point.is_writable() {
            return Err(Error::PointNotWritable {
                model_id,
                point: name.to_string(),
            });
        }
        if offset + point.register_length() > instance.length {
            return Err(Error::PointNotFound {
                model_id,
                point: name.to_string(),
            });
        }

        let mut link = self.transport.lock().await;
        let transport = self.connected(&mut link).await?;

        // the scale factor is read under the same lock as the write
        let scale_factor = match point.scale_factor {
            Some(sf_name) => {
                let words = match self
                    .read_span(transport, instance.start_offset, instance.length)
                    .await
                {
                    Ok(words) => words,
                    Err(e) => {
                        self.note_failure(&mut link, &e).await;
                        return Err(e);
                    }
                };
                let snapshot = sunspec::decode(definition, &words, &instance)?;
                snapshot
                    .point(sf_name)
                    .and_then(PointValue::as_i64)
                    .and_then(|sf| i16::try_from(sf).ok())
            }
            None => None,
        };

        let encoded = sunspec::encode_point(model_id, point, value, scale_factor)?;
        let address = instance.start_offset + offset;

        info!(
            "writing model {} point {} = {:?} ({:04x?} at {})",
            model_id, name, value, encoded, address
        );

        let transport = self.connected(&mut link).await?;
        let result = with_timeout(
            self.settings.timeout,
            "writing registers",
            transport.write_registers(address, &encoded),
        )
        .await;

        if let Err(e) = &result {
            self.note_failure(&mut link, e).await;
        }
        result
    } // }}}
}
