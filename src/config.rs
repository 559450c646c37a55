use crate::prelude::*;

use anyhow::{anyhow, bail};
use serde::Deserialize;
use serde_with::{serde_as, DurationSeconds};
use std::sync::Mutex;

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub inverter: Inverter,

    #[serde(default)]
    pub data_collection: DataCollection,

    #[serde(default = "Config::default_loglevel")]
    pub loglevel: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    Tcp,
    Rtu,
}

// Inverter {{{
#[derive(Clone, Debug, Deserialize)]
pub struct Inverter {
    pub connection_type: ConnectionType,
    pub tcp: Option<Tcp>,
    pub rtu: Option<Rtu>,

    /// Skip base address probing and look for the SunSpec marker here only.
    pub base_address: Option<u16>,

    #[serde(default = "Config::default_max_scan_registers")]
    pub max_scan_registers: u32,
}

impl Inverter {
    pub fn tcp(host: &str, port: u16) -> Self {
        Self {
            connection_type: ConnectionType::Tcp,
            tcp: Some(Tcp {
                host: host.to_string(),
                port,
                slave_id: Config::default_slave_id(),
                timeout: Config::default_timeout(),
            }),
            rtu: None,
            base_address: None,
            max_scan_registers: Config::default_max_scan_registers(),
        }
    }

    pub fn timeout(&self) -> Duration {
        match self.connection_type {
            ConnectionType::Tcp => self.tcp.as_ref().map(|t| t.timeout),
            ConnectionType::Rtu => self.rtu.as_ref().map(|r| r.timeout),
        }
        .unwrap_or_else(Config::default_timeout)
    }

    pub fn slave_id(&self) -> u8 {
        match self.connection_type {
            ConnectionType::Tcp => self.tcp.as_ref().map(|t| t.slave_id),
            ConnectionType::Rtu => self.rtu.as_ref().map(|r| r.slave_id),
        }
        .unwrap_or_else(Config::default_slave_id)
    }

    pub fn describe(&self) -> String {
        match (self.connection_type, &self.tcp, &self.rtu) {
            (ConnectionType::Tcp, Some(tcp), _) => format!("tcp://{}:{}", tcp.host, tcp.port),
            (ConnectionType::Rtu, _, Some(rtu)) => format!("rtu://{}@{}", rtu.port, rtu.baudrate),
            (ConnectionType::Tcp, None, _) => "tcp (unconfigured)".to_string(),
            (ConnectionType::Rtu, _, None) => "rtu (unconfigured)".to_string(),
        }
    }

    /// Checks that the section matching `connection_type` is present and sane.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(Error::Configuration(msg));

        match self.connection_type {
            ConnectionType::Tcp => {
                let Some(tcp) = &self.tcp else {
                    return fail("connection_type is tcp but no tcp section given".to_string());
                };
                if tcp.host.is_empty() {
                    return fail("inverter.tcp.host cannot be empty".to_string());
                }
                if tcp.port == 0 {
                    return fail("inverter.tcp.port must be between 1 and 65535".to_string());
                }
                if tcp.timeout.is_zero() {
                    return fail("inverter.tcp.timeout must be positive".to_string());
                }
            }
            ConnectionType::Rtu => {
                let Some(rtu) = &self.rtu else {
                    return fail("connection_type is rtu but no rtu section given".to_string());
                };
                if rtu.port.is_empty() {
                    return fail("inverter.rtu.port cannot be empty".to_string());
                }
                if rtu.baudrate == 0 {
                    return fail("inverter.rtu.baudrate must be positive".to_string());
                }
                if !(5..=8).contains(&rtu.bytesize) {
                    return fail(format!("inverter.rtu.bytesize {} not in 5..=8", rtu.bytesize));
                }
                if !matches!(rtu.parity.as_str(), "N" | "E" | "O") {
                    return fail(format!("inverter.rtu.parity {} not one of N, E, O", rtu.parity));
                }
                if !matches!(rtu.stopbits, 1 | 2) {
                    return fail(format!("inverter.rtu.stopbits {} not 1 or 2", rtu.stopbits));
                }
                if rtu.timeout.is_zero() {
                    return fail("inverter.rtu.timeout must be positive".to_string());
                }
            }
        }

        if self.max_scan_registers < 4 {
            return fail("inverter.max_scan_registers must be at least 4".to_string());
        }

        Ok(())
    }
} // }}}

// Tcp {{{
#[serde_as]
#[derive(Clone, Debug, Deserialize)]
pub struct Tcp {
    pub host: String,
    #[serde(default = "Config::default_tcp_port")]
    pub port: u16,
    #[serde(default = "Config::default_slave_id")]
    pub slave_id: u8,
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "Config::default_timeout")]
    pub timeout: Duration,
} // }}}

// Rtu {{{
#[serde_as]
#[derive(Clone, Debug, Deserialize)]
pub struct Rtu {
    pub port: String,
    #[serde(default = "Config::default_baudrate")]
    pub baudrate: u32,
    #[serde(default = "Config::default_bytesize")]
    pub bytesize: u8,
    #[serde(default = "Config::default_parity")]
    pub parity: String,
    #[serde(default = "Config::default_stopbits")]
    pub stopbits: u8,
    #[serde(default = "Config::default_slave_id")]
    pub slave_id: u8,
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "Config::default_timeout")]
    pub timeout: Duration,
} // }}}

// DataCollection {{{
#[serde_as]
#[derive(Clone, Debug, Deserialize)]
pub struct DataCollection {
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "Config::default_poll_interval")]
    pub poll_interval: Duration,

    #[serde(default = "Config::default_models_to_read")]
    pub models_to_read: Vec<u16>,

    /// Further attempts after the first failed read of a model.
    #[serde(default = "Config::default_max_retries")]
    pub max_retries: u32,

    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "Config::default_retry_delay")]
    pub retry_delay: Duration,

    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "Config::default_reconnect_delay")]
    pub reconnect_delay: Duration,
}

impl Default for DataCollection {
    fn default() -> Self {
        Self {
            poll_interval: Config::default_poll_interval(),
            models_to_read: Config::default_models_to_read(),
            max_retries: Config::default_max_retries(),
            retry_delay: Config::default_retry_delay(),
            reconnect_delay: Config::default_reconnect_delay(),
        }
    }
} // }}}

// ConfigWrapper {{{
/// Shared, runtime-adjustable configuration.
pub struct ConfigWrapper {
    config: Arc<Mutex<Config>>,
}

impl Clone for ConfigWrapper {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
        }
    }
}

impl ConfigWrapper {
    pub fn new(file: String) -> anyhow::Result<Self> {
        let config = Config::new(file)?;
        Ok(Self::from_config(config))
    }

    pub fn from_config(config: Config) -> Self {
        Self {
            config: Arc::new(Mutex::new(config)),
        }
    }

    fn with<T>(&self, f: impl FnOnce(&mut Config) -> T) -> T {
        let mut guard = self.config.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    pub fn inverter(&self) -> Inverter {
        self.with(|c| c.inverter.clone())
    }

    pub fn data_collection(&self) -> DataCollection {
        self.with(|c| c.data_collection.clone())
    }

    pub fn models_to_read(&self) -> Vec<u16> {
        self.with(|c| c.data_collection.models_to_read.clone())
    }

    pub fn poll_interval(&self) -> Duration {
        self.with(|c| c.data_collection.poll_interval)
    }

    pub fn set_polling(&self, models: Vec<u16>, interval: Duration) {
        self.with(|c| {
            c.data_collection.models_to_read = models;
            c.data_collection.poll_interval = interval;
        })
    }

    pub fn reconnect_delay(&self) -> Duration {
        self.with(|c| c.data_collection.reconnect_delay)
    }

    pub fn loglevel(&self) -> String {
        self.with(|c| c.loglevel.clone())
    }
} // }}}

impl Config {
    pub fn new(file: String) -> anyhow::Result<Self> {
        info!("Reading configuration from {}", file);
        let content = std::fs::read_to_string(&file)
            .map_err(|err| anyhow!("config.rs:error reading {}: {}", file, err))?;

        let config = Self::from_yaml(&content)?;

        info!("Configuration loaded successfully:");
        info!("  Inverter: {}", config.inverter.describe());
        info!("    Slave ID: {}", config.inverter.slave_id());
        info!("    Timeout: {}s", config.inverter.timeout().as_secs());
        match config.inverter.base_address {
            Some(base) => info!("    Base Address: {}", base),
            None => info!("    Base Address: search"),
        }
        info!("    Max Scan Registers: {}", config.inverter.max_scan_registers);

        let dc = &config.data_collection;
        info!("  Data Collection:");
        info!("    Poll Interval: {}s", dc.poll_interval.as_secs());
        info!("    Models: {:?}", dc.models_to_read);
        info!("    Max Retries: {}", dc.max_retries);
        info!("    Retry Delay: {}s", dc.retry_delay.as_secs());
        info!("    Reconnect Delay: {}s", dc.reconnect_delay.as_secs());
        info!("  Log Level: {}", config.loglevel);

        Ok(config)
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        self.inverter.validate()?;

        let dc = &self.data_collection;
        if dc.poll_interval.is_zero() {
            bail!("data_collection.poll_interval must be positive");
        }
        if dc.models_to_read.is_empty() {
            bail!("data_collection.models_to_read cannot be empty");
        }
        if dc.reconnect_delay.is_zero() {
            bail!("data_collection.reconnect_delay must be positive");
        }

        Ok(())
    }

    fn default_loglevel() -> String {
        "info".to_string()
    }

    fn default_tcp_port() -> u16 {
        502
    }

    fn default_slave_id() -> u8 {
        1
    }

    fn default_timeout() -> Duration {
        Duration::from_secs(10)
    }

    fn default_baudrate() -> u32 {
        19200
    }

    fn default_bytesize() -> u8 {
        8
    }

    fn default_parity() -> String {
        "N".to_string()
    }

    fn default_stopbits() -> u8 {
        1
    }

    fn default_poll_interval() -> Duration {
        Duration::from_secs(30)
    }

    fn default_models_to_read() -> Vec<u16> {
        vec![1, 103, 160]
    }

    fn default_max_retries() -> u32 {
        3
    }

    fn default_retry_delay() -> Duration {
        Duration::from_secs(5)
    }

    fn default_reconnect_delay() -> Duration {
        Duration::from_secs(30)
    }

    fn default_max_scan_registers() -> u32 {
        4096
    }
}
