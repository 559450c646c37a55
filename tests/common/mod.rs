#![allow(dead_code)]

pub use sunspec_gateway::config::{self, Config, ConfigWrapper};
pub use sunspec_gateway::device::{Connector, RegisterTransport};
pub use sunspec_gateway::error::{Error, Result};
pub use sunspec_gateway::sunspec::{ModelDefinition, ModelRegistry};

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn common_setup() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Packs `text` into `registers` words, NUL padded.
pub fn str_words(text: &str, registers: usize) -> Vec<u16> {
    let mut bytes = text.as_bytes().to_vec();
    bytes.resize(registers * 2, 0);
    bytes
        .chunks(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect()
}

// ModelImage {{{
/// Register image of one model, starting with every point not implemented.
pub struct ModelImage {
    definition: &'static ModelDefinition,
    fixed: Vec<u16>,
    groups: Vec<Vec<u16>>,
}

impl ModelImage {
    pub fn new(model_id: u16) -> Self {
        let definition = ModelRegistry::standard()
            .lookup(model_id)
            .expect("model in catalog");
        let fixed = definition
            .points
            .iter()
            .flat_map(|p| p.data_type.not_implemented_words())
            .collect();

        Self {
            definition,
            fixed,
            groups: Vec::new(),
        }
    }

    pub fn set(mut self, name: &str, words: &[u16]) -> Self {
        let (offset, point) = self
            .definition
            .fixed_point(name)
            .unwrap_or_else(|| panic!("no point {}", name));
        assert_eq!(words.len(), point.register_length() as usize, "{}", name);
        let offset = offset as usize;
        self.fixed[offset..offset + words.len()].copy_from_slice(words);
        self
    }

    pub fn set_i16(self, name: &str, value: i16) -> Self {
        self.set(name, &[value as u16])
    }

    pub fn set_u32(self, name: &str, value: u32) -> Self {
        self.set(name, &[(value >> 16) as u16, value as u16])
    }

    pub fn set_str(self, name: &str, text: &str) -> Self {
        let registers = self
            .definition
            .fixed_point(name)
            .map(|(_, p)| p.register_length() as usize)
            .unwrap_or_else(|| panic!("no point {}", name));
        self.set(name, &str_words(text, registers))
    }

    /// Appends a repeating group; `values` are (point, words) pairs.
    pub fn group(mut self, values: &[(&str, Vec<u16>)]) -> Self {
        let mut words: Vec<u16> = Vec::new();
        for point in self.definition.repeating {
            match values.iter().find(|(name, _)| *name == point.name) {
                Some((_, v)) => words.extend(v),
                None => words.extend(point.data_type.not_implemented_words()),
            }
        }
        self.groups.push(words);
        self
    }

    pub fn build(self) -> Vec<u16> {
        let mut words = self.fixed;
        for group in self.groups {
            words.extend(group);
        }
        words
    }
} // }}}

// SimulatedDevice {{{
#[derive(Default)]
pub struct SimState {
    pub registers: BTreeMap<u16, u16>,
    /// (model id, body start, body length) in chain order.
    pub layout: Vec<(u16, u16, u16)>,
    pub reads: Vec<(u16, u16)>,
    pub writes: Vec<(u16, Vec<u16>)>,
    pub opens: usize,
    pub closes: usize,
    pub open_error: Option<Error>,
    pub read_faults: Vec<(Range<u32>, Error)>,
    pub read_delay: Option<Duration>,
    pub write_error: Option<Error>,
}

/// In-memory SunSpec device; unmapped registers answer like an illegal
/// data address exception.
#[derive(Clone, Default)]
pub struct SimulatedDevice {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sunspec(base: u16, models: &[(u16, Vec<u16>)]) -> Self {
        Self::chain(base, models, true)
    }

    pub fn chain(base: u16, models: &[(u16, Vec<u16>)], terminate: bool) -> Self {
        let device = Self::new();
        device.load(base, &[0x5375, 0x6E53]);

        let mut offset = base + 2;
        for (id, body) in models {
            device.load(offset, &[*id, body.len() as u16]);
            device.load(offset + 2, body);
            device.state().layout.push((*id, offset + 2, body.len() as u16));
            offset += 2 + body.len() as u16;
        }
        if terminate {
            device.load(offset, &[0xFFFF, 0]);
        }

        device
    }

    pub fn state(&self) -> std::sync::MutexGuard<'_, SimState> {
        self.state.lock().unwrap()
    }

    pub fn load(&self, offset: u16, words: &[u16]) {
        let mut state = self.state();
        for (i, word) in words.iter().enumerate() {
            state.registers.insert(offset + i as u16, *word);
        }
    }

    pub fn register(&self, address: u16) -> Option<u16> {
        self.state().registers.get(&address).copied()
    }

    /// Body start of the first instance of `model_id`.
    pub fn model_start(&self, model_id: u16) -> u16 {
        self.state()
            .layout
            .iter()
            .find(|(id, _, _)| *id == model_id)
            .map(|(_, start, _)| *start)
            .expect("model in layout")
    }

    /// Every read touching the body of `model_id` fails with `error`.
    pub fn fail_model(&self, model_id: u16, error: Error) {
        let mut state = self.state();
        let (_, start, length) = *state
            .layout
            .iter()
            .find(|(id, _, _)| *id == model_id)
            .expect("model in layout");
        let range = u32::from(start)..u32::from(start) + u32::from(length);
        state.read_faults.push((range, error));
    }

    pub fn fail_all_reads(&self, error: Error) {
        self.state().read_faults.push((0..0x10000, error));
    }

    pub fn clear_faults(&self) {
        let mut state = self.state();
        state.read_faults.clear();
        state.open_error = None;
        state.write_error = None;
        state.read_delay = None;
    }

    pub fn fail_open(&self, error: Error) {
        self.state().open_error = Some(error);
    }

    pub fn fail_writes(&self, error: Error) {
        self.state().write_error = Some(error);
    }

    pub fn delay_reads(&self, delay: Duration) {
        self.state().read_delay = Some(delay);
    }

    pub fn reads_of(&self, model_id: u16) -> usize {
        let start = u32::from(self.model_start(model_id));
        self.state()
            .reads
            .iter()
            .filter(|(offset, _)| u32::from(*offset) == start)
            .count()
    }

    pub fn writes(&self) -> Vec<(u16, Vec<u16>)> {
        self.state().writes.clone()
    }

    pub fn opens(&self) -> usize {
        self.state().opens
    }

    pub fn closes(&self) -> usize {
        self.state().closes
    }
}

#[async_trait]
impl Connector for SimulatedDevice {
    async fn open(&self) -> Result<Box<dyn RegisterTransport>> {
        let mut state = self.state();
        state.opens += 1;
        if let Some(e) = state.open_error.clone() {
            return Err(e);
        }

        Ok(Box::new(SimTransport {
            device: self.clone(),
        }))
    }

    fn describe(&self) -> String {
        "simulated".to_string()
    }
}

pub struct SimTransport {
    device: SimulatedDevice,
}

#[async_trait]
impl RegisterTransport for SimTransport {
    async fn read_registers(&mut self, offset: u16, count: u16) -> Result<Vec<u16>> {
        let delay = self.device.state().read_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.device.state();
        state.reads.push((offset, count));

        let span = u32::from(offset)..u32::from(offset) + u32::from(count);
        if let Some((_, e)) = state
            .read_faults
            .iter()
            .find(|(range, _)| range.start < span.end && span.start < range.end)
        {
            return Err(e.clone());
        }

        span.map(|address| {
            u16::try_from(address)
                .ok()
                .and_then(|a| state.registers.get(&a).copied())
                .ok_or_else(|| Error::Protocol(format!("illegal data address {}", address)))
        })
        .collect()
    }

    async fn write_registers(&mut self, offset: u16, values: &[u16]) -> Result<()> {
        let mut state = self.device.state();
        if let Some(e) = state.write_error.clone() {
            return Err(e);
        }

        state.writes.push((offset, values.to_vec()));
        for (i, value) in values.iter().enumerate() {
            state.registers.insert(offset + i as u16, *value);
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.device.state().closes += 1;
        Ok(())
    }
} // }}}

// Factory {{{
pub struct Factory;

impl Factory {
    pub fn common() -> Vec<u16> {
        ModelImage::new(1)
            .set_str("Mn", "Sungrow")
            .set_str("Md", "SH10RT")
            .set_str("Opt", "")
            .set_str("Vr", "V112.1.4")
            .set_str("SN", "B2133ABC123")
            .set("DA", &[1])
            .build()
    }

    /// Three-phase inverter: 15.2 A, 230.5 V, 5000 W, 50.00 Hz, 123456 Wh, MPPT.
    pub fn inverter() -> Vec<u16> {
        ModelImage::new(103)
            .set("A", &[152])
            .set("AphA", &[51])
            .set("AphB", &[50])
            .set("AphC", &[51])
            .set_i16("A_SF", -1)
            .set("PhVphA", &[2305])
            .set("PhVphB", &[2301])
            .set("PhVphC", &[2299])
            .set_i16("V_SF", -1)
            .set_i16("W", 5000)
            .set_i16("W_SF", 0)
            .set("Hz", &[5000])
            .set_i16("Hz_SF", -2)
            .set_u32("WH", 123456)
            .set_i16("WH_SF", 0)
            .set_i16("TmpCab", -5)
            .set_i16("Tmp_SF", 0)
            .set("St", &[4])
            .set_u32("Evt1", 0)
            .set_u32("Evt2", 0)
            .build()
    }

    pub fn controls() -> Vec<u16> {
        ModelImage::new(123)
            .set("Conn", &[1])
            .set("WMaxLimPct", &[100])
            .set("WMaxLim_Ena", &[0])
            .set_i16("OutPFSet", 100)
            .set("OutPFSet_Ena", &[0])
            .set("VArPct_Ena", &[0])
            .set_i16("WMaxLimPct_SF", 0)
            .set_i16("OutPFSet_SF", -2)
            .build()
    }

    /// Common, three-phase inverter and immediate controls at 40000.
    pub fn device() -> SimulatedDevice {
        SimulatedDevice::sunspec(
            40000,
            &[
                (1, Self::common()),
                (103, Self::inverter()),
                (123, Self::controls()),
            ],
        )
    }

    pub fn config() -> Config {
        let mut inverter = config::Inverter::tcp("127.0.0.1", 502);
        if let Some(tcp) = inverter.tcp.as_mut() {
            tcp.timeout = Duration::from_secs(2);
        }

        Config {
            inverter,
            data_collection: config::DataCollection {
                poll_interval: Duration::from_secs(10),
                models_to_read: vec![1, 103],
                max_retries: 2,
                retry_delay: Duration::from_secs(1),
                reconnect_delay: Duration::from_secs(5),
            },
            loglevel: "debug".to_string(),
        }
    }

    pub fn config_wrapper() -> ConfigWrapper {
        ConfigWrapper::from_config(Self::config())
    }
} // }}}
