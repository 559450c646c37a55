use crate::prelude::*;
use crate::config::ConnectionType;

use {
    async_trait::async_trait,
    std::future::Future,
    std::io::ErrorKind,
    tokio_modbus::client::{rtu, tcp, Context},
    tokio_modbus::prelude::{Reader, Slave, Writer},
    tokio_serial::{DataBits, Parity, SerialStream, StopBits},
};

/// Largest register count a single Modbus read may request.
pub const MAX_READ_REGISTERS: u16 = 125;

// RegisterTransport {{{
/// Holding register access on an open link. Offsets are absolute register addresses.
#[async_trait]
pub trait RegisterTransport: Send {
    async fn read_registers(&mut self, offset: u16, count: u16) -> Result<Vec<u16>>;

    async fn write_registers(&mut self, offset: u16, values: &[u16]) -> Result<()>;

    async fn close(&mut self) -> Result<()>;
}

/// Opens links to one device. Called again on every reconnect.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self) -> Result<Box<dyn RegisterTransport>>;

    fn describe(&self) -> String;
} // }}}

pub(crate) async fn with_timeout<T, F>(limit: Duration, what: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout(limit, what.to_string())),
    }
}

// ModbusConnector {{{
pub struct ModbusConnector {
    inverter: config::Inverter,
}

impl ModbusConnector {
    pub fn new(inverter: config::Inverter) -> Self {
        Self { inverter }
    }

    async fn open_tcp(&self, tcp: &config::Tcp) -> Result<Context> {
        let target = format!("{}:{}", tcp.host, tcp.port);
        let addr = tokio::net::lookup_host(&target)
            .await
            .map_err(|e| Error::Connection(format!("resolving {}: {}", target, e)))?
            .next()
            .ok_or_else(|| Error::Connection(format!("{} resolved to no addresses", target)))?;

        debug!("connecting to {} ({}) slave {}", target, addr, tcp.slave_id);

        tcp::connect_slave(addr, Slave(tcp.slave_id))
            .await
            .map_err(|e| Error::Connection(format!("{}: {}", target, e)))
    }

    fn open_rtu(&self, rtu: &config::Rtu) -> Result<Context> {
        let data_bits = match rtu.bytesize {
            5 => DataBits::Five,
            6 => DataBits::Six,
            7 => DataBits::Seven,
            _ => DataBits::Eight,
        };
        let parity = match rtu.parity.as_str() {
            "E" => Parity::Even,
            "O" => Parity::Odd,
            _ => Parity::None,
        };
        let stop_bits = if rtu.stopbits == 2 {
            StopBits::Two
        } else {
            StopBits::One
        };

        debug!(
            "opening {} at {} baud {}{}{} slave {}",
            rtu.port, rtu.baudrate, rtu.bytesize, rtu.parity, rtu.stopbits, rtu.slave_id
        );

        let builder = tokio_serial::new(&rtu.port, rtu.baudrate)
            .data_bits(data_bits)
            .parity(parity)
            .stop_bits(stop_bits);
        let port = SerialStream::open(&builder)
            .map_err(|e| Error::Connection(format!("{}: {}", rtu.port, e)))?;

        Ok(rtu::attach_slave(port, Slave(rtu.slave_id)))
    }
}

#[async_trait]
impl Connector for ModbusConnector {
    async fn open(&self) -> Result<Box<dyn RegisterTransport>> {
        self.inverter.validate()?;

        let context = match self.inverter.connection_type {
            ConnectionType::Tcp => match &self.inverter.tcp {
                Some(tcp) => self.open_tcp(tcp).await?,
                None => return Err(Error::Configuration("missing tcp section".to_string())),
            },
            ConnectionType::Rtu => match &self.inverter.rtu {
                Some(rtu) => self.open_rtu(rtu)?,
                None => return Err(Error::Configuration("missing rtu section".to_string())),
            },
        };

        Ok(Box::new(ModbusTransport {
            context: Some(context),
        }))
    }

    fn describe(&self) -> String {
        self.inverter.describe()
    }
} // }}}

// ModbusTransport {{{
pub struct ModbusTransport {
    context: Option<Context>,
}

impl ModbusTransport {
    fn context(&mut self) -> Result<&mut Context> {
        self.context.as_mut().ok_or(Error::NotConnected)
    }
}

#[async_trait]
impl RegisterTransport for ModbusTransport {
    async fn read_registers(&mut self, offset: u16, count: u16) -> Result<Vec<u16>> {
        let words = self
            .context()?
            .read_holding_registers(offset, count)
            .await
            .map_err(|e| match e.kind() {
                // exception responses surface as Other
                ErrorKind::Other => {
                    Error::Protocol(format!("read {}+{} rejected: {}", offset, count, e))
                }
                _ => Error::from(e),
            })?;

        if words.len() != count as usize {
            return Err(Error::Connection(format!(
                "read {}+{} returned {} registers",
                offset,
                count,
                words.len()
            )));
        }

        Ok(words)
    }

    async fn write_registers(&mut self, offset: u16, values: &[u16]) -> Result<()> {
        self.context()?
            .write_multiple_registers(offset, values)
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::Other => Error::WriteRejected(format!("{} at {}", e, offset)),
                _ => Error::from(e),
            })
    }

    async fn close(&mut self) -> Result<()> {
        // dropping the context closes the socket or serial port
        self.context.take();
        Ok(())
    }
} // }}}
