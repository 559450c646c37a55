pub mod discovery;
pub mod session;
pub mod transport;

pub use discovery::{ModelHeader, DEFAULT_BASE_ADDRESSES, END_MODEL_ID, SUNSPEC_MARKER};
pub use session::{ConnectionState, DeviceSession, SessionSettings};
pub use transport::{Connector, ModbusConnector, RegisterTransport, MAX_READ_REGISTERS};
