pub use crate::config::{self, Config, ConfigWrapper};
pub use crate::error::{Error, Result};

pub use chrono::{DateTime, Utc};
pub use log::{debug, error, info, trace, warn};
pub use std::sync::Arc;
pub use std::time::Duration;
