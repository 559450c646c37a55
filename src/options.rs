use clap::Parser;

/// SunSpec Gateway - polls a SunSpec inverter over Modbus and caches its models
#[derive(Debug, Parser)]
#[clap(author, version)]
pub struct Options {
    /// Config file to read
    #[clap(short = 'c', long = "config", default_value = "config.yaml")]
    pub config_file: String,

    /// Optional runtime limit in seconds
    #[clap(short = 't', long = "time")]
    pub runtime: Option<u64>,
}

impl Options {
    /// Parses the process arguments, exiting with usage on error.
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self::parse()
    }
}
