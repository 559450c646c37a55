use crate::prelude::*;
use crate::device::transport::{with_timeout, RegisterTransport};
use crate::sunspec::{decoder::to_bytes, ModelInstance};

use nom_derive::{Nom, Parse};

/// "SunS" as two big-endian registers.
pub const SUNSPEC_MARKER: [u16; 2] = [0x5375, 0x6E53];

/// Model ID that terminates the model chain.
pub const END_MODEL_ID: u16 = 0xFFFF;

/// Base addresses searched for the marker, in order.
pub const DEFAULT_BASE_ADDRESSES: [u16; 3] = [40000, 0, 50000];

#[derive(Clone, Debug)]
pub struct DiscoveryOptions {
    pub base_address: Option<u16>,
    /// Registers after the base that may hold models before giving up.
    pub max_scan_registers: u32,
    pub timeout: Duration,
}

/// The two registers preceding each model body.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Nom)]
#[nom(BigEndian)]
pub struct ModelHeader {
    pub id: u16,
    pub length: u16,
}

impl ModelHeader {
    pub fn from_words(words: &[u16]) -> Result<Self> {
        let bytes = to_bytes(words);
        ModelHeader::parse(&bytes[..])
            .map(|(_, header)| header)
            .map_err(|e| Error::Protocol(format!("bad model header {:04x?}: {:?}", words, e)))
    }
}

/// Locates the SunSpec marker and returns the model chain that follows it.
pub async fn discover(
    transport: &mut dyn RegisterTransport,
    options: &DiscoveryOptions,
) -> Result<Vec<ModelInstance>> {
    let base = find_base(transport, options).await?;
    info!("SunSpec marker found at {}", base);

    let limit = u32::from(base) + options.max_scan_registers;
    let overrun = || Error::DiscoveryOverrun {
        base,
        limit: options.max_scan_registers,
    };

    let mut instances: Vec<ModelInstance> = Vec::new();
    let mut offset = u32::from(base) + 2;

    loop {
        if offset + 2 > limit || offset + 2 > 0x10000 {
            return Err(overrun());
        }

        let words = with_timeout(
            options.timeout,
            "reading model header",
            transport.read_registers(offset as u16, 2),
        )
        .await?;
        let header = ModelHeader::from_words(&words)?;

        if header.id == END_MODEL_ID {
            break;
        }
        if header.id == 0 {
            return Err(Error::Protocol(format!(
                "model id 0 at {} (missing end marker?)",
                offset
            )));
        }

        let start = offset + 2;
        let end = start + u32::from(header.length);
        if end > limit || end > 0x10000 {
            return Err(overrun());
        }

        debug!(
            "model {} at {} length {}",
            header.id, start, header.length
        );
        if instances.iter().any(|i| i.model_id == header.id) {
            debug!("model {} repeats at {}, only the first is addressable", header.id, start);
        }

        instances.push(ModelInstance {
            model_id: header.id,
            start_offset: start as u16,
            length: header.length,
        });
        offset = end;
    }

    Ok(instances)
}

async fn find_base(transport: &mut dyn RegisterTransport, options: &DiscoveryOptions) -> Result<u16> {
    let candidates: Vec<u16> = match options.base_address {
        Some(base) => vec![base],
        None => DEFAULT_BASE_ADDRESSES.to_vec(),
    };

    for base in &candidates {
        let marker = with_timeout(
            options.timeout,
            "reading SunSpec marker",
            transport.read_registers(*base, 2),
        )
        .await;

        match marker {
            Ok(words) if words == SUNSPEC_MARKER => return Ok(*base),
            Ok(words) => debug!("no SunSpec marker at {}: {:04x?}", base, words),
            // a dead link will not get better at the next base, and after a
            // timeout the late reply would answer the next read
            Err(e) if e.is_link_failure() || matches!(e, Error::Timeout(..)) => return Err(e),
            Err(e) => debug!("marker read at {} failed: {}", base, e),
        }
    }

    Err(Error::Protocol(format!(
        "SunSpec marker not found at {:?}",
        candidates
    )))
}
