mod common;
use common::*;

use std::time::Duration;
use sunspec_gateway::device::discovery::{discover, DiscoveryOptions};
use sunspec_gateway::device::{ConnectionState, DeviceSession, SessionSettings};
use sunspec_gateway::sunspec::ModelInstance;

fn options() -> DiscoveryOptions {
    DiscoveryOptions {
        base_address: None,
        max_scan_registers: 4096,
        timeout: Duration::from_secs(2),
    }
}

#[tokio::test]
async fn walks_chain_to_end_marker() -> Result<()> {
    common_setup();

    let device = Factory::device();
    let mut transport = device.open().await?;

    let instances = discover(transport.as_mut(), &options()).await?;

    assert_eq!(
        instances,
        vec![
            ModelInstance {
                model_id: 1,
                start_offset: 40004,
                length: 66,
            },
            ModelInstance {
                model_id: 103,
                start_offset: 40072,
                length: 50,
            },
            ModelInstance {
                model_id: 123,
                start_offset: 40124,
                length: 24,
            },
        ]
    );

    Ok(())
}

#[tokio::test]
async fn tries_alternate_base_addresses() -> Result<()> {
    common_setup();

    let device = SimulatedDevice::sunspec(0, &[(1, Factory::common())]);
    let mut transport = device.open().await?;

    let instances = discover(transport.as_mut(), &options()).await?;

    assert_eq!(instances.len(), 1);
    assert_eq!(instances[0].start_offset, 4);
    // 40000 answered with an exception before 0 was tried
    assert_eq!(device.state().reads[0], (40000, 2));
    assert_eq!(device.state().reads[1], (0, 2));

    Ok(())
}

#[tokio::test]
async fn configured_base_is_the_only_candidate() -> Result<()> {
    common_setup();

    let device = SimulatedDevice::sunspec(50000, &[(1, Factory::common())]);
    let mut transport = device.open().await?;

    let options = DiscoveryOptions {
        base_address: Some(40000),
        ..options()
    };
    let result = discover(transport.as_mut(), &options).await;

    assert!(matches!(result, Err(Error::Protocol(_))));
    assert_eq!(device.state().reads, vec![(40000, 2)]);

    Ok(())
}

#[tokio::test]
async fn missing_end_marker_overruns_scan_bound() -> Result<()> {
    common_setup();

    let models: Vec<(u16, Vec<u16>)> = (0..10).map(|_| (1, Factory::common())).collect();
    let device = SimulatedDevice::chain(40000, &models, false);
    let mut transport = device.open().await?;

    let options = DiscoveryOptions {
        max_scan_registers: 300,
        ..options()
    };
    let result = discover(transport.as_mut(), &options).await;

    assert_eq!(
        result,
        Err(Error::DiscoveryOverrun {
            base: 40000,
            limit: 300,
        })
    );

    Ok(())
}

#[tokio::test]
async fn chain_past_top_of_address_space_overruns() -> Result<()> {
    common_setup();

    // a 66 register body starting at 65504 runs past 65535
    let device = SimulatedDevice::new();
    device.load(65500, &[0x5375, 0x6E53, 1, 66]);
    let mut transport = device.open().await?;

    let options = DiscoveryOptions {
        base_address: Some(65500),
        ..options()
    };
    let result = discover(transport.as_mut(), &options).await;

    assert!(matches!(result, Err(Error::DiscoveryOverrun { base: 65500, .. })));

    Ok(())
}

#[tokio::test]
async fn session_connect_discovers_and_replaces_layout() -> Result<()> {
    common_setup();

    let device = Factory::device();
    let session = DeviceSession::new(
        device.clone(),
        ModelRegistry::standard(),
        SessionSettings::from(&Factory::config().inverter),
    );
    assert_eq!(session.state(), ConnectionState::Disconnected);

    session.connect().await?;

    assert_eq!(session.state(), ConnectionState::Connected);
    let ids: Vec<u16> = session.instances().iter().map(|i| i.model_id).collect();
    assert_eq!(ids, vec![1, 103, 123]);
    assert_eq!(session.instance(103)?.start_offset, 40072);

    // a second connect closes the first link and rediscovers
    session.connect().await?;
    assert_eq!(device.opens(), 2);
    assert_eq!(device.closes(), 1);
    assert_eq!(session.instances().len(), 3);

    Ok(())
}

#[tokio::test]
async fn duplicate_models_address_the_first() -> Result<()> {
    common_setup();

    let device = SimulatedDevice::sunspec(
        40000,
        &[(1, Factory::common()), (1, Factory::common())],
    );
    let session = DeviceSession::new(
        device,
        ModelRegistry::standard(),
        SessionSettings::from(&Factory::config().inverter),
    );
    session.connect().await?;

    assert_eq!(session.instances().len(), 2);
    assert_eq!(session.instance(1)?.start_offset, 40004);
    assert_eq!(session.available_models().len(), 1);

    Ok(())
}

#[tokio::test]
async fn failed_discovery_faults_session() {
    common_setup();

    let device = SimulatedDevice::new();
    let session = DeviceSession::new(
        device.clone(),
        ModelRegistry::standard(),
        SessionSettings::from(&Factory::config().inverter),
    );

    let result = session.connect().await;

    assert!(matches!(result, Err(Error::Protocol(_))));
    assert_eq!(session.state(), ConnectionState::Faulted);
    assert!(session.last_error().is_some());
    assert!(session.instances().is_empty());
    // the transport opened for discovery was released
    assert_eq!(device.closes(), 1);
}

#[tokio::test(start_paused = true)]
async fn timeout_ends_base_search() -> Result<()> {
    common_setup();

    let device = SimulatedDevice::sunspec(0, &[(1, Factory::common())]);
    device.delay_reads(Duration::from_secs(30));
    let mut transport = device.open().await?;

    let result = discover(transport.as_mut(), &options()).await;

    assert!(matches!(result, Err(Error::Timeout(..))));
    // base 0 is not read on a stream that may still carry the late reply
    assert!(device.state().reads.is_empty());

    Ok(())
}
