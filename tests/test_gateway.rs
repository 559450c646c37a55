mod common;
use common::*;

use std::time::Duration;
use sunspec_gateway::device::ConnectionState;
use sunspec_gateway::gateway::Gateway;
use sunspec_gateway::sunspec::PointValue;
use tokio_util::sync::CancellationToken;

async fn gateway(device: &SimulatedDevice) -> Gateway {
    let gateway = Gateway::with_connector(Factory::config_wrapper(), device.clone());
    gateway.connect().await.unwrap();
    gateway
}

#[tokio::test]
async fn device_info_from_common_model() -> Result<()> {
    common_setup();

    let device = Factory::device();
    let gateway = gateway(&device).await;

    let info = gateway.device_info().await?;

    assert_eq!(info.manufacturer.as_deref(), Some("Sungrow"));
    assert_eq!(info.model.as_deref(), Some("SH10RT"));
    assert_eq!(info.serial_number.as_deref(), Some("B2133ABC123"));

    Ok(())
}

#[tokio::test]
async fn lists_discovered_models_by_name() -> Result<()> {
    common_setup();

    let device = Factory::device();
    let gateway = gateway(&device).await;

    let models = gateway.list_available_models()?;

    assert_eq!(
        models.into_iter().collect::<Vec<_>>(),
        vec![
            (1, "common".to_string()),
            (103, "inverter".to_string()),
            (123, "controls".to_string()),
        ]
    );

    Ok(())
}

#[tokio::test]
async fn live_data_bypasses_cache() -> Result<()> {
    common_setup();

    let device = Factory::device();
    let gateway = gateway(&device).await;

    let data = gateway.live_data(None).await?;
    assert_eq!(data.keys().copied().collect::<Vec<_>>(), vec![1, 103]);
    assert!(gateway.cached_data().data.is_empty());

    let data = gateway.live_data(Some(&[123u16][..])).await?;
    assert_eq!(data.keys().copied().collect::<Vec<_>>(), vec![123]);

    Ok(())
}

#[tokio::test]
async fn live_data_reports_requested_models_it_cannot_read() {
    common_setup();

    let device = SimulatedDevice::sunspec(
        40000,
        &[(1, Factory::common()), (103, Factory::inverter()), (64001, vec![0; 4])],
    );
    let gateway = gateway(&device).await;

    assert_eq!(
        gateway.live_data(Some(&[103u16, 124][..])).await,
        Err(Error::ModelNotPresent(124))
    );
    assert_eq!(
        gateway.live_data(Some(&[64001u16][..])).await,
        Err(Error::UnknownModel(64001))
    );

    // a configured model missing from the device is left out of the default read
    gateway
        .start_polling(Some(vec![1, 103, 160]), None)
        .await
        .unwrap();
    gateway.stop_polling().await;
    let data = gateway.live_data(None).await.unwrap();
    assert_eq!(data.keys().copied().collect::<Vec<_>>(), vec![1, 103]);
}

#[tokio::test(start_paused = true)]
async fn polling_fills_cache_and_health() -> Result<()> {
    common_setup();

    let device = Factory::device();
    let gateway = gateway(&device).await;
    assert_eq!(gateway.health().last_poll, None);

    gateway
        .start_polling(Some(vec![1, 103, 123]), Some(Duration::from_secs(5)))
        .await?;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let cached = gateway.cached_data();
    assert_eq!(cached.data.keys().copied().collect::<Vec<_>>(), vec![1, 103, 123]);
    assert_eq!(
        cached.available_models.get(&123).map(String::as_str),
        Some("controls")
    );
    assert_eq!(
        cached.data[&103].point("W"),
        Some(&PointValue::Float(5000.0))
    );

    let health = gateway.health();
    assert!(health.connected);
    assert!(health.polling);
    assert_eq!(health.models_configured, vec![1, 103, 123]);
    assert_eq!(health.last_poll, cached.last_read_time);

    let status = gateway.polling_status();
    assert!(status.running);
    assert_eq!(status.settings.map(|s| s.interval), Some(Duration::from_secs(5)));

    gateway.stop_polling().await;
    assert!(!gateway.polling_status().running);

    Ok(())
}

#[tokio::test]
async fn write_through_gateway() -> Result<()> {
    common_setup();

    let device = Factory::device();
    let gateway = gateway(&device).await;

    let value = PointValue::try_from(&serde_json::json!(75)).map_err(Error::Protocol)?;
    gateway.write_point(123, "WMaxLimPct", &value).await?;

    let snapshot = gateway.read_model(123).await?;
    assert_eq!(snapshot.point("WMaxLimPct"), Some(&PointValue::Float(75.0)));

    Ok(())
}

#[tokio::test]
async fn disconnected_gateway_reports_not_connected() {
    common_setup();

    let device = Factory::device();
    let gateway = gateway(&device).await;

    gateway.disconnect().await;

    assert_eq!(gateway.device_info().await, Err(Error::NotConnected));
    assert_eq!(gateway.list_available_models(), Err(Error::NotConnected));
    assert_eq!(gateway.live_data(None).await, Err(Error::NotConnected));

    let health = gateway.health();
    assert!(!health.connected);
    assert_eq!(health.status, "degraded");
}

#[tokio::test(start_paused = true)]
async fn supervisor_reconnects_after_fault() {
    common_setup();

    let device = Factory::device();
    let gateway = std::sync::Arc::new(gateway(&device).await);

    device.fail_all_reads(Error::Connection("connection reset".to_string()));
    assert!(gateway.read_model(103).await.is_err());
    assert_eq!(gateway.connection_state(), ConnectionState::Faulted);
    device.clear_faults();

    let token = CancellationToken::new();
    let supervisor = {
        let gateway = gateway.clone();
        let token = token.clone();
        tokio::spawn(async move { gateway.supervise(token).await })
    };

    // reconnect_delay is 5s
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(gateway.connection_state(), ConnectionState::Connected);
    assert_eq!(device.opens(), 2);

    token.cancel();
    supervisor.await.unwrap();
}

#[tokio::test]
async fn deliberate_disconnect_is_not_undone() {
    common_setup();

    let device = Factory::device();
    let gateway = gateway(&device).await;
    gateway.disconnect().await;

    let token = CancellationToken::new();
    token.cancel();
    gateway.supervise(token).await;

    assert_eq!(gateway.connection_state(), ConnectionState::Disconnected);
    assert_eq!(device.opens(), 1);
}

#[tokio::test(start_paused = true)]
async fn reconnect_resumes_polling() {
    common_setup();

    let device = Factory::device();
    let gateway = gateway(&device).await;

    gateway.start_polling(None, None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    gateway.disconnect().await;
    let status = gateway.polling_status();
    assert!(!status.running);
    assert_eq!(status.settings, None);
    let cycles = status.stats.cycles;

    gateway.connect().await.unwrap();
    tokio::time::sleep(Duration::from_secs(25)).await;

    let status = gateway.polling_status();
    assert!(status.running);
    assert_eq!(status.settings.map(|s| s.model_ids), Some(vec![1, 103]));
    assert!(status.stats.cycles > cycles);
    assert_eq!(status.stats.cycles_skipped, 0);
}

#[tokio::test(start_paused = true)]
async fn stopped_polling_stays_stopped_across_reconnect() {
    common_setup();

    let device = Factory::device();
    let gateway = gateway(&device).await;

    gateway.start_polling(None, None).await.unwrap();
    gateway.stop_polling().await;
    gateway.disconnect().await;
    gateway.connect().await.unwrap();
    tokio::time::sleep(Duration::from_secs(25)).await;

    assert!(!gateway.polling_status().running);
    assert!(gateway.cached_data().data.is_empty());
}
