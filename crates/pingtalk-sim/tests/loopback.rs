//! 回环射频上的端到端流程

use pingtalk_core::ble::descriptor::{CharacteristicHandle, WriteType};
use pingtalk_core::ble::{peripheral_identifier, uuid_from_u16};
use pingtalk_core::store::NO_VALUE;
use pingtalk_core::{
    AppSettings, AutoReadPolicy, CentralEvent, CentralTransport, ListenerState, PeripheralEvent,
    PingResponder, PowerState, ResponderState, DEVICE_INFORMATION_SERVICE_UUID,
    PING_NOTIFY_CHAR_UUID, PING_SERVICE_UUID, PING_WRITE_CHAR_UUID,
};
use pingtalk_sim::{LoopbackRadio, SimDevice, browse, demo_radio, ping_exchange};
use std::time::Duration;

const QUIET: Duration = Duration::from_millis(50);

fn settings() -> AppSettings {
    AppSettings {
        device_name: "bench".to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_ping_round_trip() {
    let radio = demo_radio();
    radio.power_on();

    let outcome = ping_exchange(&radio, "bench").await.unwrap();
    assert_eq!(outcome.listener, ListenerState::HeardPing);
    assert!(outcome.round_trip < Duration::from_secs(5));
}

#[tokio::test]
async fn test_ping_waits_for_power() {
    let radio = LoopbackRadio::new();
    let power = radio.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        power.power_on();
    });

    let outcome = ping_exchange(&radio, "bench").await.unwrap();
    assert_eq!(outcome.listener, ListenerState::HeardPing);
}

#[tokio::test]
async fn test_browse_reads_eligible_characteristics() {
    let radio = LoopbackRadio::new();
    let thermo = radio.add_device(SimDevice::device_information("Thermometer", "Acme", "T-100"));
    radio.power_on();

    let devices = browse(&radio, &settings(), QUIET).await.unwrap();
    assert_eq!(devices.len(), 1);
    let device = &devices[0];
    assert_eq!(device.identifier, peripheral_identifier(&thermo));
    assert_eq!(device.name, "Thermometer");
    assert_eq!(device.services.len(), 1);

    let service = &device.services[0];
    assert_eq!(service.name, "Device Information");
    let values: Vec<(&str, &str, &str)> = service
        .characteristics
        .iter()
        .map(|c| (c.identifier.as_str(), c.value.as_str(), c.properties.as_str()))
        .collect();
    assert_eq!(
        values,
        vec![
            ("2A29", "Acme", "R"),
            ("2A24", "T-100", "R+W"),
            ("2A25", NO_VALUE, "N"),
            ("2A26", NO_VALUE, "R, N"),
        ]
    );
}

#[tokio::test]
async fn test_browse_any_readable_policy() {
    let radio = LoopbackRadio::new();
    radio.add_device(SimDevice::device_information("Thermometer", "Acme", "T-100"));
    radio.power_on();

    let settings = AppSettings {
        auto_read: AutoReadPolicy::AnyReadable,
        ..settings()
    };
    let devices = browse(&radio, &settings, QUIET).await.unwrap();
    let firmware = &devices[0].services[0].characteristics[3];
    assert_eq!(firmware.identifier, "2A26");
    assert_eq!(firmware.value, "1.0.0");
}

#[tokio::test]
async fn test_browse_with_service_filter() {
    let radio = demo_radio();
    radio.power_on();

    let settings = AppSettings {
        service_filter: "180A".to_string(),
        ..settings()
    };
    let devices = browse(&radio, &settings, QUIET).await.unwrap();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].name, "Thermometer");
}

#[tokio::test]
async fn test_browse_unnamed_and_invalid_value() {
    let radio = demo_radio();
    radio.power_on();

    let devices = browse(&radio, &settings(), QUIET).await.unwrap();
    assert_eq!(devices.len(), 2);
    let unnamed = &devices[1];
    assert_eq!(unnamed.name, "Unknown name");
    assert_eq!(unnamed.services[0].characteristics[0].value, NO_VALUE);
}

#[tokio::test]
async fn test_browse_not_powered() {
    let radio = demo_radio();
    radio.set_power(PowerState::Unsupported);
    assert!(browse(&radio, &settings(), QUIET).await.is_err());
}

#[tokio::test]
async fn test_write_request_reaches_responder() {
    let radio = LoopbackRadio::new();
    radio.power_on();

    let (peripheral, peripheral_events) = radio.peripheral();
    let responder = PingResponder::new(peripheral, "bench");
    let mut state = responder.subscribe_state();
    let responder_task = responder.spawn(peripheral_events);

    let (central, mut events) = radio.central();
    let host = radio.host_id();
    central.connect(host, Default::default()).await.unwrap();

    // 等响应端上电后再订阅
    loop {
        if *state.borrow_and_update() == ResponderState::Advertising {
            break;
        }
        state.changed().await.unwrap();
    }

    let notify = CharacteristicHandle {
        peripheral: host,
        service: PING_SERVICE_UUID,
        characteristic: PING_NOTIFY_CHAR_UUID,
    };
    central.set_notify(&notify, true).await.unwrap();

    // 订阅后收到 PING 推送
    let ping = loop {
        match events.recv().await.unwrap() {
            CentralEvent::ValueUpdated { handle, value } if handle == notify => break value,
            _ => continue,
        }
    };
    assert_eq!(ping.as_deref(), Some(&b"PING"[..]));

    let write = CharacteristicHandle {
        characteristic: PING_WRITE_CHAR_UUID,
        ..notify
    };
    central
        .write_value(&write, b"ACK", WriteType::WithoutResponse)
        .await
        .unwrap();

    state.changed().await.unwrap();
    assert!(matches!(
        *state.borrow(),
        ResponderState::Acknowledged(_)
    ));

    radio.shutdown();
    let responder = responder_task.await.unwrap();
    assert_eq!(
        responder.characteristic_value(PING_WRITE_CHAR_UUID),
        Some(&b"ACK"[..])
    );
}

#[tokio::test]
async fn test_transport_rejects_requests_without_connection() {
    let radio = LoopbackRadio::new();
    let thermo = radio.add_device(SimDevice::device_information("Thermometer", "Acme", "T-100"));
    let (central, mut events) = radio.central();

    assert_eq!(
        events.recv().await,
        Some(CentralEvent::PowerStateChanged(PowerState::PoweredOff))
    );
    assert!(central.scan(&[]).await.is_err());

    radio.power_on();
    assert!(
        central
            .discover_services(thermo, Some(&[DEVICE_INFORMATION_SERVICE_UUID][..]))
            .await
            .is_err()
    );
    let handle = CharacteristicHandle {
        peripheral: thermo,
        service: DEVICE_INFORMATION_SERVICE_UUID,
        characteristic: uuid_from_u16(0x2a29),
    };
    assert!(central.read_value(&handle).await.is_err());
}

#[tokio::test]
async fn test_unknown_peripheral_fails_to_connect() {
    let radio = LoopbackRadio::new();
    radio.power_on();
    let (central, mut events) = radio.central();
    let ghost = uuid::Uuid::new_v4();

    central.connect(ghost, Default::default()).await.unwrap();
    let _power = events.recv().await;
    assert!(matches!(
        events.recv().await,
        Some(CentralEvent::FailedToConnect { peripheral, .. }) if peripheral == ghost
    ));
}

#[tokio::test]
async fn test_power_change_reaches_both_roles() {
    let radio = LoopbackRadio::new();
    let (_central, mut central_events) = radio.central();
    let (_peripheral, mut peripheral_events) = radio.peripheral();
    let _ = central_events.recv().await;
    let _ = peripheral_events.recv().await;

    radio.power_on();
    assert_eq!(
        central_events.recv().await,
        Some(CentralEvent::PowerStateChanged(PowerState::PoweredOn))
    );
    assert_eq!(
        peripheral_events.recv().await,
        Some(PeripheralEvent::PowerStateChanged(PowerState::PoweredOn))
    );
}
