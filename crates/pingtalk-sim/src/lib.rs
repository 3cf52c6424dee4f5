//! Pingtalk Simulator
//!
//! 进程内的回环射频，为 `pingtalk-core` 的两个传输层 trait 提供实现，
//! 用于集成测试和演示程序。
//!
//! - **radio**: 回环射频、发起端/响应端传输
//! - **device**: 一直在广播的模拟外设
//! - **session**: 完整的 Ping 往返和浏览会话

pub mod device;
pub mod radio;
pub mod session;

pub use device::{DeviceSummary, SimDevice};
pub use radio::{LoopbackCentral, LoopbackPeripheral, LoopbackRadio};
pub use session::{PingOutcome, browse, ping_exchange, summarize};

/// 演示用的射频：一台带设备信息服务的温度计和一台没有名称的外设
pub fn demo_radio() -> LoopbackRadio {
    use pingtalk_core::ble::descriptor::{LocalCharacteristic, LocalService};
    use pingtalk_core::ble::uuid_from_u16;
    use pingtalk_core::{AttributePermissions, CharacteristicProperties};

    let radio = LoopbackRadio::new();
    radio.add_device(SimDevice::device_information(
        "Thermometer",
        "Acme Sensors",
        "T-100",
    ));
    radio.add_device(SimDevice::new(None, -77).with_service(LocalService {
        uuid: uuid::Uuid::from_u128(0x6e400001_b5a3_f393_e0a9_e50e24dcca9e),
        primary: true,
        characteristics: vec![LocalCharacteristic {
            uuid: uuid_from_u16(0x2a19),
            properties: CharacteristicProperties::READ,
            permissions: AttributePermissions::READABLE,
            value: Some(vec![0xff]),
        }],
    }));
    radio
}
