//! 模拟的远端外设

use pingtalk_core::ble::descriptor::{
    AdvertisementData, LocalCharacteristic, LocalService, advertisement,
};
use pingtalk_core::ble::uuid_from_u16;
use pingtalk_core::{
    AttributePermissions, CharacteristicProperties, DEVICE_INFORMATION_SERVICE_UUID,
};
use serde::Serialize;
use uuid::Uuid;

/// 一直在广播、服务固定的外设
#[derive(Debug, Clone)]
pub struct SimDevice {
    pub id: Uuid,
    pub name: Option<String>,
    pub rssi: i16,
    pub services: Vec<LocalService>,
}

impl SimDevice {
    pub fn new(name: Option<&str>, rssi: i16) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.map(str::to_string),
            rssi,
            services: Vec::new(),
        }
    }

    pub fn with_service(mut self, service: LocalService) -> Self {
        self.services.push(service);
        self
    }

    /// 带有设备信息服务 (0x180A) 的外设
    ///
    /// 制造商名称只读，型号可读写，序列号只能 notify，固件版本可读且可 notify。
    pub fn device_information(name: &str, manufacturer: &str, model: &str) -> Self {
        let readable = |short: u16, properties: CharacteristicProperties, value: &str| {
            LocalCharacteristic {
                uuid: uuid_from_u16(short),
                properties,
                permissions: AttributePermissions::READABLE,
                value: Some(value.as_bytes().to_vec()),
            }
        };

        Self::new(Some(name), -58).with_service(LocalService {
            uuid: DEVICE_INFORMATION_SERVICE_UUID,
            primary: true,
            characteristics: vec![
                readable(0x2a29, CharacteristicProperties::READ, manufacturer),
                readable(
                    0x2a24,
                    CharacteristicProperties::READ | CharacteristicProperties::WRITE,
                    model,
                ),
                readable(0x2a25, CharacteristicProperties::NOTIFY, "SN-0001"),
                readable(
                    0x2a26,
                    CharacteristicProperties::READ | CharacteristicProperties::NOTIFY,
                    "1.0.0",
                ),
            ],
        })
    }

    pub fn advertisement(&self) -> AdvertisementData {
        let services: Vec<Uuid> = self.services.iter().map(|s| s.uuid).collect();
        advertisement(self.name.as_deref().unwrap_or_default(), &services)
    }
}

/// 演示程序输出的设备摘要
#[derive(Debug, Clone, Serialize)]
pub struct DeviceSummary {
    pub identifier: String,
    pub name: String,
    pub rssi: i16,
    pub services: Vec<ServiceSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceSummary {
    pub identifier: String,
    pub name: String,
    pub characteristics: Vec<CharacteristicSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CharacteristicSummary {
    pub identifier: String,
    pub name: String,
    pub value: String,
    pub properties: String,
}
