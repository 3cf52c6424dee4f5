//! 传输层描述符
//!
//! 传输层在回调中上报的服务/特征描述，以及响应端注册的本地服务定义。

use crate::ble::properties::{AttributePermissions, CharacteristicProperties};
use std::collections::BTreeMap;
use uuid::Uuid;

/// 广播数据：不透明的键值表
pub type AdvertisementData = BTreeMap<String, Vec<u8>>;

/// 广播数据中的本地名称 (UTF-8)
pub const ADV_LOCAL_NAME: &str = "local_name";
/// 广播数据中的服务 UUID 列表 (每个 16 字节，大端)
pub const ADV_SERVICE_UUIDS: &str = "service_uuids";

/// 构造包含本地名称和服务列表的广播数据
pub fn advertisement(local_name: &str, services: &[Uuid]) -> AdvertisementData {
    let mut data = AdvertisementData::new();
    data.insert(ADV_LOCAL_NAME.to_string(), local_name.as_bytes().to_vec());
    data.insert(
        ADV_SERVICE_UUIDS.to_string(),
        services.iter().flat_map(|u| u.as_bytes().to_vec()).collect(),
    );
    data
}

/// 广播数据中的本地名称
pub fn advertised_name(data: &AdvertisementData) -> Option<String> {
    data.get(ADV_LOCAL_NAME)
        .and_then(|raw| String::from_utf8(raw.clone()).ok())
}

/// 广播数据中的服务 UUID 列表，长度不是 16 的整数倍时忽略尾部
pub fn advertised_services(data: &AdvertisementData) -> Vec<Uuid> {
    data.get(ADV_SERVICE_UUIDS)
        .map(|raw| {
            raw.chunks_exact(16)
                .filter_map(|chunk| Uuid::from_slice(chunk).ok())
                .collect()
        })
        .unwrap_or_default()
}

/// 远端外设上的一个服务
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub uuid: Uuid,
    pub primary: bool,
}

/// 远端服务中的一个特征
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacteristicDescriptor {
    pub uuid: Uuid,
    pub properties: CharacteristicProperties,
    pub value: Option<Vec<u8>>,
}

/// 远端特征的完整定位：外设 + 服务 + 特征
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CharacteristicHandle {
    pub peripheral: Uuid,
    pub service: Uuid,
    pub characteristic: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteType {
    WithResponse,
    WithoutResponse,
}

/// 连接选项
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectOptions {
    /// 断开时由系统提示
    pub notify_on_disconnection: bool,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            notify_on_disconnection: true,
        }
    }
}

/// 响应端发布的本地特征
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalCharacteristic {
    pub uuid: Uuid,
    pub properties: CharacteristicProperties,
    pub permissions: AttributePermissions,
    pub value: Option<Vec<u8>>,
}

/// 响应端发布的本地服务
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalService {
    pub uuid: Uuid,
    pub primary: bool,
    pub characteristics: Vec<LocalCharacteristic>,
}

impl LocalService {
    pub fn characteristic(&self, uuid: Uuid) -> Option<&LocalCharacteristic> {
        self.characteristics.iter().find(|c| c.uuid == uuid)
    }

    pub fn characteristic_mut(&mut self, uuid: Uuid) -> Option<&mut LocalCharacteristic> {
        self.characteristics.iter_mut().find(|c| c.uuid == uuid)
    }

    pub fn descriptor(&self) -> ServiceDescriptor {
        ServiceDescriptor {
            uuid: self.uuid,
            primary: self.primary,
        }
    }
}

impl From<&LocalCharacteristic> for CharacteristicDescriptor {
    fn from(local: &LocalCharacteristic) -> Self {
        Self {
            uuid: local.uuid,
            properties: local.properties,
            value: local.value.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::{DEVICE_INFORMATION_SERVICE_UUID, PING_SERVICE_UUID};

    #[test]
    fn test_advertisement_roundtrip() {
        let data = advertisement(
            "bench-phone",
            &[PING_SERVICE_UUID, DEVICE_INFORMATION_SERVICE_UUID],
        );
        assert_eq!(advertised_name(&data).as_deref(), Some("bench-phone"));
        assert_eq!(
            advertised_services(&data),
            vec![PING_SERVICE_UUID, DEVICE_INFORMATION_SERVICE_UUID]
        );
    }

    #[test]
    fn test_advertised_services_ignores_truncated_tail() {
        let mut data = AdvertisementData::new();
        let mut raw = PING_SERVICE_UUID.as_bytes().to_vec();
        raw.extend_from_slice(&[0x01, 0x02]);
        data.insert(ADV_SERVICE_UUIDS.to_string(), raw);
        assert_eq!(advertised_services(&data), vec![PING_SERVICE_UUID]);
        assert!(advertised_name(&data).is_none());
    }
}
