//! 已发现实体存储
//!
//! 三级索引：外设 → 服务 → 特征，均以由传输层 ID 派生的字符串标识为键。
//! 每一级都保留插入顺序，展示层按插入顺序而不是标识顺序排列。
//!
//! 存储从不凭空创建上级实体：服务发现事件到达时如果外设未知，直接忽略，
//! 因为此时没有广播数据和 RSSI 可用。

use crate::ble::descriptor::{AdvertisementData, CharacteristicDescriptor, ServiceDescriptor};
use crate::ble::properties::CharacteristicProperties;
use crate::ble::{attribute_identifier, display_name, peripheral_identifier};
use log::{debug, trace};
use std::collections::HashMap;
use uuid::Uuid;

/// 特征值缺失或不是 UTF-8 时的显示文本
pub const NO_VALUE: &str = "No value present";
/// 外设没有名称时的显示文本
pub const UNKNOWN_NAME: &str = "Unknown name";

/// 按插入顺序迭代的键值表
#[derive(Debug, Clone)]
struct Ordered<T> {
    order: Vec<String>,
    items: HashMap<String, T>,
}

impl<T> Default for Ordered<T> {
    fn default() -> Self {
        Self {
            order: Vec::new(),
            items: HashMap::new(),
        }
    }
}

impl<T> Ordered<T> {
    /// 插入或覆盖；覆盖时位置不变
    fn insert(&mut self, key: String, item: T) {
        if self.items.insert(key.clone(), item).is_none() {
            self.order.push(key);
        }
    }

    fn get(&self, key: &str) -> Option<&T> {
        self.items.get(key)
    }

    fn get_mut(&mut self, key: &str) -> Option<&mut T> {
        self.items.get_mut(key)
    }

    fn iter(&self) -> impl Iterator<Item = &T> {
        self.order.iter().filter_map(|k| self.items.get(k))
    }

    fn len(&self) -> usize {
        self.order.len()
    }

    fn clear(&mut self) {
        self.order.clear();
        self.items.clear();
    }
}

#[derive(Debug, Clone)]
pub struct PeripheralEntity {
    identifier: String,
    transport_id: Uuid,
    name: Option<String>,
    advertisement: AdvertisementData,
    rssi: i16,
    services: Ordered<ServiceEntity>,
}

impl PeripheralEntity {
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// 传输层分配的设备 ID，用于连接/断开请求
    pub fn transport_id(&self) -> Uuid {
        self.transport_id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(UNKNOWN_NAME)
    }

    pub fn advertisement(&self) -> &AdvertisementData {
        &self.advertisement
    }

    pub fn rssi(&self) -> i16 {
        self.rssi
    }

    /// 按插入顺序
    pub fn services(&self) -> impl Iterator<Item = &ServiceEntity> {
        self.services.iter()
    }

    pub fn service(&self, identifier: &str) -> Option<&ServiceEntity> {
        self.services.get(identifier)
    }

    pub fn service_count(&self) -> usize {
        self.services.len()
    }
}

#[derive(Debug, Clone)]
pub struct ServiceEntity {
    identifier: String,
    uuid: Uuid,
    primary: bool,
    characteristics: Ordered<CharacteristicEntity>,
}

impl ServiceEntity {
    fn new(descriptor: &ServiceDescriptor) -> Self {
        Self {
            identifier: attribute_identifier(&descriptor.uuid),
            uuid: descriptor.uuid,
            primary: descriptor.primary,
            characteristics: Ordered::default(),
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn is_primary(&self) -> bool {
        self.primary
    }

    pub fn name(&self) -> String {
        display_name(&self.uuid)
    }

    /// 按插入顺序
    pub fn characteristics(&self) -> impl Iterator<Item = &CharacteristicEntity> {
        self.characteristics.iter()
    }

    pub fn characteristic(&self, identifier: &str) -> Option<&CharacteristicEntity> {
        self.characteristics.get(identifier)
    }
}

#[derive(Debug, Clone)]
pub struct CharacteristicEntity {
    identifier: String,
    uuid: Uuid,
    service_identifier: String,
    properties: CharacteristicProperties,
    value: Option<Vec<u8>>,
}

impl CharacteristicEntity {
    fn new(service_identifier: &str, descriptor: &CharacteristicDescriptor) -> Self {
        Self {
            identifier: attribute_identifier(&descriptor.uuid),
            uuid: descriptor.uuid,
            service_identifier: service_identifier.to_string(),
            properties: descriptor.properties,
            value: descriptor.value.clone(),
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// 所属服务的标识
    pub fn service_identifier(&self) -> &str {
        &self.service_identifier
    }

    pub fn name(&self) -> String {
        display_name(&self.uuid)
    }

    pub fn properties(&self) -> CharacteristicProperties {
        self.properties
    }

    pub fn value(&self) -> Option<&[u8]> {
        self.value.as_deref()
    }

    pub fn set_value(&mut self, value: Option<Vec<u8>>) {
        self.value = value;
    }

    /// UTF-8 解码后的值，失败或缺失时为 [`NO_VALUE`]
    pub fn value_as_string(&self) -> String {
        self.value
            .as_deref()
            .and_then(|v| std::str::from_utf8(v).ok())
            .map(str::to_string)
            .unwrap_or_else(|| NO_VALUE.to_string())
    }
}

/// 外设存储
#[derive(Debug, Default)]
pub struct PeripheralStore {
    peripherals: Ordered<PeripheralEntity>,
}

impl PeripheralStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.peripherals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 按插入顺序
    pub fn peripherals(&self) -> impl Iterator<Item = &PeripheralEntity> {
        self.peripherals.iter()
    }

    /// 首次发现时插入；再次发现时刷新广播数据和 RSSI，带名称时也刷新名称，位置不变
    pub fn upsert_peripheral(
        &mut self,
        transport_id: Uuid,
        name: Option<String>,
        advertisement: AdvertisementData,
        rssi: i16,
    ) -> &PeripheralEntity {
        let identifier = peripheral_identifier(&transport_id);

        if let Some(existing) = self.peripherals.get_mut(&identifier) {
            trace!("Refreshing peripheral {} (rssi={})", identifier, rssi);
            if name.is_some() {
                existing.name = name;
            }
            existing.advertisement = advertisement;
            existing.rssi = rssi;
        } else {
            debug!("Storing new peripheral {} name={:?}", identifier, name);
            self.peripherals.insert(
                identifier.clone(),
                PeripheralEntity {
                    identifier: identifier.clone(),
                    transport_id,
                    name,
                    advertisement,
                    rssi,
                    services: Ordered::default(),
                },
            );
        }

        &self.peripherals.items[&identifier]
    }

    pub fn lookup_peripheral(&self, identifier: &str) -> Option<&PeripheralEntity> {
        self.peripherals.get(identifier)
    }

    /// 向已知外设追加服务，返回新建的服务；外设未知时不做任何事
    pub fn add_services(
        &mut self,
        peripheral_id: &str,
        services: &[ServiceDescriptor],
    ) -> Vec<ServiceEntity> {
        let Some(peripheral) = self.peripherals.get_mut(peripheral_id) else {
            debug!("Ignoring services for unknown peripheral {}", peripheral_id);
            return Vec::new();
        };

        services
            .iter()
            .map(|descriptor| {
                let service = ServiceEntity::new(descriptor);
                peripheral
                    .services
                    .insert(service.identifier.clone(), service.clone());
                service
            })
            .collect()
    }

    /// 向已知服务追加特征，返回服务（含新特征）和新建的特征
    pub fn add_characteristics(
        &mut self,
        peripheral_id: &str,
        service_id: &str,
        characteristics: &[CharacteristicDescriptor],
    ) -> Option<(ServiceEntity, Vec<CharacteristicEntity>)> {
        let Some(service) = self
            .peripherals
            .get_mut(peripheral_id)
            .and_then(|p| p.services.get_mut(service_id))
        else {
            debug!(
                "Ignoring characteristics for unresolved service {}/{}",
                peripheral_id, service_id
            );
            return None;
        };

        let added: Vec<CharacteristicEntity> = characteristics
            .iter()
            .map(|descriptor| {
                let characteristic = CharacteristicEntity::new(service_id, descriptor);
                service
                    .characteristics
                    .insert(characteristic.identifier.clone(), characteristic.clone());
                characteristic
            })
            .collect();

        Some((service.clone(), added))
    }

    /// 定位一个特征以便更新其值
    ///
    /// 值缺失或任一级无法解析时返回 `None`。这里只做定位，不写入 `value`，
    /// 由调用方通过 [`CharacteristicEntity::set_value`] 应用新值（调用方因此还能先查看旧值）。
    pub fn update_characteristic_value(
        &mut self,
        peripheral_id: &str,
        service_id: &str,
        characteristic_id: &str,
        value: Option<&[u8]>,
    ) -> Option<&mut CharacteristicEntity> {
        if value.is_none() {
            return None;
        }

        self.peripherals
            .get_mut(peripheral_id)?
            .services
            .get_mut(service_id)?
            .characteristics
            .get_mut(characteristic_id)
    }

    pub fn clear(&mut self) {
        self.peripherals.clear();
    }
}
