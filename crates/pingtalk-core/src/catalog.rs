//! 浏览会话的展示模型
//!
//! [`Catalog`] 持有发现存储并实现 [`CentralDelegate`]，每次存储变更后立即通过
//! broadcast 通道发布 [`CatalogChange`]，前端据此刷新，不需要定时轮询。

use crate::ble::delegate::CentralDelegate;
use crate::ble::descriptor::{
    AdvertisementData, CharacteristicDescriptor, CharacteristicHandle, ServiceDescriptor,
};
use crate::ble::{attribute_identifier, peripheral_identifier};
use crate::store::{PeripheralEntity, PeripheralStore};
use log::{debug, trace};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use uuid::Uuid;

/// 存储变更通知，携带受影响实体的标识
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogChange {
    PeripheralAdded(String),
    PeripheralUpdated(String),
    ServicesAdded {
        peripheral: String,
        services: Vec<String>,
    },
    CharacteristicsAdded {
        peripheral: String,
        service: String,
        characteristics: Vec<String>,
    },
    ValueChanged {
        peripheral: String,
        service: String,
        characteristic: String,
        value: String,
    },
    Disconnected(String),
    Cleared,
}

/// 外设列表中的一行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeripheralRow {
    pub identifier: String,
    pub transport_id: Uuid,
    pub title: String,
    pub rssi: i16,
    pub service_count: usize,
}

impl From<&PeripheralEntity> for PeripheralRow {
    fn from(entity: &PeripheralEntity) -> Self {
        Self {
            identifier: entity.identifier().to_string(),
            transport_id: entity.transport_id(),
            title: entity.display_name().to_string(),
            rssi: entity.rssi(),
            service_count: entity.service_count(),
        }
    }
}

/// 详情页中一个特征的行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailRow {
    pub identifier: String,
    pub title: String,
    /// 值的字符串形式
    pub content: String,
    /// 能力缩写
    pub accessory: String,
}

/// 详情页中一个服务的分组
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailSection {
    pub identifier: String,
    pub title: String,
    pub rows: Vec<DetailRow>,
}

#[derive(Clone)]
pub struct Catalog {
    store: Arc<Mutex<PeripheralStore>>,
    changes: broadcast::Sender<CatalogChange>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

impl Catalog {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(256);
        Self {
            store: Arc::new(Mutex::new(PeripheralStore::new())),
            changes,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CatalogChange> {
        self.changes.subscribe()
    }

    /// 按发现顺序的外设列表
    pub fn rows(&self) -> Vec<PeripheralRow> {
        self.lock().peripherals().map(PeripheralRow::from).collect()
    }

    pub fn peripheral(&self, identifier: &str) -> Option<PeripheralRow> {
        self.lock()
            .lookup_peripheral(identifier)
            .map(PeripheralRow::from)
    }

    /// 外设的服务/特征详情，按插入顺序
    pub fn detail(&self, identifier: &str) -> Option<Vec<DetailSection>> {
        let store = self.lock();
        let peripheral = store.lookup_peripheral(identifier)?;

        Some(
            peripheral
                .services()
                .map(|service| DetailSection {
                    identifier: service.identifier().to_string(),
                    title: service.name(),
                    rows: service
                        .characteristics()
                        .map(|c| DetailRow {
                            identifier: c.identifier().to_string(),
                            title: c.name(),
                            content: c.value_as_string(),
                            accessory: c.properties().abbreviation(),
                        })
                        .collect(),
                })
                .collect(),
        )
    }

    pub fn clear(&self) {
        self.lock().clear();
        self.publish(CatalogChange::Cleared);
    }

    fn lock(&self) -> MutexGuard<'_, PeripheralStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, change: CatalogChange) {
        trace!("Catalog change: {:?}", change);
        // 没有订阅者时发送失败，忽略即可
        let _ = self.changes.send(change);
    }
}

impl CentralDelegate for Catalog {
    fn discovered_peripheral(
        &mut self,
        peripheral: Uuid,
        name: Option<&str>,
        advertisement: &AdvertisementData,
        rssi: i16,
    ) {
        let change = {
            let mut store = self.lock();
            let identifier = peripheral_identifier(&peripheral);
            let known = store.lookup_peripheral(&identifier).is_some();
            store.upsert_peripheral(
                peripheral,
                name.map(str::to_string),
                advertisement.clone(),
                rssi,
            );
            if known {
                CatalogChange::PeripheralUpdated(identifier)
            } else {
                CatalogChange::PeripheralAdded(identifier)
            }
        };
        self.publish(change);
    }

    fn discovered_services(&mut self, peripheral: Uuid, services: &[ServiceDescriptor]) {
        let identifier = peripheral_identifier(&peripheral);
        let added = self.lock().add_services(&identifier, services);
        if added.is_empty() {
            return;
        }
        self.publish(CatalogChange::ServicesAdded {
            peripheral: identifier,
            services: added.iter().map(|s| s.identifier().to_string()).collect(),
        });
    }

    fn discovered_characteristics(
        &mut self,
        peripheral: Uuid,
        service: Uuid,
        characteristics: &[CharacteristicDescriptor],
    ) {
        let identifier = peripheral_identifier(&peripheral);
        let service_id = attribute_identifier(&service);
        let Some((_, added)) =
            self.lock()
                .add_characteristics(&identifier, &service_id, characteristics)
        else {
            return;
        };
        self.publish(CatalogChange::CharacteristicsAdded {
            peripheral: identifier,
            service: service_id,
            characteristics: added.iter().map(|c| c.identifier().to_string()).collect(),
        });
    }

    fn received_value(&mut self, handle: &CharacteristicHandle, value: Option<&[u8]>) {
        let peripheral = peripheral_identifier(&handle.peripheral);
        let service = attribute_identifier(&handle.service);
        let characteristic = attribute_identifier(&handle.characteristic);

        let content = {
            let mut store = self.lock();
            let Some(entity) =
                store.update_characteristic_value(&peripheral, &service, &characteristic, value)
            else {
                debug!(
                    "Dropping value for unresolved characteristic {}/{}/{}",
                    peripheral, service, characteristic
                );
                return;
            };
            entity.set_value(value.map(<[u8]>::to_vec));
            entity.value_as_string()
        };

        self.publish(CatalogChange::ValueChanged {
            peripheral,
            service,
            characteristic,
            value: content,
        });
    }

    fn disconnected(&mut self, peripheral: Uuid) {
        self.publish(CatalogChange::Disconnected(peripheral_identifier(
            &peripheral,
        )));
    }
}
