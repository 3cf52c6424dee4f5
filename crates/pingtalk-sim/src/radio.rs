//! 进程内回环射频
//!
//! 同一个 [`LoopbackRadio`] 上创建的发起端和响应端互相可见：响应端的广播会被扫描到，
//! 发起端的写入会作为写请求投递给响应端，响应端更新的值会推送给已订阅的发起端。
//! 另外可以挂载若干 [`SimDevice`] 作为一直在广播的远端外设。
//!
//! 所有回调都通过无界通道投递，请求本身立即返回。

use crate::device::SimDevice;
use async_trait::async_trait;
use log::{debug, trace};
use pingtalk_core::ble::descriptor::{
    AdvertisementData, CharacteristicDescriptor, CharacteristicHandle, ConnectOptions,
    LocalService, WriteType, advertised_name, advertised_services,
};
use pingtalk_core::{
    CentralEvent, CentralTransport, PeripheralEvent, PeripheralTransport, PowerState,
    TransportError, WriteRequest,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use uuid::Uuid;

/// 本地响应端被扫描到时的信号强度
const HOST_RSSI: i16 = -42;

struct CentralLink {
    events: mpsc::UnboundedSender<CentralEvent>,
    /// 正在扫描时的服务过滤
    scanning: Option<Vec<Uuid>>,
    connections: HashSet<Uuid>,
}

struct HostState {
    events: Option<mpsc::UnboundedSender<PeripheralEvent>>,
    advertising: Option<AdvertisementData>,
    services: Vec<LocalService>,
    /// (发起端, 特征)
    subscribers: HashSet<(Uuid, Uuid)>,
}

struct RadioState {
    power: PowerState,
    host_id: Uuid,
    host: HostState,
    centrals: HashMap<Uuid, CentralLink>,
    devices: Vec<SimDevice>,
}

impl RadioState {
    fn ensure_powered(&self) -> Result<(), TransportError> {
        if self.power == PowerState::PoweredOn {
            Ok(())
        } else {
            Err(TransportError::PoweredOff)
        }
    }

    fn link(&mut self, central: Uuid) -> Result<&mut CentralLink, TransportError> {
        self.centrals
            .get_mut(&central)
            .ok_or_else(|| TransportError::Other(format!("Central {} is not registered", central)))
    }

    fn send_central(&self, central: Uuid, event: CentralEvent) {
        if let Some(link) = self.centrals.get(&central) {
            trace!("-> central {}: {:?}", central, event);
            let _ = link.events.send(event);
        }
    }

    fn send_host(&self, event: PeripheralEvent) {
        if let Some(events) = &self.host.events {
            trace!("-> peripheral: {:?}", event);
            let _ = events.send(event);
        }
    }

    fn is_connected(&self, central: Uuid, peripheral: Uuid) -> bool {
        self.centrals
            .get(&central)
            .is_some_and(|link| link.connections.contains(&peripheral))
    }

    fn exists(&self, peripheral: Uuid) -> bool {
        peripheral == self.host_id || self.devices.iter().any(|d| d.id == peripheral)
    }

    fn services(&self, peripheral: Uuid) -> Option<&[LocalService]> {
        if peripheral == self.host_id {
            return Some(&self.host.services);
        }
        self.devices
            .iter()
            .find(|d| d.id == peripheral)
            .map(|d| d.services.as_slice())
    }

    fn services_mut(&mut self, peripheral: Uuid) -> Option<&mut Vec<LocalService>> {
        if peripheral == self.host_id {
            return Some(&mut self.host.services);
        }
        self.devices
            .iter_mut()
            .find(|d| d.id == peripheral)
            .map(|d| &mut d.services)
    }

    /// 当前在广播的外设：(id, 名称, 广播数据, rssi)
    fn advertisers(&self) -> Vec<(Uuid, Option<String>, AdvertisementData, i16)> {
        let mut found: Vec<_> = self
            .devices
            .iter()
            .map(|d| (d.id, d.name.clone(), d.advertisement(), d.rssi))
            .collect();
        if let Some(data) = &self.host.advertising {
            found.push((self.host_id, advertised_name(data), data.clone(), HOST_RSSI));
        }
        found
    }

    fn report_to_scanners(&self, central: Option<Uuid>) {
        for (central_id, link) in &self.centrals {
            if central.is_some_and(|c| c != *central_id) {
                continue;
            }
            let Some(filter) = &link.scanning else {
                continue;
            };
            for (peripheral, name, advertisement, rssi) in self.advertisers() {
                let advertised = advertised_services(&advertisement);
                if !filter.is_empty() && !filter.iter().any(|s| advertised.contains(s)) {
                    continue;
                }
                let _ = link.events.send(CentralEvent::PeripheralDiscovered {
                    peripheral,
                    name,
                    advertisement,
                    rssi,
                });
            }
        }
    }

    fn disconnect(&mut self, central: Uuid, peripheral: Uuid) {
        if let Some(link) = self.centrals.get_mut(&central) {
            link.connections.remove(&peripheral);
        }
        if peripheral == self.host_id {
            let dropped: Vec<(Uuid, Uuid)> = self
                .host
                .subscribers
                .iter()
                .filter(|(c, _)| *c == central)
                .copied()
                .collect();
            for (c, characteristic) in dropped {
                self.host.subscribers.remove(&(c, characteristic));
                self.send_host(PeripheralEvent::SubscriptionChanged {
                    central,
                    characteristic,
                    subscribed: false,
                });
            }
        }
        self.send_central(
            central,
            CentralEvent::Disconnected {
                peripheral,
                error: None,
            },
        );
    }
}

/// 进程内回环射频，克隆后共享同一状态
#[derive(Clone)]
pub struct LoopbackRadio {
    state: Arc<Mutex<RadioState>>,
}

impl Default for LoopbackRadio {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackRadio {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(RadioState {
                power: PowerState::PoweredOff,
                host_id: Uuid::new_v4(),
                host: HostState {
                    events: None,
                    advertising: None,
                    services: Vec::new(),
                    subscribers: HashSet::new(),
                },
                centrals: HashMap::new(),
                devices: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RadioState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 本地响应端在发起端看来的外设 ID
    pub fn host_id(&self) -> Uuid {
        self.lock().host_id
    }

    pub fn add_device(&self, device: SimDevice) -> Uuid {
        let id = device.id;
        self.lock().devices.push(device);
        id
    }

    /// 改变电源状态并通知所有角色
    pub fn set_power(&self, power: PowerState) {
        let mut state = self.lock();
        debug!("Loopback radio power: {:?}", power);
        state.power = power;
        if power != PowerState::PoweredOn {
            state.host.advertising = None;
            for link in state.centrals.values_mut() {
                link.scanning = None;
            }
        }
        for link in state.centrals.values() {
            let _ = link.events.send(CentralEvent::PowerStateChanged(power));
        }
        state.send_host(PeripheralEvent::PowerStateChanged(power));
    }

    pub fn power_on(&self) {
        self.set_power(PowerState::PoweredOn);
    }

    /// 关闭所有事件通道，各角色的事件循环随之结束
    pub fn shutdown(&self) {
        let mut state = self.lock();
        state.centrals.clear();
        state.host.events = None;
        state.host.advertising = None;
        state.host.subscribers.clear();
    }

    /// 创建一个发起端传输；立即收到当前电源状态
    pub fn central(&self) -> (LoopbackCentral, mpsc::UnboundedReceiver<CentralEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        let mut state = self.lock();
        let _ = tx.send(CentralEvent::PowerStateChanged(state.power));
        state.centrals.insert(
            id,
            CentralLink {
                events: tx,
                scanning: None,
                connections: HashSet::new(),
            },
        );
        drop(state);

        (
            LoopbackCentral {
                radio: self.clone(),
                id,
            },
            rx,
        )
    }

    /// 创建本地响应端传输；同一射频上只有一个，再次调用会替换之前的事件接收端
    pub fn peripheral(&self) -> (LoopbackPeripheral, mpsc::UnboundedReceiver<PeripheralEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.lock();
        let _ = tx.send(PeripheralEvent::PowerStateChanged(state.power));
        state.host.events = Some(tx);
        drop(state);

        (
            LoopbackPeripheral {
                radio: self.clone(),
            },
            rx,
        )
    }
}

/// 回环射频上的发起端
#[derive(Clone)]
pub struct LoopbackCentral {
    radio: LoopbackRadio,
    id: Uuid,
}

impl LoopbackCentral {
    pub fn id(&self) -> Uuid {
        self.id
    }
}

#[async_trait]
impl CentralTransport for LoopbackCentral {
    async fn scan(&self, services: &[Uuid]) -> Result<(), TransportError> {
        let mut state = self.radio.lock();
        state.ensure_powered()?;
        state.link(self.id)?.scanning = Some(services.to_vec());
        state.report_to_scanners(Some(self.id));
        Ok(())
    }

    async fn stop_scan(&self) -> Result<(), TransportError> {
        let mut state = self.radio.lock();
        state.link(self.id)?.scanning = None;
        Ok(())
    }

    async fn connect(
        &self,
        peripheral: Uuid,
        _options: ConnectOptions,
    ) -> Result<(), TransportError> {
        let mut state = self.radio.lock();
        state.ensure_powered()?;
        if !state.exists(peripheral) {
            state.send_central(
                self.id,
                CentralEvent::FailedToConnect {
                    peripheral,
                    error: Some("peripheral is out of range".to_string()),
                },
            );
            return Ok(());
        }
        state.link(self.id)?.connections.insert(peripheral);
        state.send_central(self.id, CentralEvent::Connected { peripheral });
        Ok(())
    }

    async fn disconnect(&self, peripheral: Uuid) -> Result<(), TransportError> {
        let mut state = self.radio.lock();
        if !state.is_connected(self.id, peripheral) {
            return Err(TransportError::NotConnected(peripheral));
        }
        state.disconnect(self.id, peripheral);
        Ok(())
    }

    async fn discover_services(
        &self,
        peripheral: Uuid,
        filter: Option<&[Uuid]>,
    ) -> Result<(), TransportError> {
        let state = self.radio.lock();
        if !state.is_connected(self.id, peripheral) {
            return Err(TransportError::NotConnected(peripheral));
        }
        let services = state
            .services(peripheral)
            .ok_or(TransportError::UnknownPeripheral(peripheral))?
            .iter()
            .filter(|s| filter.is_none_or(|f| f.contains(&s.uuid)))
            .map(LocalService::descriptor)
            .collect();
        state.send_central(
            self.id,
            CentralEvent::ServicesDiscovered {
                peripheral,
                services,
            },
        );
        Ok(())
    }

    async fn discover_characteristics(
        &self,
        peripheral: Uuid,
        service: Uuid,
        filter: Option<&[Uuid]>,
    ) -> Result<(), TransportError> {
        let state = self.radio.lock();
        if !state.is_connected(self.id, peripheral) {
            return Err(TransportError::NotConnected(peripheral));
        }
        let local = state
            .services(peripheral)
            .and_then(|services| services.iter().find(|s| s.uuid == service))
            .ok_or(TransportError::UnknownAttribute(service))?;
        let characteristics = local
            .characteristics
            .iter()
            .filter(|c| filter.is_none_or(|f| f.contains(&c.uuid)))
            .map(|c| CharacteristicDescriptor {
                value: None,
                ..CharacteristicDescriptor::from(c)
            })
            .collect();
        state.send_central(
            self.id,
            CentralEvent::CharacteristicsDiscovered {
                peripheral,
                service,
                characteristics,
            },
        );
        Ok(())
    }

    async fn read_value(&self, handle: &CharacteristicHandle) -> Result<(), TransportError> {
        let state = self.radio.lock();
        if !state.is_connected(self.id, handle.peripheral) {
            return Err(TransportError::NotConnected(handle.peripheral));
        }
        let value = state
            .services(handle.peripheral)
            .and_then(|services| services.iter().find(|s| s.uuid == handle.service))
            .and_then(|s| s.characteristic(handle.characteristic))
            .ok_or(TransportError::UnknownAttribute(handle.characteristic))?
            .value
            .clone();
        state.send_central(
            self.id,
            CentralEvent::ValueUpdated {
                handle: *handle,
                value,
            },
        );
        Ok(())
    }

    async fn write_value(
        &self,
        handle: &CharacteristicHandle,
        value: &[u8],
        _write_type: WriteType,
    ) -> Result<(), TransportError> {
        let mut state = self.radio.lock();
        if !state.is_connected(self.id, handle.peripheral) {
            return Err(TransportError::NotConnected(handle.peripheral));
        }

        if handle.peripheral == state.host_id {
            // 本地响应端自行决定如何处理写入
            state.send_host(PeripheralEvent::WriteRequests(vec![WriteRequest {
                central: self.id,
                characteristic: handle.characteristic,
                value: value.to_vec(),
                offset: 0,
            }]));
        } else {
            let characteristic = state
                .services_mut(handle.peripheral)
                .and_then(|services| services.iter_mut().find(|s| s.uuid == handle.service))
                .and_then(|s| s.characteristic_mut(handle.characteristic))
                .ok_or(TransportError::UnknownAttribute(handle.characteristic))?;
            characteristic.value = Some(value.to_vec());
        }

        state.send_central(
            self.id,
            CentralEvent::ValueWritten {
                handle: *handle,
                error: None,
            },
        );
        Ok(())
    }

    async fn set_notify(
        &self,
        handle: &CharacteristicHandle,
        enabled: bool,
    ) -> Result<(), TransportError> {
        let mut state = self.radio.lock();
        if !state.is_connected(self.id, handle.peripheral) {
            return Err(TransportError::NotConnected(handle.peripheral));
        }
        if handle.peripheral != state.host_id {
            // 模拟外设的值不会变化，订阅没有效果
            return Ok(());
        }

        let key = (self.id, handle.characteristic);
        let changed = if enabled {
            state.host.subscribers.insert(key)
        } else {
            state.host.subscribers.remove(&key)
        };
        if changed {
            state.send_host(PeripheralEvent::SubscriptionChanged {
                central: self.id,
                characteristic: handle.characteristic,
                subscribed: enabled,
            });
        }
        Ok(())
    }
}

/// 回环射频上的本地响应端
#[derive(Clone)]
pub struct LoopbackPeripheral {
    radio: LoopbackRadio,
}

#[async_trait]
impl PeripheralTransport for LoopbackPeripheral {
    async fn start_advertising(
        &self,
        advertisement: &AdvertisementData,
    ) -> Result<(), TransportError> {
        let mut state = self.radio.lock();
        state.ensure_powered()?;
        state.host.advertising = Some(advertisement.clone());
        state.report_to_scanners(None);
        Ok(())
    }

    async fn stop_advertising(&self) -> Result<(), TransportError> {
        self.radio.lock().host.advertising = None;
        Ok(())
    }

    async fn register_service(&self, service: &LocalService) -> Result<(), TransportError> {
        let mut state = self.radio.lock();
        state.host.services.retain(|s| s.uuid != service.uuid);
        state.host.services.push(service.clone());
        Ok(())
    }

    async fn update_value(
        &self,
        characteristic: Uuid,
        value: &[u8],
    ) -> Result<(), TransportError> {
        let mut state = self.radio.lock();
        let host_id = state.host_id;
        let service = state
            .host
            .services
            .iter_mut()
            .find(|s| s.characteristic(characteristic).is_some())
            .ok_or(TransportError::UnknownAttribute(characteristic))?;
        if let Some(local) = service.characteristic_mut(characteristic) {
            local.value = Some(value.to_vec());
        }
        let handle = CharacteristicHandle {
            peripheral: host_id,
            service: service.uuid,
            characteristic,
        };

        for (central, subscribed) in &state.host.subscribers {
            if *subscribed == characteristic && state.is_connected(*central, host_id) {
                state.send_central(
                    *central,
                    CentralEvent::ValueUpdated {
                        handle,
                        value: Some(value.to_vec()),
                    },
                );
            }
        }
        Ok(())
    }
}
