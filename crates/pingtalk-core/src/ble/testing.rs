//! 单元测试用的记录型传输层

use crate::ble::descriptor::{
    AdvertisementData, CharacteristicHandle, ConnectOptions, LocalService, WriteType,
};
use crate::ble::transport::{CentralTransport, PeripheralTransport, TransportError};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Scan(Vec<Uuid>),
    StopScan,
    Connect(Uuid),
    Disconnect(Uuid),
    DiscoverServices(Uuid, Option<Vec<Uuid>>),
    DiscoverCharacteristics(Uuid, Uuid, Option<Vec<Uuid>>),
    Read(CharacteristicHandle),
    Write(CharacteristicHandle, Vec<u8>, WriteType),
    SetNotify(CharacteristicHandle, bool),
    StartAdvertising(AdvertisementData),
    StopAdvertising,
    RegisterService(LocalService),
    UpdateValue(Uuid, Vec<u8>),
}

/// 只记录收到的请求，不产生任何回调
#[derive(Debug, Clone, Default)]
pub struct RecordingTransport {
    commands: Arc<Mutex<Vec<Command>>>,
}

impl RecordingTransport {
    pub fn commands(&self) -> Vec<Command> {
        self.commands.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&Command) -> bool) -> usize {
        self.commands.lock().unwrap().iter().filter(|c| pred(c)).count()
    }

    pub fn clear(&self) {
        self.commands.lock().unwrap().clear();
    }

    fn record(&self, command: Command) -> Result<(), TransportError> {
        self.commands.lock().unwrap().push(command);
        Ok(())
    }
}

#[async_trait::async_trait]
impl CentralTransport for RecordingTransport {
    async fn scan(&self, services: &[Uuid]) -> Result<(), TransportError> {
        self.record(Command::Scan(services.to_vec()))
    }

    async fn stop_scan(&self) -> Result<(), TransportError> {
        self.record(Command::StopScan)
    }

    async fn connect(&self, peripheral: Uuid, _options: ConnectOptions) -> Result<(), TransportError> {
        self.record(Command::Connect(peripheral))
    }

    async fn disconnect(&self, peripheral: Uuid) -> Result<(), TransportError> {
        self.record(Command::Disconnect(peripheral))
    }

    async fn discover_services(
        &self,
        peripheral: Uuid,
        filter: Option<&[Uuid]>,
    ) -> Result<(), TransportError> {
        self.record(Command::DiscoverServices(peripheral, filter.map(<[Uuid]>::to_vec)))
    }

    async fn discover_characteristics(
        &self,
        peripheral: Uuid,
        service: Uuid,
        filter: Option<&[Uuid]>,
    ) -> Result<(), TransportError> {
        self.record(Command::DiscoverCharacteristics(
            peripheral,
            service,
            filter.map(<[Uuid]>::to_vec),
        ))
    }

    async fn read_value(&self, handle: &CharacteristicHandle) -> Result<(), TransportError> {
        self.record(Command::Read(*handle))
    }

    async fn write_value(
        &self,
        handle: &CharacteristicHandle,
        value: &[u8],
        write_type: WriteType,
    ) -> Result<(), TransportError> {
        self.record(Command::Write(*handle, value.to_vec(), write_type))
    }

    async fn set_notify(
        &self,
        handle: &CharacteristicHandle,
        enabled: bool,
    ) -> Result<(), TransportError> {
        self.record(Command::SetNotify(*handle, enabled))
    }
}

#[async_trait::async_trait]
impl PeripheralTransport for RecordingTransport {
    async fn start_advertising(
        &self,
        advertisement: &AdvertisementData,
    ) -> Result<(), TransportError> {
        self.record(Command::StartAdvertising(advertisement.clone()))
    }

    async fn stop_advertising(&self) -> Result<(), TransportError> {
        self.record(Command::StopAdvertising)
    }

    async fn register_service(&self, service: &LocalService) -> Result<(), TransportError> {
        self.record(Command::RegisterService(service.clone()))
    }

    async fn update_value(&self, characteristic: Uuid, value: &[u8]) -> Result<(), TransportError> {
        self.record(Command::UpdateValue(characteristic, value.to_vec()))
    }
}
