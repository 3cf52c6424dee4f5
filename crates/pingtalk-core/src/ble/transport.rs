//! 传输层抽象
//!
//! 具体的蓝牙协议栈（射频、广播扫描、连接、GATT 枚举）不在本库范围内，
//! 状态机只通过这两个 trait 发出请求。所有请求都是尽力而为：
//! 结果通过 [`CentralEvent`](crate::ble::events::CentralEvent) /
//! [`PeripheralEvent`](crate::ble::events::PeripheralEvent) 异步回调。

use crate::ble::descriptor::{
    AdvertisementData, CharacteristicHandle, ConnectOptions, LocalService, WriteType,
};
use log::warn;
use uuid::Uuid;

/// 传输层错误
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Adapter is powered off")]
    PoweredOff,

    #[error("Not connected to {0}")]
    NotConnected(Uuid),

    #[error("Unknown peripheral: {0}")]
    UnknownPeripheral(Uuid),

    #[error("Unknown attribute: {0}")]
    UnknownAttribute(Uuid),

    #[error("{0}")]
    Other(String),
}

/// 发起端使用的传输能力
#[async_trait::async_trait]
pub trait CentralTransport: Send + Sync {
    /// 扫描广播；`services` 为空表示不过滤
    async fn scan(&self, services: &[Uuid]) -> Result<(), TransportError>;

    async fn stop_scan(&self) -> Result<(), TransportError>;

    async fn connect(&self, peripheral: Uuid, options: ConnectOptions)
    -> Result<(), TransportError>;

    async fn disconnect(&self, peripheral: Uuid) -> Result<(), TransportError>;

    /// 发现服务；`filter` 为 `None` 表示发现全部
    async fn discover_services(
        &self,
        peripheral: Uuid,
        filter: Option<&[Uuid]>,
    ) -> Result<(), TransportError>;

    async fn discover_characteristics(
        &self,
        peripheral: Uuid,
        service: Uuid,
        filter: Option<&[Uuid]>,
    ) -> Result<(), TransportError>;

    async fn read_value(&self, handle: &CharacteristicHandle) -> Result<(), TransportError>;

    async fn write_value(
        &self,
        handle: &CharacteristicHandle,
        value: &[u8],
        write_type: WriteType,
    ) -> Result<(), TransportError>;

    async fn set_notify(
        &self,
        handle: &CharacteristicHandle,
        enabled: bool,
    ) -> Result<(), TransportError>;
}

/// 响应端使用的传输能力
#[async_trait::async_trait]
pub trait PeripheralTransport: Send + Sync {
    async fn start_advertising(&self, advertisement: &AdvertisementData)
    -> Result<(), TransportError>;

    async fn stop_advertising(&self) -> Result<(), TransportError>;

    async fn register_service(&self, service: &LocalService) -> Result<(), TransportError>;

    /// 更新本地特征值并推送给已订阅的发起端
    async fn update_value(&self, characteristic: Uuid, value: &[u8])
    -> Result<(), TransportError>;
}

/// 请求失败只记录，不重试也不向上传播
pub(crate) fn log_failure(request: &str, result: Result<(), TransportError>) {
    if let Err(e) = result {
        warn!("Transport request '{}' failed: {}", request, e);
    }
}
