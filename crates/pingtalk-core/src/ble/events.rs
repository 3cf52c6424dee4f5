//! 传输层回调事件
//!
//! 每个角色实例的回调都投递到同一个串行通道中，状态机按顺序逐个处理，
//! 同一实例的两个回调不会并发执行。

use crate::ble::descriptor::{
    AdvertisementData, CharacteristicDescriptor, CharacteristicHandle, ServiceDescriptor,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 适配器电源/授权状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PowerState {
    Unknown,
    Resetting,
    Unsupported,
    Unauthorized,
    PoweredOff,
    PoweredOn,
}

/// 发起端 (central) 收到的回调
#[derive(Debug, Clone, PartialEq)]
pub enum CentralEvent {
    PowerStateChanged(PowerState),
    PeripheralDiscovered {
        peripheral: Uuid,
        name: Option<String>,
        advertisement: AdvertisementData,
        rssi: i16,
    },
    Connected {
        peripheral: Uuid,
    },
    Disconnected {
        peripheral: Uuid,
        error: Option<String>,
    },
    FailedToConnect {
        peripheral: Uuid,
        error: Option<String>,
    },
    ServicesDiscovered {
        peripheral: Uuid,
        services: Vec<ServiceDescriptor>,
    },
    CharacteristicsDiscovered {
        peripheral: Uuid,
        service: Uuid,
        characteristics: Vec<CharacteristicDescriptor>,
    },
    ValueUpdated {
        handle: CharacteristicHandle,
        value: Option<Vec<u8>>,
    },
    ValueWritten {
        handle: CharacteristicHandle,
        error: Option<String>,
    },
}

impl CentralEvent {
    /// 事件所属的外设（电源事件没有）
    pub fn peripheral(&self) -> Option<Uuid> {
        match self {
            CentralEvent::PowerStateChanged(_) => None,
            CentralEvent::PeripheralDiscovered { peripheral, .. }
            | CentralEvent::Connected { peripheral }
            | CentralEvent::Disconnected { peripheral, .. }
            | CentralEvent::FailedToConnect { peripheral, .. }
            | CentralEvent::ServicesDiscovered { peripheral, .. }
            | CentralEvent::CharacteristicsDiscovered { peripheral, .. } => Some(*peripheral),
            CentralEvent::ValueUpdated { handle, .. } | CentralEvent::ValueWritten { handle, .. } => {
                Some(handle.peripheral)
            }
        }
    }
}

/// 远端对本地特征的一次写请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRequest {
    pub central: Uuid,
    pub characteristic: Uuid,
    pub value: Vec<u8>,
    pub offset: usize,
}

impl WriteRequest {
    /// 从 offset 开始的有效载荷；越界或为空时返回 `None`
    pub fn payload(&self) -> Option<&[u8]> {
        self.value.get(self.offset..).filter(|p| !p.is_empty())
    }
}

/// 响应端 (peripheral) 收到的回调
#[derive(Debug, Clone, PartialEq)]
pub enum PeripheralEvent {
    PowerStateChanged(PowerState),
    SubscriptionChanged {
        central: Uuid,
        characteristic: Uuid,
        subscribed: bool,
    },
    WriteRequests(Vec<WriteRequest>),
}
