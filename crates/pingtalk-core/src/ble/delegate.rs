//! 发起端委托接口及其分发上下文
//!
//! 状态机在传输层的串行上下文中运行，委托通知则被转发到另一个单消费者任务中执行，
//! 使展示层与传输层时序解耦。转发是即发即弃的：没有确认，也没有背压。

use crate::ble::descriptor::{
    AdvertisementData, CharacteristicDescriptor, CharacteristicHandle, ServiceDescriptor,
};
use log::trace;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// 展示层实现的委托，全部方法默认为空操作
#[allow(unused_variables)]
pub trait CentralDelegate: Send {
    fn discovered_peripheral(
        &mut self,
        peripheral: Uuid,
        name: Option<&str>,
        advertisement: &AdvertisementData,
        rssi: i16,
    ) {
    }

    fn discovered_services(&mut self, peripheral: Uuid, services: &[ServiceDescriptor]) {}

    fn discovered_characteristics(
        &mut self,
        peripheral: Uuid,
        service: Uuid,
        characteristics: &[CharacteristicDescriptor],
    ) {
    }

    fn received_value(&mut self, handle: &CharacteristicHandle, value: Option<&[u8]>) {}

    fn disconnected(&mut self, peripheral: Uuid) {}
}

/// 待分发给委托的通知
#[derive(Debug, Clone, PartialEq)]
pub enum DelegateEvent {
    DiscoveredPeripheral {
        peripheral: Uuid,
        name: Option<String>,
        advertisement: AdvertisementData,
        rssi: i16,
    },
    DiscoveredServices {
        peripheral: Uuid,
        services: Vec<ServiceDescriptor>,
    },
    DiscoveredCharacteristics {
        peripheral: Uuid,
        service: Uuid,
        characteristics: Vec<CharacteristicDescriptor>,
    },
    ReceivedValue {
        handle: CharacteristicHandle,
        value: Option<Vec<u8>>,
    },
    Disconnected {
        peripheral: Uuid,
    },
}

impl DelegateEvent {
    /// 在当前上下文中调用委托对应的方法
    pub fn deliver<D: CentralDelegate + ?Sized>(&self, delegate: &mut D) {
        match self {
            DelegateEvent::DiscoveredPeripheral {
                peripheral,
                name,
                advertisement,
                rssi,
            } => delegate.discovered_peripheral(*peripheral, name.as_deref(), advertisement, *rssi),
            DelegateEvent::DiscoveredServices {
                peripheral,
                services,
            } => delegate.discovered_services(*peripheral, services),
            DelegateEvent::DiscoveredCharacteristics {
                peripheral,
                service,
                characteristics,
            } => delegate.discovered_characteristics(*peripheral, *service, characteristics),
            DelegateEvent::ReceivedValue { handle, value } => {
                delegate.received_value(handle, value.as_deref())
            }
            DelegateEvent::Disconnected { peripheral } => delegate.disconnected(*peripheral),
        }
    }
}

/// 委托通知的发送端
#[derive(Debug, Clone)]
pub struct DelegateDispatcher {
    tx: mpsc::UnboundedSender<DelegateEvent>,
}

impl DelegateDispatcher {
    /// 创建分发器和接收端，由调用方自行消费
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<DelegateEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// 在独立任务中按顺序把通知交给 `delegate`
    ///
    /// 所有分发器被 drop 后任务结束，并返回委托本身。
    pub fn spawn<D: CentralDelegate + 'static>(mut delegate: D) -> (Self, JoinHandle<D>) {
        let (dispatcher, mut rx) = Self::channel();
        let task = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                event.deliver(&mut delegate);
            }
            delegate
        });
        (dispatcher, task)
    }

    pub(crate) fn dispatch(&self, event: DelegateEvent) {
        if self.tx.send(event).is_err() {
            trace!("Delegate context is gone, dropping notification");
        }
    }
}
