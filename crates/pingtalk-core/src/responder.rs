//! Ping 响应端状态机
//!
//! 广播一个 Ping 服务，包含 notify（可读）和 write-without-response（可写）两个特征：
//! 1. 远端订阅 notify 后停止广播并推送 `PING`，记录发送时刻
//! 2. 远端在 write 特征上写回 `ACK` 后计算往返时间
//! 3. 把 ACK 字节回写到 write 特征

use crate::ble::descriptor::{LocalCharacteristic, LocalService, advertisement};
use crate::ble::events::{PeripheralEvent, PowerState, WriteRequest};
use crate::ble::properties::{AttributePermissions, CharacteristicProperties};
use crate::ble::transport::{PeripheralTransport, log_failure};
use crate::ble::{PING_NOTIFY_CHAR_UUID, PING_SERVICE_UUID, PING_WRITE_CHAR_UUID};
use crate::protocol::Message;
use log::{debug, info, trace, warn};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

/// 响应端状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponderState {
    Idle,
    Advertising,
    /// 收到 ACK，附带往返时间
    Acknowledged(Duration),
}

impl ResponderState {
    /// 展示用的状态文本
    pub fn describe(&self) -> String {
        match self {
            ResponderState::Idle => "Not ready to advertise.".to_string(),
            ResponderState::Advertising => "Advertising.".to_string(),
            ResponderState::Acknowledged(rtt) => {
                format!("Round trip time:\n{} msec", rtt.as_millis())
            }
        }
    }
}

/// 响应端暴露的 Ping 服务
pub fn ping_service() -> LocalService {
    LocalService {
        uuid: PING_SERVICE_UUID,
        primary: true,
        characteristics: vec![
            LocalCharacteristic {
                uuid: PING_NOTIFY_CHAR_UUID,
                properties: CharacteristicProperties::NOTIFY,
                permissions: AttributePermissions::READABLE,
                value: None,
            },
            LocalCharacteristic {
                uuid: PING_WRITE_CHAR_UUID,
                properties: CharacteristicProperties::WRITE_WITHOUT_RESPONSE,
                permissions: AttributePermissions::WRITEABLE,
                value: None,
            },
        ],
    }
}

pub struct PingResponder<T: PeripheralTransport> {
    transport: T,
    device_name: String,
    service: LocalService,
    state_tx: watch::Sender<ResponderState>,
    ping_sent_at: Option<Instant>,
}

impl<T: PeripheralTransport> PingResponder<T> {
    pub fn new(transport: T, device_name: impl Into<String>) -> Self {
        let (state_tx, _) = watch::channel(ResponderState::Idle);
        Self {
            transport,
            device_name: device_name.into(),
            service: ping_service(),
            state_tx,
            ping_sent_at: None,
        }
    }

    /// 订阅状态变化
    pub fn subscribe_state(&self) -> watch::Receiver<ResponderState> {
        self.state_tx.subscribe()
    }

    pub fn state(&self) -> ResponderState {
        *self.state_tx.borrow()
    }

    /// 本地特征当前的值
    pub fn characteristic_value(&self, uuid: Uuid) -> Option<&[u8]> {
        self.service.characteristic(uuid)?.value.as_deref()
    }

    pub async fn handle_event(&mut self, event: PeripheralEvent) {
        trace!("Peripheral event: {:?}", event);

        match event {
            PeripheralEvent::PowerStateChanged(power) => self.on_power_state(power).await,
            PeripheralEvent::SubscriptionChanged {
                central,
                characteristic,
                subscribed,
            } => {
                if characteristic != PING_NOTIFY_CHAR_UUID {
                    return;
                }
                if subscribed {
                    self.on_subscribed(central).await;
                } else {
                    debug!("Central {} unsubscribed", central);
                }
            }
            PeripheralEvent::WriteRequests(requests) => {
                // 一批请求里只看第一个写给 write 特征的
                match requests
                    .iter()
                    .find(|r| r.characteristic == PING_WRITE_CHAR_UUID)
                {
                    Some(request) => self.on_write(request).await,
                    None => trace!("No write to the ping characteristic in batch"),
                }
            }
        }
    }

    async fn on_power_state(&mut self, power: PowerState) {
        if power != PowerState::PoweredOn {
            debug!("Adapter not ready: {:?}", power);
            self.set_state(ResponderState::Idle);
            return;
        }

        self.set_state(ResponderState::Advertising);

        // 先注册服务再广播，避免远端在服务就绪前连接
        log_failure(
            "register_service",
            self.transport.register_service(&self.service).await,
        );
        let data = advertisement(&self.device_name, &[PING_SERVICE_UUID]);
        log_failure(
            "start_advertising",
            self.transport.start_advertising(&data).await,
        );
        info!("Advertising ping service as '{}'", self.device_name);
    }

    async fn on_subscribed(&mut self, central: Uuid) {
        info!("Central {} subscribed, sending ping", central);
        log_failure("stop_advertising", self.transport.stop_advertising().await);

        let ping = Message::Ping.encode();
        self.ping_sent_at = Some(Instant::now());
        self.store_value(PING_NOTIFY_CHAR_UUID, &ping);
        log_failure(
            "update_value",
            self.transport
                .update_value(PING_NOTIFY_CHAR_UUID, &ping)
                .await,
        );
    }

    async fn on_write(&mut self, request: &WriteRequest) {
        let Some(payload) = request.payload() else {
            debug!("Ignoring empty write from {}", request.central);
            return;
        };

        match Message::decode(payload) {
            Some(Message::Ack) => {}
            other => {
                debug!("Dropping unexpected write payload: {:?}", other);
                return;
            }
        }

        let Some(sent_at) = self.ping_sent_at else {
            warn!("Received ACK before any ping was sent");
            return;
        };

        let rtt = sent_at.elapsed();
        info!("Received ACK, round trip {} ms", rtt.as_millis());
        self.set_state(ResponderState::Acknowledged(rtt));

        let ack = Message::Ack.encode();
        self.store_value(PING_WRITE_CHAR_UUID, &ack);
        log_failure(
            "update_value",
            self.transport
                .update_value(PING_WRITE_CHAR_UUID, &ack)
                .await,
        );
    }

    fn store_value(&mut self, uuid: Uuid, value: &[u8]) {
        if let Some(characteristic) = self.service.characteristic_mut(uuid) {
            characteristic.value = Some(value.to_vec());
        }
    }

    fn set_state(&self, state: ResponderState) {
        self.state_tx.send_replace(state);
    }
}

impl<T: PeripheralTransport + 'static> PingResponder<T> {
    /// 在独立任务中串行处理回调，事件流关闭后返回响应端本身
    pub fn spawn(mut self, mut events: mpsc::UnboundedReceiver<PeripheralEvent>) -> JoinHandle<Self> {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                self.handle_event(event).await;
            }
            debug!("Responder event loop stopped");
            self
        })
    }
}
