//! Ping 监听/应答状态机
//!
//! 固定扫描 Ping 服务，连接第一个匹配的外设，订阅 notify 特征；
//! 收到 `PING` 后在 write 特征上写回 `ACK`，写入完成后断开。每个连接只应答一次。

use crate::ble::descriptor::{CharacteristicHandle, ConnectOptions, WriteType};
use crate::ble::events::{CentralEvent, PowerState};
use crate::ble::transport::{CentralTransport, log_failure};
use crate::ble::{PING_NOTIFY_CHAR_UUID, PING_SERVICE_UUID, PING_WRITE_CHAR_UUID};
use crate::protocol::Message;
use log::{debug, info, trace, warn};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Idle,
    Scanning,
    HeardPing,
}

impl ListenerState {
    pub fn describe(&self) -> &'static str {
        match self {
            ListenerState::Idle => "Not ready to scan.",
            ListenerState::Scanning => "Scanning for ping service.",
            ListenerState::HeardPing => "Heard ping, sent ack.",
        }
    }
}

pub struct PingListener<T: CentralTransport> {
    transport: T,
    connect_options: ConnectOptions,
    state_tx: watch::Sender<ListenerState>,
    /// 扫描到并正在使用的外设
    peripheral: Option<Uuid>,
    write_handle: Option<CharacteristicHandle>,
    /// 当前连接上是否已经应答过
    acknowledged: bool,
}

impl<T: CentralTransport> PingListener<T> {
    pub fn new(transport: T) -> Self {
        let (state_tx, _) = watch::channel(ListenerState::Idle);
        Self {
            transport,
            connect_options: ConnectOptions::default(),
            state_tx,
            peripheral: None,
            write_handle: None,
            acknowledged: false,
        }
    }

    pub fn with_connect_options(mut self, options: ConnectOptions) -> Self {
        self.connect_options = options;
        self
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ListenerState> {
        self.state_tx.subscribe()
    }

    pub fn state(&self) -> ListenerState {
        *self.state_tx.borrow()
    }

    pub fn peripheral(&self) -> Option<Uuid> {
        self.peripheral
    }

    pub async fn handle_event(&mut self, event: CentralEvent) {
        trace!("Listener event: {:?}", event);

        match event {
            CentralEvent::PowerStateChanged(power) => self.on_power_state(power).await,
            CentralEvent::PeripheralDiscovered {
                peripheral, name, ..
            } => {
                if self.peripheral.is_some() {
                    return;
                }
                info!("Found ping peripheral {} ({:?})", peripheral, name);
                self.peripheral = Some(peripheral);
                log_failure("stop_scan", self.transport.stop_scan().await);
                log_failure(
                    "connect",
                    self.transport
                        .connect(peripheral, self.connect_options)
                        .await,
                );
            }
            CentralEvent::Connected { peripheral } => {
                if !self.is_current(peripheral) {
                    return;
                }
                debug!("Connected to {}, discovering ping service", peripheral);
                self.acknowledged = false;
                log_failure(
                    "discover_services",
                    self.transport
                        .discover_services(peripheral, Some(&[PING_SERVICE_UUID][..]))
                        .await,
                );
            }
            CentralEvent::FailedToConnect { peripheral, error } => {
                if self.is_current(peripheral) {
                    warn!("Failed to connect to {}: {:?}", peripheral, error);
                    self.reset_link();
                }
            }
            CentralEvent::Disconnected { peripheral, error } => {
                if self.is_current(peripheral) {
                    debug!("Disconnected from {}, error: {:?}", peripheral, error);
                    self.reset_link();
                }
            }
            CentralEvent::ServicesDiscovered {
                peripheral,
                services,
            } => {
                if !self.is_current(peripheral) {
                    return;
                }
                for service in services.iter().filter(|s| s.uuid == PING_SERVICE_UUID) {
                    log_failure(
                        "discover_characteristics",
                        self.transport
                            .discover_characteristics(
                                peripheral,
                                service.uuid,
                                Some(&[PING_NOTIFY_CHAR_UUID, PING_WRITE_CHAR_UUID][..]),
                            )
                            .await,
                    );
                }
            }
            CentralEvent::CharacteristicsDiscovered {
                peripheral,
                service,
                characteristics,
            } => {
                if !self.is_current(peripheral) {
                    return;
                }
                for characteristic in &characteristics {
                    let handle = CharacteristicHandle {
                        peripheral,
                        service,
                        characteristic: characteristic.uuid,
                    };
                    if characteristic.uuid == PING_NOTIFY_CHAR_UUID {
                        log_failure("set_notify", self.transport.set_notify(&handle, true).await);
                    } else if characteristic.uuid == PING_WRITE_CHAR_UUID {
                        self.write_handle = Some(handle);
                    }
                }
            }
            CentralEvent::ValueUpdated { handle, value } => {
                if handle.characteristic == PING_NOTIFY_CHAR_UUID && self.is_current(handle.peripheral)
                {
                    self.on_notify(value.as_deref()).await;
                }
            }
            CentralEvent::ValueWritten { handle, error } => {
                if handle.characteristic != PING_WRITE_CHAR_UUID {
                    return;
                }
                if let Some(error) = error {
                    warn!("ACK write failed: {}", error);
                }
                log_failure(
                    "disconnect",
                    self.transport.disconnect(handle.peripheral).await,
                );
            }
        }
    }

    /// 取消与已找到外设的连接，并停止扫描
    pub async fn shutdown(&mut self) {
        if let Some(peripheral) = self.peripheral.take() {
            debug!("Cancelling connection to {}", peripheral);
            log_failure("disconnect", self.transport.disconnect(peripheral).await);
        }
        self.write_handle = None;
        if self.state() == ListenerState::Scanning {
            log_failure("stop_scan", self.transport.stop_scan().await);
        }
    }

    async fn on_power_state(&mut self, power: PowerState) {
        // 适配器状态变化后旧连接不再可用
        self.reset_link();

        if power != PowerState::PoweredOn {
            debug!("Adapter not ready: {:?}", power);
            self.set_state(ListenerState::Idle);
            return;
        }

        self.set_state(ListenerState::Scanning);
        info!("Scanning for ping service");
        log_failure("scan", self.transport.scan(&[PING_SERVICE_UUID]).await);
    }

    async fn on_notify(&mut self, value: Option<&[u8]>) {
        match value.and_then(Message::decode) {
            Some(Message::Ping) => {}
            other => {
                debug!("Ignoring notify value: {:?}", other);
                return;
            }
        }

        if self.acknowledged {
            debug!("Already acknowledged on this connection");
            return;
        }
        let Some(handle) = self.write_handle else {
            warn!("Heard ping before the write characteristic was discovered");
            return;
        };

        self.acknowledged = true;
        self.set_state(ListenerState::HeardPing);
        info!("Heard ping, writing ack");
        log_failure(
            "write_value",
            self.transport
                .write_value(&handle, &Message::Ack.encode(), WriteType::WithoutResponse)
                .await,
        );
    }

    fn is_current(&self, peripheral: Uuid) -> bool {
        self.peripheral == Some(peripheral)
    }

    fn reset_link(&mut self) {
        self.peripheral = None;
        self.write_handle = None;
        self.acknowledged = false;
    }

    fn set_state(&self, state: ListenerState) {
        self.state_tx.send_replace(state);
    }
}

impl<T: CentralTransport + 'static> PingListener<T> {
    /// 在独立任务中串行处理回调，事件流关闭后清理连接并返回监听端本身
    pub fn spawn(mut self, mut events: mpsc::UnboundedReceiver<CentralEvent>) -> JoinHandle<Self> {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                self.handle_event(event).await;
            }
            self.shutdown().await;
            debug!("Listener event loop stopped");
            self
        })
    }
}
