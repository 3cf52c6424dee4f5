//! 发起端扫描/连接状态机
//!
//! 驱动传输层扫描、连接单个外设、发现服务和特征，并对可读特征发起一次性读取。
//! 所有传输层回调在一个串行任务中按序处理（见 [`CentralManager::spawn`]），
//! 委托通知则转发到 [`DelegateDispatcher`] 的上下文中。
//!
//! # 状态
//!
//! | 传输层状态 | 动作 | 新状态 |
//! |---|---|---|
//! | PoweredOn | 无 | `ReadyForUse` |
//! | PoweredOff / Unauthorized | 停止扫描 | `NotReady` |
//! | Unsupported | 无 | `BleUnsupported` |
//! | Unknown / Resetting | 无 | `UpdateImminent` |

use crate::ble::delegate::{DelegateDispatcher, DelegateEvent};
use crate::ble::descriptor::{
    CharacteristicDescriptor, CharacteristicHandle, ConnectOptions, ServiceDescriptor,
};
use crate::ble::events::{CentralEvent, PowerState};
use crate::ble::properties::AutoReadPolicy;
use crate::ble::transport::{CentralTransport, log_failure};
use crate::config::AppSettings;
use crate::error::PingtalkError;
use log::{debug, info, trace, warn};
use std::collections::HashSet;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CentralState {
    NotReady,
    ReadyForUse,
    ReadyToScan,
    Scanning,
    BleUnsupported,
    UpdateImminent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartListeningResult {
    StartedListening,
    AlreadyListening,
    NotReadyToListen,
}

pub struct CentralManager<T: CentralTransport> {
    transport: T,
    delegate: DelegateDispatcher,
    state: CentralState,
    services: Vec<Uuid>,
    auto_read: AutoReadPolicy,
    connect_options: ConnectOptions,
    /// 当前把事件交给本状态机的外设
    attached: HashSet<Uuid>,
}

impl<T: CentralTransport> CentralManager<T> {
    pub fn new(transport: T, delegate: DelegateDispatcher) -> Self {
        Self {
            transport,
            delegate,
            state: CentralState::NotReady,
            services: Vec::new(),
            auto_read: AutoReadPolicy::default(),
            connect_options: ConnectOptions::default(),
            attached: HashSet::new(),
        }
    }

    pub fn with_settings(mut self, settings: &AppSettings) -> Self {
        self.auto_read = settings.auto_read;
        self.connect_options = settings.connect_options();
        self
    }

    pub fn with_auto_read(mut self, policy: AutoReadPolicy) -> Self {
        self.auto_read = policy;
        self
    }

    pub fn state(&self) -> CentralState {
        self.state
    }

    /// 最近一次 `start_listening` 记录的服务过滤
    pub fn services(&self) -> &[Uuid] {
        &self.services
    }

    pub fn is_attached(&self, peripheral: Uuid) -> bool {
        self.attached.contains(&peripheral)
    }

    /// 开始扫描广播，可按单个服务过滤
    pub async fn start_listening(&mut self, service: Option<Uuid>) -> StartListeningResult {
        debug!("Attempting to start scan, current state: {:?}", self.state);

        // 无论结果如何都记录过滤，连接后的服务发现也使用它
        self.services = service.into_iter().collect();

        if self.state == CentralState::Scanning {
            return StartListeningResult::AlreadyListening;
        }

        if !matches!(
            self.state,
            CentralState::ReadyForUse | CentralState::ReadyToScan
        ) {
            return StartListeningResult::NotReadyToListen;
        }

        self.state = CentralState::Scanning;
        info!("Scanning for peripherals, filter={:?}", self.services);
        log_failure("scan", self.transport.scan(&self.services).await);

        StartListeningResult::StartedListening
    }

    /// 停止扫描；已经停止时什么也不做，可以在清理路径中反复调用
    pub async fn stop_listening(&mut self) {
        debug!("Attempting to stop scan, current state: {:?}", self.state);

        if self.state == CentralState::ReadyToScan {
            return;
        }

        self.state = CentralState::ReadyToScan;
        log_failure("stop_scan", self.transport.stop_scan().await);
    }

    pub async fn connect(&mut self, peripheral: Uuid) {
        debug!("Connecting to {}", peripheral);
        log_failure(
            "connect",
            self.transport
                .connect(peripheral, self.connect_options)
                .await,
        );
    }

    /// 先解除事件绑定再请求断开，正在拆除的外设不会再产生委托通知
    pub async fn disconnect(&mut self, peripheral: Uuid) {
        debug!("Disconnecting from {}", peripheral);
        self.attached.remove(&peripheral);
        log_failure("disconnect", self.transport.disconnect(peripheral).await);
    }

    /// 处理一个传输层回调
    pub async fn handle_event(&mut self, event: CentralEvent) {
        trace!("Central event: {:?}", event);

        match event {
            CentralEvent::PowerStateChanged(power) => self.on_power_state(power).await,
            CentralEvent::PeripheralDiscovered {
                peripheral,
                name,
                advertisement,
                rssi,
            } => {
                debug!(
                    "Discovered peripheral {} name={:?} rssi={}",
                    peripheral, name, rssi
                );
                self.delegate.dispatch(DelegateEvent::DiscoveredPeripheral {
                    peripheral,
                    name,
                    advertisement,
                    rssi,
                });
            }
            CentralEvent::Connected { peripheral } => self.on_connected(peripheral).await,
            CentralEvent::Disconnected { peripheral, error } => {
                info!("Disconnected from {}, error: {:?}", peripheral, error);
                self.attached.remove(&peripheral);
                self.delegate
                    .dispatch(DelegateEvent::Disconnected { peripheral });
            }
            CentralEvent::FailedToConnect { peripheral, error } => {
                warn!("Failed to connect to {}, error: {:?}", peripheral, error);
            }
            CentralEvent::ServicesDiscovered {
                peripheral,
                services,
            } => {
                if self.accepts(peripheral) {
                    self.on_services(peripheral, services).await;
                }
            }
            CentralEvent::CharacteristicsDiscovered {
                peripheral,
                service,
                characteristics,
            } => {
                if self.accepts(peripheral) {
                    self.on_characteristics(peripheral, service, characteristics)
                        .await;
                }
            }
            CentralEvent::ValueUpdated { handle, value } => {
                if self.accepts(handle.peripheral) {
                    debug!(
                        "Updated characteristic {} with {} byte(s)",
                        handle.characteristic,
                        value.as_ref().map_or(0, Vec::len)
                    );
                    self.delegate
                        .dispatch(DelegateEvent::ReceivedValue { handle, value });
                }
            }
            CentralEvent::ValueWritten { handle, error } => {
                debug!(
                    "Wrote characteristic {}, error: {:?}",
                    handle.characteristic, error
                );
            }
        }
    }

    async fn on_power_state(&mut self, power: PowerState) {
        match power {
            PowerState::Unknown | PowerState::Resetting => {
                self.state = CentralState::UpdateImminent;
            }
            PowerState::PoweredOff | PowerState::Unauthorized => {
                self.stop_listening().await;
                self.state = CentralState::NotReady;
            }
            PowerState::PoweredOn => {
                self.state = CentralState::ReadyForUse;
                info!("Ready to start scanning for nearby peripherals");
            }
            PowerState::Unsupported => {
                warn!("Bluetooth LE is not supported on this adapter");
                self.state = CentralState::BleUnsupported;
            }
        }
    }

    async fn on_connected(&mut self, peripheral: Uuid) {
        info!("Connected to peripheral {}", peripheral);
        self.attached.insert(peripheral);

        // 不过滤时会发现全部服务，速度明显更慢
        let filter = (!self.services.is_empty()).then_some(self.services.as_slice());
        log_failure(
            "discover_services",
            self.transport.discover_services(peripheral, filter).await,
        );
    }

    async fn on_services(&mut self, peripheral: Uuid, services: Vec<ServiceDescriptor>) {
        debug!(
            "Discovered {} service(s) on {}",
            services.len(),
            peripheral
        );
        let uuids: Vec<Uuid> = services.iter().map(|s| s.uuid).collect();
        self.delegate.dispatch(DelegateEvent::DiscoveredServices {
            peripheral,
            services,
        });

        for service in uuids {
            log_failure(
                "discover_characteristics",
                self.transport
                    .discover_characteristics(peripheral, service, None)
                    .await,
            );
        }
    }

    async fn on_characteristics(
        &mut self,
        peripheral: Uuid,
        service: Uuid,
        characteristics: Vec<CharacteristicDescriptor>,
    ) {
        debug!(
            "Discovered {} characteristic(s) for service {}",
            characteristics.len(),
            service
        );
        let readable: Vec<Uuid> = characteristics
            .iter()
            .filter(|c| c.properties.is_auto_readable(self.auto_read))
            .map(|c| c.uuid)
            .collect();

        self.delegate
            .dispatch(DelegateEvent::DiscoveredCharacteristics {
                peripheral,
                service,
                characteristics,
            });

        for characteristic in readable {
            let handle = CharacteristicHandle {
                peripheral,
                service,
                characteristic,
            };
            log_failure("read_value", self.transport.read_value(&handle).await);
        }
    }

    fn accepts(&self, peripheral: Uuid) -> bool {
        let attached = self.attached.contains(&peripheral);
        if !attached {
            trace!("Dropping event for detached peripheral {}", peripheral);
        }
        attached
    }
}

impl<T: CentralTransport + 'static> CentralManager<T> {
    /// 在独立任务中运行状态机，返回用于发出请求的句柄
    ///
    /// 传输层回调和句柄请求在同一任务中串行处理。
    pub fn spawn(self, events: mpsc::UnboundedReceiver<CentralEvent>) -> CentralHandle {
        let (tx, rx) = mpsc::channel(32);
        let task = tokio::spawn(self.run(events, rx));
        CentralHandle { commands: tx, task }
    }

    async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<CentralEvent>,
        mut commands: mpsc::Receiver<Command>,
    ) {
        loop {
            tokio::select! {
                biased;
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => {
                        debug!("Central transport closed its event stream");
                        break;
                    }
                },
            }
        }

        if self.state == CentralState::Scanning {
            self.stop_listening().await;
        }
        debug!("Central event loop stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::StartListening { service, reply } => {
                let result = self.start_listening(service).await;
                let _ = reply.send(result);
            }
            Command::StopListening => self.stop_listening().await,
            Command::Connect(peripheral) => self.connect(peripheral).await,
            Command::Disconnect(peripheral) => self.disconnect(peripheral).await,
            Command::State(reply) => {
                let _ = reply.send(self.state);
            }
        }
    }
}

enum Command {
    StartListening {
        service: Option<Uuid>,
        reply: oneshot::Sender<StartListeningResult>,
    },
    StopListening,
    Connect(Uuid),
    Disconnect(Uuid),
    State(oneshot::Sender<CentralState>),
}

/// 运行中的发起端状态机句柄
pub struct CentralHandle {
    commands: mpsc::Sender<Command>,
    task: JoinHandle<()>,
}

impl CentralHandle {
    pub async fn start_listening(
        &self,
        service: Option<Uuid>,
    ) -> Result<StartListeningResult, PingtalkError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::StartListening { service, reply }).await?;
        rx.await.map_err(|_| PingtalkError::ChannelClosed)
    }

    pub async fn stop_listening(&self) -> Result<(), PingtalkError> {
        self.send(Command::StopListening).await
    }

    pub async fn connect(&self, peripheral: Uuid) -> Result<(), PingtalkError> {
        self.send(Command::Connect(peripheral)).await
    }

    pub async fn disconnect(&self, peripheral: Uuid) -> Result<(), PingtalkError> {
        self.send(Command::Disconnect(peripheral)).await
    }

    pub async fn state(&self) -> Result<CentralState, PingtalkError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::State(reply)).await?;
        rx.await.map_err(|_| PingtalkError::ChannelClosed)
    }

    /// 停止扫描并等待事件循环退出
    pub async fn shutdown(self) {
        let CentralHandle { commands, task } = self;
        drop(commands);
        if let Err(e) = task.await {
            warn!("Central event loop ended abnormally: {}", e);
        }
    }

    async fn send(&self, command: Command) -> Result<(), PingtalkError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| PingtalkError::ChannelClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::properties::CharacteristicProperties as P;
    use crate::ble::testing::{Command as Cmd, RecordingTransport};
    use crate::ble::{DEVICE_INFORMATION_SERVICE_UUID, PING_SERVICE_UUID, uuid_from_u16};
    use tokio::sync::mpsc::UnboundedReceiver;

    const PERIPHERAL: Uuid = Uuid::from_u128(0x1111_2222_3333_4444_5555_6666_7777_8888);

    fn manager() -> (
        CentralManager<RecordingTransport>,
        RecordingTransport,
        UnboundedReceiver<DelegateEvent>,
    ) {
        let transport = RecordingTransport::default();
        let (dispatcher, rx) = DelegateDispatcher::channel();
        (CentralManager::new(transport.clone(), dispatcher), transport, rx)
    }

    async fn powered_on() -> (
        CentralManager<RecordingTransport>,
        RecordingTransport,
        UnboundedReceiver<DelegateEvent>,
    ) {
        let (mut central, transport, rx) = manager();
        central
            .handle_event(CentralEvent::PowerStateChanged(PowerState::PoweredOn))
            .await;
        (central, transport, rx)
    }

    fn characteristic(short: u16, properties: P) -> CharacteristicDescriptor {
        CharacteristicDescriptor {
            uuid: uuid_from_u16(short),
            properties,
            value: None,
        }
    }

    fn reads(transport: &RecordingTransport) -> Vec<Uuid> {
        transport
            .commands()
            .into_iter()
            .filter_map(|c| match c {
                Cmd::Read(handle) => Some(handle.characteristic),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_power_state_transitions() {
        let (mut central, transport, _rx) = manager();
        assert_eq!(central.state(), CentralState::NotReady);

        central
            .handle_event(CentralEvent::PowerStateChanged(PowerState::Resetting))
            .await;
        assert_eq!(central.state(), CentralState::UpdateImminent);
        assert!(transport.commands().is_empty());

        central
            .handle_event(CentralEvent::PowerStateChanged(PowerState::PoweredOn))
            .await;
        assert_eq!(central.state(), CentralState::ReadyForUse);

        central
            .handle_event(CentralEvent::PowerStateChanged(PowerState::PoweredOff))
            .await;
        assert_eq!(central.state(), CentralState::NotReady);
        assert_eq!(transport.commands(), vec![Cmd::StopScan]);

        central
            .handle_event(CentralEvent::PowerStateChanged(PowerState::Unsupported))
            .await;
        assert_eq!(central.state(), CentralState::BleUnsupported);
    }

    #[tokio::test]
    async fn test_start_listening_not_ready() {
        let (mut central, transport, _rx) = manager();
        assert_eq!(
            central.start_listening(None).await,
            StartListeningResult::NotReadyToListen
        );
        assert!(transport.commands().is_empty());
    }

    #[tokio::test]
    async fn test_start_listening_already_listening() {
        let (mut central, transport, _rx) = powered_on().await;
        assert_eq!(
            central.start_listening(Some(PING_SERVICE_UUID)).await,
            StartListeningResult::StartedListening
        );
        assert_eq!(central.state(), CentralState::Scanning);
        assert_eq!(transport.commands(), vec![Cmd::Scan(vec![PING_SERVICE_UUID])]);

        assert_eq!(
            central.start_listening(Some(PING_SERVICE_UUID)).await,
            StartListeningResult::AlreadyListening
        );
        assert_eq!(transport.count(|c| matches!(c, Cmd::Scan(_))), 1);
    }

    #[tokio::test]
    async fn test_stop_listening_is_idempotent() {
        let (mut central, transport, _rx) = powered_on().await;
        central.start_listening(None).await;
        central.stop_listening().await;
        central.stop_listening().await;
        assert_eq!(central.state(), CentralState::ReadyToScan);
        assert_eq!(transport.count(|c| *c == Cmd::StopScan), 1);

        // ReadyToScan 时可以重新开始
        assert_eq!(
            central.start_listening(None).await,
            StartListeningResult::StartedListening
        );
        assert_eq!(transport.count(|c| matches!(c, Cmd::Scan(_))), 2);
    }

    #[tokio::test]
    async fn test_discovered_peripheral_forwarded() {
        let (mut central, _transport, mut rx) = powered_on().await;
        central
            .handle_event(CentralEvent::PeripheralDiscovered {
                peripheral: PERIPHERAL,
                name: Some("thermo".into()),
                advertisement: Default::default(),
                rssi: -52,
            })
            .await;

        match rx.try_recv().unwrap() {
            DelegateEvent::DiscoveredPeripheral {
                peripheral,
                name,
                rssi,
                ..
            } => {
                assert_eq!(peripheral, PERIPHERAL);
                assert_eq!(name.as_deref(), Some("thermo"));
                assert_eq!(rssi, -52);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_connected_discovers_with_filter() {
        let (mut central, transport, _rx) = powered_on().await;
        central.start_listening(Some(DEVICE_INFORMATION_SERVICE_UUID)).await;
        central
            .handle_event(CentralEvent::Connected { peripheral: PERIPHERAL })
            .await;
        assert!(central.is_attached(PERIPHERAL));
        assert!(transport.commands().contains(&Cmd::DiscoverServices(
            PERIPHERAL,
            Some(vec![DEVICE_INFORMATION_SERVICE_UUID])
        )));
    }

    #[tokio::test]
    async fn test_connected_without_filter_discovers_everything() {
        let (mut central, transport, _rx) = powered_on().await;
        central.start_listening(None).await;
        central
            .handle_event(CentralEvent::Connected { peripheral: PERIPHERAL })
            .await;
        assert!(
            transport
                .commands()
                .contains(&Cmd::DiscoverServices(PERIPHERAL, None))
        );
    }

    #[tokio::test]
    async fn test_services_trigger_unfiltered_characteristic_discovery() {
        let (mut central, transport, mut rx) = powered_on().await;
        central
            .handle_event(CentralEvent::Connected { peripheral: PERIPHERAL })
            .await;
        let services = vec![
            ServiceDescriptor {
                uuid: DEVICE_INFORMATION_SERVICE_UUID,
                primary: true,
            },
            ServiceDescriptor {
                uuid: PING_SERVICE_UUID,
                primary: true,
            },
        ];
        central
            .handle_event(CentralEvent::ServicesDiscovered {
                peripheral: PERIPHERAL,
                services: services.clone(),
            })
            .await;

        assert_eq!(
            rx.try_recv().unwrap(),
            DelegateEvent::DiscoveredServices {
                peripheral: PERIPHERAL,
                services
            }
        );
        let commands = transport.commands();
        assert!(commands.contains(&Cmd::DiscoverCharacteristics(
            PERIPHERAL,
            DEVICE_INFORMATION_SERVICE_UUID,
            None
        )));
        assert!(commands.contains(&Cmd::DiscoverCharacteristics(
            PERIPHERAL,
            PING_SERVICE_UUID,
            None
        )));
    }

    #[tokio::test]
    async fn test_read_eligibility() {
        let (mut central, transport, mut rx) = powered_on().await;
        central
            .handle_event(CentralEvent::Connected { peripheral: PERIPHERAL })
            .await;
        central
            .handle_event(CentralEvent::CharacteristicsDiscovered {
                peripheral: PERIPHERAL,
                service: DEVICE_INFORMATION_SERVICE_UUID,
                characteristics: vec![
                    characteristic(0x2a29, P::READ),
                    characteristic(0x2a24, P::READ | P::WRITE),
                    characteristic(0x2a25, P::NOTIFY),
                    characteristic(0x2a26, P::READ | P::NOTIFY),
                    characteristic(0x2a27, P::NOTIFY | P::INDICATE),
                ],
            })
            .await;

        assert!(matches!(
            rx.try_recv().unwrap(),
            DelegateEvent::DiscoveredCharacteristics { .. }
        ));
        assert_eq!(
            reads(&transport),
            vec![uuid_from_u16(0x2a29), uuid_from_u16(0x2a24)]
        );
    }

    #[tokio::test]
    async fn test_any_readable_policy() {
        let (central, transport, _rx) = powered_on().await;
        let mut central = central.with_auto_read(AutoReadPolicy::AnyReadable);
        central
            .handle_event(CentralEvent::Connected { peripheral: PERIPHERAL })
            .await;
        central
            .handle_event(CentralEvent::CharacteristicsDiscovered {
                peripheral: PERIPHERAL,
                service: DEVICE_INFORMATION_SERVICE_UUID,
                characteristics: vec![
                    characteristic(0x2a25, P::NOTIFY),
                    characteristic(0x2a26, P::READ | P::NOTIFY),
                ],
            })
            .await;
        assert_eq!(reads(&transport), vec![uuid_from_u16(0x2a26)]);
    }

    #[tokio::test]
    async fn test_disconnect_detaches_before_request() {
        let (mut central, transport, mut rx) = powered_on().await;
        central
            .handle_event(CentralEvent::Connected { peripheral: PERIPHERAL })
            .await;
        central.disconnect(PERIPHERAL).await;
        assert!(!central.is_attached(PERIPHERAL));
        assert!(transport.commands().contains(&Cmd::Disconnect(PERIPHERAL)));

        // 拆除中的外设不再产生委托通知
        central
            .handle_event(CentralEvent::ValueUpdated {
                handle: CharacteristicHandle {
                    peripheral: PERIPHERAL,
                    service: DEVICE_INFORMATION_SERVICE_UUID,
                    characteristic: uuid_from_u16(0x2a29),
                },
                value: Some(b"late".to_vec()),
            })
            .await;
        assert!(rx.try_recv().is_err());

        central
            .handle_event(CentralEvent::Disconnected {
                peripheral: PERIPHERAL,
                error: None,
            })
            .await;
        assert_eq!(
            rx.try_recv().unwrap(),
            DelegateEvent::Disconnected {
                peripheral: PERIPHERAL
            }
        );
    }

    #[tokio::test]
    async fn test_value_update_forwarded() {
        let (mut central, _transport, mut rx) = powered_on().await;
        central
            .handle_event(CentralEvent::Connected { peripheral: PERIPHERAL })
            .await;
        let handle = CharacteristicHandle {
            peripheral: PERIPHERAL,
            service: DEVICE_INFORMATION_SERVICE_UUID,
            characteristic: uuid_from_u16(0x2a29),
        };
        central
            .handle_event(CentralEvent::ValueUpdated {
                handle,
                value: None,
            })
            .await;
        assert_eq!(
            rx.try_recv().unwrap(),
            DelegateEvent::ReceivedValue {
                handle,
                value: None
            }
        );
    }

    #[tokio::test]
    async fn test_spawned_handle() {
        let transport = RecordingTransport::default();
        let (dispatcher, _rx) = DelegateDispatcher::channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let handle = CentralManager::new(transport.clone(), dispatcher).spawn(event_rx);

        assert_eq!(
            handle.start_listening(None).await.unwrap(),
            StartListeningResult::NotReadyToListen
        );

        event_tx
            .send(CentralEvent::PowerStateChanged(PowerState::PoweredOn))
            .unwrap();
        // 命令优先于事件处理，所以要等到状态确实变化
        while handle.state().await.unwrap() != CentralState::ReadyForUse {
            tokio::task::yield_now().await;
        }

        assert_eq!(
            handle.start_listening(None).await.unwrap(),
            StartListeningResult::StartedListening
        );
        handle.shutdown().await;
        assert_eq!(
            transport.commands(),
            vec![Cmd::Scan(vec![]), Cmd::StopScan]
        );
    }

    #[tokio::test]
    async fn test_shutdown_without_scan_leaves_transport_alone() {
        let transport = RecordingTransport::default();
        let (dispatcher, _rx) = DelegateDispatcher::channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let handle = CentralManager::new(transport.clone(), dispatcher).spawn(event_rx);

        event_tx
            .send(CentralEvent::PowerStateChanged(PowerState::Unsupported))
            .unwrap();
        while handle.state().await.unwrap() != CentralState::BleUnsupported {
            tokio::task::yield_now().await;
        }
        handle.shutdown().await;
        assert!(transport.commands().is_empty());
    }
}
