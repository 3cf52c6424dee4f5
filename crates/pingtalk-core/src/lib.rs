//! Pingtalk Core Library
//!
//! 低功耗蓝牙设备发现、特征浏览和 PING/ACK 往返测量的核心实现。
//! 具体的蓝牙协议栈通过 [`ble::transport`] 中的 trait 接入。
//!
//! # 模块
//!
//! - **protocol**: PING/ACK 消息编解码
//! - **ble**: UUID、能力位集、描述符、传输层 trait 和回调事件、委托分发
//! - **store**: 外设 → 服务 → 特征 三级发现存储
//! - **central**: 发起端扫描/连接状态机
//! - **responder**: Ping 响应端状态机
//! - **listener**: Ping 监听/应答状态机
//! - **catalog**: 浏览会话的展示模型
//!
//! # 使用示例
//!
//! ## 浏览附近设备
//!
//! ```ignore
//! use pingtalk_core::{Catalog, CentralManager, DelegateDispatcher};
//!
//! let catalog = Catalog::new();
//! let (dispatcher, _delegate) = DelegateDispatcher::spawn(catalog.clone());
//! let handle = CentralManager::new(transport, dispatcher).spawn(events);
//! handle.start_listening(None).await?;
//!
//! for row in catalog.rows() {
//!     println!("{} {}", row.title, row.rssi);
//! }
//! ```
//!
//! ## 应答 Ping
//!
//! ```ignore
//! use pingtalk_core::PingListener;
//!
//! let listener = PingListener::new(transport).spawn(events);
//! ```

pub mod ble;
pub mod catalog;
pub mod central;
pub mod config;
pub mod error;
pub mod listener;
pub mod logging;
pub mod protocol;
pub mod responder;
pub mod store;

// BLE re-exports
pub use ble::delegate::{CentralDelegate, DelegateDispatcher, DelegateEvent};
pub use ble::events::{CentralEvent, PeripheralEvent, PowerState, WriteRequest};
pub use ble::properties::{AttributePermissions, AutoReadPolicy, CharacteristicProperties};
pub use ble::transport::{CentralTransport, PeripheralTransport, TransportError};
pub use ble::{
    DEVICE_INFORMATION_SERVICE_UUID, PING_NOTIFY_CHAR_UUID, PING_SERVICE_UUID,
    PING_WRITE_CHAR_UUID,
};

// State machine re-exports
pub use catalog::{Catalog, CatalogChange, DetailRow, DetailSection, PeripheralRow};
pub use central::{CentralHandle, CentralManager, CentralState, StartListeningResult};
pub use listener::{ListenerState, PingListener};
pub use responder::{PingResponder, ResponderState};

pub use config::AppSettings;
pub use error::PingtalkError;
pub use logging::LogLevel;
pub use protocol::Message;
pub use store::PeripheralStore;
