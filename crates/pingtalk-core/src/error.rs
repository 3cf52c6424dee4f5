//! 错误类型

use crate::ble::transport::TransportError;

/// pingtalk 核心错误
///
/// 状态机内部的查找失败、解码失败只记录日志，不会以错误形式返回；
/// 这里只包含调用方需要处理的情况。
#[derive(Debug, thiserror::Error)]
pub enum PingtalkError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Invalid UUID: {0}")]
    InvalidUuid(String),

    #[error("Event loop has shut down")]
    ChannelClosed,

    #[error("Config error: {0}")]
    Config(String),
}
