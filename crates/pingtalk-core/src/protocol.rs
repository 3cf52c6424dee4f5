//! Ping 协议消息编解码
//!
//! 线上只有两种消息：`PING` 和 `ACK`，均以 UTF-8 文本形式写入特征值。
//! 解码要求整个缓冲区与规范形式完全一致，不做大小写折叠、不去空白、不支持部分匹配。

use std::fmt;

/// Ping 协议消息
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Message {
    Ping,
    Ack,
}

impl Message {
    pub const ALL: [Message; 2] = [Message::Ping, Message::Ack];

    /// 规范文本形式
    pub const fn as_str(&self) -> &'static str {
        match self {
            Message::Ping => "PING",
            Message::Ack => "ACK",
        }
    }

    /// 编码为特征值字节
    pub fn encode(&self) -> Vec<u8> {
        self.as_str().as_bytes().to_vec()
    }

    /// 从特征值字节解码
    ///
    /// 非 UTF-8 或不是两个规范形式之一时返回 `None`。
    pub fn decode(data: &[u8]) -> Option<Self> {
        let text = std::str::from_utf8(data).ok()?;
        Self::ALL.into_iter().find(|m| m.as_str() == text)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_every_variant() {
        for msg in Message::ALL {
            assert_eq!(Message::decode(&msg.encode()), Some(msg));
        }
    }

    #[test]
    fn test_canonical_bytes() {
        assert_eq!(Message::Ping.encode(), b"PING".to_vec());
        assert_eq!(Message::Ack.encode(), b"ACK".to_vec());
    }

    #[test]
    fn test_rejects_unknown_input() {
        assert_eq!(Message::decode(b"garbage"), None);
        assert_eq!(Message::decode(b""), None);
    }

    #[test]
    fn test_no_lenient_matching() {
        assert_eq!(Message::decode(b"ping"), None);
        assert_eq!(Message::decode(b" PING"), None);
        assert_eq!(Message::decode(b"ACK\n"), None);
        assert_eq!(Message::decode(b"PIN"), None);
        // 非法 UTF-8
        assert_eq!(Message::decode(&[0xff, 0xfe, 0x41]), None);
    }
}
