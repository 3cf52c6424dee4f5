//! 特征属性位集合
//!
//! 特征属性是一个集合，任意组合都可能出现（例如 notify + indicate），
//! 显示格式和自动读取判断都基于集合成员关系，而不是逐个枚举的精确匹配。

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// GATT 特征属性 (蓝牙核心规范 Vol 3, Part G, 3.3.1.1)，另加两个加密要求位
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CharacteristicProperties: u16 {
        const BROADCAST = 0x0001;
        const READ = 0x0002;
        const WRITE_WITHOUT_RESPONSE = 0x0004;
        const WRITE = 0x0008;
        const NOTIFY = 0x0010;
        const INDICATE = 0x0020;
        const AUTHENTICATED_SIGNED_WRITES = 0x0040;
        const EXTENDED_PROPERTIES = 0x0080;
        const NOTIFY_ENCRYPTION_REQUIRED = 0x0100;
        const INDICATE_ENCRYPTION_REQUIRED = 0x0200;
    }
}

bitflags! {
    /// 本地服务特征的访问权限
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AttributePermissions: u8 {
        const READABLE = 0x01;
        const WRITEABLE = 0x02;
    }
}

const ABBREVIATIONS: &[(CharacteristicProperties, &str)] = &[
    (CharacteristicProperties::BROADCAST, "B"),
    (CharacteristicProperties::READ, "R"),
    (CharacteristicProperties::WRITE_WITHOUT_RESPONSE, "WWR"),
    (CharacteristicProperties::WRITE, "W"),
    (CharacteristicProperties::NOTIFY, "N"),
    (CharacteristicProperties::INDICATE, "I"),
    (CharacteristicProperties::AUTHENTICATED_SIGNED_WRITES, "ASW"),
    (CharacteristicProperties::EXTENDED_PROPERTIES, "EP"),
    (CharacteristicProperties::NOTIFY_ENCRYPTION_REQUIRED, "NER"),
    (CharacteristicProperties::INDICATE_ENCRYPTION_REQUIRED, "IER"),
];

/// 发现特征后自动发起一次读取的策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AutoReadPolicy {
    /// 只读取属性恰好为 {Read} 或 {Read, Write} 的特征
    #[default]
    ExactReadOrReadWrite,
    /// 读取所有带 Read 属性的特征
    AnyReadable,
}

impl CharacteristicProperties {
    /// 简写形式，例如 "R, N"；恰好读写时为 "R+W"，空集合为 "-"
    pub fn abbreviation(&self) -> String {
        if self.is_empty() {
            return "-".to_string();
        }
        if *self == Self::READ | Self::WRITE {
            return "R+W".to_string();
        }

        ABBREVIATIONS
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, abbr)| *abbr)
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// 是否应在特征发现后自动读取
    pub fn is_auto_readable(&self, policy: AutoReadPolicy) -> bool {
        match policy {
            AutoReadPolicy::ExactReadOrReadWrite => {
                *self == Self::READ || *self == Self::READ | Self::WRITE
            }
            AutoReadPolicy::AnyReadable => self.contains(Self::READ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type P = CharacteristicProperties;

    #[test]
    fn test_abbreviation() {
        assert_eq!(P::empty().abbreviation(), "-");
        assert_eq!(P::READ.abbreviation(), "R");
        assert_eq!((P::READ | P::WRITE).abbreviation(), "R+W");
        assert_eq!((P::NOTIFY | P::INDICATE).abbreviation(), "N, I");
        assert_eq!(
            (P::READ | P::WRITE | P::NOTIFY).abbreviation(),
            "R, W, N"
        );
        assert_eq!(P::WRITE_WITHOUT_RESPONSE.abbreviation(), "WWR");
    }

    #[test]
    fn test_exact_auto_read() {
        let policy = AutoReadPolicy::ExactReadOrReadWrite;
        assert!(P::READ.is_auto_readable(policy));
        assert!((P::READ | P::WRITE).is_auto_readable(policy));
        assert!(!P::NOTIFY.is_auto_readable(policy));
        assert!(!(P::READ | P::NOTIFY).is_auto_readable(policy));
        assert!(!P::WRITE.is_auto_readable(policy));
    }

    #[test]
    fn test_any_readable_auto_read() {
        let policy = AutoReadPolicy::AnyReadable;
        assert!((P::READ | P::NOTIFY).is_auto_readable(policy));
        assert!(!P::NOTIFY.is_auto_readable(policy));
    }
}
