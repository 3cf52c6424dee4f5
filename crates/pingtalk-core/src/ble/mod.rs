pub mod delegate;
pub mod descriptor;
pub mod events;
pub mod properties;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

use crate::error::PingtalkError;
use uuid::Uuid;

/// Ping 服务 (16-bit 0x1011)
pub const PING_SERVICE_UUID: Uuid = Uuid::from_u128(0x00001011_0000_1000_8000_00805f9b34fb);
/// Ping 服务的 notify 特征，响应端通过它推送 PING
pub const PING_NOTIFY_CHAR_UUID: Uuid = Uuid::from_u128(0x3ed26148_9747_4566_8010_8ad607a2d3f7);
/// Ping 服务的 write-without-response 特征，发起端通过它写回 ACK
pub const PING_WRITE_CHAR_UUID: Uuid = Uuid::from_u128(0x4c9363e8_b38a_4199_9f03_e04e1e50993f);

pub const DEVICE_INFORMATION_SERVICE_UUID: Uuid = uuid_from_u16(0x180a);

/// 蓝牙基准 UUID 的低 96 位: xxxxxxxx-0000-1000-8000-00805f9b34fb
const BASE_UUID_LOW: u128 = 0x0000_1000_8000_0080_5f9b_34fb;
const BASE_UUID_MASK: u128 = (1u128 << 96) - 1;

/// 已分配编号中本项目会显示名称的部分
const KNOWN_NAMES: &[(u16, &str)] = &[
    (0x180a, "Device Information"),
    (0x2a24, "Model Number String"),
    (0x2a25, "Serial Number String"),
    (0x2a26, "Firmware Revision String"),
    (0x2a27, "Hardware Revision String"),
    (0x2a28, "Software Revision String"),
    (0x2a29, "Manufacturer Name String"),
];

/// 16-bit 短 UUID 展开为完整 UUID
pub const fn uuid_from_u16(short: u16) -> Uuid {
    Uuid::from_u128(((short as u128) << 96) | BASE_UUID_LOW)
}

/// 32-bit 短 UUID 展开为完整 UUID
pub const fn uuid_from_u32(short: u32) -> Uuid {
    Uuid::from_u128(((short as u128) << 96) | BASE_UUID_LOW)
}

/// 如果是基于蓝牙基准 UUID 的 16-bit UUID，返回短形式
pub fn short_form(uuid: &Uuid) -> Option<u16> {
    let value = uuid.as_u128();
    if value & BASE_UUID_MASK != BASE_UUID_LOW || value >> 112 != 0 {
        return None;
    }
    Some((value >> 96) as u16)
}

/// 解析用户输入的 UUID
///
/// 支持 4 位 ("180A")、8 位十六进制短形式和完整 UUID。
pub fn parse_uuid(input: &str) -> Result<Uuid, PingtalkError> {
    let s = input.trim();
    let is_hex = !s.is_empty() && s.chars().all(|c| c.is_ascii_hexdigit());
    let parsed = match s.len() {
        4 if is_hex => u16::from_str_radix(s, 16).ok().map(uuid_from_u16),
        8 if is_hex => u32::from_str_radix(s, 16).ok().map(uuid_from_u32),
        _ => Uuid::parse_str(s).ok(),
    };
    parsed.ok_or_else(|| PingtalkError::InvalidUuid(input.to_string()))
}

/// 可选的服务过滤输入，空字符串视为未设置
pub fn parse_optional_uuid(input: Option<&str>) -> Result<Option<Uuid>, PingtalkError> {
    match input.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => parse_uuid(s).map(Some),
    }
}

/// UUID 的显示字符串：16-bit 用大写短形式，其余用大写完整形式
pub fn uuid_string(uuid: &Uuid) -> String {
    match short_form(uuid) {
        Some(short) => format!("{:04X}", short),
        None => uuid.hyphenated().to_string().to_uppercase(),
    }
}

/// 由传输层设备 ID 派生外设标识
pub fn peripheral_identifier(peripheral: &Uuid) -> String {
    peripheral.hyphenated().to_string().to_uppercase()
}

/// 由服务/特征类型派生标识
pub fn attribute_identifier(uuid: &Uuid) -> String {
    uuid_string(uuid)
}

/// 已知服务/特征的名称
pub fn known_name(uuid: &Uuid) -> Option<&'static str> {
    let short = short_form(uuid)?;
    KNOWN_NAMES
        .iter()
        .find(|(id, _)| *id == short)
        .map(|(_, name)| *name)
}

/// 服务/特征的显示名称，未知时退回标识字符串
pub fn display_name(uuid: &Uuid) -> String {
    known_name(uuid)
        .map(str::to_string)
        .unwrap_or_else(|| uuid_string(uuid))
}
