//! 应用配置和持久化
//!
//! 提供广播名称、服务过滤、自动读取策略等设置的存储和读取。

use crate::ble::descriptor::ConnectOptions;
use crate::ble::parse_optional_uuid;
use crate::ble::properties::AutoReadPolicy;
use crate::error::PingtalkError;
use crate::logging::LogLevel;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// 应用设置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// 响应端广播的本地名称
    pub device_name: String,
    /// 浏览时的服务过滤 (16-bit 短形式或完整 UUID)，空字符串表示不过滤
    pub service_filter: String,
    /// 发现特征后的自动读取策略
    pub auto_read: AutoReadPolicy,
    /// 连接时请求断开提示
    pub notify_on_disconnection: bool,
    /// 日志级别
    pub log_level: LogLevel,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            device_name: get_default_device_name(),
            service_filter: String::new(),
            auto_read: AutoReadPolicy::default(),
            notify_on_disconnection: true,
            log_level: LogLevel::default(),
        }
    }
}

impl AppSettings {
    /// 获取配置文件路径
    pub fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pingtalk");
        config_dir.join("settings.toml")
    }

    /// 加载设置（如果文件不存在或无法解析则使用默认值）
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match fs::read_to_string(path) {
            Ok(content) => match Self::from_toml_str(&content) {
                Ok(settings) => {
                    debug!("Loaded settings from {:?}", path);
                    settings
                }
                Err(e) => {
                    log::warn!("Failed to parse settings: {}, using defaults", e);
                    Self::default()
                }
            },
            Err(e) => {
                log::warn!("Failed to read settings file: {}, using defaults", e);
                Self::default()
            }
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, PingtalkError> {
        toml::from_str(content).map_err(|e| PingtalkError::Config(e.to_string()))
    }

    /// 保存设置
    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        debug!("Saved settings to {:?}", path);
        Ok(())
    }

    /// 解析服务过滤
    pub fn service_filter_uuid(&self) -> Result<Option<Uuid>, PingtalkError> {
        parse_optional_uuid(Some(&self.service_filter))
    }

    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            notify_on_disconnection: self.notify_on_disconnection,
        }
    }
}

/// 获取默认设备名称（主机名）
fn get_default_device_name() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "pingtalk".to_string())
}
