//! Pingtalk 演示程序
//!
//! 在进程内回环射频上运行 Ping 往返或浏览会话

use anyhow::Result;
use clap::{Parser, Subcommand};
use pingtalk_core::ble::parse_uuid;
use pingtalk_core::{AppSettings, LogLevel, ResponderState};
use pingtalk_sim::{demo_radio, session};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pingtalk-sim", version, about = "Pingtalk loopback simulator")]
struct Cli {
    /// 日志级别 (默认取设置文件)
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 一个角色广播并发送 PING，另一个角色应答 ACK
    Ping {
        /// 响应端广播的名称
        #[arg(short, long)]
        name: Option<String>,
    },
    /// 扫描并浏览所有模拟外设
    Browse {
        /// 只扫描包含该服务的外设 (如 180A)
        #[arg(short, long)]
        filter: Option<String>,
        /// 以 JSON 输出
        #[arg(long)]
        json: bool,
        /// 判定阶段结束的静默时长 (毫秒)
        #[arg(long, default_value = "100")]
        quiet_ms: u64,
    },
}

fn init_tracing(level: LogLevel) {
    // 桥接 log crate（pingtalk-core 使用）到 tracing
    let _ = tracing_log::LogTracer::init();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.directive())),
        )
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut settings = AppSettings::load();
    init_tracing(cli.log_level.unwrap_or(settings.log_level));

    let radio = demo_radio();
    radio.power_on();

    match cli.command {
        Commands::Ping { name } => {
            let name = name.unwrap_or_else(|| settings.device_name.clone());
            println!("📡 Advertising as '{}'", name);
            let outcome = session::ping_exchange(&radio, &name).await?;
            println!("Listener: {}", outcome.listener.describe());
            println!(
                "{}",
                ResponderState::Acknowledged(outcome.round_trip).describe()
            );
        }
        Commands::Browse {
            filter,
            json,
            quiet_ms,
        } => {
            if let Some(filter) = filter {
                // 先校验再写入设置
                parse_uuid(&filter)?;
                settings.service_filter = filter;
            }
            let devices =
                session::browse(&radio, &settings, Duration::from_millis(quiet_ms)).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&devices)?);
            } else if devices.is_empty() {
                println!("   No peripherals found");
            } else {
                for (i, device) in devices.iter().enumerate() {
                    println!("[{}] {} ({} dBm) {}", i, device.name, device.rssi, device.identifier);
                    for service in &device.services {
                        println!("    {} ({})", service.name, service.identifier);
                        for c in &service.characteristics {
                            println!("        {:<28} {:<18} {}", c.name, c.value, c.properties);
                        }
                    }
                }
            }
        }
    }

    tracing::debug!("Done");
    Ok(())
}
