//! 在回环射频上运行的完整会话

use crate::device::{CharacteristicSummary, DeviceSummary, ServiceSummary};
use crate::radio::LoopbackRadio;
use anyhow::{Context, Result, bail};
use log::{debug, info};
use pingtalk_core::{
    AppSettings, Catalog, CatalogChange, CentralHandle, CentralManager, CentralState,
    DelegateDispatcher, ListenerState, PingListener, PingResponder, ResponderState,
    StartListeningResult,
};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::timeout;

const EXCHANGE_TIMEOUT: Duration = Duration::from_secs(5);

/// 一次 PING/ACK 往返的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingOutcome {
    pub round_trip: Duration,
    pub listener: ListenerState,
}

/// 在同一个射频上同时扮演响应端和监听端，完成一次往返
pub async fn ping_exchange(radio: &LoopbackRadio, device_name: &str) -> Result<PingOutcome> {
    let (peripheral, peripheral_events) = radio.peripheral();
    let responder = PingResponder::new(peripheral, device_name);
    let mut responder_state = responder.subscribe_state();
    let responder_task = responder.spawn(peripheral_events);

    let (central, central_events) = radio.central();
    let listener = PingListener::new(central);
    let mut listener_state = listener.subscribe_state();
    let listener_task = listener.spawn(central_events);

    let round_trip = timeout(EXCHANGE_TIMEOUT, wait_for_ack(&mut responder_state))
        .await
        .context("Timed out waiting for ACK")??;

    let listener = *listener_state.borrow_and_update();
    info!("Ping exchange finished in {} ms", round_trip.as_millis());

    radio.shutdown();
    let _ = responder_task.await;
    let _ = listener_task.await;

    Ok(PingOutcome {
        round_trip,
        listener,
    })
}

/// 浏览射频上的所有外设：扫描、逐个连接并读取可读特征
///
/// `quiet` 为判定一个阶段结束所需的无变更时长。
pub async fn browse(
    radio: &LoopbackRadio,
    settings: &AppSettings,
    quiet: Duration,
) -> Result<Vec<DeviceSummary>> {
    let filter = settings.service_filter_uuid()?;

    let catalog = Catalog::new();
    let mut changes = catalog.subscribe();
    let (dispatcher, delegate_task) = DelegateDispatcher::spawn(catalog.clone());

    let (central, events) = radio.central();
    let handle = CentralManager::new(central, dispatcher)
        .with_settings(settings)
        .spawn(events);

    wait_until_ready(&handle).await?;
    match handle.start_listening(filter).await? {
        StartListeningResult::StartedListening => {}
        other => bail!("Could not start scanning: {:?}", other),
    }
    settle(&mut changes, quiet).await;
    handle.stop_listening().await?;

    for row in catalog.rows() {
        debug!("Browsing {}", row.identifier);
        handle.connect(row.transport_id).await?;
        settle(&mut changes, quiet).await;
        handle.disconnect(row.transport_id).await?;
        settle(&mut changes, quiet).await;
    }

    handle.shutdown().await;
    let _ = delegate_task.await;

    Ok(summarize(&catalog))
}

/// 把展示模型转换成可序列化的摘要
pub fn summarize(catalog: &Catalog) -> Vec<DeviceSummary> {
    catalog
        .rows()
        .into_iter()
        .map(|row| {
            let services = catalog
                .detail(&row.identifier)
                .unwrap_or_default()
                .into_iter()
                .map(|section| ServiceSummary {
                    identifier: section.identifier,
                    name: section.title,
                    characteristics: section
                        .rows
                        .into_iter()
                        .map(|r| CharacteristicSummary {
                            identifier: r.identifier,
                            name: r.title,
                            value: r.content,
                            properties: r.accessory,
                        })
                        .collect(),
                })
                .collect();
            DeviceSummary {
                identifier: row.identifier,
                name: row.title,
                rssi: row.rssi,
                services,
            }
        })
        .collect()
}

async fn wait_for_ack(state: &mut watch::Receiver<ResponderState>) -> Result<Duration> {
    loop {
        if let ResponderState::Acknowledged(rtt) = *state.borrow_and_update() {
            return Ok(rtt);
        }
        state.changed().await.context("Responder stopped")?;
    }
}

async fn wait_until_ready(handle: &CentralHandle) -> Result<()> {
    timeout(EXCHANGE_TIMEOUT, poll_ready(handle))
        .await
        .context("Timed out waiting for the adapter")?
}

async fn poll_ready(handle: &CentralHandle) -> Result<()> {
    loop {
        match handle.state().await? {
            CentralState::ReadyForUse | CentralState::ReadyToScan => return Ok(()),
            CentralState::BleUnsupported => bail!("Bluetooth LE is not supported"),
            _ => tokio::time::sleep(Duration::from_millis(10)).await,
        }
    }
}

/// 等到 `quiet` 时间内没有新的变更
async fn settle(changes: &mut broadcast::Receiver<CatalogChange>, quiet: Duration) {
    loop {
        match timeout(quiet, changes.recv()).await {
            Ok(Ok(change)) => debug!("Catalog: {:?}", change),
            Ok(Err(RecvError::Lagged(skipped))) => debug!("Skipped {} catalog changes", skipped),
            Ok(Err(RecvError::Closed)) | Err(_) => break,
        }
    }
}
