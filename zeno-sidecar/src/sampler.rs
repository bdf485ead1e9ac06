//! Per-connection sampling loop.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use sysinfo::System;
use tokio::sync::watch;
use tracing::{debug, warn};

use zeno_common::telemetry::{
    BYTES_PER_GIB, CpuMetrics, MetricSnapshot, RamMetrics, current_timestamp_secs,
};

use crate::gpu::GpuResolver;

/// Drives periodic metric collection and delivery for one accepted
/// connection.
///
/// Each connection owns its own [`System`]; only the GPU resolver is shared
/// across connections.
pub struct Sampler {
    system: System,
    resolver: Arc<GpuResolver>,
    interval: Duration,
}

impl Sampler {
    pub fn new(resolver: Arc<GpuResolver>, interval: Duration) -> Self {
        Self {
            system: System::new(),
            resolver,
            interval,
        }
    }

    /// Collect one snapshot.
    ///
    /// Host CPU and RAM reads always succeed; the GPU field degrades to
    /// `None` on its own and never interrupts the rest of the sample.
    pub async fn sample(&mut self) -> MetricSnapshot {
        self.system.refresh_cpu_usage();
        self.system.refresh_memory();

        let cpu = CpuMetrics {
            percent: self.system.global_cpu_usage(),
        };
        let ram = RamMetrics {
            used_gb: self.system.used_memory() as f64 / BYTES_PER_GIB,
            total_gb: self.system.total_memory() as f64 / BYTES_PER_GIB,
        };
        let gpu = self.resolver.probe().await;

        MetricSnapshot {
            ts: current_timestamp_secs(),
            cpu,
            ram,
            gpu,
        }
    }

    /// Stream snapshots over one socket until the peer goes away or
    /// shutdown is signalled.
    ///
    /// A failed send ends the session; no retry. The final close is
    /// best-effort and its error swallowed, so a client that already
    /// disconnected never takes the process down.
    pub async fn run(mut self, mut socket: WebSocket, mut shutdown: watch::Receiver<bool>) {
        loop {
            let snapshot = self.sample().await;

            match serde_json::to_string(&snapshot) {
                Ok(text) => {
                    if socket.send(Message::Text(text)).await.is_err() {
                        debug!("Client disconnected, ending stream");
                        break;
                    }
                }
                Err(e) => warn!(error = %e, "Failed to encode snapshot"),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("Shutdown signalled, ending stream");
                        break;
                    }
                }
            }
        }

        let _ = socket.send(Message::Close(None)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sample_reports_host_metrics() {
        let resolver = Arc::new(GpuResolver::new(Duration::from_millis(200)));
        let mut sampler = Sampler::new(resolver, Duration::from_millis(50));

        let first = sampler.sample().await;
        let second = sampler.sample().await;

        assert!(first.ram.total_gb > 0.0);
        assert!(first.ram.used_gb <= first.ram.total_gb);
        assert!(first.cpu.percent >= 0.0);
        assert!(second.ts >= first.ts);
    }

    #[tokio::test]
    async fn test_sample_serializes_to_wire_schema() {
        let resolver = Arc::new(GpuResolver::new(Duration::from_millis(200)));
        let mut sampler = Sampler::new(resolver, Duration::from_millis(50));

        let snapshot = sampler.sample().await;
        let json = serde_json::to_string(&snapshot).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert!(value.get("ts").unwrap().is_f64());
        assert!(value.pointer("/cpu/percent").is_some());
        assert!(value.pointer("/ram/used_gb").is_some());
        assert!(value.pointer("/ram/total_gb").is_some());
        // Always present, either null or a full object.
        let gpu = value.get("gpu").unwrap();
        assert!(gpu.is_null() || gpu.get("name").is_some());
    }
}
