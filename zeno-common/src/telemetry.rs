use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Bytes in one GiB, for converting raw memory readings.
pub const BYTES_PER_GIB: f64 = (1u64 << 30) as f64;

/// One point-in-time reading pushed to the client each cycle.
///
/// Serializes to exactly the wire schema the visualization client expects;
/// `gpu` is emitted as JSON `null` when no GPU source answered that cycle,
/// never omitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSnapshot {
    /// Unix epoch seconds when the sample was taken.
    pub ts: f64,

    /// Host CPU reading.
    pub cpu: CpuMetrics,

    /// Host memory reading.
    pub ram: RamMetrics,

    /// GPU reading, absent when neither GPU source succeeded.
    pub gpu: Option<GpuSnapshot>,
}

/// Host-wide CPU usage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CpuMetrics {
    /// Usage percentage, 0-100.
    pub percent: f32,
}

/// Host memory usage in GiB.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RamMetrics {
    pub used_gb: f64,
    pub total_gb: f64,
}

/// GPU reading for device index 0.
///
/// Fully populated or entirely absent from a [`MetricSnapshot`], never
/// partial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpuSnapshot {
    /// GPU utilization percentage, 0-100.
    pub util: u32,

    /// Device memory in use, GiB.
    pub mem_used_gb: f64,

    /// Total device memory, GiB.
    pub mem_total_gb: f64,

    /// Core temperature in degrees Celsius.
    pub temp: i32,

    /// Device name as reported by the driver.
    pub name: String,
}

/// Current time as fractional seconds since the Unix epoch.
///
/// Returns 0.0 if system time is before the Unix epoch (should never happen
/// in practice).
pub fn current_timestamp_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
