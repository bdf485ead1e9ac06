//! GPU metric acquisition with a two-tier fallback.
//!
//! The resolver tries NVML first and falls back to the `nvidia-smi` CLI
//! tool when the library is unavailable or a query fails. Both paths
//! degrade to `None`; a cycle without GPU data is not an error.

use std::fmt;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use zeno_common::telemetry::{BYTES_PER_GIB, GpuSnapshot};

#[cfg(not(target_os = "macos"))]
use nvml_wrapper::Nvml;
#[cfg(not(target_os = "macos"))]
use nvml_wrapper::enum_wrappers::device::TemperatureSensor;

/// MiB in one GiB. The `nounits` CSV output of the query tool reports
/// memory in MiB.
const MIB_PER_GIB: f64 = 1024.0;

/// External query tool, resolved via the host's PATH.
const QUERY_TOOL: &str = "nvidia-smi";

const QUERY_ARGS: [&str; 2] = [
    "--query-gpu=utilization.gpu,memory.used,memory.total,temperature.gpu,name",
    "--format=csv,noheader,nounits",
];

/// Which source produced (or failed to produce) a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuSource {
    /// Direct in-process NVML query.
    Nvml,
    /// Out-of-process `nvidia-smi` query.
    NvidiaSmi,
    /// Neither source answered this cycle.
    Unavailable,
}

impl fmt::Display for GpuSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpuSource::Nvml => write!(f, "nvml"),
            GpuSource::NvidiaSmi => write!(f, "nvidia-smi"),
            GpuSource::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// Resolver for GPU metrics.
///
/// Constructed once at startup and shared across connections; its state is
/// read-only after construction. NVML initialization happens here at most
/// once per process, and a failed init permanently routes probes to the
/// fallback tool. NVML is released when the resolver drops.
pub struct GpuResolver {
    #[cfg(not(target_os = "macos"))]
    nvml: Option<Nvml>,
    tool_timeout: Duration,
}

impl GpuResolver {
    pub fn new(tool_timeout: Duration) -> Self {
        #[cfg(not(target_os = "macos"))]
        let nvml = Nvml::init().ok();

        #[cfg(not(target_os = "macos"))]
        match &nvml {
            Some(_) => tracing::info!("NVML initialized"),
            None => tracing::info!(tool = QUERY_TOOL, "NVML unavailable, using fallback tool"),
        }

        Self {
            #[cfg(not(target_os = "macos"))]
            nvml,
            tool_timeout,
        }
    }

    /// Produce at most one snapshot for device index 0, or `None` when no
    /// source succeeded this cycle.
    pub async fn probe(&self) -> Option<GpuSnapshot> {
        let (snapshot, source) = self.probe_with_source().await;
        tracing::trace!(source = %source, found = snapshot.is_some(), "GPU probe");
        snapshot
    }

    /// Like [`probe`](Self::probe), also reporting which source answered.
    pub async fn probe_with_source(&self) -> (Option<GpuSnapshot>, GpuSource) {
        if let Some(snapshot) = self.probe_nvml() {
            return (Some(snapshot), GpuSource::Nvml);
        }
        match self.probe_tool().await {
            Some(snapshot) => (Some(snapshot), GpuSource::NvidiaSmi),
            None => (None, GpuSource::Unavailable),
        }
    }

    /// Query NVML for device 0. Any error along the way abandons the path.
    #[cfg(not(target_os = "macos"))]
    fn probe_nvml(&self) -> Option<GpuSnapshot> {
        let nvml = self.nvml.as_ref()?;
        if nvml.device_count().ok()? == 0 {
            return None;
        }

        let device = nvml.device_by_index(0).ok()?;
        let util = device.utilization_rates().ok()?.gpu;
        let memory = device.memory_info().ok()?;
        let temp = device.temperature(TemperatureSensor::Gpu).ok()?;
        let name = device.name().ok()?;

        Some(GpuSnapshot {
            util,
            mem_used_gb: memory.used as f64 / BYTES_PER_GIB,
            mem_total_gb: memory.total as f64 / BYTES_PER_GIB,
            temp: temp as i32,
            name,
        })
    }

    #[cfg(target_os = "macos")]
    fn probe_nvml(&self) -> Option<GpuSnapshot> {
        None
    }

    /// Query the external tool once, bounded by the configured timeout.
    async fn probe_tool(&self) -> Option<GpuSnapshot> {
        let line = query_tool_line(QUERY_TOOL, &QUERY_ARGS, self.tool_timeout).await?;
        parse_query_line(&line)
    }
}

/// Run a query command and return the first line of its stdout.
///
/// A missing executable, timeout, or non-zero exit all yield `None`. The
/// child is killed on drop so a timed-out invocation leaves no orphan.
async fn query_tool_line(program: &str, args: &[&str], timeout: Duration) -> Option<String> {
    let result = tokio::time::timeout(
        timeout,
        Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output(),
    )
    .await;

    let output = result.ok()?.ok()?;
    if !output.status.success() {
        return None;
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    stdout.lines().next().map(str::to_string)
}

/// Parse one `csv,noheader,nounits` line into a snapshot.
///
/// Expects utilization, memory used (MiB), memory total (MiB), temperature,
/// and name. The name keeps any embedded commas. Fewer than five fields or
/// a non-numeric reading yield `None`.
fn parse_query_line(line: &str) -> Option<GpuSnapshot> {
    let parts: Vec<&str> = line.splitn(5, ',').map(str::trim).collect();
    if parts.len() < 5 {
        return None;
    }

    let util = parts[0].parse().ok()?;
    let mem_used_mib: f64 = parts[1].parse().ok()?;
    let mem_total_mib: f64 = parts[2].parse().ok()?;
    let temp = parts[3].parse().ok()?;

    Some(GpuSnapshot {
        util,
        mem_used_gb: mem_used_mib / MIB_PER_GIB,
        mem_total_gb: mem_total_mib / MIB_PER_GIB,
        temp,
        name: parts[4].to_string(),
    })
}
