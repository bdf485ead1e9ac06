//! ZENO telemetry sidecar.
//!
//! Samples host CPU, memory, and (when available) GPU metrics on a fixed
//! cadence and streams them as JSON text frames over a WebSocket to a
//! visualization client.
//!
//! - [`config`] - file/env/CLI configuration resolution
//! - [`gpu`] - GPU metric resolver with NVML and `nvidia-smi` fallback
//! - [`sampler`] - per-connection sampling loop
//! - [`http`] - liveness, health, and the `/metrics` WebSocket endpoint

pub mod config;
pub mod gpu;
pub mod http;
pub mod sampler;

pub use config::{ConfigError, EnvOverrides, SidecarConfig};
pub use gpu::{GpuResolver, GpuSource};
pub use http::HttpServer;
pub use sampler::Sampler;
