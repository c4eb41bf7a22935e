//! `tb-gemm` - CPU matrix multiply engines with a hardware-aware dispatcher.
//!
//! This crate provides:
//! - One-time CPU capability detection (`CpuFeatures`) and tier selection
//! - A strategy table mapping encoding pairs to register-tiled kernels
//! - A `Dispatcher` that runs, declines or asks for quantized operands
//! - Fair thread partitioning of the output matrix
//! - A `GemmBackend` trait with reference and parallel implementations

pub mod backend;
pub mod config;
pub mod cpu_features;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod lane;
pub mod partition;
pub mod request;
pub mod tier;

// Re-export primary types at the crate root for convenience.
pub use backend::{GemmBackend, ReferenceBackend, TinyBlasBackend};
pub use config::DispatchConfig;
pub use cpu_features::CpuFeatures;
pub use dispatch::{sgemm, Dispatcher, KernelFn, KernelTable, Outcome, Plan};
pub use error::{GemmError, Result};
pub use partition::{partition, Band};
pub use request::{Request, SharedOutput};
pub use tier::Tier;
