//! Timeline Engine - a thin Vulkan layer built around a submission timeline
//!
//! Every GPU submission gets a monotonically increasing point. The engine
//! tracks in-flight points with fences, chains submissions with semaphores,
//! and uses the highest completed point to decide when command buffers and
//! GPU resources can be reused or destroyed.
//!
//! # Features
//! - Single and multi-queue submits (fork/merge across graphics and compute)
//! - Fence and semaphore recycling
//! - Deferred destruction of buffers, images and semaphores
//! - Timeline-aware command buffer reuse
//! - A recording dummy backend for running without a GPU

pub mod backend;
pub mod command;
pub mod config;
pub mod destroyer;
pub mod engine;
pub mod error;
pub mod frame;
pub mod platform;
pub mod queue;
pub mod sync;

pub use backend::{DummyApi, GpuApi, SubmitBatch, VulkanApi};
pub use command::CommandBufferRecycler;
pub use config::EngineConfig;
pub use destroyer::{SafeResourceDestroyer, VulkanResource};
pub use engine::{AcquiredImage, Engine, PresentStatus, SubmitParams};
pub use error::{EngineError, EngineResult};
pub use frame::FramePacer;
pub use platform::{HeadlessWindow, PlatformWindow, Window, WindowConfig, WindowType};
#[cfg(feature = "desktop")]
pub use platform::DesktopWindow;
pub use queue::{CommandBufferType, DeviceQueues, QueueFamilyIndices, QueueType};
pub use sync::{SubmitSync, SubmitSyncManager};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
