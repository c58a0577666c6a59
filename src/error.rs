//! Error types for the engine.

use ash::vk;
use thiserror::Error;

/// Errors that can occur while driving the GPU.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Required extension not supported: {0}")]
    MissingExtension(String),

    #[error("Operation timed out")]
    Timeout,

    #[error("Device lost")]
    DeviceLost,

    #[error("Out of memory")]
    OutOfMemory,

    #[error("Swapchain is out of date")]
    SwapchainOutOfDate,

    #[error("Surface lost")]
    SurfaceLost,

    #[error("No swapchain attached to the window")]
    NoSwapchain,

    #[error("Submission point {0} is not tracked by the timeline")]
    UnknownSubmission(u64),

    #[error("Vulkan error: {0:?}")]
    Vulkan(vk::Result),
}

impl From<vk::Result> for EngineError {
    fn from(result: vk::Result) -> Self {
        match result {
            vk::Result::TIMEOUT | vk::Result::NOT_READY => EngineError::Timeout,
            vk::Result::ERROR_DEVICE_LOST => EngineError::DeviceLost,
            vk::Result::ERROR_OUT_OF_HOST_MEMORY | vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => {
                EngineError::OutOfMemory
            }
            vk::Result::ERROR_OUT_OF_DATE_KHR => EngineError::SwapchainOutOfDate,
            vk::Result::ERROR_SURFACE_LOST_KHR => EngineError::SurfaceLost,
            other => EngineError::Vulkan(other),
        }
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
