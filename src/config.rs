//! Engine configuration.

use std::ffi::{CStr, CString};

use ash::vk;

/// Default number of frames the CPU may record ahead of the GPU.
pub const DEFAULT_FRAMES_IN_FLIGHT: usize = 3;

/// Configuration for initializing the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Application name reported to the driver
    pub application_name: String,
    /// Vulkan API version requested at instance creation
    pub api_version: u32,
    /// Enable the Khronos validation layer and debug messenger when available
    pub validation: bool,
    /// Device extensions required in addition to the window's
    pub device_extensions: Vec<CString>,
    /// Priorities for the graphics and compute queues
    pub queue_priorities: [f32; 2],
    /// Number of frames in flight used by frame pacing
    pub frames_in_flight: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            application_name: "Timeline Engine".to_string(),
            api_version: vk::make_api_version(0, 1, 2, 0),
            validation: cfg!(debug_assertions),
            device_extensions: Vec::new(),
            queue_priorities: [1.0, 1.0],
            frames_in_flight: DEFAULT_FRAMES_IN_FLIGHT,
        }
    }
}

impl EngineConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the application name.
    pub fn with_application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = name.into();
        self
    }

    /// Set the requested Vulkan API version.
    pub fn with_api_version(mut self, api_version: u32) -> Self {
        self.api_version = api_version;
        self
    }

    /// Enable or disable validation.
    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.validation = enabled;
        self
    }

    /// Require an additional device extension.
    pub fn with_device_extension(mut self, name: &CStr) -> Self {
        let name = name.to_owned();
        if !self.device_extensions.contains(&name) {
            self.device_extensions.push(name);
        }
        self
    }

    /// Set graphics and compute queue priorities.
    pub fn with_queue_priorities(mut self, graphics: f32, compute: f32) -> Self {
        self.queue_priorities = [graphics, compute];
        self
    }

    /// Set the number of frames in flight. Clamped to at least one.
    pub fn with_frames_in_flight(mut self, frames: usize) -> Self {
        self.frames_in_flight = frames.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.frames_in_flight, DEFAULT_FRAMES_IN_FLIGHT);
        assert_eq!(config.api_version, vk::API_VERSION_1_2);
        assert!(config.device_extensions.is_empty());
    }

    #[test]
    fn test_builder() {
        let config = EngineConfig::new()
            .with_application_name("demo")
            .with_validation(false)
            .with_device_extension(ash::khr::swapchain::NAME)
            .with_device_extension(ash::khr::swapchain::NAME)
            .with_frames_in_flight(0);

        assert_eq!(config.application_name, "demo");
        assert!(!config.validation);
        assert_eq!(config.device_extensions.len(), 1);
        assert_eq!(config.frames_in_flight, 1);
    }
}
