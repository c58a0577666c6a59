use std::ffi::CStr;

use ash::vk;

use super::Window;
use crate::error::EngineResult;

/// A window without a surface.
///
/// Useful for compute-only work and for tests, which attach a swapchain handle
/// directly to drive acquire and present.
#[derive(Debug, Clone, Default)]
pub struct HeadlessWindow {
    extent: vk::Extent2D,
    swapchain: vk::SwapchainKHR,
}

impl HeadlessWindow {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            extent: vk::Extent2D { width, height },
            swapchain: vk::SwapchainKHR::null(),
        }
    }
}

impl Window for HeadlessWindow {
    fn required_instance_extensions(&self) -> EngineResult<Vec<&'static CStr>> {
        Ok(Vec::new())
    }

    fn required_device_extensions(&self) -> Vec<&'static CStr> {
        Vec::new()
    }

    fn create_surface(&mut self, _: &ash::Entry, _: &ash::Instance) -> EngineResult<()> {
        Ok(())
    }

    fn surface(&self) -> vk::SurfaceKHR {
        vk::SurfaceKHR::null()
    }

    fn swapchain(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    fn set_swapchain(&mut self, swapchain: vk::SwapchainKHR) {
        self.swapchain = swapchain;
    }

    fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    fn shutdown(&mut self) {
        self.swapchain = vk::SwapchainKHR::null();
    }
}
