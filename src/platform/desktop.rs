//! Desktop window using winit, with surfaces created through ash-window.

use std::ffi::CStr;
use std::sync::Arc;

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use winit::dpi::PhysicalSize;
use winit::event_loop::EventLoopWindowTarget;
use winit::window::{Window as WinitWindow, WindowBuilder};

use super::{Window, WindowConfig};
use crate::error::{EngineError, EngineResult};

/// An OS window and the Vulkan surface created for it.
pub struct DesktopWindow {
    window: Arc<WinitWindow>,
    surface: vk::SurfaceKHR,
    surface_loader: Option<ash::khr::surface::Instance>,
    swapchain: vk::SwapchainKHR,
}

impl std::fmt::Debug for DesktopWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DesktopWindow")
            .field("surface", &self.surface)
            .field("swapchain", &self.swapchain)
            .finish_non_exhaustive()
    }
}

impl DesktopWindow {
    /// Wrap an existing winit window.
    pub fn new(window: Arc<WinitWindow>) -> Self {
        Self {
            window,
            surface: vk::SurfaceKHR::null(),
            surface_loader: None,
            swapchain: vk::SwapchainKHR::null(),
        }
    }

    /// Create a winit window from the given parameters.
    pub fn create<T>(target: &EventLoopWindowTarget<T>, config: &WindowConfig) -> EngineResult<Self> {
        let window = WindowBuilder::new()
            .with_title(config.title.as_str())
            .with_inner_size(PhysicalSize::new(config.width, config.height))
            .build(target)
            .map_err(|e| {
                EngineError::InitializationFailed(format!("Failed to create window: {}", e))
            })?;
        Ok(Self::new(Arc::new(window)))
    }

    /// Get the raw winit window.
    pub fn window(&self) -> &WinitWindow {
        &self.window
    }

    /// Get arc reference to window
    pub fn window_arc(&self) -> Arc<WinitWindow> {
        Arc::clone(&self.window)
    }
}

impl Window for DesktopWindow {
    fn required_instance_extensions(&self) -> EngineResult<Vec<&'static CStr>> {
        let display_handle = self
            .window
            .display_handle()
            .map_err(|e| EngineError::InitializationFailed(format!("No display handle: {}", e)))?
            .as_raw();

        let names = ash_window::enumerate_required_extensions(display_handle).map_err(|e| {
            EngineError::InitializationFailed(format!(
                "Failed to query surface extensions: {:?}",
                e
            ))
        })?;

        // SAFETY: ash-window returns pointers to static null-terminated extension names
        Ok(names
            .iter()
            .map(|&name| unsafe { CStr::from_ptr(name) })
            .collect())
    }

    fn required_device_extensions(&self) -> Vec<&'static CStr> {
        vec![ash::khr::swapchain::NAME]
    }

    fn create_surface(&mut self, entry: &ash::Entry, instance: &ash::Instance) -> EngineResult<()> {
        let display_handle = self
            .window
            .display_handle()
            .map_err(|e| EngineError::InitializationFailed(format!("No display handle: {}", e)))?
            .as_raw();
        let window_handle = self
            .window
            .window_handle()
            .map_err(|e| EngineError::InitializationFailed(format!("No window handle: {}", e)))?
            .as_raw();

        let surface = unsafe {
            ash_window::create_surface(entry, instance, display_handle, window_handle, None)
        }
        .map_err(|e| {
            EngineError::InitializationFailed(format!("Failed to create surface: {:?}", e))
        })?;

        self.surface = surface;
        self.surface_loader = Some(ash::khr::surface::Instance::new(entry, instance));
        log::info!("Window surface created");
        Ok(())
    }

    fn surface(&self) -> vk::SurfaceKHR {
        self.surface
    }

    fn swapchain(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    fn set_swapchain(&mut self, swapchain: vk::SwapchainKHR) {
        self.swapchain = swapchain;
    }

    fn extent(&self) -> vk::Extent2D {
        let size = self.window.inner_size();
        vk::Extent2D {
            width: size.width,
            height: size.height,
        }
    }

    fn shutdown(&mut self) {
        self.swapchain = vk::SwapchainKHR::null();
        if let Some(loader) = self.surface_loader.take() {
            unsafe { loader.destroy_surface(self.surface, None) };
            self.surface = vk::SurfaceKHR::null();
            log::info!("Window surface destroyed");
        }
    }
}

impl Drop for DesktopWindow {
    fn drop(&mut self) {
        if self.surface_loader.is_some() {
            log::warn!("DesktopWindow dropped without shutdown; its surface is leaked");
        }
    }
}
