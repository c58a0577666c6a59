//! Presentation targets the engine can render to.
//!
//! The engine only consumes what [`Window`] exposes: the extensions a surface
//! needs, the surface itself, and the swapchain attached by the swapchain
//! code. The set of window kinds is closed and enumerated by
//! [`PlatformWindow`].

#[cfg(feature = "desktop")]
mod desktop;
mod headless;

use std::ffi::CStr;

use ash::vk;

use crate::error::EngineResult;

#[cfg(feature = "desktop")]
pub use desktop::DesktopWindow;
pub use headless::HeadlessWindow;

/// Which kind of window to create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WindowType {
    /// An OS window with a presentable surface.
    #[default]
    Platform,
    /// No surface; offscreen or compute-only work.
    Headless,
}

/// Initial window parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowConfig {
    pub window_type: WindowType,
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            window_type: WindowType::Platform,
            title: "Timeline Engine".to_string(),
            width: 1600,
            height: 800,
        }
    }
}

/// Capabilities the engine needs from a presentation target.
pub trait Window {
    /// Instance extensions needed to create this window's surface.
    fn required_instance_extensions(&self) -> EngineResult<Vec<&'static CStr>>;

    /// Device extensions needed to present to this window.
    fn required_device_extensions(&self) -> Vec<&'static CStr>;

    /// Create the surface. Called once, right after instance creation.
    fn create_surface(&mut self, entry: &ash::Entry, instance: &ash::Instance) -> EngineResult<()>;

    /// The surface, or null if there is none.
    fn surface(&self) -> vk::SurfaceKHR;

    /// The swapchain presenting to this window, or null if none is attached.
    fn swapchain(&self) -> vk::SwapchainKHR;

    /// Attach the swapchain created for this window's surface.
    fn set_swapchain(&mut self, swapchain: vk::SwapchainKHR);

    /// Current drawable size in pixels.
    fn extent(&self) -> vk::Extent2D;

    /// Destroy the surface. Must run before the instance is destroyed.
    fn shutdown(&mut self);
}

/// The closed set of window kinds.
#[derive(Debug)]
pub enum PlatformWindow {
    #[cfg(feature = "desktop")]
    Desktop(DesktopWindow),
    Headless(HeadlessWindow),
}

impl PlatformWindow {
    pub fn window_type(&self) -> WindowType {
        match self {
            #[cfg(feature = "desktop")]
            PlatformWindow::Desktop(_) => WindowType::Platform,
            PlatformWindow::Headless(_) => WindowType::Headless,
        }
    }

    fn inner(&self) -> &dyn Window {
        match self {
            #[cfg(feature = "desktop")]
            PlatformWindow::Desktop(window) => window,
            PlatformWindow::Headless(window) => window,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Window {
        match self {
            #[cfg(feature = "desktop")]
            PlatformWindow::Desktop(window) => window,
            PlatformWindow::Headless(window) => window,
        }
    }
}

impl Window for PlatformWindow {
    fn required_instance_extensions(&self) -> EngineResult<Vec<&'static CStr>> {
        self.inner().required_instance_extensions()
    }

    fn required_device_extensions(&self) -> Vec<&'static CStr> {
        self.inner().required_device_extensions()
    }

    fn create_surface(&mut self, entry: &ash::Entry, instance: &ash::Instance) -> EngineResult<()> {
        self.inner_mut().create_surface(entry, instance)
    }

    fn surface(&self) -> vk::SurfaceKHR {
        self.inner().surface()
    }

    fn swapchain(&self) -> vk::SwapchainKHR {
        self.inner().swapchain()
    }

    fn set_swapchain(&mut self, swapchain: vk::SwapchainKHR) {
        self.inner_mut().set_swapchain(swapchain);
    }

    fn extent(&self) -> vk::Extent2D {
        self.inner().extent()
    }

    fn shutdown(&mut self) {
        self.inner_mut().shutdown();
    }
}

impl From<HeadlessWindow> for PlatformWindow {
    fn from(window: HeadlessWindow) -> Self {
        PlatformWindow::Headless(window)
    }
}

#[cfg(feature = "desktop")]
impl From<DesktopWindow> for PlatformWindow {
    fn from(window: DesktopWindow) -> Self {
        PlatformWindow::Desktop(window)
    }
}
