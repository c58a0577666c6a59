//! Main engine orchestrator
//!
//! The [`Engine`] owns the device queues, the submission timeline, the
//! deferred destroyer and the command buffer recycler, and ties them together:
//! completed points reported by the timeline drive resource destruction and
//! command buffer reuse.

mod submit;

use std::time::Duration;

use ash::vk;

pub use self::submit::SubmitParams;
use crate::backend::vulkan::{self, VulkanContext};
use crate::backend::GpuApi;
use crate::command::CommandBufferRecycler;
use crate::config::EngineConfig;
use crate::destroyer::{SafeResourceDestroyer, VulkanResource};
use crate::error::{EngineError, EngineResult};
use crate::frame::FramePacer;
use crate::platform::Window;
use crate::queue::{CommandBufferType, DeviceQueues};
use crate::sync::{timeout_ns, SubmitSync, SubmitSyncManager};

/// A swapchain image handed out by [`Engine::acquire_next_image`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquiredImage {
    /// Signaled once the image is ready to be rendered to.
    pub sync: SubmitSync,
    pub image_index: u32,
    pub suboptimal: bool,
}

/// Outcome of a successful present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentStatus {
    Optimal,
    /// The swapchain still works but should be recreated.
    Suboptimal,
}

/// Submission and synchronization engine.
pub struct Engine {
    config: EngineConfig,
    queues: DeviceQueues,
    submit_sync: SubmitSyncManager,
    destroyer: SafeResourceDestroyer,
    command_buffers: CommandBufferRecycler,
    shut_down: bool,
    // Drop order: the device (inside the API) must go before the instance.
    api: Box<dyn GpuApi>,
    context: Option<VulkanContext>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("backend", &self.api.name())
            .field("last_synced_point", &self.submit_sync.last_synced_point())
            .field("in_flight", &self.submit_sync.in_flight_count())
            .field("pending_destruction", &self.destroyer.pending_count())
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Bring up Vulkan for a window and create the engine on top of it.
    pub fn new(config: EngineConfig, window: &mut dyn Window) -> EngineResult<Self> {
        let setup = vulkan::initialize(&config, window)?;

        let command_buffers =
            match CommandBufferRecycler::new(&setup.api, setup.queues.families()) {
                Ok(command_buffers) => command_buffers,
                Err(e) => {
                    log::error!("Failed to create command pools: {:?}", e);
                    window.shutdown();
                    return Err(e.into());
                }
            };

        log::info!(
            "Engine initialized (validation: {}, unique queues: {})",
            config.validation,
            setup.queues.families().num_unique_queues
        );

        Ok(Self::assemble(
            config,
            Box::new(setup.api),
            setup.queues,
            Some(setup.context),
            command_buffers,
        ))
    }

    /// Create the engine over an already initialized GPU API.
    pub fn with_api(
        config: EngineConfig,
        api: Box<dyn GpuApi>,
        queues: DeviceQueues,
    ) -> EngineResult<Self> {
        let command_buffers = CommandBufferRecycler::new(api.as_ref(), queues.families())?;
        log::info!("Engine initialized on {}", api.name());
        Ok(Self::assemble(config, api, queues, None, command_buffers))
    }

    fn assemble(
        config: EngineConfig,
        api: Box<dyn GpuApi>,
        queues: DeviceQueues,
        context: Option<VulkanContext>,
        command_buffers: CommandBufferRecycler,
    ) -> Self {
        Self {
            config,
            queues,
            submit_sync: SubmitSyncManager::new(),
            destroyer: SafeResourceDestroyer::new(),
            command_buffers,
            shut_down: false,
            api,
            context,
        }
    }

    /// Acquire the next swapchain image of `window`.
    ///
    /// Also destroys resources whose submissions have completed. The returned
    /// sync is tracked on the timeline, so work submitted afterwards waits for
    /// the image.
    pub fn acquire_next_image(
        &mut self,
        window: &dyn Window,
        timeout: Option<Duration>,
    ) -> EngineResult<AcquiredImage> {
        let swapchain = window.swapchain();
        if swapchain == vk::SwapchainKHR::null() {
            return Err(EngineError::NoSwapchain);
        }

        self.collect_garbage();

        let api = self.api.as_ref();
        let sync = self.submit_sync.get_submit_sync(api)?;
        match api.acquire_next_image(swapchain, timeout_ns(timeout), sync.semaphore, sync.fence) {
            Ok((image_index, suboptimal)) => {
                self.submit_sync.insert_into_timeline(sync);
                Ok(AcquiredImage {
                    sync,
                    image_index,
                    suboptimal,
                })
            }
            Err(e) => {
                log::warn!("Failed to acquire swapchain image: {:?}", e);
                self.submit_sync.discard(sync);
                Err(e.into())
            }
        }
    }

    /// Present an image on the graphics queue once the newest submission has
    /// completed.
    pub fn present(&mut self, window: &dyn Window, image_index: u32) -> EngineResult<PresentStatus> {
        let swapchain = window.swapchain();
        if swapchain == vk::SwapchainKHR::null() {
            return Err(EngineError::NoSwapchain);
        }

        let wait = self.submit_sync.last_submit_sync().map(|s| s.semaphore);
        match self
            .api
            .queue_present(self.queues.graphics(), swapchain, image_index, wait)
        {
            Ok(false) => Ok(PresentStatus::Optimal),
            Ok(true) => Ok(PresentStatus::Suboptimal),
            Err(e) => {
                log::warn!("Failed to present image {}: {:?}", image_index, e);
                Err(e.into())
            }
        }
    }

    /// Wait for a submission and retire it with everything older.
    /// `None` waits forever.
    pub fn wait_for_submit_sync(
        &mut self,
        sync: &SubmitSync,
        timeout: Option<Duration>,
    ) -> EngineResult<()> {
        self.submit_sync
            .wait_for_submit_sync(self.api.as_ref(), sync, timeout_ns(timeout))
    }

    /// Get a command buffer in the recording state.
    pub fn acquire_command_buffer(&mut self, ty: CommandBufferType) -> EngineResult<vk::CommandBuffer> {
        self.command_buffers
            .acquire(
                self.api.as_ref(),
                ty,
                self.submit_sync.last_synced_point(),
            )
            .map_err(|e| {
                log::error!("Failed to acquire {:?} command buffer: {:?}", ty, e);
                e.into()
            })
    }

    /// Destroy `resource` once the submission at `submit_point` has completed.
    pub fn enqueue_resource_for_destruction(&mut self, resource: VulkanResource, submit_point: u64) {
        self.destroyer
            .enqueue_resource_for_destruction(resource, submit_point);
    }

    /// Destroy queued resources whose submissions have completed.
    pub fn collect_garbage(&mut self) -> usize {
        self.destroyer
            .process_queue(self.api.as_ref(), self.submit_sync.last_synced_point())
    }

    /// Wait for the device to go idle, then retire everything in flight.
    pub fn wait_idle(&mut self) -> EngineResult<()> {
        self.api.device_wait_idle().map_err(|e| {
            log::error!("Device wait idle failed: {:?}", e);
            EngineError::from(e)
        })?;
        self.submit_sync.retire_all_after_idle(self.api.as_ref());
        self.collect_garbage();
        Ok(())
    }

    /// A frame pacer sized by the configured frames in flight.
    pub fn frame_pacer(&self) -> FramePacer {
        FramePacer::new(self.config.frames_in_flight)
    }

    /// Every point up to and including this one has completed.
    pub fn last_synced_point(&self) -> u64 {
        self.submit_sync.last_synced_point()
    }

    /// The newest tracked submission.
    pub fn last_submit_sync(&self) -> Option<SubmitSync> {
        self.submit_sync.last_submit_sync().copied()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn queues(&self) -> &DeviceQueues {
        &self.queues
    }

    pub fn api(&self) -> &dyn GpuApi {
        self.api.as_ref()
    }

    /// Instance level Vulkan objects, if the engine created them.
    pub fn vulkan_context(&self) -> Option<&VulkanContext> {
        self.context.as_ref()
    }

    pub fn submit_sync_manager(&self) -> &SubmitSyncManager {
        &self.submit_sync
    }

    pub fn safe_resource_destroyer(&self) -> &SafeResourceDestroyer {
        &self.destroyer
    }

    pub fn command_buffer_recycler(&self) -> &CommandBufferRecycler {
        &self.command_buffers
    }

    /// Tear down GPU objects and the window's surface.
    ///
    /// The window must be the one the engine was created with. The device and
    /// instance themselves are destroyed when the engine is dropped.
    pub fn shutdown(&mut self, window: &mut dyn Window) {
        self.release_device_objects();
        window.shutdown();
    }

    fn release_device_objects(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;

        if let Err(e) = self.api.device_wait_idle() {
            log::error!("Device wait idle failed during shutdown: {:?}", e);
        }

        let api = self.api.as_ref();
        let flushed = self.destroyer.flush(api);
        self.command_buffers.destroy(api);
        self.submit_sync.shutdown(api);

        log::info!(
            "Engine shut down ({} deferred resource(s) flushed)",
            flushed
        );
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.release_device_objects();
    }
}
