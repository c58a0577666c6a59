//! GPU API abstraction layer
//!
//! Every Vulkan call the submission core makes goes through [`GpuApi`]. The
//! [`vulkan`] backend forwards to `ash`; the [`dummy`] backend records calls and
//! simulates fence signaling so the timeline logic can be exercised without a GPU.

pub mod dummy;
pub mod vulkan;

use ash::prelude::VkResult;
use ash::vk;

pub use dummy::DummyApi;
pub use vulkan::VulkanApi;

/// One `VkSubmitInfo` worth of work, with owned arrays.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmitBatch {
    pub wait_semaphores: Vec<vk::Semaphore>,
    pub wait_stages: Vec<vk::PipelineStageFlags>,
    pub command_buffers: Vec<vk::CommandBuffer>,
    pub signal_semaphores: Vec<vk::Semaphore>,
}

impl SubmitBatch {
    /// Stage mask used for every semaphore wait issued by the engine.
    pub const WAIT_STAGE: vk::PipelineStageFlags = vk::PipelineStageFlags::ALL_COMMANDS;

    pub fn new() -> Self {
        Self::default()
    }

    /// Add a semaphore wait.
    pub fn wait(mut self, semaphore: vk::Semaphore) -> Self {
        self.wait_semaphores.push(semaphore);
        self.wait_stages.push(Self::WAIT_STAGE);
        self
    }

    /// Add a semaphore signal.
    pub fn signal(mut self, semaphore: vk::Semaphore) -> Self {
        self.signal_semaphores.push(semaphore);
        self
    }

    /// Append command buffers to execute.
    pub fn command_buffers(mut self, command_buffers: &[vk::CommandBuffer]) -> Self {
        self.command_buffers.extend_from_slice(command_buffers);
        self
    }

    /// True if the batch carries no command buffers (pure synchronization).
    pub fn is_sync_only(&self) -> bool {
        self.command_buffers.is_empty()
    }
}

/// The Vulkan entry points used by the engine.
///
/// Methods mirror the Vulkan calls one to one and return raw [`vk::Result`]
/// codes; callers decide how to map them. Handles passed in must have been
/// created through the same implementation.
pub trait GpuApi: Send + Sync {
    /// Human readable backend name, for logging.
    fn name(&self) -> &'static str;

    fn create_fence(&self, flags: vk::FenceCreateFlags) -> VkResult<vk::Fence>;
    fn destroy_fence(&self, fence: vk::Fence);
    /// Wait for a single fence. A zero timeout polls.
    fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> VkResult<()>;
    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()>;

    fn create_semaphore(&self) -> VkResult<vk::Semaphore>;
    fn destroy_semaphore(&self, semaphore: vk::Semaphore);

    /// Create a resettable command pool for a queue family.
    fn create_command_pool(&self, queue_family: u32) -> VkResult<vk::CommandPool>;
    fn destroy_command_pool(&self, pool: vk::CommandPool);
    /// Allocate one primary command buffer.
    fn allocate_command_buffer(&self, pool: vk::CommandPool) -> VkResult<vk::CommandBuffer>;
    fn free_command_buffer(&self, pool: vk::CommandPool, command_buffer: vk::CommandBuffer);
    /// Begin recording with `ONE_TIME_SUBMIT`. Implicitly resets the buffer.
    fn begin_command_buffer(&self, command_buffer: vk::CommandBuffer) -> VkResult<()>;

    /// Submit batches to a queue in one call. `fence` may be null.
    fn queue_submit(
        &self,
        queue: vk::Queue,
        batches: &[SubmitBatch],
        fence: vk::Fence,
    ) -> VkResult<()>;

    /// Returns the image index and whether the swapchain is suboptimal.
    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout_ns: u64,
        semaphore: vk::Semaphore,
        fence: vk::Fence,
    ) -> VkResult<(u32, bool)>;

    /// Returns whether the swapchain is suboptimal.
    fn queue_present(
        &self,
        queue: vk::Queue,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait_semaphore: Option<vk::Semaphore>,
    ) -> VkResult<bool>;

    fn destroy_buffer(&self, buffer: vk::Buffer);
    fn destroy_image(&self, image: vk::Image);
    fn free_memory(&self, memory: vk::DeviceMemory);

    fn device_wait_idle(&self) -> VkResult<()>;
}
