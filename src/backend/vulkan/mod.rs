//! Vulkan backend implementation using ash.
//!
//! [`initialize`] brings up the instance, the optional debug messenger, the
//! window surface and the logical device. The result is split in two owners:
//! [`VulkanContext`] holds instance level objects and [`VulkanApi`] holds the
//! logical device behind the [`GpuApi`] seam. The device must go before the
//! instance, so the engine drops the API first.

pub mod debug;
pub mod device;
pub mod instance;

use std::ffi::CStr;

use ash::prelude::VkResult;
use ash::vk;

use self::debug::DebugMessenger;
use super::{GpuApi, SubmitBatch};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::platform::Window;
use crate::queue::DeviceQueues;

/// Instance level Vulkan objects.
pub struct VulkanContext {
    entry: ash::Entry,
    instance: ash::Instance,
    debug_messenger: Option<DebugMessenger>,
    physical_device: vk::PhysicalDevice,
    /// Non-owning clone of the logical device, for swapchain code.
    device: Option<ash::Device>,
}

impl std::fmt::Debug for VulkanContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanContext")
            .field("debug_messenger", &self.debug_messenger.is_some())
            .field("physical_device", &self.physical_device)
            .finish_non_exhaustive()
    }
}

impl VulkanContext {
    /// Get the Vulkan entry.
    pub fn entry(&self) -> &ash::Entry {
        &self.entry
    }

    /// Get the Vulkan instance.
    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    /// Get the selected physical device.
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Get the logical device. Destroyed by [`VulkanApi`], not by the context.
    pub fn device(&self) -> Option<&ash::Device> {
        self.device.as_ref()
    }
}

impl Drop for VulkanContext {
    fn drop(&mut self) {
        if let Some(messenger) = self.debug_messenger.take() {
            messenger.destroy();
        }
        unsafe { self.instance.destroy_instance(None) };
        log::info!("Vulkan instance destroyed");
    }
}

/// [`GpuApi`] over a logical device.
pub struct VulkanApi {
    device: ash::Device,
    swapchain_loader: ash::khr::swapchain::Device,
}

impl std::fmt::Debug for VulkanApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanApi")
            .field("device", &self.device.handle())
            .finish_non_exhaustive()
    }
}

impl VulkanApi {
    /// Take ownership of a logical device created from `instance`.
    pub fn new(instance: &ash::Instance, device: ash::Device) -> Self {
        let swapchain_loader = ash::khr::swapchain::Device::new(instance, &device);
        Self {
            device,
            swapchain_loader,
        }
    }

    /// Get the Vulkan device.
    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    /// Get the swapchain extension loader.
    pub fn swapchain_loader(&self) -> &ash::khr::swapchain::Device {
        &self.swapchain_loader
    }
}

impl Drop for VulkanApi {
    fn drop(&mut self) {
        if let Err(e) = unsafe { self.device.device_wait_idle() } {
            log::warn!("Device wait idle failed before device destruction: {:?}", e);
        }
        unsafe { self.device.destroy_device(None) };
        log::info!("Vulkan device destroyed");
    }
}

impl GpuApi for VulkanApi {
    fn name(&self) -> &'static str {
        "Vulkan Backend (ash)"
    }

    fn create_fence(&self, flags: vk::FenceCreateFlags) -> VkResult<vk::Fence> {
        let fence_info = vk::FenceCreateInfo::default().flags(flags);
        unsafe { self.device.create_fence(&fence_info, None) }
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        unsafe { self.device.destroy_fence(fence, None) };
    }

    fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> VkResult<()> {
        unsafe { self.device.wait_for_fences(&[fence], true, timeout_ns) }
    }

    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()> {
        unsafe { self.device.reset_fences(&[fence]) }
    }

    fn create_semaphore(&self) -> VkResult<vk::Semaphore> {
        let semaphore_info = vk::SemaphoreCreateInfo::default();
        unsafe { self.device.create_semaphore(&semaphore_info, None) }
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        unsafe { self.device.destroy_semaphore(semaphore, None) };
    }

    fn create_command_pool(&self, queue_family: u32) -> VkResult<vk::CommandPool> {
        let pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        unsafe { self.device.create_command_pool(&pool_info, None) }
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        unsafe { self.device.destroy_command_pool(pool, None) };
    }

    fn allocate_command_buffer(&self, pool: vk::CommandPool) -> VkResult<vk::CommandBuffer> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let buffers = unsafe { self.device.allocate_command_buffers(&alloc_info) }?;
        buffers
            .into_iter()
            .next()
            .ok_or(vk::Result::ERROR_OUT_OF_HOST_MEMORY)
    }

    fn free_command_buffer(&self, pool: vk::CommandPool, command_buffer: vk::CommandBuffer) {
        unsafe { self.device.free_command_buffers(pool, &[command_buffer]) };
    }

    fn begin_command_buffer(&self, command_buffer: vk::CommandBuffer) -> VkResult<()> {
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { self.device.begin_command_buffer(command_buffer, &begin_info) }
    }

    fn queue_submit(
        &self,
        queue: vk::Queue,
        batches: &[SubmitBatch],
        fence: vk::Fence,
    ) -> VkResult<()> {
        let submit_infos: Vec<vk::SubmitInfo<'_>> = batches
            .iter()
            .map(|batch| {
                vk::SubmitInfo::default()
                    .wait_semaphores(&batch.wait_semaphores)
                    .wait_dst_stage_mask(&batch.wait_stages)
                    .command_buffers(&batch.command_buffers)
                    .signal_semaphores(&batch.signal_semaphores)
            })
            .collect();
        unsafe { self.device.queue_submit(queue, &submit_infos, fence) }
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout_ns: u64,
        semaphore: vk::Semaphore,
        fence: vk::Fence,
    ) -> VkResult<(u32, bool)> {
        unsafe {
            self.swapchain_loader
                .acquire_next_image(swapchain, timeout_ns, semaphore, fence)
        }
    }

    fn queue_present(
        &self,
        queue: vk::Queue,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait_semaphore: Option<vk::Semaphore>,
    ) -> VkResult<bool> {
        let wait_semaphores: Vec<vk::Semaphore> = wait_semaphore.into_iter().collect();
        let swapchains = [swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);
        unsafe { self.swapchain_loader.queue_present(queue, &present_info) }
    }

    fn destroy_buffer(&self, buffer: vk::Buffer) {
        unsafe { self.device.destroy_buffer(buffer, None) };
    }

    fn destroy_image(&self, image: vk::Image) {
        unsafe { self.device.destroy_image(image, None) };
    }

    fn free_memory(&self, memory: vk::DeviceMemory) {
        unsafe { self.device.free_memory(memory, None) };
    }

    fn device_wait_idle(&self) -> VkResult<()> {
        unsafe { self.device.device_wait_idle() }
    }
}

/// Everything produced by [`initialize`].
///
/// Fields drop in order, so the device goes before the instance.
pub struct VulkanSetup {
    pub api: VulkanApi,
    pub queues: DeviceQueues,
    pub context: VulkanContext,
}

/// Bring up Vulkan for a window.
///
/// On failure every object created so far is destroyed, including the
/// window's surface.
pub fn initialize(config: &EngineConfig, window: &mut dyn Window) -> EngineResult<VulkanSetup> {
    let entry = unsafe { ash::Entry::load() }.map_err(|e| {
        EngineError::InitializationFailed(format!("Failed to load Vulkan: {}", e))
    })?;

    let instance_extensions = window.required_instance_extensions()?;
    let created = instance::create_instance(&entry, config, &instance_extensions)?;

    let debug_messenger = if config.validation
        && debug::should_enable(&created.enabled_layers, &created.enabled_extensions)
    {
        match DebugMessenger::new(&entry, &created.instance) {
            Ok(messenger) => Some(messenger),
            Err(e) => {
                log::warn!("{}", e);
                None
            }
        }
    } else {
        None
    };

    let mut context = VulkanContext {
        entry,
        instance: created.instance,
        debug_messenger,
        physical_device: vk::PhysicalDevice::null(),
        device: None,
    };

    window.create_surface(&context.entry, &context.instance)?;

    match create_device(config, window, &mut context) {
        Ok((api, queues)) => Ok(VulkanSetup {
            api,
            queues,
            context,
        }),
        Err(e) => {
            window.shutdown();
            Err(e)
        }
    }
}

fn create_device(
    config: &EngineConfig,
    window: &dyn Window,
    context: &mut VulkanContext,
) -> EngineResult<(VulkanApi, DeviceQueues)> {
    let physical_device = device::select_physical_device(&context.instance)?;
    let families = device::find_queue_families(&context.instance, physical_device)?;

    let mut extensions: Vec<&CStr> = window.required_device_extensions();
    for ext in &config.device_extensions {
        if !extensions.contains(&ext.as_c_str()) {
            extensions.push(ext.as_c_str());
        }
    }

    let (device, queues) = device::create_logical_device(
        &context.instance,
        physical_device,
        &families,
        &extensions,
        &config.queue_priorities,
    )?;

    context.physical_device = physical_device;
    context.device = Some(device.clone());
    Ok((VulkanApi::new(&context.instance, device), queues))
}
