//! Dummy GPU backend for testing and development.
//!
//! This backend doesn't talk to a GPU. It hands out unique fake handles,
//! records every submission and present, and tracks which primitives are
//! alive so tests can assert on recycling and destruction. Fences passed to a
//! submit or acquire are signaled as soon as the call returns unless
//! auto-signaling is turned off, in which case tests signal them by hand.
//! Binary semaphore signals are tracked too, so a semaphore signaled twice
//! without a wait in between is recorded.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ash::prelude::VkResult;
use ash::vk;
use ash::vk::Handle;
use parking_lot::{Condvar, Mutex};

use super::{GpuApi, SubmitBatch};

/// A recorded `queue_submit` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedSubmit {
    pub queue: vk::Queue,
    pub batches: Vec<SubmitBatch>,
    pub fence: vk::Fence,
}

/// Scheduled `queue_submit` failures: after `skip` successful calls, the next
/// `count` calls fail with `result`.
#[derive(Debug, Clone, Copy)]
struct SubmitFailure {
    skip: usize,
    count: usize,
    result: vk::Result,
}

/// A recorded `queue_present` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordedPresent {
    pub queue: vk::Queue,
    pub swapchain: vk::SwapchainKHR,
    pub image_index: u32,
    pub wait_semaphore: Option<vk::Semaphore>,
}

#[derive(Debug, Default)]
struct DummyState {
    next_handle: u64,
    auto_signal: bool,
    device_lost: bool,
    fail_submit: Option<SubmitFailure>,
    fail_next_acquire: Option<vk::Result>,
    swapchain_image_count: u32,
    next_image: u32,

    fences: HashMap<vk::Fence, bool>,
    pending_fences: HashSet<vk::Fence>,
    semaphores: HashSet<vk::Semaphore>,
    signaled_semaphores: HashSet<vk::Semaphore>,
    double_signaled: Vec<vk::Semaphore>,
    command_pools: HashSet<vk::CommandPool>,
    command_buffers: HashMap<vk::CommandBuffer, vk::CommandPool>,

    destroyed_fences: Vec<vk::Fence>,
    destroyed_semaphores: Vec<vk::Semaphore>,
    destroyed_buffers: Vec<vk::Buffer>,
    destroyed_images: Vec<vk::Image>,
    freed_memory: Vec<vk::DeviceMemory>,
    begun_command_buffers: Vec<vk::CommandBuffer>,
    submissions: Vec<RecordedSubmit>,
    presents: Vec<RecordedPresent>,
}

impl DummyState {
    fn next_raw(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    fn take_submit_failure(&mut self) -> Option<vk::Result> {
        let failure = self.fail_submit.as_mut()?;
        if failure.skip > 0 {
            failure.skip -= 1;
            return None;
        }
        let result = failure.result;
        failure.count -= 1;
        if failure.count == 0 {
            self.fail_submit = None;
        }
        Some(result)
    }

    fn wait_semaphore(&mut self, semaphore: vk::Semaphore) {
        self.signaled_semaphores.remove(&semaphore);
    }

    /// Binary semaphores must be waited on before they are signaled again.
    fn signal_semaphore(&mut self, semaphore: vk::Semaphore) {
        if semaphore == vk::Semaphore::null() {
            return;
        }
        if !self.signaled_semaphores.insert(semaphore) {
            log::error!(
                "DummyApi: semaphore {:?} signaled while already signaled",
                semaphore
            );
            self.double_signaled.push(semaphore);
        }
    }

    fn arm_fence(&mut self, fence: vk::Fence) {
        if fence == vk::Fence::null() {
            return;
        }
        if self.auto_signal {
            self.fences.insert(fence, true);
        } else {
            self.pending_fences.insert(fence);
        }
    }
}

struct Shared {
    state: Mutex<DummyState>,
    fence_signaled: Condvar,
}

/// Recording GPU API with simulated fence completion.
///
/// Cloning yields another handle to the same state, so a test can keep one
/// clone for inspection after moving another into the engine.
#[derive(Clone)]
pub struct DummyApi {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for DummyApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("DummyApi")
            .field("live_fences", &state.fences.len())
            .field("live_semaphores", &state.semaphores.len())
            .field("submissions", &state.submissions.len())
            .finish_non_exhaustive()
    }
}

impl Default for DummyApi {
    fn default() -> Self {
        Self::new()
    }
}

impl DummyApi {
    /// Create a dummy API with auto-signaling enabled and three swapchain images.
    pub fn new() -> Self {
        let state = DummyState {
            auto_signal: true,
            swapchain_image_count: 3,
            ..Default::default()
        };
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                fence_signaled: Condvar::new(),
            }),
        }
    }

    /// Control whether fences are signaled as soon as their work is submitted.
    pub fn set_auto_signal(&self, enabled: bool) {
        self.shared.state.lock().auto_signal = enabled;
    }

    /// Signal a fence, waking any waiter.
    pub fn signal_fence(&self, fence: vk::Fence) {
        let mut state = self.shared.state.lock();
        state.pending_fences.remove(&fence);
        if let Some(signaled) = state.fences.get_mut(&fence) {
            *signaled = true;
        }
        self.shared.fence_signaled.notify_all();
    }

    /// Signal every fence that has been submitted but not yet signaled.
    pub fn complete_all(&self) {
        let mut state = self.shared.state.lock();
        let pending: Vec<_> = state.pending_fences.drain().collect();
        for fence in pending {
            if let Some(signaled) = state.fences.get_mut(&fence) {
                *signaled = true;
            }
        }
        self.shared.fence_signaled.notify_all();
    }

    /// Make the next `queue_submit` fail with the given result.
    pub fn fail_next_submit(&self, result: vk::Result) {
        self.fail_submits(0, 1, result);
    }

    /// Make the `n`th `queue_submit` from now fail (1 is the next call).
    pub fn fail_nth_submit(&self, n: usize, result: vk::Result) {
        self.fail_submits(n.saturating_sub(1), 1, result);
    }

    /// Let `skip` submits through, then fail the following `count`.
    pub fn fail_submits(&self, skip: usize, count: usize, result: vk::Result) {
        self.shared.state.lock().fail_submit = (count > 0).then_some(SubmitFailure {
            skip,
            count,
            result,
        });
    }

    /// Make the next `acquire_next_image` fail with the given result.
    pub fn fail_next_acquire(&self, result: vk::Result) {
        self.shared.state.lock().fail_next_acquire = Some(result);
    }

    /// Simulate device loss: every subsequent wait, reset and submit fails.
    pub fn lose_device(&self) {
        self.shared.state.lock().device_lost = true;
        self.shared.fence_signaled.notify_all();
    }

    pub fn set_swapchain_image_count(&self, count: u32) {
        self.shared.state.lock().swapchain_image_count = count.max(1);
    }

    /// Mint a fake buffer with backing memory.
    pub fn make_buffer(&self) -> (vk::Buffer, vk::DeviceMemory) {
        let mut state = self.shared.state.lock();
        let buffer = vk::Buffer::from_raw(state.next_raw());
        let memory = vk::DeviceMemory::from_raw(state.next_raw());
        (buffer, memory)
    }

    /// Mint a fake image with backing memory.
    pub fn make_image(&self) -> (vk::Image, vk::DeviceMemory) {
        let mut state = self.shared.state.lock();
        let image = vk::Image::from_raw(state.next_raw());
        let memory = vk::DeviceMemory::from_raw(state.next_raw());
        (image, memory)
    }

    /// Mint a fake queue handle.
    pub fn make_queue(&self) -> vk::Queue {
        let mut state = self.shared.state.lock();
        vk::Queue::from_raw(state.next_raw())
    }

    /// Mint a fake swapchain handle.
    pub fn make_swapchain(&self) -> vk::SwapchainKHR {
        let mut state = self.shared.state.lock();
        vk::SwapchainKHR::from_raw(state.next_raw())
    }

    pub fn submissions(&self) -> Vec<RecordedSubmit> {
        self.shared.state.lock().submissions.clone()
    }

    pub fn presents(&self) -> Vec<RecordedPresent> {
        self.shared.state.lock().presents.clone()
    }

    pub fn is_fence_signaled(&self, fence: vk::Fence) -> bool {
        self.shared
            .state
            .lock()
            .fences
            .get(&fence)
            .copied()
            .unwrap_or(false)
    }

    pub fn live_fence_count(&self) -> usize {
        self.shared.state.lock().fences.len()
    }

    pub fn live_semaphore_count(&self) -> usize {
        self.shared.state.lock().semaphores.len()
    }

    pub fn is_semaphore_alive(&self, semaphore: vk::Semaphore) -> bool {
        self.shared.state.lock().semaphores.contains(&semaphore)
    }

    /// Whether a semaphore has a pending signal that nothing has waited on.
    pub fn is_semaphore_signaled(&self, semaphore: vk::Semaphore) -> bool {
        self.shared
            .state
            .lock()
            .signaled_semaphores
            .contains(&semaphore)
    }

    /// Semaphores signaled while a previous signal was still pending.
    pub fn double_signaled_semaphores(&self) -> Vec<vk::Semaphore> {
        self.shared.state.lock().double_signaled.clone()
    }

    pub fn live_command_pool_count(&self) -> usize {
        self.shared.state.lock().command_pools.len()
    }

    pub fn live_command_buffer_count(&self) -> usize {
        self.shared.state.lock().command_buffers.len()
    }

    pub fn destroyed_fences(&self) -> Vec<vk::Fence> {
        self.shared.state.lock().destroyed_fences.clone()
    }

    pub fn destroyed_semaphores(&self) -> Vec<vk::Semaphore> {
        self.shared.state.lock().destroyed_semaphores.clone()
    }

    pub fn destroyed_buffers(&self) -> Vec<vk::Buffer> {
        self.shared.state.lock().destroyed_buffers.clone()
    }

    pub fn destroyed_images(&self) -> Vec<vk::Image> {
        self.shared.state.lock().destroyed_images.clone()
    }

    pub fn freed_memory(&self) -> Vec<vk::DeviceMemory> {
        self.shared.state.lock().freed_memory.clone()
    }

    pub fn begun_command_buffers(&self) -> Vec<vk::CommandBuffer> {
        self.shared.state.lock().begun_command_buffers.clone()
    }
}

impl GpuApi for DummyApi {
    fn name(&self) -> &'static str {
        "Dummy Backend"
    }

    fn create_fence(&self, flags: vk::FenceCreateFlags) -> VkResult<vk::Fence> {
        let mut state = self.shared.state.lock();
        let fence = vk::Fence::from_raw(state.next_raw());
        state
            .fences
            .insert(fence, flags.contains(vk::FenceCreateFlags::SIGNALED));
        log::trace!("DummyApi: created fence {:?}", fence);
        Ok(fence)
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        let mut state = self.shared.state.lock();
        state.fences.remove(&fence);
        state.pending_fences.remove(&fence);
        state.destroyed_fences.push(fence);
    }

    fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> VkResult<()> {
        let deadline = Instant::now().checked_add(Duration::from_nanos(timeout_ns));
        let mut state = self.shared.state.lock();
        loop {
            if state.device_lost {
                return Err(vk::Result::ERROR_DEVICE_LOST);
            }
            match state.fences.get(&fence) {
                None => return Err(vk::Result::ERROR_UNKNOWN),
                Some(true) => return Ok(()),
                Some(false) if timeout_ns == 0 => return Err(vk::Result::TIMEOUT),
                Some(false) => {}
            }
            match deadline {
                Some(deadline) => {
                    if self
                        .shared
                        .fence_signaled
                        .wait_until(&mut state, deadline)
                        .timed_out()
                        && !state.device_lost
                        && state.fences.get(&fence) == Some(&false)
                    {
                        return Err(vk::Result::TIMEOUT);
                    }
                }
                None => self.shared.fence_signaled.wait(&mut state),
            }
        }
    }

    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()> {
        let mut state = self.shared.state.lock();
        if state.device_lost {
            return Err(vk::Result::ERROR_DEVICE_LOST);
        }
        match state.fences.get_mut(&fence) {
            Some(signaled) => {
                *signaled = false;
                Ok(())
            }
            None => Err(vk::Result::ERROR_UNKNOWN),
        }
    }

    fn create_semaphore(&self) -> VkResult<vk::Semaphore> {
        let mut state = self.shared.state.lock();
        let semaphore = vk::Semaphore::from_raw(state.next_raw());
        state.semaphores.insert(semaphore);
        log::trace!("DummyApi: created semaphore {:?}", semaphore);
        Ok(semaphore)
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        let mut state = self.shared.state.lock();
        state.semaphores.remove(&semaphore);
        state.signaled_semaphores.remove(&semaphore);
        state.destroyed_semaphores.push(semaphore);
    }

    fn create_command_pool(&self, queue_family: u32) -> VkResult<vk::CommandPool> {
        let mut state = self.shared.state.lock();
        let pool = vk::CommandPool::from_raw(state.next_raw());
        state.command_pools.insert(pool);
        log::trace!(
            "DummyApi: created command pool {:?} for family {}",
            pool,
            queue_family
        );
        Ok(pool)
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        let mut state = self.shared.state.lock();
        state.command_pools.remove(&pool);
        state.command_buffers.retain(|_, owner| *owner != pool);
    }

    fn allocate_command_buffer(&self, pool: vk::CommandPool) -> VkResult<vk::CommandBuffer> {
        let mut state = self.shared.state.lock();
        if !state.command_pools.contains(&pool) {
            return Err(vk::Result::ERROR_UNKNOWN);
        }
        let command_buffer = vk::CommandBuffer::from_raw(state.next_raw());
        state.command_buffers.insert(command_buffer, pool);
        Ok(command_buffer)
    }

    fn free_command_buffer(&self, _pool: vk::CommandPool, command_buffer: vk::CommandBuffer) {
        self.shared
            .state
            .lock()
            .command_buffers
            .remove(&command_buffer);
    }

    fn begin_command_buffer(&self, command_buffer: vk::CommandBuffer) -> VkResult<()> {
        let mut state = self.shared.state.lock();
        if !state.command_buffers.contains_key(&command_buffer) {
            return Err(vk::Result::ERROR_UNKNOWN);
        }
        state.begun_command_buffers.push(command_buffer);
        Ok(())
    }

    fn queue_submit(
        &self,
        queue: vk::Queue,
        batches: &[SubmitBatch],
        fence: vk::Fence,
    ) -> VkResult<()> {
        let mut state = self.shared.state.lock();
        if let Some(result) = state.take_submit_failure() {
            return Err(result);
        }
        if state.device_lost {
            return Err(vk::Result::ERROR_DEVICE_LOST);
        }
        log::trace!(
            "DummyApi: submit {} batch(es) to {:?} (fence: {:?})",
            batches.len(),
            queue,
            fence
        );
        for batch in batches {
            for &semaphore in &batch.wait_semaphores {
                state.wait_semaphore(semaphore);
            }
            for &semaphore in &batch.signal_semaphores {
                state.signal_semaphore(semaphore);
            }
        }
        state.submissions.push(RecordedSubmit {
            queue,
            batches: batches.to_vec(),
            fence,
        });
        state.arm_fence(fence);
        self.shared.fence_signaled.notify_all();
        Ok(())
    }

    fn acquire_next_image(
        &self,
        _swapchain: vk::SwapchainKHR,
        _timeout_ns: u64,
        semaphore: vk::Semaphore,
        fence: vk::Fence,
    ) -> VkResult<(u32, bool)> {
        let mut state = self.shared.state.lock();
        if let Some(result) = state.fail_next_acquire.take() {
            return Err(result);
        }
        if state.device_lost {
            return Err(vk::Result::ERROR_DEVICE_LOST);
        }
        let index = state.next_image % state.swapchain_image_count;
        state.next_image = state.next_image.wrapping_add(1);
        state.signal_semaphore(semaphore);
        state.arm_fence(fence);
        self.shared.fence_signaled.notify_all();
        Ok((index, false))
    }

    fn queue_present(
        &self,
        queue: vk::Queue,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait_semaphore: Option<vk::Semaphore>,
    ) -> VkResult<bool> {
        let mut state = self.shared.state.lock();
        if state.device_lost {
            return Err(vk::Result::ERROR_DEVICE_LOST);
        }
        if let Some(semaphore) = wait_semaphore {
            state.wait_semaphore(semaphore);
        }
        state.presents.push(RecordedPresent {
            queue,
            swapchain,
            image_index,
            wait_semaphore,
        });
        Ok(false)
    }

    fn destroy_buffer(&self, buffer: vk::Buffer) {
        self.shared.state.lock().destroyed_buffers.push(buffer);
    }

    fn destroy_image(&self, image: vk::Image) {
        self.shared.state.lock().destroyed_images.push(image);
    }

    fn free_memory(&self, memory: vk::DeviceMemory) {
        self.shared.state.lock().freed_memory.push(memory);
    }

    fn device_wait_idle(&self) -> VkResult<()> {
        let mut state = self.shared.state.lock();
        if state.device_lost {
            return Err(vk::Result::ERROR_DEVICE_LOST);
        }
        let pending: Vec<_> = state.pending_fences.drain().collect();
        for fence in pending {
            if let Some(signaled) = state.fences.get_mut(&fence) {
                *signaled = true;
            }
        }
        self.shared.fence_signaled.notify_all();
        Ok(())
    }
}
