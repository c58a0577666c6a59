//! Command pool management and command buffer recycling.

use ash::prelude::VkResult;
use ash::vk;

use crate::backend::GpuApi;
use crate::queue::{CommandBufferType, QueueFamilyIndices};
use crate::sync::{PrimitiveFactory, PrimitiveInTimelinePool};

/// Allocates primary command buffers from the command pool passed as args.
#[derive(Debug)]
pub struct CommandBufferFactory;

impl PrimitiveFactory for CommandBufferFactory {
    type Primitive = vk::CommandBuffer;
    type Args = vk::CommandPool;

    fn create(api: &dyn GpuApi, pool: &vk::CommandPool) -> VkResult<vk::CommandBuffer> {
        api.allocate_command_buffer(*pool)
    }

    fn destroy(api: &dyn GpuApi, command_buffer: vk::CommandBuffer, pool: &vk::CommandPool) {
        api.free_command_buffer(*pool, command_buffer);
    }
}

pub type CommandBufferPool = PrimitiveInTimelinePool<CommandBufferFactory>;

#[derive(Debug)]
struct FamilyCommandPool {
    command_pool: vk::CommandPool,
    buffers: CommandBufferPool,
}

impl FamilyCommandPool {
    fn new(api: &dyn GpuApi, queue_family: u32) -> VkResult<Self> {
        let command_pool = api.create_command_pool(queue_family)?;
        Ok(Self {
            command_pool,
            buffers: CommandBufferPool::new(),
        })
    }

    fn destroy(&mut self, api: &dyn GpuApi) {
        self.buffers.destroy(api, &self.command_pool);
        api.destroy_command_pool(self.command_pool);
        self.command_pool = vk::CommandPool::null();
    }
}

/// One command pool per queue family with timeline-aware buffer reuse.
///
/// When compute aliases the graphics family both types draw from the same
/// pool. A command buffer is handed out again only after the submission that
/// last used it has been synchronized.
#[derive(Debug)]
pub struct CommandBufferRecycler {
    graphics: FamilyCommandPool,
    /// `None` when compute shares the graphics family.
    compute: Option<FamilyCommandPool>,
}

impl CommandBufferRecycler {
    pub fn new(api: &dyn GpuApi, families: &QueueFamilyIndices) -> VkResult<Self> {
        let mut graphics = FamilyCommandPool::new(api, families.graphics_family)?;
        let compute = if families.same_family() {
            None
        } else {
            match FamilyCommandPool::new(api, families.compute_family) {
                Ok(pool) => Some(pool),
                Err(e) => {
                    graphics.destroy(api);
                    return Err(e);
                }
            }
        };
        Ok(Self { graphics, compute })
    }

    fn pool_mut(&mut self, ty: CommandBufferType) -> &mut FamilyCommandPool {
        match (ty, self.compute.as_mut()) {
            (CommandBufferType::Compute, Some(compute)) => compute,
            _ => &mut self.graphics,
        }
    }

    /// Command pool that serves the given type.
    pub fn command_pool(&self, ty: CommandBufferType) -> vk::CommandPool {
        match (ty, self.compute.as_ref()) {
            (CommandBufferType::Compute, Some(compute)) => compute.command_pool,
            _ => self.graphics.command_pool,
        }
    }

    /// Get a command buffer in the recording state.
    pub fn acquire(
        &mut self,
        api: &dyn GpuApi,
        ty: CommandBufferType,
        last_synced_point: u64,
    ) -> VkResult<vk::CommandBuffer> {
        let pool = self.pool_mut(ty);
        let command_buffer = pool
            .buffers
            .acquire(api, &pool.command_pool, last_synced_point)?;
        api.begin_command_buffer(command_buffer)?;
        Ok(command_buffer)
    }

    /// Park a command buffer submitted at `point`.
    pub fn release(&mut self, ty: CommandBufferType, command_buffer: vk::CommandBuffer, point: u64) {
        self.pool_mut(ty).buffers.release(command_buffer, point);
    }

    /// Number of parked command buffers across all pools.
    pub fn parked_count(&self) -> usize {
        self.graphics.buffers.len() + self.compute.as_ref().map_or(0, |c| c.buffers.len())
    }

    /// Free all command buffers and destroy the pools. The device must be idle.
    pub fn destroy(&mut self, api: &dyn GpuApi) {
        if let Some(mut compute) = self.compute.take() {
            compute.destroy(api);
        }
        if self.graphics.command_pool != vk::CommandPool::null() {
            self.graphics.destroy(api);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyApi;

    fn split_families() -> QueueFamilyIndices {
        QueueFamilyIndices {
            graphics_family: 0,
            compute_family: 1,
            num_unique_queues: 2,
        }
    }

    fn shared_family() -> QueueFamilyIndices {
        QueueFamilyIndices {
            graphics_family: 0,
            compute_family: 0,
            num_unique_queues: 1,
        }
    }

    #[test]
    fn test_pools_alias_on_shared_family() {
        let api = DummyApi::new();
        let recycler = CommandBufferRecycler::new(&api, &shared_family()).unwrap();

        assert_eq!(api.live_command_pool_count(), 1);
        assert_eq!(
            recycler.command_pool(CommandBufferType::Graphics),
            recycler.command_pool(CommandBufferType::Compute)
        );
    }

    #[test]
    fn test_pools_split_on_distinct_families() {
        let api = DummyApi::new();
        let recycler = CommandBufferRecycler::new(&api, &split_families()).unwrap();

        assert_eq!(api.live_command_pool_count(), 2);
        assert_ne!(
            recycler.command_pool(CommandBufferType::Graphics),
            recycler.command_pool(CommandBufferType::Compute)
        );
    }

    #[test]
    fn test_acquire_begins_recording() {
        let api = DummyApi::new();
        let mut recycler = CommandBufferRecycler::new(&api, &split_families()).unwrap();

        let cb = recycler
            .acquire(&api, CommandBufferType::Compute, 0)
            .unwrap();
        assert_eq!(api.begun_command_buffers(), vec![cb]);
    }

    #[test]
    fn test_reuse_after_sync() {
        let api = DummyApi::new();
        let mut recycler = CommandBufferRecycler::new(&api, &shared_family()).unwrap();

        let cb = recycler
            .acquire(&api, CommandBufferType::Graphics, 0)
            .unwrap();
        recycler.release(CommandBufferType::Graphics, cb, 4);

        let other = recycler
            .acquire(&api, CommandBufferType::Compute, 3)
            .unwrap();
        assert_ne!(other, cb);

        let reused = recycler
            .acquire(&api, CommandBufferType::Graphics, 4)
            .unwrap();
        assert_eq!(reused, cb);
    }

    #[test]
    fn test_destroy_frees_everything() {
        let api = DummyApi::new();
        let mut recycler = CommandBufferRecycler::new(&api, &split_families()).unwrap();
        let cb = recycler
            .acquire(&api, CommandBufferType::Compute, 0)
            .unwrap();
        recycler.release(CommandBufferType::Compute, cb, 1);

        recycler.destroy(&api);
        recycler.destroy(&api);

        assert_eq!(api.live_command_pool_count(), 0);
        assert_eq!(api.live_command_buffer_count(), 0);
    }
}
