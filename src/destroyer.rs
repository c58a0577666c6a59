//! Deferred destruction of GPU resources.
//!
//! A resource may still be referenced by submitted work after the CPU side is
//! done with it. Instead of destroying it immediately it is queued together
//! with the submission point of its last use, and destroyed once that point is
//! known to be complete.
//!
//! ```text
//! enqueue(buffer, 4)   enqueue(image, 6)   enqueue(semaphore, 9)
//!         │                    │                     │
//!         ▼                    ▼                     ▼
//!   ┌───────────┬───────────┬───────────┐
//!   │ point 4   │ point 6   │ point 9   │   process_queue(completed = 6)
//!   └───────────┴───────────┴───────────┘         destroys the first two
//! ```

use std::collections::VecDeque;

use ash::vk;

use crate::backend::GpuApi;

/// A GPU resource pending destruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VulkanResource {
    /// A buffer and the memory bound to it. Null memory is not freed.
    Buffer {
        buffer: vk::Buffer,
        memory: vk::DeviceMemory,
    },
    /// An image and the memory bound to it. Null memory is not freed.
    Image {
        image: vk::Image,
        memory: vk::DeviceMemory,
    },
    Semaphore(vk::Semaphore),
}

impl VulkanResource {
    /// Destroy the handle and free its memory.
    ///
    /// The caller must ensure the GPU is no longer using the resource.
    pub fn destroy(self, api: &dyn GpuApi) {
        match self {
            VulkanResource::Buffer { buffer, memory } => {
                api.destroy_buffer(buffer);
                if memory != vk::DeviceMemory::null() {
                    api.free_memory(memory);
                }
            }
            VulkanResource::Image { image, memory } => {
                api.destroy_image(image);
                if memory != vk::DeviceMemory::null() {
                    api.free_memory(memory);
                }
            }
            VulkanResource::Semaphore(semaphore) => api.destroy_semaphore(semaphore),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct PendingDestruction {
    point: u64,
    resource: VulkanResource,
}

/// FIFO of resources keyed by the submission point of their last use.
///
/// Only the front is inspected, so resources must be enqueued in
/// non-decreasing point order. A resource enqueued out of order is destroyed
/// late, never early.
#[derive(Debug, Default)]
pub struct SafeResourceDestroyer {
    queue: VecDeque<PendingDestruction>,
}

impl SafeResourceDestroyer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a resource whose last use is the submission at `submit_point`.
    pub fn enqueue_resource_for_destruction(&mut self, resource: VulkanResource, submit_point: u64) {
        if let Some(back) = self.queue.back() {
            if back.point > submit_point {
                log::debug!(
                    "Resource enqueued at point {} behind point {}; destruction will be delayed",
                    submit_point,
                    back.point
                );
            }
        }
        self.queue.push_back(PendingDestruction {
            point: submit_point,
            resource,
        });
    }

    /// Destroy every queued resource whose point is at most `completed_point`.
    /// Returns the number of resources destroyed.
    pub fn process_queue(&mut self, api: &dyn GpuApi, completed_point: u64) -> usize {
        let mut destroyed = 0;
        while let Some(front) = self.queue.front() {
            if front.point > completed_point {
                break;
            }
            let front = *front;
            self.queue.pop_front();
            front.resource.destroy(api);
            destroyed += 1;
        }
        if destroyed > 0 {
            log::trace!(
                "Destroyed {} resource(s) up to point {}",
                destroyed,
                completed_point
            );
        }
        destroyed
    }

    /// Destroy everything regardless of points.
    ///
    /// Only valid when the device is idle, i.e. at shutdown.
    pub fn flush(&mut self, api: &dyn GpuApi) -> usize {
        let count = self.queue.len();
        for pending in self.queue.drain(..) {
            pending.resource.destroy(api);
        }
        count
    }

    /// Number of resources waiting for destruction.
    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
