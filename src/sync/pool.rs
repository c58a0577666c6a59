//! Recycling pools for GPU primitives.
//!
//! [`PrimitivePool`] is a plain free list for primitives that are known to be
//! idle when released (reset fences, retired semaphores).
//! [`PrimitiveInTimelinePool`] tags each released primitive with the submission
//! point that last used it, and only hands it out again once that point has
//! been synchronized. Command buffers live in the latter.

use std::collections::VecDeque;
use std::fmt;
use std::marker::PhantomData;

use ash::prelude::VkResult;
use ash::vk;

use crate::backend::GpuApi;

/// Creates and destroys one kind of primitive.
pub trait PrimitiveFactory {
    type Primitive: Copy + PartialEq + fmt::Debug;
    /// Extra state needed by create and destroy (flags, owning pool, ...).
    type Args;

    fn create(api: &dyn GpuApi, args: &Self::Args) -> VkResult<Self::Primitive>;
    fn destroy(api: &dyn GpuApi, primitive: Self::Primitive, args: &Self::Args);
}

/// Fences, created with the flags passed as args.
#[derive(Debug)]
pub struct FenceFactory;

impl PrimitiveFactory for FenceFactory {
    type Primitive = vk::Fence;
    type Args = vk::FenceCreateFlags;

    fn create(api: &dyn GpuApi, flags: &vk::FenceCreateFlags) -> VkResult<vk::Fence> {
        api.create_fence(*flags)
    }

    fn destroy(api: &dyn GpuApi, fence: vk::Fence, _: &vk::FenceCreateFlags) {
        api.destroy_fence(fence);
    }
}

/// Binary semaphores.
#[derive(Debug)]
pub struct SemaphoreFactory;

impl PrimitiveFactory for SemaphoreFactory {
    type Primitive = vk::Semaphore;
    type Args = ();

    fn create(api: &dyn GpuApi, _: &()) -> VkResult<vk::Semaphore> {
        api.create_semaphore()
    }

    fn destroy(api: &dyn GpuApi, semaphore: vk::Semaphore, _: &()) {
        api.destroy_semaphore(semaphore);
    }
}

pub type FencePool = PrimitivePool<FenceFactory>;
pub type SemaphorePool = PrimitivePool<SemaphoreFactory>;

/// LIFO free list. Primitives are created lazily and destroyed only by
/// [`PrimitivePool::destroy`].
pub struct PrimitivePool<F: PrimitiveFactory> {
    free: Vec<F::Primitive>,
    created: usize,
    _factory: PhantomData<F>,
}

impl<F: PrimitiveFactory> PrimitivePool<F> {
    pub fn new() -> Self {
        Self {
            free: Vec::new(),
            created: 0,
            _factory: PhantomData,
        }
    }

    /// Pop a free primitive, or create one if the list is empty.
    pub fn acquire(&mut self, api: &dyn GpuApi, args: &F::Args) -> VkResult<F::Primitive> {
        if let Some(primitive) = self.free.pop() {
            return Ok(primitive);
        }
        let primitive = F::create(api, args)?;
        self.created += 1;
        Ok(primitive)
    }

    /// Return a primitive. It must be idle and not already in the pool.
    pub fn release(&mut self, primitive: F::Primitive) {
        debug_assert!(
            !self.free.contains(&primitive),
            "{primitive:?} released twice"
        );
        self.free.push(primitive);
    }

    /// Destroy every free primitive.
    pub fn destroy(&mut self, api: &dyn GpuApi, args: &F::Args) {
        for primitive in self.free.drain(..) {
            F::destroy(api, primitive, args);
        }
    }

    /// Number of primitives available for reuse.
    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Number of primitives this pool has created over its lifetime.
    pub fn created_count(&self) -> usize {
        self.created
    }
}

impl<F: PrimitiveFactory> Default for PrimitivePool<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: PrimitiveFactory> fmt::Debug for PrimitivePool<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrimitivePool")
            .field("free", &self.free.len())
            .field("created", &self.created)
            .finish()
    }
}

/// A released primitive and the submission point that last used it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrimitiveInTimeline<T> {
    pub primitive: T,
    pub point: u64,
}

/// FIFO of primitives tagged with submission points.
///
/// Only the front entry is inspected on acquire. Releases happen in
/// submission order, so the front always carries the smallest point.
pub struct PrimitiveInTimelinePool<F: PrimitiveFactory> {
    queue: VecDeque<PrimitiveInTimeline<F::Primitive>>,
    created: usize,
    _factory: PhantomData<F>,
}

impl<F: PrimitiveFactory> PrimitiveInTimelinePool<F> {
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            created: 0,
            _factory: PhantomData,
        }
    }

    /// Reuse the front primitive if its point has been synchronized,
    /// otherwise create a new one.
    pub fn acquire(
        &mut self,
        api: &dyn GpuApi,
        args: &F::Args,
        last_synced_point: u64,
    ) -> VkResult<F::Primitive> {
        if let Some(front) = self.queue.front() {
            if front.point <= last_synced_point {
                let front = *front;
                self.queue.pop_front();
                return Ok(front.primitive);
            }
        }
        let primitive = F::create(api, args)?;
        self.created += 1;
        Ok(primitive)
    }

    /// Return a primitive whose last use is the submission at `point`.
    pub fn release(&mut self, primitive: F::Primitive, point: u64) {
        self.queue.push_back(PrimitiveInTimeline { primitive, point });
    }

    /// Destroy every queued primitive. The device must be idle.
    pub fn destroy(&mut self, api: &dyn GpuApi, args: &F::Args) {
        for entry in self.queue.drain(..) {
            F::destroy(api, entry.primitive, args);
        }
    }

    /// Number of primitives parked in the pool.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn created_count(&self) -> usize {
        self.created
    }
}

impl<F: PrimitiveFactory> Default for PrimitiveInTimelinePool<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: PrimitiveFactory> fmt::Debug for PrimitiveInTimelinePool<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrimitiveInTimelinePool")
            .field("queued", &self.queue.len())
            .field("front_point", &self.queue.front().map(|e| e.point))
            .field("created", &self.created)
            .finish()
    }
}
