use std::collections::{HashSet, VecDeque};

use ash::vk;

use super::pool::{FencePool, SemaphorePool};
use crate::backend::GpuApi;
use crate::error::{EngineError, EngineResult};

/// Synchronization handles for one submission point.
///
/// The fence lets the CPU wait for the submission; the semaphore lets later
/// GPU work wait on it. Point 0 with null handles is the failure sentinel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SubmitSync {
    pub point: u64,
    pub semaphore: vk::Semaphore,
    pub fence: vk::Fence,
}

impl SubmitSync {
    /// The sentinel returned when nothing was submitted.
    pub const fn failed() -> Self {
        Self {
            point: 0,
            semaphore: vk::Semaphore::null(),
            fence: vk::Fence::null(),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.point == 0
    }
}

/// Owns the submission timeline and the fence/semaphore pools feeding it.
///
/// Points are handed out by [`get_submit_sync`](Self::get_submit_sync) and
/// must be inserted in strictly increasing order. Waiting on a point retires
/// it together with every older point, because the queue work behind a later
/// point was ordered after the earlier ones.
#[derive(Debug, Default)]
pub struct SubmitSyncManager {
    last_synced_point: u64,
    actual_point: u64,
    timeline: VecDeque<SubmitSync>,
    /// Tracked semaphores left signaled with nothing queued to wait on them.
    orphaned: HashSet<vk::Semaphore>,
    fence_pool: FencePool,
    semaphore_pool: SemaphorePool,
}

impl SubmitSyncManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the next point and pair it with a fence and a semaphore.
    ///
    /// The sync is not tracked until it is passed to
    /// [`insert_into_timeline`](Self::insert_into_timeline).
    pub fn get_submit_sync(&mut self, api: &dyn GpuApi) -> EngineResult<SubmitSync> {
        self.actual_point += 1;
        let point = self.actual_point;

        let fence = self
            .fence_pool
            .acquire(api, &vk::FenceCreateFlags::empty())
            .map_err(|e| {
                log::error!("Failed to acquire fence for point {}: {:?}", point, e);
                EngineError::from(e)
            })?;
        let semaphore = match self.semaphore_pool.acquire(api, &()) {
            Ok(semaphore) => semaphore,
            Err(e) => {
                log::error!("Failed to acquire semaphore for point {}: {:?}", point, e);
                self.fence_pool.release(fence);
                return Err(e.into());
            }
        };

        Ok(SubmitSync {
            point,
            semaphore,
            fence,
        })
    }

    /// Start tracking a sync whose work has been submitted.
    ///
    /// # Panics
    ///
    /// Panics if the point is not greater than the newest tracked point.
    pub fn insert_into_timeline(&mut self, sync: SubmitSync) {
        assert!(!sync.is_failed(), "cannot insert the failure sentinel");
        if let Some(back) = self.timeline.back() {
            assert!(
                back.point < sync.point,
                "timeline points must increase: {} after {}",
                sync.point,
                back.point
            );
        }
        assert!(
            sync.point > self.last_synced_point,
            "point {} is already synchronized",
            sync.point
        );
        log::trace!("Timeline: inserted point {}", sync.point);
        self.timeline.push_back(sync);
    }

    /// Give back the primitives of a sync that was never submitted.
    pub fn discard(&mut self, sync: SubmitSync) {
        if sync.is_failed() {
            return;
        }
        debug_assert!(
            self.timeline.iter().all(|s| s.point != sync.point),
            "point {} is tracked and cannot be discarded",
            sync.point
        );
        self.fence_pool.release(sync.fence);
        self.semaphore_pool.release(sync.semaphore);
    }

    /// Mark tracked semaphores whose signal will never be waited on.
    ///
    /// They are destroyed on retirement instead of going back to the pool,
    /// since a signaled binary semaphore cannot be signaled again.
    pub fn orphan_semaphores(&mut self, semaphores: &[vk::Semaphore]) {
        for &semaphore in semaphores {
            debug_assert!(
                self.timeline.iter().any(|s| s.semaphore == semaphore),
                "{:?} is not tracked",
                semaphore
            );
            self.orphaned.insert(semaphore);
        }
    }

    /// Block until the submission at `sync.point` has completed, then retire it
    /// and everything older.
    ///
    /// Returns immediately for the sentinel and for points already retired.
    /// On timeout the timeline is left untouched.
    pub fn wait_for_submit_sync(
        &mut self,
        api: &dyn GpuApi,
        sync: &SubmitSync,
        timeout_ns: u64,
    ) -> EngineResult<()> {
        if sync.is_failed() || sync.point <= self.last_synced_point {
            return Ok(());
        }

        let index = self
            .timeline
            .binary_search_by_key(&sync.point, |s| s.point)
            .map_err(|_| EngineError::UnknownSubmission(sync.point))?;
        let target = self.timeline[index];

        match api.wait_for_fence(target.fence, timeout_ns) {
            Ok(()) => {}
            Err(vk::Result::TIMEOUT) => return Err(EngineError::Timeout),
            Err(e) => {
                log::error!("Failed to wait for point {}: {:?}", target.point, e);
                return Err(e.into());
            }
        }

        self.retire_through(api, index);
        self.last_synced_point = target.point;
        Ok(())
    }

    /// Retire the whole timeline without waiting on fences.
    ///
    /// Only valid right after a device wait idle. Fork and chain points of a
    /// multi-queue submit never get their fence submitted, so waiting on the
    /// tail is not enough when a submit and its reclaim both failed.
    pub fn retire_all_after_idle(&mut self, api: &dyn GpuApi) {
        if let Some(back) = self.timeline.back().copied() {
            self.retire_through(api, self.timeline.len() - 1);
            self.last_synced_point = back.point;
        }
    }

    /// Pop entries `0..=index`. The last popped semaphore and orphaned ones are
    /// destroyed instead of recycled; every other primitive goes back to its
    /// pool.
    fn retire_through(&mut self, api: &dyn GpuApi, index: usize) {
        for (i, entry) in self.timeline.drain(..=index).enumerate() {
            match api.reset_fence(entry.fence) {
                Ok(()) => self.fence_pool.release(entry.fence),
                Err(e) => {
                    log::warn!(
                        "Failed to reset fence of point {}: {:?}, destroying it",
                        entry.point,
                        e
                    );
                    api.destroy_fence(entry.fence);
                }
            }

            let orphaned = self.orphaned.remove(&entry.semaphore);
            if i == index || orphaned {
                api.destroy_semaphore(entry.semaphore);
            } else {
                self.semaphore_pool.release(entry.semaphore);
            }
            log::trace!("Timeline: retired point {}", entry.point);
        }
    }

    /// The newest tracked sync, if any.
    pub fn last_submit_sync(&self) -> Option<&SubmitSync> {
        self.timeline.back()
    }

    /// Every point up to and including this one has completed.
    pub fn last_synced_point(&self) -> u64 {
        self.last_synced_point
    }

    /// The most recently reserved point.
    pub fn actual_point(&self) -> u64 {
        self.actual_point
    }

    /// Tracked syncs, oldest first.
    pub fn timeline(&self) -> impl Iterator<Item = &SubmitSync> {
        self.timeline.iter()
    }

    pub fn orphaned_count(&self) -> usize {
        self.orphaned.len()
    }

    pub fn in_flight_count(&self) -> usize {
        self.timeline.len()
    }

    pub fn fence_pool(&self) -> &FencePool {
        &self.fence_pool
    }

    pub fn semaphore_pool(&self) -> &SemaphorePool {
        &self.semaphore_pool
    }

    /// Destroy every primitive, tracked or pooled. The device must be idle.
    pub fn shutdown(&mut self, api: &dyn GpuApi) {
        if let Some(back) = self.timeline.back() {
            self.last_synced_point = back.point;
        }
        for entry in self.timeline.drain(..) {
            api.destroy_fence(entry.fence);
            api.destroy_semaphore(entry.semaphore);
        }
        self.orphaned.clear();
        self.fence_pool.destroy(api, &vk::FenceCreateFlags::empty());
        self.semaphore_pool.destroy(api, &());
    }
}
