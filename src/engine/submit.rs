//! Submission of command buffers on the timeline.
//!
//! A submit touching a single hardware queue becomes one `vkQueueSubmit` whose
//! batches are chained by semaphores. A submit spanning several queues forks
//! from the timeline tail, runs one chain per queue and merges back:
//!
//! ```text
//!              ┌─► chain(Q1): cb0 ─► cb1 ──┐
//! tail ─► fork ┤                           ├─► merge (fenced, returned)
//!              └─► chain(Q2): cb2 ─────────┘
//! ```
//!
//! Fork and merge run on the queue of the first params entry. If a chain or
//! the merge fails after the fork went through, a reclaim batch waits on every
//! semaphore the submit left signaled, so the pooled semaphores are never
//! signaled twice and the timeline tail carries an armed fence.

use std::ops::Range;

use ash::vk;

use super::Engine;
use crate::backend::{GpuApi, SubmitBatch};
use crate::error::EngineResult;
use crate::queue::{DeviceQueues, QueueType};
use crate::sync::{SubmitSync, SubmitSyncManager};

/// Command buffers to run on one queue type.
///
/// Command buffers must come from [`Engine::acquire_command_buffer`] with the
/// same queue type. Submitting hands them back to the engine, which recycles
/// them once the submission completes; this holds for failed submits too.
#[derive(Debug, Clone, Copy)]
pub struct SubmitParams<'a> {
    pub queue: QueueType,
    pub command_buffers: &'a [vk::CommandBuffer],
}

impl<'a> SubmitParams<'a> {
    pub fn new(queue: QueueType, command_buffers: &'a [vk::CommandBuffer]) -> Self {
        Self {
            queue,
            command_buffers,
        }
    }

    pub fn graphics(command_buffers: &'a [vk::CommandBuffer]) -> Self {
        Self::new(QueueType::Graphics, command_buffers)
    }

    pub fn compute(command_buffers: &'a [vk::CommandBuffer]) -> Self {
        Self::new(QueueType::Compute, command_buffers)
    }
}

/// Consecutive params resolving to the same hardware queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct QueueRun {
    pub queue: vk::Queue,
    pub params: Range<usize>,
}

/// Group params by resolved queue. Aliased queue types collapse into one run.
///
/// # Panics
///
/// Panics if a queue shows up in two separate runs.
pub(crate) fn queue_runs(params: &[SubmitParams<'_>], queues: &DeviceQueues) -> Vec<QueueRun> {
    let mut runs: Vec<QueueRun> = Vec::new();
    for (i, param) in params.iter().enumerate() {
        let queue = queues.get(param.queue);
        match runs.last_mut() {
            Some(run) if run.queue == queue => run.params.end = i + 1,
            _ => {
                assert!(
                    runs.iter().all(|run| run.queue != queue),
                    "submit params for queue {:?} must be contiguous",
                    queue
                );
                runs.push(QueueRun {
                    queue,
                    params: i..i + 1,
                });
            }
        }
    }
    runs
}

fn discard_all(manager: &mut SubmitSyncManager, syncs: Vec<SubmitSync>) {
    for sync in syncs {
        manager.discard(sync);
    }
}

fn acquire_syncs(
    manager: &mut SubmitSyncManager,
    api: &dyn GpuApi,
    count: usize,
) -> EngineResult<Vec<SubmitSync>> {
    let mut syncs = Vec::with_capacity(count);
    for _ in 0..count {
        match manager.get_submit_sync(api) {
            Ok(sync) => syncs.push(sync),
            Err(e) => {
                discard_all(manager, syncs);
                return Err(e);
            }
        }
    }
    Ok(syncs)
}

/// One batch per params entry; each waits on the previous signal.
fn chain_batches(
    params: &[SubmitParams<'_>],
    syncs: &[SubmitSync],
    first_wait: Option<vk::Semaphore>,
) -> Vec<SubmitBatch> {
    let mut wait = first_wait;
    params
        .iter()
        .zip(syncs)
        .map(|(param, sync)| {
            let mut batch = SubmitBatch::new();
            if let Some(semaphore) = wait {
                batch = batch.wait(semaphore);
            }
            wait = Some(sync.semaphore);
            batch
                .command_buffers(param.command_buffers)
                .signal(sync.semaphore)
        })
        .collect()
}

/// Submit, then track the syncs on success or recycle them on failure.
fn submit_and_track(
    manager: &mut SubmitSyncManager,
    api: &dyn GpuApi,
    queue: vk::Queue,
    batches: &[SubmitBatch],
    syncs: Vec<SubmitSync>,
    fence: vk::Fence,
) -> EngineResult<()> {
    match api.queue_submit(queue, batches, fence) {
        Ok(()) => {
            for sync in syncs {
                manager.insert_into_timeline(sync);
            }
            Ok(())
        }
        Err(e) => {
            log::error!("Queue submission to {:?} failed: {:?}", queue, e);
            discard_all(manager, syncs);
            Err(e.into())
        }
    }
}

/// Submit one run's chain seeded by its fork semaphore. Returns the chain's
/// final semaphore.
fn submit_chain(
    manager: &mut SubmitSyncManager,
    api: &dyn GpuApi,
    queue: vk::Queue,
    params: &[SubmitParams<'_>],
    fork_semaphore: vk::Semaphore,
) -> EngineResult<vk::Semaphore> {
    let syncs = acquire_syncs(manager, api, params.len())?;
    let final_semaphore = syncs.last().map_or(fork_semaphore, |s| s.semaphore);
    let batches = chain_batches(params, &syncs, Some(fork_semaphore));
    submit_and_track(manager, api, queue, &batches, syncs, vk::Fence::null())?;
    Ok(final_semaphore)
}

/// Wait on signals left behind by a partially failed submit.
///
/// If the reclaim submit itself fails the semaphores are marked orphaned, so
/// retirement destroys them instead of pooling them.
fn reclaim_signals(
    manager: &mut SubmitSyncManager,
    api: &dyn GpuApi,
    queue: vk::Queue,
    semaphores: &[vk::Semaphore],
) {
    let sync = match manager.get_submit_sync(api) {
        Ok(sync) => sync,
        Err(e) => {
            log::error!("Cannot reclaim {} semaphore(s): {}", semaphores.len(), e);
            manager.orphan_semaphores(semaphores);
            return;
        }
    };

    let reclaim = semaphores
        .iter()
        .copied()
        .fold(SubmitBatch::new(), SubmitBatch::wait)
        .signal(sync.semaphore);
    match submit_and_track(manager, api, queue, &[reclaim], vec![sync], sync.fence) {
        Ok(()) => log::debug!(
            "Reclaimed {} semaphore(s) at point {}",
            semaphores.len(),
            sync.point
        ),
        Err(e) => {
            log::error!("Cannot reclaim {} semaphore(s): {}", semaphores.len(), e);
            manager.orphan_semaphores(semaphores);
        }
    }
}

impl Engine {
    /// Submit command buffers, returning the sync to wait on.
    ///
    /// Failures are logged and reported as [`SubmitSync::failed`]. See
    /// [`try_submit`](Self::try_submit) for the error itself.
    pub fn submit(&mut self, params: &[SubmitParams<'_>]) -> SubmitSync {
        match self.try_submit(params) {
            Ok(sync) => sync,
            Err(e) => {
                log::error!("Submit failed: {}", e);
                SubmitSync::failed()
            }
        }
    }

    /// Submit command buffers across one or more queues.
    ///
    /// The work waits on everything previously submitted. The returned sync
    /// completes after every command buffer in `params`. Empty params submit
    /// nothing and return the sentinel.
    ///
    /// # Panics
    ///
    /// Panics if entries for the same queue are not adjacent.
    pub fn try_submit(&mut self, params: &[SubmitParams<'_>]) -> EngineResult<SubmitSync> {
        if params.is_empty() {
            log::debug!("Empty submit, nothing to do");
            return Ok(SubmitSync::failed());
        }

        let runs = queue_runs(params, &self.queues);
        let result = if runs.len() == 1 {
            self.submit_single_queue(runs[0].queue, params)
        } else {
            self.submit_fork_merge(&runs, params)
        };

        // After a failure part of the work may still be on the GPU, so the
        // buffers are parked behind every point reserved so far.
        let release_point = match &result {
            Ok(sync) => sync.point,
            Err(_) => self.submit_sync.actual_point(),
        };
        for param in params {
            for &command_buffer in param.command_buffers {
                self.command_buffers
                    .release(param.queue, command_buffer, release_point);
            }
        }
        let sync = result?;

        log::trace!(
            "Submitted {} params on {} queue(s) as point {}",
            params.len(),
            runs.len(),
            sync.point
        );
        Ok(sync)
    }

    fn submit_single_queue(
        &mut self,
        queue: vk::Queue,
        params: &[SubmitParams<'_>],
    ) -> EngineResult<SubmitSync> {
        let api = self.api.as_ref();
        let syncs = acquire_syncs(&mut self.submit_sync, api, params.len())?;
        let Some(&last) = syncs.last() else {
            return Ok(SubmitSync::failed());
        };

        let tail = self.submit_sync.last_submit_sync().map(|s| s.semaphore);
        let batches = chain_batches(params, &syncs, tail);
        submit_and_track(&mut self.submit_sync, api, queue, &batches, syncs, last.fence)?;
        Ok(last)
    }

    fn submit_fork_merge(
        &mut self,
        runs: &[QueueRun],
        params: &[SubmitParams<'_>],
    ) -> EngineResult<SubmitSync> {
        let api = self.api.as_ref();
        let fork_queue = runs[0].queue;

        let fork_syncs = acquire_syncs(&mut self.submit_sync, api, runs.len())?;
        let fork_semaphores: Vec<vk::Semaphore> = fork_syncs.iter().map(|s| s.semaphore).collect();
        let mut fork = SubmitBatch::new();
        if let Some(tail) = self.submit_sync.last_submit_sync() {
            fork = fork.wait(tail.semaphore);
        }
        let fork = fork_semaphores.iter().copied().fold(fork, SubmitBatch::signal);
        submit_and_track(
            &mut self.submit_sync,
            api,
            fork_queue,
            &[fork],
            fork_syncs,
            vk::Fence::null(),
        )?;

        // Semaphores signaled by this submit that nothing waits on yet: a
        // run's fork semaphore until its chain is submitted, then the chain's
        // final semaphore.
        let mut signaled = fork_semaphores;
        for (i, run) in runs.iter().enumerate() {
            let chained = submit_chain(
                &mut self.submit_sync,
                api,
                run.queue,
                &params[run.params.clone()],
                signaled[i],
            );
            match chained {
                Ok(final_semaphore) => signaled[i] = final_semaphore,
                Err(e) => {
                    reclaim_signals(&mut self.submit_sync, api, fork_queue, &signaled);
                    return Err(e);
                }
            }
        }

        let merge_sync = match self.submit_sync.get_submit_sync(api) {
            Ok(sync) => sync,
            Err(e) => {
                reclaim_signals(&mut self.submit_sync, api, fork_queue, &signaled);
                return Err(e);
            }
        };
        let merge = signaled
            .iter()
            .copied()
            .fold(SubmitBatch::new(), SubmitBatch::wait)
            .signal(merge_sync.semaphore);
        if let Err(e) = submit_and_track(
            &mut self.submit_sync,
            api,
            fork_queue,
            &[merge],
            vec![merge_sync],
            merge_sync.fence,
        ) {
            reclaim_signals(&mut self.submit_sync, api, fork_queue, &signaled);
            return Err(e);
        }
        Ok(merge_sync)
    }
}
