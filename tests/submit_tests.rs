//! Submission tests for the engine.
//!
//! These verify the shape of what reaches the queues: semaphore chains for
//! single-queue submits, fork/merge structure for multi-queue submits, and
//! the timeline bookkeeping around both.

mod common;

use std::time::Duration;

use ash::vk;
use rstest::rstest;

use common::{QueueLayout, TestContext};
use timeline_engine::{EngineError, QueueType, SubmitParams, SubmitSync};

fn acquire(ctx: &mut TestContext, ty: QueueType) -> vk::CommandBuffer {
    ctx.engine
        .acquire_command_buffer(ty)
        .expect("Failed to acquire command buffer")
}

// ============================================================================
// Single Queue
// ============================================================================

#[rstest]
#[case::shared(QueueLayout::Shared)]
#[case::second_queue(QueueLayout::SecondQueue)]
#[case::dedicated(QueueLayout::Dedicated)]
fn test_single_queue_linear_chain(#[case] layout: QueueLayout) {
    let mut ctx = TestContext::new(layout);
    let cbs: Vec<_> = (0..3).map(|_| acquire(&mut ctx, QueueType::Graphics)).collect();
    let params: Vec<_> = cbs
        .iter()
        .map(|cb| SubmitParams::graphics(std::slice::from_ref(cb)))
        .collect();

    let sync = ctx.engine.submit(&params);

    assert_eq!(sync.point, 3);
    let submissions = ctx.api.submissions();
    assert_eq!(submissions.len(), 1);

    let submit = &submissions[0];
    assert_eq!(submit.queue, ctx.engine.queues().graphics());
    assert_eq!(submit.fence, sync.fence);
    assert_eq!(submit.batches.len(), 3);
    assert!(submit.batches[0].wait_semaphores.is_empty());
    for i in 1..3 {
        assert_eq!(
            submit.batches[i].wait_semaphores,
            submit.batches[i - 1].signal_semaphores
        );
        assert_eq!(
            submit.batches[i].wait_stages,
            vec![vk::PipelineStageFlags::ALL_COMMANDS]
        );
    }
    assert_eq!(submit.batches[2].signal_semaphores, vec![sync.semaphore]);
    assert_eq!(ctx.engine.submit_sync_manager().in_flight_count(), 3);
}

#[test]
fn test_submit_waits_on_previous_tail() {
    let mut ctx = TestContext::new(QueueLayout::Dedicated);

    let cb = acquire(&mut ctx, QueueType::Graphics);
    let first = ctx.engine.submit(&[SubmitParams::graphics(&[cb])]);
    let cb = acquire(&mut ctx, QueueType::Compute);
    let second = ctx.engine.submit(&[SubmitParams::compute(&[cb])]);

    let submissions = ctx.api.submissions();
    assert_eq!(submissions.len(), 2);
    assert_eq!(submissions[1].queue, ctx.engine.queues().compute());
    assert_eq!(
        submissions[1].batches[0].wait_semaphores,
        vec![first.semaphore]
    );
    assert!(second.point > first.point);
}

#[test]
fn test_aliased_queues_take_single_path() {
    let mut ctx = TestContext::new(QueueLayout::Shared);
    let g = acquire(&mut ctx, QueueType::Graphics);
    let c = acquire(&mut ctx, QueueType::Compute);

    let sync = ctx
        .engine
        .submit(&[SubmitParams::graphics(&[g]), SubmitParams::compute(&[c])]);

    let submissions = ctx.api.submissions();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].batches.len(), 2);
    assert_eq!(submissions[0].fence, sync.fence);
}

// ============================================================================
// Multiple Queues
// ============================================================================

#[rstest]
#[case::second_queue(QueueLayout::SecondQueue)]
#[case::dedicated(QueueLayout::Dedicated)]
fn test_fork_merge_structure(#[case] layout: QueueLayout) {
    let mut ctx = TestContext::new(layout);
    let g0 = acquire(&mut ctx, QueueType::Graphics);
    let g1 = acquire(&mut ctx, QueueType::Graphics);
    let c0 = acquire(&mut ctx, QueueType::Compute);

    let sync = ctx.engine.submit(&[
        SubmitParams::graphics(&[g0]),
        SubmitParams::graphics(&[g1]),
        SubmitParams::compute(&[c0]),
    ]);
    assert!(!sync.is_failed());

    let graphics = ctx.engine.queues().graphics();
    let compute = ctx.engine.queues().compute();
    let submissions = ctx.api.submissions();
    assert_eq!(submissions.len(), 4);
    let total_batches: usize = submissions.iter().map(|s| s.batches.len()).sum();
    assert_eq!(total_batches, 5);

    let fork = &submissions[0];
    assert_eq!(fork.queue, graphics);
    assert_eq!(fork.fence, vk::Fence::null());
    assert_eq!(fork.batches.len(), 1);
    assert!(fork.batches[0].is_sync_only());
    assert_eq!(fork.batches[0].signal_semaphores.len(), 2);

    let graphics_chain = &submissions[1];
    assert_eq!(graphics_chain.queue, graphics);
    assert_eq!(graphics_chain.batches.len(), 2);
    assert_eq!(
        graphics_chain.batches[0].wait_semaphores,
        vec![fork.batches[0].signal_semaphores[0]]
    );
    assert_eq!(
        graphics_chain.batches[1].wait_semaphores,
        graphics_chain.batches[0].signal_semaphores
    );
    assert_eq!(graphics_chain.batches[1].command_buffers, vec![g1]);

    let compute_chain = &submissions[2];
    assert_eq!(compute_chain.queue, compute);
    assert_eq!(compute_chain.batches.len(), 1);
    assert_eq!(
        compute_chain.batches[0].wait_semaphores,
        vec![fork.batches[0].signal_semaphores[1]]
    );

    let merge = &submissions[3];
    assert_eq!(merge.queue, graphics);
    assert_eq!(merge.fence, sync.fence);
    assert!(merge.batches[0].is_sync_only());
    assert_eq!(
        merge.batches[0].wait_semaphores,
        vec![
            graphics_chain.batches[1].signal_semaphores[0],
            compute_chain.batches[0].signal_semaphores[0],
        ]
    );
    assert_eq!(merge.batches[0].signal_semaphores, vec![sync.semaphore]);

    let points: Vec<u64> = ctx
        .engine
        .submit_sync_manager()
        .timeline()
        .map(|s| s.point)
        .collect();
    assert_eq!(points, vec![1, 2, 3, 4, 5, 6]);
    assert_eq!(sync.point, 6);
}

#[test]
fn test_fork_waits_on_previous_tail() {
    let mut ctx = TestContext::new(QueueLayout::Dedicated);
    let cb = acquire(&mut ctx, QueueType::Graphics);
    let before = ctx.engine.submit(&[SubmitParams::graphics(&[cb])]);

    let g = acquire(&mut ctx, QueueType::Graphics);
    let c = acquire(&mut ctx, QueueType::Compute);
    ctx.engine
        .submit(&[SubmitParams::compute(&[c]), SubmitParams::graphics(&[g])]);

    let submissions = ctx.api.submissions();
    let fork = &submissions[1];
    assert_eq!(fork.queue, ctx.engine.queues().compute());
    assert_eq!(fork.batches[0].wait_semaphores, vec![before.semaphore]);
    assert_eq!(submissions[4].queue, ctx.engine.queues().compute());
}

#[test]
#[should_panic(expected = "must be contiguous")]
fn test_interleaved_queues_panic() {
    let mut ctx = TestContext::new(QueueLayout::Dedicated);
    let cb = acquire(&mut ctx, QueueType::Graphics);
    ctx.engine.submit(&[
        SubmitParams::graphics(&[cb]),
        SubmitParams::compute(&[]),
        SubmitParams::graphics(&[]),
    ]);
}

// ============================================================================
// Failures
// ============================================================================

#[rstest]
#[case::single(false)]
#[case::multi(true)]
fn test_failed_submit_returns_sentinel(#[case] multi_queue: bool) {
    let mut ctx = TestContext::new(QueueLayout::Dedicated);
    let g = acquire(&mut ctx, QueueType::Graphics);
    let c = acquire(&mut ctx, QueueType::Compute);
    let g_cbs = [g];
    let c_cbs = [c];
    let params = if multi_queue {
        vec![SubmitParams::graphics(&g_cbs), SubmitParams::compute(&c_cbs)]
    } else {
        vec![SubmitParams::graphics(&g_cbs)]
    };

    ctx.api.fail_next_submit(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
    let sync = ctx.engine.submit(&params);

    assert_eq!(sync, SubmitSync::failed());
    assert!(sync.is_failed());
    assert_eq!(ctx.engine.submit_sync_manager().in_flight_count(), 0);
    assert_eq!(
        ctx.engine.command_buffer_recycler().parked_count(),
        params.len()
    );
}

#[test]
fn test_try_submit_reports_error() {
    let mut ctx = TestContext::new(QueueLayout::Shared);
    let cb = acquire(&mut ctx, QueueType::Graphics);

    ctx.api.fail_next_submit(vk::Result::ERROR_DEVICE_LOST);
    let result = ctx.engine.try_submit(&[SubmitParams::graphics(&[cb])]);

    assert_eq!(result, Err(EngineError::DeviceLost));
}

#[test]
fn test_failed_submit_recycles_primitives() {
    let mut ctx = TestContext::new(QueueLayout::Shared);
    let cb = acquire(&mut ctx, QueueType::Graphics);

    ctx.api.fail_next_submit(vk::Result::ERROR_UNKNOWN);
    ctx.engine.submit(&[SubmitParams::graphics(&[cb])]);
    let fences = ctx.api.live_fence_count();
    let semaphores = ctx.api.live_semaphore_count();

    let retry = acquire(&mut ctx, QueueType::Graphics);
    assert_ne!(retry, cb);
    let sync = ctx.engine.submit(&[SubmitParams::graphics(&[retry])]);
    assert!(!sync.is_failed());
    assert_eq!(ctx.api.live_fence_count(), fences);
    assert_eq!(ctx.api.live_semaphore_count(), semaphores);

    ctx.engine.wait_for_submit_sync(&sync, None).unwrap();
    assert_eq!(acquire(&mut ctx, QueueType::Graphics), cb);
}

/// Dedicated layout, `[graphics, compute]`: call 1 is the fork, 2 and 3 the
/// chains, 4 the merge.
#[rstest]
#[case::graphics_chain(2)]
#[case::compute_chain(3)]
#[case::merge(4)]
fn test_partial_failure_reclaims_signals(#[case] failing_call: usize) {
    let mut ctx = TestContext::new(QueueLayout::Dedicated);
    let g = acquire(&mut ctx, QueueType::Graphics);
    let c = acquire(&mut ctx, QueueType::Compute);

    ctx.api
        .fail_nth_submit(failing_call, vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
    let sync = ctx
        .engine
        .submit(&[SubmitParams::graphics(&[g]), SubmitParams::compute(&[c])]);
    assert!(sync.is_failed());

    let submissions = ctx.api.submissions();
    assert_eq!(submissions.len(), failing_call);
    let reclaim = &submissions[failing_call - 1];
    assert_eq!(reclaim.queue, ctx.engine.queues().graphics());
    assert_ne!(reclaim.fence, vk::Fence::null());
    assert!(reclaim.batches[0].is_sync_only());
    assert_eq!(reclaim.batches[0].wait_semaphores.len(), 2);
    for &semaphore in &reclaim.batches[0].wait_semaphores {
        assert!(!ctx.api.is_semaphore_signaled(semaphore));
    }

    let tail = ctx.engine.last_submit_sync().expect("reclaim is tracked");
    assert_eq!(tail.fence, reclaim.fence);
    ctx.engine
        .wait_for_submit_sync(&tail, Some(Duration::from_secs(1)))
        .unwrap();
    assert_eq!(ctx.engine.submit_sync_manager().in_flight_count(), 0);

    for _ in 0..4 {
        let g = acquire(&mut ctx, QueueType::Graphics);
        let c = acquire(&mut ctx, QueueType::Compute);
        let sync = ctx
            .engine
            .submit(&[SubmitParams::graphics(&[g]), SubmitParams::compute(&[c])]);
        assert!(!sync.is_failed());
        ctx.engine.wait_for_submit_sync(&sync, None).unwrap();
    }
    assert!(ctx.api.double_signaled_semaphores().is_empty());
}

#[test]
fn test_failed_reclaim_orphans_signals() {
    let mut ctx = TestContext::new(QueueLayout::Dedicated);
    let g = acquire(&mut ctx, QueueType::Graphics);
    let c = acquire(&mut ctx, QueueType::Compute);

    // The graphics chain and the reclaim after it both fail.
    ctx.api.fail_submits(1, 2, vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
    let sync = ctx
        .engine
        .submit(&[SubmitParams::graphics(&[g]), SubmitParams::compute(&[c])]);
    assert!(sync.is_failed());

    let fork_signals = ctx.api.submissions()[0].batches[0].signal_semaphores.clone();
    assert_eq!(ctx.engine.submit_sync_manager().orphaned_count(), 2);
    assert_eq!(ctx.engine.submit_sync_manager().in_flight_count(), 2);

    for _ in 0..4 {
        let g = acquire(&mut ctx, QueueType::Graphics);
        let c = acquire(&mut ctx, QueueType::Compute);
        let sync = ctx
            .engine
            .submit(&[SubmitParams::graphics(&[g]), SubmitParams::compute(&[c])]);
        assert!(!sync.is_failed());
        ctx.engine.wait_for_submit_sync(&sync, None).unwrap();
    }

    for semaphore in fork_signals {
        assert!(!ctx.api.is_semaphore_alive(semaphore));
    }
    assert_eq!(ctx.engine.submit_sync_manager().orphaned_count(), 0);
    assert!(ctx.api.double_signaled_semaphores().is_empty());
}

#[test]
fn test_empty_submit() {
    let mut ctx = TestContext::new(QueueLayout::Shared);

    let sync = ctx.engine.submit(&[]);

    assert!(sync.is_failed());
    assert!(ctx.api.submissions().is_empty());
}

// ============================================================================
// Waiting and Recycling
// ============================================================================

#[test]
fn test_wait_timeout_then_complete() {
    let mut ctx = TestContext::new(QueueLayout::Shared);
    ctx.api.set_auto_signal(false);
    let cb = acquire(&mut ctx, QueueType::Graphics);
    let sync = ctx.engine.submit(&[SubmitParams::graphics(&[cb])]);

    let result = ctx
        .engine
        .wait_for_submit_sync(&sync, Some(Duration::from_millis(1)));
    assert_eq!(result, Err(EngineError::Timeout));
    assert_eq!(ctx.engine.last_synced_point(), 0);

    ctx.api.signal_fence(sync.fence);
    ctx.engine.wait_for_submit_sync(&sync, None).unwrap();
    assert_eq!(ctx.engine.last_synced_point(), sync.point);
}

#[test]
fn test_wait_device_lost() {
    let mut ctx = TestContext::new(QueueLayout::Shared);
    let cb = acquire(&mut ctx, QueueType::Graphics);
    let sync = ctx.engine.submit(&[SubmitParams::graphics(&[cb])]);

    ctx.api.lose_device();

    assert_eq!(
        ctx.engine.wait_for_submit_sync(&sync, None),
        Err(EngineError::DeviceLost)
    );
    let cb = acquire(&mut ctx, QueueType::Graphics);
    assert!(ctx.engine.submit(&[SubmitParams::graphics(&[cb])]).is_failed());
}

#[rstest]
#[case::shared(QueueLayout::Shared)]
#[case::dedicated(QueueLayout::Dedicated)]
fn test_command_buffer_reused_after_wait(#[case] layout: QueueLayout) {
    let mut ctx = TestContext::new(layout);
    let cb = acquire(&mut ctx, QueueType::Compute);
    let sync = ctx.engine.submit(&[SubmitParams::compute(&[cb])]);

    let in_flight = acquire(&mut ctx, QueueType::Compute);
    assert_ne!(in_flight, cb);

    ctx.engine.wait_for_submit_sync(&sync, None).unwrap();
    let reused = acquire(&mut ctx, QueueType::Compute);
    assert_eq!(reused, cb);
}

#[test]
fn test_wait_on_merge_retires_whole_submit() {
    let mut ctx = TestContext::new(QueueLayout::Dedicated);
    let g = acquire(&mut ctx, QueueType::Graphics);
    let c = acquire(&mut ctx, QueueType::Compute);
    let sync = ctx
        .engine
        .submit(&[SubmitParams::graphics(&[g]), SubmitParams::compute(&[c])]);

    ctx.engine.wait_for_submit_sync(&sync, None).unwrap();

    assert_eq!(ctx.engine.submit_sync_manager().in_flight_count(), 0);
    assert_eq!(ctx.engine.last_synced_point(), sync.point);
    assert!(!ctx.api.is_semaphore_alive(sync.semaphore));
}
