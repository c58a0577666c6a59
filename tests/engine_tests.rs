//! Engine integration tests: swapchain acquire/present, deferred destruction,
//! frame pacing and teardown.

mod common;

use std::time::Duration;

use ash::vk;
use rstest::rstest;

use common::{QueueLayout, TestContext};
use timeline_engine::{
    EngineConfig, EngineError, HeadlessWindow, PresentStatus, QueueType, SubmitParams,
    VulkanResource,
};

fn submit_graphics(ctx: &mut TestContext) -> timeline_engine::SubmitSync {
    let cb = ctx
        .engine
        .acquire_command_buffer(QueueType::Graphics)
        .expect("Failed to acquire command buffer");
    ctx.engine.submit(&[SubmitParams::graphics(&[cb])])
}

// ============================================================================
// Swapchain
// ============================================================================

#[test]
fn test_no_swapchain() {
    let mut ctx = TestContext::new(QueueLayout::Shared);
    let window = HeadlessWindow::new(640, 480);

    assert_eq!(
        ctx.engine.acquire_next_image(&window, None),
        Err(EngineError::NoSwapchain)
    );
    assert_eq!(ctx.engine.present(&window, 0), Err(EngineError::NoSwapchain));
    assert_eq!(ctx.engine.submit_sync_manager().in_flight_count(), 0);
}

#[rstest]
#[case::shared(QueueLayout::Shared)]
#[case::dedicated(QueueLayout::Dedicated)]
fn test_acquire_submit_present_chain(#[case] layout: QueueLayout) {
    let mut ctx = TestContext::new(layout);

    let image = ctx
        .engine
        .acquire_next_image(&ctx.window, None)
        .expect("Failed to acquire image");
    assert_eq!(image.image_index, 0);
    assert!(!image.suboptimal);
    assert_eq!(ctx.engine.last_submit_sync(), Some(image.sync));

    let sync = submit_graphics(&mut ctx);
    let submissions = ctx.api.submissions();
    assert_eq!(
        submissions[0].batches[0].wait_semaphores,
        vec![image.sync.semaphore]
    );

    let status = ctx
        .engine
        .present(&ctx.window, image.image_index)
        .expect("Failed to present");
    assert_eq!(status, PresentStatus::Optimal);

    let presents = ctx.api.presents();
    assert_eq!(presents.len(), 1);
    assert_eq!(presents[0].queue, ctx.engine.queues().graphics());
    assert_eq!(presents[0].wait_semaphore, Some(sync.semaphore));
    assert_eq!(presents[0].image_index, image.image_index);
}

#[test]
fn test_acquire_out_of_date() {
    let mut ctx = TestContext::new(QueueLayout::Shared);
    submit_graphics(&mut ctx);
    let before: Vec<_> = ctx.engine.submit_sync_manager().timeline().copied().collect();

    ctx.api.fail_next_acquire(vk::Result::ERROR_OUT_OF_DATE_KHR);
    let result = ctx.engine.acquire_next_image(&ctx.window, None);

    assert_eq!(result, Err(EngineError::SwapchainOutOfDate));
    let after: Vec<_> = ctx.engine.submit_sync_manager().timeline().copied().collect();
    assert_eq!(before, after);

    let image = ctx
        .engine
        .acquire_next_image(&ctx.window, None)
        .expect("Failed to acquire image after recovery");
    assert!(image.sync.point > before[0].point);
}

#[test]
fn test_acquire_images_rotate() {
    let mut ctx = TestContext::new(QueueLayout::Shared);
    ctx.api.set_swapchain_image_count(2);

    let indices: Vec<u32> = (0..3)
        .map(|_| {
            ctx.engine
                .acquire_next_image(&ctx.window, None)
                .expect("Failed to acquire image")
                .image_index
        })
        .collect();

    assert_eq!(indices, vec![0, 1, 0]);
}

// ============================================================================
// Deferred Destruction
// ============================================================================

#[test]
fn test_destruction_waits_for_submission() {
    let mut ctx = TestContext::new(QueueLayout::Shared);
    let (buffer, memory) = ctx.api.make_buffer();

    let sync = submit_graphics(&mut ctx);
    ctx.engine
        .enqueue_resource_for_destruction(VulkanResource::Buffer { buffer, memory }, sync.point);

    assert_eq!(ctx.engine.collect_garbage(), 0);
    assert!(ctx.api.destroyed_buffers().is_empty());

    ctx.engine.wait_for_submit_sync(&sync, None).unwrap();
    assert_eq!(ctx.engine.collect_garbage(), 1);
    assert_eq!(ctx.api.destroyed_buffers(), vec![buffer]);
    assert_eq!(ctx.api.freed_memory(), vec![memory]);
    assert!(ctx.engine.safe_resource_destroyer().is_empty());
}

#[test]
fn test_acquire_collects_garbage() {
    let mut ctx = TestContext::new(QueueLayout::Shared);
    let (image, memory) = ctx.api.make_image();

    let sync = submit_graphics(&mut ctx);
    ctx.engine
        .enqueue_resource_for_destruction(VulkanResource::Image { image, memory }, sync.point);
    ctx.engine.wait_for_submit_sync(&sync, None).unwrap();

    ctx.engine
        .acquire_next_image(&ctx.window, None)
        .expect("Failed to acquire image");

    assert_eq!(ctx.api.destroyed_images(), vec![image]);
    assert_eq!(ctx.engine.safe_resource_destroyer().pending_count(), 0);
}

// ============================================================================
// Frame Loop
// ============================================================================

#[rstest]
#[case::shared(QueueLayout::Shared)]
#[case::dedicated(QueueLayout::Dedicated)]
fn test_frame_loop_bounds_resources(#[case] layout: QueueLayout) {
    let config = EngineConfig::default()
        .with_validation(false)
        .with_frames_in_flight(3);
    let mut ctx = TestContext::with_config(layout, config);
    let mut pacer = ctx.engine.frame_pacer();
    assert_eq!(pacer.frames_in_flight(), 3);

    for _ in 0..10 {
        pacer
            .pace(&mut ctx.engine, Some(Duration::from_secs(1)))
            .expect("Failed to pace frame");
        let image = ctx
            .engine
            .acquire_next_image(&ctx.window, None)
            .expect("Failed to acquire image");
        let sync = submit_graphics(&mut ctx);
        ctx.engine
            .present(&ctx.window, image.image_index)
            .expect("Failed to present");
        pacer.record(sync);

        assert!(ctx.engine.submit_sync_manager().in_flight_count() <= 6);
    }

    assert_eq!(ctx.api.live_command_buffer_count(), 3);
    assert_eq!(ctx.api.presents().len(), 10);
}

// ============================================================================
// Idle and Teardown
// ============================================================================

#[test]
fn test_wait_idle_retires_everything() {
    let mut ctx = TestContext::new(QueueLayout::Dedicated);
    ctx.api.set_auto_signal(false);
    let (buffer, memory) = ctx.api.make_buffer();

    let g = ctx.engine.acquire_command_buffer(QueueType::Graphics).unwrap();
    let c = ctx.engine.acquire_command_buffer(QueueType::Compute).unwrap();
    let sync = ctx
        .engine
        .submit(&[SubmitParams::graphics(&[g]), SubmitParams::compute(&[c])]);
    ctx.engine
        .enqueue_resource_for_destruction(VulkanResource::Buffer { buffer, memory }, sync.point);

    ctx.engine.wait_idle().unwrap();

    assert_eq!(ctx.engine.submit_sync_manager().in_flight_count(), 0);
    assert_eq!(ctx.engine.last_synced_point(), sync.point);
    assert_eq!(ctx.api.destroyed_buffers(), vec![buffer]);
}

#[rstest]
#[case::shared(QueueLayout::Shared)]
#[case::dedicated(QueueLayout::Dedicated)]
fn test_shutdown_releases_everything(#[case] layout: QueueLayout) {
    let mut ctx = TestContext::new(layout);
    let (buffer, memory) = ctx.api.make_buffer();

    ctx.engine
        .acquire_next_image(&ctx.window, None)
        .expect("Failed to acquire image");
    let sync = submit_graphics(&mut ctx);
    ctx.engine
        .enqueue_resource_for_destruction(VulkanResource::Buffer { buffer, memory }, sync.point);
    let cb = ctx.engine.acquire_command_buffer(QueueType::Compute).unwrap();
    ctx.engine.submit(&[SubmitParams::compute(&[cb])]);

    ctx.engine.shutdown(&mut ctx.window);

    assert_eq!(ctx.api.live_fence_count(), 0);
    assert_eq!(ctx.api.live_semaphore_count(), 0);
    assert_eq!(ctx.api.live_command_pool_count(), 0);
    assert_eq!(ctx.api.live_command_buffer_count(), 0);
    assert_eq!(ctx.api.destroyed_buffers(), vec![buffer]);
}

#[test]
fn test_drop_releases_everything() {
    let mut ctx = TestContext::new(QueueLayout::Dedicated);
    submit_graphics(&mut ctx);
    let TestContext { engine, api, .. } = ctx;

    drop(engine);

    assert_eq!(api.live_fence_count(), 0);
    assert_eq!(api.live_semaphore_count(), 0);
    assert_eq!(api.live_command_pool_count(), 0);
}
