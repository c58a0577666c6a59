//! Common utilities for engine integration tests.
//!
//! Every test runs against the recording [`DummyApi`], with the queue layout
//! chosen per case.

#![allow(dead_code)]

use timeline_engine::{
    DeviceQueues, DummyApi, Engine, EngineConfig, HeadlessWindow, QueueFamilyIndices, Window,
};

/// Initialize logging once per test binary.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug"))
        .is_test(true)
        .try_init();
}

// ============================================================================
// Queue Layouts
// ============================================================================

/// How graphics and compute map onto hardware queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueLayout {
    /// One queue serves both types.
    Shared,
    /// Same family, two queues.
    SecondQueue,
    /// Separate compute family.
    Dedicated,
}

impl QueueLayout {
    pub fn device_queues(self, api: &DummyApi) -> DeviceQueues {
        let graphics = api.make_queue();
        match self {
            QueueLayout::Shared => DeviceQueues::new(
                graphics,
                graphics,
                QueueFamilyIndices {
                    graphics_family: 0,
                    compute_family: 0,
                    num_unique_queues: 1,
                },
            ),
            QueueLayout::SecondQueue => DeviceQueues::new(
                graphics,
                api.make_queue(),
                QueueFamilyIndices {
                    graphics_family: 0,
                    compute_family: 0,
                    num_unique_queues: 2,
                },
            ),
            QueueLayout::Dedicated => DeviceQueues::new(
                graphics,
                api.make_queue(),
                QueueFamilyIndices {
                    graphics_family: 0,
                    compute_family: 2,
                    num_unique_queues: 2,
                },
            ),
        }
    }
}

// ============================================================================
// Test Context
// ============================================================================

/// An engine over a dummy API, plus a handle to inspect the API.
pub struct TestContext {
    pub engine: Engine,
    pub api: DummyApi,
    pub window: HeadlessWindow,
}

impl TestContext {
    pub fn new(layout: QueueLayout) -> Self {
        Self::with_config(layout, EngineConfig::default().with_validation(false))
    }

    pub fn with_config(layout: QueueLayout, config: EngineConfig) -> Self {
        init_logging();
        let api = DummyApi::new();
        let queues = layout.device_queues(&api);
        let engine = Engine::with_api(config, Box::new(api.clone()), queues)
            .expect("Failed to create engine");

        let mut window = HeadlessWindow::new(1600, 800);
        window.set_swapchain(api.make_swapchain());

        Self {
            engine,
            api,
            window,
        }
    }
}
