//! Queue family discovery and the resolved device queues.

use ash::vk;

/// The kind of queue work is submitted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueType {
    Graphics,
    Compute,
}

/// Command buffers are allocated per queue type.
pub type CommandBufferType = QueueType;

/// Queue families chosen for graphics and compute work.
///
/// Compute may alias the graphics family. When it does and the family exposes
/// a second queue, compute gets that queue (`num_unique_queues == 2`);
/// otherwise both share one hardware queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics_family: u32,
    pub compute_family: u32,
    pub num_unique_queues: u32,
}

impl QueueFamilyIndices {
    /// Pick families from `vkGetPhysicalDeviceQueueFamilyProperties` output.
    ///
    /// Graphics takes the first family with `GRAPHICS`. Compute prefers a
    /// family with `COMPUTE` but without `GRAPHICS`, then any family that still
    /// has a `COMPUTE` queue left, and finally shares the graphics queue.
    /// Returns `None` if no family supports graphics.
    pub fn find(families: &[vk::QueueFamilyProperties]) -> Option<Self> {
        let mut remaining: Vec<u32> = families.iter().map(|f| f.queue_count).collect();

        let mut take = |desired: vk::QueueFlags, undesired: vk::QueueFlags| -> Option<u32> {
            let index = families.iter().enumerate().position(|(i, family)| {
                remaining[i] > 0
                    && family.queue_flags.contains(desired)
                    && !family.queue_flags.intersects(undesired)
            })?;
            remaining[index] -= 1;
            u32::try_from(index).ok()
        };

        let graphics_family = take(vk::QueueFlags::GRAPHICS, vk::QueueFlags::empty())?;

        let dedicated = take(vk::QueueFlags::COMPUTE, vk::QueueFlags::GRAPHICS);
        let compute = dedicated.or_else(|| take(vk::QueueFlags::COMPUTE, vk::QueueFlags::empty()));

        Some(match compute {
            Some(compute_family) => Self {
                graphics_family,
                compute_family,
                num_unique_queues: 2,
            },
            None => Self {
                graphics_family,
                compute_family: graphics_family,
                num_unique_queues: 1,
            },
        })
    }

    /// True if graphics and compute come from the same family.
    pub fn same_family(&self) -> bool {
        self.graphics_family == self.compute_family
    }

    /// True if graphics and compute share one hardware queue.
    pub fn shares_queue(&self) -> bool {
        self.same_family() && self.num_unique_queues == 1
    }

    /// Index of the compute queue within its family.
    pub fn compute_queue_index(&self) -> u32 {
        if self.same_family() && self.num_unique_queues > 1 {
            1
        } else {
            0
        }
    }

    /// `(family, queue count)` pairs for `VkDeviceQueueCreateInfo`.
    pub fn queue_create_layout(&self) -> Vec<(u32, u32)> {
        if self.same_family() {
            vec![(self.graphics_family, self.num_unique_queues)]
        } else {
            vec![(self.graphics_family, 1), (self.compute_family, 1)]
        }
    }

    pub fn family(&self, queue_type: QueueType) -> u32 {
        match queue_type {
            QueueType::Graphics => self.graphics_family,
            QueueType::Compute => self.compute_family,
        }
    }
}

/// Graphics and compute queues retrieved from the logical device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceQueues {
    graphics: vk::Queue,
    compute: vk::Queue,
    families: QueueFamilyIndices,
}

impl DeviceQueues {
    pub fn new(graphics: vk::Queue, compute: vk::Queue, families: QueueFamilyIndices) -> Self {
        Self {
            graphics,
            compute,
            families,
        }
    }

    pub fn get(&self, queue_type: QueueType) -> vk::Queue {
        match queue_type {
            QueueType::Graphics => self.graphics,
            QueueType::Compute => self.compute,
        }
    }

    pub fn graphics(&self) -> vk::Queue {
        self.graphics
    }

    pub fn compute(&self) -> vk::Queue {
        self.compute
    }

    pub fn families(&self) -> &QueueFamilyIndices {
        &self.families
    }

    pub fn family(&self, queue_type: QueueType) -> u32 {
        self.families.family(queue_type)
    }
}
