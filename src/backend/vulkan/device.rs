//! Vulkan physical and logical device management.

use std::ffi::CStr;

use ash::vk;

use crate::error::{EngineError, EngineResult};
use crate::queue::{DeviceQueues, QueueFamilyIndices};

/// Pick the first discrete GPU, falling back to the first integrated one.
pub fn pick_device_index(device_types: &[vk::PhysicalDeviceType]) -> Option<usize> {
    device_types
        .iter()
        .position(|ty| *ty == vk::PhysicalDeviceType::DISCRETE_GPU)
        .or_else(|| {
            device_types
                .iter()
                .position(|ty| *ty == vk::PhysicalDeviceType::INTEGRATED_GPU)
        })
}

/// Select the physical device to render with.
pub fn select_physical_device(instance: &ash::Instance) -> EngineResult<vk::PhysicalDevice> {
    let devices = unsafe { instance.enumerate_physical_devices() }.map_err(|e| {
        EngineError::InitializationFailed(format!(
            "Failed to enumerate physical devices: {:?}",
            e
        ))
    })?;

    if devices.is_empty() {
        return Err(EngineError::InitializationFailed(
            "No Vulkan-capable GPU found".to_string(),
        ));
    }

    let mut device_types = Vec::with_capacity(devices.len());
    for &device in &devices {
        let properties = unsafe { instance.get_physical_device_properties(device) };
        log::info!(
            "Found GPU: {:?} (type: {:?})",
            properties.device_name_as_c_str().unwrap_or(c"<unnamed>"),
            properties.device_type
        );
        device_types.push(properties.device_type);
    }

    pick_device_index(&device_types)
        .map(|index| devices[index])
        .ok_or_else(|| {
            EngineError::InitializationFailed(
                "No discrete or integrated GPU found".to_string(),
            )
        })
}

/// Names from `required` that are missing from `available`.
pub fn missing_extensions<'a>(available: &[&CStr], required: &[&'a CStr]) -> Vec<&'a CStr> {
    required
        .iter()
        .copied()
        .filter(|name| !available.iter().any(|a| a == name))
        .collect()
}

fn check_device_extensions(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    required: &[&CStr],
) -> EngineResult<()> {
    let properties = unsafe { instance.enumerate_device_extension_properties(physical_device) }
        .map_err(|e| {
            EngineError::InitializationFailed(format!(
                "Failed to enumerate device extensions: {:?}",
                e
            ))
        })?;
    let available: Vec<&CStr> = properties
        .iter()
        .filter_map(|ext| ext.extension_name_as_c_str().ok())
        .collect();

    match missing_extensions(&available, required).first() {
        Some(missing) => Err(EngineError::MissingExtension(
            missing.to_string_lossy().into_owned(),
        )),
        None => Ok(()),
    }
}

/// Discover queue families on a physical device.
pub fn find_queue_families(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
) -> EngineResult<QueueFamilyIndices> {
    let families =
        unsafe { instance.get_physical_device_queue_family_properties(physical_device) };

    QueueFamilyIndices::find(&families).ok_or_else(|| {
        EngineError::InitializationFailed("No graphics queue family found".to_string())
    })
}

/// Create the logical device and fetch its graphics and compute queues.
pub fn create_logical_device(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    families: &QueueFamilyIndices,
    extensions: &[&CStr],
    queue_priorities: &[f32; 2],
) -> EngineResult<(ash::Device, DeviceQueues)> {
    check_device_extensions(instance, physical_device, extensions)?;

    let layout = families.queue_create_layout();
    let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = layout
        .iter()
        .enumerate()
        .map(|(i, &(family, count))| {
            let priorities = if count > 1 {
                &queue_priorities[..]
            } else {
                &queue_priorities[i.min(1)..=i.min(1)]
            };
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(family)
                .queue_priorities(priorities)
        })
        .collect();

    let extension_ptrs: Vec<*const std::ffi::c_char> =
        extensions.iter().map(|name| name.as_ptr()).collect();

    let create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_create_infos)
        .enabled_extension_names(&extension_ptrs);

    let device =
        unsafe { instance.create_device(physical_device, &create_info, None) }.map_err(|e| {
            EngineError::InitializationFailed(format!("Failed to create logical device: {:?}", e))
        })?;

    let graphics = unsafe { device.get_device_queue(families.graphics_family, 0) };
    let compute = unsafe {
        device.get_device_queue(families.compute_family, families.compute_queue_index())
    };

    log::info!(
        "Logical device created (graphics family {}, compute family {}, {} unique queue(s))",
        families.graphics_family,
        families.compute_family,
        families.num_unique_queues
    );

    Ok((device, DeviceQueues::new(graphics, compute, *families)))
}
