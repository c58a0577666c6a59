//! Vulkan instance creation and configuration.

use std::ffi::{CStr, CString};

use ash::vk;

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};

/// Validation layer name.
pub const VALIDATION_LAYER_NAME: &CStr = c"VK_LAYER_KHRONOS_validation";

/// A created instance and what was enabled on it.
pub struct CreatedInstance {
    pub instance: ash::Instance,
    pub enabled_layers: Vec<&'static CStr>,
    pub enabled_extensions: Vec<&'static CStr>,
}

/// The subset of `preferred` that appears in `available`, in `preferred` order.
pub fn select_supported<'a>(available: &[&CStr], preferred: &[&'a CStr]) -> Vec<&'a CStr> {
    preferred
        .iter()
        .copied()
        .filter(|name| available.iter().any(|a| a == name))
        .collect()
}

/// Create a Vulkan instance.
///
/// `required_extensions` (the window's surface extensions) are always
/// requested. The validation layer and debug utils extension are added when
/// validation is enabled and the loader reports them.
pub fn create_instance(
    entry: &ash::Entry,
    config: &EngineConfig,
    required_extensions: &[&'static CStr],
) -> EngineResult<CreatedInstance> {
    let layer_properties = unsafe { entry.enumerate_instance_layer_properties() }.unwrap_or_default();
    let available_layers: Vec<&CStr> = layer_properties
        .iter()
        .filter_map(|layer| layer.layer_name_as_c_str().ok())
        .collect();

    let extension_properties =
        unsafe { entry.enumerate_instance_extension_properties(None) }.map_err(|e| {
            EngineError::InitializationFailed(format!(
                "Failed to enumerate instance extensions: {:?}",
                e
            ))
        })?;
    let available_extensions: Vec<&CStr> = extension_properties
        .iter()
        .filter_map(|ext| ext.extension_name_as_c_str().ok())
        .collect();

    let mut enabled_layers = Vec::new();
    let mut enabled_extensions: Vec<&'static CStr> = required_extensions.to_vec();

    if config.validation {
        enabled_layers = select_supported(&available_layers, &[VALIDATION_LAYER_NAME]);
        if enabled_layers.is_empty() {
            log::warn!("Validation layers requested but not available");
        }
        for ext in select_supported(&available_extensions, &[ash::ext::debug_utils::NAME]) {
            if !enabled_extensions.contains(&ext) {
                enabled_extensions.push(ext);
            }
        }
    }

    let app_name = CString::new(config.application_name.as_str()).map_err(|e| {
        EngineError::InitializationFailed(format!("Invalid application name: {}", e))
    })?;

    let app_info = vk::ApplicationInfo::default()
        .application_name(&app_name)
        .application_version(vk::make_api_version(0, 0, 1, 0))
        .engine_name(c"Timeline Engine")
        .engine_version(vk::make_api_version(0, 0, 1, 0))
        .api_version(config.api_version);

    let extension_ptrs: Vec<*const std::ffi::c_char> =
        enabled_extensions.iter().map(|name| name.as_ptr()).collect();
    let layer_ptrs: Vec<*const std::ffi::c_char> =
        enabled_layers.iter().map(|name| name.as_ptr()).collect();

    let create_info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_extension_names(&extension_ptrs)
        .enabled_layer_names(&layer_ptrs);

    let instance = unsafe { entry.create_instance(&create_info, None) }.map_err(|e| {
        EngineError::InitializationFailed(format!("Failed to create Vulkan instance: {:?}", e))
    })?;

    log::info!(
        "Vulkan instance created (layers: {:?}, extensions: {:?})",
        enabled_layers,
        enabled_extensions
    );

    Ok(CreatedInstance {
        instance,
        enabled_layers,
        enabled_extensions,
    })
}
