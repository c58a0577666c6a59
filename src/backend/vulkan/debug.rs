//! Vulkan validation layer debug messenger.

use std::ffi::CStr;

use ash::vk;

use crate::error::{EngineError, EngineResult};

/// A debug messenger routed into the `log` crate.
///
/// Owned by the Vulkan context: it must be destroyed before the instance it
/// was created from.
pub struct DebugMessenger {
    loader: ash::ext::debug_utils::Instance,
    messenger: vk::DebugUtilsMessengerEXT,
}

impl DebugMessenger {
    pub fn new(entry: &ash::Entry, instance: &ash::Instance) -> EngineResult<Self> {
        let loader = ash::ext::debug_utils::Instance::new(entry, instance);
        let create_info = messenger_create_info();

        let messenger = unsafe { loader.create_debug_utils_messenger(&create_info, None) }
            .map_err(|e| {
                EngineError::InitializationFailed(format!(
                    "Failed to create debug messenger: {:?}",
                    e
                ))
            })?;

        Ok(Self { loader, messenger })
    }

    /// Destroy the messenger. The parent instance must still be alive.
    pub fn destroy(self) {
        unsafe {
            self.loader
                .destroy_debug_utils_messenger(self.messenger, None)
        };
    }
}

impl std::fmt::Debug for DebugMessenger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebugMessenger")
            .field("messenger", &self.messenger)
            .finish_non_exhaustive()
    }
}

fn messenger_create_info() -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
    vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_callback))
}

/// A messenger is only useful with both the validation layer and the debug
/// utils extension enabled.
pub fn should_enable(enabled_layers: &[&CStr], enabled_extensions: &[&CStr]) -> bool {
    enabled_layers.contains(&super::instance::VALIDATION_LAYER_NAME)
        && enabled_extensions.contains(&ash::ext::debug_utils::NAME)
}

/// Debug callback function for validation layer messages.
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let message = if callback_data.is_null() {
        String::from("(no message)")
    } else {
        // SAFETY: callback_data is guaranteed to be valid by the Vulkan driver
        let data = unsafe { *callback_data };
        if data.p_message.is_null() {
            String::from("(null message)")
        } else {
            // SAFETY: p_message is a valid null-terminated string from the Vulkan driver
            unsafe { CStr::from_ptr(data.p_message) }
                .to_string_lossy()
                .into_owned()
        }
    };

    let type_str = match message_type {
        vk::DebugUtilsMessageTypeFlagsEXT::GENERAL => "General",
        vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION => "Validation",
        vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE => "Performance",
        _ => "Unknown",
    };

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("[Vulkan {}] {}", type_str, message);
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("[Vulkan {}] {}", type_str, message);
        }
        _ => {
            log::debug!("[Vulkan {}] {}", type_str, message);
        }
    }

    vk::FALSE
}
