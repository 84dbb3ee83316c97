// Copyright 2026 The Afterglow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! VkContext encapsulates the global resources, independent of presentation.  This includes
//! hardware and create-once abstractions of hardware.  Every group window shares one context.

use std::ffi::CStr;

use ash::vk;
use raw_window_handle::RawDisplayHandle;

use crate::RenderError;

static VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Hardware, drivers, and the lowest level abstractions of hardware.
pub struct VkContext {
    pub entry: ash::Entry,
    pub instance: ash::Instance,
    pub physical_device: vk::PhysicalDevice,
    pub device: ash::Device,
    pub surface_loader: ash::khr::surface::Instance,
    pub swapchain_loader: ash::khr::swapchain::Device,

    /// One family for graphics, compute and transfer.  Presentation is checked per surface.
    pub queue_family_index: u32,
    queue: vk::Queue,
    command_pool: vk::CommandPool,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
}

impl VkContext {
    /// `display` decides the surface extensions the instance loads.
    pub fn new(display: RawDisplayHandle) -> Result<Self, RenderError> {
        let entry = unsafe { ash::Entry::load()? };

        let mut extensions = ash_window::enumerate_required_extensions(display)?.to_vec();
        let layers = validation_layers(&entry);
        if !layers.is_empty() {
            extensions.push(ash::ext::debug_utils::NAME.as_ptr());
        }

        let app_info = vk::ApplicationInfo::default()
            .application_name(c"afterglow")
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::make_api_version(0, 1, 2, 0));
        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);
        let instance = unsafe { entry.create_instance(&create_info, None)? };

        let (physical_device, queue_family_index) = pick_device(&instance)?;
        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let name = properties
            .device_name_as_c_str()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        log::info!("vulkan device: {name}");

        let queue_priorities = [1.0];
        let queue_info = [vk::DeviceQueueCreateInfo::default()
            .queue_family_index(queue_family_index)
            .queue_priorities(&queue_priorities)];
        let device_extensions = [ash::khr::swapchain::NAME.as_ptr()];
        let device_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_info)
            .enabled_extension_names(&device_extensions);
        let device = unsafe { instance.create_device(physical_device, &device_info, None)? };
        let queue = unsafe { device.get_device_queue(queue_family_index, 0) };

        let command_pool_info = vk::CommandPoolCreateInfo {
            flags: vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            queue_family_index,
            ..Default::default()
        };
        let command_pool = unsafe { device.create_command_pool(&command_pool_info, None)? };

        let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);
        let swapchain_loader = ash::khr::swapchain::Device::new(&instance, &device);
        let memory_properties =
            unsafe { instance.get_physical_device_memory_properties(physical_device) };

        Ok(Self {
            entry,
            instance,
            physical_device,
            device,
            surface_loader,
            swapchain_loader,
            queue_family_index,
            queue,
            command_pool,
            memory_properties,
        })
    }

    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    pub fn queue(&self) -> vk::Queue {
        self.queue
    }

    pub fn command_pool(&self) -> vk::CommandPool {
        self.command_pool
    }

    pub fn memory_properties(&self) -> vk::PhysicalDeviceMemoryProperties {
        self.memory_properties
    }

    pub fn allocate_command_buffers(&self, count: u32) -> Result<Vec<vk::CommandBuffer>, RenderError> {
        let alloc_info = vk::CommandBufferAllocateInfo {
            command_pool: self.command_pool,
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: count,
            ..Default::default()
        };
        Ok(unsafe { self.device.allocate_command_buffers(&alloc_info)? })
    }

    /// Record with `f`, submit, and wait for the queue.  For rare work such as resizes.
    pub fn one_time_submit<F>(&self, f: F) -> Result<(), RenderError>
    where
        F: FnOnce(vk::CommandBuffer),
    {
        let command_buffer = self.allocate_command_buffers(1)?[0];
        let result = unsafe {
            let begin = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            self.device
                .begin_command_buffer(command_buffer, &begin)
                .and_then(|_| {
                    f(command_buffer);
                    self.device.end_command_buffer(command_buffer)
                })
                .and_then(|_| {
                    let buffers = [command_buffer];
                    let submit = vk::SubmitInfo::default().command_buffers(&buffers);
                    self.device
                        .queue_submit(self.queue, &[submit], vk::Fence::null())
                })
                .and_then(|_| self.device.queue_wait_idle(self.queue))
        };
        unsafe {
            self.device
                .free_command_buffers(self.command_pool, &[command_buffer]);
        }
        Ok(result?)
    }

    pub fn wait_idle(&self) -> Result<(), RenderError> {
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }

    // XXX in reality, this consumes the context, but every window must be destroyed first.
    pub fn destroy(&self) {
        unsafe {
            self.device.destroy_command_pool(self.command_pool, None);
            self.device.destroy_device(None);
            self.instance.destroy_instance(None)
        };
    }
}

/// Khronos validation on debug builds, when installed.
fn validation_layers(entry: &ash::Entry) -> Vec<*const std::ffi::c_char> {
    if !cfg!(debug_assertions) {
        return Vec::new();
    }
    let available = unsafe { entry.enumerate_instance_layer_properties() }.unwrap_or_default();
    let found = available
        .iter()
        .any(|layer| layer.layer_name_as_c_str() == Ok(VALIDATION_LAYER));
    if found {
        log::debug!("enabling {VALIDATION_LAYER:?}");
        vec![VALIDATION_LAYER.as_ptr()]
    } else {
        Vec::new()
    }
}

/// First device with a graphics and compute queue family, discrete GPUs first.
fn pick_device(instance: &ash::Instance) -> Result<(vk::PhysicalDevice, u32), RenderError> {
    let mut candidates: Vec<(vk::PhysicalDevice, u32, bool)> = unsafe {
        instance
            .enumerate_physical_devices()?
            .into_iter()
            .filter_map(|device| {
                let family = instance
                    .get_physical_device_queue_family_properties(device)
                    .iter()
                    .position(|q| {
                        q.queue_flags
                            .contains(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE)
                    })?;
                let discrete = instance.get_physical_device_properties(device).device_type
                    == vk::PhysicalDeviceType::DISCRETE_GPU;
                Some((device, family as u32, discrete))
            })
            .collect()
    };
    candidates.sort_by_key(|(_, _, discrete)| !discrete);
    candidates
        .first()
        .map(|(device, family, _)| (*device, *family))
        .ok_or(RenderError::NoDevice)
}
