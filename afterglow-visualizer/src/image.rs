// Copyright 2026 The Afterglow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Image
//!
//! The `Image` gathers up the Vulkan image, its memory and its one view.  The phosphor keeps all
//! of its images in `GENERAL` for their whole life, so only swapchain images go through the
//! layout transitions at the bottom of this module.
//!
//! This treatment does not use any kind of RAII.  You have validation layers and other Vulkan
//! debugging tools to spot lifecycle issues.

use ash::vk;

use crate::RenderError;
use crate::buffer::find_memory_type_index;
use crate::vk_context::VkContext;

/// Device local image with one view covering every layer.
pub struct Image {
    pub image: vk::Image,
    pub memory: vk::DeviceMemory,
    pub view: vk::ImageView,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub layers: u32,
}

impl Image {
    pub fn new(
        context: &VkContext,
        extent: vk::Extent2D,
        layers: u32,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
    ) -> Result<Self, RenderError> {
        let device = context.device();

        let image_ci = vk::ImageCreateInfo {
            image_type: vk::ImageType::TYPE_2D,
            format,
            extent: vk::Extent3D {
                width: extent.width.max(1),
                height: extent.height.max(1),
                depth: 1,
            },
            mip_levels: 1,
            array_layers: layers,
            samples: vk::SampleCountFlags::TYPE_1,
            tiling: vk::ImageTiling::OPTIMAL,
            usage,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            ..Default::default()
        };

        let image = unsafe { device.create_image(&image_ci, None)? };
        let mem_req = unsafe { device.get_image_memory_requirements(image) };
        let memory_type_index = find_memory_type_index(
            &mem_req,
            &context.memory_properties(),
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )
        .ok_or(RenderError::Vulkan(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY))?;

        let alloc_info = vk::MemoryAllocateInfo {
            allocation_size: mem_req.size,
            memory_type_index,
            ..Default::default()
        };
        let memory = unsafe { device.allocate_memory(&alloc_info, None)? };
        unsafe { device.bind_image_memory(image, memory, 0)? };

        let view_type = if layers > 1 {
            vk::ImageViewType::TYPE_2D_ARRAY
        } else {
            vk::ImageViewType::TYPE_2D
        };
        let view_ci = vk::ImageViewCreateInfo {
            image,
            view_type,
            format,
            subresource_range: range(layers),
            ..Default::default()
        };
        let view = unsafe { device.create_image_view(&view_ci, None)? };

        Ok(Self {
            image,
            memory,
            view,
            format,
            extent,
            layers,
        })
    }

    pub fn destroy(&self, context: &VkContext) {
        let device = context.device();
        unsafe {
            device.destroy_image_view(self.view, None);
            device.destroy_image(self.image, None);
            device.free_memory(self.memory, None);
        }
    }

    pub fn descriptor_info(&self) -> vk::DescriptorImageInfo {
        vk::DescriptorImageInfo {
            sampler: vk::Sampler::null(),
            image_view: self.view,
            image_layout: vk::ImageLayout::GENERAL,
        }
    }

    pub fn subresource_layers(&self) -> vk::ImageSubresourceLayers {
        vk::ImageSubresourceLayers {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level: 0,
            base_array_layer: 0,
            layer_count: self.layers,
        }
    }

    /// Move a fresh image to `GENERAL` and zero it.
    pub fn clear(&self, cmd_buffer: vk::CommandBuffer, context: &VkContext) {
        transition_layout(
            self.image,
            cmd_buffer,
            range(self.layers),
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::GENERAL,
            context,
        );
        let zero = vk::ClearColorValue { uint32: [0; 4] };
        unsafe {
            context.device().cmd_clear_color_image(
                cmd_buffer,
                self.image,
                vk::ImageLayout::GENERAL,
                &zero,
                &[range(self.layers)],
            );
        }
    }
}

/// Color range over the first `layers` layers.
pub fn range(layers: u32) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: layers,
    }
}

/// Stages and access masks either side of a layout change.
fn transition_masks(
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) -> Option<(
    vk::PipelineStageFlags,
    vk::PipelineStageFlags,
    vk::AccessFlags,
    vk::AccessFlags,
)> {
    let masks = match (old_layout, new_layout) {
        // Fresh phosphor images, cleared and then read by compute.
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::GENERAL) => (
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::PipelineStageFlags::TRANSFER | vk::PipelineStageFlags::COMPUTE_SHADER,
            vk::AccessFlags::empty(),
            vk::AccessFlags::TRANSFER_WRITE,
        ),
        // Swapchain images.  The source stage matches the acquire semaphore's wait stage.
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => (
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::TRANSFER,
            vk::AccessFlags::empty(),
            vk::AccessFlags::TRANSFER_WRITE,
        ),
        (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::PRESENT_SRC_KHR) => (
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::BOTTOM_OF_PIPE,
            vk::AccessFlags::TRANSFER_WRITE,
            vk::AccessFlags::empty(),
        ),
        _ => return None,
    };
    Some(masks)
}

/// Transition image layout with an appropriate barrier.  Infers src/dst masks and pipeline
/// stages for the transitions this program performs.
pub fn transition_layout(
    image: vk::Image,
    cmd_buffer: vk::CommandBuffer,
    subresource_range: vk::ImageSubresourceRange,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
    context: &VkContext,
) {
    let Some((src_stage, dst_stage, src_access, dst_access)) =
        transition_masks(old_layout, new_layout)
    else {
        panic!("Unsupported layout transition: {old_layout:?} → {new_layout:?}");
    };

    let barrier = vk::ImageMemoryBarrier {
        old_layout,
        new_layout,
        src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
        dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
        image,
        subresource_range,
        src_access_mask: src_access,
        dst_access_mask: dst_access,
        ..Default::default()
    };

    unsafe {
        context.device().cmd_pipeline_barrier(
            cmd_buffer,
            src_stage,
            dst_stage,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier],
        );
    }
}

/// Make every earlier write in `src_stage` visible to `dst_stage`.
pub fn memory_barrier(
    cmd_buffer: vk::CommandBuffer,
    src_stage: vk::PipelineStageFlags,
    src_access: vk::AccessFlags,
    dst_stage: vk::PipelineStageFlags,
    dst_access: vk::AccessFlags,
    context: &VkContext,
) {
    let barrier = vk::MemoryBarrier {
        src_access_mask: src_access,
        dst_access_mask: dst_access,
        ..Default::default()
    };
    unsafe {
        context.device().cmd_pipeline_barrier(
            cmd_buffer,
            src_stage,
            dst_stage,
            vk::DependencyFlags::empty(),
            &[barrier],
            &[],
            &[],
        );
    }
}
