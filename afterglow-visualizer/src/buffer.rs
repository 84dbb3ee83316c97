// Copyright 2026 The Afterglow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Buffer
//!
//! `MappedAllocation` is a persistently mapped, host visible Vulkan buffer.  We rewrite it from
//! the host every frame: the canvas upload and the phosphor beam arrays both live in one.
//!
//! This treatment does not use any kind of RAII.  You have validation layers and other Vulkan
//! debugging tools to spot lifecycle issues.

use std::ptr::NonNull;

use ash::vk;

use crate::RenderError;
use crate::vk_context::VkContext;

pub struct MappedAllocation<T> {
    pub buffer: vk::Buffer,
    pub memory: vk::DeviceMemory,
    ptr: NonNull<T>,
    len: usize,
}

impl<T: Copy> MappedAllocation<T> {
    /// Room for `len` values of `T`.  `usage` picks storage or transfer roles.
    pub fn new(
        context: &VkContext,
        len: usize,
        usage: vk::BufferUsageFlags,
    ) -> Result<Self, RenderError> {
        let device = context.device();
        let buffer_info = vk::BufferCreateInfo {
            size: (std::mem::size_of::<T>() * len.max(1)) as u64,
            usage,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            ..Default::default()
        };
        let buffer = unsafe { device.create_buffer(&buffer_info, None)? };
        let mem_req = unsafe { device.get_buffer_memory_requirements(buffer) };
        let mem_props = context.memory_properties();

        // Coherent memory saves the flush, but any host visible type will do.
        let memory_type_index = find_memory_type_index(
            &mem_req,
            &mem_props,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )
        .or_else(|| {
            find_memory_type_index(&mem_req, &mem_props, vk::MemoryPropertyFlags::HOST_VISIBLE)
        })
        .ok_or(RenderError::Vulkan(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY))?;

        let alloc_info = vk::MemoryAllocateInfo {
            allocation_size: mem_req.size,
            memory_type_index,
            ..Default::default()
        };
        let memory = unsafe { device.allocate_memory(&alloc_info, None)? };
        unsafe { device.bind_buffer_memory(buffer, memory, 0)? };

        let raw_ptr =
            unsafe { device.map_memory(memory, 0, vk::WHOLE_SIZE, vk::MemoryMapFlags::empty())? };
        let ptr = NonNull::new(raw_ptr as *mut T)
            .ok_or(RenderError::Vulkan(vk::Result::ERROR_MEMORY_MAP_FAILED))?;

        Ok(Self {
            buffer,
            memory,
            ptr,
            len,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn destroy(&self, context: &VkContext) {
        let device = context.device();
        unsafe {
            device.unmap_memory(self.memory);
            device.free_memory(self.memory, None);
            device.destroy_buffer(self.buffer, None);
        }
    }

    /// Don't forget to flush 🚽
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    /// Copy `values` to the front of the buffer.  Extra values are dropped.
    pub fn write(&mut self, values: &[T]) -> usize {
        let n = values.len().min(self.len);
        self.as_mut_slice()[..n].copy_from_slice(&values[..n]);
        n
    }

    /// Move writes to device memory.
    pub fn flush(&self, context: &VkContext) -> Result<(), RenderError> {
        let flush_range = vk::MappedMemoryRange {
            memory: self.memory,
            offset: 0,
            size: vk::WHOLE_SIZE,
            ..Default::default()
        };
        unsafe { context.device().flush_mapped_memory_ranges(&[flush_range])? };
        Ok(())
    }

    pub fn descriptor_info(&self) -> vk::DescriptorBufferInfo {
        vk::DescriptorBufferInfo {
            buffer: self.buffer,
            offset: 0,
            range: vk::WHOLE_SIZE,
        }
    }
}

/// First memory type that the requirements allow and that has every `required` property.
pub fn find_memory_type_index(
    mem_req: &vk::MemoryRequirements,
    mem_props: &vk::PhysicalDeviceMemoryProperties,
    required: vk::MemoryPropertyFlags,
) -> Option<u32> {
    (0..mem_props.memory_type_count).find(|i| {
        let type_supported = (mem_req.memory_type_bits & (1 << i)) != 0;
        let props = mem_props.memory_types[*i as usize].property_flags;
        type_supported && props.contains(required)
    })
}

/// Copy region for a tightly packed `row_length` wide buffer into the top left of an image.
pub fn buffer_image_copy(row_length: u32, extent: vk::Extent2D) -> vk::BufferImageCopy {
    vk::BufferImageCopy {
        buffer_offset: 0,
        buffer_row_length: row_length,
        buffer_image_height: 0,
        image_subresource: vk::ImageSubresourceLayers {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level: 0,
            base_array_layer: 0,
            layer_count: 1,
        },
        image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
        image_extent: vk::Extent3D {
            width: extent.width,
            height: extent.height,
            depth: 1,
        },
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn props(flags: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: flags.len() as u32,
            ..Default::default()
        };
        for (i, f) in flags.iter().enumerate() {
            props.memory_types[i].property_flags = *f;
        }
        props
    }

    #[test]
    fn test_memory_type_search() {
        let props = props(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        ]);
        let all = vk::MemoryRequirements {
            memory_type_bits: 0b111,
            ..Default::default()
        };
        let visible = vk::MemoryPropertyFlags::HOST_VISIBLE;
        assert_eq!(find_memory_type_index(&all, &props, visible), Some(1));
        let coherent = visible | vk::MemoryPropertyFlags::HOST_COHERENT;
        assert_eq!(find_memory_type_index(&all, &props, coherent), Some(2));

        // Types the resource cannot live in are skipped.
        let only_first = vk::MemoryRequirements {
            memory_type_bits: 0b001,
            ..Default::default()
        };
        assert_eq!(find_memory_type_index(&only_first, &props, visible), None);
    }
}
