// Copyright 2026 The Afterglow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A swapchain exists when we are presenting to a Surface.  Each group window owns one.
//!
//! Frames are assembled by transfer only: the group's software canvas is uploaded through a
//! staging buffer, then the GPU phosphor panes are blitted over it.  One frame is in flight per
//! window.  Beginning a frame waits for the previous submission, which is also what makes it safe
//! for the phosphor to rewrite its host visible beam buffers.

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use rgb::RGBA8;
use winit::window::{Fullscreen, Window};

use crate::RenderError;
use crate::buffer::{self, MappedAllocation};
use crate::image::{self, transition_layout};
use crate::vk_context::VkContext;

/// A phosphor output image to copy into the frame at a pane's position.  The image is stored
/// bottom row first.
pub struct PaneBlit {
    pub image: vk::Image,
    pub x: u32,
    pub width: u32,
    pub height: u32,
}

pub struct WindowPresent {
    surface: vk::SurfaceKHR,
    pub surface_format: vk::SurfaceFormatKHR,
    /// Swapchain wants blue first, the canvas is red first.
    bgra: bool,

    swapchain: vk::SwapchainKHR,
    pub extent: vk::Extent2D,
    images: Vec<vk::Image>,
    /// One per swapchain image, so a semaphore is never re-signaled while presentation holds it.
    render_finished: Vec<vk::Semaphore>,
    image_available: vk::Semaphore,
    in_flight: vk::Fence,
    command_buffer: vk::CommandBuffer,
    staging: MappedAllocation<RGBA8>,

    /// Swapchain image of the frame being recorded.
    image_index: Option<u32>,
    stale: bool,
}

impl WindowPresent {
    pub fn new(vk_context: &VkContext, window: &Window) -> Result<Self, RenderError> {
        let surface = unsafe {
            ash_window::create_surface(
                &vk_context.entry,
                &vk_context.instance,
                window.display_handle()?.as_raw(),
                window.window_handle()?.as_raw(),
                None,
            )?
        };

        let supported = unsafe {
            vk_context.surface_loader.get_physical_device_surface_support(
                vk_context.physical_device,
                vk_context.queue_family_index,
                surface,
            )?
        };
        if !supported {
            unsafe { vk_context.surface_loader.destroy_surface(surface, None) };
            return Err(RenderError::Unsupported("queue family cannot present"));
        }

        let formats = unsafe {
            vk_context
                .surface_loader
                .get_physical_device_surface_formats(vk_context.physical_device, surface)?
        };
        let Some(surface_format) = pick_format(&formats) else {
            unsafe { vk_context.surface_loader.destroy_surface(surface, None) };
            return Err(RenderError::Unsupported("no 8 bit RGBA surface format"));
        };
        log::debug!("surface format {:?}", surface_format.format);

        let device = vk_context.device();
        let semaphore_info = vk::SemaphoreCreateInfo::default();
        let fence_info = vk::FenceCreateInfo {
            flags: vk::FenceCreateFlags::SIGNALED,
            ..Default::default()
        };
        let image_available = unsafe { device.create_semaphore(&semaphore_info, None)? };
        let in_flight = unsafe { device.create_fence(&fence_info, None)? };
        let command_buffer = vk_context.allocate_command_buffers(1)?[0];
        let size = window.inner_size();
        let staging = staging_for(vk_context, size.width, size.height)?;

        let mut present = Self {
            surface,
            surface_format,
            bgra: surface_format.format == vk::Format::B8G8R8A8_UNORM,
            swapchain: vk::SwapchainKHR::null(),
            extent: vk::Extent2D::default(),
            images: Vec::new(),
            render_finished: Vec::new(),
            image_available,
            in_flight,
            command_buffer,
            staging,
            image_index: None,
            stale: false,
        };
        present.recreate_swapchain(vk_context, window)?;
        Ok(present)
    }

    /// Build or rebuild the swapchain at the surface's current size.
    pub fn recreate_swapchain(
        &mut self,
        vk_context: &VkContext,
        window: &Window,
    ) -> Result<(), RenderError> {
        let device = vk_context.device();
        vk_context.wait_idle()?;

        let surface_caps = unsafe {
            vk_context
                .surface_loader
                .get_physical_device_surface_capabilities(vk_context.physical_device, self.surface)?
        };
        if !surface_caps
            .supported_usage_flags
            .contains(vk::ImageUsageFlags::TRANSFER_DST)
        {
            return Err(RenderError::Unsupported("swapchain images cannot be copied into"));
        }
        let extent = if surface_caps.current_extent.width != u32::MAX {
            surface_caps.current_extent
        } else {
            let size = window.inner_size();
            vk::Extent2D {
                width: size.width.clamp(
                    surface_caps.min_image_extent.width,
                    surface_caps.max_image_extent.width,
                ),
                height: size.height.clamp(
                    surface_caps.min_image_extent.height,
                    surface_caps.max_image_extent.height,
                ),
            }
        };
        let mut min_image_count = surface_caps.min_image_count.max(2);
        if surface_caps.max_image_count > 0 {
            min_image_count = min_image_count.min(surface_caps.max_image_count);
        }

        let old = self.swapchain;
        let swapchain_info = vk::SwapchainCreateInfoKHR {
            surface: self.surface,
            min_image_count,
            image_format: self.surface_format.format,
            image_color_space: self.surface_format.color_space,
            image_extent: extent,
            image_array_layers: 1,
            image_usage: vk::ImageUsageFlags::TRANSFER_DST,
            image_sharing_mode: vk::SharingMode::EXCLUSIVE,
            pre_transform: surface_caps.current_transform,
            composite_alpha: pick_alpha(&surface_caps),
            // FIFO paces us to the display on top of `window.fps_limit`.
            present_mode: vk::PresentModeKHR::FIFO,
            clipped: vk::TRUE,
            old_swapchain: old,
            ..Default::default()
        };
        let swapchain = unsafe {
            vk_context
                .swapchain_loader
                .create_swapchain(&swapchain_info, None)?
        };
        unsafe {
            if old != vk::SwapchainKHR::null() {
                vk_context.swapchain_loader.destroy_swapchain(old, None);
            }
            for s in self.render_finished.drain(..) {
                device.destroy_semaphore(s, None);
            }
        }
        self.swapchain = swapchain;
        self.images = unsafe { vk_context.swapchain_loader.get_swapchain_images(swapchain)? };
        self.render_finished = self
            .images
            .iter()
            .map(|_| unsafe { device.create_semaphore(&vk::SemaphoreCreateInfo::default(), None) })
            .collect::<Result<_, _>>()?;
        self.extent = extent;
        self.stale = false;
        log::debug!(
            "swapchain {}x{} with {} images",
            extent.width,
            extent.height,
            self.images.len()
        );
        Ok(())
    }

    /// The window changed size or the swapchain went out of date.
    pub fn mark_stale(&mut self) {
        self.stale = true;
    }

    /// Wait for the previous frame, acquire an image and open the command buffer.  `None` skips
    /// this frame, e.g. while minimized or right after the swapchain was rebuilt.
    pub fn begin(
        &mut self,
        vk_context: &VkContext,
        window: &Window,
    ) -> Result<Option<vk::CommandBuffer>, RenderError> {
        let device = vk_context.device();
        let size = window.inner_size();
        if size.width == 0 || size.height == 0 {
            return Ok(None);
        }
        if self.stale {
            self.recreate_swapchain(vk_context, window)?;
        }
        unsafe { device.wait_for_fences(&[self.in_flight], true, u64::MAX)? };

        let acquired = unsafe {
            vk_context.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                self.image_available,
                vk::Fence::null(),
            )
        };
        let image_index = match acquired {
            Ok((index, suboptimal)) => {
                if suboptimal {
                    self.stale = true;
                }
                index
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                self.recreate_swapchain(vk_context, window)?;
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        unsafe {
            device.reset_fences(&[self.in_flight])?;
            device.reset_command_buffer(self.command_buffer, vk::CommandBufferResetFlags::empty())?;
            let begin = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            device.begin_command_buffer(self.command_buffer, &begin)?;
        }
        self.image_index = Some(image_index);
        Ok(Some(self.command_buffer))
    }

    /// Upload the canvas, blit phosphor panes over it, submit and present.
    pub fn finish(
        &mut self,
        vk_context: &VkContext,
        window: &Window,
        canvas: &[RGBA8],
        canvas_extent: vk::Extent2D,
        blits: &[PaneBlit],
    ) -> Result<(), RenderError> {
        let Some(image_index) = self.image_index.take() else {
            return Ok(());
        };
        let device = vk_context.device();
        let cb = self.command_buffer;
        let image = self.images[image_index as usize];

        let pixels = (canvas_extent.width * canvas_extent.height) as usize;
        if self.staging.len() < pixels {
            self.staging.destroy(vk_context);
            self.staging = staging_for(vk_context, canvas_extent.width, canvas_extent.height)?;
        }
        let written = self.staging.write(&canvas[..pixels.min(canvas.len())]);
        if self.bgra {
            for p in &mut self.staging.as_mut_slice()[..written] {
                std::mem::swap(&mut p.r, &mut p.b);
            }
        }
        self.staging.flush(vk_context)?;

        transition_layout(
            image,
            cb,
            image::range(1),
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk_context,
        );
        let copy_extent = vk::Extent2D {
            width: canvas_extent.width.min(self.extent.width),
            height: canvas_extent.height.min(self.extent.height),
        };
        unsafe {
            device.cmd_copy_buffer_to_image(
                cb,
                self.staging.buffer,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[buffer::buffer_image_copy(canvas_extent.width, copy_extent)],
            );
        }

        if !blits.is_empty() {
            // The blits overwrite part of what the copy wrote and read what compute wrote.
            image::memory_barrier(
                cb,
                vk::PipelineStageFlags::TRANSFER | vk::PipelineStageFlags::COMPUTE_SHADER,
                vk::AccessFlags::TRANSFER_WRITE | vk::AccessFlags::SHADER_WRITE,
                vk::PipelineStageFlags::TRANSFER,
                vk::AccessFlags::TRANSFER_READ | vk::AccessFlags::TRANSFER_WRITE,
                vk_context,
            );
        }
        for blit in blits {
            let Some(region) = blit_region(blit, self.extent) else {
                continue;
            };
            unsafe {
                device.cmd_blit_image(
                    cb,
                    blit.image,
                    vk::ImageLayout::GENERAL,
                    image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[region],
                    vk::Filter::NEAREST,
                );
            }
        }

        transition_layout(
            image,
            cb,
            image::range(1),
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
            vk_context,
        );
        unsafe { device.end_command_buffer(cb)? };

        let wait = [self.image_available];
        let wait_stages = [vk::PipelineStageFlags::TRANSFER];
        let signal = [self.render_finished[image_index as usize]];
        let buffers = [cb];
        let submit = vk::SubmitInfo::default()
            .wait_semaphores(&wait)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&buffers)
            .signal_semaphores(&signal);
        unsafe { device.queue_submit(vk_context.queue(), &[submit], self.in_flight)? };

        let swapchains = [self.swapchain];
        let indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&signal)
            .swapchains(&swapchains)
            .image_indices(&indices);

        // Winit says this helps align the window system latching with REDRAW_REQUESTED events.
        // However, it is supported only on Wayland at this time.
        window.pre_present_notify();

        let presented = unsafe {
            vk_context
                .swapchain_loader
                .queue_present(vk_context.queue(), &present_info)
        };
        match presented {
            Ok(false) => {}
            Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => self.stale = true,
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    pub fn destroy(&self, vk_context: &VkContext) {
        let device = vk_context.device();
        unsafe {
            // A failed wait leaves nothing better to do than destroy anyway.
            let _ = device.wait_for_fences(&[self.in_flight], true, u64::MAX);
            vk_context
                .swapchain_loader
                .destroy_swapchain(self.swapchain, None);
            for s in &self.render_finished {
                device.destroy_semaphore(*s, None);
            }
            device.destroy_semaphore(self.image_available, None);
            device.destroy_fence(self.in_flight, None);
            device.free_command_buffers(vk_context.command_pool(), &[self.command_buffer]);
            vk_context.surface_loader.destroy_surface(self.surface, None);
        }
        self.staging.destroy(vk_context);
    }
}

pub fn toggle_fullscreen(window: &Window) {
    match window.fullscreen() {
        Some(_) => {
            window.set_fullscreen(None);
            window.set_cursor_visible(true);
        }
        None => {
            window.set_fullscreen(Some(Fullscreen::Borderless(None)));
            window.set_cursor_visible(false);
        }
    }
}

fn staging_for(
    vk_context: &VkContext,
    width: u32,
    height: u32,
) -> Result<MappedAllocation<RGBA8>, RenderError> {
    MappedAllocation::new(
        vk_context,
        (width.max(1) * height.max(1)) as usize,
        vk::BufferUsageFlags::TRANSFER_SRC,
    )
}

/// Plain 8 bit formats only.  The canvas holds display values, so sRGB encoding would
/// double-apply the curve.
fn pick_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    [vk::Format::B8G8R8A8_UNORM, vk::Format::R8G8B8A8_UNORM]
        .into_iter()
        .find_map(|wanted| formats.iter().find(|f| f.format == wanted).copied())
}

fn pick_alpha(surface_caps: &vk::SurfaceCapabilitiesKHR) -> vk::CompositeAlphaFlagsKHR {
    [
        vk::CompositeAlphaFlagsKHR::OPAQUE,
        vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
        vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED,
    ]
    .into_iter()
    .find(|a| surface_caps.supported_composite_alpha.contains(*a))
    .unwrap_or(vk::CompositeAlphaFlagsKHR::INHERIT)
}

/// Blit flipping the bottom-up pane image into the top-down swapchain, clipped to it.
fn blit_region(blit: &PaneBlit, extent: vk::Extent2D) -> Option<vk::ImageBlit> {
    if blit.x >= extent.width || blit.height == 0 {
        return None;
    }
    let width = blit.width.min(extent.width - blit.x);
    let height = blit.height.min(extent.height);
    if width == 0 || height == 0 {
        return None;
    }
    let layers = vk::ImageSubresourceLayers {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        mip_level: 0,
        base_array_layer: 0,
        layer_count: 1,
    };
    // Panes sit on the window's bottom edge, so a short swapchain crops their top rows.
    Some(vk::ImageBlit {
        src_subresource: layers,
        src_offsets: [
            vk::Offset3D { x: 0, y: 0, z: 0 },
            vk::Offset3D {
                x: width as i32,
                y: height as i32,
                z: 1,
            },
        ],
        dst_subresource: layers,
        dst_offsets: [
            vk::Offset3D {
                x: blit.x as i32,
                y: height as i32,
                z: 0,
            },
            vk::Offset3D {
                x: (blit.x + width) as i32,
                y: 0,
                z: 1,
            },
        ],
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_pick_format() {
        let formats = [
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ];
        assert_eq!(
            pick_format(&formats).map(|f| f.format),
            Some(vk::Format::R8G8B8A8_UNORM)
        );
        assert!(pick_format(&formats[..1]).is_none());
    }

    #[test]
    fn test_blit_flips_rows() {
        let blit = PaneBlit {
            image: vk::Image::null(),
            x: 100,
            width: 200,
            height: 150,
        };
        let extent = vk::Extent2D {
            width: 250,
            height: 150,
        };
        let region = blit_region(&blit, extent).unwrap();
        // Clipped on the right, and the bottom source row lands on the last swapchain row.
        assert_eq!(region.src_offsets[1].x, 150);
        assert_eq!(region.dst_offsets[0].x, 100);
        assert_eq!(region.dst_offsets[1].x, 250);
        assert_eq!(region.dst_offsets[0].y, 150);
        assert_eq!(region.dst_offsets[1].y, 0);

        let outside = PaneBlit { x: 300, ..blit };
        assert!(blit_region(&outside, extent).is_none());
    }
}
