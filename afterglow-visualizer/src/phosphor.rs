// Copyright 2026 The Afterglow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # GPU Phosphor
//!
//! The four phosphor passes as compute dispatches, one set of images per pane.  Parameters,
//! beam layout and blur taps all come from `afterglow_lib::phosphor` so the shaders compute what
//! `PhosphorCpu` computes.  Panes fall back to that CPU implementation when the compiled shaders
//! are missing.
//!
//! Every image stays in `GENERAL`.  Passes are separated by compute-to-compute memory barriers
//! and all four are recorded into the window's frame command buffer ahead of the blits that
//! consume the output.

use afterglow_assets::AssetDirs;
use afterglow_lib::phosphor::{
    Beam, BlurKernel, MAX_BLUR_RADIUS, PhosphorCpu, PhosphorParams, blur_kernels,
};
use ash::vk;
use bytemuck::{Pod, Zeroable};

use crate::RenderError;
use crate::buffer::MappedAllocation;
use crate::image::{self, Image};
use crate::vk_context::VkContext;

/// Image kernels run 8×8 tiles.
pub const TILE: u32 = 8;
/// Compose runs one invocation per beam segment.
pub const SEGMENT_GROUP: u32 = 64;

/// One kernel's horizontal blur of `E_*` into its own layers of `T1`.
pub const BLUR_HORIZONTAL: u32 = 0;
/// Vertical blur of every kernel, summed with `E_*` into `T2`.
pub const BLUR_SUM: u32 = 1;

const TAPS_PER_KERNEL: usize = MAX_BLUR_RADIUS + 1;
const SHADERS: [&str; 4] = [
    "phosphor/decay",
    "phosphor/compose",
    "phosphor/blur",
    "phosphor/colormap",
];

/// Mirrors `Params` in `shaders/phosphor/params.slangh`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct PushConstants {
    pub beam_color: [f32; 4],
    pub background: [f32; 4],
    pub width: u32,
    pub height: u32,
    pub frame: u32,
    pub segments: u32,
    pub fast_factor: f32,
    pub slow_factor: f32,
    pub age_threshold: u32,
    pub rainbow: u32,
    pub curvature: f32,
    pub gap: f32,
    pub vignette: f32,
    pub chromatic_aberration: f32,
    pub grain: f32,
    pub pass: u32,
    pub kernel: u32,
    /// Kernel radii, one byte each from the low end.
    pub radii: u32,
    pub weights: [f32; 3],
    pub pad: u32,
}

impl PushConstants {
    pub fn new(params: &PhosphorParams, extent: vk::Extent2D, segments: usize) -> Self {
        let [r, g, b] = params.beam_color;
        let [br, bg, bb] = params.background;
        Self {
            beam_color: [r, g, b, 1.0],
            background: [br, bg, bb, 1.0],
            width: extent.width,
            height: extent.height,
            frame: params.frame,
            segments: segments as u32,
            fast_factor: params.decay_factor(0),
            slow_factor: params.decay_factor(params.age_threshold),
            age_threshold: params.age_threshold,
            rainbow: params.rainbow as u32,
            curvature: params.curvature,
            gap: params.gap,
            vignette: params.vignette,
            chromatic_aberration: params.chromatic_aberration,
            grain: params.grain,
            ..Default::default()
        }
    }

    /// The same constants carrying this frame's blur kernels.
    pub fn blur(&self, kernels: &[BlurKernel; 3]) -> Self {
        let radii = kernels
            .iter()
            .enumerate()
            .fold(0, |radii, (k, kernel)| radii | (kernel.radius() as u32) << (8 * k));
        Self {
            radii,
            weights: kernels.each_ref().map(|k| k.weight),
            ..*self
        }
    }

    /// Select the blur pass and, for horizontal passes, the kernel.
    pub fn pass(&self, pass: u32, kernel: usize) -> Self {
        Self {
            pass,
            kernel: kernel as u32,
            ..*self
        }
    }
}

/// Blur dispatches in order: a horizontal pass per kernel with any weight, then the one summing
/// pass.  Only the summing pass writes `T2`.
pub fn blur_plan(base: &PushConstants, kernels: &[BlurKernel; 3]) -> Vec<PushConstants> {
    let blurred = base.blur(kernels);
    let mut plan: Vec<PushConstants> = kernels
        .iter()
        .enumerate()
        .filter(|(_, kernel)| kernel.weight != 0.0)
        .map(|(k, _)| blurred.pass(BLUR_HORIZONTAL, k))
        .collect();
    plan.push(blurred.pass(BLUR_SUM, 0));
    plan
}

/// The three kernels' taps, each padded to `MAX_BLUR_RADIUS + 1`.
pub fn packed_taps(kernels: &[BlurKernel; 3]) -> Vec<f32> {
    let mut taps = vec![0.0; 3 * TAPS_PER_KERNEL];
    for (k, kernel) in kernels.iter().enumerate() {
        let n = kernel.taps.len().min(TAPS_PER_KERNEL);
        taps[k * TAPS_PER_KERNEL..k * TAPS_PER_KERNEL + n].copy_from_slice(&kernel.taps[..n]);
    }
    taps
}

/// Workgroups to cover `n` items.
pub fn groups(n: u32, size: u32) -> u32 {
    n.div_ceil(size).max(1)
}

/// Source offset, destination offset and extent that carry an image over to a new size with
/// both centers aligned.  `None` when nothing overlaps.
pub fn centered_region(
    from: vk::Extent2D,
    to: vk::Extent2D,
) -> Option<(vk::Offset2D, vk::Offset2D, vk::Extent2D)> {
    let axis = |from: u32, to: u32| {
        let d = (to as i64 - from as i64) / 2;
        ((-d).max(0) as i32, d.max(0) as i32, from.min(to))
    };
    let (sx, dx, w) = axis(from.width, to.width);
    let (sy, dy, h) = axis(from.height, to.height);
    if w == 0 || h == 0 {
        return None;
    }
    Some((
        vk::Offset2D { x: sx, y: sy },
        vk::Offset2D { x: dx, y: dy },
        vk::Extent2D {
            width: w,
            height: h,
        },
    ))
}

/// Descriptor layout, pipeline layout and the four pipelines.  Shared by every pane.
pub struct PhosphorPipelines {
    set_layout: vk::DescriptorSetLayout,
    layout: vk::PipelineLayout,
    /// Decay, compose, blur, colormap.
    pipelines: [vk::Pipeline; 4],
}

impl PhosphorPipelines {
    pub fn load(vk_context: &VkContext, assets: &AssetDirs) -> Result<Self, RenderError> {
        let device = vk_context.device();
        let code = SHADERS
            .iter()
            .map(|name| assets.find_shader(name))
            .collect::<Result<Vec<_>, _>>()?;

        let storage = |binding: u32, ty: vk::DescriptorType| {
            vk::DescriptorSetLayoutBinding::default()
                .binding(binding)
                .descriptor_type(ty)
                .descriptor_count(1)
                .stage_flags(vk::ShaderStageFlags::COMPUTE)
        };
        let bindings = [
            storage(0, vk::DescriptorType::STORAGE_IMAGE), // energy
            storage(1, vk::DescriptorType::STORAGE_IMAGE), // age
            storage(2, vk::DescriptorType::STORAGE_IMAGE), // t1
            storage(3, vk::DescriptorType::STORAGE_IMAGE), // t2
            storage(4, vk::DescriptorType::STORAGE_IMAGE), // output
            storage(5, vk::DescriptorType::STORAGE_BUFFER), // positions
            storage(6, vk::DescriptorType::STORAGE_BUFFER), // colors
            storage(7, vk::DescriptorType::STORAGE_BUFFER), // taps
        ];
        let set_layout_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
        let set_layout = unsafe { device.create_descriptor_set_layout(&set_layout_info, None)? };

        let push_range = [vk::PushConstantRange {
            stage_flags: vk::ShaderStageFlags::COMPUTE,
            offset: 0,
            size: size_of::<PushConstants>() as u32,
        }];
        let set_layouts = [set_layout];
        let layout_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(&set_layouts)
            .push_constant_ranges(&push_range);
        let layout = unsafe { device.create_pipeline_layout(&layout_info, None)? };

        let mut pipelines = [vk::Pipeline::null(); 4];
        for (slot, words) in pipelines.iter_mut().zip(&code) {
            let module_info = vk::ShaderModuleCreateInfo::default().code(words);
            let module = unsafe { device.create_shader_module(&module_info, None)? };
            let stage = vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::COMPUTE)
                .module(module)
                .name(c"main");
            let info = vk::ComputePipelineCreateInfo::default()
                .stage(stage)
                .layout(layout);
            let created = unsafe {
                device.create_compute_pipelines(vk::PipelineCache::null(), &[info], None)
            };
            unsafe { device.destroy_shader_module(module, None) };
            *slot = created.map_err(|(_, e)| e)?[0];
        }
        log::info!("phosphor compute pipelines ready");

        Ok(Self {
            set_layout,
            layout,
            pipelines,
        })
    }

    pub fn destroy(&self, vk_context: &VkContext) {
        let device = vk_context.device();
        unsafe {
            for p in self.pipelines {
                device.destroy_pipeline(p, None);
            }
            device.destroy_pipeline_layout(self.layout, None);
            device.destroy_descriptor_set_layout(self.set_layout, None);
        }
    }
}

/// Energy `E_*`, age `A`, blur temporaries `T1_*`/`T2_*` and the screen image `O`.  `T1` has a
/// set of color layers per kernel.
struct Targets {
    energy: Image,
    age: Image,
    t1: Image,
    t2: Image,
    output: Image,
}

impl Targets {
    fn new(vk_context: &VkContext, extent: vk::Extent2D) -> Result<Self, RenderError> {
        let kept = vk::ImageUsageFlags::STORAGE
            | vk::ImageUsageFlags::TRANSFER_SRC
            | vk::ImageUsageFlags::TRANSFER_DST;
        let scratch = vk::ImageUsageFlags::STORAGE | vk::ImageUsageFlags::TRANSFER_DST;
        Ok(Self {
            energy: Image::new(vk_context, extent, 3, vk::Format::R32_UINT, kept)?,
            age: Image::new(vk_context, extent, 1, vk::Format::R32_UINT, kept)?,
            t1: Image::new(vk_context, extent, 9, vk::Format::R32_SFLOAT, scratch)?,
            t2: Image::new(vk_context, extent, 3, vk::Format::R32_SFLOAT, scratch)?,
            output: Image::new(vk_context, extent, 1, vk::Format::R8G8B8A8_UNORM, kept)?,
        })
    }

    fn all(&self) -> [&Image; 5] {
        [&self.energy, &self.age, &self.t1, &self.t2, &self.output]
    }

    /// The images whose contents survive a resize.
    fn kept(&self) -> [&Image; 3] {
        [&self.energy, &self.age, &self.output]
    }

    fn destroy(&self, vk_context: &VkContext) {
        self.all().iter().for_each(|i| i.destroy(vk_context));
    }
}

/// One pane's phosphor on the GPU.
pub struct PhosphorGpu {
    extent: vk::Extent2D,
    targets: Targets,
    positions: MappedAllocation<[f32; 4]>,
    colors: MappedAllocation<[f32; 4]>,
    taps: MappedAllocation<f32>,
    pool: vk::DescriptorPool,
    set: vk::DescriptorSet,
}

impl PhosphorGpu {
    pub fn new(
        vk_context: &VkContext,
        pipelines: &PhosphorPipelines,
        width: u32,
        height: u32,
    ) -> Result<Self, RenderError> {
        let device = vk_context.device();
        let extent = vk::Extent2D { width, height };
        let targets = Targets::new(vk_context, extent)?;
        vk_context.one_time_submit(|cb| {
            targets.all().iter().for_each(|i| i.clear(cb, vk_context));
        })?;

        let beam = vk::BufferUsageFlags::STORAGE_BUFFER;
        let capacity = 4096;
        let positions = MappedAllocation::new(vk_context, capacity, beam)?;
        let colors = MappedAllocation::new(vk_context, capacity, beam)?;
        let taps = MappedAllocation::new(vk_context, 3 * TAPS_PER_KERNEL, beam)?;

        let pool_sizes = [
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::STORAGE_IMAGE,
                descriptor_count: 5,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::STORAGE_BUFFER,
                descriptor_count: 3,
            },
        ];
        let pool_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(1)
            .pool_sizes(&pool_sizes);
        let pool = unsafe { device.create_descriptor_pool(&pool_info, None)? };
        let set_layouts = [pipelines.set_layout];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(pool)
            .set_layouts(&set_layouts);
        let set = unsafe { device.allocate_descriptor_sets(&alloc_info)? }[0];

        let phosphor = Self {
            extent,
            targets,
            positions,
            colors,
            taps,
            pool,
            set,
        };
        phosphor.write_descriptors(vk_context);
        Ok(phosphor)
    }

    pub fn width(&self) -> u32 {
        self.extent.width
    }

    pub fn height(&self) -> u32 {
        self.extent.height
    }

    /// Image the colormap pass writes, bottom row first.
    pub fn output(&self) -> vk::Image {
        self.targets.output.image
    }

    fn write_descriptors(&self, vk_context: &VkContext) {
        let images = self.targets.all().map(|i| [i.descriptor_info()]);
        let buffers = [
            [self.positions.descriptor_info()],
            [self.colors.descriptor_info()],
            [self.taps.descriptor_info()],
        ];
        let mut writes = Vec::with_capacity(8);
        for (binding, info) in images.iter().enumerate() {
            writes.push(
                vk::WriteDescriptorSet::default()
                    .dst_set(self.set)
                    .dst_binding(binding as u32)
                    .descriptor_type(vk::DescriptorType::STORAGE_IMAGE)
                    .image_info(info),
            );
        }
        for (k, info) in buffers.iter().enumerate() {
            writes.push(
                vk::WriteDescriptorSet::default()
                    .dst_set(self.set)
                    .dst_binding(5 + k as u32)
                    .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
                    .buffer_info(info),
            );
        }
        unsafe { vk_context.device().update_descriptor_sets(&writes, &[]) };
    }

    /// Recreate every image at the new size and carry energy, age and output over, centered.
    /// Waits for the queue, so callers must not have a frame open on it.
    pub fn resize(&mut self, vk_context: &VkContext, width: u32, height: u32) -> Result<(), RenderError> {
        let extent = vk::Extent2D { width, height };
        if extent == self.extent {
            return Ok(());
        }
        log::debug!(
            "phosphor {}x{} -> {width}x{height}",
            self.extent.width,
            self.extent.height
        );
        let targets = Targets::new(vk_context, extent)?;
        let region = centered_region(self.extent, extent);
        let old = &self.targets;
        vk_context.one_time_submit(|cb| {
            targets.all().iter().for_each(|i| i.clear(cb, vk_context));
            let Some((src, dst, size)) = region else {
                return;
            };
            image::memory_barrier(
                cb,
                vk::PipelineStageFlags::TRANSFER,
                vk::AccessFlags::TRANSFER_WRITE,
                vk::PipelineStageFlags::TRANSFER,
                vk::AccessFlags::TRANSFER_WRITE,
                vk_context,
            );
            for (from, to) in old.kept().into_iter().zip(targets.kept()) {
                let copy = vk::ImageCopy {
                    src_subresource: from.subresource_layers(),
                    src_offset: vk::Offset3D {
                        x: src.x,
                        y: src.y,
                        z: 0,
                    },
                    dst_subresource: to.subresource_layers(),
                    dst_offset: vk::Offset3D {
                        x: dst.x,
                        y: dst.y,
                        z: 0,
                    },
                    extent: vk::Extent3D {
                        width: size.width,
                        height: size.height,
                        depth: 1,
                    },
                };
                unsafe {
                    vk_context.device().cmd_copy_image(
                        cb,
                        from.image,
                        vk::ImageLayout::GENERAL,
                        to.image,
                        vk::ImageLayout::GENERAL,
                        &[copy],
                    );
                }
            }
        })?;
        let old = std::mem::replace(&mut self.targets, targets);
        old.destroy(vk_context);
        self.extent = extent;
        self.write_descriptors(vk_context);
        Ok(())
    }

    /// Upload this frame's beam and record decay, compose, blur and colormap into `cb`.  The
    /// previous submission using these buffers must have completed.
    pub fn record(
        &mut self,
        vk_context: &VkContext,
        pipelines: &PhosphorPipelines,
        cb: vk::CommandBuffer,
        params: &PhosphorParams,
        beam: &Beam,
    ) -> Result<(), RenderError> {
        let device = vk_context.device();
        let vertices = beam.positions.len().min(beam.colors.len());
        if vertices > self.positions.len() {
            let capacity = vertices.next_power_of_two();
            let usage = vk::BufferUsageFlags::STORAGE_BUFFER;
            self.positions.destroy(vk_context);
            self.colors.destroy(vk_context);
            self.positions = MappedAllocation::new(vk_context, capacity, usage)?;
            self.colors = MappedAllocation::new(vk_context, capacity, usage)?;
            self.write_descriptors(vk_context);
        }
        self.positions.write(&beam.positions[..vertices]);
        self.colors.write(&beam.colors[..vertices]);
        let kernels = blur_kernels(params);
        self.taps.write(&packed_taps(&kernels));
        self.positions.flush(vk_context)?;
        self.colors.flush(vk_context)?;
        self.taps.flush(vk_context)?;

        let base = PushConstants::new(params, self.extent, vertices.saturating_sub(1));
        let [decay, compose, blur, colormap] = pipelines.pipelines;
        let (tiles_x, tiles_y) = (groups(self.extent.width, TILE), groups(self.extent.height, TILE));
        let barrier = || {
            image::memory_barrier(
                cb,
                vk::PipelineStageFlags::COMPUTE_SHADER,
                vk::AccessFlags::SHADER_WRITE,
                vk::PipelineStageFlags::COMPUTE_SHADER,
                vk::AccessFlags::SHADER_READ | vk::AccessFlags::SHADER_WRITE,
                vk_context,
            )
        };
        let dispatch = |pipeline: vk::Pipeline, constants: &PushConstants, x: u32, y: u32| unsafe {
            device.cmd_bind_pipeline(cb, vk::PipelineBindPoint::COMPUTE, pipeline);
            device.cmd_push_constants(
                cb,
                pipelines.layout,
                vk::ShaderStageFlags::COMPUTE,
                0,
                bytemuck::bytes_of(constants),
            );
            device.cmd_dispatch(cb, x, y, 1);
        };

        unsafe {
            device.cmd_bind_descriptor_sets(
                cb,
                vk::PipelineBindPoint::COMPUTE,
                pipelines.layout,
                0,
                &[self.set],
                &[],
            );
        }

        dispatch(decay, &base, tiles_x, tiles_y);
        barrier();
        if base.segments > 0 {
            dispatch(compose, &base, groups(base.segments, SEGMENT_GROUP), 1);
            barrier();
        }

        // Horizontal passes write disjoint layers, so one barrier covers them all.
        for constants in blur_plan(&base, &kernels) {
            if constants.pass == BLUR_SUM {
                barrier();
            }
            dispatch(blur, &constants, tiles_x, tiles_y);
        }
        barrier();

        dispatch(colormap, &base, tiles_x, tiles_y);
        Ok(())
    }

    pub fn destroy(&self, vk_context: &VkContext) {
        self.targets.destroy(vk_context);
        self.positions.destroy(vk_context);
        self.colors.destroy(vk_context);
        self.taps.destroy(vk_context);
        unsafe { vk_context.device().destroy_descriptor_pool(self.pool, None) };
    }
}

/// Whichever phosphor a pane ended up with.
pub enum PanePhosphor {
    Gpu(PhosphorGpu),
    Cpu(PhosphorCpu),
}

impl PanePhosphor {
    /// GPU when the pipelines loaded and the images allocate, CPU otherwise.
    pub fn new(
        vk_context: &VkContext,
        pipelines: Option<&PhosphorPipelines>,
        width: u32,
        height: u32,
    ) -> Self {
        if let Some(pipelines) = pipelines {
            match PhosphorGpu::new(vk_context, pipelines, width, height) {
                Ok(gpu) => return PanePhosphor::Gpu(gpu),
                Err(e) => log::warn!("GPU phosphor unavailable, using the CPU: {e}"),
            }
        }
        PanePhosphor::Cpu(PhosphorCpu::new(width, height))
    }

    pub fn destroy(&self, vk_context: &VkContext) {
        if let PanePhosphor::Gpu(gpu) = self {
            gpu.destroy(vk_context);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use afterglow_lib::config::PhosphorConfig;
    use afterglow_lib::phosphor::copy_centered;

    #[test]
    fn test_push_constant_layout() {
        // Scalars only after the two vectors, so std430 and C agree on every offset.
        assert_eq!(size_of::<PushConstants>(), 112);
        assert!(size_of::<PushConstants>() <= 128);

        let params = PhosphorParams::from_config(&PhosphorConfig::default(), 1.0 / 60.0, 7);
        let extent = vk::Extent2D {
            width: 640,
            height: 360,
        };
        let pc = PushConstants::new(&params, extent, 99);
        assert_eq!(pc.frame, 7);
        assert_eq!(pc.segments, 99);
        assert!(pc.fast_factor < pc.slow_factor);
        assert_eq!(pc.slow_factor, params.decay_factor(params.age_threshold));

        let kernels = blur_kernels(&params);
        let pass = pc.blur(&kernels).pass(BLUR_HORIZONTAL, 2);
        assert_eq!((pass.pass, pass.kernel), (BLUR_HORIZONTAL, 2));
        for (k, kernel) in kernels.iter().enumerate() {
            assert_eq!(((pass.radii >> (8 * k)) & 0xff) as usize, kernel.radius());
            assert_eq!(pass.weights[k], kernel.weight);
        }
        assert_eq!(pass.width, 640);
    }

    #[test]
    fn test_blur_plan() {
        let mut params = PhosphorParams::from_config(&PhosphorConfig::default(), 1.0 / 60.0, 0);
        let extent = vk::Extent2D {
            width: 64,
            height: 64,
        };
        let base = PushConstants::new(&params, extent, 0);
        let kernels = blur_kernels(&params);
        let plan = blur_plan(&base, &kernels);
        let active = kernels.iter().filter(|k| k.weight != 0.0).count();
        assert_eq!(plan.len(), active + 1);
        assert!(plan[..active].iter().all(|c| c.pass == BLUR_HORIZONTAL));
        assert_eq!(plan[active].pass, BLUR_SUM);

        // No glow still runs the summing pass, which copies E into T2.
        params.near_intensity = 0.0;
        params.far_intensity = 0.0;
        let kernels = blur_kernels(&params);
        assert!(kernels.iter().all(|k| k.weight == 0.0));
        let plan = blur_plan(&base, &kernels);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].pass, BLUR_SUM);
    }

    #[test]
    fn test_packed_taps() {
        let params = PhosphorParams::from_config(&PhosphorConfig::default(), 1.0 / 60.0, 0);
        let kernels = blur_kernels(&params);
        let taps = packed_taps(&kernels);
        assert_eq!(taps.len(), 3 * TAPS_PER_KERNEL);
        for (k, kernel) in kernels.iter().enumerate() {
            let slot = &taps[k * TAPS_PER_KERNEL..(k + 1) * TAPS_PER_KERNEL];
            assert_eq!(&slot[..kernel.taps.len()], &kernel.taps[..]);
            assert!(slot[kernel.taps.len()..].iter().all(|t| *t == 0.0));
        }
    }

    #[test]
    fn test_groups() {
        assert_eq!(groups(640, TILE), 80);
        assert_eq!(groups(641, TILE), 81);
        assert_eq!(groups(0, SEGMENT_GROUP), 1);
    }

    /// The copy region reproduces the CPU resize for growing, shrinking and mixed sizes.
    #[test]
    fn test_centered_region_matches_cpu() {
        let sizes = [(8u32, 6u32), (5, 3), (13, 6), (4, 9)];
        for (fw, fh) in sizes {
            for (tw, th) in sizes {
                let src: Vec<u32> = (1..=fw * fh).collect();
                let expected = copy_centered(&src, fw as usize, fh as usize, tw as usize, th as usize);

                let mut copied = vec![0u32; (tw * th) as usize];
                let from = vk::Extent2D {
                    width: fw,
                    height: fh,
                };
                let to = vk::Extent2D {
                    width: tw,
                    height: th,
                };
                if let Some((s, d, e)) = centered_region(from, to) {
                    for y in 0..e.height as i32 {
                        for x in 0..e.width as i32 {
                            let si = (s.y + y) as u32 * fw + (s.x + x) as u32;
                            let di = (d.y + y) as u32 * tw + (d.x + x) as u32;
                            copied[di as usize] = src[si as usize];
                        }
                    }
                }
                assert_eq!(copied, expected, "{fw}x{fh} -> {tw}x{th}");
            }
        }
    }
}
