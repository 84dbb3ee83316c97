// Copyright 2026 The Afterglow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! One OS window per layout group.  The window owns its swapchain, a canvas covering every pane,
//! and the per-pane visualizer state.  Layout itself stays in `afterglow_lib::layout`; windows
//! follow it through `sync`.

use std::time::{Duration, Instant};

use afterglow_lib::canvas::{Canvas, Viewport};
use afterglow_lib::config::Config;
use afterglow_lib::layout::Group;
use afterglow_lib::phosphor::PhosphorParams;
use afterglow_lib::pipeline::{DspCore, FrameSnapshot};
use afterglow_lib::theme::Theme;
use afterglow_lib::viz::{FrameContext, Geometry, Kind, Quad, Visualizer};
use afterglow_lib::{AfterglowError, Throttle};
use ash::vk;
use winit::dpi::PhysicalSize;
use winit::event_loop::ActiveEventLoop;
use winit::window::{Fullscreen, Window, WindowLevel};

use crate::RenderError;
use crate::phosphor::{PanePhosphor, PhosphorPipelines};
use crate::present::{PaneBlit, WindowPresent};
use crate::vk_context::VkContext;

const SPLITTER_WIDTH: f32 = 2.0;
const FPS_PERIOD: Duration = Duration::from_secs(5);

/// Shared inputs of one frame, the same for every window.
pub struct Frame<'a> {
    pub config: &'a Config,
    pub core: &'a DspCore,
    pub snapshot: &'a FrameSnapshot,
    pub theme: &'a Theme,
    pub dt: f32,
    pub frame: u32,
}

struct PaneState {
    name: String,
    visualizer: Visualizer,
    geometry: Geometry,
    phosphor: Option<PanePhosphor>,
    /// The phosphor could not follow a resize.  Its targets are kept as they were; the pane sits
    /// out one frame and the resize is retried on the next.
    stale: bool,
}

impl PaneState {
    fn new(name: &str) -> Option<Self> {
        let kind = Kind::from_name(name)?;
        Some(Self {
            name: name.to_owned(),
            visualizer: Visualizer::new(kind),
            geometry: Geometry::default(),
            phosphor: None,
            stale: false,
        })
    }

    /// Clears the stale mark, returning whether this frame should be skipped.
    fn sits_out(&mut self) -> bool {
        std::mem::take(&mut self.stale)
    }
}

/// Line up pane state with `names`, reusing state by name so a reorder keeps visualizer
/// history.  Names without a visualizer hold an empty slot, keeping indices aligned with the
/// group.  Returns the state nobody claimed.
fn match_panes<'a>(
    old: Vec<Option<PaneState>>,
    names: impl IntoIterator<Item = &'a str>,
) -> (Vec<Option<PaneState>>, Vec<PaneState>) {
    let mut old: Vec<PaneState> = old.into_iter().flatten().collect();
    let mut panes = Vec::new();
    for name in names {
        let state = match old.iter().position(|s| s.name == name) {
            Some(i) => Some(old.remove(i)),
            None => PaneState::new(name),
        };
        if state.is_none() {
            log::error!("pane {name} has no visualizer, leaving it blank");
        }
        panes.push(state);
    }
    (panes, old)
}

pub struct GroupWindow {
    pub id: String,
    pub window: Window,
    pub present: WindowPresent,
    canvas: Canvas,
    /// One slot per group pane, empty when the name has no visualizer.
    panes: Vec<Option<PaneState>>,
    /// Pane under the pointer.
    pub hovered: Option<usize>,
    /// Last pointer column, `None` once it left the window.
    pub cursor_x: Option<f32>,

    frames: u32,
    fps_since: Instant,
    gpu_errors: Throttle,
}

impl GroupWindow {
    pub fn new(
        event_loop: &ActiveEventLoop,
        vk_context: &VkContext,
        config: &Config,
        group: &Group,
        fullscreen: bool,
    ) -> Result<Self, RenderError> {
        let title = if group.id() == afterglow_lib::config::MAIN_GROUP {
            "afterglow".to_owned()
        } else {
            format!("afterglow {}", group.id())
        };
        let level = if config.window.always_on_top {
            WindowLevel::AlwaysOnTop
        } else {
            WindowLevel::Normal
        };
        let attributes = Window::default_attributes()
            .with_title(title)
            .with_inner_size(PhysicalSize::new(group.width(), group.height()))
            .with_min_inner_size(PhysicalSize::new(config.window.min_width, 1))
            .with_decorations(config.window.decorations)
            .with_window_level(level)
            .with_fullscreen(fullscreen.then_some(Fullscreen::Borderless(None)));
        let window = event_loop.create_window(attributes)?;
        let present = WindowPresent::new(vk_context, &window)?;
        log::debug!("window for group {}", group.id());

        let mut group_window = Self {
            id: group.id().to_owned(),
            window,
            present,
            canvas: Canvas::new(group.width(), group.height()),
            panes: Vec::new(),
            hovered: None,
            cursor_x: None,
            frames: 0,
            fps_since: Instant::now(),
            gpu_errors: Throttle::per_minute(),
        };
        group_window.sync(vk_context, group)?;
        Ok(group_window)
    }

    /// Match pane state to the group's panes by name.  Panes that survive a reorder keep their
    /// visualizer state.
    pub fn sync(&mut self, vk_context: &VkContext, group: &Group) -> Result<(), RenderError> {
        let old = std::mem::take(&mut self.panes);
        let (panes, old) = match_panes(old, group.panes().iter().map(|p| p.name.as_str()));
        self.panes = panes;
        if old.iter().any(|s| s.phosphor.is_some()) {
            vk_context.wait_idle()?;
            for state in &old {
                if let Some(p) = &state.phosphor {
                    p.destroy(vk_context);
                }
            }
        }
        self.hovered = self.hovered.filter(|h| *h < self.panes.len());
        Ok(())
    }

    pub fn hovered_kind(&self) -> Option<Kind> {
        self.hovered
            .and_then(|i| self.panes.get(i)?.as_ref())
            .map(|s| s.visualizer.kind())
    }

    /// Bring each pane's phosphor in line with its kind and size.  Runs before the frame opens
    /// since GPU resizes submit work of their own.
    fn prepare_phosphor(
        &mut self,
        vk_context: &VkContext,
        pipelines: Option<&PhosphorPipelines>,
        config: &Config,
        group: &Group,
    ) -> Result<(), RenderError> {
        let height = group.height();
        let slots = group.panes().iter().zip(&mut self.panes);
        for (pane, state) in slots.filter_map(|(p, s)| Some((p, s.as_mut()?))) {
            let wanted = state.visualizer.kind().uses_phosphor(config);
            match (&mut state.phosphor, wanted) {
                (None, true) => {
                    state.phosphor = Some(PanePhosphor::new(
                        vk_context, pipelines, pane.width, height,
                    ));
                }
                (Some(PanePhosphor::Gpu(gpu)), true) => {
                    if let Err(e) = gpu.resize(vk_context, pane.width, height) {
                        report(&mut self.gpu_errors, &self.id, &e);
                        state.stale = true;
                    }
                }
                (Some(PanePhosphor::Cpu(cpu)), true) => {
                    if cpu.width() != pane.width || cpu.height() != height {
                        cpu.resize(pane.width, height);
                    }
                }
                (Some(p), false) => {
                    vk_context.wait_idle()?;
                    p.destroy(vk_context);
                    state.phosphor = None;
                }
                (None, false) => {}
            }
        }
        Ok(())
    }

    pub fn draw(
        &mut self,
        vk_context: &VkContext,
        pipelines: Option<&PhosphorPipelines>,
        group: &Group,
        frame: &Frame,
    ) -> Result<(), RenderError> {
        let (width, height) = (group.width(), group.height());
        if width == 0 || height == 0 {
            return Ok(());
        }
        if self.canvas.width() != width || self.canvas.height() != height {
            self.canvas.resize(width, height);
        }
        self.prepare_phosphor(vk_context, pipelines, frame.config, group)?;

        let Some(cb) = self.present.begin(vk_context, &self.window)? else {
            return Ok(());
        };

        self.canvas.clear(frame.theme.background);
        let params = PhosphorParams::from_config(&frame.config.phosphor, frame.dt, frame.frame);
        let mut blits = Vec::new();
        let mut failed = None;
        let slots = group.panes().iter().zip(&mut self.panes);
        for (pane, state) in slots.filter_map(|(p, s)| Some((p, s.as_mut()?))) {
            if state.sits_out() {
                continue;
            }
            let ctx = FrameContext {
                config: frame.config,
                core: frame.core,
                snapshot: frame.snapshot,
                theme: frame.theme,
                width: pane.width as f32,
                height: height as f32,
                dt: frame.dt,
            };
            state.visualizer.render(&ctx, &mut state.geometry);
            let view = Viewport {
                x: pane.x as f32,
                width: pane.width as f32,
                height: height as f32,
            };

            match (&mut state.phosphor, pipelines) {
                (Some(PanePhosphor::Cpu(cpu)), _) => {
                    let (w, h) = (cpu.width(), cpu.height());
                    let lit = cpu.render(&params, &state.geometry.beam);
                    self.canvas.blit(&view, lit, w, h);
                    self.canvas
                        .draw(&view, &state.geometry, state.visualizer.image());
                }
                (Some(PanePhosphor::Gpu(gpu)), Some(pipelines)) => {
                    match gpu.record(vk_context, pipelines, cb, &params, &state.geometry.beam) {
                        Ok(()) => blits.push(PaneBlit {
                            image: gpu.output(),
                            x: pane.x,
                            width: gpu.width(),
                            height: gpu.height(),
                        }),
                        Err(e) => failed = Some(e),
                    }
                }
                _ => {
                    self.canvas
                        .draw(&view, &state.geometry, state.visualizer.image());
                }
            }
        }
        if let Some(e) = failed {
            report(&mut self.gpu_errors, &self.id, &e);
        }

        let full = Viewport {
            x: 0.0,
            width: width as f32,
            height: height as f32,
        };
        for splitter in group.splitters() {
            let color = if splitter.hovering || splitter.dragging {
                frame.theme.foreground
            } else {
                frame.theme.splitter
            };
            let quad = Quad {
                x: splitter.x as f32 - SPLITTER_WIDTH / 2.0,
                y: 0.0,
                width: SPLITTER_WIDTH,
                height: height as f32,
                color,
            };
            self.canvas.quad(&full, &quad);
        }

        let extent = vk::Extent2D { width, height };
        self.present.finish(
            vk_context,
            &self.window,
            self.canvas.pixels(),
            extent,
            &blits,
        )?;
        self.count_frame();
        Ok(())
    }

    fn count_frame(&mut self) {
        self.frames += 1;
        let elapsed = self.fps_since.elapsed();
        if elapsed >= FPS_PERIOD {
            let fps = self.frames as f32 / elapsed.as_secs_f32();
            log::info!("{}: {fps:.1} fps", self.id);
            self.frames = 0;
            self.fps_since = Instant::now();
        }
    }

    pub fn destroy(&mut self, vk_context: &VkContext) {
        for state in self.panes.iter().flatten() {
            if let Some(p) = &state.phosphor {
                p.destroy(vk_context);
            }
        }
        self.panes.clear();
        self.present.destroy(vk_context);
    }
}

/// Log a GPU failure at most once per throttle period.  Returns whether it was logged.
fn report(throttle: &mut Throttle, id: &str, e: &RenderError) -> bool {
    let Some(suppressed) = throttle.ready() else {
        return false;
    };
    let e = AfterglowError::GpuAllocationFailed(e.to_string());
    log::error!("{id}: {e} ({suppressed} more suppressed)");
    true
}

#[cfg(test)]
mod test {
    use super::*;

    fn names(panes: &[Option<PaneState>]) -> Vec<Option<&str>> {
        panes
            .iter()
            .map(|s| s.as_ref().map(|s| s.name.as_str()))
            .collect()
    }

    #[test]
    fn test_match_panes_reorder() {
        let (panes, left) = match_panes(Vec::new(), ["oscilloscope", "vu"]);
        assert!(left.is_empty());
        let mut panes = panes;
        panes[1].as_mut().unwrap().stale = true;

        let (panes, left) = match_panes(panes, ["vu", "lufs", "oscilloscope"]);
        assert!(left.is_empty());
        assert_eq!(
            names(&panes),
            vec![Some("vu"), Some("lufs"), Some("oscilloscope")]
        );
        // The vu state moved with its name.
        assert!(panes[0].as_ref().unwrap().stale);

        let (panes, left) = match_panes(panes, ["lufs"]);
        assert_eq!(names(&panes), vec![Some("lufs")]);
        assert_eq!(left.len(), 2);
    }

    #[test]
    fn test_unknown_pane_keeps_slot() {
        let (panes, left) = match_panes(Vec::new(), ["vu", "nonsense", "lissajous"]);
        assert!(left.is_empty());
        assert_eq!(names(&panes), vec![Some("vu"), None, Some("lissajous")]);
        assert_eq!(
            panes[2].as_ref().unwrap().visualizer.kind(),
            Kind::Lissajous
        );
    }

    #[test]
    fn test_stale_pane_sits_out_once() {
        let mut state = PaneState::new("oscilloscope").unwrap();
        assert!(!state.sits_out());
        state.stale = true;
        assert!(state.sits_out());
        assert!(!state.sits_out());
    }

    #[test]
    fn test_report_throttled() {
        let mut throttle = Throttle::per_minute();
        let e = RenderError::Afterglow(AfterglowError::GpuAllocationFailed(
            "out of device memory".to_owned(),
        ));
        assert!(report(&mut throttle, "main", &e));
        assert!(!report(&mut throttle, "main", &e));
        assert!(!report(&mut throttle, "main", &e));
    }
}
