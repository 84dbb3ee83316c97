// Copyright 2026 The Afterglow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

mod buffer;
mod group;
mod image;
mod phosphor;
mod present;
mod vk_context;

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use ash::vk;
use clap::Parser;
use raw_window_handle::HasDisplayHandle;
use winit::{
    application::ApplicationHandler,
    event::{ElementState, MouseButton, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard as kb,
    window::WindowId,
};

use afterglow_assets::AssetDirs;
use afterglow_lib::AfterglowError;
use afterglow_lib::audio::{list_devices, open_source};
use afterglow_lib::config::{Config, MAIN_GROUP};
use afterglow_lib::layout::Layout;
use afterglow_lib::pipeline::{DspCore, FrameSnapshot, Workers};
use afterglow_lib::theme::Theme;
use afterglow_lib::viz::{Kind, layout_from_config};

use group::{Frame, GroupWindow};
use phosphor::PhosphorPipelines;
use vk_context::VkContext;

/// Longest frame delta handed to visualizers.  Stalls and the first frame would otherwise make
/// smoothing and decay jump.
const MAX_DT: f32 = 0.25;

#[derive(thiserror::Error, Debug)]
pub enum RenderError {
    #[error("vulkan: {0}")]
    Vulkan(#[from] vk::Result),
    #[error("vulkan loader: {0}")]
    Loading(#[from] ash::LoadingError),
    #[error("window handle: {0}")]
    Handle(#[from] raw_window_handle::HandleError),
    #[error("window: {0}")]
    Os(#[from] winit::error::OsError),
    #[error("event loop: {0}")]
    EventLoop(#[from] winit::error::EventLoopError),
    #[error("asset: {0}")]
    Asset(#[from] afterglow_assets::AssetError),
    #[error(transparent)]
    Afterglow(#[from] AfterglowError),
    #[error("unsupported: {0}")]
    Unsupported(&'static str),
    #[error("no vulkan device with graphics and compute")]
    NoDevice,
}

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Configuration file, instead of the one in the user config directory
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,
    /// Print the effective configuration as TOML and exit
    #[arg(long = "print-config")]
    print_config: bool,
    /// List capture devices of every audio backend and exit
    #[arg(long = "list-devices")]
    list_devices: bool,
    /// Log at debug level
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
    /// Start the main window fullscreen
    #[arg(short = 'f', long = "fullscreen")]
    fullscreen: bool,
}

struct App {
    fullscreen: bool,
    config: Config,
    theme: Theme,
    layout: Layout,
    core: Arc<DspCore>,
    workers: Option<Workers>,
    quit: Arc<AtomicBool>,

    vk_context: Option<VkContext>,
    pipelines: Option<PhosphorPipelines>,
    windows: HashMap<WindowId, GroupWindow>,

    snapshot: FrameSnapshot,
    seen: u64,
    frame: u32,
    dt: f32,
    last_frame: Instant,
    next_frame: Instant,
    result: Result<(), RenderError>,
}

impl App {
    fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.config.window.fps_limit.max(1) as f64)
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, e: RenderError) {
        log::error!("{e}");
        self.result = Err(e);
        event_loop.exit();
    }

    fn init_graphics(&mut self, event_loop: &ActiveEventLoop) -> Result<(), RenderError> {
        let vk_context = VkContext::new(event_loop.display_handle()?.as_raw())?;
        if self.config.phosphor.enabled {
            match PhosphorPipelines::load(&vk_context, &AssetDirs::new()) {
                Ok(p) => self.pipelines = Some(p),
                Err(e) => log::warn!("phosphor shaders unavailable, drawing it on the CPU: {e}"),
            }
        }
        self.vk_context = Some(vk_context);

        let ids: Vec<String> = self.layout.groups().iter().map(|g| g.id().to_owned()).collect();
        for id in ids {
            self.open_window(event_loop, &id)?;
        }
        Ok(())
    }

    fn open_window(&mut self, event_loop: &ActiveEventLoop, id: &str) -> Result<(), RenderError> {
        let (Some(vk_context), Some(group)) = (&self.vk_context, self.layout.group(id)) else {
            return Ok(());
        };
        let fullscreen = self.fullscreen && id == MAIN_GROUP;
        let window = GroupWindow::new(event_loop, vk_context, &self.config, group, fullscreen)?;
        self.windows.insert(window.window.id(), window);
        Ok(())
    }

    fn close_window(&mut self, window_id: WindowId) {
        let (Some(mut window), Some(vk_context)) = (self.windows.remove(&window_id), &self.vk_context)
        else {
            return;
        };
        if let Err(e) = vk_context.wait_idle() {
            log::warn!("waiting to close {}: {e}", window.id);
        }
        window.destroy(vk_context);
    }

    /// Re-read a group's panes into its window.
    fn sync_group(&mut self, id: &str) {
        let (Some(vk_context), Some(group)) = (&self.vk_context, self.layout.group(id)) else {
            return;
        };
        if let Some(window) = self.windows.values_mut().find(|w| w.id == id) {
            if let Err(e) = window.sync(vk_context, group) {
                log::error!("{id}: {e}");
            }
        }
    }

    /// Dock every pane of a popout back into main and close its window.
    fn dock_all(&mut self, window_id: WindowId) {
        let Some(id) = self.windows.get(&window_id).map(|w| w.id.clone()) else {
            return;
        };
        while self.layout.group(&id).is_some_and(|g| !g.is_empty()) {
            if self.layout.dock(&id, 0) {
                break;
            }
        }
        self.layout.remove_group(&id);
        self.close_window(window_id);
        self.sync_group(MAIN_GROUP);
    }

    /// The pitch-tracking spectrum slows down while the pointer is over any spectrum pane.
    fn update_hovering(&self) {
        let hovering = self
            .windows
            .values()
            .any(|w| w.hovered_kind() == Some(Kind::SpectrumAnalyzer));
        self.core.set_hovering(hovering);
    }

    fn key(&mut self, event_loop: &ActiveEventLoop, window_id: WindowId, code: kb::KeyCode) {
        let Some(window) = self.windows.get_mut(&window_id) else {
            return;
        };
        let id = window.id.clone();
        let hovered = window.hovered;
        match code {
            kb::KeyCode::KeyF => present::toggle_fullscreen(&window.window),
            kb::KeyCode::KeyQ | kb::KeyCode::Escape => event_loop.exit(),
            kb::KeyCode::BracketLeft | kb::KeyCode::BracketRight => {
                let (Some(i), Some(group)) = (hovered, self.layout.group_mut(&id)) else {
                    return;
                };
                let moved = if code == kb::KeyCode::BracketLeft {
                    group.swap_left(i).then(|| i - 1)
                } else {
                    group.swap_right(i).then(|| i + 1)
                };
                if let Some(to) = moved {
                    window.hovered = Some(to);
                    self.sync_group(&id);
                }
            }
            kb::KeyCode::KeyP => {
                let Some(i) = hovered else {
                    return;
                };
                let Some(popped) = self.layout.popout(&id, i) else {
                    log::info!("the last pane of {id} stays");
                    return;
                };
                self.sync_group(&id);
                if let Err(e) = self.open_window(event_loop, &popped) {
                    self.fail(event_loop, e);
                }
            }
            kb::KeyCode::KeyD => {
                let Some(i) = hovered else {
                    return;
                };
                if id == MAIN_GROUP {
                    return;
                }
                let emptied = self.layout.dock(&id, i);
                if emptied {
                    self.close_window(window_id);
                } else {
                    self.sync_group(&id);
                }
                self.sync_group(MAIN_GROUP);
            }
            _ => {}
        }
    }

    fn draw(&mut self, event_loop: &ActiveEventLoop, window_id: WindowId) {
        let (Some(vk_context), Some(window)) = (&self.vk_context, self.windows.get_mut(&window_id))
        else {
            return;
        };
        let Some(group) = self.layout.group(&window.id) else {
            return;
        };
        let frame = Frame {
            config: &self.config,
            core: &self.core,
            snapshot: &self.snapshot,
            theme: &self.theme,
            dt: self.dt,
            frame: self.frame,
        };
        if let Err(e) = window.draw(vk_context, self.pipelines.as_ref(), group, &frame) {
            self.fail(event_loop, e);
        }
    }

    /// Pull the newest analysis and schedule a redraw of every window.
    fn tick(&mut self) {
        let wait = self.period() / 2;
        match self.core.wait_frame(self.seen, wait) {
            Ok(Some(tick)) => self.seen = tick,
            Ok(None) => {}
            Err(e) => log::warn!("frame wait: {e}"),
        }
        if let Err(e) = self.core.snapshot(&mut self.snapshot) {
            log::warn!("snapshot: {e}");
        }

        let now = Instant::now();
        self.dt = now.duration_since(self.last_frame).as_secs_f32().min(MAX_DT);
        self.last_frame = now;
        self.frame = self.frame.wrapping_add(1);
        for window in self.windows.values() {
            window.window.request_redraw();
        }
    }

    fn teardown(&mut self) {
        if let Some(vk_context) = self.vk_context.take() {
            if let Err(e) = vk_context.wait_idle() {
                log::warn!("device idle on exit: {e}");
            }
            for (_, mut window) in self.windows.drain() {
                window.destroy(&vk_context);
            }
            if let Some(p) = self.pipelines.take() {
                p.destroy(&vk_context);
            }
            vk_context.destroy();
        }
        if let Some(workers) = self.workers.take() {
            if let Err(e) = workers.shutdown() {
                log::warn!("analysis stopped with error: {e}");
            }
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.vk_context.is_some() {
            return;
        }
        if let Err(e) = self.init_graphics(event_loop) {
            self.fail(event_loop, e);
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        let Some(window) = self.windows.get_mut(&window_id) else {
            return;
        };
        match event {
            WindowEvent::KeyboardInput { event, .. } => {
                if !event.repeat && event.state == ElementState::Pressed {
                    if let kb::PhysicalKey::Code(code) = event.physical_key {
                        self.key(event_loop, window_id, code);
                    }
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                let x = position.x as f32;
                window.cursor_x = Some(x);
                if let Some(group) = self.layout.group_mut(&window.id) {
                    window.hovered = group.hover(x);
                }
                self.update_hovering();
            }
            WindowEvent::CursorLeft { .. } => {
                window.cursor_x = None;
                window.hovered = None;
                if let Some(group) = self.layout.group_mut(&window.id) {
                    group.leave();
                }
                self.update_hovering();
            }
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => {
                let Some(group) = self.layout.group_mut(&window.id) else {
                    return;
                };
                match (state, window.cursor_x) {
                    (ElementState::Pressed, Some(x)) => {
                        group.press(x);
                    }
                    (ElementState::Released, _) => group.release(),
                    _ => {}
                }
            }
            WindowEvent::Resized(size) => {
                if size.width == 0 || size.height == 0 {
                    log::debug!("{} minimized", window.id);
                    return;
                }
                if let Some(group) = self.layout.group_mut(&window.id) {
                    group.resize(size.width, size.height);
                }
                window.present.mark_stale();
            }
            WindowEvent::RedrawRequested => self.draw(event_loop, window_id),
            WindowEvent::CloseRequested => {
                if window.id == MAIN_GROUP {
                    event_loop.exit();
                } else {
                    self.dock_all(window_id);
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.quit.load(Ordering::Acquire) {
            log::info!("interrupted");
            event_loop.exit();
            return;
        }
        let now = Instant::now();
        if now >= self.next_frame {
            self.tick();
            // A late frame restarts the cadence instead of bursting to catch up.
            self.next_frame = (self.next_frame + self.period()).max(now);
        }
        event_loop.set_control_flow(ControlFlow::WaitUntil(self.next_frame));
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.teardown();
    }
}

fn run(args: Args) -> Result<(), RenderError> {
    let config = Config::load(args.config.as_deref())?;
    if args.print_config {
        print!("{}", config.to_toml_string()?);
        return Ok(());
    }
    if args.list_devices {
        for (backend, devices) in list_devices(&config.audio) {
            match devices {
                Ok(names) => {
                    println!("{backend}:");
                    for name in names {
                        println!("  {name}");
                    }
                }
                Err(e) => println!("{backend}: unavailable ({e})"),
            }
        }
        return Ok(());
    }

    let layout = layout_from_config(&config)?;
    let theme = Theme::named(&config.window.theme);
    let source = open_source(&config.audio);
    let core = Arc::new(DspCore::new(config.clone(), source.format().sample_rate));
    let workers = Workers::spawn(core.clone(), source)?;

    let quit = Arc::new(AtomicBool::new(false));
    let handler_quit = quit.clone();
    if let Err(e) = ctrlc::set_handler(move || handler_quit.store(true, Ordering::Release)) {
        log::warn!("no interrupt handler: {e}");
    }

    let event_loop = EventLoop::new()?;
    let now = Instant::now();
    let mut app = App {
        fullscreen: args.fullscreen,
        config,
        theme,
        layout,
        core,
        workers: Some(workers),
        quit,
        vk_context: None,
        pipelines: None,
        windows: HashMap::new(),
        snapshot: FrameSnapshot::default(),
        seen: 0,
        frame: 0,
        dt: 0.0,
        last_frame: now,
        next_frame: now,
        result: Ok(()),
    };
    let ran = event_loop.run_app(&mut app);
    // Exiting normally already tore down; this covers an event loop error.
    app.teardown();
    ran?;
    app.result
}

fn main() -> ExitCode {
    let args = Args::parse();
    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
