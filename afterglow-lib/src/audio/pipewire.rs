// Copyright 2026 The Afterglow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! PipeWire monitor capture.  We want what other applications are playing, so we look for sinks
//! and link a capture stream to their monitor ports.  Each stream runs its own main loop thread,
//! and the process callback hands converted `f32` frames straight to the DSP handler.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use pipewire as pw;
use pw::{main_loop::MainLoopBox, spa};

use super::{AudioFormat, Backend, PushSource, SampleHandler, Source, CHANNELS};
use crate::AfterglowError;

/// How long to wait for the server to list sinks or start a stream.
const SERVER_TIMEOUT: Duration = Duration::from_millis(1000);

/// Name shown by PipeWire tools for our streams.
const STREAM_NAME: &str = "afterglow";

/// A sink we can monitor.
#[derive(Clone, Debug)]
struct Sink {
    /// Parsed from the `object.serial` property, what `TARGET_OBJECT` expects.
    object_serial: u32,
    name: String,
}

impl Sink {
    fn try_new(props: &spa::utils::dict::DictRef) -> Option<Self> {
        let object_serial = props.get("object.serial")?.parse::<u32>().ok()?;
        // Which name means the most to users varies by device.
        let name = props
            .get("node.description")
            .or_else(|| props.get("device.description"))
            .or_else(|| props.get("node.nick"))
            .or_else(|| props.get("node.name"))
            .map(ToString::to_string)
            .unwrap_or_else(|| object_serial.to_string());
        Some(Sink {
            object_serial,
            name,
        })
    }
}

/// Walk the registry once and collect audio sinks.  Runs a short-lived main loop on its own
/// thread, quitting when the core reports the initial sync done.
fn list_sinks() -> Result<Vec<Sink>, AfterglowError> {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let _ = tx.send(list_sinks_blocking());
    });
    rx.recv_timeout(SERVER_TIMEOUT)
        .map_err(|_| AfterglowError::Timeout("PipeWire registry not received"))?
}

fn list_sinks_blocking() -> Result<Vec<Sink>, AfterglowError> {
    let mainloop = MainLoopBox::new(None)?;
    let context = pw::context::ContextBox::new(&mainloop.loop_(), None)?;
    let core = context.connect(None)?;
    let registry = core.get_registry()?;

    let sinks = Arc::new(Mutex::new(Vec::new()));

    let _done_listener = core
        .add_listener_local()
        .done({
            let mainloop_ptr = mainloop.as_raw_ptr();
            // NOTE the loop outlives every callback it runs, and quitting is all we do with it.
            move |_id, _seq| unsafe { pw::sys::pw_main_loop_quit(mainloop_ptr) }
        })
        .register();

    let _registry_listener = registry
        .add_listener_local()
        .global({
            let sinks = sinks.clone();
            move |global| {
                let Some(props) = &global.props else {
                    return;
                };
                // Sources and duplex devices would capture microphones, not playback.
                if props.get("media.class") != Some("Audio/Sink") {
                    return;
                }
                match (Sink::try_new(props), sinks.lock()) {
                    (Some(sink), Ok(mut sinks)) => sinks.push(sink),
                    (None, _) => log::debug!("skipping sink without object.serial"),
                    (_, Err(e)) => log::warn!("recording sink failed: {}", AfterglowError::from(e)),
                }
            }
        })
        .register();

    core.sync(0)?;
    mainloop.run();

    let sinks = sinks.lock()?.clone();
    Ok(sinks)
}

pub struct PipewireBackend;

impl Backend for PipewireBackend {
    fn name(&self) -> &'static str {
        "pipewire"
    }

    fn enumerate(&self) -> Result<Vec<String>, AfterglowError> {
        Ok(list_sinks()?.into_iter().map(|s| s.name).collect())
    }

    fn open(&self, device: Option<&str>, sample_rate: u32) -> Result<Source, AfterglowError> {
        // Listing doubles as the check that a server is reachable.
        let sinks = list_sinks()?;
        let target = match device {
            None => None,
            Some(wanted) => Some(
                sinks
                    .iter()
                    .find(|s| s.name == wanted)
                    .map(|s| s.object_serial)
                    .ok_or_else(|| {
                        AfterglowError::AudioUnavailable(format!("no PipeWire sink named {wanted:?}"))
                    })?,
            ),
        };
        Ok(Source::PushBased(Box::new(PipewireSource {
            target,
            requested_rate: sample_rate,
            rate: Arc::new(AtomicU32::new(sample_rate)),
            handler: Arc::new(Mutex::new(None)),
            stream: None,
        })))
    }
}

/// Commands for the stream thread.
enum Message {
    Terminate,
}

struct StreamThread {
    tx: pw::channel::Sender<Message>,
    handle: std::thread::JoinHandle<()>,
}

pub struct PipewireSource {
    target: Option<u32>,
    requested_rate: u32,
    /// Rate the server negotiated, updated from the stream thread.
    rate: Arc<AtomicU32>,
    /// Outlives stream restarts, so `reconfigure` can reconnect without a new handler.
    handler: Arc<Mutex<Option<SampleHandler>>>,
    stream: Option<StreamThread>,
}

impl PipewireSource {
    fn start(&mut self) -> Result<(), AfterglowError> {
        let (pw_tx, pw_rx) = pw::channel::channel();
        let (ready_tx, ready_rx) = mpsc::channel();
        let config = StreamConfig {
            target: self.target,
            rate: self.requested_rate,
            negotiated: self.rate.clone(),
            handler: self.handler.clone(),
        };

        let handle = std::thread::Builder::new()
            .name("pipewire".to_owned())
            .spawn(move || {
                if let Err(e) = run_stream(config, pw_rx, &ready_tx) {
                    // Either start-up failed and the opener hears about it, or the opener is gone.
                    if ready_tx.send(Err(e)).is_err() {
                        log::warn!("PipeWire stream ended");
                    }
                }
            })?;

        match ready_rx.recv_timeout(SERVER_TIMEOUT) {
            Ok(Ok(())) => {
                self.stream = Some(StreamThread { tx: pw_tx, handle });
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = pw_tx.send(Message::Terminate);
                Err(AfterglowError::Timeout("PipeWire stream did not start"))
            }
        }
    }

    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            if stream.tx.send(Message::Terminate).is_err() {
                log::debug!("PipeWire loop already gone");
            }
            if stream.handle.join().is_err() {
                log::warn!("PipeWire thread panicked");
            }
        }
    }
}

impl PushSource for PipewireSource {
    fn format(&self) -> AudioFormat {
        AudioFormat::stereo(self.rate.load(Ordering::Acquire))
    }

    fn set_handler(&mut self, handler: SampleHandler) -> Result<(), AfterglowError> {
        *self.handler.lock()? = Some(handler);
        if self.stream.is_none() {
            self.start()?;
        }
        Ok(())
    }

    fn reconfigure(&mut self, sample_rate: u32) -> Result<AudioFormat, AfterglowError> {
        self.stop();
        self.requested_rate = sample_rate;
        self.rate.store(sample_rate, Ordering::Release);
        self.start()?;
        Ok(self.format())
    }

    fn cleanup(&mut self) {
        self.stop();
    }
}

impl Drop for PipewireSource {
    fn drop(&mut self) {
        self.stop();
    }
}

struct StreamConfig {
    target: Option<u32>,
    rate: u32,
    negotiated: Arc<AtomicU32>,
    handler: Arc<Mutex<Option<SampleHandler>>>,
}

struct StreamData {
    format: spa::param::audio::AudioInfoRaw,
    negotiated: Arc<AtomicU32>,
    handler: Arc<Mutex<Option<SampleHandler>>>,
    /// Converted interleaved stereo, reused across callbacks.
    frames: Vec<f32>,
}

impl StreamData {
    /// Interleaved little-endian `f32` bytes to interleaved stereo.  Mono is duplicated and
    /// channels past the second are dropped.
    fn convert(&mut self, bytes: &[u8]) {
        let channels = (self.format.channels() as usize).max(1);
        let samples = bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]));
        self.frames.clear();
        if channels == CHANNELS {
            self.frames.extend(samples);
            return;
        }
        let mut frame = Vec::with_capacity(channels);
        for s in samples {
            frame.push(s);
            if frame.len() == channels {
                let right = if channels == 1 { frame[0] } else { frame[1] };
                self.frames.extend([frame[0], right]);
                frame.clear();
            }
        }
    }

    fn deliver(&mut self) {
        match self.handler.lock() {
            Ok(mut handler) => {
                if let Some(handler) = handler.as_mut() {
                    handler(&self.frames);
                }
            }
            Err(e) => log::warn!("audio handler: {}", AfterglowError::from(e)),
        }
    }
}

fn run_stream(
    config: StreamConfig,
    rx: pw::channel::Receiver<Message>,
    ready: &mpsc::Sender<Result<(), AfterglowError>>,
) -> Result<(), AfterglowError> {
    let mainloop = MainLoopBox::new(None)?;
    let context = pw::context::ContextBox::new(&mainloop.loop_(), None)?;
    let core = context.connect(None)?;

    let _receiver = rx.attach(mainloop.loop_(), {
        let mainloop_ptr = mainloop.as_raw_ptr();
        move |message| match message {
            Message::Terminate => {
                log::debug!("terminating PipeWire loop");
                unsafe { pw::sys::pw_main_loop_quit(mainloop_ptr) };
            }
        }
    });

    let mut props = pw::properties::properties! {
        *pw::keys::MEDIA_TYPE => "Audio",
        *pw::keys::MEDIA_CATEGORY => "Capture",
        *pw::keys::MEDIA_ROLE => "Music",
        *pw::keys::STREAM_CAPTURE_SINK => "true",
    };
    if let Some(serial) = config.target {
        props.insert(*pw::keys::TARGET_OBJECT, serial.to_string());
    }

    let stream = pw::stream::StreamBox::new(&core, STREAM_NAME, props)?;

    let data = StreamData {
        format: Default::default(),
        negotiated: config.negotiated,
        handler: config.handler,
        frames: Vec::new(),
    };

    let _listener = stream
        .add_local_listener_with_user_data(data)
        .state_changed(|_stream, _data, old, new| {
            log::debug!("PipeWire stream {old:?} -> {new:?}");
        })
        .param_changed(|_stream, data, id, param| {
            let Some(param) = param else {
                return;
            };
            if id != pw::spa::param::ParamType::Format.as_raw() {
                return;
            }
            let Ok((media_type, media_subtype)) = spa::param::format_utils::parse_format(param)
            else {
                return;
            };
            if media_type != spa::param::format::MediaType::Audio
                || media_subtype != spa::param::format::MediaSubtype::Raw
            {
                return;
            }
            if let Err(e) = data.format.parse(param) {
                log::warn!("unreadable PipeWire format: {e:?}");
                return;
            }
            log::info!(
                "capturing rate:{} channels:{}",
                data.format.rate(),
                data.format.channels()
            );
            data.negotiated.store(data.format.rate(), Ordering::Release);
        })
        .process(|stream, data| {
            let Some(mut buffer) = stream.dequeue_buffer() else {
                log::trace!("no buffer dequeued");
                return;
            };
            for d in buffer.datas_mut().iter_mut() {
                let size = d.chunk().size() as usize;
                if let Some(bytes) = d.data() {
                    let size = size.min(bytes.len());
                    data.convert(&bytes[..size]);
                    data.deliver();
                }
            }
        })
        .register()?;

    let pod_object = spa::pod::object! {
        spa::utils::SpaTypes::ObjectParamFormat,
        spa::param::ParamType::EnumFormat,
        spa::pod::property!(
            spa::param::format::FormatProperties::MediaType,
            Id,
            spa::param::format::MediaType::Audio
        ),
        spa::pod::property!(
            spa::param::format::FormatProperties::MediaSubtype,
            Id,
            spa::param::format::MediaSubtype::Raw
        ),
        spa::pod::property!(
            spa::param::format::FormatProperties::AudioFormat,
            Id,
            spa::param::audio::AudioFormat::F32LE
        ),
        spa::pod::property!(
            spa::param::format::FormatProperties::AudioRate,
            Int,
            config.rate as i32
        ),
        spa::pod::property!(
            spa::param::format::FormatProperties::AudioChannels,
            Int,
            CHANNELS as i32
        ),
    };

    let mut buf = Vec::new();
    pw::spa::pod::serialize::PodSerializer::serialize(
        std::io::Cursor::new(&mut buf),
        &pw::spa::pod::Value::Object(pod_object),
    )
    .map_err(|e| AfterglowError::AudioSource(format!("serializing format pod failed: {e}")))?;
    let pod = pw::spa::pod::Pod::from_bytes(&buf)
        .ok_or_else(|| AfterglowError::AudioSource("format pod did not parse".to_owned()))?;

    stream.connect(
        spa::utils::Direction::Input,
        // Targets go through TARGET_OBJECT.  This argument is deprecated.
        None,
        pw::stream::StreamFlags::MAP_BUFFERS
            | pw::stream::StreamFlags::AUTOCONNECT
            | pw::stream::StreamFlags::RT_PROCESS,
        &mut [pod],
    )?;

    if ready.send(Ok(())).is_err() {
        // Opener timed out and left.
        return Ok(());
    }
    mainloop.run();
    Ok(())
}
