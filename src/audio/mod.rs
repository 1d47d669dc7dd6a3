use anyhow::Context;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::audio_api::{AudioCommand, AudioError, AudioSink, AudioTime};

pub mod convolution;
mod effect;
mod engine;
mod frame;
pub mod graph;
mod recorder;
mod sample_buffer;
mod voice;

pub use convolution::{GuitarSpec, ReverbMix};
pub use effect::{Effect, EffectSpec, FilterKind, FilterSpec};
pub use engine::Meters;
pub use frame::StereoFrame;
pub use graph::{BusId, EffectGraph, GraphSpec, StripSpec};
pub use recorder::{CompletedRecording, RecordEvent, Recorder};
pub use sample_buffer::{format_duration, format_size, SampleBuffer};

use engine::Engine;

const COMMAND_QUEUE: usize = 1024;
const MAX_BLOCK: usize = 4096;

pub struct AudioHandle {
    tx: Sender<AudioCommand>,
    meters: Meters,
    sample_rate: u32,
    _output_stream: cpal::Stream,
    input_stream: Option<cpal::Stream>, // None when no input device is available
}

impl AudioHandle {
    /// Peak of the most recent input block, 0..1.
    pub fn input_level(&self) -> f32 {
        self.meters.input_peak()
    }
}

impl AudioSink for AudioHandle {
    fn send(&self, cmd: AudioCommand) -> Result<(), AudioError> {
        self.tx.try_send(cmd).map_err(|e| match e {
            TrySendError::Full(_) => AudioError::QueueFull,
            TrySendError::Disconnected(_) => AudioError::Disconnected,
        })
    }

    fn now(&self) -> AudioTime {
        AudioTime::from_frames(self.meters.frames(), self.sample_rate)
    }

    fn input_available(&self) -> bool {
        self.input_stream.is_some()
    }
}

/// The recorder is the session-side end of the recording path; takes show up
/// on its event channel.
pub fn start_audio(
    graph: &GraphSpec,
    guitar: &GuitarSpec,
) -> anyhow::Result<(AudioHandle, Recorder)> {
    let (tx, rx) = crossbeam_channel::bounded::<AudioCommand>(COMMAND_QUEUE);

    let host = cpal::default_host();
    let device = host.default_output_device().context("no default output device")?;
    let config = device.default_output_config().context("no default output config")?;

    let sample_rate = config.sample_rate();
    let channels = config.channels() as usize;

    let (input_tx, input_rx) = crossbeam_channel::bounded::<Vec<StereoFrame>>(2048);
    let (recorder, tap) = recorder::channel(sample_rate);

    let mut engine = Engine::new(sample_rate, graph, guitar, MAX_BLOCK);
    engine.set_input_rx(input_rx);
    engine.set_record_tap(tap);
    let meters = engine.meters();

    match config.sample_format() {
        cpal::SampleFormat::F32 => {
            let output_stream =
                build_output_stream_f32(&device, &config.into(), rx, engine, channels)?;
            output_stream.play().context("failed to play output stream")?;

            let input_stream = try_build_input_stream(&host, sample_rate, input_tx);
            log::info!(
                target: "audio",
                "output running at {sample_rate} Hz, {channels} channels, input {}",
                if input_stream.is_some() { "available" } else { "unavailable" }
            );

            let handle = AudioHandle {
                tx,
                meters,
                sample_rate,
                _output_stream: output_stream,
                input_stream,
            };
            Ok((handle, recorder))
        }
        other => anyhow::bail!("unsupported sample format {other:?} (only f32 supported for now)"),
    }
}

// ── Output stream ─────────────────────────────────────────────────

fn build_output_stream_f32(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    rx: Receiver<AudioCommand>,
    mut engine: Engine,
    channels: usize,
) -> anyhow::Result<cpal::Stream> {
    let err_fn = |err| log::error!(target: "audio", "output stream error: {err}");
    let mut scratch = vec![StereoFrame::zero(); MAX_BLOCK];

    let stream = device.build_output_stream(
        config,
        move |data: &mut [f32], _info| {
            while let Ok(cmd) = rx.try_recv() {
                engine.handle_cmd(cmd);
            }
            engine.drain_input();

            let n_frames = data.len() / channels.max(1);
            if channels == 2 {
                let frames: &mut [StereoFrame] = unsafe {
                    // StereoFrame is repr(C) { f32, f32 }, same layout as one interleaved pair
                    std::slice::from_raw_parts_mut(data.as_mut_ptr() as *mut StereoFrame, n_frames)
                };
                engine.render_block(frames);
            } else {
                if scratch.len() < n_frames {
                    scratch.resize(n_frames, StereoFrame::zero());
                }
                let frames = &mut scratch[..n_frames];
                engine.render_block(frames);
                for (out, f) in data.chunks_exact_mut(channels).zip(frames.iter()) {
                    match out {
                        [mono] => *mono = (f.left + f.right) * 0.5,
                        [l, r, rest @ ..] => {
                            *l = f.left;
                            *r = f.right;
                            rest.fill(0.0);
                        }
                        [] => {}
                    }
                }
            }
        },
        err_fn,
        None,
    )?;

    Ok(stream)
}

fn try_build_input_stream(
    host: &cpal::Host,
    target_sample_rate: cpal::SampleRate,
    tx: Sender<Vec<StereoFrame>>,
) -> Option<cpal::Stream> {
    let Some(device) = host.default_input_device() else {
        log::warn!(target: "audio", "no default input device, guitar input disabled");
        return None;
    };

    let supported = match device.default_input_config() {
        Ok(c) => c,
        Err(e) => {
            log::warn!(target: "audio", "no usable input config: {e}");
            return None;
        }
    };
    let mut stream_config: cpal::StreamConfig = supported.into();
    stream_config.sample_rate = target_sample_rate;

    let in_channels = stream_config.channels as usize;

    let err_fn = |err| log::error!(target: "audio", "input stream error: {err}");

    let stream = device
        .build_input_stream(
            &stream_config,
            move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                let frames: Vec<StereoFrame> = if in_channels == 1 {
                    data.iter().map(|&s| StereoFrame::mono(s)).collect()
                } else {
                    data.chunks_exact(in_channels)
                        .map(|c| StereoFrame { left: c[0], right: c[1] })
                        .collect()
                };
                let _ = tx.try_send(frames);
            },
            err_fn,
            None,
        )
        .map_err(|e| log::warn!(target: "audio", "could not open input stream: {e}"))
        .ok()?;

    if let Err(e) = stream.play() {
        log::warn!(target: "audio", "could not start input stream: {e}");
        return None;
    }

    Some(stream)
}
