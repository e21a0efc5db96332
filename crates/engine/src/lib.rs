//! Realtime side of the studio: one cpal output stream that mixes
//! independently controlled clip voices, and cpal input streams for capture.
//!
//! The control thread talks to the callback only through `rtrb` ring buffers.
//! Clip buffers cross over as `basedrop::Shared` so the callback never frees
//! memory; call [`AudioEngineHandle::collect`] regularly to reclaim it.

pub mod capture;

use basedrop::{Collector, Handle, Shared};
use cpal::{
    FromSample, SizedSample,
    traits::{DeviceTrait, HostTrait, StreamTrait},
};
use studio_transport::{AudioArc, ClipId, TrackId};

const MAX_VOICES: usize = 256;
const MAX_TRACKS: usize = 64;

pub enum Command {
    /// Make a clip's audio available to the callback. The buffer must already
    /// be at the engine's sample rate.
    Load {
        clip: ClipId,
        track: TrackId,
        audio: Shared<AudioArc>,
    },
    AssignTrack {
        clip: ClipId,
        track: TrackId,
    },
    Play {
        clip: ClipId,
        position_secs: f64,
    },
    Pause {
        clip: ClipId,
    },
    SetGain {
        track: TrackId,
        gain: f32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// A voice ran off the end of its buffer.
    Finished(ClipId),
}

struct Voice {
    clip: ClipId,
    track: TrackId,
    audio: Shared<AudioArc>,
    frame: usize,
    playing: bool,
}

pub struct AudioEngineHandle {
    commands: rtrb::Producer<Command>,
    status: rtrb::Consumer<Status>,
    collector: Collector,
    handle: Handle,
    sample_rate: u32,
    channels: u16,
    _stream: cpal::Stream,
}

impl AudioEngineHandle {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Handle for wrapping buffers in `Shared` before sending them.
    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    pub fn send(&mut self, command: Command) -> bool {
        match self.commands.push(command) {
            Ok(()) => true,
            Err(_) => {
                log::warn!("engine command queue full, dropping command");
                false
            }
        }
    }

    pub fn poll_status(&mut self) -> Option<Status> {
        self.status.pop().ok()
    }

    /// Free buffers the callback has let go of.
    pub fn collect(&mut self) {
        self.collector.collect();
    }
}

pub fn start() -> anyhow::Result<AudioEngineHandle> {
    let collector = Collector::new();
    let handle = collector.handle();

    let (command_tx, command_rx) = rtrb::RingBuffer::<Command>::new(256);
    let (status_tx, status_rx) = rtrb::RingBuffer::<Status>::new(256);

    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| anyhow::anyhow!("no output device found"))?;

    let config = device.default_output_config()?;
    let sample_format = config.sample_format();
    let stream_config: cpal::StreamConfig = config.into();
    let sample_rate = stream_config.sample_rate.0;
    let channels = stream_config.channels;

    let stream = match sample_format {
        cpal::SampleFormat::F32 => {
            build_stream::<f32>(&device, &stream_config, command_rx, status_tx)?
        }
        cpal::SampleFormat::I16 => {
            build_stream::<i16>(&device, &stream_config, command_rx, status_tx)?
        }
        sample_format => anyhow::bail!("unsupported sample format '{sample_format}'"),
    };

    stream.play()?;
    log::info!("output stream running at {sample_rate} Hz, {channels} channels");

    Ok(AudioEngineHandle {
        commands: command_tx,
        status: status_rx,
        collector,
        handle,
        sample_rate,
        channels,
        _stream: stream,
    })
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut command_rx: rtrb::Consumer<Command>,
    mut status_tx: rtrb::Producer<Status>,
) -> anyhow::Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let output_channels = config.channels as usize;
    let sample_rate = config.sample_rate.0 as f64;

    let mut voices: Vec<Voice> = Vec::with_capacity(MAX_VOICES);
    let mut gains: Vec<(TrackId, f32)> = Vec::with_capacity(MAX_TRACKS);

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            while let Ok(command) = command_rx.pop() {
                apply_command(command, &mut voices, &mut gains, sample_rate);
            }

            for frame in data.chunks_mut(output_channels) {
                for (ch, out) in frame.iter_mut().enumerate() {
                    let mut mixed = 0.0f32;
                    for voice in voices.iter().filter(|v| v.playing) {
                        let clip_channels = voice.audio.channels() as usize;
                        let idx = voice.frame * clip_channels + ch % clip_channels;
                        if let Some(sample) = voice.audio.samples().get(idx) {
                            mixed += sample * track_gain(&gains, voice.track);
                        }
                    }
                    *out = T::from_sample(mixed);
                }

                for voice in voices.iter_mut().filter(|v| v.playing) {
                    voice.frame += 1;
                    if voice.frame >= voice.audio.frames() {
                        voice.playing = false;
                        let _ = status_tx.push(Status::Finished(voice.clip));
                    }
                }
            }
        },
        |err| log::error!("output stream error: {err}"),
        None,
    )?;

    Ok(stream)
}

fn apply_command(
    command: Command,
    voices: &mut Vec<Voice>,
    gains: &mut Vec<(TrackId, f32)>,
    sample_rate: f64,
) {
    match command {
        Command::Load { clip, track, audio } => {
            if let Some(voice) = voices.iter_mut().find(|v| v.clip == clip) {
                voice.audio = audio;
                voice.track = track;
                voice.frame = 0;
                voice.playing = false;
            } else if voices.len() < voices.capacity() {
                voices.push(Voice {
                    clip,
                    track,
                    audio,
                    frame: 0,
                    playing: false,
                });
            }
        }
        Command::AssignTrack { clip, track } => {
            if let Some(voice) = voices.iter_mut().find(|v| v.clip == clip) {
                voice.track = track;
            }
        }
        Command::Play {
            clip,
            position_secs,
        } => {
            if let Some(voice) = voices.iter_mut().find(|v| v.clip == clip) {
                voice.frame = (position_secs.max(0.0) * sample_rate) as usize;
                voice.playing = voice.frame < voice.audio.frames();
            }
        }
        Command::Pause { clip } => {
            if let Some(voice) = voices.iter_mut().find(|v| v.clip == clip) {
                voice.playing = false;
            }
        }
        Command::SetGain { track, gain } => {
            if let Some(entry) = gains.iter_mut().find(|(t, _)| *t == track) {
                entry.1 = gain;
            } else if gains.len() < gains.capacity() {
                gains.push((track, gain));
            }
        }
    }
}

fn track_gain(gains: &[(TrackId, f32)], track: TrackId) -> f32 {
    gains
        .iter()
        .find(|(t, _)| *t == track)
        .map_or(1.0, |(_, gain)| *gain)
}
