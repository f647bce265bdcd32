use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::error::Error;
use crate::keymap::KeySpec;

/// Something that can sound a key. Errors are reported, never fatal.
pub trait NoteSink {
    fn note_on(&mut self, key: &KeySpec) -> Result<(), Error>;
    fn note_off(&mut self, key: &KeySpec) -> Result<(), Error>;
}

/// A command for the synth, identified by frequency in Hz.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NoteCommand {
    On(f32),
    Off(f32),
}

const MAX_VOICES: usize = 16;
const ATTACK_SECS: f32 = 0.005;
const DECAY_SECS: f32 = 0.1;
const SUSTAIN_LEVEL: f32 = 0.3;
const RELEASE_SECS: f32 = 0.5;
/// Headroom so a full chord stays under full scale.
const VOICE_GAIN: f32 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Stage {
    Attack,
    Decay,
    Sustain,
    Release,
}

struct Voice {
    frequency: f32,
    phase: f32,
    level: f32,
    stage: Stage,
    /// Monotonic start counter, used to steal the oldest voice.
    started: u64,
}

/// Polyphonic triangle-wave synth with a simple ADSR envelope.
pub struct Synth {
    sample_rate: f32,
    voices: Vec<Voice>,
    started: u64,
}

impl Synth {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            sample_rate,
            voices: Vec::with_capacity(MAX_VOICES),
            started: 0,
        }
    }

    #[cfg(test)]
    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }

    pub fn handle(&mut self, command: NoteCommand) {
        match command {
            NoteCommand::On(frequency) => self.start(frequency),
            NoteCommand::Off(frequency) => {
                for v in self.voices.iter_mut().filter(|v| v.frequency == frequency) {
                    v.stage = Stage::Release;
                }
            }
        }
    }

    fn start(&mut self, frequency: f32) {
        self.started += 1;
        // Retrigger an existing voice on the same pitch instead of stacking.
        if let Some(v) = self.voices.iter_mut().find(|v| v.frequency == frequency) {
            v.stage = Stage::Attack;
            v.started = self.started;
            return;
        }
        if self.voices.len() >= MAX_VOICES {
            if let Some(oldest) = self
                .voices
                .iter()
                .enumerate()
                .min_by_key(|(_, v)| v.started)
                .map(|(i, _)| i)
            {
                self.voices.swap_remove(oldest);
            }
        }
        self.voices.push(Voice {
            frequency,
            phase: 0.0,
            level: 0.0,
            stage: Stage::Attack,
            started: self.started,
        });
    }

    /// Render one mono sample per frame into every output channel.
    pub fn render(&mut self, out: &mut [Vec<f32>]) {
        let frames = out.first().map_or(0, |ch| ch.len());
        let attack_step = 1.0 / (ATTACK_SECS * self.sample_rate);
        let decay_step = (1.0 - SUSTAIN_LEVEL) / (DECAY_SECS * self.sample_rate);
        let release_step = SUSTAIN_LEVEL / (RELEASE_SECS * self.sample_rate);

        for frame in 0..frames {
            let mut sample = 0.0_f32;
            for v in self.voices.iter_mut() {
                match v.stage {
                    Stage::Attack => {
                        v.level += attack_step;
                        if v.level >= 1.0 {
                            v.level = 1.0;
                            v.stage = Stage::Decay;
                        }
                    }
                    Stage::Decay => {
                        v.level -= decay_step;
                        if v.level <= SUSTAIN_LEVEL {
                            v.level = SUSTAIN_LEVEL;
                            v.stage = Stage::Sustain;
                        }
                    }
                    Stage::Sustain => {}
                    Stage::Release => v.level = (v.level - release_step).max(0.0),
                }
                // Triangle from a 0..1 phase accumulator.
                let tri = 4.0 * (v.phase - 0.5).abs() - 1.0;
                sample += tri * v.level * VOICE_GAIN;
                v.phase += v.frequency / self.sample_rate;
                if v.phase >= 1.0 {
                    v.phase -= 1.0;
                }
            }
            let sample = sample.clamp(-1.0, 1.0);
            for ch in out.iter_mut() {
                ch[frame] = sample;
            }
        }

        self.voices
            .retain(|v| !(v.stage == Stage::Release && v.level <= 0.0));
    }
}

/// Output device settings.
#[derive(Debug, Clone)]
pub struct AudioSettings {
    pub device: Option<String>,
    pub sample_rate: u32,
    pub buffer_size: u32,
}

pub struct AudioEngine {
    stream: cpal::Stream,
}

impl AudioEngine {
    /// Stop the audio stream.
    pub fn stop(self) {
        if let Err(e) = self.stream.pause() {
            log::warn!("Failed to pause audio stream: {e}");
        }
        drop(self.stream);
        log::info!("Audio stream stopped");
    }

    pub fn start(
        mut synth: Synth,
        note_rx: Receiver<NoteCommand>,
        settings: &AudioSettings,
    ) -> anyhow::Result<Self> {
        let host = cpal::default_host();

        let device = if let Some(name) = settings.device.as_deref() {
            host.output_devices()?
                .find(|d| d.name().map(|n| n.contains(name)).unwrap_or(false))
                .ok_or_else(|| anyhow::anyhow!("Audio device not found: {name}"))?
        } else {
            host.default_output_device()
                .ok_or_else(|| anyhow::anyhow!("No default audio output device"))?
        };

        let dev_name = device.name().unwrap_or_else(|_| "Unknown".into());
        log::info!("Using audio device: {dev_name}");

        let num_channels = 2;
        let config = cpal::StreamConfig {
            channels: num_channels as u16,
            sample_rate: cpal::SampleRate(settings.sample_rate),
            buffer_size: cpal::BufferSize::Fixed(settings.buffer_size),
        };

        log::info!(
            "Audio config: {}ch, {}Hz, buffer={}",
            num_channels,
            settings.sample_rate,
            settings.buffer_size
        );

        // Buffers live in the closure and are reused every callback.
        let mut channel_bufs: Vec<Vec<f32>> = (0..num_channels)
            .map(|_| vec![0.0f32; settings.buffer_size as usize])
            .collect();

        let stream = device.build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                while let Ok(command) = note_rx.try_recv() {
                    synth.handle(command);
                }

                let frames = data.len() / num_channels;
                for buf in channel_bufs.iter_mut() {
                    buf.resize(frames, 0.0);
                }
                synth.render(&mut channel_bufs);

                // Interleave into the cpal buffer
                for frame in 0..frames {
                    for ch in 0..num_channels {
                        data[frame * num_channels + ch] = channel_bufs[ch][frame];
                    }
                }
            },
            move |err| {
                log::error!("Audio stream error: {err}");
            },
            None,
        )?;

        stream.play()?;
        log::info!("Audio stream started");

        Ok(AudioEngine { stream })
    }
}

enum EngineState {
    Idle,
    Running(AudioEngine),
    Failed,
    Stopped,
}

/// Owns the synth and its output stream. The stream opens on the first
/// trigger; commands sent before then wait in the channel.
pub struct LazyAudio {
    settings: AudioSettings,
    note_tx: Sender<NoteCommand>,
    note_rx: Receiver<NoteCommand>,
    state: EngineState,
}

const NOTE_QUEUE: usize = 256;

impl LazyAudio {
    pub fn new(settings: AudioSettings) -> Self {
        let (note_tx, note_rx) = crossbeam_channel::bounded(NOTE_QUEUE);
        Self {
            settings,
            note_tx,
            note_rx,
            state: EngineState::Idle,
        }
    }

    /// Open the output stream once. Later calls are no-ops, even after a
    /// failure or `stop`; returns whether audio is available.
    pub fn initialize_once(&mut self) -> bool {
        if let EngineState::Idle = self.state {
            let synth = Synth::new(self.settings.sample_rate as f32);
            self.state = match AudioEngine::start(synth, self.note_rx.clone(), &self.settings) {
                Ok(engine) => EngineState::Running(engine),
                Err(e) => {
                    log::warn!("Audio unavailable, continuing silently: {e:#}");
                    EngineState::Failed
                }
            };
        }
        matches!(self.state, EngineState::Running(_))
    }

    fn send(&mut self, command: NoteCommand) -> Result<(), Error> {
        if !self.initialize_once() {
            return Ok(());
        }
        match self.note_tx.try_send(command) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(Error::AudioTrigger("note queue full".into())),
            Err(TrySendError::Disconnected(_)) => {
                Err(Error::AudioTrigger("audio stream gone".into()))
            }
        }
    }

    /// Close the stream. Later triggers are dropped.
    pub fn stop(&mut self) {
        if let EngineState::Running(engine) = std::mem::replace(&mut self.state, EngineState::Stopped) {
            engine.stop();
        }
    }
}

impl NoteSink for LazyAudio {
    fn note_on(&mut self, key: &KeySpec) -> Result<(), Error> {
        self.send(NoteCommand::On(key.frequency))
    }

    fn note_off(&mut self, key: &KeySpec) -> Result<(), Error> {
        self.send(NoteCommand::Off(key.frequency))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: f32 = 48000.0;

    fn render(synth: &mut Synth, frames: usize) -> Vec<f32> {
        let mut out = vec![vec![0.0; frames], vec![0.0; frames]];
        synth.render(&mut out);
        assert_eq!(out[0], out[1]);
        out.swap_remove(0)
    }

    fn peak(samples: &[f32]) -> f32 {
        samples.iter().fold(0.0f32, |m, &s| m.max(s.abs()))
    }

    #[test]
    fn silent_without_notes() {
        let mut synth = Synth::new(RATE);
        assert_eq!(peak(&render(&mut synth, 256)), 0.0);
    }

    #[test]
    fn note_on_produces_sound() {
        let mut synth = Synth::new(RATE);
        synth.handle(NoteCommand::On(440.0));
        assert!(peak(&render(&mut synth, 1024)) > 0.05);
        assert_eq!(synth.active_voices(), 1);
    }

    #[test]
    fn release_fades_out_and_frees_voice() {
        let mut synth = Synth::new(RATE);
        synth.handle(NoteCommand::On(440.0));
        render(&mut synth, 4800);
        synth.handle(NoteCommand::Off(440.0));
        render(&mut synth, 48000);
        assert_eq!(synth.active_voices(), 0);
        assert_eq!(peak(&render(&mut synth, 256)), 0.0);
    }

    #[test]
    fn same_pitch_retriggers() {
        let mut synth = Synth::new(RATE);
        synth.handle(NoteCommand::On(261.63));
        synth.handle(NoteCommand::On(261.63));
        assert_eq!(synth.active_voices(), 1);
    }

    #[test]
    fn oldest_voice_stolen() {
        let mut synth = Synth::new(RATE);
        for i in 0..(MAX_VOICES + 2) {
            synth.handle(NoteCommand::On(100.0 + i as f32));
        }
        assert_eq!(synth.active_voices(), MAX_VOICES);
        assert!(!synth.voices.iter().any(|v| v.frequency == 100.0));
        assert!(synth.voices.iter().any(|v| v.frequency == 100.0 + (MAX_VOICES + 1) as f32));
    }

    #[test]
    fn stopped_audio_drops_triggers() {
        let mut audio = LazyAudio::new(AudioSettings {
            device: None,
            sample_rate: 48000,
            buffer_size: 512,
        });
        audio.stop();
        assert!(!audio.initialize_once());
        assert!(audio.note_on(&crate::keymap::KEYS[0]).is_ok());
        assert!(audio.note_rx.is_empty());
    }

    #[test]
    fn chord_stays_in_range() {
        let mut synth = Synth::new(RATE);
        for f in [261.63, 329.63, 392.0] {
            synth.handle(NoteCommand::On(f));
        }
        let out = render(&mut synth, 2048);
        assert!(peak(&out) <= 1.0);
    }
}
