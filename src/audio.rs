//! Narration playback: decoding the generator's base64 PCM and tracking
//! the player state over an output device port.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;
use tracing::debug;

use crate::error::{AppError, Result};
use crate::state::{ContentEntry, EntryStatus};

/// Narration arrives as signed 16-bit little-endian mono PCM at this rate.
pub const NARRATION_SAMPLE_RATE: u32 = 24_000;

#[derive(Debug, Clone, PartialEq)]
pub struct PcmBuffer {
    pub sample_rate: u32,
    /// Mono samples in [-1.0, 1.0).
    pub samples: Vec<f32>,
}

impl PcmBuffer {
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.samples.len() as f64 / f64::from(self.sample_rate))
    }

    /// A complete 16-bit mono WAV file.
    pub fn to_wav(&self) -> Vec<u8> {
        let data_len = (self.samples.len() * 2) as u32;
        let mut out = Vec::with_capacity(44 + data_len as usize);
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + data_len).to_le_bytes());
        out.extend_from_slice(b"WAVEfmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes()); // PCM
        out.extend_from_slice(&1u16.to_le_bytes()); // mono
        out.extend_from_slice(&self.sample_rate.to_le_bytes());
        out.extend_from_slice(&(self.sample_rate * 2).to_le_bytes());
        out.extend_from_slice(&2u16.to_le_bytes());
        out.extend_from_slice(&16u16.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&data_len.to_le_bytes());
        for sample in &self.samples {
            let value = (sample * 32768.0).round().clamp(-32768.0, 32767.0) as i16;
            out.extend_from_slice(&value.to_le_bytes());
        }
        out
    }
}

/// Decodes base64 PCM. A trailing odd byte is ignored.
pub fn decode_pcm(encoded: &str) -> Result<PcmBuffer> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| AppError::ParseError(format!("Invalid audio payload: {}", e)))?;
    let samples = bytes
        .chunks_exact(2)
        .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / 32768.0)
        .collect();
    Ok(PcmBuffer {
        sample_rate: NARRATION_SAMPLE_RATE,
        samples,
    })
}

/// The device narration is played on.
pub trait AudioOutput: Send {
    fn play(&mut self, buffer: PcmBuffer) -> Result<()>;
    fn suspend(&mut self) -> Result<()>;
    fn resume(&mut self) -> Result<()>;
    fn stop(&mut self) -> Result<()>;
}

/// Output that renders narration to a WAV file instead of a device. The
/// HTTP layer hands the file to the client, which plays it.
#[derive(Debug, Default)]
pub struct WavRecorder {
    wav: Option<Vec<u8>>,
}

impl WavRecorder {
    /// The last buffer played, as a WAV file.
    pub fn into_wav(self) -> Option<Vec<u8>> {
        self.wav
    }
}

impl AudioOutput for WavRecorder {
    fn play(&mut self, buffer: PcmBuffer) -> Result<()> {
        self.wav = Some(buffer.to_wav());
        Ok(())
    }

    fn suspend(&mut self) -> Result<()> {
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.wav = None;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Idle,
    Loading,
    Playing,
    Paused,
}

/// Play/pause control for one topic's narration. It only reads the audio
/// entry; requesting narration is the orchestrator's job.
pub struct NarrationPlayer<O: AudioOutput> {
    output: O,
    state: PlaybackState,
}

impl<O: AudioOutput> NarrationPlayer<O> {
    pub fn new(output: O) -> Self {
        Self {
            output,
            state: PlaybackState::Idle,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    pub fn into_output(self) -> O {
        self.output
    }

    /// Play, pause or resume depending on the current state and what the
    /// audio entry holds.
    pub fn toggle(&mut self, entry: Option<&ContentEntry<String>>) -> Result<PlaybackState> {
        self.state = match self.state {
            PlaybackState::Playing => {
                self.output.suspend()?;
                PlaybackState::Paused
            }
            PlaybackState::Paused => {
                self.output.resume()?;
                PlaybackState::Playing
            }
            PlaybackState::Idle | PlaybackState::Loading => match entry {
                Some(entry) => match (entry.status(), entry.data()) {
                    (EntryStatus::Loading, _) => PlaybackState::Loading,
                    (EntryStatus::Ready, Some(data)) => {
                        let buffer = decode_pcm(data)?;
                        debug!(duration = ?buffer.duration(), "Starting narration");
                        self.output.play(buffer)?;
                        PlaybackState::Playing
                    }
                    _ => PlaybackState::Idle,
                },
                None => PlaybackState::Idle,
            },
        };
        Ok(self.state)
    }

    /// End-of-playback notification from the device.
    pub fn finished(&mut self) {
        self.state = PlaybackState::Idle;
    }

    pub fn stop(&mut self) -> Result<()> {
        if matches!(self.state, PlaybackState::Playing | PlaybackState::Paused) {
            self.output.stop()?;
        }
        self.state = PlaybackState::Idle;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingOutput {
        events: Vec<String>,
    }

    impl AudioOutput for RecordingOutput {
        fn play(&mut self, buffer: PcmBuffer) -> Result<()> {
            self.events.push(format!("play {}", buffer.samples.len()));
            Ok(())
        }
        fn suspend(&mut self) -> Result<()> {
            self.events.push("suspend".into());
            Ok(())
        }
        fn resume(&mut self) -> Result<()> {
            self.events.push("resume".into());
            Ok(())
        }
        fn stop(&mut self) -> Result<()> {
            self.events.push("stop".into());
            Ok(())
        }
    }

    #[test]
    fn decodes_little_endian_samples() {
        // 0, 16384, -32768 and a dangling byte
        let encoded = STANDARD.encode([0x00, 0x00, 0x00, 0x40, 0x00, 0x80, 0x7f]);
        let buffer = decode_pcm(&encoded).unwrap();
        assert_eq!(buffer.samples, vec![0.0, 0.5, -1.0]);
        assert_eq!(buffer.sample_rate, NARRATION_SAMPLE_RATE);
        assert!(decode_pcm("***").is_err());
    }

    #[test]
    fn wav_header_describes_the_samples() {
        let buffer = PcmBuffer { sample_rate: NARRATION_SAMPLE_RATE, samples: vec![0.0; 24_000] };
        assert_eq!(buffer.duration(), Duration::from_secs(1));
        let wav = buffer.to_wav();
        assert_eq!(&wav[..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(wav.len(), 44 + 48_000);
        assert_eq!(u32::from_le_bytes([wav[24], wav[25], wav[26], wav[27]]), 24_000);
    }

    #[test]
    fn toggle_walks_through_playback_states() {
        let mut player = NarrationPlayer::new(RecordingOutput::default());

        let loading: ContentEntry<String> = ContentEntry::loading();
        assert_eq!(player.toggle(Some(&loading)).unwrap(), PlaybackState::Loading);

        let ready = ContentEntry::success(STANDARD.encode([0u8; 8]));
        assert_eq!(player.toggle(Some(&ready)).unwrap(), PlaybackState::Playing);
        assert_eq!(player.toggle(Some(&ready)).unwrap(), PlaybackState::Paused);
        assert_eq!(player.toggle(Some(&ready)).unwrap(), PlaybackState::Playing);

        player.finished();
        assert_eq!(player.state(), PlaybackState::Idle);
        player.toggle(Some(&ready)).unwrap();
        player.stop().unwrap();

        assert_eq!(
            player.output().events,
            vec!["play 4", "suspend", "resume", "play 4", "stop"]
        );
    }

    #[test]
    fn wav_recorder_keeps_what_was_played() {
        let ready = ContentEntry::success(STANDARD.encode([0u8; 8]));
        let mut player = NarrationPlayer::new(WavRecorder::default());
        assert_eq!(player.toggle(Some(&ready)).unwrap(), PlaybackState::Playing);
        let wav = player.into_output().into_wav().unwrap();
        assert_eq!(&wav[..4], b"RIFF");
        assert_eq!(wav.len(), 44 + 8);

        let mut player = NarrationPlayer::new(WavRecorder::default());
        let loading: ContentEntry<String> = ContentEntry::loading();
        assert_eq!(player.toggle(Some(&loading)).unwrap(), PlaybackState::Loading);
        assert!(player.into_output().into_wav().is_none());
    }

    #[test]
    fn failed_or_missing_audio_stays_idle() {
        let mut player = NarrationPlayer::new(RecordingOutput::default());
        let failed: ContentEntry<String> = ContentEntry::failure("tts down");
        assert_eq!(player.toggle(Some(&failed)).unwrap(), PlaybackState::Idle);
        assert_eq!(player.toggle(None).unwrap(), PlaybackState::Idle);
        assert!(player.output().events.is_empty());
    }
}
