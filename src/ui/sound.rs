/// Sound engine: procedural 8-bit style effects and music loops via rodio.
///
/// Effect buffers are generated as in-memory WAV data at init time and
/// played fire-and-forget, one detached Sink each. Detune is applied as a
/// playback speed change. Music loops forever on its own Sink until another
/// key replaces it.
///
/// Compile without the "sound" feature to disable audio entirely (the stub
/// SoundEngine does nothing).

use crate::domain::effect::Effect;

/// Playback speed for a detune in cents: 1200 cents is one octave.
pub fn detune_ratio(cents: i32) -> f32 {
    2f32.powf(cents as f32 / 1200.0)
}

impl SoundEngine {
    /// Play whatever audio an effect asks for; other effects are ignored.
    pub fn apply(&mut self, effect: &Effect) {
        match effect {
            Effect::PlaySound { key, volume, detune } => self.play(*key, *volume, *detune),
            Effect::PlayMusic { key, volume } => self.play_music(key, *volume),
            _ => {}
        }
    }
}

#[cfg(feature = "sound")]
mod inner {
    use std::collections::HashMap;
    use std::io::Cursor;
    use std::sync::Arc;

    use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink, Source};
    use tracing::debug;

    use super::detune_ratio;
    use crate::domain::effect::SoundKey;

    const SAMPLE_RATE: u32 = 22050;
    const TAU: f32 = std::f32::consts::PI * 2.0;

    pub struct SoundEngine {
        _stream: OutputStream,
        handle: OutputStreamHandle,
        sfx: HashMap<SoundKey, Arc<Vec<u8>>>,
        music: Option<(String, Sink)>,
    }

    impl SoundEngine {
        pub fn new() -> Option<Self> {
            let (stream, handle) = OutputStream::try_default().ok()?;

            let sfx = [
                (SoundKey::Jump, gen_jump()),
                (SoundKey::Land, gen_land()),
                (SoundKey::Collect, gen_collect()),
                (SoundKey::Step, gen_step()),
                (SoundKey::Slide, gen_slide()),
                (SoundKey::Fail, gen_fail()),
            ]
            .into_iter()
            .map(|(key, samples)| (key, Arc::new(make_wav(&samples))))
            .collect();

            Some(SoundEngine { _stream: stream, handle, sfx, music: None })
        }

        pub fn play(&mut self, key: SoundKey, volume: f32, detune: i32) {
            let Some(buf) = self.sfx.get(&key) else { return };
            if let Ok(sink) = Sink::try_new(&self.handle) {
                if let Ok(src) = Decoder::new(Cursor::new(buf.as_ref().clone())) {
                    sink.set_volume(volume);
                    sink.set_speed(detune_ratio(detune));
                    sink.append(src);
                    sink.detach(); // fire-and-forget
                }
            }
        }

        /// Start a music loop. The same key already playing keeps going, so a
        /// level restart does not restart the tune.
        pub fn play_music(&mut self, key: &str, volume: f32) {
            if let Some((current, sink)) = &self.music {
                if current == key {
                    sink.set_volume(volume);
                    return;
                }
            }
            self.stop_music();
            let Ok(sink) = Sink::try_new(&self.handle) else { return };
            let buf = make_wav(&gen_tune(key));
            match Decoder::new(Cursor::new(buf)) {
                Ok(src) => {
                    sink.set_volume(volume);
                    sink.append(src.repeat_infinite());
                    debug!(key, "music started");
                    self.music = Some((key.to_string(), sink));
                }
                Err(e) => debug!(key, "music decode failed: {e}"),
            }
        }

        pub fn stop_music(&mut self) {
            if let Some((_, sink)) = self.music.take() {
                sink.stop();
            }
        }
    }

    // ════════════════════════════════════════════════════════════
    //  Waveform generators: mono f32 samples
    // ════════════════════════════════════════════════════════════

    fn samples_for(duration: f32) -> usize {
        (SAMPLE_RATE as f32 * duration) as usize
    }

    /// Append one enveloped note. `shape` mixes in the 2nd/3rd harmonic.
    fn push_note(out: &mut Vec<f32>, freq: f32, duration: f32, gain: f32, shape: f32) {
        let n = samples_for(duration);
        for i in 0..n {
            let t = i as f32 / SAMPLE_RATE as f32;
            let env = 1.0 - (i as f32 / n as f32).powf(0.6);
            let wave = (t * freq * TAU).sin() * (1.0 - shape) + (t * freq * 3.0 * TAU).sin() * shape;
            out.push(wave * env * gain);
        }
    }

    /// Jump: quick upward sweep
    fn gen_jump() -> Vec<f32> {
        let n = samples_for(0.12);
        let mut phase = 0.0f32;
        (0..n)
            .map(|i| {
                let t = i as f32 / n as f32;
                phase += (300.0 + t * 500.0) / SAMPLE_RATE as f32;
                (phase * TAU).sin() * (1.0 - t) * 0.25
            })
            .collect()
    }

    /// Land: low thump
    fn gen_land() -> Vec<f32> {
        let mut out = vec![];
        push_note(&mut out, 110.0, 0.08, 0.35, 0.2);
        out
    }

    /// Collect: bright ascending arpeggio E6→G6→B6
    fn gen_collect() -> Vec<f32> {
        let mut out = vec![];
        for freq in [1319.0, 1568.0, 1976.0] {
            push_note(&mut out, freq, 0.05, 0.22, 0.3);
        }
        out
    }

    /// Step: short noisy tick
    fn gen_step() -> Vec<f32> {
        noise_burst(0.035, 0.18, 7)
    }

    /// Wall slide: longer, softer hiss
    fn gen_slide() -> Vec<f32> {
        noise_burst(0.2, 0.12, 99)
    }

    fn noise_burst(duration: f32, gain: f32, seed: u32) -> Vec<f32> {
        let n = samples_for(duration);
        let mut rng = seed;
        (0..n)
            .map(|i| {
                // LCG noise keeps buffers identical from run to run
                rng = rng.wrapping_mul(1103515245).wrapping_add(12345);
                let noise = (rng as f32 / u32::MAX as f32) * 2.0 - 1.0;
                let env = 1.0 - i as f32 / n as f32;
                noise * env * gain
            })
            .collect()
    }

    /// Fail: descending minor run
    fn gen_fail() -> Vec<f32> {
        let mut out = vec![];
        for freq in [392.0, 311.0, 262.0, 196.0] {
            push_note(&mut out, freq, 0.1, 0.3, 0.1);
        }
        out
    }

    /// Four-bar loop picked by music key. Unknown keys get the default tune.
    fn gen_tune(key: &str) -> Vec<f32> {
        let melody: &[f32] = match key {
            "dusk" => &[220.0, 262.0, 330.0, 262.0, 196.0, 247.0, 294.0, 247.0],
            "caves" => &[294.0, 349.0, 440.0, 349.0, 330.0, 392.0, 494.0, 392.0],
            _ => &[262.0, 330.0, 392.0, 330.0, 349.0, 440.0, 523.0, 440.0],
        };
        let mut out = vec![];
        for _ in 0..2 {
            for &freq in melody {
                push_note(&mut out, freq, 0.22, 0.12, 0.25);
                push_note(&mut out, freq / 2.0, 0.08, 0.06, 0.0);
            }
        }
        out
    }

    // ════════════════════════════════════════════════════════════
    //  WAV encoder: 16-bit mono PCM
    // ════════════════════════════════════════════════════════════

    fn make_wav(samples: &[f32]) -> Vec<u8> {
        let data_size = samples.len() as u32 * 2;
        let mut buf = Vec::with_capacity(44 + data_size as usize);

        buf.extend_from_slice(b"RIFF");
        buf.extend_from_slice(&(36 + data_size).to_le_bytes());
        buf.extend_from_slice(b"WAVE");

        buf.extend_from_slice(b"fmt ");
        buf.extend_from_slice(&16u32.to_le_bytes());
        buf.extend_from_slice(&1u16.to_le_bytes()); // PCM
        buf.extend_from_slice(&1u16.to_le_bytes()); // mono
        buf.extend_from_slice(&SAMPLE_RATE.to_le_bytes());
        buf.extend_from_slice(&(SAMPLE_RATE * 2).to_le_bytes()); // byte rate
        buf.extend_from_slice(&2u16.to_le_bytes()); // block align
        buf.extend_from_slice(&16u16.to_le_bytes());

        buf.extend_from_slice(b"data");
        buf.extend_from_slice(&data_size.to_le_bytes());
        for &s in samples {
            let val = (s.clamp(-1.0, 1.0) * 32767.0) as i16;
            buf.extend_from_slice(&val.to_le_bytes());
        }
        buf
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn wav_header_matches_payload() {
            let wav = make_wav(&[0.0, 1.0, -1.0]);
            assert_eq!(wav.len(), 44 + 6);
            assert_eq!(&wav[0..4], b"RIFF");
            assert_eq!(u32::from_le_bytes([wav[40], wav[41], wav[42], wav[43]]), 6);
            assert_eq!(i16::from_le_bytes([wav[46], wav[47]]), 32767);
        }

        #[test]
        fn every_effect_has_audible_samples() {
            for samples in [gen_jump(), gen_land(), gen_collect(), gen_step(), gen_slide(), gen_fail()] {
                assert!(!samples.is_empty());
                assert!(samples.iter().all(|s| s.abs() <= 1.0));
            }
        }
    }
}

// ════════════════════════════════════════════════════════════
//  Public API: no-ops when the sound feature is off
// ════════════════════════════════════════════════════════════

#[cfg(feature = "sound")]
pub use inner::SoundEngine;

#[cfg(not(feature = "sound"))]
pub struct SoundEngine;

#[cfg(not(feature = "sound"))]
impl SoundEngine {
    pub fn new() -> Option<Self> { Some(SoundEngine) }
    pub fn play(&mut self, _key: crate::domain::effect::SoundKey, _volume: f32, _detune: i32) {}
    pub fn play_music(&mut self, _key: &str, _volume: f32) {}
    pub fn stop_music(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detune_is_in_cents() {
        assert_eq!(detune_ratio(0), 1.0);
        assert!((detune_ratio(1200) - 2.0).abs() < 1e-5);
        assert!((detune_ratio(-1200) - 0.5).abs() < 1e-5);
        assert!(detune_ratio(-100) < 1.0);
    }
}
