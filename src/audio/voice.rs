use super::frame::StereoFrame;
use super::sample_buffer::SampleBuffer;
use crate::pipeline::track::TrackKind;

// Peak level of a single note before strip gain
const VOICE_LEVEL: f32 = 0.3;

#[inline]
fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a * (1.0 - t) + b * t
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Waveform {
    Sine,
    Triangle,
    Saw,
    Noise,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Adsr {
    pub attack: f32, // seconds
    pub decay: f32,
    pub sustain: f32, // level
    pub release: f32,
}

impl Adsr {
    const fn new(attack: f32, decay: f32, sustain: f32, release: f32) -> Self {
        Self { attack, decay, sustain, release }
    }

    /// Level `t` seconds after note-on, ignoring release.
    fn held_level(&self, t: f32) -> f32 {
        if t < self.attack {
            t / self.attack.max(1e-6)
        } else if t < self.attack + self.decay {
            let d = (t - self.attack) / self.decay.max(1e-6);
            lerp(1.0, self.sustain, d)
        } else {
            self.sustain
        }
    }

    /// Level at `t` for a note released at `held` seconds.
    pub fn level(&self, t: f32, held: f32) -> f32 {
        if t < held {
            return self.held_level(t);
        }
        let from = self.held_level(held);
        let r = (t - held) / self.release.max(1e-6);
        if r >= 1.0 { 0.0 } else { from * (1.0 - r) }
    }
}

/// Oscillator and envelope for one instrument.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Patch {
    pub waveform: Waveform,
    pub env: Adsr,
    pub pitch_sweep: Option<(f32, f32)>, // (start multiplier, seconds), for the kick
}

impl Patch {
    pub fn for_kind(kind: TrackKind) -> Self {
        let (waveform, env, pitch_sweep) = match kind {
            TrackKind::Kick => {
                (Waveform::Sine, Adsr::new(0.001, 0.3, 0.01, 1.2), Some((10.0, 0.05)))
            }
            TrackKind::Snare => (Waveform::Noise, Adsr::new(0.005, 0.1, 0.0, 0.1), None),
            TrackKind::Hihat => (Waveform::Noise, Adsr::new(0.001, 0.1, 0.0, 0.01), None),
            TrackKind::Bass => (Waveform::Saw, Adsr::new(0.05, 0.3, 0.4, 0.8), None),
            TrackKind::Piano => (Waveform::Triangle, Adsr::new(0.02, 0.3, 0.4, 0.8), None),
            TrackKind::Pad => (Waveform::Sine, Adsr::new(0.1, 0.3, 0.7, 0.8), None),
            TrackKind::Lead => (Waveform::Saw, Adsr::new(0.01, 0.2, 0.3, 0.5), None),
        };
        Self { waveform, env, pitch_sweep }
    }
}

#[derive(Clone, Debug)]
pub struct SynthVoice {
    pub instrument: TrackKind,
    patch: Patch,
    freq: f32,
    phase: f32, // 0..1
    age: u64,   // frames since note-on
    held: f32,  // seconds until release
    sample_rate: f32,
    rng: u32,
    pub active: bool,
}

impl SynthVoice {
    pub fn new(instrument: TrackKind, freq: f32, held: f32, sample_rate: f32, seed: u32) -> Self {
        Self {
            instrument,
            patch: Patch::for_kind(instrument),
            freq,
            phase: 0.0,
            age: 0,
            held: held.max(0.0),
            sample_rate,
            rng: seed | 1,
            active: true,
        }
    }

    fn next_noise(&mut self) -> f32 {
        self.rng = self.rng.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        (self.rng >> 8) as f32 / (1u32 << 24) as f32 * 2.0 - 1.0
    }

    fn t(&self) -> f32 {
        self.age as f32 / self.sample_rate
    }

    /// Current envelope level; the engine steals the quietest voice first.
    pub fn level(&self) -> f32 {
        self.patch.env.level(self.t(), self.held)
    }

    fn oscillator(&mut self) -> f32 {
        let t = self.t();
        let freq = match self.patch.pitch_sweep {
            Some((mult, secs)) if t < secs => {
                // exponential glide from freq*mult down to freq
                self.freq * mult.powf(1.0 - t / secs)
            }
            _ => self.freq,
        };
        let p = self.phase;
        self.phase = (self.phase + freq / self.sample_rate).fract();
        match self.patch.waveform {
            Waveform::Sine => (p * std::f32::consts::TAU).sin(),
            Waveform::Triangle => 1.0 - 4.0 * (p - 0.5).abs(),
            Waveform::Saw => 2.0 * p - 1.0,
            Waveform::Noise => self.next_noise(),
        }
    }

    pub fn render_into(&mut self, out: &mut [StereoFrame]) {
        let end = self.held + self.patch.env.release;
        for frame in out.iter_mut() {
            let t = self.t();
            if t >= end {
                self.active = false;
                break;
            }
            let env = self.patch.env.level(t, self.held);
            let x = self.oscillator() * env * VOICE_LEVEL;
            frame.left += x;
            frame.right += x;
            self.age += 1;
        }
    }
}

/// Plays a recorded take back through the output, resampling on the fly when
/// it was captured at a different rate.
#[derive(Clone, Debug)]
pub struct SamplePlayer {
    pos: f32,
    rate: f32,
    pub gain: f32,
    pub active: bool,
}

impl SamplePlayer {
    pub fn new(buffer_rate: u32, output_rate: u32, gain: f32) -> Self {
        Self {
            pos: 0.0,
            rate: buffer_rate as f32 / output_rate.max(1) as f32,
            gain,
            active: true,
        }
    }

    pub fn render_into(&mut self, buffer: &SampleBuffer, out: &mut [StereoFrame]) {
        let data = &buffer.data;
        for frame in out.iter_mut() {
            let i = self.pos as usize;
            if i >= data.len() {
                self.active = false;
                break;
            }
            let frac = self.pos - i as f32;
            let s0 = data[i];
            let s1 = data.get(i + 1).copied().unwrap_or(s0);
            frame.left += lerp(s0.left, s1.left, frac) * self.gain;
            frame.right += lerp(s0.right, s1.right, frac) * self.gain;
            self.pos += self.rate;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn envelope_shape() {
        let env = Adsr::new(0.1, 0.1, 0.5, 0.2);
        assert_relative_eq!(env.level(0.05, 1.0), 0.5);
        assert_relative_eq!(env.level(0.1, 1.0), 1.0);
        assert_relative_eq!(env.level(0.5, 1.0), 0.5);
        assert_relative_eq!(env.level(1.1, 1.0), 0.25, epsilon = 1e-6);
        assert_eq!(env.level(1.3, 1.0), 0.0);
    }

    #[test]
    fn voice_ends_after_release() {
        let sr = 8_000.0;
        let mut v = SynthVoice::new(TrackKind::Lead, 440.0, 0.1, sr, 7);
        let mut buf = vec![StereoFrame::zero(); 8_000];
        v.render_into(&mut buf);
        assert!(!v.active);
        // 0.1 s held + 0.5 s release
        assert!(buf[..4000].iter().any(|f| f.left != 0.0));
        assert!(buf[5000..].iter().all(|f| f.left == 0.0));
    }

    #[test]
    fn noise_stays_in_range() {
        let mut v = SynthVoice::new(TrackKind::Snare, 0.0, 0.05, 48_000.0, 42);
        for _ in 0..1000 {
            let x = v.next_noise();
            assert!((-1.0..=1.0).contains(&x));
        }
    }

    #[test]
    fn sample_player_resamples() {
        let data = (0..100).map(|i| StereoFrame::mono(i as f32)).collect();
        let buffer = SampleBuffer::new(data, 24_000);
        let mut player = SamplePlayer::new(24_000, 48_000, 1.0);
        let mut out = vec![StereoFrame::zero(); 4];
        player.render_into(&buffer, &mut out);
        assert_relative_eq!(out[1].left, 0.5);
        assert_relative_eq!(out[3].left, 1.5);
        let mut rest = vec![StereoFrame::zero(); 400];
        player.render_into(&buffer, &mut rest);
        assert!(!player.active);
    }
}
