use serde::{Deserialize, Serialize};

use super::frame::StereoFrame;

// Everything here is data-first: a serde `*Spec` describes the effect, and
// `to_effect` builds the running DSP for a sample rate. Specs live in config,
// effects live on the audio thread.

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EffectSpec {
    Reverb { decay: f32, pre_delay: f32, wet: f32 },
    Delay { time: f32, feedback: f32, wet: f32 },
    Chorus { rate: f32, depth: f32, wet: f32 },
}

impl EffectSpec {
    pub fn to_effect(&self, sample_rate: f32) -> Box<dyn Effect> {
        match *self {
            EffectSpec::Reverb { decay, pre_delay, wet } => {
                Box::new(Reverb::new(sample_rate, decay, pre_delay, wet))
            }
            EffectSpec::Delay { time, feedback, wet } => {
                Box::new(Delay::new(sample_rate, time, feedback, wet))
            }
            EffectSpec::Chorus { rate, depth, wet } => {
                Box::new(Chorus::new(sample_rate, rate, depth, wet))
            }
        }
    }
}

pub trait Effect: Send {
    fn process(&mut self, buf: &mut [StereoFrame]);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterKind {
    LowPass,
    HighPass,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    pub kind: FilterKind,
    pub cutoff: f32, // Hz
    pub q: f32,
}

impl FilterSpec {
    pub fn low_pass(cutoff: f32) -> Self {
        Self { kind: FilterKind::LowPass, cutoff, q: std::f32::consts::FRAC_1_SQRT_2 }
    }

    pub fn high_pass(cutoff: f32) -> Self {
        Self { kind: FilterKind::HighPass, cutoff, q: std::f32::consts::FRAC_1_SQRT_2 }
    }
}

// biquad, RBJ cookbook coefficients, direct form I
#[derive(Clone, Debug)]
pub struct Filter {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
    x: [StereoFrame; 2],
    y: [StereoFrame; 2],
}

impl Filter {
    pub fn new(spec: FilterSpec, sample_rate: f32) -> Self {
        let cutoff = spec.cutoff.clamp(10.0, sample_rate * 0.49);
        let w0 = std::f32::consts::TAU * cutoff / sample_rate;
        let (sin, cos) = w0.sin_cos();
        let alpha = sin / (2.0 * spec.q.max(0.01));
        let a0 = 1.0 + alpha;
        let (b0, b1, b2) = match spec.kind {
            FilterKind::LowPass => ((1.0 - cos) / 2.0, 1.0 - cos, (1.0 - cos) / 2.0),
            FilterKind::HighPass => ((1.0 + cos) / 2.0, -(1.0 + cos), (1.0 + cos) / 2.0),
        };
        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: -2.0 * cos / a0,
            a2: (1.0 - alpha) / a0,
            x: [StereoFrame::zero(); 2],
            y: [StereoFrame::zero(); 2],
        }
    }
}

impl Effect for Filter {
    fn process(&mut self, buf: &mut [StereoFrame]) {
        for f in buf.iter_mut() {
            let input = *f;
            let out = input * self.b0 + self.x[0] * self.b1 + self.x[1] * self.b2
                + self.y[0] * -self.a1
                + self.y[1] * -self.a2;
            self.x = [input, self.x[0]];
            self.y = [out, self.y[0]];
            *f = out;
        }
    }
}

// Single-channel circular buffer shared by the time-based effects
#[derive(Clone, Debug)]
struct DelayLine {
    buf: Vec<f32>,
    pos: usize,
}

impl DelayLine {
    fn new(len: usize) -> Self {
        Self { buf: vec![0.0; len.max(1)], pos: 0 }
    }

    // `delay` samples back from the most recent write, 1..=len
    fn read(&self, delay: usize) -> f32 {
        let len = self.buf.len();
        let d = delay.clamp(1, len);
        self.buf[(self.pos + len - d) % len]
    }

    fn read_frac(&self, delay: f32) -> f32 {
        let d = delay.max(1.0);
        let i = d.floor() as usize;
        let frac = d - i as f32;
        self.read(i) * (1.0 - frac) + self.read(i + 1) * frac
    }

    fn write(&mut self, x: f32) {
        self.buf[self.pos] = x;
        self.pos = (self.pos + 1) % self.buf.len();
    }
}

// feedback comb with a one-pole damping filter in the loop
#[derive(Clone, Debug)]
struct Comb {
    line: DelayLine,
    len: usize,
    feedback: f32,
    damp: f32,
    store: f32,
}

impl Comb {
    fn new(len: usize, feedback: f32, damp: f32) -> Self {
        Self { line: DelayLine::new(len), len, feedback, damp, store: 0.0 }
    }

    fn tick(&mut self, x: f32) -> f32 {
        let out = self.line.read(self.len);
        self.store = out * (1.0 - self.damp) + self.store * self.damp;
        self.line.write(x + self.store * self.feedback);
        out
    }
}

#[derive(Clone, Debug)]
struct Allpass {
    line: DelayLine,
    len: usize,
}

impl Allpass {
    fn new(len: usize) -> Self {
        Self { line: DelayLine::new(len), len }
    }

    fn tick(&mut self, x: f32) -> f32 {
        let delayed = self.line.read(self.len);
        let out = delayed - 0.5 * x;
        self.line.write(x + 0.5 * delayed);
        out
    }
}

const COMB_TUNING: [usize; 4] = [1116, 1188, 1277, 1356];
const ALLPASS_TUNING: [usize; 2] = [556, 441];
const STEREO_SPREAD: usize = 23;

/// Schroeder/Freeverb-style algorithmic reverb used on the sequencer's
/// shared reverb bus. Each comb's feedback is set so it decays 60 dB in
/// `decay` seconds.
pub struct Reverb {
    pre_delay: [DelayLine; 2],
    pre_delay_len: usize,
    combs: [Vec<Comb>; 2],
    allpasses: [Vec<Allpass>; 2],
    wet: f32,
}

impl Reverb {
    pub fn new(sample_rate: f32, decay: f32, pre_delay: f32, wet: f32) -> Self {
        let scale = sample_rate / 44_100.0;
        let decay = decay.max(0.05);
        let build = |spread: usize| {
            let combs = COMB_TUNING
                .iter()
                .map(|&t| {
                    let len = ((t + spread) as f32 * scale) as usize;
                    let feedback = 10f32.powf(-3.0 * len as f32 / sample_rate / decay).min(0.98);
                    Comb::new(len, feedback, 0.2)
                })
                .collect::<Vec<_>>();
            let allpasses = ALLPASS_TUNING
                .iter()
                .map(|&t| Allpass::new(((t + spread) as f32 * scale) as usize))
                .collect::<Vec<_>>();
            (combs, allpasses)
        };
        let (combs_l, ap_l) = build(0);
        let (combs_r, ap_r) = build(STEREO_SPREAD);
        let pre_delay_len = ((pre_delay.max(0.0) * sample_rate) as usize).max(1);
        Self {
            pre_delay: [DelayLine::new(pre_delay_len), DelayLine::new(pre_delay_len)],
            pre_delay_len,
            combs: [combs_l, combs_r],
            allpasses: [ap_l, ap_r],
            wet: wet.clamp(0.0, 1.0),
        }
    }

    fn channel(&mut self, ch: usize, x: f32) -> f32 {
        let delayed = self.pre_delay[ch].read(self.pre_delay_len);
        self.pre_delay[ch].write(x);
        let n = self.combs[ch].len() as f32;
        let mut acc = 0.0;
        for comb in self.combs[ch].iter_mut() {
            acc += comb.tick(delayed * 0.5);
        }
        let mut out = acc / n;
        for ap in self.allpasses[ch].iter_mut() {
            out = ap.tick(out);
        }
        out
    }
}

impl Effect for Reverb {
    fn process(&mut self, buf: &mut [StereoFrame]) {
        let dry = 1.0 - self.wet;
        for f in buf.iter_mut() {
            let l = self.channel(0, f.left);
            let r = self.channel(1, f.right);
            f.left = f.left * dry + l * self.wet;
            f.right = f.right * dry + r * self.wet;
        }
    }
}

pub struct Delay {
    lines: [DelayLine; 2],
    len: usize,
    feedback: f32,
    wet: f32,
}

impl Delay {
    pub fn new(sample_rate: f32, time: f32, feedback: f32, wet: f32) -> Self {
        let len = ((time.max(0.001) * sample_rate) as usize).max(1);
        Self {
            lines: [DelayLine::new(len), DelayLine::new(len)],
            len,
            feedback: feedback.clamp(0.0, 0.95),
            wet: wet.clamp(0.0, 1.0),
        }
    }
}

impl Effect for Delay {
    fn process(&mut self, buf: &mut [StereoFrame]) {
        let dry = 1.0 - self.wet;
        for f in buf.iter_mut() {
            let l = self.lines[0].read(self.len);
            let r = self.lines[1].read(self.len);
            self.lines[0].write(f.left + l * self.feedback);
            self.lines[1].write(f.right + r * self.feedback);
            f.left = f.left * dry + l * self.wet;
            f.right = f.right * dry + r * self.wet;
        }
    }
}

const CHORUS_BASE_DELAY: f32 = 0.015;
const CHORUS_MAX_DEPTH: f32 = 0.01;

pub struct Chorus {
    lines: [DelayLine; 2],
    phase: f32,
    phase_inc: f32,
    base: f32,  // samples
    depth: f32, // samples
    wet: f32,
}

impl Chorus {
    pub fn new(sample_rate: f32, rate: f32, depth: f32, wet: f32) -> Self {
        let len = ((CHORUS_BASE_DELAY + CHORUS_MAX_DEPTH) * sample_rate) as usize + 2;
        Self {
            lines: [DelayLine::new(len), DelayLine::new(len)],
            phase: 0.0,
            phase_inc: std::f32::consts::TAU * rate.max(0.0) / sample_rate,
            base: CHORUS_BASE_DELAY * sample_rate,
            depth: depth.clamp(0.0, 1.0) * CHORUS_MAX_DEPTH * sample_rate,
            wet: wet.clamp(0.0, 1.0),
        }
    }
}

impl Effect for Chorus {
    fn process(&mut self, buf: &mut [StereoFrame]) {
        let dry = 1.0 - self.wet;
        for f in buf.iter_mut() {
            self.lines[0].write(f.left);
            self.lines[1].write(f.right);
            // right channel runs a quarter cycle behind for width
            let dl = self.base + self.depth * self.phase.sin();
            let dr = self.base + self.depth * self.phase.cos();
            let l = self.lines[0].read_frac(dl);
            let r = self.lines[1].read_frac(dr);
            f.left = f.left * dry + l * self.wet;
            f.right = f.right * dry + r * self.wet;
            self.phase += self.phase_inc;
            if self.phase > std::f32::consts::TAU {
                self.phase -= std::f32::consts::TAU;
            }
        }
    }
}
