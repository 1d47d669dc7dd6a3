//! Convolution reverb for the guitar input: a synthetic impulse response
//! (decaying noise) applied with uniformly partitioned FFT convolution, and
//! the dry/wet gain stage around it.

use std::sync::Arc;

use rand::Rng;
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use serde::{Deserialize, Serialize};

use super::frame::StereoFrame;

/// Partition size in frames. Also the latency of the wet path.
pub const PARTITION: usize = 256;

/// Per channel: white noise shaped by `(1 - i/len)^decay`.
pub fn impulse_response(
    sample_rate: u32,
    duration: f32,
    decay: f32,
    channels: usize,
) -> Vec<Vec<f32>> {
    impulse_response_with(&mut rand::thread_rng(), sample_rate, duration, decay, channels)
}

pub fn impulse_response_with<R: Rng>(
    rng: &mut R,
    sample_rate: u32,
    duration: f32,
    decay: f32,
    channels: usize,
) -> Vec<Vec<f32>> {
    let len = ((sample_rate as f32 * duration.max(0.0)) as usize).max(1);
    (0..channels)
        .map(|_| {
            (0..len)
                .map(|i| {
                    let envelope = (1.0 - i as f32 / len as f32).powf(decay);
                    rng.gen_range(-1.0f32..1.0) * envelope
                })
                .collect()
        })
        .collect()
}

/// Single-channel uniformly partitioned overlap-save convolver. Output lags
/// input by [`PARTITION`] frames.
pub struct Convolver {
    fft: Arc<dyn Fft<f32>>,
    ifft: Arc<dyn Fft<f32>>,
    partitions: Vec<Vec<Complex<f32>>>, // spectra of the IR partitions
    history: Vec<Vec<Complex<f32>>>,    // spectra of past input blocks, ring
    head: usize,
    window: Vec<f32>, // previous block ++ current block
    in_pos: usize,
    out_block: Vec<f32>,
    spectrum: Vec<Complex<f32>>,
    acc: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
}

impl Convolver {
    pub fn new(ir: &[f32]) -> Self {
        let n = PARTITION * 2;
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(n);
        let ifft = planner.plan_fft_inverse(n);
        let scratch_len = fft.get_inplace_scratch_len().max(ifft.get_inplace_scratch_len());
        let mut scratch = vec![Complex::default(); scratch_len];

        let count = ir.len().div_ceil(PARTITION).max(1);
        let partitions = (0..count)
            .map(|p| {
                let mut buf = vec![Complex::default(); n];
                let start = p * PARTITION;
                for (dst, &x) in buf.iter_mut().zip(ir.iter().skip(start).take(PARTITION)) {
                    *dst = Complex::new(x, 0.0);
                }
                fft.process_with_scratch(&mut buf, &mut scratch);
                buf
            })
            .collect();

        Self {
            fft,
            ifft,
            partitions,
            history: vec![vec![Complex::default(); n]; count],
            head: 0,
            window: vec![0.0; n],
            in_pos: 0,
            out_block: vec![0.0; PARTITION],
            spectrum: vec![Complex::default(); n],
            acc: vec![Complex::default(); n],
            scratch,
        }
    }

    pub fn tick(&mut self, x: f32) -> f32 {
        let y = self.out_block[self.in_pos];
        self.window[PARTITION + self.in_pos] = x;
        self.in_pos += 1;
        if self.in_pos == PARTITION {
            self.process_block();
            self.in_pos = 0;
        }
        y
    }

    fn process_block(&mut self) {
        let n = PARTITION * 2;
        for (dst, &x) in self.spectrum.iter_mut().zip(&self.window) {
            *dst = Complex::new(x, 0.0);
        }
        self.fft.process_with_scratch(&mut self.spectrum, &mut self.scratch);

        let count = self.partitions.len();
        self.head = (self.head + count - 1) % count;
        self.history[self.head].copy_from_slice(&self.spectrum);

        self.acc.fill(Complex::default());
        for (p, h) in self.partitions.iter().enumerate() {
            let x = &self.history[(self.head + p) % count];
            for ((a, xi), hi) in self.acc.iter_mut().zip(x).zip(h) {
                *a += xi * hi;
            }
        }
        self.ifft.process_with_scratch(&mut self.acc, &mut self.scratch);

        // overlap-save: only the second half is free of circular wrap
        let norm = 1.0 / n as f32;
        for (o, y) in self.out_block.iter_mut().zip(&self.acc[PARTITION..]) {
            *o = y.re * norm;
        }
        self.window.copy_within(PARTITION.., 0);
    }
}

/// Gains of the guitar chain. Always replaced as a whole.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReverbMix {
    pub dry: f32,
    pub wet: f32,
    pub output: f32,
}

impl Default for ReverbMix {
    fn default() -> Self {
        Self { dry: 0.7, wet: 0.3, output: 1.0 }
    }
}

impl ReverbMix {
    pub fn set_reverb_level(&mut self, level: f32) {
        self.wet = clamp_unit(level);
    }

    pub fn set_dry_level(&mut self, level: f32) {
        self.dry = clamp_unit(level);
    }

    /// dry = 1 - mix, wet = mix
    pub fn set_reverb_mix(&mut self, mix: f32) {
        let mix = clamp_unit(mix);
        self.dry = 1.0 - mix;
        self.wet = mix;
    }

    pub fn clamped(self) -> Self {
        Self {
            dry: clamp_unit(self.dry),
            wet: clamp_unit(self.wet),
            output: clamp_unit(self.output),
        }
    }
}

fn clamp_unit(x: f32) -> f32 {
    if x.is_nan() { 0.0 } else { x.clamp(0.0, 1.0) }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuitarSpec {
    pub ir_duration: f32, // seconds
    pub ir_decay: f32,
    pub mix: ReverbMix,
    pub monitor: bool, // route the input to the speakers
}

impl Default for GuitarSpec {
    fn default() -> Self {
        Self {
            ir_duration: 2.0,
            ir_decay: 2.0,
            mix: ReverbMix::default(),
            monitor: true,
        }
    }
}

/// Live input -> (dry + convolution wet) -> output gain.
pub struct GuitarChain {
    convolvers: [Convolver; 2],
    mix: ReverbMix,
    pub monitor: bool,
}

impl GuitarChain {
    pub fn new(spec: &GuitarSpec, sample_rate: u32) -> Self {
        let ir = impulse_response(sample_rate, spec.ir_duration, spec.ir_decay, 2);
        Self::with_impulse(&ir, spec.mix, spec.monitor)
    }

    /// A mono IR feeds both channels.
    pub fn with_impulse(ir: &[Vec<f32>], mix: ReverbMix, monitor: bool) -> Self {
        let left = ir.first().map(Vec::as_slice).unwrap_or(&[]);
        let right = ir.get(1).map(Vec::as_slice).unwrap_or(left);
        Self {
            convolvers: [Convolver::new(left), Convolver::new(right)],
            mix: mix.clamped(),
            monitor,
        }
    }

    pub fn mix(&self) -> ReverbMix {
        self.mix
    }

    pub fn set_mix(&mut self, mix: ReverbMix) {
        self.mix = mix.clamped();
    }

    pub fn process(&mut self, buf: &mut [StereoFrame]) {
        let ReverbMix { dry, wet, output } = self.mix;
        let [cl, cr] = &mut self.convolvers;
        for f in buf.iter_mut() {
            let wl = cl.tick(f.left);
            let wr = cr.tick(f.right);
            f.left = (f.left * dry + wl * wet) * output;
            f.right = (f.right * dry + wr * wet) * output;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn impulse_response_decays_inside_its_envelope() {
        let mut rng = StdRng::seed_from_u64(1);
        let ir = impulse_response_with(&mut rng, 1000, 1.5, 3.0, 2);
        assert_eq!(ir.len(), 2);
        assert_eq!(ir[0].len(), 1500);
        assert_ne!(ir[0], ir[1]);
        for (i, x) in ir[0].iter().enumerate() {
            let envelope = (1.0 - i as f32 / 1500.0).powf(3.0);
            assert!(x.abs() <= envelope + 1e-6);
        }
    }

    #[test]
    fn convolving_an_impulse_returns_the_ir() {
        let ir: Vec<f32> = (0..600).map(|i| 1.0 / (i + 1) as f32).collect();
        let mut conv = Convolver::new(&ir);
        let out: Vec<f32> = (0..PARTITION * 4)
            .map(|i| conv.tick(if i == 0 { 1.0 } else { 0.0 }))
            .collect();
        assert!(out[..PARTITION].iter().all(|y| y.abs() < 1e-6));
        for (i, h) in ir.iter().enumerate() {
            assert_relative_eq!(out[PARTITION + i], *h, epsilon = 1e-4);
        }
        assert!(out[PARTITION + 600..].iter().all(|y| y.abs() < 1e-4));
    }

    #[test]
    fn reverb_mix_endpoints_and_clamping() {
        let mut mix = ReverbMix::default();
        mix.set_reverb_mix(0.0);
        assert_eq!((mix.dry, mix.wet), (1.0, 0.0));
        mix.set_reverb_mix(1.0);
        assert_eq!((mix.dry, mix.wet), (0.0, 1.0));
        mix.set_reverb_mix(0.5);
        assert_eq!((mix.dry, mix.wet), (0.5, 0.5));
        mix.set_reverb_mix(7.0);
        assert_eq!((mix.dry, mix.wet), (0.0, 1.0));
        mix.set_reverb_mix(-1.0);
        assert_eq!((mix.dry, mix.wet), (1.0, 0.0));
        mix.set_dry_level(1.5);
        mix.set_reverb_level(-0.2);
        assert_eq!((mix.dry, mix.wet), (1.0, 0.0));
    }

    #[test]
    fn dry_only_chain_passes_input() {
        let ir = vec![vec![0.5; 300]];
        let mix = ReverbMix { dry: 1.0, wet: 0.0, output: 0.5 };
        let mut chain = GuitarChain::with_impulse(&ir, mix, true);
        let mut buf = vec![StereoFrame::mono(0.8); 64];
        chain.process(&mut buf);
        assert_relative_eq!(buf[0].left, 0.4);
        assert_relative_eq!(buf[63].right, 0.4);
    }
}
