//! Three-band EQ: low shelf, mid peaking, high shelf.
//!
//! RBJ cookbook biquads in Direct Form II Transposed, f64 state, stereo.

use std::f64::consts::PI;

use promptdj_types::{EqGains, SAMPLE_RATE};

pub const LOW_SHELF_HZ: f64 = 250.0;
pub const MID_PEAK_HZ: f64 = 1_000.0;
pub const HIGH_SHELF_HZ: f64 = 4_000.0;

const SHELF_Q: f64 = std::f64::consts::FRAC_1_SQRT_2;
const PEAK_Q: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BandKind {
    LowShelf,
    Peaking,
    HighShelf,
}

/// Stereo biquad.
#[derive(Debug, Clone)]
pub struct Biquad {
    kind: BandKind,
    frequency: f64,
    q: f64,
    gain_db: f32,
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
    z1: [f64; 2],
    z2: [f64; 2],
}

impl Biquad {
    pub fn new(kind: BandKind, frequency: f64, q: f64) -> Self {
        let mut filter = Self {
            kind,
            frequency,
            q,
            gain_db: 0.0,
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
            z1: [0.0; 2],
            z2: [0.0; 2],
        };
        filter.compute();
        filter
    }

    pub fn gain_db(&self) -> f32 {
        self.gain_db
    }

    pub fn set_gain_db(&mut self, gain_db: f32) {
        if (self.gain_db - gain_db).abs() < f32::EPSILON {
            return;
        }
        self.gain_db = gain_db;
        self.compute();
    }

    fn compute(&mut self) {
        let a = 10.0_f64.powf(self.gain_db as f64 / 40.0);
        let w0 = 2.0 * PI * self.frequency / SAMPLE_RATE as f64;
        let cos_w0 = w0.cos();
        let alpha = w0.sin() / (2.0 * self.q);

        let (b0, b1, b2, a0, a1, a2) = match self.kind {
            BandKind::Peaking => (
                1.0 + alpha * a,
                -2.0 * cos_w0,
                1.0 - alpha * a,
                1.0 + alpha / a,
                -2.0 * cos_w0,
                1.0 - alpha / a,
            ),
            BandKind::LowShelf => {
                let k = 2.0 * a.sqrt() * alpha;
                (
                    a * ((a + 1.0) - (a - 1.0) * cos_w0 + k),
                    2.0 * a * ((a - 1.0) - (a + 1.0) * cos_w0),
                    a * ((a + 1.0) - (a - 1.0) * cos_w0 - k),
                    (a + 1.0) + (a - 1.0) * cos_w0 + k,
                    -2.0 * ((a - 1.0) + (a + 1.0) * cos_w0),
                    (a + 1.0) + (a - 1.0) * cos_w0 - k,
                )
            }
            BandKind::HighShelf => {
                let k = 2.0 * a.sqrt() * alpha;
                (
                    a * ((a + 1.0) + (a - 1.0) * cos_w0 + k),
                    -2.0 * a * ((a - 1.0) + (a + 1.0) * cos_w0),
                    a * ((a + 1.0) + (a - 1.0) * cos_w0 - k),
                    (a + 1.0) - (a - 1.0) * cos_w0 + k,
                    2.0 * ((a - 1.0) - (a + 1.0) * cos_w0),
                    (a + 1.0) - (a - 1.0) * cos_w0 - k,
                )
            }
        };

        self.b0 = b0 / a0;
        self.b1 = b1 / a0;
        self.b2 = b2 / a0;
        self.a1 = a1 / a0;
        self.a2 = a2 / a0;
    }

    /// Process an interleaved stereo block in place.
    pub fn process(&mut self, block: &mut [f32]) {
        for frame in block.chunks_exact_mut(2) {
            for (ch, sample) in frame.iter_mut().enumerate() {
                let x = *sample as f64;
                let y = self.b0 * x + self.z1[ch];
                self.z1[ch] = self.b1 * x - self.a1 * y + self.z2[ch];
                self.z2[ch] = self.b2 * x - self.a2 * y;
                *sample = y as f32;
            }
        }
        for z in self.z1.iter_mut().chain(self.z2.iter_mut()) {
            if z.abs() < 1e-15 {
                *z = 0.0;
            }
        }
    }

    /// Magnitude response in dB at `frequency`.
    pub fn magnitude_db(&self, frequency: f64) -> f64 {
        let w = 2.0 * PI * frequency / SAMPLE_RATE as f64;
        let (cos_w, sin_w) = (w.cos(), w.sin());
        let (cos_2w, sin_2w) = ((2.0 * w).cos(), (2.0 * w).sin());

        let num_re = self.b0 + self.b1 * cos_w + self.b2 * cos_2w;
        let num_im = -(self.b1 * sin_w + self.b2 * sin_2w);
        let den_re = 1.0 + self.a1 * cos_w + self.a2 * cos_2w;
        let den_im = -(self.a1 * sin_w + self.a2 * sin_2w);

        let num = (num_re * num_re + num_im * num_im).sqrt();
        let den = (den_re * den_re + den_im * den_im).sqrt();
        20.0 * (num / den).log10()
    }
}

/// low shelf → mid peaking → high shelf
#[derive(Debug, Clone)]
pub struct EqChain {
    low: Biquad,
    mid: Biquad,
    high: Biquad,
}

impl Default for EqChain {
    fn default() -> Self {
        Self::new()
    }
}

impl EqChain {
    pub fn new() -> Self {
        Self {
            low: Biquad::new(BandKind::LowShelf, LOW_SHELF_HZ, SHELF_Q),
            mid: Biquad::new(BandKind::Peaking, MID_PEAK_HZ, PEAK_Q),
            high: Biquad::new(BandKind::HighShelf, HIGH_SHELF_HZ, SHELF_Q),
        }
    }

    pub fn set_gains(&mut self, gains: EqGains) {
        let gains = gains.clamped();
        self.low.set_gain_db(gains.low);
        self.mid.set_gain_db(gains.mid);
        self.high.set_gain_db(gains.high);
    }

    pub fn gains(&self) -> EqGains {
        EqGains {
            low: self.low.gain_db(),
            mid: self.mid.gain_db(),
            high: self.high.gain_db(),
        }
    }

    pub fn process(&mut self, block: &mut [f32]) {
        self.low.process(block);
        self.mid.process(block);
        self.high.process(block);
    }

    pub fn bands(&self) -> [&Biquad; 3] {
        [&self.low, &self.mid, &self.high]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_eq_is_transparent() {
        let mut eq = EqChain::new();
        let mut block: Vec<f32> = (0..256).map(|i| ((i as f32) * 0.1).sin() * 0.5).collect();
        let original = block.clone();
        eq.process(&mut block);
        for (a, b) in block.iter().zip(original.iter()) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn low_shelf_boosts_bass_not_treble() {
        let mut eq = EqChain::new();
        eq.set_gains(EqGains::new(12.0, 0.0, 0.0));
        let [low, _, _] = eq.bands();
        assert!((low.magnitude_db(20.0) - 12.0).abs() < 0.5);
        assert!(low.magnitude_db(15_000.0).abs() < 0.5);
    }

    #[test]
    fn mid_peak_hits_gain_at_center() {
        let mut eq = EqChain::new();
        eq.set_gains(EqGains::new(0.0, -6.0, 0.0));
        let [_, mid, _] = eq.bands();
        assert!((mid.magnitude_db(MID_PEAK_HZ) + 6.0).abs() < 0.1);
    }

    #[test]
    fn high_shelf_cuts_treble() {
        let mut eq = EqChain::new();
        eq.set_gains(EqGains::new(0.0, 0.0, -9.0));
        let [_, _, high] = eq.bands();
        assert!((high.magnitude_db(20_000.0) + 9.0).abs() < 0.5);
        assert!(high.magnitude_db(50.0).abs() < 0.5);
    }

    #[test]
    fn gains_are_clamped_on_set() {
        let mut eq = EqChain::new();
        eq.set_gains(EqGains {
            low: 100.0,
            mid: 0.0,
            high: -100.0,
        });
        assert_eq!(eq.gains().low, 24.0);
        assert_eq!(eq.gains().high, -24.0);
    }
}
