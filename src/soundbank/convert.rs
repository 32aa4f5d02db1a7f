// seqsynth -- an event sequencer and soundbank synthesizer
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! Conversions between the logarithmic units used by soundbanks and linear values.
//!
//! Time is stored in timecents (`1200 * log2(seconds)`), amplitude in centibels
//! (`200 * log10(amplitude)`) and pitch in absolute cents (`100 * key`).
//! Integral inputs are served from lookup tables that are built once per process,
//! everything else falls back to the formula.

use std::sync::OnceLock;

/// Attenuation at which a signal is considered silent.
pub const SILENCE_CB: f64 = 960.0;

/// Timecent value that encodes an instantaneous stage.
pub const INSTANT_TC: f64 = -32768.0;

const CENTS_PER_OCTAVE: usize = 1200;
const MAX_TABLE_CB: usize = 1440;

/// `2^(i/1200)` for one octave worth of cents.
fn pow2_table() -> &'static [f64] {
    static TABLE: OnceLock<Vec<f64>> = OnceLock::new();
    TABLE.get_or_init(|| {
        (0..CENTS_PER_OCTAVE)
            .map(|i| 2f64.powf(i as f64 / CENTS_PER_OCTAVE as f64))
            .collect()
    })
}

/// `10^(-i/200)` for every integral centibel up to `MAX_TABLE_CB`.
fn pow10_table() -> &'static [f64] {
    static TABLE: OnceLock<Vec<f64>> = OnceLock::new();
    TABLE.get_or_init(|| {
        (0..=MAX_TABLE_CB)
            .map(|i| 10f64.powf(-(i as f64) / 200.0))
            .collect()
    })
}

fn as_integral(value: f64) -> Option<i64> {
    if value.fract() == 0.0 && value.abs() < 1e9 {
        Some(value as i64)
    } else {
        None
    }
}

/// `2^(cents/1200)`, the frequency ratio of an interval in cents.
///
/// ```
/// use seqsynth::soundbank::convert::*;
///
/// assert_eq!(cents_to_ratio(1200.0), 2.0);
/// assert_eq!(cents_to_ratio(-2400.0), 0.25);
/// assert!((cents_to_ratio(700.5) - 2f64.powf(700.5 / 1200.0)).abs() < 1e-12);
/// ```
pub fn cents_to_ratio(cents: f64) -> f64 {
    match as_integral(cents) {
        Some(c) => {
            let octave = c.div_euclid(CENTS_PER_OCTAVE as i64);
            let rest = c.rem_euclid(CENTS_PER_OCTAVE as i64) as usize;
            pow2_table()[rest] * 2f64.powi(octave as i32)
        }
        None => 2f64.powf(cents / CENTS_PER_OCTAVE as f64),
    }
}

/// Absolute pitch in cents to a frequency in Hz, where 6900 cents is A4 at 440 Hz.
pub fn cents_to_frequency(cents: f64) -> f64 {
    440.0 * cents_to_ratio(cents - 6900.0)
}

pub fn frequency_to_cents(frequency: f64) -> f64 {
    6900.0 + 1200.0 * (frequency / 440.0).log2()
}

pub fn timecents_to_seconds(tc: f64) -> f64 {
    if tc <= INSTANT_TC {
        0.0
    } else {
        cents_to_ratio(tc)
    }
}

pub fn seconds_to_timecents(seconds: f64) -> f64 {
    if seconds <= 0.0 {
        INSTANT_TC
    } else {
        1200.0 * seconds.log2()
    }
}

/// Number of samples an envelope stage of `tc` timecents lasts.
pub fn env_rate(tc: f64, sample_rate: f64) -> f64 {
    timecents_to_seconds(tc) * sample_rate
}

/// Inverse of `env_rate`: the timecents of a stage lasting `samples` samples.
pub fn env_timecents(samples: f64, sample_rate: f64) -> f64 {
    seconds_to_timecents(samples / sample_rate)
}

/// Linear amplitude of an attenuation in centibels.
/// Everything at or beyond `SILENCE_CB` is silent.
///
/// ```
/// use seqsynth::soundbank::convert::*;
///
/// assert_eq!(attenuation(0.0), 1.0);
/// assert_eq!(attenuation(960.0), 0.0);
/// assert!((attenuation(200.0) - 0.1).abs() < 1e-12);
/// ```
pub fn attenuation(cb: f64) -> f64 {
    if cb >= SILENCE_CB {
        return 0.0;
    }
    if cb <= 0.0 {
        return gain(-cb);
    }
    match as_integral(cb) {
        Some(c) => pow10_table()[c as usize],
        None => 10f64.powf(-cb / 200.0),
    }
}

/// Inverse of `attenuation`. Silence maps back to `SILENCE_CB`.
pub fn attenuation_to_centibels(amplitude: f64) -> f64 {
    if amplitude <= 0.0 {
        SILENCE_CB
    } else {
        (-200.0 * amplitude.log10()).min(SILENCE_CB)
    }
}

/// Linear amplitude of a gain in centibels. Unlike `attenuation`, positive values amplify.
pub fn gain(cb: f64) -> f64 {
    match as_integral(cb) {
        Some(c) if c <= 0 && (-c) as usize <= MAX_TABLE_CB => pow10_table()[(-c) as usize],
        _ => 10f64.powf(cb / 200.0),
    }
}

pub fn gain_to_centibels(amplitude: f64) -> f64 {
    200.0 * amplitude.log10()
}

/// Shape of a transfer function mapping a controller value to a modulation amount.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum CurveShape {
    Linear,
    Concave,
    Convex,
    Switch,
}

/// A transfer function together with its orientation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Curve {
    pub shape: CurveShape,
    /// Runs from 1 to 0 instead of 0 to 1.
    pub negative: bool,
    /// Maps onto [-1, 1] instead of [0, 1].
    pub bipolar: bool,
}

impl Curve {
    pub const LINEAR: Curve = Curve::new(CurveShape::Linear, false, false);

    pub const fn new(shape: CurveShape, negative: bool, bipolar: bool) -> Self {
        Self {
            shape,
            negative,
            bipolar,
        }
    }

    /// Map a normalized source value in [0, 1] through the curve.
    ///
    /// ```
    /// use seqsynth::soundbank::convert::*;
    ///
    /// let neg_concave = Curve::new(CurveShape::Concave, true, false);
    /// assert_eq!(neg_concave.eval(0.0), 1.0);
    /// assert_eq!(neg_concave.eval(1.0), 0.0);
    /// let bipolar = Curve::new(CurveShape::Linear, false, true);
    /// assert_eq!(bipolar.eval(0.5), 0.0);
    /// assert_eq!(Curve::new(CurveShape::Switch, false, false).eval(0.3), 0.0);
    /// ```
    pub fn eval(self, x: f64) -> f64 {
        let x = x.max(0.0).min(1.0);
        let x = if self.negative { 1.0 - x } else { x };
        let y = match self.shape {
            CurveShape::Linear => x,
            shape => curve_table(shape)[(x * 127.0).round() as usize],
        };
        if self.bipolar {
            2.0 * y - 1.0
        } else {
            y
        }
    }
}

impl Default for Curve {
    fn default() -> Self {
        Curve::LINEAR
    }
}

/// Positive unipolar 128-entry table of a curve shape.
pub fn curve_table(shape: CurveShape) -> &'static [f64; 128] {
    static TABLES: OnceLock<[[f64; 128]; 4]> = OnceLock::new();
    let tables = TABLES.get_or_init(|| {
        let mut tables = [[0.0; 128]; 4];
        for i in 0..128 {
            let x = i as f64;
            tables[0][i] = x / 127.0;
            tables[1][i] = concave(x);
            tables[2][i] = 1.0 - concave(127.0 - x);
            tables[3][i] = if i >= 64 { 1.0 } else { 0.0 };
        }
        tables
    });
    match shape {
        CurveShape::Linear => &tables[0],
        CurveShape::Concave => &tables[1],
        CurveShape::Convex => &tables[2],
        CurveShape::Switch => &tables[3],
    }
}

/// The concave transfer function over 0..=127, an amplitude that is linear in decibels.
fn concave(x: f64) -> f64 {
    if x >= 127.0 {
        1.0
    } else {
        let rest = (127.0 - x) / 127.0;
        (-20.0 / 96.0 * (rest * rest).log10()).min(1.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn attenuation_round_trip() {
        for &cb in &[0.0, 100.0, 480.0, 960.0] {
            let back = attenuation_to_centibels(attenuation(cb));
            assert!(close(back, cb), "{} -> {}", cb, back);
        }
    }

    #[test]
    fn silence_floor() {
        assert!(attenuation(960.0).abs() < 1e-6);
        assert!(attenuation(2000.0).abs() < 1e-6);
        assert!((attenuation(0.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn gain_inverts_sign() {
        assert!(close(gain(200.0), 10.0));
        assert!(close(gain(-200.0), attenuation(200.0)));
        assert!(close(gain_to_centibels(gain(-480.0)), -480.0));
    }

    #[test]
    fn env_rate_round_trip() {
        for &tc in &[-12000.0, -6000.0, 0.0, 1200.0] {
            let samples = env_rate(tc, 44100.0);
            assert!(close(env_timecents(samples, 44100.0), tc));
        }
        assert_eq!(env_rate(0.0, 44100.0), 44100.0);
        assert_eq!(env_rate(1200.0, 1000.0), 2000.0);
        assert_eq!(env_rate(INSTANT_TC, 44100.0), 0.0);
    }

    #[test]
    fn table_matches_formula() {
        for c in -5000..5000 {
            let c = c as f64 * 3.0;
            assert!((cents_to_ratio(c) / 2f64.powf(c / 1200.0) - 1.0).abs() < 1e-12);
        }
        for cb in 0..960 {
            let cb = cb as f64;
            assert!((attenuation(cb) - 10f64.powf(-cb / 200.0)).abs() < 1e-12);
        }
    }

    #[test]
    fn pitch() {
        assert!(close(cents_to_frequency(6900.0), 440.0));
        assert!(close(cents_to_frequency(8100.0), 880.0));
        assert!(close(frequency_to_cents(220.0), 5700.0));
    }

    #[test]
    fn curve_endpoints() {
        for shape in &[
            CurveShape::Linear,
            CurveShape::Concave,
            CurveShape::Convex,
            CurveShape::Switch,
        ] {
            let table = curve_table(*shape);
            assert_eq!(table[0], 0.0);
            assert_eq!(table[127], 1.0);
            assert!(table.windows(2).all(|w| w[0] <= w[1]));
        }
    }
}
