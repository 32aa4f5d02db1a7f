// seqsynth -- an event sequencer and soundbank synthesizer
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! This is the namespace for all parts dealing with data in sampled waves.

use std::ops;

/// Convenience type for making things stereo, e.g. individual samples or whole buffers.
///
/// ```
/// use seqsynth::wave::*;
///
/// let stereo = Stereo::new(0.25, 0.5);
/// let stereo2 = stereo + Stereo::new(0.5, -0.25);
/// assert_eq!(stereo2 * 2.0, Stereo::new(1.5, 0.5));
/// ```
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Stereo<T> {
    pub left: T,
    pub right: T,
}

impl<T> Stereo<T> {
    pub fn new(left: T, right: T) -> Self {
        Self { left, right }
    }

    pub fn mono(mono: T) -> Self
    where
        T: Copy,
    {
        Self::new(mono, mono)
    }
}

impl Stereo<f64> {
    pub const SILENCE: Stereo<f64> = Stereo {
        left: 0.0,
        right: 0.0,
    };

    /// Linearly spread a mono signal onto stereo channels, by keeping
    /// one channel at 100% while linearly attenuating the other.
    ///
    /// # Examples
    ///
    /// ```
    /// # use seqsynth::wave::*;
    ///
    /// assert_eq!(Stereo::panned_mono(1.0, 0.0), Stereo::new(1.0, 1.0));
    /// assert_eq!(Stereo::panned_mono(1.0, -1.0), Stereo::new(1.0, 0.0));
    /// assert_eq!(Stereo::panned_mono(1.0, 1.0), Stereo::new(0.0, 1.0));
    /// ```
    pub fn panned_mono(mono: f64, pan: f64) -> Self {
        let left = mono * 1.0f64.min(1.0 - pan);
        let right = mono * 1.0f64.min(1.0 + pan);
        Stereo::new(left, right)
    }

    /// Apply a pan position to a stereo signal, attenuating the opposite side.
    pub fn panned(self, pan: f64) -> Self {
        Stereo::new(
            self.left * 1.0f64.min(1.0 - pan),
            self.right * 1.0f64.min(1.0 + pan),
        )
    }
}

impl<T: ops::Add> ops::Add for Stereo<T> {
    type Output = Stereo<T::Output>;

    fn add(self, rhs: Self) -> Self::Output {
        Stereo {
            left: self.left + rhs.left,
            right: self.right + rhs.right,
        }
    }
}

impl<T: ops::AddAssign> ops::AddAssign for Stereo<T> {
    fn add_assign(&mut self, rhs: Self) {
        self.left += rhs.left;
        self.right += rhs.right;
    }
}

impl<T: ops::Mul + Copy> ops::Mul<T> for Stereo<T> {
    type Output = Stereo<T::Output>;

    fn mul(self, rhs: T) -> Self::Output {
        Stereo {
            left: self.left * rhs,
            right: self.right * rhs,
        }
    }
}

impl<T: ops::MulAssign + Copy> ops::MulAssign<T> for Stereo<T> {
    fn mul_assign(&mut self, rhs: T) {
        self.left *= rhs;
        self.right *= rhs;
    }
}

/// Copy the stereo `f64` samples to bytes, interleaving the left and right samples.
///
/// Returns the number of samples that were actually copied.
/// Might be less than the number of input samples if the output buffer was not large enough.
///
/// ```
/// # use seqsynth::wave::*;
/// let mut bytes = [0u8; 16];
/// assert_eq!(copy_bytes_to(&[Stereo::new(1.0, -1.0)], &mut bytes), 1);
/// assert_eq!(bytes[0..8], 1.0f64.to_le_bytes());
/// assert_eq!(bytes[8..16], (-1.0f64).to_le_bytes());
/// ```
pub fn copy_bytes_to(samples: &[Stereo<f64>], bytes: &mut [u8]) -> usize {
    let mut processed = 0;
    for (sample, target) in samples.iter().zip(bytes.chunks_exact_mut(16)) {
        target[0..8].copy_from_slice(&sample.left.to_le_bytes());
        target[8..16].copy_from_slice(&sample.right.to_le_bytes());
        processed += 1;
    }
    processed
}
