// seqsynth -- an event sequencer and soundbank synthesizer
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

/// A six stage Delay-Attack-Hold-Decay-Sustain-Release envelope.
///
/// When a key is pressed, the amplitude stays at zero for `delay` seconds, then rises from zero
/// to one over `attack` seconds, stays at one for `hold` seconds, then decays over an additional
/// `decay` seconds to the `sustain` level where it is held as long as the key is pressed.
/// When the key is released, the volume falls back to zero over the next `release` seconds.
///
/// # Example
///
/// ```
/// use seqsynth::envelope::*;
/// let e = Envelope::adsr(0.25, 0.5, 0.75, 1.0);
/// let mut eval = e.instantiate(4.0); // 4 samples per second
/// assert_eq!(eval.step(), 0.0);
/// assert_eq!(eval.step(), 1.0);
/// assert_eq!(eval.step(), 0.875);
/// assert_eq!(eval.step(), 0.75);
/// assert_eq!(eval.step(), 0.75);
/// eval.release();
/// assert!(! eval.faded());
///
/// assert_eq!(eval.step(), 0.75);
/// assert_eq!(eval.step(), 0.5625);
/// assert_eq!(eval.step(), 0.375);
/// assert_eq!(eval.step(), 0.1875);
/// assert_eq!(eval.step(), 0.0);
/// assert!(eval.faded());
///
/// // This time with an early release
/// let mut eval = e.instantiate(4.0);
/// assert_eq!(eval.step(), 0.0);
/// eval.release();
/// assert_eq!(eval.step(), 1.0);
/// assert_eq!(eval.step(), 0.75);
/// assert_eq!(eval.step(), 0.5);
/// assert_eq!(eval.step(), 0.25);
/// assert_eq!(eval.step(), 0.0);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Time in seconds before the attack starts.
    pub delay: f64,
    /// Time in seconds to go from 0.0 to 1.0
    pub attack: f64,
    /// Time in seconds the peak is held.
    pub hold: f64,
    /// Time in seconds to go from 1.0 to `sustain`.
    pub decay: f64,
    /// Constant amplitude while key is held.
    pub sustain: f64,
    /// Time in seconds to go from the current level to 0.0.
    pub release: f64,
}

impl Envelope {
    pub fn adsr(attack: f64, decay: f64, sustain: f64, release: f64) -> Self {
        Self {
            delay: 0.0,
            attack,
            hold: 0.0,
            decay,
            sustain,
            release,
        }
    }

    pub fn instantiate(&self, sample_rate: f64) -> EvalEnvelope {
        let samples = |seconds: f64| (seconds.max(0.0) * sample_rate).round() as u64;
        let mut eval = EvalEnvelope {
            lengths: [
                samples(self.delay),
                samples(self.attack),
                samples(self.hold),
                samples(self.decay),
                samples(self.release),
            ],
            sustain_level: self.sustain.max(0.0).min(1.0),
            release_level: 0.0,
            stage: Stage::Delay,
            current_sample: 0,
        };
        eval.settle();
        eval
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Delay,
    Attack,
    Hold,
    Decay,
    Sustain,
    Release,
    Done,
}

/// Sample-exact evaluator for an `Envelope`.
#[derive(Debug, Clone)]
pub struct EvalEnvelope {
    /// Stage lengths in samples: delay, attack, hold, decay, release.
    lengths: [u64; 5],
    sustain_level: f64,
    release_level: f64,
    stage: Stage,
    /// Samples spent in the current stage.
    current_sample: u64,
}

impl EvalEnvelope {
    /// Called for every sample, returning the envelope gain at that sample.
    pub fn step(&mut self) -> f64 {
        let gain = self.gain();
        if !matches!(self.stage, Stage::Sustain | Stage::Done) {
            self.current_sample += 1;
            self.settle();
        }
        gain
    }

    /// The gain the next call to `step` returns.
    pub fn gain(&self) -> f64 {
        let progress = |len: u64| self.current_sample as f64 / len as f64;
        match self.stage {
            Stage::Delay => 0.0,
            Stage::Attack => progress(self.lengths[1]),
            Stage::Hold => 1.0,
            Stage::Decay => 1.0 - progress(self.lengths[3]) * (1.0 - self.sustain_level),
            Stage::Sustain => self.sustain_level,
            Stage::Release => (1.0 - progress(self.lengths[4])) * self.release_level,
            Stage::Done => 0.0,
        }
    }

    /// Move past every stage whose time is up, skipping stages of zero length.
    fn settle(&mut self) {
        loop {
            let (len, next) = match self.stage {
                Stage::Delay => (self.lengths[0], Stage::Attack),
                Stage::Attack => (self.lengths[1], Stage::Hold),
                Stage::Hold => (self.lengths[2], Stage::Decay),
                Stage::Decay => (self.lengths[3], Stage::Sustain),
                Stage::Release => (self.lengths[4], Stage::Done),
                Stage::Sustain | Stage::Done => return,
            };
            if self.current_sample < len {
                return;
            }
            self.current_sample = 0;
            self.stage = next;
            if self.stage == Stage::Sustain && self.sustain_level <= 0.0 {
                self.stage = Stage::Done;
            }
        }
    }

    pub fn released(&self) -> bool {
        matches!(self.stage, Stage::Release | Stage::Done)
    }

    /// Called when the note is released.
    pub fn release(&mut self) {
        if !self.released() {
            self.release_level = self.gain();
            self.stage = Stage::Release;
            self.current_sample = 0;
            self.settle();
        }
    }

    /// Silence the envelope immediately.
    pub fn cancel(&mut self) {
        self.stage = Stage::Done;
        self.current_sample = 0;
    }

    /// The envelope has faded when all subsequent `step` calls would return zero.
    pub fn faded(&self) -> bool {
        self.stage == Stage::Done
    }
}
