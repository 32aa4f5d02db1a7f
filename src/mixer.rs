// seqsynth -- an event sequencer and soundbank synthesizer
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! Summing instrument output into a single stereo signal.

use crate::event::ChannelId;
use crate::wave::Stereo;

/// Where instruments put the samples they produce during a tick.
pub trait WaveSink {
    /// Add a mono sample to a channel. It is spread according to the channel's pan.
    fn output(&mut self, channel: ChannelId, value: f64);
    /// Add a stereo sample to a channel.
    fn output2(&mut self, channel: ChannelId, left: f64, right: f64);
    /// Add a mono sample to the input of an effects unit.
    fn fx_send(&mut self, unit: usize, value: f64);
}

/// Volume and pan of one mixer channel, plus what was played on it during the current sample.
#[derive(Debug, Clone)]
pub struct ChannelStrip {
    pub volume: f64,
    pub pan: f64,
    pub muted: bool,
    acc: Stereo<f64>,
}

impl Default for ChannelStrip {
    fn default() -> Self {
        Self {
            volume: 1.0,
            pan: 0.0,
            muted: false,
            acc: Stereo::SILENCE,
        }
    }
}

/// An effects send bus. Effects themselves are not modelled, the bus returns its
/// input to the master mix scaled by `level`.
#[derive(Debug, Clone, Default)]
pub struct FxBus {
    pub level: f64,
    acc: f64,
}

/// Channel strips and effect buses feeding a master output.
#[derive(Debug, Clone)]
pub struct Mixer {
    strips: Vec<ChannelStrip>,
    buses: Vec<FxBus>,
    pub master: f64,
}

impl Mixer {
    pub fn new(channels: usize, fx_units: usize) -> Self {
        Self {
            strips: vec![ChannelStrip::default(); channels],
            buses: vec![FxBus::default(); fx_units],
            master: 1.0,
        }
    }

    pub fn channels(&self) -> usize {
        self.strips.len()
    }

    pub fn strip(&self, channel: ChannelId) -> Option<&ChannelStrip> {
        self.strips.get(channel as usize)
    }

    pub fn strip_mut(&mut self, channel: ChannelId) -> Option<&mut ChannelStrip> {
        self.strips.get_mut(channel as usize)
    }

    pub fn set_volume(&mut self, channel: ChannelId, volume: f64) {
        if let Some(strip) = self.strip_mut(channel) {
            strip.volume = volume.max(0.0);
        }
    }

    pub fn set_pan(&mut self, channel: ChannelId, pan: f64) {
        if let Some(strip) = self.strip_mut(channel) {
            strip.pan = pan.max(-1.0).min(1.0);
        }
    }

    pub fn set_fx_level(&mut self, unit: usize, level: f64) {
        if let Some(bus) = self.buses.get_mut(unit) {
            bus.level = level;
        }
    }

    /// Mix down everything produced since the last flush and start a new sample.
    ///
    /// ```
    /// use seqsynth::mixer::*;
    /// use seqsynth::wave::Stereo;
    ///
    /// let mut mixer = Mixer::new(2, 1);
    /// mixer.set_pan(1, 1.0);
    /// mixer.output(0, 0.25);
    /// mixer.output(1, 0.5);
    /// assert_eq!(mixer.flush(), Stereo::new(0.25, 0.75));
    /// assert_eq!(mixer.flush(), Stereo::SILENCE);
    /// ```
    pub fn flush(&mut self) -> Stereo<f64> {
        let mut out = Stereo::SILENCE;
        for strip in self.strips.iter_mut() {
            if !strip.muted {
                out += (strip.acc * strip.volume).panned(strip.pan);
            }
            strip.acc = Stereo::SILENCE;
        }
        for bus in self.buses.iter_mut() {
            out += Stereo::mono(bus.acc * bus.level);
            bus.acc = 0.0;
        }
        out * self.master
    }
}

impl WaveSink for Mixer {
    fn output(&mut self, channel: ChannelId, value: f64) {
        if let Some(strip) = self.strips.get_mut(channel as usize) {
            strip.acc += Stereo::mono(value);
        }
    }

    fn output2(&mut self, channel: ChannelId, left: f64, right: f64) {
        if let Some(strip) = self.strips.get_mut(channel as usize) {
            strip.acc += Stereo::new(left, right);
        }
    }

    fn fx_send(&mut self, unit: usize, value: f64) {
        if let Some(bus) = self.buses.get_mut(unit) {
            bus.acc += value;
        }
    }
}
