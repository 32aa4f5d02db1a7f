// seqsynth -- an event sequencer and soundbank synthesizer
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! Sample playback from a soundbank.
//!
//! A player resolves the bank and program of its channel when it is allocated, and the
//! zones for its key and velocity when it starts. Every layered zone becomes a voice with
//! its own volume and modulation envelopes, two LFOs and a lowpass filter.

use std::f64::consts::FRAC_1_SQRT_2;
use std::sync::Arc;

use log::{trace, warn};

use super::{AllocContext, Instrument, Template};
use crate::envelope::{Envelope, EvalEnvelope};
use crate::event::{param, ChannelId, Event, EventKind, ParamId};
use crate::filter::{Biquad, BiquadCoefficients};
use crate::manager::ChannelState;
use crate::mixer::WaveSink;
use crate::note::Velocity;
use crate::oscillator::{Oscillator, WaveShape};
use crate::soundbank::convert::{
    attenuation, cents_to_frequency, cents_to_ratio, gain, timecents_to_seconds,
};
use crate::soundbank::modulator::{Gen, GenSet};
use crate::soundbank::{Articulation, LoopMode, SoundBank, ZoneMatch};
use crate::wave::Stereo;

pub const TYPE_NAME: &str = "SoundBank";

/// Overrides the bank selected on the channel.
pub const BANK: ParamId = param::USER_BASE;
/// Overrides the program selected on the channel.
pub const PROGRAM: ParamId = param::USER_BASE + 1;

/// Effects unit receiving the reverb send.
pub const REVERB_UNIT: usize = 0;
/// Effects unit receiving the chorus send.
pub const CHORUS_UNIT: usize = 1;

/// Samples between filter coefficient updates.
const FILTER_INTERVAL: u32 = 32;

pub struct SoundBankPlayer {
    bank: Arc<SoundBank>,
    sample_rate: f64,
    channel: ChannelId,
    bank_number: u32,
    program: u8,
    state: ChannelState,
    key: u8,
    velocity: u8,
    volume: f64,
    pan: f64,
    exclusive_class: u32,
    voices: Vec<ZoneVoice>,
}

impl SoundBankPlayer {
    /// Create a player for the soundbank named in the template, if that bank has an
    /// instrument for the selected bank and program.
    pub fn allocate(ctx: &AllocContext<'_>, template: Option<&Template>) -> Option<Self> {
        let name = template.and_then(|t| t.soundbank.as_deref())?;
        let bank = match ctx.soundbanks.lock(name) {
            Some(bank) => bank,
            None => {
                warn!("soundbank {} is not loaded", name);
                return None;
            }
        };
        let bank_number = template
            .and_then(|t| t.param(BANK))
            .map_or(ctx.state.bank(), |b| b.max(0.0) as u32);
        let program = template
            .and_then(|t| t.param(PROGRAM))
            .map_or(ctx.state.program, |p| p.max(0.0).min(127.0) as u8);
        if bank.get_instr(bank_number, program, true).is_none() {
            warn!(
                "{}: no instrument for bank {} program {}",
                name, bank_number, program
            );
            return None;
        }
        Some(Self {
            bank,
            sample_rate: ctx.sample_rate,
            channel: ctx.channel,
            bank_number,
            program,
            state: ctx.state.clone(),
            key: 60,
            velocity: 100,
            volume: 1.0,
            pan: 0.0,
            exclusive_class: 0,
            voices: Vec::new(),
        })
    }

    /// Number of zones currently sounding.
    pub fn layers(&self) -> usize {
        self.voices.len()
    }

    fn refresh_gens(&mut self) {
        for voice in self.voices.iter_mut() {
            voice.gens = voice
                .articulation
                .resolve(&self.state.controls, self.key, self.velocity);
        }
    }
}

impl Instrument for SoundBankPlayer {
    fn start(&mut self, evt: &Event) {
        self.key = evt.param_or(param::KEY, 60.0).round().max(0.0).min(127.0) as u8;
        self.velocity = Velocity::clamped(evt.param_or(param::VELOCITY, 100.0)).to_midi();
        self.volume = evt.param_or(param::VOLUME, 1.0);
        self.pan = evt.param_or(param::PAN, 0.0);
        self.voices.clear();
        self.exclusive_class = 0;

        let instr = match self
            .bank
            .get_instr(self.bank_number, self.program, true)
        {
            Some(instr) => instr,
            None => return,
        };
        for found in instr.zones(self.key, self.velocity) {
            let articulation = instr.articulation(&found, &self.state.controls, self.key, self.velocity);
            if self.exclusive_class == 0 {
                self.exclusive_class = found.zone.exclusive_class;
            }
            self.voices.push(ZoneVoice::new(
                &self.bank,
                &found,
                articulation,
                &self.state,
                self.key,
                self.velocity,
                self.sample_rate,
            ));
        }
        trace!(
            "{} layers for key {} velocity {}",
            self.voices.len(),
            self.key,
            self.velocity
        );
    }

    fn param(&mut self, evt: &Event) {
        if evt.kind() == EventKind::Control {
            let status = evt.param_or(param::STATUS, 0.0) as u8;
            let data1 = evt.param_or(param::DATA1, 0.0) as u8;
            let data2 = evt.param_or(param::DATA2, 0.0) as u8;
            if self.state.apply(status & 0xf0, data1, data2) {
                self.refresh_gens();
            }
            return;
        }
        if let Some(volume) = evt.param(param::VOLUME) {
            self.volume = volume;
        }
        if let Some(pan) = evt.param(param::PAN) {
            self.pan = pan;
        }
    }

    fn stop(&mut self) {
        for voice in self.voices.iter_mut() {
            voice.release();
        }
    }

    fn tick(&mut self, out: &mut dyn WaveSink) {
        let mut mix = Stereo::SILENCE;
        let mut reverb = 0.0;
        let mut chorus = 0.0;
        for voice in self.voices.iter_mut() {
            if let Some(value) = voice.next(self.sample_rate) {
                let pan = (voice.gens.get(Gen::Pan) / 500.0 + self.pan).max(-1.0).min(1.0);
                mix += Stereo::panned_mono(value, pan);
                reverb += value * voice.gens.get(Gen::ReverbSend).max(0.0) / 1000.0;
                chorus += value * voice.gens.get(Gen::ChorusSend).max(0.0) / 1000.0;
            }
        }
        mix *= self.volume;
        out.output2(self.channel, mix.left, mix.right);
        if reverb != 0.0 {
            out.fx_send(REVERB_UNIT, reverb * self.volume);
        }
        if chorus != 0.0 {
            out.fx_send(CHORUS_UNIT, chorus * self.volume);
        }
    }

    fn is_finished(&self) -> bool {
        self.voices.iter().all(ZoneVoice::finished)
    }

    fn cancel(&mut self) {
        for voice in self.voices.iter_mut() {
            voice.vol_env.cancel();
        }
    }

    fn destroy(&mut self) {
        self.voices.clear();
    }

    fn exclusive_class(&self) -> u32 {
        self.exclusive_class
    }
}

/// A low frequency triangle oscillator that starts after a delay.
struct Lfo {
    delay: u64,
    osc: Oscillator,
}

impl Lfo {
    fn new(delay_tc: f64, freq_cents: f64, sample_rate: f64) -> Self {
        Self {
            delay: (timecents_to_seconds(delay_tc) * sample_rate) as u64,
            osc: Oscillator::new(
                WaveShape::Triangle,
                sample_rate,
                cents_to_frequency(freq_cents),
            ),
        }
    }

    fn next(&mut self) -> f64 {
        if self.delay > 0 {
            self.delay -= 1;
            0.0
        } else {
            self.osc.next_sample()
        }
    }
}

/// Playback state of a single zone.
struct ZoneVoice {
    data: Option<Arc<[f32]>>,
    position: f64,
    /// Playback rate at the unmodulated pitch, in sample frames per output sample.
    rate: f64,
    loop_mode: LoopMode,
    loop_start: usize,
    loop_end: usize,
    articulation: Articulation,
    gens: GenSet,
    vol_env: EvalEnvelope,
    mod_env: EvalEnvelope,
    vib_lfo: Lfo,
    mod_lfo: Lfo,
    filter: Biquad,
    coefficients: BiquadCoefficients,
    filter_countdown: u32,
    released: bool,
    exhausted: bool,
}

impl ZoneVoice {
    fn new(
        bank: &SoundBank,
        found: &ZoneMatch<'_>,
        articulation: Articulation,
        state: &ChannelState,
        key: u8,
        velocity: u8,
        sample_rate: f64,
    ) -> Self {
        let zone = found.zone;
        let sample = zone.sample.and_then(|index| bank.sample(index));
        let gens = articulation.resolve(&state.controls, key, velocity);

        let played_key = match gens.get(Gen::OverridingKey) {
            k if k >= 0.0 => k,
            _ => key as f64,
        };
        let (rate, loop_points, data) = match sample {
            Some(sample) => {
                let root = zone.root_key.unwrap_or(sample.root_key) as f64;
                let cents = (played_key - root) * gens.get(Gen::ScaleTuning)
                    + gens.get(Gen::CoarseTune) * 100.0
                    + gens.get(Gen::FineTune)
                    + sample.correction;
                let rate = cents_to_ratio(cents) * sample.rate as f64 / sample_rate;
                let loop_points = zone
                    .loop_points
                    .unwrap_or((sample.loop_start, sample.loop_end));
                (rate, loop_points, sample.data().cloned())
            }
            None => (0.0, (0, 0), None),
        };
        let (vol_env, mod_env) = envelopes(&gens, played_key, sample_rate);

        Self {
            data,
            position: 0.0,
            rate,
            loop_mode: zone.loop_mode,
            loop_start: loop_points.0,
            loop_end: loop_points.1,
            vib_lfo: Lfo::new(
                gens.get(Gen::DelayVibLfo),
                gens.get(Gen::FreqVibLfo),
                sample_rate,
            ),
            mod_lfo: Lfo::new(
                gens.get(Gen::DelayModLfo),
                gens.get(Gen::FreqModLfo),
                sample_rate,
            ),
            articulation,
            gens,
            vol_env,
            mod_env,
            filter: Biquad::new(),
            coefficients: BiquadCoefficients::identity(),
            filter_countdown: 0,
            released: false,
            exhausted: false,
        }
    }

    fn finished(&self) -> bool {
        self.exhausted || self.data.is_none() || self.vol_env.faded()
    }

    fn release(&mut self) {
        self.released = true;
        self.vol_env.release();
        self.mod_env.release();
    }

    fn looping(&self) -> bool {
        let valid = self.loop_end > self.loop_start + 1;
        match self.loop_mode {
            LoopMode::NoLoop => false,
            LoopMode::Continuous => valid,
            LoopMode::UntilRelease => valid && !self.released,
        }
    }

    /// Interpolated sample at the current position, advancing by `step` frames.
    fn fetch(&mut self, step: f64) -> Option<f64> {
        let looping = self.looping();
        let data = self.data.as_ref()?;
        if looping {
            let length = (self.loop_end - self.loop_start) as f64;
            while self.position >= self.loop_end as f64 {
                self.position -= length;
            }
        }
        let index = self.position as usize;
        if index >= data.len() {
            return None;
        }
        let next = if looping && index + 1 >= self.loop_end {
            self.loop_start
        } else {
            index + 1
        };
        let s0 = data[index] as f64;
        let s1 = data.get(next).map_or(0.0, |s| *s as f64);
        let frac = self.position - index as f64;
        self.position += step;
        Some(s0 + (s1 - s0) * frac)
    }

    fn next(&mut self, sample_rate: f64) -> Option<f64> {
        if self.finished() {
            return None;
        }
        let vib = self.vib_lfo.next();
        let lfo = self.mod_lfo.next();
        let env = self.mod_env.step();

        let pitch_cents = vib * self.gens.get(Gen::VibLfoToPitch)
            + lfo * self.gens.get(Gen::ModLfoToPitch)
            + env * self.gens.get(Gen::ModEnvToPitch);
        let step = if pitch_cents == 0.0 {
            self.rate
        } else {
            self.rate * cents_to_ratio(pitch_cents)
        };
        let raw = match self.fetch(step) {
            Some(raw) => raw,
            None => {
                self.exhausted = true;
                return None;
            }
        };

        if self.filter_countdown == 0 {
            let cutoff = self.gens.get(Gen::InitialFilterFc)
                + lfo * self.gens.get(Gen::ModLfoToFilterFc)
                + env * self.gens.get(Gen::ModEnvToFilterFc);
            let q = gain(self.gens.get(Gen::InitialFilterQ)) * FRAC_1_SQRT_2;
            self.coefficients =
                BiquadCoefficients::lowpass(sample_rate, cents_to_frequency(cutoff), q);
            self.filter_countdown = FILTER_INTERVAL;
        }
        self.filter_countdown -= 1;
        let filtered = self.filter.step(&self.coefficients, raw);

        let cb = self.gens.get(Gen::InitialAttenuation) + lfo * self.gens.get(Gen::ModLfoToVolume);
        Some(filtered * self.vol_env.step() * attenuation(cb))
    }
}

/// Volume and modulation envelope of a zone.
fn envelopes(gens: &GenSet, key: f64, sample_rate: f64) -> (EvalEnvelope, EvalEnvelope) {
    let seconds = |g: Gen| timecents_to_seconds(gens.get(g));
    let keyed = |g: Gen, scale: Gen| timecents_to_seconds(gens.get(g) + gens.get(scale) * (60.0 - key));
    let vol = Envelope {
        delay: seconds(Gen::DelayVolEnv),
        attack: seconds(Gen::AttackVolEnv),
        hold: keyed(Gen::HoldVolEnv, Gen::KeyToVolEnvHold),
        decay: keyed(Gen::DecayVolEnv, Gen::KeyToVolEnvDecay),
        sustain: attenuation(gens.get(Gen::SustainVolEnv)),
        release: seconds(Gen::ReleaseVolEnv),
    };
    let modulation = Envelope {
        delay: seconds(Gen::DelayModEnv),
        attack: seconds(Gen::AttackModEnv),
        hold: keyed(Gen::HoldModEnv, Gen::KeyToModEnvHold),
        decay: keyed(Gen::DecayModEnv, Gen::KeyToModEnvDecay),
        sustain: 1.0 - gens.get(Gen::SustainModEnv).max(0.0).min(1000.0) / 1000.0,
        release: seconds(Gen::ReleaseModEnv),
    };
    (vol.instantiate(sample_rate), modulation.instantiate(sample_rate))
}
