// seqsynth -- an event sequencer and soundbank synthesizer
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! A basic tone generator, an oscillator shaped by an envelope.

use super::{AllocContext, Instrument, Template};
use crate::envelope::{Envelope, EvalEnvelope};
use crate::event::{param, ChannelId, Event, ParamId};
use crate::mixer::WaveSink;
use crate::note::{key_frequency, Velocity};
use crate::oscillator::{Oscillator, WaveShape};

pub const TYPE_NAME: &str = "Tone";

/// Attack time in seconds.
pub const ATTACK: ParamId = param::USER_BASE;
/// Decay time in seconds.
pub const DECAY: ParamId = param::USER_BASE + 1;
/// Sustain level between 0 and 1.
pub const SUSTAIN: ParamId = param::USER_BASE + 2;
/// Release time in seconds.
pub const RELEASE: ParamId = param::USER_BASE + 3;
/// Wave shape, see `WaveShape::from_param`.
pub const SHAPE: ParamId = param::USER_BASE + 4;

/// Parameter names understood by tone instruments.
///
/// ```
/// use seqsynth::instrument::tone::*;
/// use seqsynth::event::param;
///
/// assert_eq!(param_by_name("attack"), Some(ATTACK));
/// assert_eq!(param_by_name("key"), Some(param::KEY));
/// assert_eq!(param_by_name("wobble"), None);
/// ```
pub fn param_by_name(name: &str) -> Option<ParamId> {
    match name.to_ascii_lowercase().as_str() {
        "attack" => Some(ATTACK),
        "decay" => Some(DECAY),
        "sustain" => Some(SUSTAIN),
        "release" => Some(RELEASE),
        "shape" | "wave" => Some(SHAPE),
        _ => param::by_name(name),
    }
}

pub struct ToneInstr {
    sample_rate: f64,
    channel: ChannelId,
    defaults: Template,
    osc: Oscillator,
    env: Option<EvalEnvelope>,
    gain: f64,
    pan: f64,
}

impl ToneInstr {
    pub fn new(ctx: &AllocContext<'_>, template: Option<&Template>) -> Self {
        let defaults = template.cloned().unwrap_or_default();
        let shape = WaveShape::from_param(defaults.param(SHAPE).unwrap_or(0.0));
        Self {
            sample_rate: ctx.sample_rate,
            channel: ctx.channel,
            defaults,
            osc: Oscillator::new(shape, ctx.sample_rate, 440.0),
            env: None,
            gain: 1.0,
            pan: 0.0,
        }
    }

    fn lookup(&self, evt: &Event, id: ParamId, fallback: f64) -> f64 {
        evt.param(id)
            .or_else(|| self.defaults.param(id))
            .unwrap_or(fallback)
    }

    fn envelope(&self, evt: &Event) -> Envelope {
        Envelope::adsr(
            self.lookup(evt, ATTACK, 0.01),
            self.lookup(evt, DECAY, 0.1),
            self.lookup(evt, SUSTAIN, 0.8),
            self.lookup(evt, RELEASE, 0.2),
        )
    }

    fn apply(&mut self, evt: &Event) {
        if let Some(freq) = evt.param(param::FREQUENCY) {
            self.osc.set_frequency(freq);
        } else if let Some(key) = evt.param(param::KEY) {
            self.osc.set_frequency(key_frequency(key));
        }
        if evt.param(param::VOLUME).is_some() || evt.param(param::VELOCITY).is_some() {
            let volume = self.lookup(evt, param::VOLUME, 1.0);
            let velocity = Velocity::clamped(self.lookup(evt, param::VELOCITY, 127.0));
            self.gain = volume * velocity.as_f64();
        }
        if let Some(pan) = evt.param(param::PAN) {
            self.pan = pan.max(-1.0).min(1.0);
        }
    }
}

impl Instrument for ToneInstr {
    fn start(&mut self, evt: &Event) {
        let frequency = match evt.param(param::FREQUENCY) {
            Some(freq) => freq,
            None => key_frequency(self.lookup(evt, param::KEY, 69.0)),
        };
        self.osc.set_frequency(frequency);
        let volume = self.lookup(evt, param::VOLUME, 1.0);
        let velocity = Velocity::clamped(self.lookup(evt, param::VELOCITY, 127.0));
        self.gain = volume * velocity.as_f64();
        self.pan = self.lookup(evt, param::PAN, 0.0).max(-1.0).min(1.0);
        self.env = Some(self.envelope(evt).instantiate(self.sample_rate));
    }

    fn param(&mut self, evt: &Event) {
        self.apply(evt);
    }

    fn stop(&mut self) {
        if let Some(env) = self.env.as_mut() {
            env.release();
        }
    }

    fn tick(&mut self, out: &mut dyn WaveSink) {
        let env = match self.env.as_mut() {
            Some(env) if !env.faded() => env,
            _ => return,
        };
        let value = self.osc.next_sample() * env.step() * self.gain;
        if self.pan == 0.0 {
            out.output(self.channel, value);
        } else {
            let s = crate::wave::Stereo::panned_mono(value, self.pan);
            out.output2(self.channel, s.left, s.right);
        }
    }

    fn is_finished(&self) -> bool {
        self.env.as_ref().map_or(true, EvalEnvelope::faded)
    }

    fn cancel(&mut self) {
        if let Some(env) = self.env.as_mut() {
            env.cancel();
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::manager::ChannelState;
    use crate::mixer::Mixer;
    use crate::soundbank::SoundBankRegistry;
    use crate::wave::Stereo;

    fn tone(template: &Template) -> ToneInstr {
        let state = ChannelState::default();
        let banks = SoundBankRegistry::new();
        let ctx = AllocContext {
            sample_rate: 8.0,
            channel: 0,
            state: &state,
            soundbanks: &banks,
        };
        ToneInstr::new(&ctx, Some(template))
    }

    #[test]
    fn square_wave_through_envelope() {
        let template = Template::new()
            .with_param(SHAPE, 1.0)
            .with_param(ATTACK, 0.0)
            .with_param(DECAY, 0.0)
            .with_param(SUSTAIN, 0.5)
            .with_param(RELEASE, 0.25);
        let mut instr = tone(&template);
        assert!(instr.is_finished());

        // four samples per period at 2 Hz
        instr.start(&Event::note(1, 1, 0, 0, 4, 0, 127).with_param(param::FREQUENCY, 2.0));
        let mut mixer = Mixer::new(1, 0);
        let mut samples = Vec::new();
        for _ in 0..4 {
            instr.tick(&mut mixer);
            samples.push(mixer.flush());
        }
        assert_eq!(
            samples,
            vec![
                Stereo::mono(0.5),
                Stereo::mono(0.5),
                Stereo::mono(-0.5),
                Stereo::mono(-0.5)
            ]
        );
        instr.stop();
        assert!(!instr.is_finished());
        instr.tick(&mut mixer);
        instr.tick(&mut mixer);
        assert!(instr.is_finished());
    }

    #[test]
    fn cancel_finishes_immediately() {
        let mut instr = tone(&Template::new().with_param(SUSTAIN, 1.0));
        instr.start(&Event::note(1, 1, 0, 0, 0, 60, 100));
        assert!(!instr.is_finished());
        instr.cancel();
        assert!(instr.is_finished());
    }
}
