// seqsynth -- an event sequencer and soundbank synthesizer
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! Generators and the modulators connecting controller sources to them.

use super::convert::{Curve, CurveShape};

/// A synthesis parameter of a zone, expressed in soundbank units.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Gen {
    ModLfoToPitch,
    VibLfoToPitch,
    ModEnvToPitch,
    /// Absolute cents.
    InitialFilterFc,
    /// Centibels above DC gain.
    InitialFilterQ,
    ModLfoToFilterFc,
    ModEnvToFilterFc,
    ModLfoToVolume,
    /// Tenths of a percent.
    ChorusSend,
    ReverbSend,
    /// Tenths of a percent, -500 is hard left.
    Pan,
    DelayModLfo,
    FreqModLfo,
    DelayVibLfo,
    FreqVibLfo,
    DelayModEnv,
    AttackModEnv,
    HoldModEnv,
    DecayModEnv,
    SustainModEnv,
    ReleaseModEnv,
    KeyToModEnvHold,
    KeyToModEnvDecay,
    DelayVolEnv,
    AttackVolEnv,
    HoldVolEnv,
    DecayVolEnv,
    /// Centibels of attenuation.
    SustainVolEnv,
    ReleaseVolEnv,
    KeyToVolEnvHold,
    KeyToVolEnvDecay,
    InitialAttenuation,
    CoarseTune,
    FineTune,
    ScaleTuning,
    OverridingKey,
    OverridingVelocity,
}

impl Gen {
    pub const COUNT: usize = 37;

    pub const ALL: [Gen; Gen::COUNT] = [
        Gen::ModLfoToPitch,
        Gen::VibLfoToPitch,
        Gen::ModEnvToPitch,
        Gen::InitialFilterFc,
        Gen::InitialFilterQ,
        Gen::ModLfoToFilterFc,
        Gen::ModEnvToFilterFc,
        Gen::ModLfoToVolume,
        Gen::ChorusSend,
        Gen::ReverbSend,
        Gen::Pan,
        Gen::DelayModLfo,
        Gen::FreqModLfo,
        Gen::DelayVibLfo,
        Gen::FreqVibLfo,
        Gen::DelayModEnv,
        Gen::AttackModEnv,
        Gen::HoldModEnv,
        Gen::DecayModEnv,
        Gen::SustainModEnv,
        Gen::ReleaseModEnv,
        Gen::KeyToModEnvHold,
        Gen::KeyToModEnvDecay,
        Gen::DelayVolEnv,
        Gen::AttackVolEnv,
        Gen::HoldVolEnv,
        Gen::DecayVolEnv,
        Gen::SustainVolEnv,
        Gen::ReleaseVolEnv,
        Gen::KeyToVolEnvHold,
        Gen::KeyToVolEnvDecay,
        Gen::InitialAttenuation,
        Gen::CoarseTune,
        Gen::FineTune,
        Gen::ScaleTuning,
        Gen::OverridingKey,
        Gen::OverridingVelocity,
    ];

    fn index(self) -> usize {
        self as usize
    }

    /// Value of the generator when no scope sets it.
    pub fn default_value(self) -> f64 {
        match self {
            Gen::InitialFilterFc => 13500.0,
            Gen::DelayModLfo
            | Gen::DelayVibLfo
            | Gen::DelayModEnv
            | Gen::AttackModEnv
            | Gen::HoldModEnv
            | Gen::DecayModEnv
            | Gen::ReleaseModEnv
            | Gen::DelayVolEnv
            | Gen::AttackVolEnv
            | Gen::HoldVolEnv
            | Gen::DecayVolEnv
            | Gen::ReleaseVolEnv => -12000.0,
            Gen::ScaleTuning => 100.0,
            Gen::OverridingKey | Gen::OverridingVelocity => -1.0,
            _ => 0.0,
        }
    }
}

/// A value for every generator, plus which of them were set explicitly.
#[derive(Debug, Clone, PartialEq)]
pub struct GenSet {
    values: [f64; Gen::COUNT],
    active: u64,
}

impl Default for GenSet {
    fn default() -> Self {
        let mut values = [0.0; Gen::COUNT];
        for gen in Gen::ALL.iter() {
            values[gen.index()] = gen.default_value();
        }
        Self { values, active: 0 }
    }
}

impl GenSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, gen: Gen) -> f64 {
        self.values[gen.index()]
    }

    pub fn set(&mut self, gen: Gen, value: f64) {
        self.values[gen.index()] = value;
        self.active |= 1 << gen.index();
    }

    pub fn with(mut self, gen: Gen, value: f64) -> Self {
        self.set(gen, value);
        self
    }

    pub fn is_active(&self, gen: Gen) -> bool {
        self.active & (1 << gen.index()) != 0
    }

    /// Add a modulation amount without marking the generator as set.
    pub fn add(&mut self, gen: Gen, amount: f64) {
        self.values[gen.index()] += amount;
    }

    /// Take over every generator that is set in `narrower`.
    pub fn overlay(&mut self, narrower: &GenSet) {
        for gen in Gen::ALL.iter() {
            if narrower.is_active(*gen) {
                self.set(*gen, narrower.get(*gen));
            }
        }
    }
}

/// Where a modulator takes its input from.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ModSource {
    /// A constant full-scale input.
    None,
    Velocity,
    Key,
    ChannelPressure,
    PitchWheel,
    PitchWheelSensitivity,
    Controller(u8),
}

impl ModSource {
    /// Whether the source can change while a note is playing.
    pub fn is_realtime(self) -> bool {
        !matches!(self, ModSource::None | ModSource::Velocity | ModSource::Key)
    }
}

/// A connection from a source, scaled by a second source, to a generator.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Modulator {
    pub src: ModSource,
    pub src_curve: Curve,
    pub amount_src: ModSource,
    pub amount_curve: Curve,
    pub dst: Gen,
    pub amount: f64,
}

impl Modulator {
    pub fn new(src: ModSource, src_curve: Curve, dst: Gen, amount: f64) -> Self {
        Self {
            src,
            src_curve,
            amount_src: ModSource::None,
            amount_curve: Curve::LINEAR,
            dst,
            amount,
        }
    }

    pub fn with_amount_source(mut self, src: ModSource, curve: Curve) -> Self {
        self.amount_src = src;
        self.amount_curve = curve;
        self
    }

    /// Two modulators with the same identity are the same connection at different scopes.
    pub fn identity(&self) -> (ModSource, ModSource, Gen) {
        (self.src, self.amount_src, self.dst)
    }

    pub fn is_realtime(&self) -> bool {
        self.src.is_realtime() || self.amount_src.is_realtime()
    }

    /// Contribution of this modulator to its destination.
    pub fn eval(&self, ctl: &ControllerState, key: u8, velocity: u8) -> f64 {
        let value = self.src_curve.eval(ctl.source_value(self.src, key, velocity));
        let scale = match self.amount_src {
            ModSource::None => 1.0,
            src => self.amount_curve.eval(ctl.source_value(src, key, velocity)),
        };
        self.amount * value * scale
    }
}

/// Merge the modulators of a narrower scope into `base`.
/// A narrower modulator replaces the broader one with the same identity in place,
/// new connections are appended.
pub fn merge_mods(base: &mut Vec<Modulator>, narrower: &[Modulator]) {
    for m in narrower {
        match base.iter_mut().find(|b| b.identity() == m.identity()) {
            Some(existing) => *existing = *m,
            None => base.push(*m),
        }
    }
}

/// The modulators every instrument starts out with.
///
/// Channel volume and pan are applied by the mixer and have no default modulator here.
pub fn default_mods() -> Vec<Modulator> {
    let neg_concave = Curve::new(CurveShape::Concave, true, false);
    let neg_linear = Curve::new(CurveShape::Linear, true, false);
    let bipolar = Curve::new(CurveShape::Linear, false, true);
    vec![
        Modulator::new(
            ModSource::Velocity,
            neg_concave,
            Gen::InitialAttenuation,
            960.0,
        ),
        Modulator::new(ModSource::Velocity, neg_linear, Gen::InitialFilterFc, -2400.0),
        Modulator::new(
            ModSource::ChannelPressure,
            Curve::LINEAR,
            Gen::VibLfoToPitch,
            50.0,
        ),
        Modulator::new(
            ModSource::Controller(1),
            Curve::LINEAR,
            Gen::VibLfoToPitch,
            50.0,
        ),
        Modulator::new(
            ModSource::Controller(11),
            neg_concave,
            Gen::InitialAttenuation,
            960.0,
        ),
        Modulator::new(ModSource::Controller(91), Curve::LINEAR, Gen::ReverbSend, 200.0),
        Modulator::new(ModSource::Controller(93), Curve::LINEAR, Gen::ChorusSend, 200.0),
        Modulator::new(ModSource::PitchWheel, bipolar, Gen::FineTune, 12700.0)
            .with_amount_source(ModSource::PitchWheelSensitivity, Curve::LINEAR),
    ]
}

/// Continuous controller state of a channel as seen by modulators.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerState {
    pub controllers: [u8; 128],
    /// 14 bit, 8192 is centered.
    pub pitch_wheel: u16,
    /// Range of the pitch wheel in semitones.
    pub pitch_sensitivity: f64,
    pub pressure: u8,
}

impl Default for ControllerState {
    fn default() -> Self {
        let mut state = Self {
            controllers: [0; 128],
            pitch_wheel: 8192,
            pitch_sensitivity: 2.0,
            pressure: 0,
        };
        state.reset();
        state
    }
}

impl ControllerState {
    /// Reset all controllers, keeping channel volume and pan.
    pub fn reset(&mut self) {
        let volume = self.controllers[7];
        let pan = self.controllers[10];
        self.controllers = [0; 128];
        self.controllers[7] = if volume == 0 { 100 } else { volume };
        self.controllers[10] = if pan == 0 { 64 } else { pan };
        self.controllers[11] = 127;
        // no registered parameter selected
        self.controllers[100] = 127;
        self.controllers[101] = 127;
        self.pitch_wheel = 8192;
        self.pressure = 0;
    }

    /// Normalized value in [0, 1] of a modulation source.
    pub fn source_value(&self, src: ModSource, key: u8, velocity: u8) -> f64 {
        match src {
            ModSource::None => 1.0,
            ModSource::Velocity => velocity as f64 / 127.0,
            ModSource::Key => key as f64 / 127.0,
            ModSource::ChannelPressure => self.pressure as f64 / 127.0,
            ModSource::PitchWheel => {
                let wheel = self.pitch_wheel.min(16383) as f64;
                if wheel >= 8192.0 {
                    0.5 + (wheel - 8192.0) / 16382.0
                } else {
                    wheel / 16384.0
                }
            }
            ModSource::PitchWheelSensitivity => self.pitch_sensitivity / 127.0,
            ModSource::Controller(cc) => self.controllers[cc as usize & 0x7f] as f64 / 127.0,
        }
    }
}

/// Add the contributions of all modulators to the generator values.
pub fn apply_mods(
    gens: &mut GenSet,
    mods: &[Modulator],
    ctl: &ControllerState,
    key: u8,
    velocity: u8,
) {
    for m in mods {
        gens.add(m.dst, m.eval(ctl, key, velocity));
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn gen_table_is_complete() {
        for (i, gen) in Gen::ALL.iter().enumerate() {
            assert_eq!(gen.index(), i);
        }
    }

    #[test]
    fn overlay_only_takes_active() {
        let mut base = GenSet::new().with(Gen::Pan, -200.0).with(Gen::FineTune, 10.0);
        let zone = GenSet::new().with(Gen::FineTune, -5.0);
        base.overlay(&zone);
        assert_eq!(base.get(Gen::Pan), -200.0);
        assert_eq!(base.get(Gen::FineTune), -5.0);
        assert_eq!(base.get(Gen::InitialFilterFc), 13500.0);
        assert!(!base.is_active(Gen::InitialFilterFc));
    }

    #[test]
    fn narrower_modulator_replaces_in_place() {
        let mut mods = default_mods();
        let count = mods.len();
        let louder = Modulator::new(
            ModSource::Controller(11),
            Curve::LINEAR,
            Gen::InitialAttenuation,
            100.0,
        );
        let extra = Modulator::new(ModSource::Key, Curve::LINEAR, Gen::Pan, 500.0);
        merge_mods(&mut mods, &[louder, extra]);
        assert_eq!(mods.len(), count + 1);
        assert_eq!(mods[4], louder);
        assert_eq!(mods[count], extra);
    }

    #[test]
    fn pitch_wheel_bends_by_sensitivity() {
        let mods = default_mods();
        let mut ctl = ControllerState::default();
        ctl.pitch_wheel = 16383;
        let mut gens = GenSet::new();
        apply_mods(&mut gens, &mods[7..], &ctl, 60, 127);
        assert!((gens.get(Gen::FineTune) - 200.0).abs() < 1e-9);
    }

    #[test]
    fn full_velocity_is_not_attenuated() {
        let ctl = ControllerState::default();
        let mut gens = GenSet::new();
        apply_mods(&mut gens, &default_mods()[..1], &ctl, 60, 127);
        assert_eq!(gens.get(Gen::InitialAttenuation), 0.0);
        let mut soft = GenSet::new();
        apply_mods(&mut soft, &default_mods()[..1], &ctl, 60, 1);
        assert!(soft.get(Gen::InitialAttenuation) > 400.0);
    }
}
