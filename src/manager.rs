// seqsynth -- an event sequencer and soundbank synthesizer
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! The instrument manager knows every instrument type and configured instrument,
//! allocates voices for events and owns the mixer and the audio output.

use std::collections::BTreeMap;
use std::io;

use log::{debug, trace};
use snafu::Snafu;

use crate::event::{param, ChannelId, Event, InstrId, ParamId};
use crate::instrument::{AllocContext, Instrument, InstrFactory, EventFactory, Template};
use crate::mixer::Mixer;
use crate::output::WaveOut;
use crate::soundbank::modulator::ControllerState;
use crate::soundbank::SoundBankRegistry;

/// Number of MIDI channels.
pub const CHANNELS: usize = 16;
/// Number of effect send buses, see `instrument::player` for their use.
pub const FX_UNITS: usize = 2;

#[derive(Debug, Snafu)]
pub enum ManagerError {
    #[snafu(display("instrument type {} is already registered", name))]
    DuplicateType { name: String },
    #[snafu(display("unknown instrument type {}", name))]
    UnknownType { name: String },
    #[snafu(display("instrument id {} is already in use", id))]
    DuplicateInstrument { id: InstrId },
    #[snafu(display("undefined instrument id {}", id))]
    UnknownInstrument { id: InstrId },
    #[snafu(display("instrument {} ({}) could not be allocated", id, name))]
    AllocationFailed { id: InstrId, name: String },
}

pub type ParamMap = Box<dyn Fn(&str) -> Option<ParamId> + Send + Sync>;
pub type TemplateCleanup = Box<dyn Fn(&mut Template) + Send + Sync>;

/// A registered instrument type.
pub struct TypeEntry {
    name: String,
    instr_factory: InstrFactory,
    event_factory: EventFactory,
    param_map: Option<ParamMap>,
    cleanup: Option<TemplateCleanup>,
}

impl TypeEntry {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Map parameter names of this type to ids, used when loading scores.
    pub fn with_param_map<F>(&mut self, map: F) -> &mut Self
    where
        F: Fn(&str) -> Option<ParamId> + Send + Sync + 'static,
    {
        self.param_map = Some(Box::new(map));
        self
    }

    /// Called on the template of an instrument of this type when it is removed.
    pub fn with_cleanup<F>(&mut self, cleanup: F) -> &mut Self
    where
        F: Fn(&mut Template) + Send + Sync + 'static,
    {
        self.cleanup = Some(Box::new(cleanup));
        self
    }
}

/// A configured instrument that events refer to by id.
#[derive(Debug, Clone, PartialEq)]
pub struct InstrConfig {
    pub id: InstrId,
    pub name: String,
    pub type_name: String,
    pub template: Template,
}

/// How to look up a configured instrument.
#[derive(Debug, Copy, Clone)]
pub enum InstrKey<'a> {
    Id(InstrId),
    Name(&'a str),
}

/// MIDI state of a channel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelState {
    pub bank_msb: u8,
    pub bank_lsb: u8,
    pub program: u8,
    pub controls: ControllerState,
}

impl ChannelState {
    /// The selected bank, packed as `msb << 7 | lsb`.
    pub fn bank(&self) -> u32 {
        (self.bank_msb as u32) << 7 | self.bank_lsb as u32
    }

    /// Apply a channel message, given by the upper nibble of its status byte.
    /// Returns whether the message changed any state.
    ///
    /// ```
    /// use seqsynth::manager::ChannelState;
    ///
    /// let mut state = ChannelState::default();
    /// assert!(state.apply(0xB0, 0, 1));
    /// assert!(state.apply(0xB0, 32, 3));
    /// assert!(state.apply(0xC0, 42, 0));
    /// assert_eq!(state.bank(), 131);
    /// assert_eq!(state.program, 42);
    /// assert!(!state.apply(0x90, 60, 100));
    /// ```
    pub fn apply(&mut self, kind: u8, data1: u8, data2: u8) -> bool {
        let data1 = data1 & 0x7f;
        let data2 = data2 & 0x7f;
        match kind {
            0xB0 => {
                self.control_change(data1, data2);
                true
            }
            0xC0 => {
                self.program = data1;
                true
            }
            0xD0 => {
                self.controls.pressure = data1;
                true
            }
            0xE0 => {
                self.controls.pitch_wheel = data1 as u16 | (data2 as u16) << 7;
                true
            }
            _ => false,
        }
    }

    fn control_change(&mut self, controller: u8, value: u8) {
        match controller {
            0 => self.bank_msb = value,
            32 => self.bank_lsb = value,
            121 => {
                self.controls.reset();
                return;
            }
            _ => {}
        }
        self.controls.controllers[controller as usize] = value;
        // data entry for the pitch bend range, registered parameter 0/0
        let rpn = (
            self.controls.controllers[101],
            self.controls.controllers[100],
        );
        if rpn == (0, 0) && (controller == 6 || controller == 38) {
            let semitones = self.controls.controllers[6] as f64;
            let cents = self.controls.controllers[38] as f64;
            self.controls.pitch_sensitivity = semitones + cents / 100.0;
        }
    }

    /// Mixer volume of the channel volume controller.
    pub fn volume(&self) -> f64 {
        let v = self.controls.controllers[7] as f64 / 127.0;
        v * v
    }

    /// Mixer pan of the channel pan controller.
    pub fn pan(&self) -> f64 {
        ((self.controls.controllers[10] as f64 - 64.0) / 63.0)
            .max(-1.0)
            .min(1.0)
    }
}

pub struct InstrumentManager {
    sample_rate: f64,
    types: Vec<TypeEntry>,
    instruments: BTreeMap<InstrId, InstrConfig>,
    channels: Vec<ChannelState>,
    mixer: Mixer,
    out: Box<dyn WaveOut>,
    soundbanks: SoundBankRegistry,
    allocated: u64,
    deallocated: u64,
}

impl InstrumentManager {
    pub fn new(sample_rate: u32, out: Box<dyn WaveOut>) -> Self {
        let mut mixer = Mixer::new(CHANNELS, FX_UNITS);
        let channels = vec![ChannelState::default(); CHANNELS];
        for (ch, state) in channels.iter().enumerate() {
            mixer.set_volume(ch as ChannelId, state.volume());
            mixer.set_pan(ch as ChannelId, state.pan());
        }
        Self {
            sample_rate: sample_rate as f64,
            types: Vec::new(),
            instruments: BTreeMap::new(),
            channels,
            mixer,
            out,
            soundbanks: SoundBankRegistry::new(),
            allocated: 0,
            deallocated: 0,
        }
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Register an instrument type. The returned entry can be configured further.
    pub fn add_type<F, E>(
        &mut self,
        name: &str,
        instr_factory: F,
        event_factory: E,
    ) -> Result<&mut TypeEntry, ManagerError>
    where
        F: Fn(&AllocContext<'_>, Option<&Template>) -> Option<Box<dyn Instrument>>
            + Send
            + Sync
            + 'static,
        E: Fn(Option<&Template>) -> Event + Send + Sync + 'static,
    {
        if self.type_entry(name).is_some() {
            return Err(ManagerError::DuplicateType {
                name: name.to_string(),
            });
        }
        debug!("registering instrument type {}", name);
        self.types.push(TypeEntry {
            name: name.to_string(),
            instr_factory: Box::new(instr_factory),
            event_factory: Box::new(event_factory),
            param_map: None,
            cleanup: None,
        });
        let last = self.types.len() - 1;
        Ok(&mut self.types[last])
    }

    fn type_entry(&self, name: &str) -> Option<&TypeEntry> {
        self.types.iter().find(|t| t.name == name)
    }

    /// Configure an instrument of a registered type under a numeric id.
    pub fn add_instrument(
        &mut self,
        id: InstrId,
        name: &str,
        type_name: &str,
        template: Template,
    ) -> Result<&mut InstrConfig, ManagerError> {
        if self.type_entry(type_name).is_none() {
            return Err(ManagerError::UnknownType {
                name: type_name.to_string(),
            });
        }
        if self.instruments.contains_key(&id) {
            return Err(ManagerError::DuplicateInstrument { id });
        }
        debug!("instrument {} is {} of type {}", id, name, type_name);
        Ok(self.instruments.entry(id).or_insert(InstrConfig {
            id,
            name: name.to_string(),
            type_name: type_name.to_string(),
            template,
        }))
    }

    /// Remove an instrument, running the cleanup hook of its type on the template.
    pub fn remove_instrument(&mut self, id: InstrId) -> Option<InstrConfig> {
        let mut config = self.instruments.remove(&id)?;
        let cleanup = self
            .types
            .iter()
            .find(|t| t.name == config.type_name)
            .and_then(|t| t.cleanup.as_ref());
        if let Some(cleanup) = cleanup {
            cleanup(&mut config.template);
        }
        Some(config)
    }

    pub fn find_instr(&self, key: InstrKey<'_>) -> Option<&InstrConfig> {
        match key {
            InstrKey::Id(id) => self.instruments.get(&id),
            InstrKey::Name(name) => self.instruments.values().find(|c| c.name == name),
        }
    }

    pub fn instruments(&self) -> impl Iterator<Item = &InstrConfig> {
        self.instruments.values()
    }

    /// Id of a named parameter for an instrument, falling back to the well-known names.
    pub fn param_id(&self, instr: InstrKey<'_>, name: &str) -> Option<ParamId> {
        let mapped = self
            .find_instr(instr)
            .and_then(|config| self.type_entry(&config.type_name))
            .and_then(|entry| entry.param_map.as_ref())
            .and_then(|map| map(name));
        mapped.or_else(|| param::by_name(name))
    }

    /// A template event for an instrument, as produced by its type's event factory.
    pub fn manuf_event(&self, id: InstrId) -> Option<Event> {
        let config = self.instruments.get(&id)?;
        let entry = self.type_entry(&config.type_name)?;
        Some((entry.event_factory)(Some(&config.template)).with_instr(id))
    }

    /// Allocate a voice for the instrument of an event.
    pub fn allocate(&mut self, evt: &Event) -> Result<Box<dyn Instrument>, ManagerError> {
        let id = evt.instr();
        let config = self
            .instruments
            .get(&id)
            .ok_or(ManagerError::UnknownInstrument { id })?;
        let entry = self
            .types
            .iter()
            .find(|t| t.name == config.type_name)
            .ok_or_else(|| ManagerError::UnknownType {
                name: config.type_name.clone(),
            })?;
        let fallback = ChannelState::default();
        let ctx = AllocContext {
            sample_rate: self.sample_rate,
            channel: evt.channel(),
            state: self
                .channels
                .get(evt.channel() as usize)
                .unwrap_or(&fallback),
            soundbanks: &self.soundbanks,
        };
        let instr = (entry.instr_factory)(&ctx, Some(&config.template)).ok_or_else(|| {
            ManagerError::AllocationFailed {
                id,
                name: config.name.clone(),
            }
        })?;
        self.allocated += 1;
        trace!("allocated {} for event {}", id, evt.id());
        Ok(instr)
    }

    /// Destroy a voice that is no longer needed.
    pub fn deallocate(&mut self, mut instr: Box<dyn Instrument>) {
        instr.destroy();
        self.deallocated += 1;
    }

    /// Number of voices allocated so far.
    pub fn allocated(&self) -> u64 {
        self.allocated
    }

    pub fn deallocated(&self) -> u64 {
        self.deallocated
    }

    /// Handle a raw MIDI channel message.
    pub fn process_message(&mut self, status: u8, data1: u8, data2: u8) {
        self.apply(
            (status & 0x0f) as ChannelId,
            status & 0xf0,
            data1,
            data2,
        );
    }

    /// Handle a control event on the channel of the event.
    pub fn process_event(&mut self, evt: &Event) {
        let status = evt.param_or(param::STATUS, 0.0) as u8;
        let data1 = evt.param_or(param::DATA1, 0.0) as u8;
        let data2 = evt.param_or(param::DATA2, 0.0) as u8;
        self.apply(evt.channel(), status & 0xf0, data1, data2);
    }

    fn apply(&mut self, channel: ChannelId, kind: u8, data1: u8, data2: u8) {
        let state = match self.channels.get_mut(channel as usize) {
            Some(state) => state,
            None => {
                trace!("ignoring message for channel {}", channel);
                return;
            }
        };
        if !state.apply(kind, data1, data2) {
            trace!("ignoring message {:#x} on channel {}", kind, channel);
            return;
        }
        if kind == 0xB0 {
            match data1 {
                7 | 121 => self.mixer.set_volume(channel, state.volume()),
                10 => self.mixer.set_pan(channel, state.pan()),
                _ => {}
            }
        }
    }

    pub fn channel(&self, channel: ChannelId) -> Option<&ChannelState> {
        self.channels.get(channel as usize)
    }

    pub fn mixer(&self) -> &Mixer {
        &self.mixer
    }

    pub fn mixer_mut(&mut self) -> &mut Mixer {
        &mut self.mixer
    }

    pub fn soundbanks(&self) -> &SoundBankRegistry {
        &self.soundbanks
    }

    pub fn soundbanks_mut(&mut self) -> &mut SoundBankRegistry {
        &mut self.soundbanks
    }

    /// Send one sample of mixed output to the audio output.
    pub fn tick(&mut self) -> io::Result<()> {
        let sample = self.mixer.flush();
        self.out.write(sample)
    }

    /// Signal the end of a run to the output.
    pub fn finish(&mut self) -> io::Result<()> {
        self.out.finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::event::EventKind;
    use crate::instrument::{register_builtin, tone};
    use crate::output::{BufferOut, NullOut};
    use crate::wave::Stereo;

    fn manager() -> InstrumentManager {
        let mut mgr = InstrumentManager::new(8000, Box::new(NullOut));
        register_builtin(&mut mgr).unwrap();
        mgr
    }

    #[test]
    fn duplicate_type_is_rejected() {
        let mut mgr = manager();
        let err = mgr
            .add_type(tone::TYPE_NAME, |_, _| None, crate::instrument::template_event)
            .err()
            .unwrap();
        assert_eq!(err.to_string(), "instrument type Tone is already registered");
    }

    #[test]
    fn instrument_registry() {
        let mut mgr = manager();
        mgr.add_instrument(1, "lead", "Tone", Template::new()).unwrap();
        assert!(matches!(
            mgr.add_instrument(1, "bass", "Tone", Template::new()),
            Err(ManagerError::DuplicateInstrument { id: 1 })
        ));
        assert!(matches!(
            mgr.add_instrument(2, "bass", "Organ", Template::new()),
            Err(ManagerError::UnknownType { .. })
        ));
        assert_eq!(mgr.find_instr(InstrKey::Name("lead")).map(|c| c.id), Some(1));
        assert!(mgr.find_instr(InstrKey::Id(2)).is_none());
        assert_eq!(
            mgr.param_id(InstrKey::Id(1), "release"),
            Some(tone::RELEASE)
        );
        assert_eq!(mgr.param_id(InstrKey::Id(7), "pan"), Some(param::PAN));
    }

    #[test]
    fn manufactured_events_carry_template() {
        let mut mgr = manager();
        mgr.add_instrument(3, "pad", "Tone", Template::new().with_param(tone::ATTACK, 2.0))
            .unwrap();
        let evt = mgr.manuf_event(3).unwrap();
        assert_eq!(evt.kind(), EventKind::Start);
        assert_eq!(evt.instr(), 3);
        assert_eq!(evt.param(tone::ATTACK), Some(2.0));
        assert!(mgr.manuf_event(4).is_none());
    }

    #[test]
    fn allocation_failures() {
        let mut mgr = manager();
        mgr.add_instrument(1, "piano", "SoundBank", Template::new().with_soundbank("gm"))
            .unwrap();
        assert!(matches!(
            mgr.allocate(&Event::note(1, 9, 0, 0, 1, 60, 100)),
            Err(ManagerError::UnknownInstrument { id: 9 })
        ));
        assert!(matches!(
            mgr.allocate(&Event::note(1, 1, 0, 0, 1, 60, 100)),
            Err(ManagerError::AllocationFailed { id: 1, .. })
        ));
        assert_eq!(mgr.allocated(), 0);
    }

    #[test]
    fn allocate_and_deallocate_count() {
        let mut mgr = manager();
        mgr.add_instrument(1, "lead", "Tone", Template::new()).unwrap();
        let instr = mgr.allocate(&Event::note(1, 1, 0, 0, 1, 60, 100)).unwrap();
        assert_eq!(mgr.allocated(), 1);
        mgr.deallocate(instr);
        assert_eq!(mgr.deallocated(), 1);
    }

    #[test]
    fn cleanup_runs_on_removal() {
        let mut mgr = manager();
        mgr.add_instrument(1, "piano", "SoundBank", Template::new().with_soundbank("gm"))
            .unwrap();
        let removed = mgr.remove_instrument(1).unwrap();
        assert_eq!(removed.template.soundbank, None);
        assert!(mgr.remove_instrument(1).is_none());
    }

    #[test]
    fn control_messages() {
        let mut mgr = manager();
        mgr.process_message(0xB2, 0, 2);
        mgr.process_message(0xB2, 32, 1);
        mgr.process_message(0xC2, 17, 0);
        mgr.process_message(0xE2, 0, 0x40);
        mgr.process_event(&Event::control(1, 2, 0xB0, 10, 127));
        let ch = mgr.channel(2).unwrap();
        assert_eq!(ch.bank(), 257);
        assert_eq!(ch.program, 17);
        assert_eq!(ch.controls.pitch_wheel, 8192);
        assert_eq!(mgr.mixer().strip(2).unwrap().pan, 1.0);
        assert_eq!(mgr.channel(0).unwrap().program, 0);

        mgr.process_message(0xB2, 11, 20);
        mgr.process_message(0xB2, 121, 0);
        assert_eq!(mgr.channel(2).unwrap().controls.controllers[11], 127);
        assert_eq!(mgr.channel(2).unwrap().controls.controllers[10], 127);
    }

    #[test]
    fn pitch_bend_range() {
        let mut mgr = manager();
        for &(cc, value) in &[(101, 0), (100, 0), (6, 12), (38, 50)] {
            mgr.process_message(0xB0, cc, value);
        }
        assert_eq!(mgr.channel(0).unwrap().controls.pitch_sensitivity, 12.5);
    }

    #[test]
    fn volume_reaches_output() {
        let buffer = BufferOut::new();
        let mut mgr = InstrumentManager::new(8000, Box::new(buffer.clone()));
        mgr.process_message(0xB0, 7, 127);
        crate::mixer::WaveSink::output(mgr.mixer_mut(), 0, 0.5);
        mgr.tick().unwrap();
        mgr.process_message(0xB0, 7, 0);
        crate::mixer::WaveSink::output(mgr.mixer_mut(), 0, 0.5);
        mgr.tick().unwrap();
        assert_eq!(buffer.samples(), vec![Stereo::mono(0.5), Stereo::SILENCE]);
    }
}
