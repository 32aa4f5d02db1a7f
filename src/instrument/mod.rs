// seqsynth -- an event sequencer and soundbank synthesizer
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! The interface between the sequencer and the things that make sound.

pub mod player;
pub mod tone;

use std::collections::BTreeMap;

use crate::event::{ChannelId, Event, EventKind, ParamId};
use crate::manager::{ChannelState, InstrumentManager, ManagerError};
use crate::mixer::WaveSink;
use crate::soundbank::SoundBankRegistry;

pub use player::SoundBankPlayer;
pub use tone::ToneInstr;

/// One sounding voice of an instrument.
///
/// `tick` is called exactly once per sample while the voice is active and must
/// only produce output through the given sink.
pub trait Instrument: Send {
    /// Begin playing, or retrigger when called again on a playing voice.
    fn start(&mut self, evt: &Event);
    /// Apply updated parameters or a channel control message.
    fn param(&mut self, evt: &Event);
    /// Begin the release.
    fn stop(&mut self);
    fn tick(&mut self, out: &mut dyn WaveSink);
    /// Whether the voice will not produce any more sound.
    fn is_finished(&self) -> bool;
    /// Silence immediately, without a release.
    fn cancel(&mut self);
    /// Release external resources before the voice is dropped.
    fn destroy(&mut self) {}
    /// Voices of the same non-zero class on a channel cut each other off.
    fn exclusive_class(&self) -> u32 {
        0
    }
}

/// Configuration an instrument is allocated from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Template {
    /// Default parameter values for events of this instrument.
    pub params: BTreeMap<ParamId, f64>,
    /// Name of the soundbank to play from, for sample based instruments.
    pub soundbank: Option<String>,
}

impl Template {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_param(mut self, id: ParamId, value: f64) -> Self {
        self.params.insert(id, value);
        self
    }

    pub fn with_soundbank(mut self, name: impl Into<String>) -> Self {
        self.soundbank = Some(name.into());
        self
    }

    pub fn param(&self, id: ParamId) -> Option<f64> {
        self.params.get(&id).copied()
    }
}

/// What a factory gets to see when allocating a voice.
pub struct AllocContext<'a> {
    pub sample_rate: f64,
    pub channel: ChannelId,
    /// Controller state of the channel at allocation time.
    pub state: &'a ChannelState,
    pub soundbanks: &'a SoundBankRegistry,
}

pub type InstrFactory = Box<
    dyn Fn(&AllocContext<'_>, Option<&Template>) -> Option<Box<dyn Instrument>> + Send + Sync,
>;

pub type EventFactory = Box<dyn Fn(Option<&Template>) -> Event + Send + Sync>;

/// A start event carrying the template's parameters.
pub fn template_event(template: Option<&Template>) -> Event {
    let evt = Event::new(0, EventKind::Start);
    match template {
        Some(t) => evt.with_defaults(&t.params),
        None => evt,
    }
}

/// Register the instrument types shipped with this crate.
pub fn register_builtin(manager: &mut InstrumentManager) -> Result<(), ManagerError> {
    manager
        .add_type(
            tone::TYPE_NAME,
            |ctx, template| Some(Box::new(ToneInstr::new(ctx, template)) as Box<dyn Instrument>),
            template_event,
        )?
        .with_param_map(tone::param_by_name);
    manager
        .add_type(
            player::TYPE_NAME,
            |ctx, template| {
                SoundBankPlayer::allocate(ctx, template)
                    .map(|p| Box::new(p) as Box<dyn Instrument>)
            },
            template_event,
        )?
        .with_cleanup(|template| template.soundbank = None);
    Ok(())
}
