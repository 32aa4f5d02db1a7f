// seqsynth -- an event sequencer and soundbank synthesizer
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! Events are the instructions the sequencer hands to instruments.

use std::collections::BTreeMap;

/// Time measured in ticks, one tick being one sample period.
pub type Tick = u64;
/// Unique id of an event within one sequencer run.
pub type EventId = u64;
/// Numeric id of a configured instrument.
pub type InstrId = u32;
/// Mixer channel an event plays on.
pub type ChannelId = u16;
/// Track an event is queued on.
pub type TrackId = u32;
/// Numeric parameter address.
pub type ParamId = u16;

/// Well-known parameter ids. Instrument specific parameters start at `USER_BASE`.
pub mod param {
    use super::ParamId;

    /// MIDI key number of the note.
    pub const KEY: ParamId = 1;
    /// MIDI velocity (0 - 127).
    pub const VELOCITY: ParamId = 2;
    /// Linear volume, 1.0 being unity.
    pub const VOLUME: ParamId = 3;
    /// Explicit frequency in Hz, overrides `KEY` where supported.
    pub const FREQUENCY: ParamId = 4;
    /// Pan position from -1.0 (left) to 1.0 (right).
    pub const PAN: ParamId = 5;
    /// Number of repeats for a started track.
    pub const LOOP_COUNT: ParamId = 6;
    /// MIDI status byte of a control event.
    pub const STATUS: ParamId = 7;
    /// First MIDI data byte of a control event.
    pub const DATA1: ParamId = 8;
    /// Second MIDI data byte of a control event.
    pub const DATA2: ParamId = 9;

    pub const USER_BASE: ParamId = 16;

    /// Map the name of a well-known parameter to its id.
    ///
    /// ```
    /// use seqsynth::event::param;
    ///
    /// assert_eq!(param::by_name("key"), Some(param::KEY));
    /// assert_eq!(param::by_name("Volume"), Some(param::VOLUME));
    /// assert_eq!(param::by_name("cutoff"), None);
    /// ```
    pub fn by_name(name: &str) -> Option<ParamId> {
        match name.to_ascii_lowercase().as_str() {
            "key" | "pitch" => Some(KEY),
            "velocity" | "vel" => Some(VELOCITY),
            "volume" | "vol" => Some(VOLUME),
            "frequency" | "freq" => Some(FREQUENCY),
            "pan" => Some(PAN),
            "loop" | "loops" => Some(LOOP_COUNT),
            "status" => Some(STATUS),
            "data1" => Some(DATA1),
            "data2" => Some(DATA2),
            _ => None,
        }
    }
}

/// What an event asks the sequencer to do.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Allocate and start a new voice.
    Start,
    /// Retrigger the voice with the same id, or start a new one.
    Restart,
    /// Update parameters of a playing voice.
    Param,
    /// Release the voice with the same id.
    Stop,
    /// Channel wide control message, not tied to a voice.
    Control,
    /// Silence every voice on the channel without release.
    Cancel,
    /// Start the track named by the event's `track` field.
    StartTrack,
    /// Stop the track named by the event's `track` field.
    StopTrack,
}

impl EventKind {
    /// Whether events of this kind start a voice and therefore need a duration when scheduled.
    pub fn starts_voice(self) -> bool {
        matches!(self, EventKind::Start | EventKind::Restart)
    }

    /// Whether the event targets a track instead of being queued on it.
    pub fn is_track_control(self) -> bool {
        matches!(self, EventKind::StartTrack | EventKind::StopTrack)
    }
}

/// A single instruction to an instrument.
///
/// Events are immutable once built; the builder methods consume and return the event.
///
/// ```
/// use seqsynth::event::*;
///
/// let evt = Event::new(1, EventKind::Start)
///     .with_instr(3)
///     .with_timing(100, 50)
///     .with_param(param::KEY, 60.0);
/// assert_eq!(evt.end(), 150);
/// assert_eq!(evt.param(param::KEY), Some(60.0));
/// assert_eq!(evt.param_or(param::VOLUME, 1.0), 1.0);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    id: EventId,
    kind: EventKind,
    instr: InstrId,
    channel: ChannelId,
    track: TrackId,
    start: Tick,
    duration: Tick,
    params: BTreeMap<ParamId, f64>,
}

impl Event {
    pub fn new(id: EventId, kind: EventKind) -> Self {
        Self {
            id,
            kind,
            instr: 0,
            channel: 0,
            track: 0,
            start: 0,
            duration: 0,
            params: BTreeMap::new(),
        }
    }

    /// A note on `channel` playing `key` with `velocity` for `duration` ticks.
    pub fn note(
        id: EventId,
        instr: InstrId,
        channel: ChannelId,
        start: Tick,
        duration: Tick,
        key: u8,
        velocity: u8,
    ) -> Self {
        Event::new(id, EventKind::Start)
            .with_instr(instr)
            .with_channel(channel)
            .with_timing(start, duration)
            .with_param(param::KEY, key as f64)
            .with_param(param::VELOCITY, velocity as f64)
    }

    /// A MIDI channel message, e.g. a control or program change.
    pub fn control(id: EventId, channel: ChannelId, status: u8, data1: u8, data2: u8) -> Self {
        Event::new(id, EventKind::Control)
            .with_channel(channel)
            .with_param(param::STATUS, status as f64)
            .with_param(param::DATA1, data1 as f64)
            .with_param(param::DATA2, data2 as f64)
    }

    pub fn with_instr(mut self, instr: InstrId) -> Self {
        self.instr = instr;
        self
    }

    pub fn with_channel(mut self, channel: ChannelId) -> Self {
        self.channel = channel;
        self
    }

    pub fn with_track(mut self, track: TrackId) -> Self {
        self.track = track;
        self
    }

    pub fn with_timing(mut self, start: Tick, duration: Tick) -> Self {
        self.start = start;
        self.duration = duration;
        self
    }

    pub fn with_param(mut self, id: ParamId, value: f64) -> Self {
        self.params.insert(id, value);
        self
    }

    /// Fill in every parameter from `defaults` that is not set on this event.
    pub fn with_defaults(mut self, defaults: &BTreeMap<ParamId, f64>) -> Self {
        for (id, value) in defaults {
            self.params.entry(*id).or_insert(*value);
        }
        self
    }

    pub fn id(&self) -> EventId {
        self.id
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn instr(&self) -> InstrId {
        self.instr
    }

    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    pub fn track(&self) -> TrackId {
        self.track
    }

    pub fn start(&self) -> Tick {
        self.start
    }

    pub fn duration(&self) -> Tick {
        self.duration
    }

    /// Tick at which the event ends, clamped to the last representable tick.
    pub fn end(&self) -> Tick {
        self.start.saturating_add(self.duration)
    }

    pub fn param(&self, id: ParamId) -> Option<f64> {
        self.params.get(&id).copied()
    }

    pub fn param_or(&self, id: ParamId, default: f64) -> f64 {
        self.param(id).unwrap_or(default)
    }

    pub fn params(&self) -> impl Iterator<Item = (ParamId, f64)> + '_ {
        self.params.iter().map(|(id, value)| (*id, *value))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_do_not_override() {
        let mut defaults = BTreeMap::new();
        defaults.insert(param::VOLUME, 0.5);
        defaults.insert(param::KEY, 10.0);
        let evt = Event::note(1, 1, 0, 0, 10, 60, 100).with_defaults(&defaults);
        assert_eq!(evt.param(param::KEY), Some(60.0));
        assert_eq!(evt.param(param::VOLUME), Some(0.5));
    }

    #[test]
    fn control_event_layout() {
        let evt = Event::control(7, 2, 0xB0, 7, 100);
        assert_eq!(evt.kind(), EventKind::Control);
        assert_eq!(evt.channel(), 2);
        assert_eq!(evt.param(param::STATUS), Some(176.0));
        assert_eq!(evt.param(param::DATA2), Some(100.0));
    }

    #[test]
    fn end_saturates() {
        let evt = Event::note(1, 1, 0, Tick::MAX - 2, 10, 60, 100);
        assert_eq!(evt.end(), Tick::MAX);
        assert_eq!(Event::note(2, 1, 0, 5, 10, 60, 100).end(), 15);
    }
}
