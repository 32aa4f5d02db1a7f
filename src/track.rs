// seqsynth -- an event sequencer and soundbank synthesizer
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! Tracks are queues of scheduled events, ordered by start time.

use log::trace;
use snafu::Snafu;

use crate::event::{Event, EventId, Tick, TrackId};

/// The track that always runs and carries the commands starting the others.
pub const MASTER_TRACK: TrackId = 0;

#[derive(Debug, Snafu)]
pub enum TrackError {
    #[snafu(display("event {} starts a voice but has no duration", id))]
    ZeroDuration { id: EventId },
}

/// Events of one track together with its playback position.
#[derive(Debug, Clone)]
pub struct Track {
    id: TrackId,
    /// Sorted by start time, events with equal start times in insertion order.
    events: Vec<Event>,
    /// Index of the next event to dispatch.
    cursor: usize,
    /// Ticks since the track was started.
    clock: Tick,
    /// Latest end time of all events.
    length: Tick,
    loops_left: u32,
    running: bool,
}

impl Track {
    pub fn new(id: TrackId) -> Self {
        Self {
            id,
            events: Vec::new(),
            cursor: 0,
            clock: 0,
            length: 0,
            loops_left: 0,
            running: id == MASTER_TRACK,
        }
    }

    pub fn id(&self) -> TrackId {
        self.id
    }

    /// Schedule an event. Voices started from a track need a duration.
    pub fn add_event(&mut self, evt: Event) -> Result<(), TrackError> {
        if evt.kind().starts_voice() && evt.duration() == 0 {
            return Err(TrackError::ZeroDuration { id: evt.id() });
        }
        self.length = self.length.max(evt.end());
        match self.events.last() {
            Some(last) if last.start() > evt.start() => {
                let pos = self.events.partition_point(|e| e.start() <= evt.start());
                if pos < self.cursor {
                    self.cursor += 1;
                }
                self.events.insert(pos, evt);
            }
            _ => self.events.push(evt),
        }
        Ok(())
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn length(&self) -> Tick {
        self.length
    }

    pub fn clock(&self) -> Tick {
        self.clock
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Play the track from the beginning, repeating it `loops` more times.
    pub fn start(&mut self, loops: u32) {
        trace!("starting track {} with {} repeats", self.id, loops);
        self.running = true;
        self.loops_left = loops;
        self.rewind();
    }

    /// Stop a track. The master track cannot be stopped.
    pub fn stop(&mut self) {
        if self.id != MASTER_TRACK {
            trace!("stopping track {}", self.id);
            self.running = false;
        }
    }

    pub fn rewind(&mut self) {
        self.cursor = 0;
        self.clock = 0;
    }

    /// Take all events that are due at the current clock.
    pub fn drain_due(&mut self) -> Vec<Event> {
        if !self.running {
            return Vec::new();
        }
        let start = self.cursor;
        while self
            .events
            .get(self.cursor)
            .map_or(false, |e| e.start() <= self.clock)
        {
            self.cursor += 1;
        }
        self.events[start..self.cursor].to_vec()
    }

    /// Advance the clock, rewinding when a repeat is due.
    pub fn advance(&mut self, ticks: Tick) {
        if !self.running {
            return;
        }
        self.clock += ticks;
        if self.cursor >= self.events.len()
            && self.length > 0
            && self.clock >= self.length
            && self.loops_left > 0
        {
            self.loops_left -= 1;
            self.cursor = 0;
            self.clock -= self.length;
            trace!("track {} repeats, {} left", self.id, self.loops_left);
        }
    }

    /// All events were dispatched and no repeats are left.
    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.events.len() && self.loops_left == 0
    }
}
