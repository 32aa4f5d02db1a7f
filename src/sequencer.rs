// seqsynth -- an event sequencer and soundbank synthesizer
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! The sequencer dispatches events to voices and ticks them, one sample at a time.
//!
//! A run alternates between dispatching everything that is due and rendering a block of
//! samples. Scheduled events come from tracks, immediate events from a queue that other
//! threads feed through a [`SequencerHandle`].

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use log::{debug, info, trace, warn};
use snafu::Snafu;

use crate::event::{param, ChannelId, Event, EventId, EventKind, Tick, TrackId};
use crate::instrument::Instrument;
use crate::manager::{InstrumentManager, ManagerError};
use crate::output::WaveOut;
use crate::track::{Track, TrackError, MASTER_TRACK};

#[derive(Debug, Snafu)]
pub enum SequencerError {
    #[snafu(display("{}", source))]
    Allocate { source: ManagerError },
    #[snafu(display("could not write audio: {}", source))]
    Output { source: std::io::Error },
}

/// What to do with an event whose instrument cannot be allocated.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MissingInstrumentPolicy {
    /// Log a warning and continue with the next event.
    Skip,
    /// Stop the run with an error.
    Abort,
}

#[derive(Debug, Clone)]
pub struct SequencerConfig {
    pub sample_rate: u32,
    /// Samples rendered between two dispatch rounds, 0 selects half a millisecond.
    pub tick_block: Tick,
    /// Maximum number of voices sounding at the same time.
    pub max_voices: usize,
    pub missing_instrument: MissingInstrumentPolicy,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            tick_block: 0,
            max_voices: 32,
            missing_instrument: MissingInstrumentPolicy::Skip,
        }
    }
}

impl SequencerConfig {
    /// Effective number of samples per block.
    ///
    /// ```
    /// use seqsynth::sequencer::SequencerConfig;
    ///
    /// assert_eq!(SequencerConfig::default().block_size(), 22);
    /// let config = SequencerConfig { sample_rate: 1000, ..Default::default() };
    /// assert_eq!(config.block_size(), 1);
    /// ```
    pub fn block_size(&self) -> Tick {
        if self.tick_block > 0 {
            self.tick_block
        } else {
            (self.sample_rate as Tick / 2000).max(1)
        }
    }
}

/// Where events come from during a run.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PlayMode {
    /// Only the master track, ends when it is done.
    Sequence,
    /// Only immediate events, runs until halted.
    Live,
    /// All running tracks. With `live`, immediate events are taken as well and the run
    /// only ends when halted.
    Multi { live: bool },
}

impl PlayMode {
    fn takes_live(self) -> bool {
        matches!(self, PlayMode::Live | PlayMode::Multi { live: true })
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SeqState {
    Off,
    Playing(PlayMode),
    Paused(PlayMode),
}

/// Statistics of a finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Samples rendered in this run.
    pub samples: Tick,
    /// Clock at the end of the run.
    pub end: Tick,
    /// Events dropped because their instrument could not be allocated.
    pub skipped: u64,
    /// Voices stolen to make room for new ones.
    pub evicted: u64,
    pub halted: bool,
}

#[derive(Debug)]
struct Flags {
    state: SeqState,
    halt: bool,
}

#[derive(Debug)]
struct Control {
    live: Mutex<VecDeque<Event>>,
    flags: Mutex<Flags>,
    wake: Condvar,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Controls a sequencer from other threads.
#[derive(Debug, Clone)]
pub struct SequencerHandle {
    control: Arc<Control>,
}

impl SequencerHandle {
    /// Queue an event for dispatch as soon as possible.
    pub fn add_immediate(&self, evt: Event) {
        lock(&self.control.live).push_back(evt);
    }

    pub fn pause(&self) {
        let mut flags = lock(&self.control.flags);
        if let SeqState::Playing(mode) = flags.state {
            flags.state = SeqState::Paused(mode);
        }
    }

    pub fn resume(&self) {
        let mut flags = lock(&self.control.flags);
        if let SeqState::Paused(mode) = flags.state {
            flags.state = SeqState::Playing(mode);
            self.control.wake.notify_all();
        }
    }

    /// End the current run after the block being rendered.
    pub fn halt(&self) {
        lock(&self.control.flags).halt = true;
        self.control.wake.notify_all();
    }

    pub fn state(&self) -> SeqState {
        lock(&self.control.flags).state
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum VoiceState {
    On,
    Releasing,
}

/// A voice started by an event.
struct ActiveEvent {
    id: EventId,
    channel: ChannelId,
    instr: Box<dyn Instrument>,
    /// Ticks until the voice is released, `None` for indefinite voices.
    remaining: Option<Tick>,
    state: VoiceState,
    /// Tick at which the voice was started.
    started: Tick,
    /// Whether a track scheduled the start, as opposed to an immediate event.
    from_track: bool,
}

type Callback = Box<dyn FnMut(u64) + Send>;

pub struct Sequencer {
    config: SequencerConfig,
    manager: InstrumentManager,
    tracks: BTreeMap<TrackId, Track>,
    /// Active voices, oldest first.
    voices: Vec<ActiveEvent>,
    control: Arc<Control>,
    now: Tick,
    callback: Option<(Tick, Callback)>,
    skipped: u64,
    evicted: u64,
}

impl Sequencer {
    pub fn new(config: SequencerConfig, out: Box<dyn WaveOut>) -> Self {
        let manager = InstrumentManager::new(config.sample_rate, out);
        let mut tracks = BTreeMap::new();
        tracks.insert(MASTER_TRACK, Track::new(MASTER_TRACK));
        Self {
            config,
            manager,
            tracks,
            voices: Vec::new(),
            control: Arc::new(Control {
                live: Mutex::new(VecDeque::new()),
                flags: Mutex::new(Flags {
                    state: SeqState::Off,
                    halt: false,
                }),
                wake: Condvar::new(),
            }),
            now: 0,
            callback: None,
            skipped: 0,
            evicted: 0,
        }
    }

    pub fn config(&self) -> &SequencerConfig {
        &self.config
    }

    pub fn manager(&self) -> &InstrumentManager {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut InstrumentManager {
        &mut self.manager
    }

    pub fn handle(&self) -> SequencerHandle {
        SequencerHandle {
            control: self.control.clone(),
        }
    }

    /// Ticks rendered since the sequencer was created or reset.
    pub fn now(&self) -> Tick {
        self.now
    }

    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }

    pub fn track(&self, id: TrackId) -> Option<&Track> {
        self.tracks.get(&id)
    }

    /// Schedule an event on its track, creating the track if needed.
    /// Track commands always go to the master track.
    pub fn add_event(&mut self, evt: Event) -> Result<(), TrackError> {
        let id = if evt.kind().is_track_control() {
            MASTER_TRACK
        } else {
            evt.track()
        };
        self.tracks
            .entry(id)
            .or_insert_with(|| Track::new(id))
            .add_event(evt)
    }

    /// Call `callback` every `rate` ticks with the number of times the rate elapsed.
    pub fn set_callback<F>(&mut self, rate: Tick, callback: F)
    where
        F: FnMut(u64) + Send + 'static,
    {
        self.callback = Some((rate, Box::new(callback)));
    }

    /// Drop all tracks and voices and start the clock over.
    pub fn reset(&mut self) {
        self.release_all();
        self.tracks.clear();
        self.tracks.insert(MASTER_TRACK, Track::new(MASTER_TRACK));
        lock(&self.control.live).clear();
        self.now = 0;
    }

    fn release_all(&mut self) {
        for voice in self.voices.drain(..) {
            self.manager.deallocate(voice.instr);
        }
    }

    /// Run until the exit condition of `mode` holds, the clock reaches `end` or the
    /// sequencer is halted.
    pub fn run(&mut self, mode: PlayMode, end: Option<Tick>) -> Result<RunSummary, SequencerError> {
        {
            let mut flags = lock(&self.control.flags);
            flags.state = SeqState::Playing(mode);
            flags.halt = false;
        }
        let started = self.now;
        let skipped = self.skipped;
        let evicted = self.evicted;
        info!("starting {:?} run at tick {}", mode, started);

        let mut result = Ok(());
        loop {
            match self.step(mode, end) {
                Ok(true) => {}
                Ok(false) => break,
                Err(err) => {
                    result = Err(err);
                    break;
                }
            }
        }

        self.release_all();
        let halted = {
            let mut flags = lock(&self.control.flags);
            flags.state = SeqState::Off;
            flags.halt
        };
        let finished = self
            .manager
            .finish()
            .map_err(|source| SequencerError::Output { source });
        result?;
        finished?;

        let summary = RunSummary {
            samples: self.now - started,
            end: self.now,
            skipped: self.skipped - skipped,
            evicted: self.evicted - evicted,
            halted,
        };
        info!(
            "run finished after {} samples at tick {}",
            summary.samples, summary.end
        );
        Ok(summary)
    }

    /// One round of dispatching and rendering. Returns whether the run continues.
    pub fn step(&mut self, mode: PlayMode, end: Option<Tick>) -> Result<bool, SequencerError> {
        if !self.wait_while_paused() {
            return Ok(false);
        }
        if let Some(end) = end {
            if self.now >= end {
                return Ok(false);
            }
        }

        if mode.takes_live() {
            let next = lock(&self.control.live).pop_front();
            if let Some(evt) = next {
                self.dispatch_from(&evt, false)?;
            }
        }

        let ids: Vec<TrackId> = match mode {
            PlayMode::Sequence => vec![MASTER_TRACK],
            PlayMode::Live => Vec::new(),
            PlayMode::Multi { .. } => self.tracks.keys().copied().collect(),
        };
        for id in ids.iter() {
            let due = match self.tracks.get_mut(id) {
                Some(track) => track.drain_due(),
                None => continue,
            };
            for evt in due.iter() {
                self.dispatch_from(evt, true)?;
            }
        }

        let mut block = self.config.block_size();
        if let Some(end) = end {
            block = block.min(end - self.now);
        }
        for _ in 0..block {
            self.tick()?;
        }
        for id in ids.iter() {
            if let Some(track) = self.tracks.get_mut(id) {
                track.advance(block);
            }
        }

        let done = match mode {
            PlayMode::Sequence => self
                .tracks
                .get(&MASTER_TRACK)
                .map_or(true, Track::is_exhausted),
            PlayMode::Live | PlayMode::Multi { live: true } => false,
            PlayMode::Multi { live: false } => self
                .tracks
                .values()
                .filter(|t| t.is_running())
                .all(Track::is_exhausted),
        };
        let reached_end = end.map_or(false, |end| self.now >= end);
        Ok(!(done && self.voices.is_empty()) && !reached_end && !self.halted())
    }

    fn halted(&self) -> bool {
        lock(&self.control.flags).halt
    }

    /// Block while paused. Returns false if the sequencer was halted.
    fn wait_while_paused(&self) -> bool {
        let mut flags = lock(&self.control.flags);
        while matches!(flags.state, SeqState::Paused(_)) && !flags.halt {
            flags = self
                .control
                .wake
                .wait(flags)
                .unwrap_or_else(PoisonError::into_inner);
        }
        !flags.halt
    }

    /// Render one sample.
    fn tick(&mut self) -> Result<(), SequencerError> {
        let mut i = 0;
        while i < self.voices.len() {
            let voice = &mut self.voices[i];
            let remove = match voice.state {
                VoiceState::On => {
                    voice.instr.tick(self.manager.mixer_mut());
                    match voice.remaining.as_mut() {
                        Some(remaining) => {
                            *remaining = remaining.saturating_sub(1);
                            if *remaining == 0 {
                                trace!("releasing voice {} at tick {}", voice.id, self.now);
                                voice.instr.stop();
                                voice.state = VoiceState::Releasing;
                                voice.instr.is_finished()
                            } else {
                                false
                            }
                        }
                        None => false,
                    }
                }
                VoiceState::Releasing => {
                    if voice.instr.is_finished() {
                        true
                    } else {
                        voice.instr.tick(self.manager.mixer_mut());
                        false
                    }
                }
            };
            if remove {
                let voice = self.voices.remove(i);
                trace!(
                    "voice {} finished at tick {} after {} ticks",
                    voice.id,
                    self.now,
                    self.now - voice.started
                );
                self.manager.deallocate(voice.instr);
            } else {
                i += 1;
            }
        }

        self.manager
            .tick()
            .map_err(|source| SequencerError::Output { source })?;
        self.now += 1;
        if let Some((rate, callback)) = self.callback.as_mut() {
            if *rate > 0 && self.now % *rate == 0 {
                callback(self.now / *rate);
            }
        }
        Ok(())
    }

    /// Dispatch a single event right away.
    pub fn dispatch(&mut self, evt: &Event) -> Result<(), SequencerError> {
        self.dispatch_from(evt, false)
    }

    fn dispatch_from(&mut self, evt: &Event, from_track: bool) -> Result<(), SequencerError> {
        trace!(
            "dispatching {:?} {} at tick {} ({})",
            evt.kind(),
            evt.id(),
            self.now,
            if from_track { "track" } else { "immediate" }
        );
        match evt.kind() {
            EventKind::Start => self.start_voice(evt, from_track),
            EventKind::Restart => {
                match self.find_on(evt.id()) {
                    Some(voice) => {
                        voice.instr.start(evt);
                        voice.remaining = countdown(evt);
                    }
                    None => return self.start_voice(evt, from_track),
                }
                Ok(())
            }
            EventKind::Param => {
                // prefer the sounding voice over one released for the same id
                let target = self
                    .voices
                    .iter()
                    .position(|v| v.id == evt.id() && v.state == VoiceState::On)
                    .or_else(|| self.voices.iter().position(|v| v.id == evt.id()));
                if let Some(index) = target {
                    self.voices[index].instr.param(evt);
                }
                Ok(())
            }
            EventKind::Stop => {
                if let Some(voice) = self.find_on(evt.id()) {
                    voice.instr.stop();
                    voice.state = VoiceState::Releasing;
                }
                Ok(())
            }
            EventKind::Control => {
                self.manager.process_event(evt);
                for voice in self.voices.iter_mut().filter(|v| v.channel == evt.channel()) {
                    voice.instr.param(evt);
                }
                Ok(())
            }
            EventKind::Cancel => {
                for voice in self.voices.iter_mut().filter(|v| v.channel == evt.channel()) {
                    voice.instr.cancel();
                    voice.state = VoiceState::Releasing;
                }
                Ok(())
            }
            EventKind::StartTrack => {
                let id = evt.track();
                let loops = evt.param_or(param::LOOP_COUNT, 0.0).max(0.0) as u32;
                self.tracks
                    .entry(id)
                    .or_insert_with(|| Track::new(id))
                    .start(loops);
                Ok(())
            }
            EventKind::StopTrack => {
                if let Some(track) = self.tracks.get_mut(&evt.track()) {
                    track.stop();
                }
                Ok(())
            }
        }
    }

    fn find_on(&mut self, id: EventId) -> Option<&mut ActiveEvent> {
        self.voices
            .iter_mut()
            .find(|v| v.id == id && v.state == VoiceState::On)
    }

    fn start_voice(&mut self, evt: &Event, from_track: bool) -> Result<(), SequencerError> {
        // allocate before touching any sounding voice, a skipped start leaves them alone
        let mut instr = match self.manager.allocate(evt) {
            Ok(instr) => instr,
            Err(err) => {
                return match self.config.missing_instrument {
                    MissingInstrumentPolicy::Skip => {
                        warn!("skipping event {}: {}", evt.id(), err);
                        self.skipped += 1;
                        Ok(())
                    }
                    MissingInstrumentPolicy::Abort => Err(SequencerError::Allocate { source: err }),
                };
            }
        };

        // a second start for the same id releases the first voice
        if let Some(voice) = self.find_on(evt.id()) {
            voice.instr.stop();
            voice.state = VoiceState::Releasing;
        }
        while self.voices.len() >= self.config.max_voices.max(1) {
            let victim = self
                .voices
                .iter()
                .position(|v| v.state == VoiceState::Releasing)
                .unwrap_or(0);
            let voice = self.voices.remove(victim);
            debug!(
                "evicting voice {} started at tick {}{} for event {}",
                voice.id,
                voice.started,
                if voice.from_track { " by a track" } else { "" },
                evt.id()
            );
            self.evicted += 1;
            self.manager.deallocate(voice.instr);
        }

        instr.start(evt);

        let class = instr.exclusive_class();
        if class != 0 {
            for voice in self
                .voices
                .iter_mut()
                .filter(|v| v.channel == evt.channel() && v.instr.exclusive_class() == class)
            {
                voice.instr.cancel();
                voice.state = VoiceState::Releasing;
            }
        }

        self.voices.push(ActiveEvent {
            id: evt.id(),
            channel: evt.channel(),
            instr,
            remaining: countdown(evt),
            state: VoiceState::On,
            started: self.now,
            from_track,
        });
        Ok(())
    }
}

fn countdown(evt: &Event) -> Option<Tick> {
    if evt.duration() > 0 {
        Some(evt.duration())
    } else {
        None
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::instrument::{register_builtin, AllocContext, Template};
    use crate::mixer::WaveSink;
    use crate::output::{BufferOut, NullOut};
    use expect_test::expect;

    type Log = Arc<Mutex<Vec<String>>>;

    /// Records every call, finishes as soon as it is stopped.
    struct Probe {
        id: EventId,
        log: Log,
        stopped: bool,
        class: u32,
    }

    impl Probe {
        fn record(&self, what: &str) {
            self.log.lock().unwrap().push(format!("{} {}", what, self.id));
        }
    }

    impl Instrument for Probe {
        fn start(&mut self, evt: &Event) {
            self.id = evt.id();
            self.stopped = false;
            self.record("start");
        }
        fn param(&mut self, evt: &Event) {
            self.log
                .lock()
                .unwrap()
                .push(format!("param {} <- {}", self.id, evt.id()));
        }
        fn stop(&mut self) {
            self.stopped = true;
            self.record("stop");
        }
        fn tick(&mut self, out: &mut dyn WaveSink) {
            out.output(0, 0.125);
        }
        fn is_finished(&self) -> bool {
            self.stopped
        }
        fn cancel(&mut self) {
            self.stopped = true;
            self.record("cancel");
        }
        fn destroy(&mut self) {
            self.record("destroy");
        }
        fn exclusive_class(&self) -> u32 {
            self.class
        }
    }

    fn sequencer(config: SequencerConfig) -> (Sequencer, Log) {
        sequencer_with(config, Box::new(NullOut))
    }

    fn sequencer_with(config: SequencerConfig, out: Box<dyn WaveOut>) -> (Sequencer, Log) {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let mut seq = Sequencer::new(config, out);
        let factory_log = log.clone();
        seq.manager_mut()
            .add_type(
                "Probe",
                move |_ctx: &AllocContext<'_>, template: Option<&Template>| {
                    let class = template
                        .and_then(|t| t.param(param::USER_BASE))
                        .unwrap_or(0.0) as u32;
                    Some(Box::new(Probe {
                        id: 0,
                        log: factory_log.clone(),
                        stopped: false,
                        class,
                    }) as Box<dyn Instrument>)
                },
                crate::instrument::template_event,
            )
            .unwrap();
        seq.manager_mut()
            .add_instrument(1, "probe", "Probe", Template::new())
            .unwrap();
        seq.manager_mut()
            .add_instrument(
                2,
                "hihat",
                "Probe",
                Template::new().with_param(param::USER_BASE, 1.0),
            )
            .unwrap();
        (seq, log)
    }

    fn unit_blocks() -> SequencerConfig {
        SequencerConfig {
            tick_block: 1,
            ..Default::default()
        }
    }

    fn note(id: EventId, start: Tick, duration: Tick) -> Event {
        Event::note(id, 1, 0, start, duration, 60, 100)
    }

    #[test]
    fn voices_release_when_their_duration_ends() {
        let (mut seq, _log) = sequencer(unit_blocks());
        seq.add_event(note(1, 0, 4)).unwrap();
        seq.add_event(note(2, 0, 2)).unwrap();

        let mut active = Vec::new();
        while seq.step(PlayMode::Sequence, None).unwrap() {
            active.push((seq.now(), seq.active_voices()));
        }
        active.push((seq.now(), seq.active_voices()));
        assert_eq!(active, vec![(1, 2), (2, 1), (3, 1), (4, 0)]);
        assert_eq!(seq.manager().allocated(), 2);
        assert_eq!(seq.manager().deallocated(), 2);
    }

    #[test]
    fn dispatch_trace() {
        let (mut seq, log) = sequencer(unit_blocks());
        seq.add_event(note(1, 0, 4)).unwrap();
        seq.add_event(note(2, 0, 2)).unwrap();
        seq.add_event(Event::new(1, EventKind::Param).with_timing(1, 0))
            .unwrap();
        seq.add_event(Event::new(2, EventKind::Param).with_timing(3, 0))
            .unwrap();
        seq.add_event(Event::control(9, 0, 0xB0, 7, 90).with_timing(2, 0))
            .unwrap();
        let summary = seq.run(PlayMode::Sequence, None).unwrap();
        assert_eq!(summary.samples, 4);
        assert!(!summary.halted);

        expect![[r#"
            start 1
            start 2
            param 1 <- 1
            stop 2
            destroy 2
            param 1 <- 9
            stop 1
            destroy 1
        "#]]
        .assert_eq(&(log.lock().unwrap().join("\n") + "\n"));
    }

    #[test]
    fn stale_param_and_stop_are_ignored() {
        let (mut seq, log) = sequencer(unit_blocks());
        assert_eq!(seq.active_voices(), 0);
        seq.dispatch(&Event::new(99, EventKind::Param).with_param(param::VOLUME, 0.5))
            .unwrap();
        seq.dispatch(&Event::new(99, EventKind::Stop)).unwrap();
        assert_eq!(seq.active_voices(), 0);
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn admission_control_prefers_releasing_voices() {
        let (mut seq, log) = sequencer(unit_blocks());
        let indefinite = |id| Event::note(id, 1, 0, 0, 0, 60, 100);
        for id in 0..32 {
            seq.dispatch(&indefinite(id)).unwrap();
        }
        // voices 5 and 7 are releasing but not yet finished
        for voice in seq.voices.iter_mut().filter(|v| v.id == 5 || v.id == 7) {
            voice.state = VoiceState::Releasing;
        }
        for id in 32..50 {
            seq.dispatch(&indefinite(id)).unwrap();
            assert!(seq.active_voices() <= 32);
        }
        assert_eq!(seq.active_voices(), 32);
        assert_eq!(seq.evicted, 18);

        let destroyed: Vec<String> = log
            .lock()
            .unwrap()
            .iter()
            .filter(|l| l.starts_with("destroy"))
            .cloned()
            .collect();
        let mut expected = vec!["destroy 5".to_string(), "destroy 7".to_string()];
        expected.extend(
            [0, 1, 2, 3, 4, 6, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17]
                .iter()
                .map(|id| format!("destroy {}", id)),
        );
        assert_eq!(destroyed, expected);
        let remaining: Vec<EventId> = seq.voices.iter().map(|v| v.id).collect();
        assert_eq!(remaining, (18..50).collect::<Vec<_>>());
    }

    #[test]
    fn failed_allocation_keeps_voices() {
        let (mut seq, log) = sequencer(SequencerConfig {
            max_voices: 2,
            ..unit_blocks()
        });
        seq.dispatch(&Event::note(1, 1, 0, 0, 0, 60, 100)).unwrap();
        seq.dispatch(&Event::note(2, 1, 0, 0, 0, 64, 100)).unwrap();
        seq.dispatch(&Event::note(3, 42, 0, 0, 0, 67, 100)).unwrap();
        assert_eq!(seq.active_voices(), 2);
        assert_eq!(seq.evicted, 0);
        assert_eq!(seq.skipped, 1);
        assert_eq!(*log.lock().unwrap(), vec!["start 1", "start 2"]);
    }

    #[test]
    fn voices_remember_where_they_came_from() {
        let (mut seq, _log) = sequencer(unit_blocks());
        seq.add_event(note(1, 0, 5)).unwrap();
        assert!(seq.step(PlayMode::Sequence, None).unwrap());
        seq.dispatch(&note(2, 0, 5)).unwrap();
        let origin: Vec<_> = seq
            .voices
            .iter()
            .map(|v| (v.id, v.started, v.from_track))
            .collect();
        assert_eq!(origin, vec![(1, 0, true), (2, 1, false)]);
    }

    #[test]
    fn missing_instrument_policies() {
        let (mut seq, _log) = sequencer(unit_blocks());
        seq.add_event(Event::note(1, 42, 0, 0, 2, 60, 100)).unwrap();
        seq.add_event(note(2, 0, 2)).unwrap();
        let summary = seq.run(PlayMode::Sequence, None).unwrap();
        assert_eq!(summary.skipped, 1);
        assert_eq!(seq.manager().allocated(), 1);

        let config = SequencerConfig {
            missing_instrument: MissingInstrumentPolicy::Abort,
            ..unit_blocks()
        };
        let (mut seq, _log) = sequencer(config);
        seq.add_event(note(1, 0, 8)).unwrap();
        seq.add_event(Event::note(2, 42, 0, 2, 2, 60, 100)).unwrap();
        let err = seq.run(PlayMode::Sequence, None).unwrap_err();
        assert_eq!(err.to_string(), "undefined instrument id 42");
        assert_eq!(seq.now(), 2);
        assert_eq!(seq.manager().deallocated(), 1);
        assert_eq!(seq.handle().state(), SeqState::Off);
    }

    #[test]
    fn restart_retriggers_and_resets_countdown() {
        let (mut seq, log) = sequencer(unit_blocks());
        seq.add_event(note(1, 0, 3)).unwrap();
        seq.add_event(Event::new(1, EventKind::Restart).with_instr(1).with_timing(2, 3))
            .unwrap();
        let summary = seq.run(PlayMode::Sequence, None).unwrap();
        assert_eq!(summary.samples, 5);
        assert_eq!(seq.manager().allocated(), 1);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["start 1", "start 1", "stop 1", "destroy 1"]
        );
    }

    #[test]
    fn exclusive_class_cuts_off_voices() {
        let (mut seq, log) = sequencer(unit_blocks());
        seq.dispatch(&Event::note(1, 2, 0, 0, 0, 42, 100)).unwrap();
        seq.dispatch(&Event::note(2, 1, 0, 0, 0, 60, 100)).unwrap();
        seq.dispatch(&Event::note(3, 2, 1, 0, 0, 42, 100)).unwrap();
        seq.dispatch(&Event::note(4, 2, 0, 0, 0, 46, 100)).unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            vec!["start 1", "start 2", "start 3", "start 4", "cancel 1"]
        );
    }

    #[test]
    fn cancel_silences_the_channel() {
        let (mut seq, log) = sequencer(unit_blocks());
        seq.dispatch(&Event::note(1, 1, 0, 0, 0, 60, 100)).unwrap();
        seq.dispatch(&Event::note(2, 1, 3, 0, 0, 60, 100)).unwrap();
        seq.dispatch(&Event::new(5, EventKind::Cancel).with_channel(0))
            .unwrap();
        seq.step(PlayMode::Live, None).unwrap();
        assert_eq!(seq.active_voices(), 1);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["start 1", "start 2", "cancel 1", "destroy 1"]
        );
    }

    #[test]
    fn live_mode_runs_until_halted() {
        let (mut seq, _log) = sequencer(unit_blocks());
        let handle = seq.handle();
        handle.add_immediate(Event::note(1, 1, 0, 0, 5, 60, 100));
        handle.add_immediate(Event::note(2, 1, 0, 0, 0, 60, 100));
        let halter = seq.handle();
        let mut seen = Vec::new();
        let progress = Arc::new(Mutex::new(Vec::new()));
        let progress_log = progress.clone();
        seq.set_callback(10, move |wraps| {
            progress_log.lock().unwrap().push(wraps);
            if wraps == 3 {
                halter.halt();
            }
        });
        let summary = seq.run(PlayMode::Live, None).unwrap();
        seen.extend(progress.lock().unwrap().iter().copied());
        assert!(summary.halted);
        assert_eq!(summary.samples, 30);
        assert_eq!(seen, vec![1, 2, 3]);
        // the indefinite voice is torn down with the run
        assert_eq!(seq.manager().deallocated(), 2);
        assert_eq!(handle.state(), SeqState::Off);
    }

    #[test]
    fn end_tick_bounds_a_run() {
        let (mut seq, _log) = sequencer(SequencerConfig {
            tick_block: 8,
            ..Default::default()
        });
        seq.add_event(note(1, 0, 100)).unwrap();
        let summary = seq.run(PlayMode::Sequence, Some(20)).unwrap();
        assert_eq!(summary.samples, 20);
        assert_eq!(seq.active_voices(), 0);
    }

    #[test]
    fn tracks_start_from_the_master_track() {
        let buffer = BufferOut::new();
        let (mut seq, log) = sequencer_with(unit_blocks(), Box::new(buffer.clone()));
        seq.add_event(note(1, 0, 2).with_track(4)).unwrap();
        seq.add_event(
            Event::new(10, EventKind::StartTrack)
                .with_track(4)
                .with_timing(1, 0)
                .with_param(param::LOOP_COUNT, 1.0),
        )
        .unwrap();
        assert_eq!(seq.track(MASTER_TRACK).unwrap().len(), 1);
        assert!(!seq.track(4).unwrap().is_running());

        let summary = seq.run(PlayMode::Multi { live: false }, None).unwrap();
        assert_eq!(summary.samples, 5);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["start 1", "stop 1", "destroy 1", "start 1", "stop 1", "destroy 1"]
        );
        let samples = buffer.samples();
        assert_eq!(samples.len(), 5);
        assert_eq!(samples[0].left, 0.0);
        assert!(samples[1].left > 0.0);
    }

    #[test]
    fn pause_blocks_until_resumed() {
        let (mut seq, _log) = sequencer(unit_blocks());
        seq.add_event(note(1, 0, 50)).unwrap();
        let handle = seq.handle();
        let pauser = seq.handle();
        seq.set_callback(10, move |wraps| {
            if wraps == 1 {
                pauser.pause();
            }
        });
        let runner = std::thread::spawn(move || seq.run(PlayMode::Sequence, None));
        while handle.state() != SeqState::Paused(PlayMode::Sequence) {
            std::thread::yield_now();
        }
        handle.resume();
        let summary = runner.join().unwrap().unwrap();
        assert_eq!(summary.samples, 50);
    }

    #[test]
    fn halt_wakes_a_paused_run() {
        let (mut seq, _log) = sequencer(unit_blocks());
        seq.add_event(note(1, 0, 50)).unwrap();
        let handle = seq.handle();
        let pauser = seq.handle();
        seq.set_callback(10, move |wraps| {
            if wraps == 1 {
                pauser.pause();
            }
        });
        let runner = std::thread::spawn(move || seq.run(PlayMode::Sequence, None));
        while handle.state() != SeqState::Paused(PlayMode::Sequence) {
            std::thread::yield_now();
        }
        handle.halt();
        let summary = runner.join().unwrap().unwrap();
        assert!(summary.halted);
        assert_eq!(summary.samples, 10);
        assert_eq!(handle.state(), SeqState::Off);
    }

    #[test]
    fn reset_clears_everything() {
        let (mut seq, _log) = sequencer(unit_blocks());
        seq.add_event(note(1, 0, 10).with_track(3)).unwrap();
        seq.dispatch(&note(2, 0, 10)).unwrap();
        seq.reset();
        assert_eq!(seq.active_voices(), 0);
        assert!(seq.track(3).is_none());
        assert!(seq.track(MASTER_TRACK).unwrap().is_empty());
        assert_eq!(seq.manager().deallocated(), 1);
    }

    #[test]
    fn tone_instruments_render_audio() {
        let buffer = BufferOut::new();
        let mut seq = Sequencer::new(
            SequencerConfig {
                sample_rate: 8000,
                ..Default::default()
            },
            Box::new(buffer.clone()),
        );
        register_builtin(seq.manager_mut()).unwrap();
        seq.manager_mut()
            .add_instrument(1, "sine", "Tone", Template::new())
            .unwrap();
        seq.add_event(Event::note(1, 1, 0, 0, 800, 69, 127)).unwrap();
        let summary = seq.run(PlayMode::Sequence, None).unwrap();
        assert!(summary.samples > 800);
        let samples = buffer.samples();
        assert!(samples.iter().any(|s| s.left.abs() > 0.1));
        assert_eq!(seq.manager().allocated(), seq.manager().deallocated());
    }
}
