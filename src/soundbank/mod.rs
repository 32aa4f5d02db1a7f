// seqsynth -- an event sequencer and soundbank synthesizer
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! Soundbanks map a (bank, program, key, velocity) request to the sample zones that play it.
//!
//! A bank holds up to 129 banks of 128 programs each, bank 128 being reserved for percussion.
//! Every instrument is made of zone groups that layer on top of each other, and every group
//! fans out to its zones through a per-key lookup table.

pub mod convert;
pub mod modulator;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use log::{debug, info, warn};
use snafu::Snafu;

use modulator::{apply_mods, default_mods, merge_mods, ControllerState, GenSet, Modulator};

/// Bank number reserved for percussion kits.
pub const PERCUSSION_BANK: u32 = 128;

const BANK_COUNT: usize = 129;
const PROGRAM_COUNT: usize = 128;

#[derive(Debug, Snafu)]
pub enum SoundBankError {
    #[snafu(display("instrument references unknown sample {}", index))]
    UnknownSample { index: usize },
    #[snafu(display("sample {} is not loaded and the bank has no sample source", name))]
    NoSampleSource { name: String },
    #[snafu(display("could not load sample {}: {}", name, message))]
    SampleLoad { name: String, message: String },
}

/// How a zone loops its sample.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LoopMode {
    NoLoop,
    /// Loop for as long as the voice plays, including the release.
    Continuous,
    /// Loop until the note is released, then play out the rest of the sample.
    UntilRelease,
}

/// A block of mono sample data with its recording parameters.
#[derive(Debug)]
pub struct Sample {
    pub name: String,
    pub rate: u32,
    /// Key at which the sample plays back at its recorded pitch.
    pub root_key: u8,
    /// Pitch correction in cents.
    pub correction: f64,
    pub loop_start: usize,
    pub loop_end: usize,
    data: OnceLock<Arc<[f32]>>,
}

impl Sample {
    /// A sample whose data is not loaded until an instrument using it is requested.
    pub fn new(name: impl Into<String>, rate: u32, root_key: u8) -> Self {
        Self {
            name: name.into(),
            rate,
            root_key,
            correction: 0.0,
            loop_start: 0,
            loop_end: 0,
            data: OnceLock::new(),
        }
    }

    /// A sample with its data already in memory. The loop spans the whole sample.
    pub fn with_data(name: impl Into<String>, rate: u32, root_key: u8, data: Vec<f32>) -> Self {
        let sample = Self::new(name, rate, root_key).with_loop(0, data.len());
        // freshly created, so the cell is empty
        let _ = sample.data.set(data.into());
        sample
    }

    pub fn with_loop(mut self, start: usize, end: usize) -> Self {
        self.loop_start = start;
        self.loop_end = end;
        self
    }

    pub fn data(&self) -> Option<&Arc<[f32]>> {
        self.data.get()
    }

    pub fn is_loaded(&self) -> bool {
        self.data.get().is_some()
    }
}

/// Pages in sample data on demand, e.g. from the file a bank was parsed from.
pub trait SampleSource: Send + Sync {
    fn load(&self, index: usize, sample: &Sample) -> Result<Vec<f32>, SoundBankError>;
}

/// The terminal unit of a bank: one sample played over a key and velocity range.
#[derive(Debug, Clone)]
pub struct Zone {
    /// Index into the sample list of the bank. A zone without a sample is silent.
    pub sample: Option<usize>,
    pub loop_mode: LoopMode,
    /// Overrides the loop points of the sample when set.
    pub loop_points: Option<(usize, usize)>,
    /// Overrides the root key of the sample when set.
    pub root_key: Option<u8>,
    pub lo_key: u8,
    pub hi_key: u8,
    pub lo_vel: u8,
    pub hi_vel: u8,
    /// Voices of the same non-zero class cut each other off.
    pub exclusive_class: u32,
    pub gens: GenSet,
    pub mods: Vec<Modulator>,
}

impl Zone {
    pub fn new(sample: Option<usize>) -> Self {
        Self {
            sample,
            loop_mode: LoopMode::NoLoop,
            loop_points: None,
            root_key: None,
            lo_key: 0,
            hi_key: 127,
            lo_vel: 0,
            hi_vel: 127,
            exclusive_class: 0,
            gens: GenSet::new(),
            mods: Vec::new(),
        }
    }

    pub fn with_keys(mut self, lo: u8, hi: u8) -> Self {
        self.lo_key = lo;
        self.hi_key = hi;
        self
    }

    pub fn with_velocities(mut self, lo: u8, hi: u8) -> Self {
        self.lo_vel = lo;
        self.hi_vel = hi;
        self
    }

    pub fn with_loop(mut self, mode: LoopMode) -> Self {
        self.loop_mode = mode;
        self
    }

    pub fn with_loop_points(mut self, start: usize, end: usize) -> Self {
        self.loop_points = Some((start, end));
        self
    }

    pub fn with_root_key(mut self, key: u8) -> Self {
        self.root_key = Some(key);
        self
    }

    pub fn with_exclusive_class(mut self, class: u32) -> Self {
        self.exclusive_class = class;
        self
    }

    pub fn with_gen(mut self, gen: modulator::Gen, value: f64) -> Self {
        self.gens.set(gen, value);
        self
    }

    pub fn with_mod(mut self, m: Modulator) -> Self {
        self.mods.push(m);
        self
    }

    pub fn matches_velocity(&self, velocity: u8) -> bool {
        self.lo_vel <= velocity && velocity <= self.hi_vel
    }
}

/// A layer of zones with its own range and modulator scope.
#[derive(Debug, Clone)]
pub struct ZoneGroup {
    pub lo_key: u8,
    pub hi_key: u8,
    pub lo_vel: u8,
    pub hi_vel: u8,
    pub gens: GenSet,
    /// Evaluated once when a note starts.
    pub init_mods: Vec<Modulator>,
    /// Re-evaluated whenever a controller changes during playback.
    pub play_mods: Vec<Modulator>,
    /// Zone indices of the instrument for every key, in declaration order.
    key_map: Vec<Vec<usize>>,
}

impl Default for ZoneGroup {
    fn default() -> Self {
        Self {
            lo_key: 0,
            hi_key: 127,
            lo_vel: 0,
            hi_vel: 127,
            gens: GenSet::new(),
            init_mods: Vec::new(),
            play_mods: Vec::new(),
            key_map: vec![Vec::new(); 128],
        }
    }
}

impl ZoneGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_keys(mut self, lo: u8, hi: u8) -> Self {
        self.lo_key = lo;
        self.hi_key = hi;
        self
    }

    pub fn with_velocities(mut self, lo: u8, hi: u8) -> Self {
        self.lo_vel = lo;
        self.hi_vel = hi;
        self
    }

    pub fn contains(&self, key: u8, velocity: u8) -> bool {
        (self.lo_key..=self.hi_key).contains(&key) && (self.lo_vel..=self.hi_vel).contains(&velocity)
    }

    fn zones_for(&self, key: u8) -> &[usize] {
        self.key_map
            .get(key as usize)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// A zone picked for a note, together with the group it was found in.
#[derive(Debug, Copy, Clone)]
pub struct ZoneMatch<'a> {
    pub group: &'a ZoneGroup,
    pub zone: &'a Zone,
}

/// Flattened synthesis parameters of one zone for one note.
#[derive(Debug, Clone)]
pub struct Articulation {
    /// Generators of all scopes with the note-on modulators applied.
    pub base: GenSet,
    /// Modulators depending on controllers that may change while the note plays.
    pub play_mods: Vec<Modulator>,
}

impl Articulation {
    /// Final generator values under the current controller state.
    pub fn resolve(&self, ctl: &ControllerState, key: u8, velocity: u8) -> GenSet {
        let mut gens = self.base.clone();
        apply_mods(&mut gens, &self.play_mods, ctl, key, velocity);
        gens
    }
}

/// An instrument of a soundbank, selected by bank and program number.
#[derive(Debug)]
pub struct SbInstr {
    pub bank: u32,
    pub program: u8,
    pub name: String,
    /// Generators of the global zone.
    pub gens: GenSet,
    pub mods: Vec<Modulator>,
    groups: Vec<ZoneGroup>,
    zones: Vec<Zone>,
    loaded: AtomicBool,
}

impl SbInstr {
    fn new(bank: u32, program: u8) -> Self {
        Self {
            bank,
            program,
            name: String::new(),
            gens: GenSet::new(),
            mods: Vec::new(),
            groups: Vec::new(),
            zones: Vec::new(),
            loaded: AtomicBool::new(false),
        }
    }

    /// Add a zone group, returning its index.
    pub fn add_group(&mut self, group: ZoneGroup) -> usize {
        self.groups.push(group);
        self.groups.len() - 1
    }

    /// Add a zone to a group and register it for every key of its range.
    /// Returns `None` if there is no such group.
    pub fn add_zone(&mut self, group: usize, zone: Zone) -> Option<usize> {
        let index = self.zones.len();
        let group = self.groups.get_mut(group)?;
        for key in zone.lo_key..=zone.hi_key.min(127) {
            group.key_map[key as usize].push(index);
        }
        self.zones.push(zone);
        self.loaded.store(false, Ordering::Release);
        Some(index)
    }

    /// Add an instrument-wide modulator, replacing one with the same connection.
    pub fn add_mod(&mut self, m: Modulator) {
        merge_mods(&mut self.mods, std::slice::from_ref(&m));
    }

    pub fn groups(&self) -> &[ZoneGroup] {
        &self.groups
    }

    pub fn zone_list(&self) -> &[Zone] {
        &self.zones
    }

    fn match_in<'a>(&'a self, group: &'a ZoneGroup, key: u8, velocity: u8) -> Option<ZoneMatch<'a>> {
        if !group.contains(key, velocity) {
            return None;
        }
        group
            .zones_for(key)
            .iter()
            .map(|&index| &self.zones[index])
            .find(|zone| zone.matches_velocity(velocity))
            .map(|zone| ZoneMatch { group, zone })
    }

    /// The first zone playing `key` at `velocity`, searching groups in declaration order.
    pub fn get_zone(&self, key: u8, velocity: u8) -> Option<&Zone> {
        self.zones(key, velocity).next().map(|m| m.zone)
    }

    /// The first matching zone of every group, i.e. all layers sounding for a note.
    pub fn zones(&self, key: u8, velocity: u8) -> impl Iterator<Item = ZoneMatch<'_>> + '_ {
        self.groups
            .iter()
            .filter_map(move |group| self.match_in(group, key, velocity))
    }

    /// Flatten generators and modulators of all scopes for a zone.
    ///
    /// Generators set in narrower scopes replace broader ones. Modulators merge from the
    /// defaults over the instrument and group to the zone, the narrowest one winning for
    /// the same connection. Connections from controllers that can change during the note
    /// are kept apart so they can be re-evaluated.
    pub fn articulation(
        &self,
        found: &ZoneMatch<'_>,
        ctl: &ControllerState,
        key: u8,
        velocity: u8,
    ) -> Articulation {
        let mut base = self.gens.clone();
        base.overlay(&found.group.gens);
        base.overlay(&found.zone.gens);

        let mut mods = default_mods();
        merge_mods(&mut mods, &self.mods);
        merge_mods(&mut mods, &found.group.init_mods);
        merge_mods(&mut mods, &found.group.play_mods);
        merge_mods(&mut mods, &found.zone.mods);

        let (play_mods, init_mods): (Vec<Modulator>, Vec<Modulator>) =
            mods.into_iter().partition(|m| {
                m.is_realtime() || found.group.play_mods.iter().any(|p| p.identity() == m.identity())
            });
        apply_mods(&mut base, &init_mods, ctl, key, velocity);
        Articulation { base, play_mods }
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }
}

/// A collection of instruments and the samples they play.
pub struct SoundBank {
    name: String,
    banks: Vec<Option<Vec<Option<SbInstr>>>>,
    samples: Vec<Sample>,
    source: Option<Box<dyn SampleSource>>,
}

impl std::fmt::Debug for SoundBank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoundBank")
            .field("name", &self.name)
            .field("samples", &self.samples.len())
            .finish()
    }
}

/// Map a bank number to its slot. Banks above 128 are only valid in MSB form,
/// i.e. a multiple of 128 that shifts into range.
///
/// ```
/// use seqsynth::soundbank::normalize_bank;
///
/// assert_eq!(normalize_bank(0), Some(0));
/// assert_eq!(normalize_bank(128), Some(128));
/// assert_eq!(normalize_bank(127 << 7), Some(127));
/// assert_eq!(normalize_bank(129), None);
/// assert_eq!(normalize_bank(130), None);
/// ```
pub fn normalize_bank(bank: u32) -> Option<usize> {
    if bank <= PERCUSSION_BANK {
        Some(bank as usize)
    } else if bank & 0x7f == 0 && bank >> 7 <= PERCUSSION_BANK {
        Some((bank >> 7) as usize)
    } else {
        None
    }
}

impl SoundBank {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            banks: (0..BANK_COUNT).map(|_| None).collect(),
            samples: Vec::new(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: Box<dyn SampleSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a sample, returning the index zones refer to it by.
    pub fn add_sample(&mut self, sample: Sample) -> usize {
        self.samples.push(sample);
        self.samples.len() - 1
    }

    pub fn sample(&self, index: usize) -> Option<&Sample> {
        self.samples.get(index)
    }

    /// The instrument at (bank, program), created if it does not exist yet.
    /// Returns `None` if either number is out of range.
    pub fn add_instr(&mut self, bank: u32, program: u8) -> Option<&mut SbInstr> {
        let slot = normalize_bank(bank)?;
        if program as usize >= PROGRAM_COUNT {
            return None;
        }
        let programs = self.banks[slot]
            .get_or_insert_with(|| (0..PROGRAM_COUNT).map(|_| None).collect());
        Some(programs[program as usize].get_or_insert_with(|| SbInstr::new(slot as u32, program)))
    }

    /// Look up an instrument, falling back to lower banks down to 0 when the exact bank
    /// has none. The percussion bank is never substituted.
    /// With `autoload`, the samples of the instrument are paged in first.
    pub fn get_instr(&self, bank: u32, program: u8, autoload: bool) -> Option<&SbInstr> {
        let slot = normalize_bank(bank)?;
        if program as usize >= PROGRAM_COUNT {
            return None;
        }
        let found = if slot == PERCUSSION_BANK as usize {
            self.lookup(slot, program)
        } else {
            (0..=slot).rev().find_map(|b| self.lookup(b, program))
        }?;
        if found.bank as usize != slot {
            debug!(
                "{}: no program {} in bank {}, using bank {}",
                self.name, program, slot, found.bank
            );
        }
        if autoload && !found.is_loaded() {
            if let Err(err) = self.load_instr(found) {
                warn!("{}: {}", self.name, err);
            }
        }
        Some(found)
    }

    fn lookup(&self, slot: usize, program: u8) -> Option<&SbInstr> {
        self.banks[slot].as_ref()?[program as usize].as_ref()
    }

    /// Page in every sample referenced by the zones of an instrument.
    pub fn load_instr(&self, instr: &SbInstr) -> Result<(), SoundBankError> {
        for zone in &instr.zones {
            if let Some(index) = zone.sample {
                self.load_sample(index)?;
            }
        }
        instr.loaded.store(true, Ordering::Release);
        Ok(())
    }

    fn load_sample(&self, index: usize) -> Result<(), SoundBankError> {
        let sample = self
            .samples
            .get(index)
            .ok_or(SoundBankError::UnknownSample { index })?;
        if sample.is_loaded() {
            return Ok(());
        }
        let source = self
            .source
            .as_ref()
            .ok_or_else(|| SoundBankError::NoSampleSource {
                name: sample.name.clone(),
            })?;
        let data = source.load(index, sample)?;
        debug!("{}: loaded sample {} ({} frames)", self.name, sample.name, data.len());
        let _ = sample.data.set(data.into());
        Ok(())
    }
}

impl Drop for SoundBank {
    fn drop(&mut self) {
        info!("releasing soundbank {}", self.name);
    }
}

/// Soundbanks known to an instrument manager, by name.
///
/// The registry keeps one reference to every bank, instruments playing from a bank hold
/// their own. A bank is released once it is unloaded and the last voice using it is gone.
#[derive(Debug, Default)]
pub struct SoundBankRegistry {
    banks: HashMap<String, Arc<SoundBank>>,
}

impl SoundBankRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a bank under its name, replacing any bank of the same name.
    pub fn register(&mut self, bank: SoundBank) -> Arc<SoundBank> {
        let bank = Arc::new(bank);
        if self
            .banks
            .insert(bank.name().to_string(), bank.clone())
            .is_some()
        {
            debug!("replaced soundbank {}", bank.name());
        }
        bank
    }

    /// A new reference to the named bank.
    pub fn lock(&self, name: &str) -> Option<Arc<SoundBank>> {
        self.banks.get(name).cloned()
    }

    /// Drop the registry reference. Returns whether the bank was registered.
    pub fn unload(&mut self, name: &str) -> bool {
        self.banks.remove(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.banks.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod test {
    use super::modulator::Gen;
    use super::*;

    fn bank_with(entries: &[(u32, u8)]) -> SoundBank {
        let mut sb = SoundBank::new("test");
        for &(bank, program) in entries {
            let instr = sb.add_instr(bank, program).unwrap();
            instr.name = format!("{}:{}", bank, program);
        }
        sb
    }

    #[test]
    fn add_instr_bank_numbers() {
        let mut sb = SoundBank::new("test");
        assert!(sb.add_instr(0, 5).is_some());
        assert!(sb.add_instr(128, 5).is_some());
        assert_eq!(sb.add_instr(16256, 5).map(|i| i.bank), Some(127));
        assert!(sb.add_instr(129, 5).is_none());
        assert!(sb.add_instr(130, 5).is_none());
        assert!(sb.add_instr(0, 128).is_none());
    }

    #[test]
    fn falls_back_to_lower_banks() {
        let sb = bank_with(&[(2, 10)]);
        let instr = sb.get_instr(5, 10, false).unwrap();
        assert_eq!(instr.bank, 2);
        assert_eq!(instr.name, "2:10");
        assert!(sb.get_instr(1, 10, false).is_none());
        assert!(sb.get_instr(5, 11, false).is_none());
    }

    #[test]
    fn fallback_prefers_nearest_bank() {
        let sb = bank_with(&[(0, 1), (3, 1)]);
        assert_eq!(sb.get_instr(7, 1, false).unwrap().bank, 3);
        assert_eq!(sb.get_instr(2, 1, false).unwrap().bank, 0);
    }

    #[test]
    fn percussion_never_falls_back() {
        let sb = bank_with(&[(0, 0), (127, 0)]);
        assert!(sb.get_instr(128, 0, false).is_none());
        let sb = bank_with(&[(128, 0)]);
        assert_eq!(sb.get_instr(128, 0, false).unwrap().bank, 128);
    }

    fn layered() -> SoundBank {
        let mut sb = SoundBank::new("layers");
        let instr = sb.add_instr(0, 0).unwrap();
        let low = instr.add_group(ZoneGroup::new().with_keys(0, 63));
        let all = instr.add_group(ZoneGroup::new());
        let empty = instr.add_group(ZoneGroup::new());
        instr
            .add_zone(low, Zone::new(None).with_keys(0, 63).with_velocities(0, 63))
            .unwrap();
        instr
            .add_zone(low, Zone::new(None).with_keys(40, 63).with_gen(Gen::Pan, 100.0))
            .unwrap();
        instr
            .add_zone(all, Zone::new(None).with_gen(Gen::Pan, -100.0))
            .unwrap();
        assert!(instr.add_zone(empty + 1, Zone::new(None)).is_none());
        sb
    }

    #[test]
    fn zone_matching_is_first_match() {
        let sb = layered();
        let instr = sb.get_instr(0, 0, false).unwrap();
        let soft = instr.get_zone(50, 10).unwrap();
        assert_eq!(soft.lo_vel, 0);
        assert_eq!(soft.hi_vel, 63);
        let loud = instr.get_zone(50, 100).unwrap();
        assert_eq!(loud.gens.get(Gen::Pan), 100.0);
        let high = instr.get_zone(100, 100).unwrap();
        assert_eq!(high.gens.get(Gen::Pan), -100.0);
        assert_eq!(instr.zones(50, 100).count(), 2);
        assert!(instr.get_zone(20, 100).is_some());
        // same request, same answer
        let again = instr.get_zone(50, 10).unwrap();
        assert!(std::ptr::eq(soft, again));
    }

    #[test]
    fn articulation_scopes() {
        let mut sb = SoundBank::new("scopes");
        let instr = sb.add_instr(0, 0).unwrap();
        instr.gens.set(Gen::Pan, 100.0);
        instr.gens.set(Gen::CoarseTune, 2.0);
        let quiet = Modulator::new(
            modulator::ModSource::None,
            convert::Curve::LINEAR,
            Gen::InitialAttenuation,
            10.0,
        );
        instr.add_mod(quiet);
        instr.add_mod(quiet.with_amount_source(modulator::ModSource::None, convert::Curve::LINEAR));
        assert_eq!(instr.mods.len(), 1);
        let mut group = ZoneGroup::new();
        group.gens.set(Gen::CoarseTune, 5.0);
        group.play_mods.push(Modulator::new(
            modulator::ModSource::Key,
            convert::Curve::LINEAR,
            Gen::FineTune,
            127.0,
        ));
        let g = instr.add_group(group);
        instr
            .add_zone(g, Zone::new(None).with_gen(Gen::FineTune, 3.0))
            .unwrap();

        let instr = sb.get_instr(0, 0, false).unwrap();
        let found = instr.zones(60, 127).next().unwrap();
        let ctl = ControllerState::default();
        let art = instr.articulation(&found, &ctl, 60, 127);
        assert_eq!(art.base.get(Gen::Pan), 100.0);
        assert_eq!(art.base.get(Gen::CoarseTune), 5.0);
        assert_eq!(art.base.get(Gen::FineTune), 3.0);
        assert!(art.play_mods.iter().any(|m| m.src == modulator::ModSource::Key));
        let gens = art.resolve(&ctl, 60, 127);
        assert!((gens.get(Gen::FineTune) - 63.0).abs() < 0.1);
    }

    #[test]
    fn zone_mods_override_group_play_mods() {
        let key_pan = |amount| {
            Modulator::new(
                modulator::ModSource::Key,
                convert::Curve::LINEAR,
                Gen::Pan,
                amount,
            )
        };
        let mut sb = SoundBank::new("scopes");
        let instr = sb.add_instr(0, 0).unwrap();
        let mut group = ZoneGroup::new();
        group.play_mods.push(key_pan(127.0));
        let g = instr.add_group(group);
        instr
            .add_zone(g, Zone::new(None).with_mod(key_pan(10.0)))
            .unwrap();

        let instr = sb.get_instr(0, 0, false).unwrap();
        let found = instr.zones(127, 127).next().unwrap();
        let ctl = ControllerState::default();
        let art = instr.articulation(&found, &ctl, 127, 127);
        // still re-evaluated while playing, with the zone's amount
        let pan: Vec<_> = art.play_mods.iter().filter(|m| m.dst == Gen::Pan).collect();
        assert_eq!(pan.len(), 1);
        assert_eq!(pan[0].amount, 10.0);
        let gens = art.resolve(&ctl, 127, 127);
        assert!((gens.get(Gen::Pan) - 10.0).abs() < 1e-6);
    }

    struct Ramp;

    impl SampleSource for Ramp {
        fn load(&self, _index: usize, sample: &Sample) -> Result<Vec<f32>, SoundBankError> {
            if sample.name == "broken" {
                return Err(SoundBankError::SampleLoad {
                    name: sample.name.clone(),
                    message: "truncated".into(),
                });
            }
            Ok((0..8).map(|i| i as f32 / 8.0).collect())
        }
    }

    #[test]
    fn autoload_pages_in_samples() {
        let mut sb = SoundBank::new("lazy").with_source(Box::new(Ramp));
        let s = sb.add_sample(Sample::new("ramp", 8000, 60));
        let instr = sb.add_instr(0, 0).unwrap();
        let g = instr.add_group(ZoneGroup::new());
        instr.add_zone(g, Zone::new(Some(s))).unwrap();

        assert!(!sb.sample(s).unwrap().is_loaded());
        let instr = sb.get_instr(0, 0, false).unwrap();
        assert!(!instr.is_loaded());
        let instr = sb.get_instr(0, 0, true).unwrap();
        assert!(instr.is_loaded());
        assert_eq!(sb.sample(s).unwrap().data().map(|d| d.len()), Some(8));
    }

    #[test]
    fn failed_load_keeps_instrument() {
        let mut sb = SoundBank::new("lazy").with_source(Box::new(Ramp));
        let s = sb.add_sample(Sample::new("broken", 8000, 60));
        let instr = sb.add_instr(0, 0).unwrap();
        let g = instr.add_group(ZoneGroup::new());
        instr.add_zone(g, Zone::new(Some(s))).unwrap();
        let instr = sb.get_instr(0, 0, true).unwrap();
        assert!(!instr.is_loaded());
        assert!(sb.sample(s).unwrap().data().is_none());
    }

    #[test]
    fn registry_releases_on_last_reference() {
        let mut registry = SoundBankRegistry::new();
        registry.register(SoundBank::new("gm"));
        let held = registry.lock("gm").unwrap();
        assert!(registry.unload("gm"));
        assert!(registry.lock("gm").is_none());
        assert_eq!(Arc::strong_count(&held), 1);
        assert!(!registry.unload("gm"));
    }
}
