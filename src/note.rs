// seqsynth -- an event sequencer and soundbank synthesizer
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! Definitions of what a note is.

/// A "note" is just an index on the synthesizers keyboard.
/// This definition follows the MIDI standard where C4 corresponds to index 60.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Note(u8);

/// The name of a note in standard notation.
pub enum NoteName {
    A,
    B,
    C,
    D,
    E,
    F,
    G,
}

/// Any offset applied to a note in standard notation.
pub enum Accidental {
    /// The note is a half-tone lower then indicated by its name.
    Flat,
    /// The note is left unchanged.
    Base,
    /// The note is a half-tone higher then indicated by its name.
    Sharp,
}

impl Note {
    /// Convert a note from standard notation to a MIDI note index.
    /// Returns `None` if the note is not representable in the MIDI note system.
    ///
    /// # Examples
    ///
    /// ```
    /// use seqsynth::note::*;
    ///
    /// assert_eq!(Note::try_named(NoteName::A, Accidental::Base, 4), Some(Note::from_midi(69)));
    /// assert_eq!(Note::try_named(NoteName::C, Accidental::Sharp, 6), Some(Note::from_midi(85)));
    /// assert_eq!(Note::try_named(NoteName::G, Accidental::Flat, 2), Some(Note::from_midi(42)));
    /// assert_eq!(Note::try_named(NoteName::C, Accidental::Base, 10), None);
    /// ```
    pub fn try_named(name: NoteName, accidental: Accidental, octave: i32) -> Option<Note> {
        let name_index = match name {
            NoteName::C => 0,
            NoteName::D => 2,
            NoteName::E => 4,
            NoteName::F => 5,
            NoteName::G => 7,
            NoteName::A => 9,
            NoteName::B => 11,
        };
        let offset_index = match accidental {
            Accidental::Base => 0,
            Accidental::Flat => -1,
            Accidental::Sharp => 1,
        };
        // C4 is MIDI note number 60
        let normalize_index = 60 - 4 * 12;
        let note_index = octave * 12 + name_index + offset_index + normalize_index;
        Note::try_from_midi(note_index as i64)
    }

    pub fn from_midi(midi_note: u8) -> Note {
        assert!(midi_note < 128, "MIDI only has notes 0 - 127");
        Note(midi_note)
    }

    pub fn try_from_midi(midi_note: i64) -> Option<Note> {
        if (0..128).contains(&midi_note) {
            Some(Note(midi_note as u8))
        } else {
            None
        }
    }

    pub fn to_midi(self) -> u8 {
        self.0
    }

    /// Frequency of the note in concert tuning, where A4 corresponds to 440 Hz.
    ///
    /// ```
    /// use seqsynth::note::*;
    /// assert_eq!(Note::from_midi(57).frequency(), 220.0);
    /// assert_eq!(Note::from_midi(81).frequency(), 880.0);
    /// ```
    pub fn frequency(self) -> f64 {
        key_frequency(self.0 as f64)
    }
}

/// Frequency of a (possibly fractional) MIDI key number in concert tuning.
pub fn key_frequency(key: f64) -> f64 {
    440.0 * 2.0f64.powf((key - 69.0) / 12.0)
}

/// The velocity of a voice indicates how hard/fast the key was pressed down,
/// following MIDI from 0 to 127.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Velocity(u8);

impl Velocity {
    pub const MAX: Velocity = Velocity(127);
    pub const MIN: Velocity = Velocity(0);

    /// Clamp an arbitrary value into the MIDI velocity range.
    ///
    /// ```
    /// use seqsynth::note::*;
    ///
    /// assert_eq!(Velocity::clamped(300.0), Velocity::MAX);
    /// assert_eq!(Velocity::clamped(-2.0), Velocity::MIN);
    /// assert_eq!(Velocity::clamped(64.4).to_midi(), 64);
    /// ```
    pub fn clamped(value: f64) -> Velocity {
        if value.is_nan() {
            return Velocity::MIN;
        }
        Velocity(value.round().max(0.0).min(127.0) as u8)
    }

    pub fn to_midi(self) -> u8 {
        self.0
    }

    /// Velocity as a normalized float between 0.0 and 1.0 inclusive.
    pub fn as_f64(self) -> f64 {
        self.0 as f64 / 127.0
    }
}
