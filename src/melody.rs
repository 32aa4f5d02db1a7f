// seqsynth -- an event sequencer and soundbank synthesizer
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! A simple textual format for writing melodies while testing things.
//!
//! A melody is a sequence of notes (`c`, `f#5`, `bb3`), rests (`r`) and chords (`{c e g}`).
//! Each symbol may be followed by a duration: a quarter by default, every `+` doubles and
//! every `-` halves it, and each trailing `.` adds half of the previous value.

use snafu::Snafu;

use crate::event::{ChannelId, Event, EventId, InstrId, Tick, TrackId};
use crate::note::{Accidental, Note, NoteName};

/// How parsed notes are turned into events.
#[derive(Debug, Clone)]
pub struct MelodyOptions {
    /// Ticks in a whole note.
    pub whole: Tick,
    pub instr: InstrId,
    pub channel: ChannelId,
    pub track: TrackId,
    pub velocity: u8,
    /// Id of the first generated event, following notes count up from there.
    pub first_id: EventId,
}

impl MelodyOptions {
    /// Options for a tempo given in quarter notes per minute.
    pub fn with_tempo(sample_rate: u32, bpm: f64) -> Self {
        Self {
            whole: (sample_rate as f64 * 240.0 / bpm).round() as Tick,
            ..Default::default()
        }
    }
}

impl Default for MelodyOptions {
    fn default() -> Self {
        Self {
            whole: 4 * 44100 / 2,
            instr: 1,
            channel: 0,
            track: 0,
            velocity: 100,
            first_id: 1,
        }
    }
}

/// Parse a melody into note events.
///
/// ```
/// use seqsynth::melody::{parse_melody, MelodyOptions};
///
/// let options = MelodyOptions { whole: 16, ..Default::default() };
/// let events = parse_melody("c d+ r- {e g}", &options).unwrap();
/// let timing: Vec<_> = events.iter().map(|e| (e.start(), e.duration())).collect();
/// assert_eq!(timing, vec![(0, 4), (4, 8), (14, 4), (14, 4)]);
/// ```
pub fn parse_melody(input: &str, options: &MelodyOptions) -> Result<Vec<Event>, ParseError> {
    let mut p = Parser::new(input);
    let syms = p.parse_sequence()?;
    Ok(schedule(&syms, options))
}

#[derive(Debug, Snafu)]
pub enum ParseError {
    #[snafu(display("unexpected end of melody"))]
    Eof,
    #[snafu(display("expected a note name, found {:?}", found))]
    NoNote { found: char },
    /// A note could not be represented using MIDI encoding.
    #[snafu(display("note is outside of the MIDI range"))]
    UnrepresentableNote,
    #[snafu(display("unexpected {:?} at offset {}", found, offset))]
    Unexpected { found: char, offset: usize },
}

/// Note value as a fraction of a whole note.
type Duration = f64;

#[derive(Debug, Clone, PartialEq)]
pub struct NoteSym {
    /// Which key was pressed
    pub note: Note,
    /// How long the note is held
    pub duration: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Sym {
    Note(NoteSym),
    /// Notes sounding together, the chord lasts as long as its longest note.
    Chord(Vec<NoteSym>),
    Rest(Duration),
}

impl Sym {
    fn duration(&self) -> Duration {
        match self {
            Sym::Note(sym) => sym.duration,
            Sym::Chord(notes) => notes.iter().map(|n| n.duration).fold(0.0, f64::max),
            Sym::Rest(duration) => *duration,
        }
    }
}

fn schedule(syms: &[Sym], options: &MelodyOptions) -> Vec<Event> {
    let ticks = |time: Duration| (time * options.whole as f64).round() as Tick;
    let mut events = Vec::new();
    let mut time = 0.0;
    for sym in syms {
        let notes: &[NoteSym] = match sym {
            Sym::Note(sym) => std::slice::from_ref(sym),
            Sym::Chord(notes) => notes,
            Sym::Rest(_) => &[],
        };
        for note in notes {
            let start = ticks(time);
            let id = options.first_id + events.len() as EventId;
            events.push(
                Event::note(
                    id,
                    options.instr,
                    options.channel,
                    start,
                    ticks(time + note.duration) - start,
                    note.note.to_midi(),
                    options.velocity,
                )
                .with_track(options.track),
            );
        }
        time += sym.duration();
    }
    events
}

struct Parser<'a> {
    stream: Scan<'a>,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        let mut stream = Scan::new(input);
        stream.skip_whitespace();
        Self { stream }
    }

    pub fn is_eof(&mut self) -> bool {
        self.stream.is_eof()
    }

    pub fn parse_sequence(&mut self) -> Result<Vec<Sym>, ParseError> {
        let mut syms = Vec::new();
        while !self.is_eof() {
            syms.push(self.parse_sym()?);
        }
        Ok(syms)
    }

    pub fn parse_sym(&mut self) -> Result<Sym, ParseError> {
        match self.peek_char()? {
            'r' | 'R' => {
                self.expect_char()?;
                let duration = self.parse_duration()?;
                self.stream.skip_whitespace();
                Ok(Sym::Rest(duration))
            }
            '{' => {
                self.expect_char()?;
                self.stream.skip_whitespace();
                let mut notes = Vec::new();
                while self.peek_char()? != '}' {
                    notes.push(self.parse_note_sym()?);
                }
                self.expect_char()?;
                self.stream.skip_whitespace();
                Ok(Sym::Chord(notes))
            }
            'a'..='g' | 'A'..='G' => self.parse_note_sym().map(Sym::Note),
            found => Err(ParseError::Unexpected {
                found,
                offset: self.stream.offset(),
            }),
        }
    }

    pub fn parse_note_sym(&mut self) -> Result<NoteSym, ParseError> {
        let note = self.parse_note()?;
        let duration = self.parse_duration()?;
        self.stream.skip_whitespace();

        Ok(NoteSym { note, duration })
    }

    fn parse_note(&mut self) -> Result<Note, ParseError> {
        let name = match self.expect_char()? {
            'a' | 'A' => NoteName::A,
            'b' | 'B' => NoteName::B,
            'c' | 'C' => NoteName::C,
            'd' | 'D' => NoteName::D,
            'e' | 'E' => NoteName::E,
            'f' | 'F' => NoteName::F,
            'g' | 'G' => NoteName::G,
            found => return Err(ParseError::NoNote { found }),
        };
        let accidental = match self.peek_char_optional() {
            Some('♯') | Some('#') => {
                self.stream.advance();
                Accidental::Sharp
            }
            Some('♭') | Some('b') => {
                self.stream.advance();
                Accidental::Flat
            }
            _ => Accidental::Base,
        };
        let octave = match self.peek_char_optional().and_then(|ch| ch.to_digit(10)) {
            Some(digit) => {
                self.stream.advance();
                digit as i32
            }
            None => 4,
        };
        Note::try_named(name, accidental, octave).ok_or(ParseError::UnrepresentableNote)
    }

    fn parse_duration(&mut self) -> Result<Duration, ParseError> {
        // powers of two first, starting at a quarter
        let mut power: i32 = -2;
        loop {
            match self.stream.current() {
                Some((_, '+')) => {
                    self.stream.advance();
                    power += 1;
                }
                Some((_, '-')) => {
                    self.stream.advance();
                    power -= 1;
                }
                _ => break,
            }
        }
        let mut dots = 0;
        while let Some('.') = self.peek_char_optional() {
            self.expect_char()?;
            dots += 1;
        }
        let mut duration = 2f64.powi(power);
        for i in 0..dots {
            // each dot is worth half of the previous one
            duration += 2f64.powi(power - i - 1);
        }
        Ok(duration)
    }

    fn expect_char(&mut self) -> Result<char, ParseError> {
        match self.stream.next() {
            Some((_, ch)) => Ok(ch),
            None => Err(ParseError::Eof),
        }
    }

    fn peek_char(&mut self) -> Result<char, ParseError> {
        self.peek_char_optional().ok_or(ParseError::Eof)
    }

    fn peek_char_optional(&mut self) -> Option<char> {
        self.stream.current().map(|(_, ch)| ch)
    }
}

struct Scan<'a> {
    stream: std::iter::Peekable<std::str::CharIndices<'a>>,
    len: usize,
}

impl<'a> Scan<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            stream: input.char_indices().peekable(),
            len: input.len(),
        }
    }

    pub fn is_eof(&mut self) -> bool {
        self.current().is_none()
    }

    pub fn current(&mut self) -> Option<(usize, char)> {
        self.stream.peek().cloned()
    }

    /// Byte offset of the current character.
    pub fn offset(&mut self) -> usize {
        self.current().map_or(self.len, |(pos, _)| pos)
    }

    pub fn next(&mut self) -> Option<(usize, char)> {
        self.stream.next()
    }

    pub fn advance(&mut self) {
        self.stream.next();
    }

    pub fn skip_whitespace(&mut self) {
        while let Some((_, ch)) = self.current() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parser() {
        let mel = parse_melody(
            r"
            c-d-e-f- g g
            a-a-a-a- g+
            a-a-a-a- g+
            f-f-f-f- e e
            d-d-d-d- c+",
            &MelodyOptions::default(),
        )
        .unwrap();
        assert_eq!(mel.len(), 27);
        let ids: Vec<EventId> = mel.iter().map(|e| e.id()).collect();
        assert_eq!(ids, (1..=27).collect::<Vec<_>>());
        let last = mel.last().unwrap();
        // four bars of four quarters, the last note being a half
        assert_eq!(last.end(), 5 * MelodyOptions::default().whole);
    }

    #[test]
    fn parse_duration() {
        let mut p = Parser::new("--+-++...");
        assert_eq!(p.parse_duration().unwrap(), 15.0 / 32.0);
    }

    #[test]
    fn note_parser() {
        let mut p = Parser::new("a b a++ a- a-. a#-- bb3");
        let a = Note::try_named(NoteName::A, Accidental::Base, 4).unwrap();
        let b = Note::try_named(NoteName::B, Accidental::Base, 4).unwrap();
        let a_sharp = Note::try_named(NoteName::A, Accidental::Sharp, 4).unwrap();
        let expected = vec![
            (a, 0.25),
            (b, 0.25),
            (a, 1.0),
            (a, 0.125),
            (a, 0.1875),
            (a_sharp, 0.0625),
        ];
        for (note, duration) in expected {
            assert_eq!(p.parse_note_sym().unwrap(), NoteSym { note, duration });
        }
        assert_eq!(p.parse_note_sym().unwrap().note.to_midi(), 58);
    }

    #[test]
    fn chords_last_as_long_as_their_longest_note() {
        let options = MelodyOptions {
            whole: 8,
            instr: 3,
            channel: 2,
            track: 5,
            velocity: 90,
            first_id: 10,
        };
        let events = parse_melody("{c+ e} g", &options).unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!((events[1].start(), events[1].duration()), (0, 2));
        assert_eq!(events[2].start(), 4);
        assert_eq!(events[2].id(), 12);
        assert!(events
            .iter()
            .all(|e| e.instr() == 3 && e.channel() == 2 && e.track() == 5));
    }

    #[test]
    fn errors() {
        let options = MelodyOptions::default();
        let err = parse_melody("c d x", &options).unwrap_err();
        assert_eq!(err.to_string(), "unexpected 'x' at offset 4");
        assert!(matches!(
            parse_melody("{c e", &options),
            Err(ParseError::Eof)
        ));
    }

    #[test]
    fn tempo() {
        assert_eq!(MelodyOptions::with_tempo(48000, 120.0).whole, 96000);
    }
}
