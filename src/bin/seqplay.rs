// seqsynth -- an event sequencer and soundbank synthesizer
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! `seqplay` plays a melody through the sequencer, either with a tone generator or with a
//! small soundbank built on the fly.

use std::f64::consts::PI;
use std::path::PathBuf;
use std::str::FromStr;

use log::info;
use snafu::Snafu;
use structopt::StructOpt;

use seqsynth::instrument::{self, tone, Template};
use seqsynth::manager::ManagerError;
use seqsynth::melody::{self, MelodyOptions};
use seqsynth::output::{SoxOut, SoxTarget, WaveOut};
use seqsynth::sequencer::{
    MissingInstrumentPolicy, PlayMode, Sequencer, SequencerConfig, SequencerError,
};
use seqsynth::soundbank::convert::seconds_to_timecents;
use seqsynth::soundbank::modulator::Gen;
use seqsynth::soundbank::{LoopMode, Sample, SoundBank, Zone, ZoneGroup};
use seqsynth::track::TrackError;

#[derive(Debug, Snafu)]
enum CliError {
    #[snafu(display("could not parse melody: {}", source))]
    Melody { source: melody::ParseError },
    #[snafu(display("{}", source))]
    Schedule { source: TrackError },
    #[snafu(display("{}", source))]
    Setup { source: ManagerError },
    #[snafu(display("{}", source))]
    Play { source: SequencerError },
    #[snafu(display("could not start sox: {}", source))]
    Sox { source: std::io::Error },
    #[snafu(display("unknown instrument {}, expected tone or soundbank", name))]
    UnknownVoice { name: String },
}

#[derive(Debug, Copy, Clone)]
enum Voice {
    Tone,
    SoundBank,
}

impl FromStr for Voice {
    type Err = CliError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tone" => Ok(Voice::Tone),
            "soundbank" | "sb" => Ok(Voice::SoundBank),
            _ => Err(CliError::UnknownVoice {
                name: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, StructOpt)]
#[structopt(name = "seqplay", about = "Playing melodies through a sequencer")]
struct Opt {
    #[structopt(short = "v", long = "verbose", parse(from_occurrences))]
    verbose: usize,

    /// The melody, e.g. "c d e f g+ g+".
    melody: String,

    /// Quarter notes per minute.
    #[structopt(short, long, default_value = "120")]
    bpm: f64,

    /// Either "tone" or "soundbank".
    #[structopt(short, long, default_value = "tone")]
    instrument: Voice,

    #[structopt(long, default_value = "44100")]
    sample_rate: u32,

    /// Samples rendered between dispatch rounds, 0 for half a millisecond.
    #[structopt(long, default_value = "0")]
    tick_block: u64,

    #[structopt(long, default_value = "32")]
    max_voices: usize,

    /// Abort when an event refers to an unknown instrument instead of skipping it.
    #[structopt(long)]
    fail_fast: bool,

    /// Output file (any sox-supported format). Music is played directly if not given.
    #[structopt(short, long, parse(from_os_str))]
    output: Option<PathBuf>,
}

/// A soundbank with a single looped sine wave covering every key.
fn sine_bank(sample_rate: u32) -> SoundBank {
    const PERIOD: usize = 100;
    let data = (0..PERIOD)
        .map(|i| (2.0 * PI * i as f64 / PERIOD as f64).sin() as f32)
        .collect();
    let mut bank = SoundBank::new("sine");
    // one period at 440 Hz
    let sample = bank.add_sample(Sample::with_data("sine", 44000, 69, data));
    if let Some(instr) = bank.add_instr(0, 0) {
        instr.name = "Sine".to_string();
        let group = instr.add_group(ZoneGroup::new());
        instr.add_zone(
            group,
            Zone::new(Some(sample))
                .with_loop(LoopMode::Continuous)
                .with_gen(Gen::AttackVolEnv, seconds_to_timecents(0.01))
                .with_gen(Gen::ReleaseVolEnv, seconds_to_timecents(0.3))
                .with_gen(Gen::InitialFilterFc, 9000.0),
        );
    }
    info!("built demo soundbank at {} Hz output rate", sample_rate);
    bank
}

fn run(opt: Opt) -> Result<(), CliError> {
    let config = SequencerConfig {
        sample_rate: opt.sample_rate,
        tick_block: opt.tick_block,
        max_voices: opt.max_voices,
        missing_instrument: if opt.fail_fast {
            MissingInstrumentPolicy::Abort
        } else {
            MissingInstrumentPolicy::Skip
        },
    };
    let target = match opt.output {
        Some(path) => SoxTarget::File(path),
        None => SoxTarget::Play,
    };
    let out = SoxOut::new(opt.sample_rate, target).map_err(|source| CliError::Sox { source })?;
    let mut seq = Sequencer::new(config, Box::new(out) as Box<dyn WaveOut>);

    let manager = seq.manager_mut();
    instrument::register_builtin(manager).map_err(|source| CliError::Setup { source })?;
    let template = match opt.instrument {
        Voice::Tone => Template::new()
            .with_param(tone::ATTACK, 0.01)
            .with_param(tone::RELEASE, 0.1),
        Voice::SoundBank => {
            manager.soundbanks_mut().register(sine_bank(opt.sample_rate));
            Template::new().with_soundbank("sine")
        }
    };
    let type_name = match opt.instrument {
        Voice::Tone => tone::TYPE_NAME,
        Voice::SoundBank => instrument::player::TYPE_NAME,
    };
    manager
        .add_instrument(1, "lead", type_name, template)
        .map_err(|source| CliError::Setup { source })?;

    let options = MelodyOptions {
        instr: 1,
        ..MelodyOptions::with_tempo(opt.sample_rate, opt.bpm)
    };
    let events =
        melody::parse_melody(&opt.melody, &options).map_err(|source| CliError::Melody { source })?;
    info!("playing {} notes", events.len());
    for evt in events {
        seq.add_event(evt)
            .map_err(|source| CliError::Schedule { source })?;
    }

    let rate = opt.sample_rate as u64;
    seq.set_callback(rate, |seconds| log::debug!("{} s played", seconds));
    let summary = seq
        .run(PlayMode::Sequence, None)
        .map_err(|source| CliError::Play { source })?;
    info!(
        "done after {:.2} s, {} events skipped",
        summary.samples as f64 / rate as f64,
        summary.skipped
    );
    Ok(())
}

fn main() {
    let opt = Opt::from_args();

    let level = match opt.verbose {
        0 => log::Level::Info,
        1 => log::Level::Debug,
        _ => log::Level::Trace,
    };
    if let Err(err) = simple_logger::init_with_level(level) {
        eprintln!("could not initialize logging: {}", err);
    }

    if let Err(err) = run(opt) {
        log::error!("{}", err);
        std::process::exit(1);
    }
}
