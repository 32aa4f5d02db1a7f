// seqsynth -- an event sequencer and soundbank synthesizer
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! Easy interface for getting sound to play using a sox subprocess.

use std::io;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};

use log::debug;

use super::WaveOut;
use crate::wave::{copy_bytes_to, Stereo};

/// Samples buffered before they are handed to sox.
const CHUNK_SAMPLES: usize = 1024;

pub enum SoxTarget {
    /// Play on the default audio device.
    Play,
    /// Write to a file, the format is derived from the extension.
    File(PathBuf),
}

pub struct SoxOut {
    player: Child,
    audio_stream: Option<ChildStdin>,
    pending: Vec<Stereo<f64>>,
    bytes: Vec<u8>,
}

impl SoxOut {
    pub fn new(sample_rate: u32, target: SoxTarget) -> io::Result<Self> {
        let sample_rate_str = format!("{}", sample_rate);
        let input_args = &[
            "-R", // make the output reproducible
            "--channels",
            "2",
            "--rate",
            &sample_rate_str,
            "--type",
            "f64",
            "/dev/stdin",
        ];

        // For properly recording the sox dependency on nix:
        let (play, sox) = if let Some(sox_bin) = option_env!("NIX_SOX_BIN") {
            debug!("using sox from nix store {}", sox_bin);
            (Path::new(sox_bin).join("play"), Path::new(sox_bin).join("sox"))
        } else {
            ("play".into(), "sox".into())
        };

        let mut player = match target {
            SoxTarget::Play => Command::new(&play)
                .args(input_args)
                .stdin(Stdio::piped())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .spawn()?,
            SoxTarget::File(outfile) => Command::new(&sox)
                .args(input_args)
                .arg(outfile)
                .stdin(Stdio::piped())
                .spawn()?,
        };

        let audio_stream = player.stdin.take().ok_or_else(|| {
            io::Error::new(io::ErrorKind::BrokenPipe, "sox has no input stream")
        })?;

        Ok(Self {
            player,
            audio_stream: Some(audio_stream),
            pending: Vec::with_capacity(CHUNK_SAMPLES),
            bytes: vec![0; CHUNK_SAMPLES * 16],
        })
    }

    fn flush_pending(&mut self) -> io::Result<()> {
        let stream = self.audio_stream.as_mut().ok_or_else(|| {
            io::Error::new(io::ErrorKind::BrokenPipe, "sox stream already closed")
        })?;
        let count = copy_bytes_to(&self.pending, &mut self.bytes);
        stream.write_all(&self.bytes[..count * 16])?;
        self.pending.clear();
        Ok(())
    }
}

impl WaveOut for SoxOut {
    fn write(&mut self, sample: Stereo<f64>) -> io::Result<()> {
        self.pending.push(sample);
        if self.pending.len() >= CHUNK_SAMPLES {
            self.flush_pending()?;
        }
        Ok(())
    }

    fn finish(&mut self) -> io::Result<()> {
        if self.audio_stream.is_none() {
            return Ok(());
        }
        self.flush_pending()?;
        // sox exits once its input is closed
        drop(self.audio_stream.take());
        let status = self.player.wait()?;
        debug!("sox exited with {}", status);
        Ok(())
    }
}
