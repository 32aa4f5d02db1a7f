// seqsynth -- an event sequencer and soundbank synthesizer
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! Destinations for the rendered sample stream.

pub mod sox;

use std::io;
use std::sync::{Arc, Mutex, PoisonError};

use crate::wave::Stereo;

pub use sox::{SoxOut, SoxTarget};

/// Consumes the mixed output one sample at a time.
pub trait WaveOut: Send {
    fn write(&mut self, sample: Stereo<f64>) -> io::Result<()>;

    /// Called once at the end of a run.
    fn finish(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Discards everything.
#[derive(Debug, Default)]
pub struct NullOut;

impl WaveOut for NullOut {
    fn write(&mut self, _sample: Stereo<f64>) -> io::Result<()> {
        Ok(())
    }
}

/// Collects samples in memory. Clones share the same buffer, so one clone can be handed
/// to the sequencer while another one reads the result.
#[derive(Debug, Clone, Default)]
pub struct BufferOut {
    samples: Arc<Mutex<Vec<Stereo<f64>>>>,
}

impl BufferOut {
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of everything written so far.
    pub fn samples(&self) -> Vec<Stereo<f64>> {
        self.samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl WaveOut for BufferOut {
    fn write(&mut self, sample: Stereo<f64>) -> io::Result<()> {
        self.samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sample);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn buffer_clones_share_samples() {
        let reader = BufferOut::new();
        let mut writer: Box<dyn WaveOut> = Box::new(reader.clone());
        writer.write(Stereo::mono(0.5)).unwrap();
        writer.write(Stereo::new(0.0, 1.0)).unwrap();
        writer.finish().unwrap();
        assert_eq!(
            reader.samples(),
            vec![Stereo::mono(0.5), Stereo::new(0.0, 1.0)]
        );
    }
}
