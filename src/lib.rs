// seqsynth -- an event sequencer and soundbank synthesizer
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

pub mod event;
pub mod instrument;
pub mod manager;
pub mod melody;
pub mod mixer;
pub mod output;
pub mod sequencer;
pub mod soundbank;
pub mod track;

// Signal processing building blocks
pub mod envelope;
pub mod filter;
pub mod note;
pub mod oscillator;
pub mod wave;
