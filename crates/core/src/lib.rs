//! Voicebed core: voice restoration, effects chain and background-bed mixing.
//!
//! The engine works on fully decoded planar buffers. Container decoding,
//! encoding and resampling backends live in `voicebed-infra`.

pub mod domain;

pub use domain::*;
