//! Voice attempt pipeline for Ni Hao Now scenario practice.
//!
//! Captures a spoken attempt from the microphone, transcodes it to a
//! canonical 16 kHz mono 16-bit WAV, and submits it to the scoring service.

pub mod audio;
pub mod auth;
pub mod config;
pub mod practice;
pub mod scoring;
