//! Geography quiz engine: question generation, answer checking and the
//! per-run state machine, plus the settings the chat front end needs.

pub mod config;
pub mod quiz;
