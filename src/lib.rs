//! `zonegate` - multi-participant zone governance for gated media playback
//!
//! A session tracks each participant's latest intensity zone, runs timed
//! zone challenges, and decides on every tick whether governed media may
//! keep playing.

pub mod cli;
pub mod config;
pub mod error;
pub mod governance;
pub mod observability;
pub mod session;
pub mod transport;
