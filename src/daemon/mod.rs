//! Daemon subsystem: main event loop, termination signals, module reload.

pub mod loop_main;
pub mod reload;
pub mod signals;
