//! scrcpy-deck library
//!
//! Headless front-end and one-shot commands for the scrcpy device deck.

pub mod commands;
pub mod headless;

// Re-export main entry points
pub use headless::runner::run_headless;
