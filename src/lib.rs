//! Wishbone-style bus functional model and bus monitor for Rust testbenches.
//!
//! A `Bfm` issues single-beat reads and writes on a ready/valid bus, a `BusMonitor`
//! answers reads half a clock later, and a `Sequencer` brings up clock and reset. All of
//! them are cooperative tasks on the in-process `Simulator`, talking only through signals.

pub mod bfm;
pub mod bus;
pub mod config;
mod error;
mod executor;
mod junit;
pub mod kernel;
pub mod monitor;
pub mod prelude;
pub mod runner;
pub mod sequencer;
mod shared;
mod signal;
pub mod sim_if;
pub mod testbench;
mod trigger;
pub mod utils;

pub use error::{TbError, TbResult};
pub use executor::{JoinHandle, Task};
pub use shared::Shared;
pub use signal::{Driver, ObjectKind, SimObject};
pub use trigger::{EdgeKind, Trigger};
