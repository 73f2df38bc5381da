//! Motor module drivers for the sample shuttle.
//!
//! `tmcl` speaks the Trinamic TMCL protocol over any `Read + Write` stream;
//! the `hardware` feature adds serial port discovery. `sim` provides a
//! software shuttle for runs without a motor attached.

pub mod error;
#[cfg(feature = "hardware")]
pub mod serial;
pub mod sim;
pub mod tmcl;
pub mod util;

pub use error::HwError;
pub use sim::{SimTiming, SimulatedShuttle};
pub use tmcl::TmclModule;
