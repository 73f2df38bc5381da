//! Shuttle status returned from each control loop iteration.

use crate::error::ShuttleError;

/// Public status of a single step of the motion loop.
#[derive(Debug, Clone, PartialEq)]
pub enum ShuttleStatus {
    /// Keep polling.
    Running,
    /// All transients of all slices completed.
    Done,
    /// Aborted with a typed error; the motion distance has been reset.
    Aborted(ShuttleError),
}
