//! Maps `Box<dyn Error>` from trait boundaries to typed `ShuttleError`.
//!
//! The traits in `shuttle_traits` use `Box<dyn Error + Send + Sync>`; this
//! module converts those to our typed error enum, with an optional
//! feature-gated path for `shuttle_hardware::HwError` downcasting.

use crate::error::ShuttleError;

/// Map a trait-boundary error to a typed `ShuttleError`.
///
/// Every motor adapter failure is a communication failure from the control
/// loop's point of view; the hardware error kind is kept in the message.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> ShuttleError {
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(hw) = e.downcast_ref::<shuttle_hardware::error::HwError>() {
            return match hw {
                shuttle_hardware::error::HwError::Timeout => {
                    ShuttleError::DeviceCommunication("timeout waiting for motor reply".into())
                }
                other => ShuttleError::DeviceCommunication(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    if s.to_lowercase().contains("timeout") {
        ShuttleError::DeviceCommunication(format!("timeout: {s}"))
    } else {
        ShuttleError::DeviceCommunication(s)
    }
}
