//! Human-readable error descriptions, exit codes and structured JSON errors.

use shuttle_core::error::{AbortReason, BuildError, ShuttleError};
use shuttle_hardware::HwError;

pub const EXIT_OTHER: i32 = 1;
pub const EXIT_CONFIGURATION: i32 = 10;
pub const EXIT_OUT_OF_RANGE: i32 = 11;
pub const EXIT_INVALID_RAMP: i32 = 12;
pub const EXIT_DEVICE: i32 = 13;

pub fn abort_reason_name(r: &AbortReason) -> &'static str {
    match r {
        AbortReason::EmergencyStop => "EmergencyStop",
        AbortReason::StallDetected => "StallDetected",
        AbortReason::UserCancelled => "UserCancelled",
    }
}

fn error_name(err: &eyre::Report) -> &'static str {
    if let Some(se) = err.downcast_ref::<ShuttleError>() {
        return match se {
            ShuttleError::Configuration(_) => "Configuration",
            ShuttleError::OutOfRange(_) => "OutOfRange",
            ShuttleError::DeviceCommunication(_) => "DeviceCommunication",
            ShuttleError::Abort(r) => abort_reason_name(r),
            ShuttleError::InvalidRampExpression(_) => "InvalidRampExpression",
        };
    }
    if err.downcast_ref::<BuildError>().is_some() {
        return "Configuration";
    }
    if err.downcast_ref::<HwError>().is_some() {
        return "DeviceCommunication";
    }
    "Error"
}

fn describe_hw(hw: &HwError) -> String {
    match hw {
        HwError::PortNotFound(desc) => format!(
            "What happened: No motor module found (looked for USB device \"{desc}\").\nLikely causes: The module is unplugged or powered off, or it enumerates under another name.\nHow to fix: Connect the module, or set motor.port in the config to the device path."
        ),
        HwError::Timeout => "What happened: The motor module did not answer in time.\nLikely causes: Wrong baud rate or module address, or the module is busy or powered off.\nHow to fix: Check motor.baud_rate and motor.module_address; raise motor.reply_timeout_ms if the link is slow.".to_string(),
        other => format!(
            "What happened: Motor module communication failed ({other}).\nLikely causes: Loose USB cable or another program holding the port.\nHow to fix: Reconnect the module and run `shuttle_cli self-check`."
        ),
    }
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingMotor => {
                "What happened: No motor was provided to the shuttle controller.\nLikely causes: The motor connection failed to open or was not wired into the builder.\nHow to fix: Ensure the motor is created successfully and passed via with_motor(...).".to_string()
            }
            BuildError::MissingPlan => {
                "What happened: No run plan was provided to the shuttle controller.\nLikely causes: Run parameters were not validated before building.\nHow to fix: Plan the run with RunParameters::plan and pass it via with_plan(...).".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun. See etc/shuttle_config.toml for a sample."
            ),
        };
    }

    if let Some(hw) = err.downcast_ref::<HwError>() {
        return describe_hw(hw);
    }

    if let Some(se) = err.downcast_ref::<ShuttleError>() {
        return match se {
            ShuttleError::Configuration(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML or the field map CSV.\nHow to fix: Edit the config file, then rerun. See etc/shuttle_config.toml for a sample."
            ),
            ShuttleError::OutOfRange(msg) => format!(
                "What happened: The requested motion is out of range ({msg}).\nLikely causes: A target field above B0 or below what max_height_cm reaches, or speed/acceleration beyond the motor limits.\nHow to fix: Pick a reachable field or pass --distance; lower --speed or --accel, or lengthen --motion-time."
            ),
            ShuttleError::InvalidRampExpression(msg) => format!(
                "What happened: The velocity-sweep ramp could not be parsed ({msg}).\nLikely causes: A typo, an unknown function, or a ramp that uses neither z nor Bz.\nHow to fix: Use +, -, *, /, ^, exp and log over z (cm) and Bz (mT), e.g. \"1-0.9/(1+exp(-0.001*(Bz-5000)))\"."
            ),
            ShuttleError::DeviceCommunication(msg) => format!(
                "What happened: Lost communication with the motor module ({msg}).\nLikely causes: USB cable unplugged or the module lost power.\nHow to fix: Check the connection and run `shuttle_cli self-check` before retrying."
            ),
            ShuttleError::Abort(reason) => match reason {
                AbortReason::EmergencyStop => "What happened: Emergency stop (light gate interrupted).\nLikely causes: Something is blocking the shuttle path, or the light gate is misaligned.\nHow to fix: Clear the path and check the light gate, then start a new run.".to_string(),
                AbortReason::StallDetected => "What happened: The motor stalled.\nLikely causes: Sample stuck in the guide tube, or the stall profile is too sensitive for this tube.\nHow to fix: Free the sample, check --profile matches the tube, then start a new run.".to_string(),
                AbortReason::UserCancelled => "What happened: The run was cancelled.\nLikely causes: STOP was sent on stdin or Ctrl-C was pressed.\nHow to fix: Start a new run when ready.".to_string(),
            },
        };
    }

    // Generic fallback
    let msg = err.to_string();
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes for errors raised before or instead of a run summary.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if let Some(se) = err.downcast_ref::<ShuttleError>() {
        return match se {
            ShuttleError::Configuration(_) => EXIT_CONFIGURATION,
            ShuttleError::OutOfRange(_) => EXIT_OUT_OF_RANGE,
            ShuttleError::InvalidRampExpression(_) => EXIT_INVALID_RAMP,
            ShuttleError::DeviceCommunication(_) => EXIT_DEVICE,
            ShuttleError::Abort(_) => EXIT_OTHER,
        };
    }
    if err.downcast_ref::<BuildError>().is_some() {
        return EXIT_CONFIGURATION;
    }
    if err.downcast_ref::<HwError>().is_some() {
        return EXIT_DEVICE;
    }
    EXIT_OTHER
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    serde_json::json!({
        "reason": error_name(err),
        "exit_code": exit_code_for_error(err),
        "message": humanize(err),
    })
    .to_string()
}
