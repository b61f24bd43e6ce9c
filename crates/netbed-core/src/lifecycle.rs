use crate::CoreError;
use netbed_model::DeviceStatus;

/// Validate a device status transition.
///
/// The happy path is stopped -> starting -> running -> stopping -> stopped.
/// Any in-flight state may fail into error; error devices are retried by the
/// next sync. Stopping is reachable from every settled state because a
/// destroy may be requested against a record whose container drifted.
pub fn validate_transition(from: DeviceStatus, to: DeviceStatus) -> Result<(), CoreError> {
    use DeviceStatus::{Error, Running, Starting, Stopped, Stopping};

    let valid = matches!(
        (from, to),
        (Stopped | Error, Starting)
            | (Starting, Running)
            | (Stopped | Starting | Running | Error, Stopping)
            | (Stopping, Stopped)
            | (Starting | Running | Stopping, Error)
    );

    if valid {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}
