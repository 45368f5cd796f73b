//! Wall-clock helpers.
//!
//! Identifier timestamps are unsigned 32-bit seconds since the Unix epoch. Times
//! before the epoch or past `u32::MAX` seconds are reported as errors rather than
//! being clamped or wrapped.

use crate::error::{constants, ProtocolError, Result};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Current time in whole seconds since the Unix epoch.
pub fn unix_seconds() -> Result<u32> {
    to_unix_seconds(SystemTime::now())
}

/// Convert `time` to whole seconds since the Unix epoch.
pub fn to_unix_seconds(time: SystemTime) -> Result<u32> {
    let secs = time
        .duration_since(UNIX_EPOCH)
        .map_err(|_| ProtocolError::ClockError(constants::ERR_SYSTEM_TIME.into()))?
        .as_secs();

    u32::try_from(secs).map_err(|_| ProtocolError::ClockError(constants::ERR_TIME_OVERFLOW.into()))
}

pub fn from_unix_seconds(secs: u32) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(u64::from(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let t = from_unix_seconds(1_353_184_030);
        assert_eq!(to_unix_seconds(t).unwrap(), 1_353_184_030);
    }

    #[test]
    fn test_before_epoch_is_an_error() {
        let t = UNIX_EPOCH - Duration::from_secs(1);
        assert!(matches!(to_unix_seconds(t), Err(ProtocolError::ClockError(_))));
    }

    #[test]
    fn test_overflow_is_an_error() {
        let t = UNIX_EPOCH + Duration::from_secs(u64::from(u32::MAX) + 1);
        assert!(matches!(to_unix_seconds(t), Err(ProtocolError::ClockError(_))));
    }
}
