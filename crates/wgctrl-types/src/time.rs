//! Kernel and daemon timestamps.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::{Result, WgError};

/// Nanoseconds in one second.
const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Converts a handshake timestamp into a [`SystemTime`].
///
/// All zero means no handshake yet and yields `None`.
///
/// # Errors
///
/// Returns [`WgError::Decode`] if `nsec` is not below one second or the
/// time cannot be represented on this platform.
pub fn handshake_time(sec: u64, nsec: u64) -> Result<Option<SystemTime>> {
    if sec == 0 && nsec == 0 {
        return Ok(None);
    }
    if nsec >= NANOS_PER_SEC {
        return Err(WgError::decode(format!("handshake nanoseconds out of range: {nsec}")));
    }
    UNIX_EPOCH
        .checked_add(Duration::new(sec, 0))
        .and_then(|t| t.checked_add(Duration::from_nanos(nsec)))
        .map(Some)
        .ok_or_else(|| WgError::decode(format!("handshake time out of range: {sec}.{nsec:09}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn zero_is_never() {
        assert_eq!(handshake_time(0, 0).expect("zero"), None);
    }

    #[test]
    fn seconds_and_nanoseconds_combine() {
        assert_eq!(
            handshake_time(5, 6).expect("time"),
            Some(UNIX_EPOCH + Duration::new(5, 6))
        );
        assert_eq!(
            handshake_time(0, 1).expect("time"),
            Some(UNIX_EPOCH + Duration::from_nanos(1))
        );
    }

    #[test_case(1, NANOS_PER_SEC; "one second of nanoseconds")]
    #[test_case(1, u64::MAX; "huge nanoseconds")]
    #[test_case(u64::MAX, 0; "seconds overflow")]
    #[test_case(u64::MAX, 999_999_999; "seconds overflow with nanoseconds")]
    fn out_of_range_is_decode_error(sec: u64, nsec: u64) {
        let err = handshake_time(sec, nsec).expect_err("out of range");
        assert!(matches!(err, WgError::Decode(_)));
    }
}
