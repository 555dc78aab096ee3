//! Error types for the oceanspec driver.
//!
//! Provides structured errors instead of `Box<dyn Error>`, so callers can
//! programmatically distinguish transport failures, protocol violations,
//! out-of-range arguments, and unsupported features.

use thiserror::Error;

/// Top-level error type for all oceanspec operations.
#[derive(Debug, Error)]
pub enum Error {
    /// No supported spectrometer was found on the USB bus.
    #[error("no Ocean Optics spectrometer found (vendor id 0x2457)")]
    NoDevice,

    /// A USB/libusb transport error occurred.
    #[error("USB error: {0}")]
    Transport(rusb::Error),

    /// The device is already configured/claimed by another client.
    /// Enumeration recovers by skipping the device.
    #[error("device is busy (already in use by another process)")]
    Busy,

    /// A bulk read did not complete within the derived timeout budget.
    /// The device is left in an indeterminate state; close and reopen.
    #[error("USB read timed out")]
    Timeout,

    /// An operation was attempted on a closed transport.
    #[error("transport is not open")]
    NotOpen,

    /// OBP header/footer malformed: wrong magic, wrong length, or the
    /// immediate/payload carriage rule was violated.
    #[error("OBP framing error: {0}")]
    ProtocolFraming(String),

    /// The OBP response carried NACK or a hardware exception with a
    /// non-zero error number.
    #[error("OBP error {code}: {message}")]
    Protocol { code: u16, message: &'static str },

    /// The device flagged the protocol version as deprecated.
    #[error("device reports the protocol version as deprecated")]
    ProtocolDeprecated,

    /// MD5 message checksum mismatch. Only raised under
    /// [`ChecksumPolicy::Strict`](crate::ChecksumPolicy::Strict);
    /// the default policy logs a warning instead.
    #[error("OBP message checksum mismatch")]
    ChecksumMismatch,

    /// The requested capability is absent on this model, or the value
    /// (e.g. a trigger mode) is not supported by it.
    #[error("{feature} is not supported on the {model}")]
    Unsupported {
        feature: &'static str,
        model: &'static str,
    },

    /// Integration time outside the model's bounds, or another numeric
    /// validation failed before any wire write.
    #[error("{what} {value} out of range [{min}, {max})")]
    OutOfRange {
        what: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },

    /// EEPROM slot contents could not be interpreted as expected.
    #[error("could not parse device data: {0}")]
    Parse(String),
}

impl From<rusb::Error> for Error {
    fn from(e: rusb::Error) -> Self {
        match e {
            rusb::Error::Busy => Error::Busy,
            rusb::Error::Timeout => Error::Timeout,
            other => Error::Transport(other),
        }
    }
}
