//! Bulk USB transport.
//!
//! [`UsbTransport`] owns an open rusb device handle and an endpoint map, and
//! exposes writes on the primary-out endpoint plus sized, timed reads on one
//! of three named modes.  The [`Transport`] trait exists so the protocol and
//! feature layers can be exercised against a scripted mock in tests.

use std::time::Duration;

use rusb::{Context, Device, DeviceHandle};

use crate::error::Error;
use crate::models::EndpointMap;

/// Default USB transfer timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);

/// Named read endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    /// Low-speed command/reply endpoint.
    PrimaryIn,
    /// High-speed spectral data endpoint.
    SecondaryIn,
    /// Alternate high-speed endpoint (first packets of a dual-path frame).
    SecondaryIn2,
}

/// Byte-level device I/O as seen by the protocol layer.
///
/// Strictly single-threaded per device: every write is matched by at most
/// one read before the next write.
pub trait Transport {
    /// Write all bytes to the primary-out endpoint.
    fn write(&mut self, data: &[u8]) -> Result<(), Error>;

    /// Read up to `size` bytes from the endpoint selected by `mode`.
    fn read(&mut self, size: usize, timeout: Duration, mode: ReadMode) -> Result<Vec<u8>, Error>;

    /// The device's default transfer timeout.
    fn default_timeout(&self) -> Duration {
        DEFAULT_TIMEOUT
    }
}

/// rusb-backed transport for one opened spectrometer.
pub struct UsbTransport {
    handle: DeviceHandle<Context>,
    endpoints: EndpointMap,
    timeout: Duration,
    open: bool,
}

impl UsbTransport {
    /// Open the device: detach an active kernel driver (ignored where the
    /// platform cannot answer the query), select configuration 1 (an
    /// already-configured device is treated as success), and claim
    /// interface 0.
    pub fn open(device: &Device<Context>, endpoints: EndpointMap) -> Result<Self, Error> {
        let handle = device.open()?;
        handle.reset()?;

        match handle.kernel_driver_active(0) {
            Ok(true) => handle.detach_kernel_driver(0)?,
            Ok(false) => {}
            Err(rusb::Error::NotSupported) => {}
            Err(e) => return Err(e.into()),
        }

        match handle.set_active_configuration(1) {
            Ok(()) => {}
            Err(rusb::Error::Busy) => {
                log::warn!("device already configured, continuing");
            }
            Err(e) => return Err(e.into()),
        }

        handle.claim_interface(0)?;

        Ok(Self {
            handle,
            endpoints,
            timeout: DEFAULT_TIMEOUT,
            open: true,
        })
    }

    /// Release USB resources and reset the device.  The transport returns
    /// to the closed state; further I/O fails with [`Error::NotOpen`].
    pub fn close(&mut self) {
        if !self.open {
            return;
        }
        if let Err(e) = self.handle.release_interface(0) {
            log::warn!("failed to release interface: {e}");
        }
        if let Err(e) = self.handle.reset() {
            log::warn!("failed to reset device on close: {e}");
        }
        self.open = false;
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    fn endpoint_for(&self, mode: ReadMode) -> Result<u8, Error> {
        let ep = match mode {
            ReadMode::PrimaryIn => Some(self.endpoints.primary_in),
            ReadMode::SecondaryIn => self.endpoints.secondary_in,
            ReadMode::SecondaryIn2 => self.endpoints.secondary_in2,
        };
        ep.ok_or(Error::Transport(rusb::Error::NotFound))
    }
}

impl Transport for UsbTransport {
    fn write(&mut self, data: &[u8]) -> Result<(), Error> {
        if !self.open {
            return Err(Error::NotOpen);
        }
        let n = self
            .handle
            .write_bulk(self.endpoints.primary_out, data, self.timeout)?;
        if n != data.len() {
            return Err(Error::Transport(rusb::Error::Io));
        }
        Ok(())
    }

    fn read(&mut self, size: usize, timeout: Duration, mode: ReadMode) -> Result<Vec<u8>, Error> {
        if !self.open {
            return Err(Error::NotOpen);
        }
        let ep = self.endpoint_for(mode)?;
        let mut buf = vec![0u8; size];
        let n = self.handle.read_bulk(ep, &mut buf, timeout)?;
        buf.truncate(n);
        Ok(buf)
    }

    fn default_timeout(&self) -> Duration {
        self.timeout
    }
}

impl Drop for UsbTransport {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
pub(crate) mod mock {
    //! Scripted transport for protocol and feature tests.

    use super::*;

    /// Records writes and replays canned reads in order.
    #[derive(Default)]
    pub struct MockTransport {
        pub writes: Vec<Vec<u8>>,
        reads: std::collections::VecDeque<Result<Vec<u8>, Error>>,
        pub read_modes: Vec<ReadMode>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue a successful read response.
        pub fn push_read(&mut self, data: Vec<u8>) {
            self.reads.push_back(Ok(data));
        }

        /// Queue a read failure.
        pub fn push_error(&mut self, err: Error) {
            self.reads.push_back(Err(err));
        }
    }

    impl Transport for MockTransport {
        fn write(&mut self, data: &[u8]) -> Result<(), Error> {
            self.writes.push(data.to_vec());
            Ok(())
        }

        fn read(
            &mut self,
            size: usize,
            _timeout: Duration,
            mode: ReadMode,
        ) -> Result<Vec<u8>, Error> {
            self.read_modes.push(mode);
            match self.reads.pop_front() {
                Some(Ok(mut data)) => {
                    data.truncate(size);
                    Ok(data)
                }
                Some(Err(e)) => Err(e),
                None => Err(Error::Timeout),
            }
        }
    }
}
