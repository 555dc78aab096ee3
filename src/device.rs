//! Device discovery, opening, and lifecycle management.
//!
//! [`list_devices`] scans the USB bus for vendor 0x2457, matches product ids
//! against the model registry, resets and opens each instrument, and returns
//! a [`OceanDevice`] façade per device.  Devices claimed by another process
//! are skipped with a warning so one busy instrument never aborts the walk.

use std::time::Duration;

use rusb::{Context, UsbContext};

use crate::error::Error;
use crate::models::{self, ModelDescriptor, ProtocolFamily, SpectrumReadPath, VENDOR_ID};
use crate::obp::{ChecksumPolicy, ObpSession};
use crate::ooi::OoiSession;
use crate::transport::{Transport, UsbTransport};

/// The protocol conversation owned by one device.
pub enum ProtocolSession<T: Transport> {
    Ooi(OoiSession<T>),
    Obp(ObpSession<T>),
}

impl<T: Transport> ProtocolSession<T> {
    pub(crate) fn transport(&mut self) -> &mut T {
        match self {
            ProtocolSession::Ooi(s) => s.transport(),
            ProtocolSession::Obp(s) => s.transport(),
        }
    }
}

/// Capability identifiers exposed by [`OceanDevice::capabilities`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Spectrometer,
    Eeprom,
    ThermoElectric,
    Shutter,
    Strobe,
    Lamp,
    Nonlinearity,
    WavelengthCalibration,
}

/// Handle to one opened spectrometer.
///
/// Owns the protocol session exclusively between open and close; operations
/// complete in call order and the session is not safe for concurrent use.
pub struct OceanDevice<T: Transport> {
    pub(crate) descriptor: &'static ModelDescriptor,
    pub(crate) session: ProtocolSession<T>,
    serial_number: String,
    /// Last integration time accepted by [`set_integration_time_micros`]
    /// (used to derive spectrum read timeouts).
    pub(crate) integration_time_micros: Option<u32>,
    /// Cached saturation normalization factor, resolved on first use.
    pub(crate) normalization: Option<f64>,
}

impl<T: Transport> OceanDevice<T> {
    /// Build the façade over an already-open transport: instantiate the
    /// protocol session, send the OOI initialize opcode and resolve the
    /// USB-speed register where applicable, then resolve the serial number.
    pub fn open_with(
        transport: T,
        descriptor: &'static ModelDescriptor,
        checksum_policy: ChecksumPolicy,
    ) -> Result<Self, Error> {
        let session = match descriptor.protocol {
            ProtocolFamily::Ooi => {
                let mut s = OoiSession::new(transport);
                s.initialize()?;
                if descriptor.spectrum_path == SpectrumReadPath::FpgaSpeedDependent {
                    s.usb_speed()?;
                }
                ProtocolSession::Ooi(s)
            }
            ProtocolFamily::Obp => ProtocolSession::Obp(ObpSession::new(transport, checksum_policy)),
        };

        let mut device = Self {
            descriptor,
            session,
            serial_number: String::new(),
            integration_time_micros: None,
            normalization: None,
        };
        device.serial_number = device.get_serial_number()?;
        Ok(device)
    }

    /// The model descriptor for this instrument.
    pub fn model(&self) -> &'static ModelDescriptor {
        self.descriptor
    }

    /// Serial number resolved when the device was opened.
    pub fn serial_number(&self) -> &str {
        &self.serial_number
    }

    /// Capabilities present on this model.  Anything absent fails with
    /// [`Error::Unsupported`] when queried.
    pub fn capabilities(&self) -> Vec<Capability> {
        let caps = &self.descriptor.capabilities;
        let mut out = vec![Capability::Spectrometer];
        let flags = [
            (caps.eeprom, Capability::Eeprom),
            (caps.thermoelectric, Capability::ThermoElectric),
            (caps.shutter, Capability::Shutter),
            (caps.strobe, Capability::Strobe),
            (caps.lamp, Capability::Lamp),
            (caps.nonlinearity, Capability::Nonlinearity),
            (caps.wavelength_cal, Capability::WavelengthCalibration),
        ];
        out.extend(flags.iter().filter(|(p, _)| *p).map(|&(_, c)| c));
        out
    }

    /// Gate a feature on a declarative capability flag.
    pub(crate) fn require(&self, present: bool, feature: &'static str) -> Result<(), Error> {
        if present {
            Ok(())
        } else {
            Err(Error::Unsupported {
                feature,
                model: self.descriptor.name,
            })
        }
    }

    pub(crate) fn ooi_session(&mut self) -> Result<&mut OoiSession<T>, Error> {
        match &mut self.session {
            ProtocolSession::Ooi(s) => Ok(s),
            ProtocolSession::Obp(_) => Err(Error::Unsupported {
                feature: "OOI protocol command",
                model: self.descriptor.name,
            }),
        }
    }

    /// Read an FPGA register (OOI models only).
    pub fn read_fpga_register(&mut self, register: u8) -> Result<u16, Error> {
        self.ooi_session()?.read_register(register)
    }

    /// Write an FPGA register (OOI models only).
    pub fn write_fpga_register(&mut self, register: u8, value: u16) -> Result<(), Error> {
        self.ooi_session()?.write_register(register, value)
    }

    /// Read-timeout budget: the device's default USB timeout plus the
    /// currently configured integration time (the model minimum before the
    /// caller has set one).  Sized from the configured time rather than the
    /// model maximum, which on long-integration models would leave a dead
    /// device hanging for minutes.
    pub(crate) fn read_timeout(&mut self) -> Duration {
        let integration = self
            .integration_time_micros
            .unwrap_or(self.descriptor.integration_time_min);
        self.session.transport().default_timeout() + Duration::from_micros(u64::from(integration))
    }
}

impl OceanDevice<UsbTransport> {
    /// Release USB resources and reset the device.
    pub fn close(&mut self) {
        self.session.transport().close();
    }

    pub fn is_open(&mut self) -> bool {
        self.session.transport().is_open()
    }
}

/// Enumerate and open every attached spectrometer.
///
/// Devices already claimed elsewhere surface [`Error::Busy`] internally and
/// are skipped with a warning. Returns an empty vector when nothing matched.
pub fn list_devices() -> Result<Vec<OceanDevice<UsbTransport>>, Error> {
    list_devices_with_policy(ChecksumPolicy::default())
}

/// [`list_devices`] with an explicit OBP checksum policy.
pub fn list_devices_with_policy(
    checksum_policy: ChecksumPolicy,
) -> Result<Vec<OceanDevice<UsbTransport>>, Error> {
    let context = Context::new().map_err(Error::from)?;
    let mut found = Vec::new();

    for device in context.devices().map_err(Error::from)?.iter() {
        let desc = match device.device_descriptor() {
            Ok(d) => d,
            Err(_) => continue,
        };
        if desc.vendor_id() != VENDOR_ID {
            continue;
        }
        let Some(model) = models::lookup(desc.product_id()) else {
            continue;
        };

        let Some(transport) = skip_busy(UsbTransport::open(&device, model.endpoints), model)?
        else {
            continue;
        };

        found.push(OceanDevice::open_with(transport, model, checksum_policy)?);
    }

    Ok(found)
}

/// Per-device enumeration policy: a device claimed by another process
/// surfaces as `Busy` and is skipped with a warning so the bus walk
/// continues; any other open failure aborts the walk.
fn skip_busy<T>(opened: Result<T, Error>, model: &ModelDescriptor) -> Result<Option<T>, Error> {
    match opened {
        Ok(t) => Ok(Some(t)),
        Err(Error::Busy) => {
            log::warn!("skipping busy {} (0x{:04x})", model.name, model.product_id);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Open the first attached spectrometer, or fail with [`Error::NoDevice`].
pub fn first_device() -> Result<OceanDevice<UsbTransport>, Error> {
    list_devices()?.into_iter().next().ok_or(Error::NoDevice)
}

#[cfg(test)]
pub(crate) mod testutil {
    //! Device construction over a scripted transport, bypassing the
    //! open-time initialize/serial exchange.

    use super::*;
    use crate::transport::mock::MockTransport;

    pub fn device(
        descriptor: &'static ModelDescriptor,
        transport: MockTransport,
    ) -> OceanDevice<MockTransport> {
        device_with_policy(descriptor, transport, ChecksumPolicy::Warn)
    }

    pub fn device_with_policy(
        descriptor: &'static ModelDescriptor,
        transport: MockTransport,
        policy: ChecksumPolicy,
    ) -> OceanDevice<MockTransport> {
        let session = match descriptor.protocol {
            ProtocolFamily::Ooi => ProtocolSession::Ooi(OoiSession::new(transport)),
            ProtocolFamily::Obp => ProtocolSession::Obp(ObpSession::new(transport, policy)),
        };
        OceanDevice {
            descriptor,
            session,
            serial_number: String::new(),
            integration_time_micros: None,
            normalization: None,
        }
    }

    pub fn model(name: &str) -> &'static ModelDescriptor {
        models::MODELS
            .iter()
            .find(|m| m.name == name)
            .expect("unknown model in test")
    }
}

#[cfg(test)]
mod tests {
    use super::testutil::{device, model};
    use super::*;

    #[test]
    fn capabilities_follow_the_descriptor() {
        let mock = crate::transport::mock::MockTransport::new();
        let dev = device(model("QE65000"), mock);
        let caps = dev.capabilities();
        assert!(caps.contains(&Capability::Spectrometer));
        assert!(caps.contains(&Capability::ThermoElectric));
        assert!(caps.contains(&Capability::Eeprom));

        let mock = crate::transport::mock::MockTransport::new();
        let dev = device(model("STS"), mock);
        let caps = dev.capabilities();
        assert!(!caps.contains(&Capability::ThermoElectric));
        assert!(!caps.contains(&Capability::Eeprom));
    }

    #[test]
    fn busy_devices_are_skipped_without_aborting_enumeration() {
        let desc = model("STS");
        assert_eq!(skip_busy(Ok(7), desc).unwrap(), Some(7));
        assert_eq!(skip_busy::<u8>(Err(Error::Busy), desc).unwrap(), None);
        assert!(matches!(
            skip_busy::<u8>(Err(Error::Timeout), desc),
            Err(Error::Timeout)
        ));
    }

    #[test]
    fn read_timeout_grows_with_integration_time() {
        let mock = crate::transport::mock::MockTransport::new();
        let mut dev = device(model("USB2000PLUS"), mock);
        let base = dev.read_timeout();
        dev.integration_time_micros = Some(2_000_000);
        assert_eq!(
            dev.read_timeout(),
            base - Duration::from_micros(1_000) + Duration::from_secs(2)
        );
    }
}
