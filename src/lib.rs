//! Host-side driver library for Ocean Optics miniature USB spectrometers.
//!
//! Enumerates attached instruments (vendor id 0x2457), negotiates the
//! model-specific bulk endpoints, and speaks whichever of the two wire
//! protocols the model understands: the legacy byte-oriented OOI protocol
//! or the framed Ocean Binary Protocol (OBP).
//!
//! # Quick Start
//!
//! ```no_run
//! let mut device = oceanspec::first_device()?;
//! println!("{} {}", device.model().name, device.serial_number());
//!
//! device.set_integration_time_micros(100_000)?;
//! let wavelengths = device.get_wavelengths()?;
//! let intensities = device.get_intensities()?;
//! # Ok::<(), oceanspec::Error>(())
//! ```
//!
//! A device's capabilities are declarative: the registry descriptor says
//! which features a model has, and operations on absent features fail with
//! [`Error::Unsupported`] before anything is written to the wire.

mod calibration;
mod device;
mod eeprom;
mod error;
mod models;
mod obp;
mod ooi;
mod peripherals;
mod spectrometer;
mod thermo;
mod transport;

pub use device::{Capability, OceanDevice, ProtocolSession, first_device, list_devices,
    list_devices_with_policy};
pub use eeprom::Normalization;
pub use error::Error;
pub use models::{ByteOrder, Capabilities, EndpointMap, MODELS, ModelDescriptor, ProtocolFamily,
    SaturationSource, SpectrumReadPath, VENDOR_ID, lookup};
pub use obp::ChecksumPolicy;
pub use transport::{ReadMode, Transport, UsbTransport};
