//! EEPROM slot access (OOI models only).
//!
//! Slots are fixed 17-byte records: a 2-byte command echo followed by 15
//! data bytes, usually a NUL-terminated ASCII string padded with junk.
//! Writes are not implemented by this driver.

use crate::device::OceanDevice;
use crate::error::Error;
use crate::models::SaturationSource;
use crate::transport::Transport;

/// Saturation value resolved from EEPROM, used to normalize intensities.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Normalization {
    /// `max_pixel_value / saturation` from a populated EEPROM slot.
    Known(f64),
    /// The slot was uninitialised (0x0000 or 0xFFFF); intensities are
    /// returned unscaled.
    Unknown,
}

impl Normalization {
    pub fn factor(self) -> f64 {
        match self {
            Normalization::Known(f) => f,
            Normalization::Unknown => 1.0,
        }
    }
}

/// ASCII slot contents up to the first NUL or 0xFF pad byte.
pub(crate) fn slot_to_string(data: &[u8]) -> String {
    let end = data
        .iter()
        .position(|&b| b == 0x00 || b == 0xFF)
        .unwrap_or(data.len());
    String::from_utf8_lossy(&data[..end]).trim().to_string()
}

/// Parse a slot as an ASCII float (wavelength/nonlinearity coefficients).
pub(crate) fn slot_to_f64(data: &[u8]) -> Result<f64, Error> {
    let s = slot_to_string(data);
    s.parse()
        .map_err(|_| Error::Parse(format!("expected a float in EEPROM slot, got {s:?}")))
}

/// Parse a slot as an ASCII integer (e.g. the nonlinearity order).
pub(crate) fn slot_to_u8(data: &[u8]) -> Result<u8, Error> {
    let s = slot_to_string(data);
    s.parse()
        .map_err(|_| Error::Parse(format!("expected an integer in EEPROM slot, got {s:?}")))
}

impl<T: Transport> OceanDevice<T> {
    /// Read the 15 data bytes of one EEPROM slot.
    pub fn read_eeprom_slot(&mut self, slot: u8) -> Result<Vec<u8>, Error> {
        self.require(self.descriptor.capabilities.eeprom, "EEPROM")?;
        self.ooi_session()?.read_eeprom_slot(slot)
    }

    /// Read a slot and strip it down to its ASCII string.
    pub fn read_eeprom_string(&mut self, slot: u8) -> Result<String, Error> {
        Ok(slot_to_string(&self.read_eeprom_slot(slot)?))
    }

    /// Writing EEPROM slots is declared by the instruments but not
    /// implemented by this driver.
    pub fn write_eeprom_slot(&mut self, _slot: u8, _data: &[u8]) -> Result<(), Error> {
        Err(Error::Unsupported {
            feature: "EEPROM write",
            model: self.descriptor.name,
        })
    }

    /// Resolve the intensity normalization factor, caching the result.
    ///
    /// Models without a stored saturation value return 1.0; models that
    /// store one in EEPROM read it once and scale by
    /// `max_pixel_value / saturation`, unless the slot is uninitialised.
    pub(crate) fn saturation_normalization(&mut self) -> Result<f64, Error> {
        if let Some(factor) = self.normalization {
            return Ok(factor);
        }
        let normalization = match self.descriptor.saturation {
            SaturationSource::None => Normalization::Unknown,
            SaturationSource::EepromSlot { slot, offset } => {
                let data = self.read_eeprom_slot(slot)?;
                if data.len() < offset + 2 {
                    return Err(Error::Parse(format!(
                        "EEPROM slot {slot} too short for saturation value"
                    )));
                }
                let saturation = u16::from_le_bytes([data[offset], data[offset + 1]]);
                match saturation {
                    0x0000 | 0xFFFF => {
                        log::warn!(
                            "saturation slot uninitialised on {}; skipping normalization",
                            self.descriptor.name
                        );
                        Normalization::Unknown
                    }
                    s => Normalization::Known(self.descriptor.max_pixel_value / f64::from(s)),
                }
            }
        };
        let factor = normalization.factor();
        self.normalization = Some(factor);
        Ok(factor)
    }
}
