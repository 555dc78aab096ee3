//! Spectrometer acquisition feature: trigger mode, integration time,
//! wavelength axis, and frame capture/decoding.
//!
//! Frame decoding is per-model: an optional interleaved byte sort (legacy 2k
//! models), an XOR mask on every 16-bit sample, and a saturation
//! normalization factor read from EEPROM where the model stores one.  The
//! QEPRO-style extended frame carries a 32-byte metadata preamble followed
//! by 32-bit samples.

use crate::device::{OceanDevice, ProtocolSession};
use crate::eeprom::slot_to_string;
use crate::error::Error;
use crate::models::{ByteOrder, ModelDescriptor, ProtocolFamily};
use crate::obp::{MSG_GET_SERIAL_NUMBER, MSG_GET_SPECTRUM, MSG_GET_SPECTRUM_EXTENDED,
    MSG_SET_INTEGRATION_TIME, MSG_SET_TRIGGER_MODE};
use crate::transport::Transport;

/// Undo the interleaved low/high block layout of the legacy 2k models.
///
/// The device returns pixel data in 128-byte groups: 64 low bytes then 64
/// high bytes.  Destination byte `i` comes from source index
/// `(i/2 mod 64) + (i mod 2)*64 + (i/128)*128`; after reordering, high bytes
/// are masked to their 4 significant bits.
pub(crate) fn sort_interleaved64(raw: &[u8]) -> Vec<u8> {
    let n = raw.len() & !1;
    debug_assert_eq!(n % 128, 0, "interleaved frames come in 128-byte groups");
    (0..n)
        .map(|i| {
            let src = (i / 2) % 64 + (i % 2) * 64 + (i / 128) * 128;
            let mask = if i % 2 == 0 { 0xFF } else { 0x0F };
            raw[src] & mask
        })
        .collect()
}

/// Decode a raw frame into `pixel_count` floating-point samples.
pub(crate) fn decode_frame(
    desc: &ModelDescriptor,
    raw: &[u8],
    normalization: f64,
) -> Result<Vec<f64>, Error> {
    if desc.wide_pixels {
        let needed = 32 + desc.pixel_count * 4;
        if raw.len() < needed {
            return Err(Error::Parse(format!(
                "raw frame too short: {} bytes, need {needed}",
                raw.len()
            )));
        }
        // Skip the 32-byte metadata preamble.
        let data = &raw[32..needed];
        return Ok(data
            .chunks_exact(4)
            .map(|c| f64::from(u32::from_le_bytes([c[0], c[1], c[2], c[3]])) * normalization)
            .collect());
    }

    let needed = desc.pixel_count * 2;
    if raw.len() < needed {
        return Err(Error::Parse(format!(
            "raw frame too short: {} bytes, need {needed}",
            raw.len()
        )));
    }

    let sorted;
    let data = match desc.byte_order {
        ByteOrder::None => &raw[..needed],
        ByteOrder::Interleaved64 => {
            sorted = sort_interleaved64(&raw[..needed]);
            &sorted[..]
        }
    };

    Ok(data
        .chunks_exact(2)
        .map(|c| {
            let sample = u16::from_le_bytes([c[0], c[1]]) ^ desc.xor_mask;
            f64::from(sample) * normalization
        })
        .collect())
}

impl<T: Transport> OceanDevice<T> {
    /// Set the trigger mode, validated against the model's supported set.
    pub fn set_trigger_mode(&mut self, mode: u8) -> Result<(), Error> {
        if !self.descriptor.trigger_modes.contains(&mode) {
            return Err(Error::Unsupported {
                feature: "requested trigger mode",
                model: self.descriptor.name,
            });
        }
        match &mut self.session {
            ProtocolSession::Ooi(s) => s.set_trigger_mode(u16::from(mode)),
            ProtocolSession::Obp(s) => {
                let timeout = s.transport().default_timeout();
                s.send_command(MSG_SET_TRIGGER_MODE, &[mode], timeout)
            }
        }
    }

    /// Set the integration time in microseconds.  Requires
    /// `min <= micros < max`; the wire value is divided by the model's base.
    pub fn set_integration_time_micros(&mut self, micros: u32) -> Result<(), Error> {
        let desc = self.descriptor;
        if micros < desc.integration_time_min || micros >= desc.integration_time_max {
            return Err(Error::OutOfRange {
                what: "integration time (us)",
                value: u64::from(micros),
                min: u64::from(desc.integration_time_min),
                max: u64::from(desc.integration_time_max),
            });
        }
        let raw = micros / desc.integration_time_base;
        match &mut self.session {
            ProtocolSession::Ooi(s) => s.set_integration_time(raw)?,
            ProtocolSession::Obp(s) => {
                let timeout = s.transport().default_timeout();
                s.send_command(MSG_SET_INTEGRATION_TIME, &raw.to_le_bytes(), timeout)?;
            }
        }
        self.integration_time_micros = Some(micros);
        Ok(())
    }

    /// Wavelength in nanometers for each pixel, from the model's calibration
    /// polynomial.  Most models evaluate over pixel indices `0..n`; models
    /// with masked edge pixels carry a fixed index offset.
    pub fn get_wavelengths(&mut self) -> Result<Vec<f64>, Error> {
        let coefficients = self.wavelength_coefficients()?;
        let offset = self.descriptor.wavelength_pixel_offset;
        Ok((0..self.descriptor.pixel_count)
            .map(|i| {
                let x = f64::from(i as i32 + offset);
                crate::calibration::polyeval(&coefficients, x)
            })
            .collect())
    }

    /// Acquire one frame and decode it into intensities.
    pub fn get_intensities(&mut self) -> Result<Vec<f64>, Error> {
        let normalization = self.saturation_normalization()?;
        let timeout = self.read_timeout();
        let raw = match &mut self.session {
            ProtocolSession::Ooi(s) => s.read_raw_frame(self.descriptor, timeout)?,
            ProtocolSession::Obp(s) => {
                let message_type = if self.descriptor.wide_pixels {
                    MSG_GET_SPECTRUM_EXTENDED
                } else {
                    MSG_GET_SPECTRUM
                };
                s.query(message_type, &[], timeout)?
            }
        };
        decode_frame(self.descriptor, &raw, normalization)
    }

    /// Intensities with the electric-dark baseline subtracted.
    pub fn get_intensities_dark_corrected(&mut self) -> Result<Vec<f64>, Error> {
        let dark = self.descriptor.dark_pixels;
        self.require(!dark.is_empty(), "electric dark correction")?;
        let mut intensities = self.get_intensities()?;
        let baseline = dark.iter().map(|&i| intensities[i]).sum::<f64>() / dark.len() as f64;
        for sample in &mut intensities {
            *sample -= baseline;
        }
        Ok(intensities)
    }

    /// Dark-corrected intensities divided through the nonlinearity
    /// polynomial.
    pub fn get_intensities_nonlinearity_corrected(&mut self) -> Result<Vec<f64>, Error> {
        let coefficients = self.nonlinearity_coefficients()?;
        let mut intensities = self.get_intensities_dark_corrected()?;
        for sample in &mut intensities {
            let denominator = crate::calibration::polyeval(&coefficients, *sample);
            if denominator != 0.0 {
                *sample /= denominator;
            }
        }
        Ok(intensities)
    }

    /// Electrically shielded pixel indices for this model.
    pub fn get_electric_dark_pixel_indices(&self) -> &'static [usize] {
        self.descriptor.dark_pixels
    }

    /// Resolve the serial number: EEPROM slot 0 on OOI models, message type
    /// 0x00000100 on OBP models.  The separate serial-length query
    /// (0x00000101) is not issued; the reply is NUL-terminated inside the
    /// immediate field, so the length round trip adds nothing.
    pub fn get_serial_number(&mut self) -> Result<String, Error> {
        match self.descriptor.protocol {
            ProtocolFamily::Ooi => {
                let data = self.ooi_session()?.read_eeprom_slot(0)?;
                Ok(slot_to_string(&data))
            }
            ProtocolFamily::Obp => {
                let ProtocolSession::Obp(s) = &mut self.session else {
                    unreachable!("descriptor/session protocol mismatch")
                };
                let timeout = s.transport().default_timeout();
                let data = s.query(MSG_GET_SERIAL_NUMBER, &[], timeout)?;
                let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
                Ok(String::from_utf8_lossy(&data[..end]).into_owned())
            }
        }
    }
}
