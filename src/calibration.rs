//! Wavelength and nonlinearity calibration coefficients.
//!
//! OOI models persist coefficients as ASCII floats in EEPROM slots
//! (wavelength in slots 1..=4, nonlinearity order in slot 14 and
//! coefficients from slot 6 upward).  OBP models answer a count query
//! followed by one little-endian f32 per index.

use crate::device::{OceanDevice, ProtocolSession};
use crate::eeprom::{slot_to_f64, slot_to_u8};
use crate::error::Error;
use crate::models::ProtocolFamily;
use crate::obp::{MSG_GET_NONLINEARITY_COEFF, MSG_GET_NONLINEARITY_COEFF_COUNT,
    MSG_GET_WAVELENGTH_COEFF, MSG_GET_WAVELENGTH_COEFF_COUNT, ObpSession};
use crate::transport::Transport;

/// Evaluate `c[0] + c[1]*x + c[2]*x^2 + ...` (Horner form).
pub(crate) fn polyeval(coefficients: &[f64], x: f64) -> f64 {
    coefficients
        .iter()
        .rev()
        .fold(0.0, |acc, &c| acc * x + c)
}

fn parse_f32(data: &[u8], what: &'static str) -> Result<f64, Error> {
    if data.len() < 4 {
        return Err(Error::Parse(format!(
            "{what}: expected 4 bytes, got {}",
            data.len()
        )));
    }
    Ok(f64::from(f32::from_le_bytes([
        data[0], data[1], data[2], data[3],
    ])))
}

fn query_coefficients<T: Transport>(
    session: &mut ObpSession<T>,
    count_type: u32,
    coeff_type: u32,
    what: &'static str,
) -> Result<Vec<f64>, Error> {
    let timeout = session.transport().default_timeout();
    let count_reply = session.query(count_type, &[], timeout)?;
    let count = *count_reply
        .first()
        .ok_or_else(|| Error::Parse(format!("{what}: empty count reply")))?;

    let mut coefficients = Vec::with_capacity(count as usize);
    for index in 0..count {
        let data = session.query(coeff_type, &[index], timeout)?;
        coefficients.push(parse_f32(&data, what)?);
    }
    Ok(coefficients)
}

impl<T: Transport> OceanDevice<T> {
    /// Wavelength polynomial coefficients, lowest order first.
    pub fn wavelength_coefficients(&mut self) -> Result<Vec<f64>, Error> {
        self.require(
            self.descriptor.capabilities.wavelength_cal,
            "wavelength calibration",
        )?;
        match self.descriptor.protocol {
            ProtocolFamily::Ooi => {
                let mut coefficients = Vec::with_capacity(4);
                for slot in 1..=4 {
                    let data = self.ooi_session()?.read_eeprom_slot(slot)?;
                    coefficients.push(slot_to_f64(&data)?);
                }
                Ok(coefficients)
            }
            ProtocolFamily::Obp => {
                let ProtocolSession::Obp(s) = &mut self.session else {
                    unreachable!("descriptor/session protocol mismatch")
                };
                query_coefficients(
                    s,
                    MSG_GET_WAVELENGTH_COEFF_COUNT,
                    MSG_GET_WAVELENGTH_COEFF,
                    "wavelength coefficient",
                )
            }
        }
    }

    /// Nonlinearity polynomial coefficients, lowest order first.
    pub fn nonlinearity_coefficients(&mut self) -> Result<Vec<f64>, Error> {
        self.require(
            self.descriptor.capabilities.nonlinearity,
            "nonlinearity calibration",
        )?;
        match self.descriptor.protocol {
            ProtocolFamily::Ooi => {
                let order_slot = self.ooi_session()?.read_eeprom_slot(14)?;
                let order = slot_to_u8(&order_slot)?;
                let mut coefficients = Vec::with_capacity(order as usize + 1);
                for slot in 6..=6 + order {
                    let data = self.ooi_session()?.read_eeprom_slot(slot)?;
                    coefficients.push(slot_to_f64(&data)?);
                }
                Ok(coefficients)
            }
            ProtocolFamily::Obp => {
                let ProtocolSession::Obp(s) = &mut self.session else {
                    unreachable!("descriptor/session protocol mismatch")
                };
                query_coefficients(
                    s,
                    MSG_GET_NONLINEARITY_COEFF_COUNT,
                    MSG_GET_NONLINEARITY_COEFF,
                    "nonlinearity coefficient",
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::testutil::{device, model};
    use crate::obp::{FLAG_RESPONSE, ObpMessage};
    use crate::transport::mock::MockTransport;

    fn slot_reply(slot: u8, text: &[u8]) -> Vec<u8> {
        let mut reply = vec![0x05, slot];
        reply.extend_from_slice(text);
        reply.resize(17, 0);
        reply
    }

    fn obp_response(message_type: u32, data: &[u8]) -> Vec<u8> {
        ObpMessage::outgoing(message_type, data, FLAG_RESPONSE).serialize()
    }

    #[test]
    fn polyeval_is_horner() {
        // 2 + 3x + x^2 at x = 10
        assert_eq!(polyeval(&[2.0, 3.0, 1.0], 10.0), 132.0);
        assert_eq!(polyeval(&[], 5.0), 0.0);
    }

    #[test]
    fn ooi_wavelength_coefficients_come_from_slots_1_to_4() {
        let mut mock = MockTransport::new();
        mock.push_read(slot_reply(1, b"178.0\0"));
        mock.push_read(slot_reply(2, b"0.38\0"));
        mock.push_read(slot_reply(3, b"-1.4e-5\0"));
        mock.push_read(slot_reply(4, b"-2.2e-9\0"));
        let mut dev = device(model("USB2000"), mock);
        let coefficients = dev.wavelength_coefficients().unwrap();
        assert_eq!(coefficients, vec![178.0, 0.38, -1.4e-5, -2.2e-9]);
    }

    #[test]
    fn ooi_nonlinearity_order_comes_from_slot_14() {
        let mut mock = MockTransport::new();
        mock.push_read(slot_reply(14, b"2\0"));
        mock.push_read(slot_reply(6, b"1.0\0"));
        mock.push_read(slot_reply(7, b"0.5\0"));
        mock.push_read(slot_reply(8, b"0.25\0"));
        let mut dev = device(model("USB2000"), mock);
        let coefficients = dev.nonlinearity_coefficients().unwrap();
        assert_eq!(coefficients, vec![1.0, 0.5, 0.25]);
    }

    #[test]
    fn obp_coefficients_are_count_then_indexed_f32() {
        let mut mock = MockTransport::new();
        mock.push_read(obp_response(MSG_GET_WAVELENGTH_COEFF_COUNT, &[2]));
        mock.push_read(obp_response(
            MSG_GET_WAVELENGTH_COEFF,
            &500.0f32.to_le_bytes(),
        ));
        mock.push_read(obp_response(
            MSG_GET_WAVELENGTH_COEFF,
            &0.5f32.to_le_bytes(),
        ));
        let mut dev = device(model("STS"), mock);
        let coefficients = dev.wavelength_coefficients().unwrap();
        assert_eq!(coefficients, vec![500.0, 0.5]);

        // The per-index queries carry the index in immediate data.
        let second = crate::obp::ObpHeader::parse(&dev.session.transport().writes[2]).unwrap();
        assert_eq!(second.message_type, MSG_GET_WAVELENGTH_COEFF);
        assert_eq!(second.immediate_data[0], 1);
    }

    #[test]
    fn wavelengths_use_the_model_pixel_offset() {
        // QE65000 evaluates from pixel -10; with identity coefficients
        // [0, 1] the first wavelength equals -10.
        let mut mock = MockTransport::new();
        mock.push_read(slot_reply(1, b"0.0\0"));
        mock.push_read(slot_reply(2, b"1.0\0"));
        mock.push_read(slot_reply(3, b"0.0\0"));
        mock.push_read(slot_reply(4, b"0.0\0"));
        let mut dev = device(model("QE65000"), mock);
        let wavelengths = dev.get_wavelengths().unwrap();
        assert_eq!(wavelengths[0], -10.0);
        assert_eq!(wavelengths[10], 0.0);
        assert_eq!(wavelengths.len(), 1280);
    }
}
