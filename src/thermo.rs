//! Thermoelectric cooler (TEC) feature.
//!
//! OOI models speak opcodes 0x71/0x72/0x73 with signed tenths of a degree;
//! OBP models use the 0x0042xxxx message family with 32-bit floats.

use crate::device::{OceanDevice, ProtocolSession};
use crate::error::Error;
use crate::obp::{MSG_TEC_ENABLE, MSG_TEC_READ_TEMPERATURE, MSG_TEC_SET_TEMPERATURE};
use crate::transport::Transport;

impl<T: Transport> OceanDevice<T> {
    /// Switch the thermoelectric cooler on or off.
    pub fn tec_enable(&mut self, enable: bool) -> Result<(), Error> {
        self.require(self.descriptor.capabilities.thermoelectric, "TEC")?;
        match &mut self.session {
            ProtocolSession::Ooi(s) => s.tec_enable(enable),
            ProtocolSession::Obp(s) => {
                let timeout = s.transport().default_timeout();
                s.send_command(MSG_TEC_ENABLE, &[enable as u8], timeout)
            }
        }
    }

    /// Read the detector temperature in degrees Celsius.
    pub fn tec_get_temperature(&mut self) -> Result<f64, Error> {
        self.require(self.descriptor.capabilities.thermoelectric, "TEC")?;
        match &mut self.session {
            ProtocolSession::Ooi(s) => s.tec_read_temperature(),
            ProtocolSession::Obp(s) => {
                let timeout = s.transport().default_timeout();
                let data = s.query(MSG_TEC_READ_TEMPERATURE, &[], timeout)?;
                if data.len() < 4 {
                    return Err(Error::Parse(format!(
                        "TEC temperature: expected 4 bytes, got {}",
                        data.len()
                    )));
                }
                Ok(f64::from(f32::from_le_bytes([
                    data[0], data[1], data[2], data[3],
                ])))
            }
        }
    }

    /// Set the TEC temperature setpoint in degrees Celsius.
    pub fn tec_set_temperature(&mut self, celsius: f64) -> Result<(), Error> {
        self.require(self.descriptor.capabilities.thermoelectric, "TEC")?;
        match &mut self.session {
            ProtocolSession::Ooi(s) => {
                let tenths = (celsius * 10.0).round();
                if tenths < f64::from(i16::MIN) || tenths > f64::from(i16::MAX) {
                    return Err(Error::OutOfRange {
                        what: "TEC setpoint (tenths of a degree C)",
                        value: tenths.abs() as u64,
                        min: 0,
                        max: i16::MAX as u64,
                    });
                }
                s.tec_set_temperature(tenths as i16)
            }
            ProtocolSession::Obp(s) => {
                let timeout = s.transport().default_timeout();
                s.send_command(
                    MSG_TEC_SET_TEMPERATURE,
                    &(celsius as f32).to_le_bytes(),
                    timeout,
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::testutil::{device, model};
    use crate::obp::{FLAG_ACK, FLAG_RESPONSE, ObpMessage};
    use crate::transport::mock::MockTransport;

    #[test]
    fn tec_is_gated_by_the_capability_flag() {
        let mut dev = device(model("USB2000"), MockTransport::new());
        assert!(matches!(dev.tec_enable(true), Err(Error::Unsupported { .. })));
        assert!(dev.session.transport().writes.is_empty());
    }

    #[test]
    fn ooi_setpoint_is_sent_as_signed_tenths() {
        let mut dev = device(model("QE65000"), MockTransport::new());
        dev.tec_set_temperature(-15.0).unwrap();
        let mut expected = vec![0x73];
        expected.extend_from_slice(&(-150i16).to_le_bytes());
        assert_eq!(dev.session.transport().writes[0], expected);
    }

    #[test]
    fn obp_temperature_is_an_f32_query() {
        let mut mock = MockTransport::new();
        let reply = ObpMessage::outgoing(
            MSG_TEC_READ_TEMPERATURE,
            &(-10.5f32).to_le_bytes(),
            FLAG_RESPONSE,
        )
        .serialize();
        mock.push_read(reply);
        let mut dev = device(model("QEPRO"), mock);
        assert_eq!(dev.tec_get_temperature().unwrap(), -10.5);
    }

    #[test]
    fn obp_enable_is_an_acked_command() {
        let mut mock = MockTransport::new();
        mock.push_read(ObpMessage::outgoing(0, &[], FLAG_RESPONSE | FLAG_ACK).serialize());
        let mut dev = device(model("VENTANA"), mock);
        dev.tec_enable(true).unwrap();
        let sent = crate::obp::ObpHeader::parse(&dev.session.transport().writes[0]).unwrap();
        assert_eq!(sent.message_type, MSG_TEC_ENABLE);
        assert_eq!(sent.immediate_data[0], 1);
    }
}
