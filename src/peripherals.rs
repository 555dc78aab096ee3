//! Strobe, shutter, and lamp control.
//!
//! Thin command emitters, capability-gated by the model descriptor.  On OOI
//! models the shutter and lamp are wired to the strobe-enable line (opcode
//! 0x03); OBP models have dedicated message types.

use crate::device::{OceanDevice, ProtocolSession};
use crate::error::Error;
use crate::obp::{MSG_LAMP_ENABLE, MSG_SHUTTER, MSG_STROBE_ENABLE, MSG_STROBE_PERIOD};
use crate::transport::Transport;

impl<T: Transport> OceanDevice<T> {
    /// Enable or disable the continuous strobe output.
    pub fn set_strobe_enable(&mut self, enable: bool) -> Result<(), Error> {
        self.require(self.descriptor.capabilities.strobe, "continuous strobe")?;
        match &mut self.session {
            ProtocolSession::Ooi(s) => s.set_strobe_enable(enable),
            ProtocolSession::Obp(s) => {
                let timeout = s.transport().default_timeout();
                s.send_command(MSG_STROBE_ENABLE, &[enable as u8], timeout)
            }
        }
    }

    /// Set the continuous strobe period in microseconds (OBP models only).
    pub fn set_strobe_period_micros(&mut self, micros: u32) -> Result<(), Error> {
        self.require(self.descriptor.capabilities.strobe, "continuous strobe")?;
        match &mut self.session {
            ProtocolSession::Ooi(_) => Err(Error::Unsupported {
                feature: "strobe period control",
                model: self.descriptor.name,
            }),
            ProtocolSession::Obp(s) => {
                let timeout = s.transport().default_timeout();
                s.send_command(MSG_STROBE_PERIOD, &micros.to_le_bytes(), timeout)
            }
        }
    }

    /// Open or close the shutter.
    pub fn set_shutter_open(&mut self, open: bool) -> Result<(), Error> {
        self.require(self.descriptor.capabilities.shutter, "shutter")?;
        match &mut self.session {
            // The shutter shares the strobe/lamp enable line.
            ProtocolSession::Ooi(s) => s.set_strobe_enable(open),
            ProtocolSession::Obp(s) => {
                let timeout = s.transport().default_timeout();
                s.send_command(MSG_SHUTTER, &[open as u8], timeout)
            }
        }
    }

    /// Enable or disable the light source.
    pub fn set_lamp_enable(&mut self, enable: bool) -> Result<(), Error> {
        self.require(self.descriptor.capabilities.lamp, "lamp")?;
        match &mut self.session {
            ProtocolSession::Ooi(s) => s.set_strobe_enable(enable),
            ProtocolSession::Obp(s) => {
                let timeout = s.transport().default_timeout();
                s.send_command(MSG_LAMP_ENABLE, &[enable as u8], timeout)
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

    fn ack() -> Vec<u8> {
        ObpMessage::outgoing(0, &[], FLAG_RESPONSE | FLAG_ACK).serialize()
    }

    #[test]
    fn ooi_strobe_enable_uses_opcode_0x03() {
        let mut dev = device(model("USB2000PLUS"), MockTransport::new());
        dev.set_strobe_enable(true).unwrap();
        assert_eq!(dev.session.transport().writes[0], vec![0x03, 0x01, 0x00]);
    }

    #[test]
    fn lamp_is_gated_by_capability() {
        let mut dev = device(model("STS"), MockTransport::new());
        assert!(matches!(
            dev.set_lamp_enable(true),
            Err(Error::Unsupported { .. })
        ));

        let mut mock = MockTransport::new();
        mock.push_read(ack());
        let mut dev = device(model("VENTANA"), mock);
        dev.set_lamp_enable(true).unwrap();
        let sent = crate::obp::ObpHeader::parse(&dev.session.transport().writes[0]).unwrap();
        assert_eq!(sent.message_type, MSG_LAMP_ENABLE);
    }

    #[test]
    fn strobe_period_is_obp_only() {
        let mut dev = device(model("USB4000"), MockTransport::new());
        assert!(matches!(
            dev.set_strobe_period_micros(1000),
            Err(Error::Unsupported { .. })
        ));

        let mut mock = MockTransport::new();
        mock.push_read(ack());
        let mut dev = device(model("STS"), mock);
        dev.set_strobe_period_micros(1000).unwrap();
        let sent = crate::obp::ObpHeader::parse(&dev.session.transport().writes[0]).unwrap();
        assert_eq!(sent.message_type, MSG_STROBE_PERIOD);
        assert_eq!(&sent.immediate_data[..4], &1000u32.to_le_bytes());
    }

    #[test]
    fn shutter_shares_the_strobe_line_on_ooi_models() {
        let mut dev = device(model("QE65000"), MockTransport::new());
        dev.set_shutter_open(false).unwrap();
        assert_eq!(dev.session.transport().writes[0], vec![0x03, 0x00, 0x00]);
    }
}
