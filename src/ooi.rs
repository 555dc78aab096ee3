//! Legacy OOI byte-oriented protocol.
//!
//! Each command is a one-byte opcode followed by a packed little-endian
//! payload.  Responses are unframed and read by length: 17 bytes for EEPROM
//! slots, 16 for the USB-speed descriptor, 3 for FPGA register reads, the
//! model's raw-frame length for spectra.

use std::thread;
use std::time::Duration;

use crate::error::Error;
use crate::models::{ModelDescriptor, SpectrumReadPath};
use crate::transport::{ReadMode, Transport};

// Opcodes.
pub const CMD_INITIALIZE: u8 = 0x01;
pub const CMD_SET_INTEGRATION_TIME: u8 = 0x02;
pub const CMD_SET_STROBE_ENABLE: u8 = 0x03;
pub const CMD_QUERY_EEPROM: u8 = 0x05;
pub const CMD_REQUEST_SPECTRUM: u8 = 0x09;
pub const CMD_SET_TRIGGER_MODE: u8 = 0x0A;
pub const CMD_WRITE_REGISTER: u8 = 0x6A;
pub const CMD_READ_REGISTER: u8 = 0x6B;
pub const CMD_TEC_ENABLE: u8 = 0x71;
pub const CMD_TEC_READ: u8 = 0x72;
pub const CMD_TEC_SET: u8 = 0x73;
pub const CMD_QUERY_USB_SPEED: u8 = 0xFE;

/// EEPROM slot replies are fixed at 17 bytes (2-byte command echo + data).
pub const EEPROM_SLOT_LENGTH: usize = 17;

/// Value of the USB-speed register when the device enumerated at high speed.
pub const USB_SPEED_HIGH: u8 = 0x80;

/// Settle time after the initialize opcode.
const INIT_DELAY: Duration = Duration::from_millis(100);
/// Settle time after an FPGA register write.
const REGISTER_WRITE_DELAY: Duration = Duration::from_micros(100);

/// One conversation with an OOI-protocol instrument.
///
/// `usb_speed` is resolved lazily from register 0xFE after open on models
/// that carry an FPGA with two data paths, and cached for the lifetime of
/// the session.
pub struct OoiSession<T: Transport> {
    transport: T,
    usb_speed: Option<u8>,
}

impl<T: Transport> OoiSession<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            usb_speed: None,
        }
    }

    pub fn transport(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Send the initialize opcode. Required once after open; the device
    /// needs at least 100 ms to settle afterwards.
    pub fn initialize(&mut self) -> Result<(), Error> {
        self.transport.write(&[CMD_INITIALIZE])?;
        thread::sleep(INIT_DELAY);
        Ok(())
    }

    /// Set integration time. `raw` is already divided by the model's base.
    pub fn set_integration_time(&mut self, raw: u32) -> Result<(), Error> {
        let mut cmd = vec![CMD_SET_INTEGRATION_TIME];
        cmd.extend_from_slice(&raw.to_le_bytes());
        self.transport.write(&cmd)
    }

    pub fn set_trigger_mode(&mut self, mode: u16) -> Result<(), Error> {
        let mut cmd = vec![CMD_SET_TRIGGER_MODE];
        cmd.extend_from_slice(&mode.to_le_bytes());
        self.transport.write(&cmd)
    }

    /// Set the strobe/lamp enable line.
    pub fn set_strobe_enable(&mut self, enable: bool) -> Result<(), Error> {
        let mut cmd = vec![CMD_SET_STROBE_ENABLE];
        cmd.extend_from_slice(&u16::from(enable).to_le_bytes());
        self.transport.write(&cmd)
    }

    /// Read one 17-byte EEPROM slot.  The first two reply bytes echo the
    /// opcode and slot index and are validated here; the caller receives
    /// the 15 data bytes.
    pub fn read_eeprom_slot(&mut self, slot: u8) -> Result<Vec<u8>, Error> {
        self.transport.write(&[CMD_QUERY_EEPROM, slot])?;
        let timeout = self.transport.default_timeout();
        let reply = self
            .transport
            .read(EEPROM_SLOT_LENGTH, timeout, ReadMode::PrimaryIn)?;
        if reply.len() != EEPROM_SLOT_LENGTH {
            return Err(Error::Parse(format!(
                "EEPROM slot {slot}: expected 17 bytes, got {}",
                reply.len()
            )));
        }
        if reply[0] != CMD_QUERY_EEPROM || reply[1] != slot {
            return Err(Error::Parse(format!(
                "EEPROM slot {slot}: reply echo mismatch ({:02x} {:02x})",
                reply[0], reply[1]
            )));
        }
        Ok(reply[2..].to_vec())
    }

    /// Write an FPGA register. The FPGA needs ~100 µs before the next command.
    pub fn write_register(&mut self, register: u8, value: u16) -> Result<(), Error> {
        let mut cmd = vec![CMD_WRITE_REGISTER, register];
        cmd.extend_from_slice(&value.to_le_bytes());
        self.transport.write(&cmd)?;
        thread::sleep(REGISTER_WRITE_DELAY);
        Ok(())
    }

    /// Read an FPGA register. The 3-byte reply echoes the register address
    /// before the little-endian value.
    pub fn read_register(&mut self, register: u8) -> Result<u16, Error> {
        self.transport.write(&[CMD_READ_REGISTER, register])?;
        let timeout = self.transport.default_timeout();
        let reply = self.transport.read(3, timeout, ReadMode::PrimaryIn)?;
        if reply.len() != 3 {
            return Err(Error::Parse(format!(
                "register 0x{register:02x}: expected 3 bytes, got {}",
                reply.len()
            )));
        }
        Ok(u16::from_le_bytes([reply[1], reply[2]]))
    }

    pub fn tec_enable(&mut self, enable: bool) -> Result<(), Error> {
        self.transport.write(&[CMD_TEC_ENABLE, enable as u8, 0x00])
    }

    /// Read the TEC temperature in degrees Celsius (device reports signed
    /// tenths of a degree).
    pub fn tec_read_temperature(&mut self) -> Result<f64, Error> {
        self.transport.write(&[CMD_TEC_READ])?;
        let timeout = self.transport.default_timeout();
        let reply = self.transport.read(2, timeout, ReadMode::PrimaryIn)?;
        if reply.len() != 2 {
            return Err(Error::Parse(format!(
                "TEC read: expected 2 bytes, got {}",
                reply.len()
            )));
        }
        Ok(f64::from(i16::from_le_bytes([reply[0], reply[1]])) / 10.0)
    }

    pub fn tec_set_temperature(&mut self, tenths: i16) -> Result<(), Error> {
        let mut cmd = vec![CMD_TEC_SET];
        cmd.extend_from_slice(&tenths.to_le_bytes());
        self.transport.write(&cmd)
    }

    /// Resolve the USB-speed register (0xFE), caching the result.  The reply
    /// is 16 bytes; byte 14 is 0x80 at high speed.
    pub fn usb_speed(&mut self) -> Result<u8, Error> {
        if let Some(speed) = self.usb_speed {
            return Ok(speed);
        }
        self.transport.write(&[CMD_QUERY_USB_SPEED])?;
        let timeout = self.transport.default_timeout();
        let reply = self.transport.read(16, timeout, ReadMode::PrimaryIn)?;
        if reply.len() != 16 {
            return Err(Error::Parse(format!(
                "USB-speed descriptor: expected 16 bytes, got {}",
                reply.len()
            )));
        }
        self.usb_speed = Some(reply[14]);
        Ok(reply[14])
    }

    /// Request a spectrum and read the model's raw frame.
    ///
    /// Standard path models read the whole frame from `primary_in`.  FPGA
    /// dual-path models split the read per the cached USB speed: at high
    /// speed the first 2048 bytes arrive on `secondary_in2` and the rest on
    /// `secondary_in`; at full speed everything arrives on `secondary_in`.
    pub fn read_raw_frame(
        &mut self,
        desc: &ModelDescriptor,
        timeout: Duration,
    ) -> Result<Vec<u8>, Error> {
        // Resolve the data path before the acquisition starts; the 0xFE
        // exchange must not interleave with the spectrum request.
        let speed = match desc.spectrum_path {
            SpectrumReadPath::Primary => None,
            SpectrumReadPath::FpgaSpeedDependent => Some(self.usb_speed()?),
        };

        self.transport.write(&[CMD_REQUEST_SPECTRUM])?;
        let total = desc.raw_frame_length;

        match desc.spectrum_path {
            SpectrumReadPath::Primary => self.read_exact(total, timeout, ReadMode::PrimaryIn),
            SpectrumReadPath::FpgaSpeedDependent => {
                if speed == Some(USB_SPEED_HIGH) {
                    let mut frame = self.read_exact(2048, timeout, ReadMode::SecondaryIn2)?;
                    let rest = self.read_exact(total - 2048, timeout, ReadMode::SecondaryIn)?;
                    frame.extend_from_slice(&rest);
                    Ok(frame)
                } else {
                    self.read_exact(total, timeout, ReadMode::SecondaryIn)
                }
            }
        }
    }

    fn read_exact(
        &mut self,
        size: usize,
        timeout: Duration,
        mode: ReadMode,
    ) -> Result<Vec<u8>, Error> {
        let mut buf = self.transport.read(size, timeout, mode)?;
        while buf.len() < size {
            let chunk = self.transport.read(size - buf.len(), timeout, mode)?;
            if chunk.is_empty() {
                return Err(Error::Timeout);
            }
            buf.extend_from_slice(&chunk);
        }
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockTransport;

    #[test]
    fn integration_time_command_layout() {
        let mut s = OoiSession::new(MockTransport::new());
        s.set_integration_time(1000).unwrap();
        assert_eq!(
            s.transport().writes[0],
            vec![0x02, 0xE8, 0x03, 0x00, 0x00]
        );
    }

    #[test]
    fn eeprom_slot_reply_echo_is_validated() {
        let mut mock = MockTransport::new();
        let mut reply = vec![0x05, 0x03];
        reply.extend_from_slice(b"2048");
        reply.resize(17, 0);
        mock.push_read(reply);
        let mut s = OoiSession::new(mock);
        let data = s.read_eeprom_slot(3).unwrap();
        assert_eq!(&data[..4], b"2048");
        assert_eq!(data.len(), 15);
    }

    #[test]
    fn eeprom_slot_bad_echo_is_a_parse_error() {
        let mut mock = MockTransport::new();
        let mut reply = vec![0x05, 0x07]; // echoes the wrong slot
        reply.resize(17, 0);
        mock.push_read(reply);
        let mut s = OoiSession::new(mock);
        assert!(matches!(s.read_eeprom_slot(3), Err(Error::Parse(_))));
    }

    #[test]
    fn usb_speed_is_cached() {
        let mut mock = MockTransport::new();
        let mut reply = vec![0u8; 16];
        reply[14] = USB_SPEED_HIGH;
        mock.push_read(reply);
        let mut s = OoiSession::new(mock);
        assert_eq!(s.usb_speed().unwrap(), USB_SPEED_HIGH);
        // Second call answers from the cache; no queued read needed.
        assert_eq!(s.usb_speed().unwrap(), USB_SPEED_HIGH);
        assert_eq!(s.transport().writes.len(), 1);
    }

    #[test]
    fn register_read_skips_echo_byte() {
        let mut mock = MockTransport::new();
        mock.push_read(vec![0x2A, 0x34, 0x12]);
        let mut s = OoiSession::new(mock);
        assert_eq!(s.read_register(0x2A).unwrap(), 0x1234);
        assert_eq!(s.transport().writes[0], vec![0x6B, 0x2A]);
    }

    #[test]
    fn transport_errors_propagate() {
        let mut mock = MockTransport::new();
        mock.push_error(Error::Timeout);
        let mut s = OoiSession::new(mock);
        assert!(matches!(s.read_eeprom_slot(0), Err(Error::Timeout)));
    }

    #[test]
    fn tec_temperature_is_signed_tenths() {
        let mut mock = MockTransport::new();
        mock.push_read((-155i16).to_le_bytes().to_vec());
        let mut s = OoiSession::new(mock);
        assert_eq!(s.tec_read_temperature().unwrap(), -15.5);
    }
}
