//! Ocean Binary Protocol: framed request/response messages.
//!
//! Every message is a 44-byte header, an optional payload, and a 20-byte
//! footer.  Payloads of 16 bytes or fewer travel inside the header's
//! immediate-data field; anything larger is attached between header and
//! footer.  Little-endian throughout.

use std::time::Duration;

use md5::{Digest, Md5};

use crate::error::Error;
use crate::transport::{ReadMode, Transport};

pub const HEADER_LENGTH: usize = 44;
pub const FOOTER_LENGTH: usize = 20;

pub const START_BYTES: u16 = 0xC0C1;
pub const PROTOCOL_VERSION: u16 = 0x1100;
pub const FOOTER_MAGIC: u32 = 0xC2C3C4C5;

// Header flags.
pub const FLAG_RESPONSE: u16 = 0x0001;
pub const FLAG_ACK: u16 = 0x0002;
pub const FLAG_REQUEST_ACK: u16 = 0x0004;
pub const FLAG_NACK: u16 = 0x0008;
pub const FLAG_HW_EXCEPTION: u16 = 0x0010;
pub const FLAG_PROTOCOL_DEPRECATED: u16 = 0x0020;

// Checksum types.
pub const CHECKSUM_NONE: u8 = 0x00;
pub const CHECKSUM_MD5: u8 = 0x01;

// Message types used by the feature layer.
pub const MSG_GET_SERIAL_NUMBER: u32 = 0x0000_0100;
pub const MSG_SET_INTEGRATION_TIME: u32 = 0x0011_0010;
pub const MSG_SET_TRIGGER_MODE: u32 = 0x0011_0110;
pub const MSG_GET_SPECTRUM: u32 = 0x0010_1100;
pub const MSG_GET_SPECTRUM_EXTENDED: u32 = 0x0010_0928;
pub const MSG_GET_WAVELENGTH_COEFF_COUNT: u32 = 0x0018_0100;
pub const MSG_GET_WAVELENGTH_COEFF: u32 = 0x0018_0101;
pub const MSG_GET_NONLINEARITY_COEFF_COUNT: u32 = 0x0018_1100;
pub const MSG_GET_NONLINEARITY_COEFF: u32 = 0x0018_1101;
pub const MSG_TEC_READ_TEMPERATURE: u32 = 0x0042_0004;
pub const MSG_TEC_ENABLE: u32 = 0x0042_0010;
pub const MSG_TEC_SET_TEMPERATURE: u32 = 0x0042_0011;
pub const MSG_STROBE_ENABLE: u32 = 0x0031_0010;
pub const MSG_STROBE_PERIOD: u32 = 0x0031_0011;
pub const MSG_LAMP_ENABLE: u32 = 0x0081_0010;
pub const MSG_SHUTTER: u32 = 0x0081_0020;

/// Canonical message for an OBP error number.
pub fn error_message(code: u16) -> &'static str {
    match code {
        0 => "Success (no detectable errors)",
        1 => "Invalid/unsupported protocol",
        2 => "Unknown message type",
        3 => "Bad checksum",
        4 => "Message too large",
        5 => "Payload length does not match message type",
        6 => "Payload data invalid",
        7 => "Device not ready for given message type",
        8 => "Unknown checksum type",
        9 => "Device reset unexpectedly",
        10 => "Too many buses (commands have come from too many bus interfaces)",
        11 => "Out of memory; failed to allocate enough space to complete request",
        12 => "Command is valid, but desired information does not exist",
        13 => "Internal device error; may be unrecoverable",
        100 => "Could not decrypt properly",
        101 => "Firmware layout invalid",
        102 => "Data packet was wrong size",
        103 => "Hardware revision not compatible with firmware",
        104 => "Existing flash map not compatible with firmware",
        255 => "Operation/response deferred; will take some time",
        _ => "Unrecognized error code",
    }
}

/// What to do when a received MD5 message checksum mismatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChecksumPolicy {
    /// Log a warning and keep the message (device firmware is known to
    /// produce stale checksums).
    #[default]
    Warn,
    /// Fail with [`Error::ChecksumMismatch`].
    Strict,
}

/// A decoded OBP message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObpMessage {
    pub flags: u16,
    pub err_no: u16,
    pub message_type: u32,
    pub regarding: u32,
    pub checksum_type: u8,
    /// Up to 16 bytes carried inside the header.
    pub immediate: Vec<u8>,
    /// Payload attached between header and footer.
    pub payload: Vec<u8>,
}

impl ObpMessage {
    /// Build an outbound message, applying the immediate-vs-payload rule:
    /// data of 16 bytes or fewer rides in the header.
    pub fn outgoing(message_type: u32, data: &[u8], flags: u16) -> Self {
        let (immediate, payload) = if data.len() <= 16 {
            (data.to_vec(), Vec::new())
        } else {
            (Vec::new(), data.to_vec())
        };
        Self {
            flags,
            err_no: 0,
            message_type,
            regarding: 0,
            checksum_type: CHECKSUM_NONE,
            immediate,
            payload,
        }
    }

    /// `bytes_remaining` header field: footer plus any attached payload.
    pub fn bytes_remaining(&self) -> u32 {
        (FOOTER_LENGTH + self.payload.len()) as u32
    }

    /// Serialize to wire format. When `checksum_type` is MD5 the checksum
    /// is computed over everything before the footer.
    pub fn serialize(&self) -> Vec<u8> {
        let total = HEADER_LENGTH + self.payload.len() + FOOTER_LENGTH;
        let mut buf = Vec::with_capacity(total);
        buf.extend_from_slice(&START_BYTES.to_le_bytes());
        buf.extend_from_slice(&PROTOCOL_VERSION.to_le_bytes());
        buf.extend_from_slice(&self.flags.to_le_bytes());
        buf.extend_from_slice(&self.err_no.to_le_bytes());
        buf.extend_from_slice(&self.message_type.to_le_bytes());
        buf.extend_from_slice(&self.regarding.to_le_bytes());
        buf.extend_from_slice(&[0u8; 6]);
        buf.push(self.checksum_type);
        buf.push(self.immediate.len() as u8);
        let mut immediate = [0u8; 16];
        immediate[..self.immediate.len()].copy_from_slice(&self.immediate);
        buf.extend_from_slice(&immediate);
        buf.extend_from_slice(&self.bytes_remaining().to_le_bytes());
        buf.extend_from_slice(&self.payload);

        let mut checksum = [0u8; 16];
        if self.checksum_type == CHECKSUM_MD5 {
            let digest = Md5::digest(&buf);
            checksum.copy_from_slice(&digest);
        }
        buf.extend_from_slice(&checksum);
        buf.extend_from_slice(&FOOTER_MAGIC.to_le_bytes());
        buf
    }
}

/// Header fields needed while a response is still being streamed in.
#[derive(Debug, Clone, Copy)]
pub struct ObpHeader {
    pub flags: u16,
    pub err_no: u16,
    pub message_type: u32,
    pub regarding: u32,
    pub checksum_type: u8,
    pub immediate_length: u8,
    pub immediate_data: [u8; 16],
    pub bytes_remaining: u32,
}

impl ObpHeader {
    /// Parse and validate the fixed 44-byte header.
    pub fn parse(data: &[u8]) -> Result<Self, Error> {
        if data.len() < HEADER_LENGTH {
            return Err(Error::ProtocolFraming(format!(
                "header truncated: {} bytes",
                data.len()
            )));
        }
        let u16_at = |i: usize| u16::from_le_bytes([data[i], data[i + 1]]);
        let u32_at = |i: usize| u32::from_le_bytes([data[i], data[i + 1], data[i + 2], data[i + 3]]);

        let start = u16_at(0);
        if start != START_BYTES {
            return Err(Error::ProtocolFraming(format!(
                "bad start bytes 0x{start:04X}"
            )));
        }
        let version = u16_at(2);
        if version != PROTOCOL_VERSION {
            return Err(Error::ProtocolFraming(format!(
                "unsupported protocol version 0x{version:04X}"
            )));
        }

        let immediate_length = data[23];
        if immediate_length > 16 {
            return Err(Error::ProtocolFraming(format!(
                "immediate length {immediate_length} exceeds 16"
            )));
        }
        let mut immediate_data = [0u8; 16];
        immediate_data.copy_from_slice(&data[24..40]);

        let bytes_remaining = u32_at(40);
        if (bytes_remaining as usize) < FOOTER_LENGTH {
            return Err(Error::ProtocolFraming(format!(
                "bytes remaining {bytes_remaining} smaller than footer"
            )));
        }

        Ok(Self {
            flags: u16_at(4),
            err_no: u16_at(6),
            message_type: u32_at(8),
            regarding: u32_at(12),
            checksum_type: data[22],
            immediate_length,
            immediate_data,
            bytes_remaining,
        })
    }
}

/// One conversation with an OBP-protocol instrument.
pub struct ObpSession<T: Transport> {
    transport: T,
    checksum_policy: ChecksumPolicy,
}

impl<T: Transport> ObpSession<T> {
    pub fn new(transport: T, checksum_policy: ChecksumPolicy) -> Self {
        Self {
            transport,
            checksum_policy,
        }
    }

    pub fn transport(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Send a request and return the response's data bytes.
    pub fn query(
        &mut self,
        message_type: u32,
        data: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>, Error> {
        self.send(message_type, data, 0)?;
        self.receive(timeout)
    }

    /// Send a command that carries no semantic reply: REQUEST_ACK is set
    /// and the acknowledgement body is discarded.
    pub fn send_command(
        &mut self,
        message_type: u32,
        data: &[u8],
        timeout: Duration,
    ) -> Result<(), Error> {
        self.send(message_type, data, FLAG_REQUEST_ACK)?;
        let _ = self.receive(timeout)?;
        Ok(())
    }

    fn send(&mut self, message_type: u32, data: &[u8], flags: u16) -> Result<(), Error> {
        let msg = ObpMessage::outgoing(message_type, data, flags);
        self.transport.write(&msg.serialize())
    }

    /// Read and validate one response; returns its data bytes.
    ///
    /// Reads an initial 64 bytes, validates the header, maps NACK and
    /// hardware-exception error numbers, then streams whatever
    /// `bytes_remaining` still owes beyond the first read.
    pub fn receive(&mut self, timeout: Duration) -> Result<Vec<u8>, Error> {
        let mut msg = self.transport.read(64, timeout, ReadMode::PrimaryIn)?;
        let header = ObpHeader::parse(&msg)?;

        if header.flags & (FLAG_NACK | FLAG_HW_EXCEPTION) != 0 && header.err_no != 0 {
            return Err(Error::Protocol {
                code: header.err_no,
                message: error_message(header.err_no),
            });
        }
        if header.flags & FLAG_PROTOCOL_DEPRECATED != 0 {
            return Err(Error::ProtocolDeprecated);
        }

        let total = HEADER_LENGTH + header.bytes_remaining as usize;
        if msg.len() > total {
            return Err(Error::ProtocolFraming(format!(
                "message longer ({}) than declared ({total})",
                msg.len()
            )));
        }
        while msg.len() < total {
            let chunk = self
                .transport
                .read(total - msg.len(), timeout, ReadMode::PrimaryIn)?;
            if chunk.is_empty() {
                return Err(Error::Timeout);
            }
            msg.extend_from_slice(&chunk);
        }

        self.validate_footer(&msg)?;
        Self::extract_data(&header, &msg)
    }

    /// Footer: exactly 20 bytes ending in the footer magic; an MD5 checksum
    /// mismatch is a warning unless the policy is strict.
    fn validate_footer(&self, msg: &[u8]) -> Result<(), Error> {
        let footer = &msg[msg.len() - FOOTER_LENGTH..];
        let magic = u32::from_le_bytes([footer[16], footer[17], footer[18], footer[19]]);
        if magic != FOOTER_MAGIC {
            return Err(Error::ProtocolFraming(format!(
                "bad footer magic 0x{magic:08X}"
            )));
        }

        let checksum_type = msg[22];
        if checksum_type == CHECKSUM_MD5 {
            let computed = Md5::digest(&msg[..msg.len() - FOOTER_LENGTH]);
            if computed[..] != footer[..16] {
                match self.checksum_policy {
                    ChecksumPolicy::Strict => return Err(Error::ChecksumMismatch),
                    ChecksumPolicy::Warn => {
                        log::warn!("OBP message checksum mismatch (accepting message)");
                    }
                }
            }
        }
        Ok(())
    }

    /// Exactly one of immediate data or trailing payload carries the
    /// response; both empty is only legal for acknowledgements.
    fn extract_data(header: &ObpHeader, msg: &[u8]) -> Result<Vec<u8>, Error> {
        let payload_len = msg.len() - HEADER_LENGTH - FOOTER_LENGTH;
        let has_immediate = header.immediate_length > 0;

        match (has_immediate, payload_len > 0) {
            (true, false) => {
                Ok(header.immediate_data[..header.immediate_length as usize].to_vec())
            }
            (false, true) => Ok(msg[HEADER_LENGTH..HEADER_LENGTH + payload_len].to_vec()),
            (false, false) if header.flags & FLAG_ACK != 0 => Ok(Vec::new()),
            (false, false) => Err(Error::ProtocolFraming(
                "response carries neither immediate data nor payload".into(),
            )),
            (true, true) => Err(Error::ProtocolFraming(
                "response carries both immediate data and payload".into(),
            )),
        }
    }
}
