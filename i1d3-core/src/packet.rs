//! i1d3 request/response framing

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;
use tracing::{error, warn};

use crate::{
    codec::{self, ByteOrder},
    command::Command,
    constants::status,
    error::{Error, Result},
    FRAME_SIZE,
};

/// Request frame
///
/// # Frame Structure
///
/// ```text
/// ┌─────────┬─────────┬──────────────────────────────────────────────┐
/// │  Major  │  Minor  │                 Payload                      │
/// │ 1 byte  │ 1 byte  │   (zero padded to 64 bytes in total)         │
/// └─────────┴─────────┴──────────────────────────────────────────────┘
/// ```
///
/// The minor byte only exists for the multi-function major command `0x00`;
/// for every other command the payload starts at byte 1.
///
/// # Examples
///
/// ```
/// use i1d3_core::{Command, Packet};
///
/// let packet = Packet::new(Command::GetProductName);
/// let encoded = packet.encode();
///
/// assert_eq!(encoded.len(), 64);
/// assert_eq!(&encoded[..2], &[0x00, 0x10]);
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct Packet {
    /// Command code
    pub command: Command,

    /// Command-specific bytes following the command code(s)
    pub payload: Bytes,
}

impl Packet {
    /// Create a request with empty payload
    pub fn new(command: Command) -> Self {
        Self {
            command,
            payload: Bytes::new(),
        }
    }

    /// Create a request with payload
    ///
    /// # Errors
    ///
    /// Returns [`Error::PayloadTooLarge`] if the payload does not fit behind
    /// the command code(s).
    pub fn with_payload(command: Command, payload: impl Into<Bytes>) -> Result<Self> {
        let payload = payload.into();
        let max = Self::max_payload(command);
        if payload.len() > max {
            return Err(Error::PayloadTooLarge {
                size: payload.len(),
                max,
            });
        }
        Ok(Self { command, payload })
    }

    /// Largest payload `command` can carry
    pub fn max_payload(command: Command) -> usize {
        FRAME_SIZE - command.payload_offset()
    }

    /// Encode to a 64-byte frame
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(FRAME_SIZE);

        buf.put_u8(self.command.major());
        if self.command.is_multi_function() {
            buf.put_u8(self.command.minor());
        }
        buf.put_slice(&self.payload);
        buf.resize(FRAME_SIZE, 0);

        buf
    }
}

/// Builder for request payloads addressed by absolute frame offset
///
/// Lets call sites write fields at the offsets the firmware documents
/// instead of counting payload-relative positions.
#[derive(Debug, Clone)]
pub struct RequestFrame {
    command: Command,
    frame: [u8; FRAME_SIZE],
}

impl RequestFrame {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            frame: [0; FRAME_SIZE],
        }
    }

    pub fn u8(mut self, offset: usize, value: u8) -> Result<Self> {
        self.check(offset)?;
        codec::write_u8(&mut self.frame, offset, value)?;
        Ok(self)
    }

    pub fn u16<B: ByteOrder>(mut self, offset: usize, value: u16) -> Result<Self> {
        self.check(offset)?;
        codec::write_u16::<B>(&mut self.frame, offset, value)?;
        Ok(self)
    }

    pub fn u32<B: ByteOrder>(mut self, offset: usize, value: u32) -> Result<Self> {
        self.check(offset)?;
        codec::write_u32::<B>(&mut self.frame, offset, value)?;
        Ok(self)
    }

    pub fn bytes(mut self, offset: usize, data: &[u8]) -> Result<Self> {
        self.check(offset)?;
        let frame_len = self.frame.len();
        let dst = self
            .frame
            .get_mut(offset..offset + data.len())
            .ok_or(Error::FieldOutOfRange {
                offset,
                len: data.len(),
                frame: frame_len,
            })?;
        dst.copy_from_slice(data);
        Ok(self)
    }

    pub fn build(self) -> Result<Packet> {
        let start = self.command.payload_offset();
        Packet::with_payload(self.command, Bytes::copy_from_slice(&self.frame[start..]))
    }

    fn check(&self, offset: usize) -> Result<()> {
        if offset < self.command.payload_offset() {
            error!(offset, command = %self.command, "Request field overlaps command code");
            return Err(Error::Internal(format!(
                "offset {offset} overlaps the command code of {}",
                self.command
            )));
        }
        Ok(())
    }
}

/// Validated 64-byte response
///
/// Holds the complete frame untouched; accessors read fields by absolute
/// offset through the shared codec.
#[derive(Clone, PartialEq, Eq)]
pub struct Response {
    command: Command,
    frame: Bytes,
    no_edge_quirk: bool,
}

impl Response {
    /// Validate a response frame against the request's command
    ///
    /// # Errors
    ///
    /// - [`Error::BadLength`] if the frame is not exactly 64 bytes
    /// - [`Error::BadStatus`] if byte 0 is non-zero
    /// - [`Error::BadEcho`] if byte 1 is not the expected echo
    ///
    /// A period measurement that saw no edges sometimes answers status `0x83`
    /// with an all-zero count block. That exact combination is accepted as a
    /// success with zero counts; no other non-zero status is.
    pub fn decode(command: Command, buf: BytesMut) -> Result<Self> {
        if buf.len() != FRAME_SIZE {
            return Err(Error::BadLength {
                expected: FRAME_SIZE,
                actual: buf.len(),
            });
        }

        let frame = buf.freeze();
        let status_byte = frame[0];
        let mut no_edge_quirk = false;

        if status_byte != status::OK {
            if Self::matches_no_edge_quirk(command, &frame)? {
                warn!(
                    command = %command,
                    status = format!("0x{:02X}", status_byte),
                    "accepting zero-count period response with non-zero status"
                );
                no_edge_quirk = true;
            } else {
                return Err(Error::BadStatus {
                    command,
                    status: status_byte,
                });
            }
        }

        let expected = command.expected_echo();
        if frame[1] != expected {
            return Err(Error::BadEcho {
                command,
                expected,
                actual: frame[1],
            });
        }

        Ok(Self {
            command,
            frame,
            no_edge_quirk,
        })
    }

    fn matches_no_edge_quirk(command: Command, frame: &[u8]) -> Result<bool> {
        Ok(command == Command::MeasurePeriod
            && frame[0] == status::PERIOD_NO_EDGES
            && codec::all_zero(frame, 2, 12)?)
    }

    pub fn command(&self) -> Command {
        self.command
    }

    /// Status byte as received
    pub fn status(&self) -> u8 {
        self.frame[0]
    }

    /// Whether this response was accepted through the no-edge quirk
    pub fn is_no_edge_quirk(&self) -> bool {
        self.no_edge_quirk
    }

    /// The full 64-byte frame
    pub fn frame(&self) -> &[u8] {
        &self.frame
    }

    /// Bytes after status and echo
    pub fn payload(&self) -> &[u8] {
        &self.frame[2..]
    }

    pub fn u8(&self, offset: usize) -> Result<u8> {
        codec::read_u8(&self.frame, offset)
    }

    pub fn u16<B: ByteOrder>(&self, offset: usize) -> Result<u16> {
        codec::read_u16::<B>(&self.frame, offset)
    }

    pub fn u32<B: ByteOrder>(&self, offset: usize) -> Result<u32> {
        codec::read_u32::<B>(&self.frame, offset)
    }

    pub fn string(&self, offset: usize) -> Result<String> {
        codec::read_string(&self.frame, offset)
    }

    pub fn bytes(&self, offset: usize, len: usize) -> Result<&[u8]> {
        self.frame.get(offset..offset + len).ok_or(Error::FieldOutOfRange {
            offset,
            len,
            frame: FRAME_SIZE,
        })
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("command", &self.command)
            .field("payload", &hex::encode(&self.payload))
            .finish()
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Packet[{}](len={})", self.command, self.payload.len())
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("command", &self.command)
            .field("status", &format!("0x{:02X}", self.status()))
            .field("frame", &hex::encode(&self.frame))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{BigEndian, LittleEndian};
    use pretty_assertions::assert_eq;

    fn response_frame(status: u8, echo: u8) -> BytesMut {
        let mut buf = BytesMut::zeroed(FRAME_SIZE);
        buf[0] = status;
        buf[1] = echo;
        buf
    }

    #[test]
    fn test_packet_new() {
        let packet = Packet::new(Command::GetLocked);
        assert_eq!(packet.command, Command::GetLocked);
        assert_eq!(packet.payload.len(), 0);
    }

    #[test]
    fn test_encode_multi_function() {
        let encoded = Packet::new(Command::GetFirmwareDate).encode();
        assert_eq!(encoded.len(), FRAME_SIZE);
        assert_eq!(encoded[0], 0x00);
        assert_eq!(encoded[1], 0x13);
        assert!(encoded[2..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_encode_major_payload_starts_at_one() {
        let packet = Packet::with_payload(Command::MeasureFrequency, vec![1, 2, 3, 4]).unwrap();
        let encoded = packet.encode();
        assert_eq!(&encoded[..6], &[0x01, 1, 2, 3, 4, 0]);
    }

    #[test]
    fn test_payload_too_large() {
        let result = Packet::with_payload(Command::GetInfo, vec![0; 63]);
        assert!(matches!(result, Err(Error::PayloadTooLarge { size: 63, max: 62 })));
        assert!(Packet::with_payload(Command::LockResponse, vec![0; 63]).is_ok());
    }

    #[test]
    fn test_request_frame_absolute_offsets() {
        let packet = RequestFrame::new(Command::ReadExternalEeprom)
            .u16::<BigEndian>(3, 0x01A0)
            .unwrap()
            .u8(5, 59)
            .unwrap()
            .build()
            .unwrap();
        let encoded = packet.encode();
        assert_eq!(&encoded[..6], &[0x12, 0, 0, 0x01, 0xA0, 59]);
    }

    #[test]
    fn test_request_frame_rejects_command_bytes() {
        let result = RequestFrame::new(Command::GetInfo).u8(1, 5);
        assert!(matches!(result, Err(Error::Internal(_))));
    }

    #[test]
    fn test_decode_ok_keeps_payload() {
        let mut buf = response_frame(0, 0x01);
        for (i, b) in buf[2..].iter_mut().enumerate() {
            *b = i as u8;
        }
        let expected = buf.clone();

        let response = Response::decode(Command::MeasureFrequency, buf).unwrap();
        assert_eq!(response.frame(), &expected[..]);
        assert_eq!(response.u32::<LittleEndian>(2).unwrap(), 0x0302_0100);
    }

    #[test]
    fn test_decode_bad_length() {
        let short = BytesMut::zeroed(63);
        assert!(matches!(
            Response::decode(Command::GetInfo, short),
            Err(Error::BadLength { expected: 64, actual: 63 })
        ));

        let long = BytesMut::zeroed(65);
        assert!(matches!(
            Response::decode(Command::GetInfo, long),
            Err(Error::BadLength { actual: 65, .. })
        ));
    }

    #[test]
    fn test_decode_bad_status() {
        let buf = response_frame(0x01, 0x01);
        assert!(matches!(
            Response::decode(Command::MeasureFrequency, buf),
            Err(Error::BadStatus { status: 0x01, .. })
        ));
    }

    #[test]
    fn test_decode_bad_echo() {
        let buf = response_frame(0, 0x02);
        assert!(matches!(
            Response::decode(Command::MeasureFrequency, buf),
            Err(Error::BadEcho { expected: 0x01, actual: 0x02, .. })
        ));
    }

    #[test]
    fn test_unlock_response_echoes_zero() {
        let buf = response_frame(0, 0x00);
        assert!(Response::decode(Command::LockResponse, buf).is_ok());

        let buf = response_frame(0, 0x9a);
        assert!(matches!(
            Response::decode(Command::LockResponse, buf),
            Err(Error::BadEcho { .. })
        ));
    }

    #[test]
    fn test_period_no_edge_quirk_accepted() {
        let buf = response_frame(0x83, 0x02);
        let response = Response::decode(Command::MeasurePeriod, buf).unwrap();

        assert!(response.is_no_edge_quirk());
        for offset in [2, 6, 10] {
            assert_eq!(response.u32::<LittleEndian>(offset).unwrap(), 0);
        }
    }

    #[test]
    fn test_period_quirk_requires_zero_counts() {
        let mut buf = response_frame(0x83, 0x02);
        buf[13] = 1;
        assert!(matches!(
            Response::decode(Command::MeasurePeriod, buf),
            Err(Error::BadStatus { status: 0x83, .. })
        ));
    }

    #[test]
    fn test_period_quirk_not_generalized() {
        let buf = response_frame(0x83, 0x01);
        assert!(matches!(
            Response::decode(Command::MeasureFrequency, buf),
            Err(Error::BadStatus { .. })
        ));

        let buf = response_frame(0x84, 0x02);
        assert!(matches!(
            Response::decode(Command::MeasurePeriod, buf),
            Err(Error::BadStatus { .. })
        ));
    }
}
