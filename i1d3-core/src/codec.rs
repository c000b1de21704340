//! Fixed-width field codec
//!
//! Every command reads and writes its fields through these helpers. Offsets
//! are absolute positions inside a 64-byte frame and are bounds checked, so a
//! malformed layout turns into an error instead of a panic.
//!
//! The byte order is a type parameter. Nearly every field is little-endian;
//! the external EEPROM address is the one big-endian field.
//!
//! # Examples
//!
//! ```
//! use i1d3_core::codec::{self, BigEndian, LittleEndian};
//!
//! let mut frame = [0u8; 64];
//! codec::write_u32::<LittleEndian>(&mut frame, 1, 2_400_000).unwrap();
//! codec::write_u16::<BigEndian>(&mut frame, 5, 0x1234).unwrap();
//!
//! assert_eq!(codec::read_u32::<LittleEndian>(&frame, 1).unwrap(), 2_400_000);
//! assert_eq!(&frame[5..7], &[0x12, 0x34]);
//! ```

pub use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::error::{Error, Result};

fn field(buf: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    buf.get(offset..offset + len).ok_or(Error::FieldOutOfRange {
        offset,
        len,
        frame: buf.len(),
    })
}

fn field_mut(buf: &mut [u8], offset: usize, len: usize) -> Result<&mut [u8]> {
    let frame = buf.len();
    buf.get_mut(offset..offset + len)
        .ok_or(Error::FieldOutOfRange { offset, len, frame })
}

pub fn read_u8(buf: &[u8], offset: usize) -> Result<u8> {
    Ok(field(buf, offset, 1)?[0])
}

pub fn write_u8(buf: &mut [u8], offset: usize, value: u8) -> Result<()> {
    field_mut(buf, offset, 1)?[0] = value;
    Ok(())
}

pub fn read_u16<B: ByteOrder>(buf: &[u8], offset: usize) -> Result<u16> {
    Ok(B::read_u16(field(buf, offset, 2)?))
}

pub fn write_u16<B: ByteOrder>(buf: &mut [u8], offset: usize, value: u16) -> Result<()> {
    B::write_u16(field_mut(buf, offset, 2)?, value);
    Ok(())
}

pub fn read_u32<B: ByteOrder>(buf: &[u8], offset: usize) -> Result<u32> {
    Ok(B::read_u32(field(buf, offset, 4)?))
}

pub fn write_u32<B: ByteOrder>(buf: &mut [u8], offset: usize, value: u32) -> Result<()> {
    B::write_u32(field_mut(buf, offset, 4)?, value);
    Ok(())
}

/// Read an IEEE-754 single stored in `B` order
pub fn read_f32<B: ByteOrder>(buf: &[u8], offset: usize) -> Result<f32> {
    Ok(B::read_f32(field(buf, offset, 4)?))
}

/// Write an IEEE-754 single in `B` order, bit for bit
pub fn write_f32<B: ByteOrder>(buf: &mut [u8], offset: usize, value: f32) -> Result<()> {
    B::write_f32(field_mut(buf, offset, 4)?, value);
    Ok(())
}

/// Read a NUL-terminated ASCII string starting at `offset`
///
/// The string ends at the first NUL or at the end of the frame. Trailing
/// padding spaces are kept because product names are matched verbatim.
pub fn read_string(buf: &[u8], offset: usize) -> Result<String> {
    let tail = buf.get(offset..).ok_or(Error::FieldOutOfRange {
        offset,
        len: 0,
        frame: buf.len(),
    })?;
    let end = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
    Ok(String::from_utf8_lossy(&tail[..end]).into_owned())
}

/// Whether every byte of the field is zero
pub fn all_zero(buf: &[u8], offset: usize, len: usize) -> Result<bool> {
    Ok(field(buf, offset, len)?.iter().all(|&b| b == 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn test_little_endian_layout() {
        let mut frame = [0u8; 8];
        write_u32::<LittleEndian>(&mut frame, 2, 0x0403_0201).unwrap();
        assert_eq!(frame, [0, 0, 1, 2, 3, 4, 0, 0]);
    }

    #[test]
    fn test_big_endian_layout() {
        let mut frame = [0u8; 4];
        write_u16::<BigEndian>(&mut frame, 1, 0x01A0).unwrap();
        assert_eq!(frame, [0, 0x01, 0xA0, 0]);
    }

    #[test]
    fn test_out_of_range_is_error() {
        let mut frame = [0u8; 64];
        assert!(matches!(
            read_u32::<LittleEndian>(&frame, 62),
            Err(Error::FieldOutOfRange { offset: 62, len: 4, frame: 64 })
        ));
        assert!(write_u16::<BigEndian>(&mut frame, 63, 1).is_err());
        assert!(read_string(&frame, 65).is_err());
    }

    #[test]
    fn test_read_string_stops_at_nul() {
        let mut frame = [0u8; 64];
        frame[2..13].copy_from_slice(b"i1Display3 ");
        assert_eq!(read_string(&frame, 2).unwrap(), "i1Display3 ");
    }

    #[test]
    fn test_read_string_without_nul() {
        let frame = *b"abcd";
        assert_eq!(read_string(&frame, 1).unwrap(), "bcd");
    }

    #[test]
    fn test_all_zero() {
        let mut frame = [0u8; 16];
        assert!(all_zero(&frame, 2, 12).unwrap());
        frame[13] = 1;
        assert!(!all_zero(&frame, 2, 12).unwrap());
        assert!(all_zero(&frame, 2, 11).unwrap());
    }

    proptest! {
        #[test]
        fn prop_u16_round_trip(value: u16, offset in 0usize..62) {
            let mut frame = [0u8; 64];
            write_u16::<LittleEndian>(&mut frame, offset, value).unwrap();
            prop_assert_eq!(read_u16::<LittleEndian>(&frame, offset).unwrap(), value);
            write_u16::<BigEndian>(&mut frame, offset, value).unwrap();
            prop_assert_eq!(read_u16::<BigEndian>(&frame, offset).unwrap(), value);
        }

        #[test]
        fn prop_u32_round_trip(value: u32, offset in 0usize..60) {
            let mut frame = [0u8; 64];
            write_u32::<LittleEndian>(&mut frame, offset, value).unwrap();
            prop_assert_eq!(read_u32::<LittleEndian>(&frame, offset).unwrap(), value);
            write_u32::<BigEndian>(&mut frame, offset, value).unwrap();
            prop_assert_eq!(read_u32::<BigEndian>(&frame, offset).unwrap(), value);
        }

        #[test]
        fn prop_f32_round_trip_is_bit_exact(bits: u32) {
            let value = f32::from_bits(bits);
            prop_assume!(!value.is_nan());
            let mut frame = [0u8; 64];
            write_f32::<LittleEndian>(&mut frame, 4, value).unwrap();
            prop_assert_eq!(read_f32::<LittleEndian>(&frame, 4).unwrap().to_bits(), bits);
        }
    }
}
