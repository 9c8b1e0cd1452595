//! Per-message framing header used on every channel once the link handshake completes.
//!
//! This client always advertises `SPICE_COMMON_CAP_MINI_HEADER` and requires the server to
//! honor it, so the wire framing is the compact 6 byte form (`msg_type: u16, msg_size: u32`)
//! rather than the legacy 18 byte `SpiceDataHeader` with its serial number and sub-message list.

use crate::error::{ErrorType, NetworkError, NetworkResult};
use crate::wire::{SizedRead, SizedWrite};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

pub const MINI_HEADER_SIZE: usize = 6;

#[derive(Debug, Eq, PartialEq)]
pub struct MiniHeader {
    pub msg_type: u16,
    pub msg_size: u32,
}

impl MiniHeader {
    pub fn new(msg_type: u16, msg_size: u32) -> MiniHeader {
        MiniHeader { msg_type, msg_size }
    }

    pub fn write<W: SizedWrite>(&self, stream: &mut W) -> NetworkResult<()> {
        if stream.free_capacity() < MINI_HEADER_SIZE {
            return Err(NetworkError::Wait);
        }
        stream.write_u16::<LittleEndian>(self.msg_type)?;
        stream.write_u32::<LittleEndian>(self.msg_size)?;
        Ok(())
    }

    pub fn read<R: SizedRead>(stream: &mut R) -> NetworkResult<MiniHeader> {
        if stream.remaining_data() < MINI_HEADER_SIZE {
            return Err(NetworkError::Wait);
        }
        let msg_type = stream.read_u16::<LittleEndian>()?;
        let msg_size = stream.read_u32::<LittleEndian>()?;

        if msg_size == 0 {
            return Err(NetworkError::Fatal(ErrorType::EmptyPayload));
        }

        Ok(MiniHeader { msg_type, msg_size })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn roundtrip() {
        let mut buf = [0u8; MINI_HEADER_SIZE];
        let header = MiniHeader::new(7, 128);
        {
            let mut cursor = Cursor::new(&mut buf[..]);
            header.write(&mut cursor).unwrap();
        }

        let mut cursor = Cursor::new(&buf[..]);
        let parsed = MiniHeader::read(&mut cursor).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn read_waits_on_short_buffer() {
        let buf = [0u8; 3];
        let mut cursor = Cursor::new(&buf[..]);
        assert_eq!(MiniHeader::read(&mut cursor).unwrap_err(), NetworkError::Wait);
    }

    #[test]
    fn read_rejects_zero_size_payload() {
        let mut buf = [0u8; MINI_HEADER_SIZE];
        {
            let mut cursor = Cursor::new(&mut buf[..]);
            MiniHeader::new(1, 0).write(&mut cursor).unwrap();
        }
        let mut cursor = Cursor::new(&buf[..]);
        assert_eq!(
            MiniHeader::read(&mut cursor).unwrap_err(),
            NetworkError::Fatal(ErrorType::EmptyPayload)
        );
    }

    #[test]
    fn write_waits_on_full_buffer() {
        let mut buf = [0u8; 4];
        let mut cursor = Cursor::new(&mut buf[..]);
        assert_eq!(
            MiniHeader::new(1, 1).write(&mut cursor).unwrap_err(),
            NetworkError::Wait
        );
    }
}
