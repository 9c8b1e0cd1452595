//! The agent sub-protocol, tunneled as opaque payload bytes inside `AgentData` messages on the
//! main channel. Each agent message is itself a `{ protocol: u32, message_type: u32, opaque:
//! u64, data_size: u32 }` header followed by a type-specific body.

use super::agent_msg;
use crate::error::{ErrorType, NetworkError, NetworkResult};
use crate::wire::{Deserialize, Serialize, SizedRead, SizedWrite};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

pub const AGENT_MSG_HEADER_SIZE: usize = 20;

/// The only agent protocol version this client understands. A header advertising anything else
/// fails the connection rather than attempting to interpret an unknown layout.
pub const AGENT_PROTOCOL: u32 = 1;

#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum ClipboardType {
    None = 0,
    Text = 1,
    Png = 2,
    Bmp = 3,
    Tiff = 4,
    Jpg = 5,
}

impl ClipboardType {
    pub fn from_u32(value: u32) -> ClipboardType {
        match value {
            1 => ClipboardType::Text,
            2 => ClipboardType::Png,
            3 => ClipboardType::Bmp,
            4 => ClipboardType::Tiff,
            5 => ClipboardType::Jpg,
            _ => ClipboardType::None,
        }
    }
}

/// Generic agent message header. `opaque` is round-tripped but never interpreted by this
/// client; the per-selection clipboard preamble some messages carry is separate from this
/// header and is skipped by the caller when `cb-selection` is set.
#[derive(Debug, Eq, PartialEq)]
pub struct AgentMessageHeader {
    pub protocol: u32,
    pub message_type: u32,
    pub opaque: u64,
    pub data_size: u32,
}

impl AgentMessageHeader {
    pub fn write<W: SizedWrite>(&self, stream: &mut W) -> NetworkResult<()> {
        if stream.free_capacity() < AGENT_MSG_HEADER_SIZE {
            return Err(NetworkError::Wait);
        }
        stream.write_u32::<LittleEndian>(self.protocol)?;
        stream.write_u32::<LittleEndian>(self.message_type)?;
        stream.write_u64::<LittleEndian>(self.opaque)?;
        stream.write_u32::<LittleEndian>(self.data_size)?;
        Ok(())
    }

    /// Fails with `ProtocolMismatch` if the header advertises anything other than
    /// `AGENT_PROTOCOL`, per the agent tunnel's "connection fails on a protocol mismatch" rule.
    pub fn read<R: SizedRead>(stream: &mut R) -> NetworkResult<AgentMessageHeader> {
        if stream.remaining_data() < AGENT_MSG_HEADER_SIZE {
            return Err(NetworkError::Wait);
        }
        let header = AgentMessageHeader {
            protocol: stream.read_u32::<LittleEndian>()?,
            message_type: stream.read_u32::<LittleEndian>()?,
            opaque: stream.read_u64::<LittleEndian>()?,
            data_size: stream.read_u32::<LittleEndian>()?,
        };
        if header.protocol != AGENT_PROTOCOL {
            return Err(NetworkError::Fatal(ErrorType::ProtocolMismatch));
        }
        Ok(header)
    }
}

#[derive(Debug, Eq, PartialEq)]
pub struct ClipboardGrab {
    pub types: Vec<ClipboardType>,
}

impl Deserialize for ClipboardGrab {
    fn deserialize<R: SizedRead>(stream: &mut R) -> NetworkResult<ClipboardGrab> {
        let remaining = stream.remaining_data();
        if remaining % 4 != 0 {
            return Err(NetworkError::Fatal(ErrorType::Serialization));
        }
        let mut types = Vec::with_capacity(remaining / 4);
        for _ in 0..(remaining / 4) {
            types.push(ClipboardType::from_u32(stream.read_u32::<LittleEndian>()?));
        }
        Ok(ClipboardGrab { types })
    }
}

impl Serialize for ClipboardGrab {
    fn serialize<W: SizedWrite>(&self, stream: &mut W) -> NetworkResult<()> {
        if stream.free_capacity() < self.types.len() * 4 {
            return Err(NetworkError::Wait);
        }
        for t in &self.types {
            stream.write_u32::<LittleEndian>(*t as u32)?;
        }
        Ok(())
    }
}

#[derive(Debug, Eq, PartialEq)]
pub struct ClipboardRequest {
    pub clipboard_type: ClipboardType,
}

impl Deserialize for ClipboardRequest {
    fn deserialize<R: SizedRead>(stream: &mut R) -> NetworkResult<ClipboardRequest> {
        if stream.remaining_data() < 4 {
            return Err(NetworkError::Wait);
        }
        Ok(ClipboardRequest {
            clipboard_type: ClipboardType::from_u32(stream.read_u32::<LittleEndian>()?),
        })
    }
}

impl Serialize for ClipboardRequest {
    fn serialize<W: SizedWrite>(&self, stream: &mut W) -> NetworkResult<()> {
        if stream.free_capacity() < 4 {
            return Err(NetworkError::Wait);
        }
        stream.write_u32::<LittleEndian>(self.clipboard_type as u32)?;
        Ok(())
    }
}

#[derive(Debug, Eq, PartialEq)]
pub struct ClipboardRelease;

impl Serialize for ClipboardRelease {
    fn serialize<W: SizedWrite>(&self, _stream: &mut W) -> NetworkResult<()> {
        Ok(())
    }
}

impl Deserialize for ClipboardRelease {
    fn deserialize<R: SizedRead>(_stream: &mut R) -> NetworkResult<ClipboardRelease> {
        Ok(ClipboardRelease)
    }
}

#[derive(Debug, Eq, PartialEq)]
pub struct ClipboardData {
    pub clipboard_type: ClipboardType,
    pub data: Vec<u8>,
}

impl Deserialize for ClipboardData {
    fn deserialize<R: SizedRead>(stream: &mut R) -> NetworkResult<ClipboardData> {
        if stream.remaining_data() < 4 {
            return Err(NetworkError::Wait);
        }
        let clipboard_type = ClipboardType::from_u32(stream.read_u32::<LittleEndian>()?);
        let mut data = vec![0u8; stream.remaining_data()];
        stream.read_exact(&mut data)?;
        Ok(ClipboardData { clipboard_type, data })
    }
}

impl Serialize for ClipboardData {
    fn serialize<W: SizedWrite>(&self, stream: &mut W) -> NetworkResult<()> {
        if stream.free_capacity() < 4 + self.data.len() {
            return Err(NetworkError::Wait);
        }
        stream.write_u32::<LittleEndian>(self.clipboard_type as u32)?;
        stream.write_all(&self.data)?;
        Ok(())
    }
}

#[derive(Debug, Eq, PartialEq)]
pub struct AnnounceCapabilities {
    pub request: bool,
    pub caps: Vec<u32>,
}

impl Deserialize for AnnounceCapabilities {
    fn deserialize<R: SizedRead>(stream: &mut R) -> NetworkResult<AnnounceCapabilities> {
        if stream.remaining_data() < 4 {
            return Err(NetworkError::Wait);
        }
        let request = stream.read_u32::<LittleEndian>()? != 0;
        let remaining = stream.remaining_data();
        if remaining % 4 != 0 {
            return Err(NetworkError::Fatal(ErrorType::Serialization));
        }
        let mut caps = Vec::with_capacity(remaining / 4);
        for _ in 0..(remaining / 4) {
            caps.push(stream.read_u32::<LittleEndian>()?);
        }
        Ok(AnnounceCapabilities { request, caps })
    }
}

impl Serialize for AnnounceCapabilities {
    fn serialize<W: SizedWrite>(&self, stream: &mut W) -> NetworkResult<()> {
        if stream.free_capacity() < 4 + self.caps.len() * 4 {
            return Err(NetworkError::Wait);
        }
        stream.write_u32::<LittleEndian>(self.request as u32)?;
        for cap in &self.caps {
            stream.write_u32::<LittleEndian>(*cap)?;
        }
        Ok(())
    }
}

/// Dispatches an already-demuxed agent message body by its `message_type`.
pub fn message_type_name(message_type: u32) -> &'static str {
    match message_type {
        agent_msg::CLIPBOARD => "clipboard",
        agent_msg::CLIPBOARD_GRAB => "clipboard-grab",
        agent_msg::CLIPBOARD_REQUEST => "clipboard-request",
        agent_msg::CLIPBOARD_RELEASE => "clipboard-release",
        agent_msg::MOUSE_STATE => "mouse-state",
        agent_msg::ANNOUNCE_CAPABILITIES => "announce-capabilities",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn clipboard_grab_roundtrip() {
        let grab = ClipboardGrab {
            types: vec![ClipboardType::Text, ClipboardType::Png],
        };
        let mut buf = vec![0u8; 8];
        {
            let mut cursor = Cursor::new(&mut buf[..]);
            grab.serialize(&mut cursor).unwrap();
        }
        let mut cursor = Cursor::new(&buf[..]);
        let parsed = ClipboardGrab::deserialize(&mut cursor).unwrap();
        assert_eq!(parsed, grab);
    }

    #[test]
    fn clipboard_grab_rejects_misaligned_body() {
        let buf = [0u8; 3];
        let mut cursor = Cursor::new(&buf[..]);
        assert_eq!(
            ClipboardGrab::deserialize(&mut cursor).unwrap_err(),
            NetworkError::Fatal(ErrorType::Serialization)
        );
    }
}
