use crate::error::{NetworkError, NetworkResult};
use crate::wire::{Deserialize, Serialize, SizedRead, SizedWrite};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

#[derive(Debug, Eq, PartialEq)]
pub struct MainInit {
    pub session_id: u32,
    pub display_channels_hint: u32,
    pub supported_mouse_modes: u32,
    pub current_mouse_mode: u32,
    pub agent_connected: bool,
    pub agent_tokens: u32,
    pub multi_media_time: u32,
    pub ram_hint: u32,
}

impl Deserialize for MainInit {
    fn deserialize<R: SizedRead>(stream: &mut R) -> NetworkResult<MainInit> {
        if stream.remaining_data() < 32 {
            return Err(NetworkError::Wait);
        }
        Ok(MainInit {
            session_id: stream.read_u32::<LittleEndian>()?,
            display_channels_hint: stream.read_u32::<LittleEndian>()?,
            supported_mouse_modes: stream.read_u32::<LittleEndian>()?,
            current_mouse_mode: stream.read_u32::<LittleEndian>()?,
            agent_connected: stream.read_u32::<LittleEndian>()? != 0,
            agent_tokens: stream.read_u32::<LittleEndian>()?,
            multi_media_time: stream.read_u32::<LittleEndian>()?,
            ram_hint: stream.read_u32::<LittleEndian>()?,
        })
    }
}

#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub struct ChannelDescriptor {
    pub channel_type: u8,
    pub channel_id: u8,
}

#[derive(Debug, Eq, PartialEq)]
pub struct ChannelsList {
    pub channels: Vec<ChannelDescriptor>,
}

impl Deserialize for ChannelsList {
    fn deserialize<R: SizedRead>(stream: &mut R) -> NetworkResult<ChannelsList> {
        if stream.remaining_data() < 4 {
            return Err(NetworkError::Wait);
        }
        let count = stream.read_u32::<LittleEndian>()? as usize;
        if stream.remaining_data() < count * 2 {
            return Err(NetworkError::Wait);
        }
        let mut channels = Vec::with_capacity(count);
        for _ in 0..count {
            channels.push(ChannelDescriptor {
                channel_type: stream.read_u8()?,
                channel_id: stream.read_u8()?,
            });
        }
        Ok(ChannelsList { channels })
    }
}

#[derive(Debug, Eq, PartialEq)]
pub struct AttachChannels;

impl Serialize for AttachChannels {
    fn serialize<W: SizedWrite>(&self, _stream: &mut W) -> NetworkResult<()> {
        Ok(())
    }
}

#[derive(Debug, Eq, PartialEq)]
pub struct MouseMode {
    pub supported_modes: u32,
    pub current_mode: u32,
}

impl Deserialize for MouseMode {
    fn deserialize<R: SizedRead>(stream: &mut R) -> NetworkResult<MouseMode> {
        if stream.remaining_data() < 8 {
            return Err(NetworkError::Wait);
        }
        Ok(MouseMode {
            supported_modes: stream.read_u32::<LittleEndian>()?,
            current_mode: stream.read_u32::<LittleEndian>()?,
        })
    }
}

#[derive(Debug, Eq, PartialEq)]
pub struct MouseModeRequest {
    pub mode: u32,
}

impl Serialize for MouseModeRequest {
    fn serialize<W: SizedWrite>(&self, stream: &mut W) -> NetworkResult<()> {
        if stream.free_capacity() < 4 {
            return Err(NetworkError::Wait);
        }
        stream.write_u32::<LittleEndian>(self.mode)?;
        Ok(())
    }
}

#[derive(Debug, Eq, PartialEq)]
pub struct MultiMediaTime {
    pub time: u32,
}

impl Deserialize for MultiMediaTime {
    fn deserialize<R: SizedRead>(stream: &mut R) -> NetworkResult<MultiMediaTime> {
        if stream.remaining_data() < 4 {
            return Err(NetworkError::Wait);
        }
        Ok(MultiMediaTime {
            time: stream.read_u32::<LittleEndian>()?,
        })
    }
}

#[derive(Debug, Eq, PartialEq)]
pub struct AgentConnected;

impl Deserialize for AgentConnected {
    fn deserialize<R: SizedRead>(_stream: &mut R) -> NetworkResult<AgentConnected> {
        Ok(AgentConnected)
    }
}

/// Sent instead of plain `agent-connected` when the server has `SPICE_MAIN_CAP_AGENT_CONNECTED_
/// TOKENS`: carries the initial token grant in the same message rather than a follow-up
/// `agent-token`.
#[derive(Debug, Eq, PartialEq)]
pub struct AgentConnectedTokens {
    pub num_tokens: u32,
}

impl Deserialize for AgentConnectedTokens {
    fn deserialize<R: SizedRead>(stream: &mut R) -> NetworkResult<AgentConnectedTokens> {
        if stream.remaining_data() < 4 {
            return Err(NetworkError::Wait);
        }
        Ok(AgentConnectedTokens {
            num_tokens: stream.read_u32::<LittleEndian>()?,
        })
    }
}

#[derive(Debug, Eq, PartialEq)]
pub struct AgentDisconnected {
    pub error_code: u32,
}

impl Deserialize for AgentDisconnected {
    fn deserialize<R: SizedRead>(stream: &mut R) -> NetworkResult<AgentDisconnected> {
        if stream.remaining_data() < 4 {
            return Err(NetworkError::Wait);
        }
        Ok(AgentDisconnected {
            error_code: stream.read_u32::<LittleEndian>()?,
        })
    }
}

#[derive(Debug, Eq, PartialEq)]
pub struct AgentStart {
    pub num_tokens: u32,
}

impl Serialize for AgentStart {
    fn serialize<W: SizedWrite>(&self, stream: &mut W) -> NetworkResult<()> {
        if stream.free_capacity() < 4 {
            return Err(NetworkError::Wait);
        }
        stream.write_u32::<LittleEndian>(self.num_tokens)?;
        Ok(())
    }
}

#[derive(Debug, Eq, PartialEq)]
pub struct AgentToken {
    pub num_tokens: u32,
}

impl Deserialize for AgentToken {
    fn deserialize<R: SizedRead>(stream: &mut R) -> NetworkResult<AgentToken> {
        if stream.remaining_data() < 4 {
            return Err(NetworkError::Wait);
        }
        Ok(AgentToken {
            num_tokens: stream.read_u32::<LittleEndian>()?,
        })
    }
}

impl Serialize for AgentToken {
    fn serialize<W: SizedWrite>(&self, stream: &mut W) -> NetworkResult<()> {
        if stream.free_capacity() < 4 {
            return Err(NetworkError::Wait);
        }
        stream.write_u32::<LittleEndian>(self.num_tokens)?;
        Ok(())
    }
}

/// Raw agent data is an opaque blob tunneled between main channel and agent protocol layers;
/// the chunking/reassembly lives in the client's agent tunnel, not in this wire struct.
#[derive(Debug, Eq, PartialEq)]
pub struct AgentData {
    pub data: Vec<u8>,
}

impl Deserialize for AgentData {
    fn deserialize<R: SizedRead>(stream: &mut R) -> NetworkResult<AgentData> {
        let mut data = vec![0u8; stream.remaining_data()];
        stream.read_exact(&mut data)?;
        Ok(AgentData { data })
    }
}

impl Serialize for AgentData {
    fn serialize<W: SizedWrite>(&self, stream: &mut W) -> NetworkResult<()> {
        if stream.free_capacity() < self.data.len() {
            return Err(NetworkError::Wait);
        }
        stream.write_all(&self.data)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn channels_list_parses_descriptors() {
        let mut buf = Vec::new();
        buf.write_u32::<LittleEndian>(2).unwrap();
        buf.write_u8(2).unwrap();
        buf.write_u8(0).unwrap();
        buf.write_u8(5).unwrap();
        buf.write_u8(1).unwrap();

        let mut cursor = Cursor::new(&buf[..]);
        let list = ChannelsList::deserialize(&mut cursor).unwrap();
        assert_eq!(
            list.channels,
            vec![
                ChannelDescriptor { channel_type: 2, channel_id: 0 },
                ChannelDescriptor { channel_type: 5, channel_id: 1 },
            ]
        );
    }

    #[test]
    fn channels_list_waits_for_full_descriptor_table() {
        let mut buf = Vec::new();
        buf.write_u32::<LittleEndian>(2).unwrap();
        buf.write_u8(2).unwrap(); // only one descriptor present, two promised

        let mut cursor = Cursor::new(&buf[..]);
        assert_eq!(ChannelsList::deserialize(&mut cursor).unwrap_err(), NetworkError::Wait);
    }
}
