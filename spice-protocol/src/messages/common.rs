//! Messages handled identically on every channel type: ack bookkeeping, keepalive, and the two
//! ways a channel can be told to go away.

use crate::error::{ErrorType, NetworkError, NetworkResult};
use crate::wire::{Deserialize, Serialize, SizedRead, SizedWrite};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

#[derive(Debug, Eq, PartialEq)]
pub struct SetAck {
    pub generation: u32,
    pub window: u32,
}

impl Deserialize for SetAck {
    fn deserialize<R: SizedRead>(stream: &mut R) -> NetworkResult<SetAck> {
        if stream.remaining_data() < 8 {
            return Err(NetworkError::Wait);
        }
        Ok(SetAck {
            generation: stream.read_u32::<LittleEndian>()?,
            window: stream.read_u32::<LittleEndian>()?,
        })
    }
}

#[derive(Debug, Eq, PartialEq)]
pub struct AckSync {
    pub generation: u32,
}

impl Serialize for AckSync {
    fn serialize<W: SizedWrite>(&self, stream: &mut W) -> NetworkResult<()> {
        if stream.free_capacity() < 4 {
            return Err(NetworkError::Wait);
        }
        stream.write_u32::<LittleEndian>(self.generation)?;
        Ok(())
    }
}

/// A bare `SPICE_MSGC_ACK` / ack-window pulse carries no payload at all.
#[derive(Debug, Eq, PartialEq)]
pub struct Ack;

impl Serialize for Ack {
    fn serialize<W: SizedWrite>(&self, _stream: &mut W) -> NetworkResult<()> {
        Ok(())
    }
}

#[derive(Debug, Eq, PartialEq)]
pub struct Ping {
    pub id: u32,
    pub timestamp: u64,
    pub payload: Vec<u8>,
}

/// A real spice-server has shipped builds that echo an oversized PING payload back at more
/// than this size and choke on the reply; the client truncates outgoing PONG payloads here.
pub const MAX_PONG_SIZE: usize = 4096;

impl Deserialize for Ping {
    fn deserialize<R: SizedRead>(stream: &mut R) -> NetworkResult<Ping> {
        if stream.remaining_data() < 12 {
            return Err(NetworkError::Wait);
        }
        let id = stream.read_u32::<LittleEndian>()?;
        let timestamp = stream.read_u64::<LittleEndian>()?;
        let mut payload = vec![0u8; stream.remaining_data()];
        stream.read_exact(&mut payload)?;
        Ok(Ping { id, timestamp, payload })
    }
}

#[derive(Debug, Eq, PartialEq)]
pub struct Pong {
    pub id: u32,
    pub timestamp: u64,
    pub payload: Vec<u8>,
}

impl Pong {
    pub fn from_ping(ping: &Ping) -> Pong {
        let mut payload = ping.payload.clone();
        payload.truncate(MAX_PONG_SIZE);
        Pong {
            id: ping.id,
            timestamp: ping.timestamp,
            payload,
        }
    }
}

impl Serialize for Pong {
    fn serialize<W: SizedWrite>(&self, stream: &mut W) -> NetworkResult<()> {
        if stream.free_capacity() < 12 + self.payload.len() {
            return Err(NetworkError::Wait);
        }
        stream.write_u32::<LittleEndian>(self.id)?;
        stream.write_u64::<LittleEndian>(self.timestamp)?;
        stream.write_all(&self.payload)?;
        Ok(())
    }
}

#[derive(Debug, Eq, PartialEq)]
pub enum Severity {
    Info,
    Warn,
    Error,
}

impl Severity {
    fn from_u16(value: u16) -> Severity {
        match value {
            0 => Severity::Info,
            1 => Severity::Warn,
            _ => Severity::Error,
        }
    }
}

#[derive(Debug, Eq, PartialEq)]
pub struct Notify {
    pub severity: Severity,
    pub visibility: u16,
    pub what: u32,
    pub message: String,
}

impl Deserialize for Notify {
    fn deserialize<R: SizedRead>(stream: &mut R) -> NetworkResult<Notify> {
        if stream.remaining_data() < 16 {
            return Err(NetworkError::Wait);
        }
        let severity = Severity::from_u16(stream.read_u32::<LittleEndian>()? as u16);
        let visibility = stream.read_u32::<LittleEndian>()? as u16;
        let what = stream.read_u32::<LittleEndian>()?;
        let len = stream.read_u32::<LittleEndian>()? as usize;

        if stream.remaining_data() < len {
            return Err(NetworkError::Fatal(ErrorType::Serialization));
        }
        let mut bytes = vec![0u8; len];
        stream.read_exact(&mut bytes)?;
        // the message is NUL terminated on the wire; drop the terminator if present
        if bytes.last() == Some(&0) {
            bytes.pop();
        }
        let message = String::from_utf8_lossy(&bytes).into_owned();

        Ok(Notify {
            severity,
            visibility,
            what,
            message,
        })
    }
}

#[derive(Debug, Eq, PartialEq)]
pub struct Disconnecting {
    pub time_stamp: u64,
    pub reason: u32,
}

impl Deserialize for Disconnecting {
    fn deserialize<R: SizedRead>(stream: &mut R) -> NetworkResult<Disconnecting> {
        if stream.remaining_data() < 12 {
            return Err(NetworkError::Wait);
        }
        Ok(Disconnecting {
            time_stamp: stream.read_u64::<LittleEndian>()?,
            reason: stream.read_u32::<LittleEndian>()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    #[test]
    fn pong_truncates_oversized_ping_payload() {
        let ping = Ping {
            id: 1,
            timestamp: 2,
            payload: vec![0u8; MAX_PONG_SIZE + 500],
        };
        let pong = Pong::from_ping(&ping);
        assert_eq!(pong.payload.len(), MAX_PONG_SIZE);
    }

    #[test]
    fn notify_strips_nul_terminator() {
        let mut buf = Vec::new();
        buf.write_u32::<LittleEndian>(2).unwrap(); // severity = error
        buf.write_u32::<LittleEndian>(1).unwrap(); // visibility
        buf.write_u32::<LittleEndian>(0).unwrap(); // what
        let msg = b"hello\0";
        buf.write_u32::<LittleEndian>(msg.len() as u32).unwrap();
        buf.write_all(msg).unwrap();

        let mut cursor = Cursor::new(&buf[..]);
        let notify = Notify::deserialize(&mut cursor).unwrap();
        assert_eq!(notify.message, "hello");
        assert_eq!(notify.severity, Severity::Error);
    }
}
