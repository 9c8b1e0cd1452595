use crate::error::{NetworkError, NetworkResult};
use crate::wire::{Deserialize, SizedRead};
use byteorder::{LittleEndian, ReadBytesExt};

#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum AudioMode {
    Raw = 0,
    Celt = 1,
    Opus = 2,
}

impl AudioMode {
    fn from_u16(value: u16) -> AudioMode {
        match value {
            1 => AudioMode::Celt,
            2 => AudioMode::Opus,
            _ => AudioMode::Raw,
        }
    }
}

#[derive(Debug, Eq, PartialEq)]
pub struct PlaybackStart {
    pub channels: u8,
    pub frequency: u32,
    pub mode: AudioMode,
    pub time: u32,
}

impl Deserialize for PlaybackStart {
    fn deserialize<R: SizedRead>(stream: &mut R) -> NetworkResult<PlaybackStart> {
        if stream.remaining_data() < 13 {
            return Err(NetworkError::Wait);
        }
        let channels = stream.read_u32::<LittleEndian>()? as u8;
        let frequency = stream.read_u32::<LittleEndian>()?;
        let mode = AudioMode::from_u16(stream.read_u16::<LittleEndian>()?);
        let time = stream.read_u32::<LittleEndian>()?;
        Ok(PlaybackStart {
            channels,
            frequency,
            mode,
            time,
        })
    }
}

#[derive(Debug, Eq, PartialEq)]
pub struct PlaybackData {
    pub time: u32,
    pub samples: Vec<u8>,
}

impl Deserialize for PlaybackData {
    fn deserialize<R: SizedRead>(stream: &mut R) -> NetworkResult<PlaybackData> {
        if stream.remaining_data() < 4 {
            return Err(NetworkError::Wait);
        }
        let time = stream.read_u32::<LittleEndian>()?;
        let mut samples = vec![0u8; stream.remaining_data()];
        stream.read_exact(&mut samples)?;
        Ok(PlaybackData { time, samples })
    }
}

#[derive(Debug, Eq, PartialEq)]
pub struct PlaybackStop;

impl Deserialize for PlaybackStop {
    fn deserialize<R: SizedRead>(_stream: &mut R) -> NetworkResult<PlaybackStop> {
        Ok(PlaybackStop)
    }
}

#[derive(Debug, Eq, PartialEq)]
pub struct PlaybackVolume {
    pub channels: Vec<u16>,
}

impl Deserialize for PlaybackVolume {
    fn deserialize<R: SizedRead>(stream: &mut R) -> NetworkResult<PlaybackVolume> {
        if stream.remaining_data() < 1 {
            return Err(NetworkError::Wait);
        }
        let count = stream.read_u8()? as usize;
        if stream.remaining_data() < count * 2 {
            return Err(NetworkError::Wait);
        }
        let mut channels = Vec::with_capacity(count);
        for _ in 0..count {
            channels.push(stream.read_u16::<LittleEndian>()?);
        }
        Ok(PlaybackVolume { channels })
    }
}

#[derive(Debug, Eq, PartialEq)]
pub struct PlaybackMute {
    pub mute: bool,
}

impl Deserialize for PlaybackMute {
    fn deserialize<R: SizedRead>(stream: &mut R) -> NetworkResult<PlaybackMute> {
        if stream.remaining_data() < 1 {
            return Err(NetworkError::Wait);
        }
        Ok(PlaybackMute {
            mute: stream.read_u8()? != 0,
        })
    }
}
