//! Playback channel: demuxes start/data/stop/volume/mute into callbacks. Decoding audio frames
//! is the caller's job; this just hands over the raw samples and the negotiated format.

use super::ChannelState;
use spice_protocol::error::NetworkResult;
use spice_protocol::messages::playback::{AudioMode, PlaybackData, PlaybackMute, PlaybackStart, PlaybackStop, PlaybackVolume};
use spice_protocol::messages::playback_msg;
use spice_protocol::wire::Deserialize;
use std::io::Cursor;

pub enum PlaybackEvent {
    Start { channels: u8, frequency: u32, mode: AudioMode, time: u32 },
    Data { time: u32, samples: Vec<u8> },
    Stop,
    Volume(Vec<u16>),
    Mute(bool),
}

pub type PlaybackChannel = ChannelState<super::Playback>;

impl PlaybackChannel {
    pub fn poll_message(&mut self) -> NetworkResult<Option<PlaybackEvent>> {
        let (msg_type, body) = match self.poll_common()? {
            Some(pair) => pair,
            None => return Ok(None),
        };
        let mut cursor = Cursor::new(&body[..]);

        let event = match msg_type {
            playback_msg::START => {
                let start = PlaybackStart::deserialize(&mut cursor)?;
                self.note_data_message()?;
                PlaybackEvent::Start {
                    channels: start.channels,
                    frequency: start.frequency,
                    mode: start.mode,
                    time: start.time,
                }
            }
            playback_msg::DATA => {
                let data = PlaybackData::deserialize(&mut cursor)?;
                self.note_data_message()?;
                PlaybackEvent::Data { time: data.time, samples: data.samples }
            }
            playback_msg::STOP => {
                let _ = PlaybackStop::deserialize(&mut cursor)?;
                self.note_data_message()?;
                PlaybackEvent::Stop
            }
            playback_msg::VOLUME => {
                PlaybackEvent::Volume(PlaybackVolume::deserialize(&mut cursor)?.channels)
            }
            playback_msg::MUTE => PlaybackEvent::Mute(PlaybackMute::deserialize(&mut cursor)?.mute),
            _ => return self.poll_message(),
        };

        Ok(Some(event))
    }
}
