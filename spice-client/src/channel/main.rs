//! Main channel: session bootstrap, the channels-list driven sub-channel connect sequence, and
//! the main-channel side of the agent lifecycle (connect/disconnect/token accounting, with the
//! data bytes themselves handed off to [`crate::agent::AgentState`]).

use super::ChannelState;
use spice_protocol::error::NetworkResult;
use spice_protocol::link::ChannelType;
use spice_protocol::messages::common::Notify;
use spice_protocol::messages::main::{
    AgentConnected, AgentConnectedTokens, AgentData, AgentDisconnected, AgentStart, AgentToken,
    AttachChannels, ChannelDescriptor, ChannelsList, MainInit, MouseMode, MouseModeRequest, MultiMediaTime,
};
use spice_protocol::messages::msg;
use spice_protocol::messages::{main_msg, main_msgc};
use spice_protocol::wire::Deserialize;
use std::io::Cursor;

pub enum MainEvent {
    Init(MainInit),
    ChannelsList(Vec<ChannelDescriptor>),
    MouseMode(MouseMode),
    MultiMediaTime(u32),
    AgentConnected,
    AgentConnectedTokens(u32),
    AgentDisconnected(u32),
    AgentData(Vec<u8>),
    AgentToken(u32),
    Notify(String),
    Disconnected,
}

pub type MainChannel = ChannelState<super::Main>;

impl MainChannel {
    pub fn send_attach_channels(&mut self) -> NetworkResult<()> {
        self.send_message(main_msgc::ATTACH_CHANNELS, &AttachChannels)
    }

    pub fn send_mouse_mode_request(&mut self, mode: u32) -> NetworkResult<()> {
        self.send_message(main_msgc::MOUSE_MODE_REQUEST, &MouseModeRequest { mode })
    }

    pub fn send_agent_start(&mut self, num_tokens: u32) -> NetworkResult<()> {
        self.send_message(main_msgc::AGENT_START, &AgentStart { num_tokens })
    }

    pub fn send_agent_data(&mut self, data: Vec<u8>) -> NetworkResult<()> {
        self.send_message(main_msgc::AGENT_DATA, &AgentData { data })
    }

    pub fn send_agent_token(&mut self, num_tokens: u32) -> NetworkResult<()> {
        self.send_message(main_msgc::AGENT_TOKEN, &AgentToken { num_tokens })
    }

    /// Pulls and decodes the next main-specific message, if a complete one is buffered.
    /// Common messages (ack/ping/notify/disconnecting) are handled transparently by
    /// `poll_common` before this ever sees them.
    pub fn poll_message(&mut self) -> NetworkResult<Option<MainEvent>> {
        let (msg_type, body) = match self.poll_common()? {
            Some(pair) => pair,
            None => return Ok(None),
        };

        let mut cursor = Cursor::new(&body[..]);

        let event = match msg_type {
            main_msg::INIT => MainEvent::Init(MainInit::deserialize(&mut cursor)?),
            main_msg::CHANNELS_LIST => {
                MainEvent::ChannelsList(ChannelsList::deserialize(&mut cursor)?.channels)
            }
            main_msg::MOUSE_MODE => MainEvent::MouseMode(MouseMode::deserialize(&mut cursor)?),
            main_msg::MULTI_MEDIA_TIME => {
                MainEvent::MultiMediaTime(MultiMediaTime::deserialize(&mut cursor)?.time)
            }
            main_msg::AGENT_CONNECTED => {
                let _ = AgentConnected::deserialize(&mut cursor)?;
                MainEvent::AgentConnected
            }
            main_msg::AGENT_CONNECTED_TOKENS => {
                MainEvent::AgentConnectedTokens(AgentConnectedTokens::deserialize(&mut cursor)?.num_tokens)
            }
            main_msg::AGENT_DISCONNECTED => {
                MainEvent::AgentDisconnected(AgentDisconnected::deserialize(&mut cursor)?.error_code)
            }
            main_msg::AGENT_DATA => MainEvent::AgentData(AgentData::deserialize(&mut cursor)?.data),
            main_msg::AGENT_TOKEN => {
                MainEvent::AgentToken(AgentToken::deserialize(&mut cursor)?.num_tokens)
            }
            msg::NOTIFY => MainEvent::Notify(Notify::deserialize(&mut cursor)?.message),
            msg::DISCONNECTING => MainEvent::Disconnected,
            // Anything else unrecognized on the main channel is dropped rather than treated as
            // fatal, matching how real servers add new optional messages over time.
            _ => return self.poll_message(),
        };

        Ok(Some(event))
    }
}

pub fn descriptor_channel_type(descriptor: &ChannelDescriptor) -> Option<ChannelType> {
    ChannelType::from_u8(descriptor.channel_type)
}
