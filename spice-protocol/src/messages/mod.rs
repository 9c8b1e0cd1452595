pub mod agent;
pub mod common;
pub mod inputs;
pub mod main;
pub mod playback;

/// Server-to-client message type constants shared by every channel (< 100).
pub mod msg {
    pub const MIGRATE: u16 = 1;
    pub const MIGRATE_DATA: u16 = 2;
    pub const SET_ACK: u16 = 3;
    pub const PING: u16 = 4;
    pub const WAIT_FOR_CHANNELS: u16 = 5;
    pub const DISCONNECTING: u16 = 6;
    pub const NOTIFY: u16 = 7;
}

/// Client-to-server message type constants shared by every channel (< 100).
pub mod msgc {
    pub const ACK_SYNC: u16 = 1;
    pub const ACK: u16 = 2;
    pub const PONG: u16 = 3;
    pub const MIGRATE_FLUSH_MARK: u16 = 4;
    pub const MIGRATE_DATA: u16 = 5;
    pub const DISCONNECTING: u16 = 6;
}

/// Main channel message type constants (server-to-client), offset from 100.
pub mod main_msg {
    pub const INIT: u16 = 103;
    pub const CHANNELS_LIST: u16 = 104;
    pub const MOUSE_MODE: u16 = 111;
    pub const MULTI_MEDIA_TIME: u16 = 112;
    pub const AGENT_CONNECTED: u16 = 105;
    pub const AGENT_DISCONNECTED: u16 = 106;
    pub const AGENT_DATA: u16 = 107;
    pub const AGENT_TOKEN: u16 = 108;
    pub const AGENT_CONNECTED_TOKENS: u16 = 109;
}

/// Main channel message type constants (client-to-server).
pub mod main_msgc {
    pub const ATTACH_CHANNELS: u16 = 101;
    pub const MOUSE_MODE_REQUEST: u16 = 111;
    pub const AGENT_START: u16 = 107;
    pub const AGENT_DATA: u16 = 108;
    pub const AGENT_TOKEN: u16 = 109;
}

/// Inputs channel message type constants (client-to-server).
pub mod inputs_msgc {
    pub const KEY_DOWN: u16 = 101;
    pub const KEY_UP: u16 = 102;
    pub const KEY_MODIFIERS: u16 = 104;
    pub const MOUSE_MOTION: u16 = 111;
    pub const MOUSE_POSITION: u16 = 112;
    pub const MOUSE_PRESS: u16 = 113;
    pub const MOUSE_RELEASE: u16 = 114;
}

/// Inputs channel message type constants (server-to-client).
pub mod inputs_msg {
    pub const INIT: u16 = 101;
    pub const KEY_MODIFIERS: u16 = 102;
    pub const MOUSE_MOTION_ACK: u16 = 111;
}

/// Playback channel message type constants (server-to-client).
pub mod playback_msg {
    pub const DATA: u16 = 101;
    pub const MODE: u16 = 102;
    pub const START: u16 = 103;
    pub const STOP: u16 = 104;
    pub const VOLUME: u16 = 105;
    pub const MUTE: u16 = 106;
}

/// Agent sub-protocol message type constants, tunneled as the payload of
/// `main_msg::AGENT_DATA` / `main_msgc::AGENT_DATA`.
pub mod agent_msg {
    pub const CLIPBOARD: u32 = 7;
    pub const CLIPBOARD_GRAB: u32 = 8;
    pub const CLIPBOARD_REQUEST: u32 = 9;
    pub const CLIPBOARD_RELEASE: u32 = 10;
    pub const MOUSE_STATE: u32 = 4;
    pub const ANNOUNCE_CAPABILITIES: u32 = 12;
}

pub const AGENT_CAP_CLIPBOARD_BY_DEMAND: u32 = 0;
pub const AGENT_CAP_CLIPBOARD_SELECTION: u32 = 1;
pub const AGENT_MAX_DATA_SIZE: usize = 2048;
pub const AGENT_ANNOUNCE_MAX_SIZE: usize = 1024;
