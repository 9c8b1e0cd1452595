//! The public API: an owned, explicit `Session` tying the link handshake, the three channels,
//! and the agent tunnel together behind one non-blocking `process()` call, plus a cheaply
//! cloneable [`SessionHandle`] for the mouse/clipboard state that callers drive from other
//! threads.

use crate::agent::AgentState;
use crate::channel::inputs::{InputsChannel, InputsEvent, MouseState};
use crate::channel::main::{descriptor_channel_type, MainChannel, MainEvent};
use crate::channel::playback::{PlaybackChannel, PlaybackEvent};
use crate::channel::{ChannelKind, Inputs, Playback};
use crate::error::{ClientError, ClientResult, ConfigError, DisconnectReason};
use crate::transport::Transport;
use mio::{Events, Interest, Poll, Token};
use slog::{info, o};
use spice_protocol::link::ChannelType;
use spice_protocol::messages::agent::ClipboardType;
use spice_protocol::messages::inputs::MouseButton;
use spice_protocol::messages::playback::AudioMode;
use spice_protocol::crypto::Password;
use std::net::ToSocketAddrs;
use std::sync::Arc;
use std::time::Duration;

const MAIN_TOKEN: Token = Token(0);
const INPUTS_TOKEN: Token = Token(1);
const PLAYBACK_TOKEN: Token = Token(2);

pub type ClipboardNoticeCallback = Box<dyn FnMut(&[ClipboardType]) + Send>;
pub type ClipboardDataCallback = Box<dyn FnMut(ClipboardType, Vec<u8>) + Send>;
pub type ClipboardReleaseCallback = Box<dyn FnMut() + Send>;
pub type ClipboardRequestCallback = Box<dyn FnMut(ClipboardType) + Send>;
pub type AudioStartCallback = Box<dyn FnMut(u8, u32, AudioMode) + Send>;
pub type AudioVolumeCallback = Box<dyn FnMut(Vec<u16>) + Send>;
pub type AudioMuteCallback = Box<dyn FnMut(bool) + Send>;
pub type AudioStopCallback = Box<dyn FnMut() + Send>;
pub type AudioDataCallback = Box<dyn FnMut(u32, Vec<u8>) + Send>;

#[derive(Default)]
struct Callbacks {
    clipboard_notice: Option<ClipboardNoticeCallback>,
    clipboard_data: Option<ClipboardDataCallback>,
    clipboard_release: Option<ClipboardReleaseCallback>,
    clipboard_request: Option<ClipboardRequestCallback>,
    audio_start: Option<AudioStartCallback>,
    audio_volume: Option<AudioVolumeCallback>,
    audio_mute: Option<AudioMuteCallback>,
    audio_stop: Option<AudioStopCallback>,
    audio_data: Option<AudioDataCallback>,
}

/// Events surfaced out of `Session::process` for the caller to act on.
pub enum SessionEvent {
    Notify(String),
    Disconnected(DisconnectReason),
}

/// A cheaply cloneable handle onto the pieces of a `Session` that are safe to drive from a
/// thread other than the one calling `process()`.
#[derive(Clone)]
pub struct SessionHandle {
    mouse: Arc<MouseState>,
    agent: Arc<AgentState>,
}

impl SessionHandle {
    pub fn mouse(&self) -> &MouseState {
        &self.mouse
    }

    pub fn request_clipboard(&self, clipboard_type: ClipboardType) -> ClientResult<()> {
        self.agent.queue_clipboard_request(clipboard_type)?;
        Ok(())
    }

    pub fn offer_clipboard(&self, types: Vec<ClipboardType>) -> ClientResult<()> {
        self.agent.queue_clipboard_grab(types)?;
        Ok(())
    }

    pub fn send_clipboard_data(&self, clipboard_type: ClipboardType, data: Vec<u8>) -> ClientResult<()> {
        self.agent.queue_clipboard_data(clipboard_type, data)?;
        Ok(())
    }

    pub fn release_clipboard(&self) -> ClientResult<()> {
        self.agent.queue_clipboard_release()?;
        Ok(())
    }
}

pub struct Session {
    log: slog::Logger,
    poll: Poll,
    events: Events,
    host: String,
    port: u16,
    password: Option<String>,
    session_id: u32,
    playback_requested: bool,
    main: MainChannel,
    main_ready: bool,
    inputs: Option<InputsChannel>,
    playback: Option<PlaybackChannel>,
    pending_display_channels: Vec<(ChannelType, u8)>,
    mouse: Arc<MouseState>,
    agent: Arc<AgentState>,
    callbacks: Callbacks,
}

impl Session {
    pub fn connect(
        host: &str,
        port: u16,
        password: Option<&str>,
        playback: bool,
        log: slog::Logger,
    ) -> ClientResult<Session> {
        let addr = (host, port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| ClientError::Io(std::io::Error::new(std::io::ErrorKind::AddrNotAvailable, "no address")))?;

        let poll = Poll::new()?;

        let mut main_transport = Transport::connect_tcp(addr)?;
        main_transport.register(poll.registry(), MAIN_TOKEN, Interest::READABLE | Interest::WRITABLE)?;

        // The first channel's own link always uses connection_id 0; every sub-channel link
        // after it uses the session id the server hands back in main-init.
        let main = MainChannel::new(
            main_transport,
            0,
            0,
            password.map(Password::new),
            log.new(o!("channel" => "main")),
        )?;

        Ok(Session {
            log,
            poll,
            events: Events::with_capacity(16),
            host: host.to_string(),
            port,
            password: password.map(str::to_string),
            session_id: 0,
            playback_requested: playback,
            main,
            main_ready: false,
            inputs: None,
            playback: None,
            pending_display_channels: Vec::new(),
            mouse: Arc::new(MouseState::new()),
            agent: Arc::new(AgentState::new()),
            callbacks: Callbacks::default(),
        })
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            mouse: self.mouse.clone(),
            agent: self.agent.clone(),
        }
    }

    pub fn set_clipboard_callbacks(
        &mut self,
        notice: Option<ClipboardNoticeCallback>,
        data: Option<ClipboardDataCallback>,
        release: ClipboardReleaseCallback,
        request: ClipboardRequestCallback,
    ) -> ClientResult<()> {
        if notice.is_some() != data.is_some() {
            return Err(ClientError::Config(ConfigError::IncompleteClipboardCallbacks));
        }
        self.callbacks.clipboard_notice = notice;
        self.callbacks.clipboard_data = data;
        self.callbacks.clipboard_release = Some(release);
        self.callbacks.clipboard_request = Some(request);
        Ok(())
    }

    pub fn set_audio_callbacks(
        &mut self,
        start: AudioStartCallback,
        volume: Option<AudioVolumeCallback>,
        mute: Option<AudioMuteCallback>,
        stop: AudioStopCallback,
        data: AudioDataCallback,
    ) -> ClientResult<()> {
        self.callbacks.audio_start = Some(start);
        self.callbacks.audio_volume = volume;
        self.callbacks.audio_mute = mute;
        self.callbacks.audio_stop = Some(stop);
        self.callbacks.audio_data = Some(data);
        Ok(())
    }

    /// Main and inputs both have to be up before the session is usable for anything beyond the
    /// handshake itself.
    pub fn ready(&self) -> bool {
        self.main_ready && self.inputs.as_ref().map_or(false, |c| c.is_connected())
    }

    pub fn disconnect(&mut self) {
        self.main.close(DisconnectReason::UserRequested);
        if let Some(inputs) = &mut self.inputs {
            inputs.close(DisconnectReason::UserRequested);
        }
        if let Some(playback) = &mut self.playback {
            playback.close(DisconnectReason::UserRequested);
        }
    }

    pub fn channel_idle_for(&self, channel: ChannelType) -> Option<Duration> {
        let last_ingress = match channel {
            ChannelType::Main => self.main.last_ingress,
            ChannelType::Inputs => self.inputs.as_ref()?.last_ingress,
            ChannelType::Playback => self.playback.as_ref()?.last_ingress,
            _ => return None,
        };
        Some(last_ingress.elapsed())
    }

    /// Blocks on the event loop's single `mio::Poll` for up to `timeout`, drives every open
    /// channel's handshake/dispatch, and returns whatever notifications surfaced.
    pub fn process(&mut self, timeout: Duration) -> ClientResult<Vec<SessionEvent>> {
        self.poll.poll(&mut self.events, Some(timeout))?;

        let mut out = Vec::new();

        self.pump_main(&mut out)?;
        self.connect_pending_channels()?;
        self.pump_inputs(&mut out)?;
        self.pump_playback(&mut out)?;

        let _ = self.agent.pump_outbound(&mut self.main);

        Ok(out)
    }

    fn pump_main(&mut self, out: &mut Vec<SessionEvent>) -> ClientResult<()> {
        if !self.main.is_connected() {
            match self.main.drive_handshake() {
                Ok(true) => {
                    info!(self.log, "main channel connected");
                    self.main.send_attach_channels()?;
                }
                Ok(false) => {}
                Err(spice_protocol::NetworkError::Wait) => {}
                Err(err) => return Err(err.into()),
            }
            self.main.flush()?;
            return Ok(());
        }

        match self.main.receive() {
            Ok(_) => {}
            Err(spice_protocol::NetworkError::Wait) => {}
            Err(spice_protocol::NetworkError::Fatal(_)) => {
                self.main.close(DisconnectReason::PeerClosed);
                out.push(SessionEvent::Disconnected(DisconnectReason::PeerClosed));
                return Ok(());
            }
        }
        loop {
            match self.main.poll_message() {
                Ok(Some(event)) => self.handle_main_event(event, out)?,
                Ok(None) => break,
                Err(spice_protocol::NetworkError::Wait) => break,
                Err(err) => return Err(err.into()),
            }
        }
        self.main.flush()?;
        Ok(())
    }

    fn handle_main_event(&mut self, event: MainEvent, out: &mut Vec<SessionEvent>) -> ClientResult<()> {
        match event {
            MainEvent::Init(init) => {
                self.main_ready = true;
                self.session_id = init.session_id;
                self.agent.add_tokens(init.agent_tokens);
                info!(self.log, "main init"; "session_id" => init.session_id);
            }
            MainEvent::ChannelsList(channels) => {
                for descriptor in channels {
                    if let Some(channel_type) = descriptor_channel_type(&descriptor) {
                        match channel_type {
                            ChannelType::Inputs => {
                                self.pending_display_channels.push((channel_type, descriptor.channel_id));
                            }
                            ChannelType::Playback if self.playback_requested => {
                                self.pending_display_channels.push((channel_type, descriptor.channel_id));
                            }
                            _ => {}
                        }
                    }
                }
            }
            MainEvent::MouseMode(_mode) => {}
            MainEvent::MultiMediaTime(_time) => {}
            MainEvent::AgentConnected => {
                self.agent.reset();
            }
            MainEvent::AgentConnectedTokens(num_tokens) => {
                self.agent.reset();
                self.agent.add_tokens(num_tokens);
            }
            MainEvent::AgentDisconnected(_code) => {
                self.agent.clear_reassembly();
            }
            MainEvent::AgentData(data) => {
                self.agent.on_agent_data(data)?;
                self.drain_agent_messages(out);
            }
            MainEvent::AgentToken(count) => self.agent.add_tokens(count),
            MainEvent::Notify(message) => out.push(SessionEvent::Notify(message)),
            MainEvent::Disconnected => out.push(SessionEvent::Disconnected(DisconnectReason::PeerClosed)),
        }
        Ok(())
    }

    fn drain_agent_messages(&mut self, _out: &mut [SessionEvent]) {
        use spice_protocol::messages::agent::{AnnounceCapabilities, ClipboardData, ClipboardGrab, ClipboardRequest};
        use spice_protocol::messages::agent_msg;
        use spice_protocol::messages::AGENT_ANNOUNCE_MAX_SIZE;
        use spice_protocol::wire::Deserialize;
        use std::io::Cursor;

        // A selection-capable peer prefixes grab/request/data bodies with a 4-byte selection
        // preamble this client has no use for; skip it before decoding the rest of the body.
        let selection_preamble = if self.agent.clipboard_selection_supported() { 4 } else { 0 };

        while let Some((message_type, body)) = self.agent.poll_inbound() {
            match message_type {
                agent_msg::CLIPBOARD_GRAB => {
                    if body.len() < selection_preamble {
                        continue;
                    }
                    let mut cursor = Cursor::new(&body[selection_preamble..]);
                    if let Ok(grab) = ClipboardGrab::deserialize(&mut cursor) {
                        *self.agent.grabbed_types.lock().unwrap() = grab.types.clone();
                        // Selection-capable clipboard grab intentionally short-circuits the
                        // notice callback; Windows guests don't support per-selection clipboards
                        // so there's nothing useful to notify about here.
                        if !self.agent.clipboard_selection_supported() {
                            if let Some(notice) = &mut self.callbacks.clipboard_notice {
                                notice(&grab.types);
                            }
                        }
                    }
                }
                agent_msg::CLIPBOARD_REQUEST => {
                    if body.len() < selection_preamble {
                        continue;
                    }
                    let mut cursor = Cursor::new(&body[selection_preamble..]);
                    if let Ok(request) = ClipboardRequest::deserialize(&mut cursor) {
                        if let Some(cb) = &mut self.callbacks.clipboard_request {
                            cb(request.clipboard_type);
                        }
                    }
                }
                agent_msg::CLIPBOARD => {
                    if body.len() < selection_preamble {
                        continue;
                    }
                    let mut cursor = Cursor::new(&body[selection_preamble..]);
                    if let Ok(data) = ClipboardData::deserialize(&mut cursor) {
                        if let Some(cb) = &mut self.callbacks.clipboard_data {
                            cb(data.clipboard_type, data.data);
                        }
                    }
                }
                agent_msg::CLIPBOARD_RELEASE => {
                    self.agent.grabbed_types.lock().unwrap().clear();
                    if let Some(cb) = &mut self.callbacks.clipboard_release {
                        cb();
                    }
                }
                agent_msg::ANNOUNCE_CAPABILITIES => {
                    if body.len() > AGENT_ANNOUNCE_MAX_SIZE {
                        continue;
                    }
                    let mut cursor = Cursor::new(&body[..]);
                    if let Ok(caps) = AnnounceCapabilities::deserialize(&mut cursor) {
                        self.agent.set_capabilities(&caps.caps);
                        if caps.request {
                            let _ = self.agent.queue_capabilities_announcement();
                        }
                    }
                }
                _ => {}
            }
        }
    }

    fn connect_pending_channels(&mut self) -> ClientResult<()> {
        let pending = std::mem::take(&mut self.pending_display_channels);
        for (channel_type, channel_id) in pending {
            match channel_type {
                ChannelType::Inputs if self.inputs.is_none() => {
                    self.inputs = Some(self.open_channel::<Inputs>(INPUTS_TOKEN, channel_id)?);
                }
                ChannelType::Playback if self.playback.is_none() => {
                    self.playback = Some(self.open_channel::<Playback>(PLAYBACK_TOKEN, channel_id)?);
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn open_channel<K: ChannelKind>(&mut self, token: Token, channel_id: u8) -> ClientResult<crate::channel::ChannelState<K>> {
        let addr = (self.host.as_str(), self.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| ClientError::Io(std::io::Error::new(std::io::ErrorKind::AddrNotAvailable, "no address")))?;

        let mut transport = Transport::connect_tcp(addr)?;
        transport.register(self.poll.registry(), token, Interest::READABLE | Interest::WRITABLE)?;

        let channel = crate::channel::ChannelState::new(
            transport,
            self.session_id,
            channel_id,
            self.password.as_deref().map(Password::new),
            self.log.new(o!("channel" => token.0)),
        )?;
        Ok(channel)
    }

    fn pump_inputs(&mut self, _out: &mut [SessionEvent]) -> ClientResult<()> {
        let mouse = self.mouse.clone();
        let mut drop_channel = false;
        if let Some(inputs) = &mut self.inputs {
            if !inputs.is_connected() {
                match inputs.drive_handshake() {
                    Ok(_) => {}
                    Err(spice_protocol::NetworkError::Wait) => {}
                    Err(err) => return Err(err.into()),
                }
                inputs.flush()?;
                return Ok(());
            }

            match inputs.receive() {
                Ok(_) => {}
                Err(spice_protocol::NetworkError::Wait) => {}
                Err(spice_protocol::NetworkError::Fatal(_)) => drop_channel = true,
            }
            if !drop_channel {
                loop {
                    match inputs.poll_message(&mouse) {
                        Ok(Some(InputsEvent::Init(_))) | Ok(Some(InputsEvent::KeyModifiers(_))) | Ok(Some(InputsEvent::MouseMotionAck)) => {}
                        Ok(None) => break,
                        Err(spice_protocol::NetworkError::Wait) => break,
                        Err(err) => return Err(err.into()),
                    }
                }
                inputs.flush()?;
            }
        }
        if drop_channel {
            if let Some(inputs) = &mut self.inputs {
                inputs.close(DisconnectReason::PeerClosed);
            }
            self.inputs = None;
        }
        Ok(())
    }

    fn pump_playback(&mut self, _out: &mut [SessionEvent]) -> ClientResult<()> {
        let mut drop_channel = false;
        let mut events = Vec::new();
        if let Some(playback) = &mut self.playback {
            if !playback.is_connected() {
                match playback.drive_handshake() {
                    Ok(_) => {}
                    Err(spice_protocol::NetworkError::Wait) => {}
                    Err(err) => return Err(err.into()),
                }
                playback.flush()?;
                return Ok(());
            }

            match playback.receive() {
                Ok(_) => {}
                Err(spice_protocol::NetworkError::Wait) => {}
                Err(spice_protocol::NetworkError::Fatal(_)) => drop_channel = true,
            }
            if !drop_channel {
                loop {
                    match playback.poll_message() {
                        Ok(Some(event)) => events.push(event),
                        Ok(None) => break,
                        Err(spice_protocol::NetworkError::Wait) => break,
                        Err(err) => return Err(err.into()),
                    }
                }
            }
        }
        for event in events {
            self.handle_playback_event(event);
        }
        if !drop_channel {
            if let Some(playback) = &mut self.playback {
                playback.flush()?;
            }
        }
        if drop_channel {
            if let Some(playback) = &mut self.playback {
                playback.close(DisconnectReason::PeerClosed);
            }
            self.playback = None;
        }
        Ok(())
    }

    fn handle_playback_event(&mut self, event: PlaybackEvent) {
        match event {
            PlaybackEvent::Start { channels, frequency, mode, .. } => {
                if let Some(start) = &mut self.callbacks.audio_start {
                    start(channels, frequency, mode);
                }
            }
            PlaybackEvent::Data { time, samples } => {
                if let Some(data) = &mut self.callbacks.audio_data {
                    data(time, samples);
                }
            }
            PlaybackEvent::Stop => {
                if let Some(stop) = &mut self.callbacks.audio_stop {
                    stop();
                }
            }
            PlaybackEvent::Volume(channels) => {
                if let Some(volume) = &mut self.callbacks.audio_volume {
                    volume(channels);
                }
            }
            PlaybackEvent::Mute(mute) => {
                if let Some(cb) = &mut self.callbacks.audio_mute {
                    cb(mute);
                }
            }
        }
    }

    pub fn send_key_down(&mut self, scancode: u32) -> ClientResult<()> {
        self.inputs
            .as_mut()
            .ok_or_else(no_inputs_channel)?
            .send_key_down(scancode)
            .map_err(Into::into)
    }

    pub fn send_key_up(&mut self, scancode: u32) -> ClientResult<()> {
        self.inputs
            .as_mut()
            .ok_or_else(no_inputs_channel)?
            .send_key_up(scancode)
            .map_err(Into::into)
    }

    pub fn send_mouse_motion(&mut self, dx: i32, dy: i32) -> ClientResult<()> {
        let mouse = self.mouse.clone();
        self.inputs
            .as_mut()
            .ok_or_else(no_inputs_channel)?
            .send_mouse_motion(dx, dy, &mouse)
            .map_err(Into::into)
    }

    pub fn send_mouse_press(&mut self, button: MouseButton) -> ClientResult<()> {
        let mouse = self.mouse.clone();
        self.inputs
            .as_mut()
            .ok_or_else(no_inputs_channel)?
            .send_mouse_press(button, &mouse)
            .map_err(Into::into)
    }

    pub fn send_mouse_release(&mut self, button: MouseButton) -> ClientResult<()> {
        let mouse = self.mouse.clone();
        self.inputs
            .as_mut()
            .ok_or_else(no_inputs_channel)?
            .send_mouse_release(button, &mouse)
            .map_err(Into::into)
    }
}

fn no_inputs_channel() -> ClientError {
    ClientError::Config(ConfigError::ChannelNotConnected)
}
