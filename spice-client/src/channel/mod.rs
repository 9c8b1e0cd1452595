//! Shared channel machinery: the link handshake, the framed read/write buffers, and the common
//! message handling (ack windows, ping/pong, notify, disconnecting) that every channel type
//! shares regardless of what it does with its own type-specific messages.

pub mod inputs;
pub mod main;
pub mod playback;

use crate::buffer::Buffer;
use crate::error::DisconnectReason;
use crate::link::LinkNegotiator;
use crate::transport::Transport;
use slog::{debug, warn};
use spice_protocol::error::{ErrorType, NetworkError, NetworkResult};
use spice_protocol::header::MiniHeader;
use spice_protocol::link::ChannelType;
use spice_protocol::messages::common::{AckSync, Disconnecting, Notify, Ping, Pong, SetAck};
use spice_protocol::messages::msg;
use spice_protocol::wire::{Deserialize, Serialize};
use spice_protocol::PROTOCOL_COMMON_CAPS;
use spice_protocol::crypto::Password;
use std::io::Cursor;
use std::time::Instant;

pub const READ_BUF_SIZE: usize = 65536;
pub const WRITE_BUF_SIZE: usize = 65536;

pub trait ChannelKind {
    const CHANNEL_TYPE: ChannelType;

    fn channel_caps() -> Vec<u32> {
        Vec::new()
    }
}

pub struct Main;
impl ChannelKind for Main {
    const CHANNEL_TYPE: ChannelType = ChannelType::Main;

    fn channel_caps() -> Vec<u32> {
        vec![1 << spice_protocol::link::SPICE_MAIN_CAP_AGENT_CONNECTED_TOKENS]
    }
}

pub struct Inputs;
impl ChannelKind for Inputs {
    const CHANNEL_TYPE: ChannelType = ChannelType::Inputs;
}

pub struct Playback;
impl ChannelKind for Playback {
    const CHANNEL_TYPE: ChannelType = ChannelType::Playback;
}

/// Outcome of feeding a common message through the shared dispatcher. Channel-specific code
/// only sees messages this returns `None` for (i.e. everything it must handle itself).
pub enum CommonEvent {
    Notify(Notify),
    Disconnected(DisconnectReason),
}

enum State {
    Handshaking(LinkNegotiator),
    Connected,
    Closed,
}

pub struct ChannelState<K> {
    _kind: std::marker::PhantomData<K>,
    pub transport: Transport,
    state: State,
    read_buffer: Buffer,
    write_buffer: Buffer,
    ack_frequency: u32,
    ack_count: u32,
    ack_generation: u32,
    pub last_ingress: Instant,
    log: slog::Logger,
}

impl<K: ChannelKind> ChannelState<K> {
    pub fn new(
        transport: Transport,
        connection_id: u32,
        channel_id: u8,
        password: Option<Password>,
        log: slog::Logger,
    ) -> NetworkResult<ChannelState<K>> {
        let negotiator = LinkNegotiator::new(
            connection_id,
            K::CHANNEL_TYPE,
            channel_id,
            PROTOCOL_COMMON_CAPS.to_vec(),
            K::channel_caps(),
            password,
        )?;

        Ok(ChannelState {
            _kind: std::marker::PhantomData,
            transport,
            state: State::Handshaking(negotiator),
            read_buffer: Buffer::new(READ_BUF_SIZE),
            write_buffer: Buffer::new(WRITE_BUF_SIZE),
            ack_frequency: 0,
            ack_count: 0,
            ack_generation: 0,
            last_ingress: Instant::now(),
            log,
        })
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, State::Connected)
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, State::Closed)
    }

    /// Drives the handshake; returns `true` once the channel has transitioned to `Connected`.
    pub fn drive_handshake(&mut self) -> NetworkResult<bool> {
        let done = match &mut self.state {
            State::Handshaking(negotiator) => negotiator.poll(&mut self.transport, &self.log)?,
            State::Connected => return Ok(true),
            State::Closed => return Err(NetworkError::Fatal(ErrorType::Io(std::io::ErrorKind::NotConnected))),
        };

        if done {
            self.state = State::Connected;
        }
        Ok(done)
    }

    pub fn close(&mut self, reason: DisconnectReason) {
        debug!(self.log, "channel closing"; "reason" => ?reason);
        self.state = State::Closed;
    }

    /// Shuts down only the write half of the transport, e.g. in response to the server's
    /// `disconnecting`. The protocol still permits trailing reads afterwards, so `receive()`
    /// keeps working; only `flush()`/`send_message()` become pointless.
    fn shutdown_write(&mut self) {
        if let Err(err) = self.transport.shutdown_write() {
            debug!(self.log, "write shutdown failed"; "error" => %err);
        }
    }

    /// Pulls as much as is available off the socket into the read buffer. Returns the number
    /// of bytes read; `NetworkError::Wait` means nothing new arrived this tick.
    pub fn receive(&mut self) -> NetworkResult<usize> {
        let count = self.read_buffer.ingress(&mut self.transport)?;
        if count > 0 {
            self.last_ingress = Instant::now();
        }
        Ok(count)
    }

    /// Flushes as much of the write buffer as the socket will currently accept.
    pub fn flush(&mut self) -> NetworkResult<usize> {
        Ok(self.write_buffer.egress(&mut self.transport)?)
    }

    fn queue_message<S: Serialize>(&mut self, msg_type: u16, message: &S) -> NetworkResult<()> {
        let mut body_cursor = Cursor::new(Vec::new());
        message.serialize(&mut body_cursor)?;
        let body = body_cursor.into_inner();

        let header = MiniHeader::new(msg_type, body.len() as u32);
        let total = spice_protocol::header::MINI_HEADER_SIZE + body.len();

        if self.write_buffer.free_capacity() < total {
            return Err(NetworkError::Wait);
        }

        let slice = self.write_buffer.write_slice();
        {
            let mut cursor = Cursor::new(&mut slice[..total]);
            header.write(&mut cursor)?;
            std::io::Write::write_all(&mut cursor, &body)?;
        }
        self.write_buffer.move_tail(total);
        Ok(())
    }

    /// Reads one framed message header + body out of the read buffer if a full message is
    /// present, without consuming it from the buffer. Returns `None` if a full message hasn't
    /// arrived yet.
    fn peek_message(&self) -> NetworkResult<Option<(MiniHeader, &[u8])>> {
        let data = self.read_buffer.read_slice();
        let mut cursor = Cursor::new(data);
        match MiniHeader::read(&mut cursor) {
            Ok(header) => {
                let start = cursor.position() as usize;
                let end = start + header.msg_size as usize;
                if data.len() < end {
                    return Ok(None);
                }
                Ok(Some((header, &data[start..end])))
            }
            Err(NetworkError::Wait) => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn consume_message(&mut self, total_len: usize) {
        self.read_buffer.move_head(total_len);
    }

    /// Pulls and handles every complete common message at the front of the read buffer,
    /// returning the channel-specific messages (still framed) that remain for the caller.
    ///
    /// On each call this consumes exactly the messages it recognizes as common; a
    /// channel-specific message is left in the buffer and reported back via `Some`, so the
    /// caller's own message loop alternates with this one message at a time.
    pub fn poll_common(&mut self) -> NetworkResult<Option<(u16, Vec<u8>)>> {
        loop {
            let (header, body_len) = match self.peek_message()? {
                Some((header, body)) => (MiniHeader::new(header.msg_type, header.msg_size), body.len()),
                None => return Ok(None),
            };

            let total_len = spice_protocol::header::MINI_HEADER_SIZE + body_len;

            match header.msg_type {
                msg::SET_ACK => {
                    let body = self.message_body(total_len);
                    let set_ack = SetAck::deserialize(&mut Cursor::new(&body[..]))?;
                    self.ack_generation = set_ack.generation;
                    self.ack_frequency = set_ack.window;
                    self.ack_count = 0;
                    self.consume_message(total_len);
                    self.queue_message(spice_protocol::messages::msgc::ACK_SYNC, &AckSync { generation: set_ack.generation })?;
                }
                msg::PING => {
                    let body = self.message_body(total_len);
                    let ping = Ping::deserialize(&mut Cursor::new(&body[..]))?;
                    self.consume_message(total_len);
                    let pong = Pong::from_ping(&ping);
                    self.queue_message(spice_protocol::messages::msgc::PONG, &pong)?;
                }
                msg::NOTIFY => {
                    let body = self.message_body(total_len);
                    let notify = Notify::deserialize(&mut Cursor::new(&body[..]))?;
                    self.consume_message(total_len);
                    warn!(self.log, "server notify"; "message" => %notify.message);
                    return Ok(Some((msg::NOTIFY, body)));
                }
                msg::DISCONNECTING => {
                    let body = self.message_body(total_len);
                    let _disconnecting = Disconnecting::deserialize(&mut Cursor::new(&body[..]))?;
                    self.consume_message(total_len);
                    // The server is still entitled to trailing reads after this; only the write
                    // side goes away.
                    self.shutdown_write();
                    return Ok(Some((msg::DISCONNECTING, body)));
                }
                msg::MIGRATE | msg::MIGRATE_DATA | msg::WAIT_FOR_CHANNELS => {
                    // Migration is not implemented by this client; the message is consumed and
                    // dropped so it doesn't wedge the channel-specific dispatcher behind it.
                    self.consume_message(total_len);
                }
                _ => {
                    let body = self.message_body(total_len);
                    self.consume_message(total_len);
                    return Ok(Some((header.msg_type, body)));
                }
            }
        }
    }

    fn message_body(&self, total_len: usize) -> Vec<u8> {
        let data = self.read_buffer.read_slice();
        data[spice_protocol::header::MINI_HEADER_SIZE..total_len].to_vec()
    }

    /// Call after fully processing one channel-specific data message to advance the ack
    /// window; queues an `Ack` once `ack_frequency` messages have been counted.
    pub fn note_data_message(&mut self) -> NetworkResult<()> {
        if self.ack_frequency == 0 {
            return Ok(());
        }

        self.ack_count += 1;
        if self.ack_count == self.ack_frequency {
            self.ack_count = 0;
            self.queue_message(spice_protocol::messages::msgc::ACK, &spice_protocol::messages::common::Ack)?;
        }
        Ok(())
    }

    pub fn send_message<S: Serialize>(&mut self, msg_type: u16, message: &S) -> NetworkResult<()> {
        self.queue_message(msg_type, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::WriteBytesExt;
    use spice_protocol::messages::common::AckSync;
    use spice_protocol::messages::msgc;
    use std::os::unix::net::UnixStream as StdUnixStream;

    fn test_logger() -> slog::Logger {
        slog::Logger::root(slog::Discard, slog::o!())
    }

    /// A connected-enough channel for exercising buffer-level logic directly, bypassing the
    /// link handshake. The socket side is a real connected pair so `Transport` has something
    /// live to hold; none of these tests actually read or write through it.
    fn connected_channel() -> ChannelState<Main> {
        let (local, _peer) = StdUnixStream::pair().unwrap();
        local.set_nonblocking(true).unwrap();
        let transport = Transport::Unix(mio::net::UnixStream::from_std(local));
        let mut channel = ChannelState::<Main>::new(transport, 1, 0, None, test_logger()).unwrap();
        channel.state = State::Connected;
        channel
    }

    fn push_framed(channel: &mut ChannelState<Main>, msg_type: u16, body: &[u8]) {
        let header = MiniHeader::new(msg_type, body.len() as u32);
        let mut cursor = Cursor::new(Vec::new());
        header.write(&mut cursor).unwrap();
        let mut framed = cursor.into_inner();
        framed.extend_from_slice(body);
        channel.read_buffer.write_slice()[..framed.len()].copy_from_slice(&framed);
        channel.read_buffer.move_tail(framed.len());
    }

    #[test]
    fn set_ack_updates_window_and_queues_ack_sync() {
        let mut channel = connected_channel();

        let set_ack = SetAck { generation: 7, window: 2 };
        let mut body = Cursor::new(Vec::new());
        set_ack.serialize(&mut body).unwrap();
        push_framed(&mut channel, msg::SET_ACK, &body.into_inner());

        let result = channel.poll_common().unwrap();
        assert!(result.is_none());
        assert_eq!(channel.ack_generation, 7);
        assert_eq!(channel.ack_frequency, 2);
        assert_eq!(channel.ack_count, 0);
        assert!(channel.write_buffer.len() > 0, "ack_sync reply should be queued");
    }

    #[test]
    fn note_data_message_emits_ack_only_at_window_boundary() {
        let mut channel = connected_channel();
        channel.ack_frequency = 2;

        channel.note_data_message().unwrap();
        assert_eq!(channel.write_buffer.len(), 0, "no ack queued before the window is reached");

        channel.note_data_message().unwrap();
        assert!(channel.write_buffer.len() > 0, "ack queued once the window boundary is hit");
        assert_eq!(channel.ack_count, 0);
    }

    #[test]
    fn note_data_message_is_a_no_op_with_no_ack_window() {
        let mut channel = connected_channel();
        assert_eq!(channel.ack_frequency, 0);

        channel.note_data_message().unwrap();
        assert_eq!(channel.write_buffer.len(), 0);
    }

    #[test]
    fn channel_specific_message_passes_through_poll_common() {
        let mut channel = connected_channel();
        push_framed(&mut channel, 1000, &[1, 2, 3]);

        let (msg_type, body) = channel.poll_common().unwrap().unwrap();
        assert_eq!(msg_type, 1000);
        assert_eq!(body, vec![1, 2, 3]);
    }

    #[test]
    fn notify_is_logged_and_surfaced_to_the_caller() {
        let mut channel = connected_channel();

        let mut body = Vec::new();
        body.write_u32::<byteorder::LittleEndian>(2).unwrap(); // severity = error
        body.write_u32::<byteorder::LittleEndian>(0).unwrap(); // visibility
        body.write_u32::<byteorder::LittleEndian>(0).unwrap(); // what
        let text = b"server going away\0";
        body.write_u32::<byteorder::LittleEndian>(text.len() as u32).unwrap();
        std::io::Write::write_all(&mut body, text).unwrap();

        push_framed(&mut channel, msg::NOTIFY, &body);

        let (msg_type, returned_body) = channel.poll_common().unwrap().unwrap();
        assert_eq!(msg_type, msg::NOTIFY);
        assert_eq!(returned_body, body);
    }

    #[test]
    fn disconnecting_half_shuts_down_without_closing_the_channel() {
        let mut channel = connected_channel();

        let mut body = Vec::new();
        body.write_u64::<byteorder::LittleEndian>(0).unwrap();
        body.write_u32::<byteorder::LittleEndian>(0).unwrap();
        push_framed(&mut channel, msg::DISCONNECTING, &body);

        let (msg_type, _) = channel.poll_common().unwrap().unwrap();
        assert_eq!(msg_type, msg::DISCONNECTING);
        // The channel itself is not torn down; the protocol still permits trailing reads.
        assert!(channel.is_connected());
    }

    #[test]
    fn queue_message_reports_wait_when_buffer_has_no_room() {
        let mut channel = connected_channel();
        let filler = vec![0u8; WRITE_BUF_SIZE - 4];
        channel.write_buffer.write_slice()[..filler.len()].copy_from_slice(&filler);
        channel.write_buffer.move_tail(filler.len());

        let result = channel.queue_message(msgc::ACK_SYNC, &AckSync { generation: 1 });
        assert_eq!(result.unwrap_err(), NetworkError::Wait);
    }
}
