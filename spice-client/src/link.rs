//! Incremental, non-blocking link handshake. Each call to [`LinkNegotiator::poll`] pushes the
//! handshake forward as far as the current readiness allows and returns `NetworkError::Wait`
//! when it would otherwise block; the event loop keeps calling it on readiness without ever
//! blocking the thread.

use slog::debug;
use spice_protocol::crypto::{self, Password};
use spice_protocol::error::{ErrorType, NetworkError, NetworkResult};
use spice_protocol::link::{
    ChannelType, LinkAuthMechanism, SpiceLinkHeader, SpiceLinkMess, SpiceLinkReply, AUTH_MECHANISM_SPICE,
    LINK_HEADER_SIZE, SPICE_LINK_ERR_OK,
};
use std::io::{Read, Write};

enum Phase {
    SendLink,
    ReadReplyHeader,
    ReadReplyBody { size: usize },
    SendAuth,
    ReadAuthStatus,
    Done,
}

pub struct LinkNegotiator {
    phase: Phase,
    out_buf: Vec<u8>,
    out_sent: usize,
    in_buf: Vec<u8>,
    in_filled: usize,
    password: Option<Password>,
    pub common_caps: Vec<u32>,
    pub channel_caps: Vec<u32>,
}

impl LinkNegotiator {
    pub fn new(
        connection_id: u32,
        channel_type: ChannelType,
        channel_id: u8,
        common_caps: Vec<u32>,
        channel_caps: Vec<u32>,
        password: Option<Password>,
    ) -> NetworkResult<LinkNegotiator> {
        let mess = SpiceLinkMess {
            connection_id,
            channel_type,
            channel_id,
            common_caps: common_caps.clone(),
            channel_caps: channel_caps.clone(),
        };
        let header = SpiceLinkHeader::new(mess.encoded_size());

        let mut out_buf = Vec::new();
        header.write(&mut out_buf)?;
        mess.write(&mut out_buf)?;

        Ok(LinkNegotiator {
            phase: Phase::SendLink,
            out_buf,
            out_sent: 0,
            in_buf: vec![0u8; LINK_HEADER_SIZE],
            in_filled: 0,
            password,
            common_caps,
            channel_caps,
        })
    }

    pub fn is_done(&self) -> bool {
        matches!(self.phase, Phase::Done)
    }

    /// Drives the handshake forward as far as the socket currently allows. Returns `Ok(true)`
    /// once the handshake has fully completed.
    pub fn poll<S: Read + Write>(&mut self, stream: &mut S, log: &slog::Logger) -> NetworkResult<bool> {
        loop {
            match self.phase {
                Phase::SendLink => {
                    self.send(stream)?;
                    debug!(log, "link message sent");
                    self.in_buf = vec![0u8; LINK_HEADER_SIZE];
                    self.in_filled = 0;
                    self.phase = Phase::ReadReplyHeader;
                }
                Phase::ReadReplyHeader => {
                    self.recv(stream)?;
                    let header = SpiceLinkHeader::read(&self.in_buf[..])?;
                    debug!(log, "link reply header received"; "size" => header.size);
                    self.in_buf = vec![0u8; header.size as usize];
                    self.in_filled = 0;
                    self.phase = Phase::ReadReplyBody { size: header.size as usize };
                }
                Phase::ReadReplyBody { .. } => {
                    self.recv(stream)?;
                    let reply = SpiceLinkReply::parse(&self.in_buf)?;
                    self.common_caps = reply.common_caps.clone();
                    self.channel_caps = reply.channel_caps.clone();

                    // An absent password still has to complete the auth step with an empty
                    // ciphertext; the server is the one deciding whether that's acceptable.
                    let password = self.password.take().unwrap_or_else(|| Password::new(""));
                    let ciphertext = crypto::encrypt_password(&password, &reply.pub_key)?;

                    let mut out_buf = Vec::new();
                    LinkAuthMechanism { auth_mechanism: AUTH_MECHANISM_SPICE }.write(&mut out_buf)?;
                    out_buf.extend_from_slice(&ciphertext);
                    self.out_buf = out_buf;
                    self.out_sent = 0;
                    self.phase = Phase::SendAuth;
                }
                Phase::SendAuth => {
                    self.send(stream)?;
                    debug!(log, "auth sent");
                    self.in_buf = vec![0u8; 4];
                    self.in_filled = 0;
                    self.phase = Phase::ReadAuthStatus;
                }
                Phase::ReadAuthStatus => {
                    self.recv(stream)?;
                    let status = u32::from_le_bytes([self.in_buf[0], self.in_buf[1], self.in_buf[2], self.in_buf[3]]);
                    debug!(log, "link auth status received"; "status" => status);
                    if status != SPICE_LINK_ERR_OK {
                        return Err(NetworkError::Fatal(ErrorType::ServerError(status)));
                    }
                    self.phase = Phase::Done;
                    return Ok(true);
                }
                Phase::Done => return Ok(true),
            }
        }
    }

    fn send<S: Write>(&mut self, stream: &mut S) -> NetworkResult<()> {
        while self.out_sent < self.out_buf.len() {
            match stream.write(&self.out_buf[self.out_sent..]) {
                Ok(0) => return Err(NetworkError::Fatal(ErrorType::Io(std::io::ErrorKind::WriteZero))),
                Ok(n) => self.out_sent += n,
                Err(err) => return Err(err.into()),
            }
        }
        self.out_sent = 0;
        self.out_buf.clear();
        Ok(())
    }

    fn recv<S: Read>(&mut self, stream: &mut S) -> NetworkResult<()> {
        while self.in_filled < self.in_buf.len() {
            match stream.read(&mut self.in_buf[self.in_filled..]) {
                Ok(0) => return Err(NetworkError::Fatal(ErrorType::Io(std::io::ErrorKind::UnexpectedEof))),
                Ok(n) => self.in_filled += n,
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slog::{o, Discard, Logger};
    use spice_protocol::link::{RSA_PUB_KEY_SIZE, LINK_REPLY_FIXED_SIZE};
    use std::cmp::min;
    use std::collections::VecDeque;

    fn test_logger() -> Logger {
        Logger::root(Discard, o!())
    }

    /// Drip-feeds reads in small chunks and records every byte written, to exercise the
    /// negotiator's partial-read/partial-write accounting the way a non-blocking socket would.
    struct MockStream {
        inbound: VecDeque<u8>,
        chunk: usize,
        pub outbound: Vec<u8>,
    }

    impl MockStream {
        fn new(inbound: Vec<u8>, chunk: usize) -> MockStream {
            MockStream { inbound: inbound.into(), chunk, outbound: Vec::new() }
        }
    }

    impl Read for MockStream {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.inbound.is_empty() {
                return Err(std::io::ErrorKind::WouldBlock.into());
            }
            let count = min(min(self.chunk, buf.len()), self.inbound.len());
            for slot in buf.iter_mut().take(count) {
                *slot = self.inbound.pop_front().unwrap();
            }
            Ok(count)
        }
    }

    impl Write for MockStream {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            let count = min(self.chunk, buf.len());
            self.outbound.extend_from_slice(&buf[..count]);
            Ok(count)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn fake_reply(common_caps: &[u32], channel_caps: &[u32]) -> Vec<u8> {
        use byteorder::{LittleEndian, WriteBytesExt};

        let mut body = Vec::new();
        body.write_u32::<LittleEndian>(0).unwrap(); // error_code
        body.extend(vec![0u8; RSA_PUB_KEY_SIZE]);
        body.write_u32::<LittleEndian>(common_caps.len() as u32).unwrap();
        body.write_u32::<LittleEndian>(channel_caps.len() as u32).unwrap();
        body.write_u32::<LittleEndian>(0).unwrap(); // caps_offset, unused by this client
        for cap in common_caps {
            body.write_u32::<LittleEndian>(*cap).unwrap();
        }
        for cap in channel_caps {
            body.write_u32::<LittleEndian>(*cap).unwrap();
        }
        assert!(body.len() >= LINK_REPLY_FIXED_SIZE);

        let header = SpiceLinkHeader::new(body.len() as u32);
        let mut wire = Vec::new();
        header.write(&mut wire).unwrap();
        wire.extend(body);
        wire
    }

    #[test]
    fn completes_without_password_when_none_supplied() {
        let mut wire = fake_reply(&[1], &[]);
        wire.extend_from_slice(&0u32.to_le_bytes()); // final link status: OK
        let mut stream = MockStream::new(wire, 7);
        let mut negotiator = LinkNegotiator::new(1, ChannelType::Main, 0, vec![1], vec![], None).unwrap();

        let log = test_logger();
        loop {
            match negotiator.poll(&mut stream, &log) {
                Ok(true) => break,
                Ok(false) => continue,
                Err(NetworkError::Wait) => continue,
                Err(err) => panic!("unexpected error: {:?}", err),
            }
        }

        assert!(negotiator.is_done(), "negotiator should report done once poll returns Ok(true)");
        assert_eq!(negotiator.common_caps, vec![1]);
        assert!(!stream.outbound.is_empty());
    }

    #[test]
    fn surfaces_server_error_code_as_fatal() {
        let mut body = vec![0u8; LINK_REPLY_FIXED_SIZE];
        body[0] = 1; // error_code = 1
        let header = SpiceLinkHeader::new(body.len() as u32);
        let mut wire = Vec::new();
        header.write(&mut wire).unwrap();
        wire.extend(body);

        let mut stream = MockStream::new(wire, LINK_REPLY_FIXED_SIZE + 16);
        let mut negotiator = LinkNegotiator::new(1, ChannelType::Main, 0, vec![], vec![], None).unwrap();

        let log = test_logger();
        let result = loop {
            match negotiator.poll(&mut stream, &log) {
                Err(NetworkError::Wait) => continue,
                other => break other,
            }
        };

        assert!(matches!(result, Err(NetworkError::Fatal(ErrorType::ServerError(1)))));
    }
}
