//! The agent tunnel: outbound messages are token-bucket throttled and fragmented into
//! `AGENT_MAX_DATA_SIZE` chunks sent as main-channel `AgentData` frames; inbound chunks are
//! reassembled back into whole agent messages before being handed to the clipboard/mouse-mode
//! callbacks.

use crate::channel::main::MainChannel;
use spice_protocol::error::NetworkResult;
use spice_protocol::messages::agent::{AgentMessageHeader, ClipboardType, AGENT_MSG_HEADER_SIZE, AGENT_PROTOCOL};
use spice_protocol::messages::{
    agent_msg, AGENT_CAP_CLIPBOARD_BY_DEMAND, AGENT_CAP_CLIPBOARD_SELECTION, AGENT_MAX_DATA_SIZE,
};
use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Mutex;

struct Reassembly {
    awaiting_header: bool,
    message_type: u32,
    expected: usize,
    buf: Vec<u8>,
}

impl Reassembly {
    fn new() -> Reassembly {
        Reassembly {
            awaiting_header: true,
            message_type: 0,
            expected: 0,
            buf: Vec::new(),
        }
    }
}

pub struct AgentState {
    tokens: AtomicI64,
    outbound_chunks: Mutex<VecDeque<Vec<u8>>>,
    inbound: Mutex<Reassembly>,
    completed: Mutex<VecDeque<(u32, Vec<u8>)>>,
    pub grabbed_types: Mutex<Vec<ClipboardType>>,
    cb_supported: AtomicBool,
    cb_selection: AtomicBool,
}

impl AgentState {
    pub fn new() -> AgentState {
        AgentState {
            tokens: AtomicI64::new(0),
            outbound_chunks: Mutex::new(VecDeque::new()),
            inbound: Mutex::new(Reassembly::new()),
            completed: Mutex::new(VecDeque::new()),
            grabbed_types: Mutex::new(Vec::new()),
            cb_supported: AtomicBool::new(false),
            cb_selection: AtomicBool::new(false),
        }
    }

    pub fn add_tokens(&self, count: u32) {
        self.tokens.fetch_add(count as i64, Ordering::SeqCst);
    }

    /// (Re)initializes the agent tunnel: drops any in-flight reassembly state, queued outbound
    /// chunks and completed messages, and forgets what clipboard types were previously grabbed.
    /// Called whenever the server (re)announces the agent as connected.
    pub fn reset(&self) {
        self.clear_reassembly();
        self.outbound_chunks.lock().unwrap().clear();
        self.completed.lock().unwrap().clear();
        self.grabbed_types.lock().unwrap().clear();
    }

    /// Drops any partially-reassembled inbound message, e.g. because the agent disconnected
    /// mid-message.
    pub fn clear_reassembly(&self) {
        *self.inbound.lock().unwrap() = Reassembly::new();
    }

    /// Records the peer's advertised capability bitset (the first word of an
    /// `announce-capabilities` message) and returns whether it asked for a reply.
    pub fn set_capabilities(&self, caps: &[u32]) {
        let word = caps.first().copied().unwrap_or(0);
        self.cb_supported.store(word & (1 << AGENT_CAP_CLIPBOARD_BY_DEMAND) != 0, Ordering::SeqCst);
        self.cb_selection.store(word & (1 << AGENT_CAP_CLIPBOARD_SELECTION) != 0, Ordering::SeqCst);
    }

    pub fn clipboard_by_demand_supported(&self) -> bool {
        self.cb_supported.load(Ordering::SeqCst)
    }

    pub fn clipboard_selection_supported(&self) -> bool {
        self.cb_selection.load(Ordering::SeqCst)
    }

    /// Queues this client's own capability announcement, optionally in reply to a peer request.
    pub fn queue_capabilities_announcement(&self) -> NetworkResult<()> {
        let caps: u32 = (1 << AGENT_CAP_CLIPBOARD_BY_DEMAND) | (1 << AGENT_CAP_CLIPBOARD_SELECTION);
        let mut body = Vec::new();
        body.extend_from_slice(&0u32.to_le_bytes()); // request = false
        body.extend_from_slice(&caps.to_le_bytes());
        self.queue_outbound(agent_msg::ANNOUNCE_CAPABILITIES, body)
    }

    /// Builds a full agent-protocol message (header + body), splits it into
    /// `AGENT_MAX_DATA_SIZE` chunks and enqueues them for transmission.
    pub fn queue_outbound(&self, message_type: u32, body: Vec<u8>) -> NetworkResult<()> {
        let header = AgentMessageHeader {
            protocol: AGENT_PROTOCOL,
            message_type,
            opaque: 0,
            data_size: body.len() as u32,
        };
        let mut cursor = Cursor::new(Vec::with_capacity(AGENT_MSG_HEADER_SIZE + body.len()));
        header.write(&mut cursor)?;
        let mut framed = cursor.into_inner();
        framed.extend_from_slice(&body);

        let mut chunks = self.outbound_chunks.lock().unwrap();
        for chunk in framed.chunks(AGENT_MAX_DATA_SIZE) {
            chunks.push_back(chunk.to_vec());
        }
        Ok(())
    }

    pub fn queue_clipboard_grab(&self, types: Vec<ClipboardType>) -> NetworkResult<()> {
        let mut body = Vec::new();
        for t in &types {
            body.extend_from_slice(&(*t as u32).to_le_bytes());
        }
        self.queue_outbound(agent_msg::CLIPBOARD_GRAB, body)
    }

    pub fn queue_clipboard_request(&self, clipboard_type: ClipboardType) -> NetworkResult<()> {
        self.queue_outbound(agent_msg::CLIPBOARD_REQUEST, (clipboard_type as u32).to_le_bytes().to_vec())
    }

    pub fn queue_clipboard_release(&self) -> NetworkResult<()> {
        self.queue_outbound(agent_msg::CLIPBOARD_RELEASE, Vec::new())
    }

    pub fn queue_clipboard_data(&self, clipboard_type: ClipboardType, data: Vec<u8>) -> NetworkResult<()> {
        let mut body = (clipboard_type as u32).to_le_bytes().to_vec();
        body.extend_from_slice(&data);
        self.queue_outbound(agent_msg::CLIPBOARD, body)
    }

    /// Sends at most one pending chunk if a token is available. Returns `true` if a chunk was
    /// sent.
    pub fn pump_outbound(&self, main: &mut MainChannel) -> NetworkResult<bool> {
        if self.tokens.load(Ordering::SeqCst) <= 0 {
            return Ok(false);
        }

        let chunk = {
            let mut chunks = self.outbound_chunks.lock().unwrap();
            chunks.pop_front()
        };

        match chunk {
            Some(chunk) => {
                main.send_agent_data(chunk)?;
                self.tokens.fetch_sub(1, Ordering::SeqCst);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Feeds a raw `AgentData` chunk into the reassembly buffer, completing zero or more whole
    /// agent messages (a chunk boundary need not line up with a message boundary). Fails the
    /// connection if a header turns up advertising a protocol this client doesn't understand.
    pub fn on_agent_data(&self, bytes: Vec<u8>) -> NetworkResult<()> {
        let mut inbound = self.inbound.lock().unwrap();
        inbound.buf.extend_from_slice(&bytes);

        loop {
            if inbound.awaiting_header {
                if inbound.buf.len() < AGENT_MSG_HEADER_SIZE {
                    break;
                }
                let header_bytes: Vec<u8> = inbound.buf.drain(..AGENT_MSG_HEADER_SIZE).collect();
                let mut cursor = Cursor::new(&header_bytes[..]);
                let header = AgentMessageHeader::read(&mut cursor)?;
                inbound.message_type = header.message_type;
                inbound.expected = header.data_size as usize;
                inbound.awaiting_header = false;
            } else {
                if inbound.buf.len() < inbound.expected {
                    break;
                }
                let expected = inbound.expected;
                let body: Vec<u8> = inbound.buf.drain(..expected).collect();
                let message_type = inbound.message_type;
                inbound.awaiting_header = true;
                self.completed.lock().unwrap().push_back((message_type, body));
            }
        }
        Ok(())
    }

    pub fn poll_inbound(&self) -> Option<(u32, Vec<u8>)> {
        self.completed.lock().unwrap().pop_front()
    }
}

impl Default for AgentState {
    fn default() -> AgentState {
        AgentState::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reassembles_a_message_split_across_two_chunks() {
        let agent = AgentState::new();
        let header = AgentMessageHeader {
            protocol: AGENT_PROTOCOL,
            message_type: agent_msg::CLIPBOARD_RELEASE,
            opaque: 0,
            data_size: 4,
        };
        let mut cursor = Cursor::new(Vec::new());
        header.write(&mut cursor).unwrap();
        let mut framed = cursor.into_inner();
        framed.extend_from_slice(&[1, 2, 3, 4]);

        agent.on_agent_data(framed[..16].to_vec()).unwrap();
        assert!(agent.poll_inbound().is_none());

        agent.on_agent_data(framed[16..].to_vec()).unwrap();
        let (message_type, body) = agent.poll_inbound().unwrap();
        assert_eq!(message_type, agent_msg::CLIPBOARD_RELEASE);
        assert_eq!(body, vec![1, 2, 3, 4]);
    }

    #[test]
    fn rejects_header_advertising_unknown_protocol() {
        let agent = AgentState::new();
        let header = AgentMessageHeader {
            protocol: AGENT_PROTOCOL + 1,
            message_type: agent_msg::CLIPBOARD_RELEASE,
            opaque: 0,
            data_size: 0,
        };
        let mut cursor = Cursor::new(Vec::new());
        header.write(&mut cursor).unwrap();
        let framed = cursor.into_inner();

        let err = agent.on_agent_data(framed).unwrap_err();
        assert!(matches!(
            err,
            spice_protocol::error::NetworkError::Fatal(spice_protocol::error::ErrorType::ProtocolMismatch)
        ));
    }

    #[test]
    fn large_outbound_message_is_chunked() {
        let agent = AgentState::new();
        let body = vec![0u8; AGENT_MAX_DATA_SIZE * 2 + 10];
        agent.queue_outbound(agent_msg::CLIPBOARD, body).unwrap();

        let chunk_count = agent.outbound_chunks.lock().unwrap().len();
        assert_eq!(chunk_count, 3);
    }

    #[test]
    fn pump_outbound_requires_a_token() {
        let agent = AgentState::new();
        agent.queue_outbound(agent_msg::CLIPBOARD_RELEASE, Vec::new()).unwrap();
        assert_eq!(agent.tokens.load(Ordering::SeqCst), 0);
        // No token available yet; pump_outbound would need a real MainChannel to exercise the
        // success path, so this only checks the starved branch doesn't panic when called with
        // zero tokens via the public `add_tokens` accounting path.
        agent.add_tokens(1);
        assert_eq!(agent.tokens.load(Ordering::SeqCst), 1);
    }
}
