//! Inputs channel: keyboard scancodes, and mouse motion/press/release with the client-side
//! motion splitting and ack-count bookkeeping described by [`MouseState`].

use super::ChannelState;
use spice_protocol::error::NetworkResult;
use spice_protocol::messages::inputs::{
    split_motion, InputsInit, KeyDown, KeyModifiers, KeyUp, MouseButton, MouseMotionAck,
    MousePosition, MousePress, MouseRelease, MOUSE_MOTION_ACK_BUNCH,
};
use spice_protocol::messages::inputs_msg;
use spice_protocol::messages::inputs_msgc;
use spice_protocol::wire::Deserialize;
use std::io::Cursor;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

/// Shared mouse bookkeeping reachable from whichever thread drives user input, independent of
/// the thread running the event loop.
pub struct MouseState {
    pub button_state: Mutex<u16>,
    pub sent_count: AtomicI64,
}

impl MouseState {
    pub fn new() -> MouseState {
        MouseState {
            button_state: Mutex::new(0),
            sent_count: AtomicI64::new(0),
        }
    }
}

impl Default for MouseState {
    fn default() -> MouseState {
        MouseState::new()
    }
}

pub enum InputsEvent {
    Init(u16),
    KeyModifiers(u16),
    MouseMotionAck,
}

pub type InputsChannel = ChannelState<super::Inputs>;

impl InputsChannel {
    pub fn send_key_down(&mut self, scancode: u32) -> NetworkResult<()> {
        self.send_message(inputs_msgc::KEY_DOWN, &KeyDown { scancode })
    }

    pub fn send_key_up(&mut self, scancode: u32) -> NetworkResult<()> {
        self.send_message(inputs_msgc::KEY_UP, &KeyUp { scancode })
    }

    pub fn send_key_modifiers(&mut self, modifiers: u16) -> NetworkResult<()> {
        self.send_message(inputs_msgc::KEY_MODIFIERS, &KeyModifiers { modifiers })
    }

    /// Splits `(dx, dy)` into wire-sized steps and queues each as a separate
    /// `MouseMotion` message, incrementing `mouse.sent_count` once per step so the caller can
    /// correlate outstanding motion against ack traffic.
    pub fn send_mouse_motion(&mut self, dx: i32, dy: i32, mouse: &MouseState) -> NetworkResult<()> {
        let buttons_state = *mouse.button_state.lock().unwrap();
        for step in split_motion(dx, dy, buttons_state) {
            self.send_message(inputs_msgc::MOUSE_MOTION, &step)?;
            mouse.sent_count.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    pub fn send_mouse_position(&mut self, x: u32, y: u32, display_id: u8, mouse: &MouseState) -> NetworkResult<()> {
        let buttons_state = *mouse.button_state.lock().unwrap();
        self.send_message(
            inputs_msgc::MOUSE_POSITION,
            &MousePosition { x, y, buttons_state, display_id },
        )
    }

    pub fn send_mouse_press(&mut self, button: MouseButton, mouse: &MouseState) -> NetworkResult<()> {
        let buttons_state = {
            let mut state = mouse.button_state.lock().unwrap();
            *state |= button as u16;
            *state
        };
        self.send_message(inputs_msgc::MOUSE_PRESS, &MousePress { button, buttons_state })
    }

    pub fn send_mouse_release(&mut self, button: MouseButton, mouse: &MouseState) -> NetworkResult<()> {
        let buttons_state = {
            let mut state = mouse.button_state.lock().unwrap();
            *state &= !(button as u16);
            *state
        };
        self.send_message(inputs_msgc::MOUSE_RELEASE, &MouseRelease { button, buttons_state })
    }

    pub fn poll_message(&mut self, mouse: &MouseState) -> NetworkResult<Option<InputsEvent>> {
        let (msg_type, body) = match self.poll_common()? {
            Some(pair) => pair,
            None => return Ok(None),
        };
        let mut cursor = Cursor::new(&body[..]);

        let event = match msg_type {
            inputs_msg::INIT => InputsEvent::Init(InputsInit::deserialize(&mut cursor)?.keyboard_modifiers),
            inputs_msg::KEY_MODIFIERS => {
                InputsEvent::KeyModifiers(KeyModifiers::deserialize(&mut cursor)?.modifiers)
            }
            inputs_msg::MOUSE_MOTION_ACK => {
                let _ = MouseMotionAck::deserialize(&mut cursor)?;
                mouse.sent_count.fetch_sub(MOUSE_MOTION_ACK_BUNCH, Ordering::SeqCst);
                self.note_data_message()?;
                InputsEvent::MouseMotionAck
            }
            _ => return self.poll_message(mouse),
        };

        Ok(Some(event))
    }
}
