use crate::error::{NetworkError, NetworkResult};
use crate::wire::{Deserialize, Serialize, SizedRead, SizedWrite};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

/// Fixed amount `mouse.sent-count` is decremented by for every `mouse-motion-ack` received,
/// regardless of how many individual motion messages the ack is actually acknowledging.
pub const MOUSE_MOTION_ACK_BUNCH: i64 = 4;

#[derive(Debug, Eq, PartialEq)]
pub struct InputsInit {
    pub keyboard_modifiers: u16,
}

impl Deserialize for InputsInit {
    fn deserialize<R: SizedRead>(stream: &mut R) -> NetworkResult<InputsInit> {
        if stream.remaining_data() < 2 {
            return Err(NetworkError::Wait);
        }
        Ok(InputsInit {
            keyboard_modifiers: stream.read_u16::<LittleEndian>()?,
        })
    }
}

#[derive(Debug, Eq, PartialEq)]
pub struct KeyModifiers {
    pub modifiers: u16,
}

impl Deserialize for KeyModifiers {
    fn deserialize<R: SizedRead>(stream: &mut R) -> NetworkResult<KeyModifiers> {
        if stream.remaining_data() < 2 {
            return Err(NetworkError::Wait);
        }
        Ok(KeyModifiers {
            modifiers: stream.read_u16::<LittleEndian>()?,
        })
    }
}

impl Serialize for KeyModifiers {
    fn serialize<W: SizedWrite>(&self, stream: &mut W) -> NetworkResult<()> {
        if stream.free_capacity() < 2 {
            return Err(NetworkError::Wait);
        }
        stream.write_u16::<LittleEndian>(self.modifiers)?;
        Ok(())
    }
}

#[derive(Debug, Eq, PartialEq)]
pub struct KeyDown {
    pub scancode: u32,
}

impl Serialize for KeyDown {
    fn serialize<W: SizedWrite>(&self, stream: &mut W) -> NetworkResult<()> {
        if stream.free_capacity() < 4 {
            return Err(NetworkError::Wait);
        }
        stream.write_u32::<LittleEndian>(self.scancode)?;
        Ok(())
    }
}

#[derive(Debug, Eq, PartialEq)]
pub struct KeyUp {
    pub scancode: u32,
}

impl Serialize for KeyUp {
    fn serialize<W: SizedWrite>(&self, stream: &mut W) -> NetworkResult<()> {
        if stream.free_capacity() < 4 {
            return Err(NetworkError::Wait);
        }
        stream.write_u32::<LittleEndian>(self.scancode)?;
        Ok(())
    }
}

/// One quantized step of mouse movement, as actually sent on the wire. The public input API
/// accepts full-range `i32` deltas and splits them into a sequence of these via
/// [`split_motion`].
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub struct MouseMotion {
    pub dx: i8,
    pub dy: i8,
    pub buttons_state: u16,
}

impl Serialize for MouseMotion {
    fn serialize<W: SizedWrite>(&self, stream: &mut W) -> NetworkResult<()> {
        if stream.free_capacity() < 4 {
            return Err(NetworkError::Wait);
        }
        stream.write_i8(self.dx)?;
        stream.write_i8(self.dy)?;
        stream.write_u16::<LittleEndian>(self.buttons_state)?;
        Ok(())
    }
}

/// Splits an arbitrary-magnitude `(dx, dy)` mouse delta into a sequence of wire-sized steps,
/// clamping each axis independently to the `i8` range per step. `buttons_state` is repeated
/// unchanged on every step.
pub fn split_motion(mut dx: i32, mut dy: i32, buttons_state: u16) -> Vec<MouseMotion> {
    if dx == 0 && dy == 0 {
        return vec![MouseMotion { dx: 0, dy: 0, buttons_state }];
    }

    let mut steps = Vec::new();
    while dx != 0 || dy != 0 {
        let step_dx = dx.clamp(-127, 127);
        let step_dy = dy.clamp(-127, 127);
        dx -= step_dx;
        dy -= step_dy;
        steps.push(MouseMotion {
            dx: step_dx as i8,
            dy: step_dy as i8,
            buttons_state,
        });
    }
    steps
}

#[derive(Debug, Eq, PartialEq)]
pub struct MousePosition {
    pub x: u32,
    pub y: u32,
    pub buttons_state: u16,
    pub display_id: u8,
}

impl Serialize for MousePosition {
    fn serialize<W: SizedWrite>(&self, stream: &mut W) -> NetworkResult<()> {
        if stream.free_capacity() < 11 {
            return Err(NetworkError::Wait);
        }
        stream.write_u32::<LittleEndian>(self.x)?;
        stream.write_u32::<LittleEndian>(self.y)?;
        stream.write_u16::<LittleEndian>(self.buttons_state)?;
        stream.write_u8(self.display_id)?;
        Ok(())
    }
}

#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum MouseButton {
    Left = 1,
    Middle = 2,
    Right = 4,
    WheelUp = 8,
    WheelDown = 16,
}

#[derive(Debug, Eq, PartialEq)]
pub struct MousePress {
    pub button: MouseButton,
    pub buttons_state: u16,
}

impl Serialize for MousePress {
    fn serialize<W: SizedWrite>(&self, stream: &mut W) -> NetworkResult<()> {
        if stream.free_capacity() < 3 {
            return Err(NetworkError::Wait);
        }
        stream.write_u8(self.button as u8)?;
        stream.write_u16::<LittleEndian>(self.buttons_state)?;
        Ok(())
    }
}

#[derive(Debug, Eq, PartialEq)]
pub struct MouseRelease {
    pub button: MouseButton,
    pub buttons_state: u16,
}

impl Serialize for MouseRelease {
    fn serialize<W: SizedWrite>(&self, stream: &mut W) -> NetworkResult<()> {
        if stream.free_capacity() < 3 {
            return Err(NetworkError::Wait);
        }
        stream.write_u8(self.button as u8)?;
        stream.write_u16::<LittleEndian>(self.buttons_state)?;
        Ok(())
    }
}

#[derive(Debug, Eq, PartialEq)]
pub struct MouseMotionAck;

impl Deserialize for MouseMotionAck {
    fn deserialize<R: SizedRead>(_stream: &mut R) -> NetworkResult<MouseMotionAck> {
        Ok(MouseMotionAck)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_motion_matches_worked_example() {
        let steps = split_motion(300, -40, 0);
        assert_eq!(
            steps,
            vec![
                MouseMotion { dx: 127, dy: -40, buttons_state: 0 },
                MouseMotion { dx: 127, dy: 0, buttons_state: 0 },
                MouseMotion { dx: 46, dy: 0, buttons_state: 0 },
            ]
        );
    }

    #[test]
    fn split_motion_small_delta_is_single_step() {
        let steps = split_motion(5, -3, 1);
        assert_eq!(steps, vec![MouseMotion { dx: 5, dy: -3, buttons_state: 1 }]);
    }

    #[test]
    fn split_motion_zero_delta_still_emits_one_step() {
        let steps = split_motion(0, 0, 2);
        assert_eq!(steps, vec![MouseMotion { dx: 0, dy: 0, buttons_state: 2 }]);
    }
}
