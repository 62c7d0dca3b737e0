//! VISCA frame codec.
//!
//! Pure translation between camera operations and the bytes a VISCA camera
//! expects on its serial port. Nothing in here touches I/O.
//!
//! ```text
//! command:  [0x8c][opcode+payload][0xFF]     c = camera address
//! reply:    [0xc0][status+payload][0xFF]
//! ```
//!
//! Encoders return the command body (opcode and payload only); [`frame`] adds
//! the header and terminator.

/* references:
- https://www.epiphan.com/userguides/LUMiO12x/Content/UserGuides/PTZ/3-operation/VISCAcommands.htm
- https://www.sony.net/Products/CameraSystem/CA/BRC_X1000_BRC_H800/Technical_Document/C456100121.pdf
*/

use std::fmt;
use std::str::FromStr;

use crate::viscaerror::{ViscaError, ViscaResult};

pub const TERMINATOR: u8 = 0xFF;
pub const CONTROLLER_ADDRESS: u8 = 0;

const PAN_TILT_DRIVE: [u8; 3] = [0x01, 0x06, 0x01];
const PAN_TILT_ABSOLUTE: [u8; 3] = [0x01, 0x06, 0x02];
const PAN_TILT_HOME: [u8; 3] = [0x01, 0x06, 0x05];
const ZOOM_DRIVE: [u8; 3] = [0x01, 0x04, 0x07];
const ZOOM_DIRECT: [u8; 3] = [0x01, 0x04, 0x47];
const FOCUS_MODE: [u8; 3] = [0x01, 0x04, 0x38];
const FOCUS_DIRECT: [u8; 3] = [0x01, 0x04, 0x48];
const INQ_ZOOM: [u8; 3] = [0x09, 0x04, 0x47];
const INQ_PAN_TILT: [u8; 3] = [0x09, 0x06, 0x12];
const INQ_FOCUS: [u8; 3] = [0x09, 0x04, 0x48];
const INQ_FOCUS_MODE: [u8; 3] = [0x09, 0x04, 0x38];

/// Drive code meaning "hold this axis". Stop also pins both speed bytes to it.
const HOLD: u8 = 0x03;
const ZOOM_STOP: u8 = 0x00;
const ZOOM_TELE: u8 = 0x2A;
const ZOOM_WIDE: u8 = 0x3A;

pub const AUTOFOCUS_ON: u8 = 0x02;
pub const AUTOFOCUS_OFF: u8 = 0x03;
const AUTOFOCUS_TOGGLE: u8 = 0x10;

pub const ACK_BUFFER_1: u8 = 0x50;
pub const ACK_BUFFER_2: u8 = 0x51;

pub const MIN_SPEED: u8 = 0x01;
pub const MAX_SPEED: u8 = 0x0F;

/// Header byte for a command from the controller to `camera`.
pub fn header(camera: u8) -> u8 {
    0x80 | (CONTROLLER_ADDRESS << 4) | (camera & 0x07)
}

/// Wraps a command body with its header and terminator.
pub fn frame(camera: u8, body: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(body.len() + 2);
    buf.push(header(camera));
    buf.extend_from_slice(body);
    buf.push(TERMINATOR);
    buf
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
    UpLeft,
    UpRight,
    DownLeft,
    DownRight,
}

impl Direction {
    pub const ALL: [Direction; 8] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
        Direction::UpLeft,
        Direction::UpRight,
        Direction::DownLeft,
        Direction::DownRight,
    ];

    /// (horizontal, vertical) drive codes: 01 = left/up, 02 = right/down, 03 = hold.
    pub fn codes(self) -> [u8; 2] {
        match self {
            Direction::Up => [0x03, 0x01],
            Direction::Down => [0x03, 0x02],
            Direction::Left => [0x01, 0x03],
            Direction::Right => [0x02, 0x03],
            Direction::UpLeft => [0x01, 0x01],
            Direction::UpRight => [0x02, 0x01],
            Direction::DownLeft => [0x01, 0x02],
            Direction::DownRight => [0x02, 0x02],
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::Left => "left",
            Direction::Right => "right",
            Direction::UpLeft => "upleft",
            Direction::UpRight => "upright",
            Direction::DownLeft => "downleft",
            Direction::DownRight => "downright",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Direction {
    type Err = ViscaError;

    fn from_str(s: &str) -> ViscaResult<Direction> {
        Direction::ALL
            .into_iter()
            .find(|d| d.name() == s)
            .ok_or_else(|| ViscaError::InvalidArgument(format!("unknown direction {s:?}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ZoomDirection {
    In,
    Out,
}

impl ZoomDirection {
    pub fn code(self) -> u8 {
        match self {
            ZoomDirection::In => ZOOM_TELE,
            ZoomDirection::Out => ZOOM_WIDE,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ZoomDirection::In => "in",
            ZoomDirection::Out => "out",
        }
    }
}

impl fmt::Display for ZoomDirection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ZoomDirection {
    type Err = ViscaError;

    fn from_str(s: &str) -> ViscaResult<ZoomDirection> {
        match s {
            "in" => Ok(ZoomDirection::In),
            "out" => Ok(ZoomDirection::Out),
            _ => Err(ViscaError::InvalidArgument(format!("unknown zoom direction {s:?}"))),
        }
    }
}

pub fn check_speed(speed: u8) -> ViscaResult<u8> {
    if (MIN_SPEED..=MAX_SPEED).contains(&speed) {
        Ok(speed)
    } else {
        Err(ViscaError::InvalidArgument(format!(
            "speed {speed:#04x} outside {MIN_SPEED:#04x}..={MAX_SPEED:#04x}"
        )))
    }
}

fn command(opcode: [u8; 3], payload: &[u8]) -> Vec<u8> {
    let mut v = opcode.to_vec();
    v.extend_from_slice(payload);
    v
}

/// Continuous pan/tilt drive. `None` holds both axes at the given speeds.
pub fn encode_steer(pan_speed: u8, tilt_speed: u8, direction: Option<Direction>) -> ViscaResult<Vec<u8>> {
    let [h, v] = direction.map(Direction::codes).unwrap_or([HOLD, HOLD]);
    Ok(command(PAN_TILT_DRIVE, &[check_speed(pan_speed)?, check_speed(tilt_speed)?, h, v]))
}

/// Stop ignores the session speeds: the speed bytes must be 03 03 as well.
pub fn encode_stop_steer() -> Vec<u8> {
    command(PAN_TILT_DRIVE, &[HOLD, HOLD, HOLD, HOLD])
}

/// Home. The camera re-references its drive motors, so this moves mechanically
/// even when already pointing at zero.
pub fn encode_center() -> Vec<u8> {
    PAN_TILT_HOME.to_vec()
}

pub fn encode_zoom(direction: ZoomDirection) -> Vec<u8> {
    command(ZOOM_DRIVE, &[direction.code()])
}

pub fn encode_stop_zoom() -> Vec<u8> {
    command(ZOOM_DRIVE, &[ZOOM_STOP])
}

pub fn encode_autofocus(enable: bool) -> Vec<u8> {
    command(FOCUS_MODE, &[if enable { AUTOFOCUS_ON } else { AUTOFOCUS_OFF }])
}

pub fn encode_toggle_autofocus() -> Vec<u8> {
    command(FOCUS_MODE, &[AUTOFOCUS_TOGGLE])
}

pub fn encode_go_to_focus(value: u16) -> Vec<u8> {
    command(FOCUS_DIRECT, &pack_nibbles(value))
}

pub fn encode_get_focus() -> Vec<u8> {
    INQ_FOCUS.to_vec()
}

pub fn encode_get_autofocus() -> Vec<u8> {
    INQ_FOCUS_MODE.to_vec()
}

pub fn encode_get_zoom() -> Vec<u8> {
    INQ_ZOOM.to_vec()
}

pub fn encode_get_pan_tilt() -> Vec<u8> {
    INQ_PAN_TILT.to_vec()
}

pub fn encode_set_zoom(zoom: u16) -> Vec<u8> {
    command(ZOOM_DIRECT, &pack_nibbles(zoom))
}

pub fn encode_set_pan_tilt(pan_speed: u8, tilt_speed: u8, pan: u16, tilt: u16) -> ViscaResult<Vec<u8>> {
    let mut v = command(PAN_TILT_ABSOLUTE, &[check_speed(pan_speed)?, check_speed(tilt_speed)?]);
    v.extend_from_slice(&pack_nibbles(pan));
    v.extend_from_slice(&pack_nibbles(tilt));
    Ok(v)
}

/// Absolute move as (zoom frame, pan/tilt frame). The camera treats them as two
/// unrelated commands; each needs its own acknowledge.
pub fn encode_go_to_position(
    pan_speed: u8,
    tilt_speed: u8,
    pan: u16,
    tilt: u16,
    zoom: u16,
) -> ViscaResult<(Vec<u8>, Vec<u8>)> {
    let pan_tilt = encode_set_pan_tilt(pan_speed, tilt_speed, pan, tilt)?;
    Ok((encode_set_zoom(zoom), pan_tilt))
}

/// `0x1234` -> `01 02 03 04`, most significant nibble first.
pub fn pack_nibbles(value: u16) -> [u8; 4] {
    [
        (value >> 12) as u8 & 0x0F,
        (value >> 8) as u8 & 0x0F,
        (value >> 4) as u8 & 0x0F,
        value as u8 & 0x0F,
    ]
}

/// Inverse of [`pack_nibbles`]. High bits of each byte are ignored; use
/// [`decode_packed`] on untrusted input.
pub fn unpack_nibbles(bytes: [u8; 4]) -> u16 {
    bytes.iter().fold(0u16, |acc, b| (acc << 4) | (*b & 0x0F) as u16)
}

/// Strict form of [`unpack_nibbles`] for reply payloads.
pub fn decode_packed(bytes: &[u8]) -> ViscaResult<u16> {
    let nibbles: [u8; 4] = bytes.try_into().map_err(|_| {
        ViscaError::ProtocolError(format!("expected 4 packed bytes, got {}", bytes.len()))
    })?;
    if let Some(b) = nibbles.iter().find(|b| *b & 0xF0 != 0) {
        return Err(ViscaError::ProtocolError(format!("packed byte {b:#04x} has high bits set")));
    }
    Ok(unpack_nibbles(nibbles))
}

/// What the caller was expecting when it read a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyContext {
    Command,
    Inquiry,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// `50` / `51`: accepted into command buffer 1 or 2.
    Ack,
    /// `4z`: socket acknowledge; the completion frame is still to come.
    Accepted,
    /// Inquiry reply with the `5z` status byte removed.
    Payload(Vec<u8>),
    /// The whole reply body.
    Error(Vec<u8>),
}

/// Drops the header byte and terminator of a raw reply.
pub fn strip_frame(raw: &[u8]) -> ViscaResult<&[u8]> {
    match raw {
        [_header, body @ .., TERMINATOR] if !body.is_empty() => Ok(body),
        _ => Err(ViscaError::ProtocolError(format!("bad reply frame {}", hex::encode(raw)))),
    }
}

pub fn classify_body(body: &[u8], context: ReplyContext) -> Response {
    match (context, body) {
        (ReplyContext::Command, [ACK_BUFFER_1 | ACK_BUFFER_2]) => Response::Ack,
        (ReplyContext::Command, [0x40..=0x4F]) => Response::Accepted,
        (ReplyContext::Command, _) => Response::Error(body.to_vec()),
        (ReplyContext::Inquiry, [s, ..]) if s & 0xF0 == 0x60 => Response::Error(body.to_vec()),
        (ReplyContext::Inquiry, [s, payload @ ..]) if s & 0xF0 == 0x50 && !payload.is_empty() => {
            Response::Payload(payload.to_vec())
        }
        (ReplyContext::Inquiry, _) => Response::Payload(body.to_vec()),
    }
}

pub fn classify_response(raw: &[u8], context: ReplyContext) -> ViscaResult<Response> {
    Ok(classify_body(strip_frame(raw)?, context))
}

pub fn decode_autofocus(payload: &[u8]) -> ViscaResult<bool> {
    match payload {
        [AUTOFOCUS_ON] => Ok(true),
        [AUTOFOCUS_OFF] => Ok(false),
        _ => Err(ViscaError::ProtocolError(format!(
            "focus mode reply {} is neither on nor off",
            hex::encode(payload)
        ))),
    }
}

/// Zoom or focus position.
pub fn decode_u16(payload: &[u8]) -> ViscaResult<u16> {
    decode_packed(payload)
}

pub fn decode_pan_tilt(payload: &[u8]) -> ViscaResult<(u16, u16)> {
    if payload.len() != 8 {
        return Err(ViscaError::ProtocolError(format!(
            "pan/tilt reply has {} bytes, expected 8",
            payload.len()
        )));
    }
    Ok((decode_packed(&payload[..4])?, decode_packed(&payload[4..])?))
}
