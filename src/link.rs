//! One camera on one serial channel.
//!
//! Every operation is a transaction: write a frame, read until the `FF`
//! terminator, classify the reply. VISCA allows a single outstanding command
//! per link, and `&mut self` on every operation keeps it that way. Use
//! [`spawn_link`](crate::handle::spawn_link) to share a link between tasks.

use std::io::ErrorKind;
use std::time::{Duration, Instant};

use tracing::{debug, info, trace, warn};

use crate::channel::ByteChannel;
use crate::protos::{Operation, Position};
use crate::visca::{self, Direction, ReplyContext, Response, ZoomDirection};
use crate::viscaerror::{ViscaError, ViscaResult};

const DEFAULT_SPEED: u8 = 0x01;

#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Camera address on the bus, 1 to 7. The controller is always 0.
    pub camera: u8,
    /// Upper bound on a whole transaction, whatever the channel's own timeout.
    pub reply_timeout: Duration,
    /// A reply longer than this without a terminator means the stream is out of step.
    pub max_reply_len: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        LinkConfig {
            camera: 1,
            reply_timeout: Duration::from_secs(5),
            max_reply_len: 16,
        }
    }
}

struct Session<C> {
    channel: C,
    pan_speed: u8,
    tilt_speed: u8,
}

pub struct CameraLink<C> {
    config: LinkConfig,
    session: Option<Session<C>>,
}

impl<C: ByteChannel> CameraLink<C> {
    /// A closed link. Nothing is sent until [`open`](Self::open).
    pub fn new(config: LinkConfig) -> Self {
        CameraLink { config, session: None }
    }

    /// Shorthand for [`new`](Self::new) followed by [`open`](Self::open).
    pub fn connect(channel: C, config: LinkConfig) -> ViscaResult<Self> {
        let mut link = CameraLink::new(config);
        link.open(channel)?;
        Ok(link)
    }

    pub fn open(&mut self, mut channel: C) -> ViscaResult<()> {
        if self.session.is_some() {
            return Err(ViscaError::ConnectionError("link is already open".to_string()));
        }
        if !(1..=7).contains(&self.config.camera) {
            return Err(ViscaError::ConnectionError(format!(
                "camera address {} outside 1..=7",
                self.config.camera
            )));
        }
        channel
            .discard_input()
            .map_err(|e| ViscaError::ConnectionError(e.to_string()))?;
        self.session = Some(Session {
            channel,
            pan_speed: DEFAULT_SPEED,
            tilt_speed: DEFAULT_SPEED,
        });
        info!("camera link to address {} open", self.config.camera);
        Ok(())
    }

    /// Returns the channel if the link was open. Calling it again is harmless.
    pub fn close(&mut self) -> Option<C> {
        let session = self.session.take()?;
        info!("camera link to address {} closed", self.config.camera);
        Some(session.channel)
    }

    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    fn session(&mut self) -> ViscaResult<&mut Session<C>> {
        self.session.as_mut().ok_or(ViscaError::NotConnected)
    }

    /// (pan, tilt) speeds applied to steering and absolute moves.
    pub fn speeds(&self) -> ViscaResult<(u8, u8)> {
        let s = self.session.as_ref().ok_or(ViscaError::NotConnected)?;
        Ok((s.pan_speed, s.tilt_speed))
    }

    pub fn set_speed(&mut self, speed: u8) -> ViscaResult<()> {
        self.set_speeds(speed, speed)
    }

    pub fn set_speeds(&mut self, pan_speed: u8, tilt_speed: u8) -> ViscaResult<()> {
        let session = self.session()?;
        let (pan_speed, tilt_speed) = (visca::check_speed(pan_speed)?, visca::check_speed(tilt_speed)?);
        session.pan_speed = pan_speed;
        session.tilt_speed = tilt_speed;
        Ok(())
    }

    /// A reply that never arrives whole leaves the rest of it, or all of it,
    /// on the wire for the next transaction to misread. The link closes
    /// instead and has to be opened again on a fresh channel.
    fn transact(&mut self, body: &[u8], context: ReplyContext) -> ViscaResult<Response> {
        let camera = self.config.camera;
        let max_len = self.config.max_reply_len;
        let deadline = Instant::now() + self.config.reply_timeout;
        let session = self.session()?;

        let cmd = visca::frame(camera, body);
        debug!("sending {}", hex::encode(&cmd));
        session.channel.write_frame(&cmd)?;
        match read_completion(&mut session.channel, context, deadline, max_len) {
            Ok(r) => r,
            Err(e) => {
                warn!("reply to {} lost: {e}", hex::encode(body));
                self.close();
                Err(e)
            }
        }
    }

    fn expect_ack(&mut self, body: &[u8]) -> ViscaResult<()> {
        match self.transact(body, ReplyContext::Command)? {
            Response::Ack => Ok(()),
            Response::Error(status) => {
                warn!("command {} rejected: {}", hex::encode(body), hex::encode(&status));
                Err(ViscaError::CommandRejected(status))
            }
            r => Err(ViscaError::ProtocolError(format!("unexpected reply to command: {r:?}"))),
        }
    }

    fn inquire(&mut self, body: &[u8]) -> ViscaResult<Vec<u8>> {
        match self.transact(body, ReplyContext::Inquiry)? {
            Response::Payload(p) => Ok(p),
            Response::Error(status) => Err(ViscaError::ProtocolError(format!(
                "inquiry {} rejected: {}",
                hex::encode(body),
                hex::encode(&status)
            ))),
            r => Err(ViscaError::ProtocolError(format!("unexpected reply to inquiry: {r:?}"))),
        }
    }

    pub fn steer(&mut self, direction: Direction) -> ViscaResult<()> {
        let (pan_speed, tilt_speed) = self.speeds()?;
        self.expect_ack(&visca::encode_steer(pan_speed, tilt_speed, Some(direction))?)
    }

    pub fn stop_steer(&mut self) -> ViscaResult<()> {
        self.expect_ack(&visca::encode_stop_steer())
    }

    /// Homes the pan/tilt motors.
    pub fn center(&mut self) -> ViscaResult<()> {
        self.expect_ack(&visca::encode_center())
    }

    pub fn zoom(&mut self, direction: ZoomDirection) -> ViscaResult<()> {
        self.expect_ack(&visca::encode_zoom(direction))
    }

    pub fn stop_zoom(&mut self) -> ViscaResult<()> {
        self.expect_ack(&visca::encode_stop_zoom())
    }

    pub fn set_autofocus(&mut self, enable: bool) -> ViscaResult<()> {
        self.expect_ack(&visca::encode_autofocus(enable))
    }

    pub fn toggle_autofocus(&mut self) -> ViscaResult<()> {
        self.expect_ack(&visca::encode_toggle_autofocus())
    }

    pub fn go_to_focus(&mut self, value: u16) -> ViscaResult<()> {
        self.expect_ack(&visca::encode_go_to_focus(value))
    }

    pub fn get_focus(&mut self) -> ViscaResult<u16> {
        let payload = self.inquire(&visca::encode_get_focus())?;
        visca::decode_u16(&payload)
    }

    pub fn get_autofocus(&mut self) -> ViscaResult<bool> {
        let payload = self.inquire(&visca::encode_get_autofocus())?;
        visca::decode_autofocus(&payload)
    }

    /// Zoom first, then pan/tilt. Either failing fails the whole call.
    pub fn get_position(&mut self) -> ViscaResult<Position> {
        let zoom = visca::decode_u16(&self.inquire(&visca::encode_get_zoom())?)?;
        let (pan, tilt) = visca::decode_pan_tilt(&self.inquire(&visca::encode_get_pan_tilt())?)?;
        Ok(Position { pan, tilt, zoom })
    }

    /// Sends the zoom frame, then the pan/tilt frame. If the camera takes the
    /// first but not the second the error is [`ViscaError::PartialCommand`]:
    /// the lens may be moving while the head is not.
    pub fn go_to_position(&mut self, target: Position) -> ViscaResult<()> {
        let (pan_speed, tilt_speed) = self.speeds()?;
        let (zoom_cmd, pan_tilt_cmd) =
            visca::encode_go_to_position(pan_speed, tilt_speed, target.pan, target.tilt, target.zoom)?;
        self.expect_ack(&zoom_cmd)?;
        self.expect_ack(&pan_tilt_cmd).map_err(|e| {
            warn!("zoom issued but pan/tilt failed: {e}");
            ViscaError::PartialCommand(Box::new(e))
        })
    }

    pub fn invoke(&mut self, op: Operation) -> ViscaResult<()> {
        match op {
            Operation::Steer(d) => self.steer(d),
            Operation::StopSteer => self.stop_steer(),
            Operation::Zoom(d) => self.zoom(d),
            Operation::StopZoom => self.stop_zoom(),
            Operation::Center => self.center(),
            Operation::Autofocus(on) => self.set_autofocus(on),
            Operation::ToggleAutofocus => self.toggle_autofocus(),
        }
    }
}

/// Reads frames until one settles the transaction, skipping socket acks. The
/// outer error means the stream is out of step; the inner one is a
/// well-framed reply that doesn't classify.
fn read_completion<C: ByteChannel>(
    channel: &mut C,
    context: ReplyContext,
    deadline: Instant,
    max_len: usize,
) -> ViscaResult<ViscaResult<Response>> {
    loop {
        let raw = read_reply(channel, deadline, max_len)?;
        debug!("received {}", hex::encode(&raw));
        match visca::classify_response(&raw, context) {
            Ok(Response::Accepted) => trace!("socket ack, waiting for completion"),
            r => return Ok(r),
        }
    }
}

/// Reads one reply frame, terminator included.
fn read_reply<C: ByteChannel>(channel: &mut C, deadline: Instant, max_len: usize) -> ViscaResult<Vec<u8>> {
    let mut raw = Vec::with_capacity(max_len);
    loop {
        if Instant::now() >= deadline {
            debug!("deadline passed with {} partial", hex::encode(&raw));
            return Err(ViscaError::Timeout);
        }
        let b = match channel.read_byte() {
            Ok(b) => b,
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                return Err(ViscaError::Timeout)
            }
            Err(e) => return Err(e.into()),
        };
        raw.push(b);
        if b == visca::TERMINATOR {
            return Ok(raw);
        }
        if raw.len() >= max_len {
            return Err(ViscaError::ProtocolError(format!(
                "no terminator within {max_len} bytes: {}",
                hex::encode(&raw)
            )));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::mock::{DripChannel, MockChannel};

    const ACK: &[u8] = &[0x90, 0x50, 0xFF];
    const ACK2: &[u8] = &[0x90, 0x51, 0xFF];
    const SYNTAX_ERROR: &[u8] = &[0x90, 0x60, 0x02, 0xFF];

    fn open(replies: &[&[u8]]) -> (CameraLink<MockChannel>, std::sync::Arc<std::sync::Mutex<Vec<Vec<u8>>>>) {
        let chan = MockChannel::with_replies(replies);
        let writes = chan.writes();
        (CameraLink::connect(chan, LinkConfig::default()).unwrap(), writes)
    }

    #[test]
    fn steer_writes_framed_command() {
        let (mut link, writes) = open(&[ACK]);
        link.steer(Direction::Up).unwrap();
        assert_eq!(writes.lock().unwrap()[0], [0x81, 0x01, 0x06, 0x01, 0x01, 0x01, 0x03, 0x01, 0xFF]);
    }

    #[test]
    fn speed_applies_to_later_steering() {
        let (mut link, writes) = open(&[ACK, ACK2]);
        link.set_speed(0x08).unwrap();
        link.steer(Direction::DownRight).unwrap();
        link.stop_steer().unwrap();
        let w = writes.lock().unwrap();
        assert_eq!(w[0][4..8], [0x08, 0x08, 0x02, 0x02]);
        assert_eq!(w[1][4..8], [0x03, 0x03, 0x03, 0x03]);
    }

    #[test]
    fn bad_speed_is_rejected_and_kept() {
        let (mut link, _) = open(&[]);
        assert!(matches!(link.set_speed(0), Err(ViscaError::InvalidArgument(_))));
        assert!(matches!(link.set_speeds(2, 0x10), Err(ViscaError::InvalidArgument(_))));
        assert_eq!(link.speeds().unwrap(), (1, 1));
    }

    #[test]
    fn rejected_command() {
        let (mut link, _) = open(&[SYNTAX_ERROR]);
        match link.zoom(ZoomDirection::In) {
            Err(ViscaError::CommandRejected(status)) => assert_eq!(status, [0x60, 0x02]),
            r => panic!("unexpected {r:?}"),
        }
    }

    #[test]
    fn socket_ack_then_completion() {
        let (mut link, writes) = open(&[&[0x90, 0x41, 0xFF], &[0x90, 0x51, 0xFF], ACK]);
        link.center().unwrap();
        link.stop_zoom().unwrap();
        assert_eq!(writes.lock().unwrap().len(), 2);
    }

    #[test]
    fn closed_link_writes_nothing() {
        let (mut link, writes) = open(&[ACK]);
        assert!(link.close().is_some());
        assert!(link.close().is_none());
        assert!(!link.is_open());
        assert!(matches!(link.steer(Direction::Up), Err(ViscaError::NotConnected)));
        assert!(matches!(link.get_position(), Err(ViscaError::NotConnected)));
        assert!(matches!(link.set_speed(3), Err(ViscaError::NotConnected)));
        assert!(matches!(link.invoke(Operation::Center), Err(ViscaError::NotConnected)));
        assert!(writes.lock().unwrap().is_empty());
    }

    #[test]
    fn never_opened_link() {
        let mut link: CameraLink<MockChannel> = CameraLink::new(LinkConfig::default());
        assert!(matches!(link.get_focus(), Err(ViscaError::NotConnected)));
    }

    #[test]
    fn reopen_resets_speeds() {
        let (mut link, _) = open(&[]);
        link.set_speed(5).unwrap();
        let chan = link.close().unwrap();
        link.open(chan).unwrap();
        assert_eq!(link.speeds().unwrap(), (1, 1));
        assert!(matches!(link.open(MockChannel::default()), Err(ViscaError::ConnectionError(_))));
    }

    #[test]
    fn bad_camera_address() {
        let config = LinkConfig { camera: 8, ..LinkConfig::default() };
        let r = CameraLink::connect(MockChannel::default(), config);
        assert!(matches!(r, Err(ViscaError::ConnectionError(_))));
    }

    #[test]
    fn get_position_decodes_both_inquiries() {
        let (mut link, writes) = open(&[
            &[0x90, 0x50, 0x00, 0x00, 0x03, 0x02, 0xFF],
            &[0x90, 0x50, 0x00, 0x00, 0x06, 0x04, 0x00, 0x00, 0x0C, 0x08, 0xFF],
        ]);
        assert_eq!(link.get_position().unwrap(), Position { pan: 100, tilt: 200, zoom: 50 });
        let w = writes.lock().unwrap();
        assert_eq!(w[0], [0x81, 0x09, 0x04, 0x47, 0xFF]);
        assert_eq!(w[1], [0x81, 0x09, 0x06, 0x12, 0xFF]);
    }

    #[test]
    fn get_position_fails_whole_on_second_inquiry() {
        let (mut link, _) = open(&[&[0x90, 0x50, 0x00, 0x00, 0x03, 0x02, 0xFF], &[0x90, 0x60, 0x41, 0xFF]]);
        assert!(matches!(link.get_position(), Err(ViscaError::ProtocolError(_))));
        assert!(link.is_open());
    }

    #[test]
    fn inquiry_error_reply() {
        let (mut link, _) = open(&[&[0x90, 0x60, 0x02, 0xFF]]);
        assert!(matches!(link.get_autofocus(), Err(ViscaError::ProtocolError(_))));
    }

    #[test]
    fn get_position_short_payload() {
        let (mut link, _) = open(&[&[0x90, 0x50, 0x00, 0x03, 0x02, 0xFF]]);
        assert!(matches!(link.get_position(), Err(ViscaError::ProtocolError(_))));
    }

    #[test]
    fn go_to_position_sends_zoom_then_pan_tilt() {
        let (mut link, writes) = open(&[ACK, ACK2]);
        link.go_to_position(Position { pan: 100, tilt: 200, zoom: 50 }).unwrap();
        let w = writes.lock().unwrap();
        assert_eq!(w[0], [0x81, 0x01, 0x04, 0x47, 0x00, 0x00, 0x03, 0x02, 0xFF]);
        assert_eq!(
            w[1],
            [0x81, 0x01, 0x06, 0x02, 0x01, 0x01, 0x00, 0x00, 0x06, 0x04, 0x00, 0x00, 0x0C, 0x08, 0xFF]
        );
    }

    #[test]
    fn go_to_position_partial() {
        let (mut link, _) = open(&[ACK, SYNTAX_ERROR]);
        match link.go_to_position(Position { pan: 1, tilt: 2, zoom: 3 }) {
            Err(ViscaError::PartialCommand(cause)) => {
                assert!(matches!(*cause, ViscaError::CommandRejected(_)))
            }
            r => panic!("unexpected {r:?}"),
        }
    }

    #[test]
    fn go_to_position_zoom_rejected_is_not_partial() {
        let (mut link, writes) = open(&[SYNTAX_ERROR]);
        let r = link.go_to_position(Position::default());
        assert!(matches!(r, Err(ViscaError::CommandRejected(_))));
        assert_eq!(writes.lock().unwrap().len(), 1);
    }

    #[test]
    fn autofocus_roundtrip() {
        let (mut link, writes) = open(&[ACK, &[0x90, 0x50, 0x02, 0xFF], &[0x90, 0x50, 0x03, 0xFF], &[0x90, 0x50, 0x07, 0xFF]]);
        link.set_autofocus(true).unwrap();
        assert!(link.get_autofocus().unwrap());
        assert!(!link.get_autofocus().unwrap());
        assert!(matches!(link.get_autofocus(), Err(ViscaError::ProtocolError(_))));
        assert_eq!(writes.lock().unwrap()[0], [0x81, 0x01, 0x04, 0x38, 0x02, 0xFF]);
    }

    #[test]
    fn focus() {
        let (mut link, writes) = open(&[ACK, &[0x90, 0x50, 0x01, 0x02, 0x03, 0x04, 0xFF]]);
        link.go_to_focus(0x0F00).unwrap();
        assert_eq!(link.get_focus().unwrap(), 0x1234);
        assert_eq!(writes.lock().unwrap()[0], [0x81, 0x01, 0x04, 0x48, 0x00, 0x0F, 0x00, 0x00, 0xFF]);
    }

    #[test]
    fn invoke_dispatches() {
        let (mut link, writes) = open(&[ACK, ACK, ACK]);
        link.invoke(Operation::Zoom(ZoomDirection::Out)).unwrap();
        link.invoke(Operation::StopZoom).unwrap();
        link.invoke(Operation::ToggleAutofocus).unwrap();
        let w = writes.lock().unwrap();
        assert_eq!(w[0][1..5], [0x01, 0x04, 0x07, 0x3A]);
        assert_eq!(w[1][1..5], [0x01, 0x04, 0x07, 0x00]);
        assert_eq!(w[2][1..5], [0x01, 0x04, 0x38, 0x10]);
    }

    #[test]
    fn silent_camera_times_out() {
        let (mut link, _) = open(&[]);
        assert!(matches!(link.center(), Err(ViscaError::Timeout)));
        assert!(!link.is_open());
    }

    #[test]
    fn late_reply_is_not_taken_for_the_next_one() {
        let chan = MockChannel::with_replies(&[
            &[0x90, 0x50, 0x00, 0x00, 0x03, 0x02, 0xFF],
            &[0x90, 0x50, 0x00, 0x00, 0x06, 0x04, 0x00, 0x00, 0x0C, 0x08, 0xFF],
        ])
        .stall_first_read();
        let writes = chan.writes();
        let mut link = CameraLink::connect(chan, LinkConfig::default()).unwrap();
        assert!(matches!(link.get_position(), Err(ViscaError::Timeout)));
        assert!(matches!(link.get_position(), Err(ViscaError::NotConnected)));
        assert_eq!(writes.lock().unwrap().len(), 1);
    }

    #[test]
    fn slow_trickle_times_out() {
        let config = LinkConfig {
            reply_timeout: Duration::from_millis(100),
            max_reply_len: 1000,
            ..LinkConfig::default()
        };
        let mut link = CameraLink::connect(DripChannel { delay: Duration::from_millis(20) }, config).unwrap();
        let started = Instant::now();
        assert!(matches!(link.stop_steer(), Err(ViscaError::Timeout)));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn runaway_reply_is_a_protocol_error() {
        let (mut link, _) = open(&[&[0x90; 20]]);
        assert!(matches!(link.center(), Err(ViscaError::ProtocolError(_))));
    }

    #[test]
    fn leftover_ack_never_confirms_a_later_command() {
        let (mut link, writes) = open(&[&[0x00; 16], ACK, SYNTAX_ERROR]);
        assert!(matches!(link.center(), Err(ViscaError::ProtocolError(_))));
        assert!(matches!(link.zoom(ZoomDirection::In), Err(ViscaError::NotConnected)));
        assert_eq!(writes.lock().unwrap().len(), 1);
    }

    #[test]
    fn bad_frame_keeps_link_open() {
        let (mut link, _) = open(&[&[0xFF], ACK]);
        assert!(matches!(link.center(), Err(ViscaError::ProtocolError(_))));
        assert!(link.is_open());
        link.center().unwrap();
    }
}
