//! Shares one [`CameraLink`] between tasks.
//!
//! The link lives on its own thread and works through requests one at a time,
//! so a UI and a polling task can both hold a [`LinkHandle`] without ever
//! interleaving two transactions on the wire.

use std::fmt;
use std::thread;
use std::time::Duration;

use futures::Stream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, MissedTickBehavior};
use tracing::debug;

use crate::channel::ByteChannel;
use crate::link::CameraLink;
use crate::protos::{Operation, Position};
use crate::visca::{Direction, ZoomDirection};
use crate::viscaerror::{ViscaError, ViscaResult};

const MIN_POLL_PERIOD: Duration = Duration::from_millis(1);

type Reply<T> = oneshot::Sender<ViscaResult<T>>;

#[derive(Debug)]
pub enum LinkCmd {
    Invoke(Operation, Reply<()>),
    SetSpeeds(u8, u8, Reply<()>),
    GoToFocus(u16, Reply<()>),
    GetFocus(Reply<u16>),
    GetAutofocus(Reply<bool>),
    GetPosition(Reply<Position>),
    GoToPosition(Position, Reply<()>),
    Close(Reply<()>),
}

fn run_command<C: ByteChannel>(link: &mut CameraLink<C>, cmd: LinkCmd) {
    match cmd {
        LinkCmd::Invoke(op, s) => {
            s.send(link.invoke(op)).ok();
        }
        LinkCmd::SetSpeeds(pan, tilt, s) => {
            s.send(link.set_speeds(pan, tilt)).ok();
        }
        LinkCmd::GoToFocus(v, s) => {
            s.send(link.go_to_focus(v)).ok();
        }
        LinkCmd::GetFocus(s) => {
            s.send(link.get_focus()).ok();
        }
        LinkCmd::GetAutofocus(s) => {
            s.send(link.get_autofocus()).ok();
        }
        LinkCmd::GetPosition(s) => {
            s.send(link.get_position()).ok();
        }
        LinkCmd::GoToPosition(p, s) => {
            s.send(link.go_to_position(p)).ok();
        }
        LinkCmd::Close(s) => {
            link.close();
            s.send(Ok(())).ok();
        }
    }
}

/// Moves `link` onto a dedicated thread. The thread ends, closing the link,
/// once every handle is dropped.
pub fn spawn_link<C>(mut link: CameraLink<C>) -> LinkHandle
where
    C: ByteChannel + Send + 'static,
{
    let (send_cmd, mut recv_cmd) = mpsc::channel(100);
    let camera = link.config().camera;
    thread::spawn(move || {
        while let Some(cmd) = recv_cmd.blocking_recv() {
            run_command(&mut link, cmd);
        }
        link.close();
        debug!("link thread for camera {camera} finished");
    });
    LinkHandle { channel: send_cmd, camera }
}

#[derive(Debug, Clone)]
pub struct LinkHandle {
    channel: mpsc::Sender<LinkCmd>,
    camera: u8,
}

impl fmt::Display for LinkHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VISCA camera {}", self.camera)
    }
}

impl LinkHandle {
    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> LinkCmd) -> ViscaResult<T> {
        let (s, r) = oneshot::channel();
        self.channel
            .send(make(s))
            .await
            .map_err(|_x| ViscaError::AsyncChannelClosed)?;
        r.await.map_err(|_x| ViscaError::AsyncChannelNoSender)?
    }

    pub async fn invoke(&self, op: Operation) -> ViscaResult<()> {
        self.request(|s| LinkCmd::Invoke(op, s)).await
    }

    pub async fn steer(&self, direction: Direction) -> ViscaResult<()> {
        self.invoke(Operation::Steer(direction)).await
    }

    pub async fn stop_steer(&self) -> ViscaResult<()> {
        self.invoke(Operation::StopSteer).await
    }

    pub async fn center(&self) -> ViscaResult<()> {
        self.invoke(Operation::Center).await
    }

    pub async fn zoom(&self, direction: ZoomDirection) -> ViscaResult<()> {
        self.invoke(Operation::Zoom(direction)).await
    }

    pub async fn stop_zoom(&self) -> ViscaResult<()> {
        self.invoke(Operation::StopZoom).await
    }

    pub async fn set_autofocus(&self, enable: bool) -> ViscaResult<()> {
        self.invoke(Operation::Autofocus(enable)).await
    }

    pub async fn toggle_autofocus(&self) -> ViscaResult<()> {
        self.invoke(Operation::ToggleAutofocus).await
    }

    pub async fn set_speed(&self, speed: u8) -> ViscaResult<()> {
        self.set_speeds(speed, speed).await
    }

    pub async fn set_speeds(&self, pan_speed: u8, tilt_speed: u8) -> ViscaResult<()> {
        self.request(|s| LinkCmd::SetSpeeds(pan_speed, tilt_speed, s)).await
    }

    pub async fn go_to_focus(&self, value: u16) -> ViscaResult<()> {
        self.request(|s| LinkCmd::GoToFocus(value, s)).await
    }

    pub async fn get_focus(&self) -> ViscaResult<u16> {
        self.request(LinkCmd::GetFocus).await
    }

    pub async fn get_autofocus(&self) -> ViscaResult<bool> {
        self.request(LinkCmd::GetAutofocus).await
    }

    pub async fn get_position(&self) -> ViscaResult<Position> {
        self.request(LinkCmd::GetPosition).await
    }

    pub async fn go_to_position(&self, target: Position) -> ViscaResult<()> {
        self.request(|s| LinkCmd::GoToPosition(target, s)).await
    }

    /// Closes the underlying link. Other handles get `NotConnected` from then on.
    pub async fn close(&self) -> ViscaResult<()> {
        self.request(LinkCmd::Close).await
    }

    /// Reads the position every `period`, first reading immediately. The stream
    /// ends after the link is closed or its thread is gone; a lost reply closes
    /// the link, so a timed-out reading is the last one. Periods under 1 ms are
    /// raised to 1 ms. Must be called from inside a tokio runtime.
    pub fn poll_position(&self, period: Duration) -> impl Stream<Item = ViscaResult<Position>> {
        let mut interval = time::interval(period.max(MIN_POLL_PERIOD));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        futures::stream::unfold(Some((self.clone(), interval)), |state| async move {
            let Some((handle, mut interval)) = state else {
                return None;
            };
            interval.tick().await;
            let r = handle.get_position().await;
            let gone = matches!(
                r,
                Err(ViscaError::NotConnected | ViscaError::AsyncChannelClosed | ViscaError::AsyncChannelNoSender)
            );
            Some((r, if gone { None } else { Some((handle, interval)) }))
        })
    }
}
