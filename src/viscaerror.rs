use std::io;
use thiserror::Error;

pub type ViscaResult<T> = Result<T, ViscaError>;

#[derive(Debug, Error)]
pub enum ViscaError {
  #[error("camera link is not open")]
  NotConnected,

  #[error("no reply terminator before the read deadline")]
  Timeout,

  #[error("camera rejected command with status {}", hex::encode(.0))]
  CommandRejected(Vec<u8>),

  #[error("malformed reply: {0}")]
  ProtocolError(String),

  /// The zoom frame of a position move was accepted but the pan/tilt frame
  /// was not. The camera may already be zooming.
  #[error("position move only partly issued: {0}")]
  PartialCommand(Box<ViscaError>),

  #[error("invalid argument: {0}")]
  InvalidArgument(String),

  #[error("couldn't open camera link: {0}")]
  ConnectionError(String),

  #[error("Sending to a closed channel")]
  AsyncChannelClosed,

  #[error("Receiving from a closed channel")]
  AsyncChannelNoSender,

  #[error(transparent)]
  Io(#[from] io::Error),
}

impl From<serialport::Error> for ViscaError {
  fn from(err: serialport::Error) -> Self {
    ViscaError::ConnectionError(err.to_string())
  }
}
