use std::time::Duration;

use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::debug;

use crate::viscaerror::ViscaResult;

/// Line settings for the camera's RS-232 port. The defaults are what these
/// cameras use out of the box: 9600 baud, 8N1, no flow control.
#[derive(Debug, Clone)]
pub struct SerialProfile {
  pub baud: u32,
  pub data_bits: DataBits,
  pub parity: Parity,
  pub stop_bits: StopBits,
  pub flow_control: FlowControl,
  /// Per-read timeout of the port itself.
  pub timeout: Duration,
}

impl Default for SerialProfile {
  fn default() -> Self {
    SerialProfile {
      baud: 9600,
      data_bits: DataBits::Eight,
      parity: Parity::None,
      stop_bits: StopBits::One,
      flow_control: FlowControl::None,
      timeout: Duration::from_secs(5),
    }
  }
}

pub fn open_port(path: &str, profile: &SerialProfile) -> ViscaResult<Box<dyn SerialPort>> {
  debug!("opening {path} at {} baud", profile.baud);
  let port = serialport::new(path, profile.baud)
    .data_bits(profile.data_bits)
    .parity(profile.parity)
    .stop_bits(profile.stop_bits)
    .flow_control(profile.flow_control)
    .timeout(profile.timeout)
    .open()?;
  Ok(port)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::viscaerror::ViscaError;

  #[test]
  fn default_profile_is_9600_8n1() {
    let p = SerialProfile::default();
    assert_eq!(p.baud, 9600);
    assert_eq!(p.data_bits, DataBits::Eight);
    assert_eq!(p.parity, Parity::None);
    assert_eq!(p.stop_bits, StopBits::One);
    assert_eq!(p.flow_control, FlowControl::None);
  }

  #[test]
  fn missing_port_is_a_connection_error() {
    let r = open_port("/nonexistent/visca-port", &SerialProfile::default());
    assert!(matches!(r, Err(ViscaError::ConnectionError(_))));
  }
}
