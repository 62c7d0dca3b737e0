use crate::visca::{Direction, ZoomDirection};

/// Absolute head position as reported by the camera, in raw VISCA units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
  pub pan: u16,
  pub tilt: u16,
  pub zoom: u16,
}

/// A fire-and-confirm camera action, for binding to buttons once and invoking
/// repeatedly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
  Steer(Direction),
  StopSteer,
  Zoom(ZoomDirection),
  StopZoom,
  Center,
  Autofocus(bool),
  ToggleAutofocus,
}

impl Operation {
  /// The operation to send when a press-and-hold control is released.
  pub fn release(self) -> Option<Operation> {
    match self {
      Operation::Steer(_) => Some(Operation::StopSteer),
      Operation::Zoom(_) => Some(Operation::StopZoom),
      _ => None,
    }
  }
}
