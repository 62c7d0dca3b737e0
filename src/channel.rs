//! The byte pipe a [`CameraLink`](crate::link::CameraLink) talks through.
//!
//! Line settings (baud, parity, stop bits) belong to whoever built the
//! channel. The link only writes whole frames and pulls bytes one at a time.

use std::io::{self, ErrorKind, Read, Write};

use serialport::{ClearBuffer, SerialPort};

pub trait ByteChannel {
    fn write_frame(&mut self, frame: &[u8]) -> io::Result<()>;

    /// Next byte from the camera. Fails with [`ErrorKind::TimedOut`] when the
    /// channel's own read deadline passes.
    fn read_byte(&mut self) -> io::Result<u8>;

    /// Throws away anything already buffered from the camera.
    fn discard_input(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn read_one<R: Read + ?Sized>(r: &mut R) -> io::Result<u8> {
    let mut b = [0u8; 1];
    loop {
        match r.read(&mut b) {
            Ok(0) => return Err(io::Error::new(ErrorKind::UnexpectedEof, "camera channel closed")),
            Ok(_) => return Ok(b[0]),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

impl ByteChannel for Box<dyn SerialPort> {
    fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        self.write_all(frame)?;
        self.flush()
    }

    fn read_byte(&mut self) -> io::Result<u8> {
        read_one(&mut **self)
    }

    fn discard_input(&mut self) -> io::Result<()> {
        self.clear(ClearBuffer::Input).map_err(io::Error::from)
    }
}

/// Adapts any blocking reader/writer, e.g. a TCP serial bridge or a pty.
/// Its read timeout must already be set for [`ViscaError::Timeout`] to fire
/// on a silent camera.
///
/// [`ViscaError::Timeout`]: crate::viscaerror::ViscaError::Timeout
#[derive(Debug)]
pub struct StreamChannel<T>(pub T);

impl<T: Read + Write> ByteChannel for StreamChannel<T> {
    fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        self.0.write_all(frame)?;
        self.0.flush()
    }

    fn read_byte(&mut self) -> io::Result<u8> {
        read_one(&mut self.0)
    }
}
