use std::io::{self, Read};

use bytemuck::Pod;

use crate::{Frame, msg::Signal};

/// The receiving end handle of the control channel.
pub struct ControlReceiver<R: Read> {
    rx: R,
    buf: Vec<u8>,
}

impl<R: Read> ControlReceiver<R> {
    /// Creates a new `ControlReceiver` instance.
    ///
    /// # Arguments
    /// * `rx` - The underlying reader.
    pub(super) fn new(rx: R) -> Self {
        Self {
            rx,
            buf: Vec::new(),
        }
    }

    /// Blocks until a whole frame arrives from the inner reader.
    ///
    /// # Returns
    /// A result object that returns `T` on success or `io::Error` on failure,
    /// `io::ErrorKind::UnexpectedEof` if the other end went away mid-frame.
    pub fn recv<T: Frame>(&mut self) -> io::Result<T> {
        let Self { rx, buf } = self;

        buf.clear();
        buf.resize(T::SIZE, 0);
        rx.read_exact(buf)?;

        T::decode(buf)
    }

    /// Blocks until the next control signal arrives.
    ///
    /// # Returns
    /// The received signal or `io::Error` on failure.
    pub fn recv_signal(&mut self) -> io::Result<Signal> {
        if self.recv::<bool>()? {
            Ok(Signal::Continue(self.recv()?))
        } else {
            Ok(Signal::Stop)
        }
    }

    /// Blocks until the raw bytes of a plain-old-data value arrive.
    ///
    /// # Returns
    /// The received value or `io::Error` on failure.
    pub fn recv_pod<T: Pod>(&mut self) -> io::Result<T> {
        let mut value = T::zeroed();
        self.rx.read_exact(bytemuck::bytes_of_mut(&mut value))?;
        Ok(value)
    }

    /// Unwraps the inner reader.
    pub fn into_inner(self) -> R {
        self.rx
    }
}
