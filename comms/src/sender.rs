//! The implementation of the sending end of the control channel.

use std::io::{self, Write};

use bytemuck::Pod;

use crate::{Frame, msg::Signal};

/// The sending end handle of the control channel.
pub struct ControlSender<W: Write> {
    tx: W,
    buf: Vec<u8>,
}

impl<W: Write> ControlSender<W> {
    /// Creates a new `ControlSender` instance.
    ///
    /// # Arguments
    /// * `tx` - The underlying writer.
    pub(super) fn new(tx: W) -> Self {
        Self {
            tx,
            buf: Vec::new(),
        }
    }

    /// Sends a fixed-size `value` through the inner writer.
    ///
    /// # Arguments
    /// * `value` - A frame to transfer.
    ///
    /// # Returns
    /// A result object that returns `io::Error` on failure.
    pub fn send<T: Frame>(&mut self, value: &T) -> io::Result<()> {
        let Self { tx, buf } = self;

        buf.clear();
        buf.resize(T::SIZE, 0);
        value.encode(buf);

        tx.write_all(buf)?;
        tx.flush()
    }

    /// Sends a control signal, the continue flag first and then the header if any.
    ///
    /// # Arguments
    /// * `signal` - The signal for the worker on the other end.
    ///
    /// # Returns
    /// A result object that returns `io::Error` on failure.
    pub fn send_signal(&mut self, signal: &Signal) -> io::Result<()> {
        match signal {
            Signal::Continue(header) => {
                self.send(&true)?;
                self.send(header)
            }
            Signal::Stop => self.send(&false),
        }
    }

    /// Sends the raw bytes of a plain-old-data `value`.
    ///
    /// # Arguments
    /// * `value` - The value to transfer, usually a loss metric.
    ///
    /// # Returns
    /// A result object that returns `io::Error` on failure.
    pub fn send_pod<T: Pod>(&mut self, value: &T) -> io::Result<()> {
        self.tx.write_all(bytemuck::bytes_of(value))?;
        self.tx.flush()
    }

    /// Unwraps the inner writer.
    pub fn into_inner(self) -> W {
        self.tx
    }
}
