mod frame;
pub mod gate;
pub mod msg;
pub mod queue;
mod receiver;
mod sender;
pub mod shm;

use std::{
    fs::File,
    io::{self, Read, Write},
};

pub use frame::Frame;
pub use gate::Gate;
pub use queue::{Priority, WorkItem, WorkQueue};
pub use receiver::ControlReceiver;
pub use sender::ControlSender;
pub use shm::SharedCell;

/// Creates both `ControlReceiver` and `ControlSender` channel parts.
///
/// Given a reader and a writer creates and returns both ends of the communication.
///
/// # Arguments
/// * `rx` - A blocking readable.
/// * `tx` - A blocking writable.
///
/// # Returns
/// A control channel in the form of a receiver and a sender.
pub fn channel<R, W>(rx: R, tx: W) -> (ControlReceiver<R>, ControlSender<W>)
where
    R: Read,
    W: Write,
{
    (ControlReceiver::new(rx), ControlSender::new(tx))
}

/// Opens an OS pipe and wraps its ends as a one-way control channel.
///
/// Both ends survive a `fork`, so the pipe has to be opened before the worker
/// processes are spawned. Each process then drops the end it doesn't use.
///
/// # Returns
/// The reading and writing ends of the pipe or an io error if failed to do so.
pub fn pipe() -> io::Result<(ControlReceiver<File>, ControlSender<File>)> {
    let (rx, tx) = nix::unistd::pipe()?;
    Ok(channel(File::from(rx), File::from(tx)))
}
