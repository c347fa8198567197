use std::io;

/// A value with a fixed-size binary representation on the control channel.
///
/// Every frame is transferred as exactly `SIZE` bytes, so the receiving end
/// always knows how much to read before decoding.
pub trait Frame: Sized {
    /// The amount of bytes a value of this type occupies on the wire.
    const SIZE: usize;

    /// Writes the value into `buf`.
    ///
    /// # Arguments
    /// * `buf` - A buffer of exactly `Self::SIZE` bytes.
    fn encode(&self, buf: &mut [u8]);

    /// Reads a value back from `buf`.
    ///
    /// # Arguments
    /// * `buf` - A buffer of exactly `Self::SIZE` bytes.
    ///
    /// # Returns
    /// The decoded value or `io::ErrorKind::InvalidData` if the bytes don't
    /// represent a valid value.
    fn decode(buf: &[u8]) -> io::Result<Self>;
}

impl Frame for bool {
    const SIZE: usize = 1;

    fn encode(&self, buf: &mut [u8]) {
        buf[0] = u8::from(*self);
    }

    fn decode(buf: &[u8]) -> io::Result<Self> {
        match buf[0] {
            0 => Ok(false),
            1 => Ok(true),
            byte => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Received an invalid bool byte {byte}"),
            )),
        }
    }
}

pub(crate) fn read_u32(buf: &[u8]) -> u32 {
    u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]])
}
