use std::io;

use crate::{Frame, frame::read_u32};

/// The per-round instructions broadcast to every worker.
///
/// Wire layout, big endian, 14 bytes:
/// `is_dev: u8 | end_of_epoch: u8 | report_frequency: u32 | epoch: u32 | learning_scale: f32`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoundHeader {
    /// Whether the round's indices address the dev set (evaluation only).
    pub is_dev: bool,
    /// Whether this is the last training round of the epoch.
    pub end_of_epoch: bool,
    /// Amount of primary units between two progress reports.
    pub report_frequency: u32,
    /// The one-based epoch the round belongs to.
    pub epoch: u32,
    /// The multiplier applied to the optimizer's update step.
    pub learning_scale: f32,
}

impl RoundHeader {
    /// A training round header.
    pub fn train(end_of_epoch: bool, report_frequency: u32, epoch: u32, learning_scale: f32) -> Self {
        Self {
            is_dev: false,
            end_of_epoch,
            report_frequency,
            epoch,
            learning_scale,
        }
    }

    /// An evaluation round header, never marks the end of an epoch.
    pub fn dev(report_frequency: u32, epoch: u32, learning_scale: f32) -> Self {
        Self {
            is_dev: true,
            end_of_epoch: false,
            report_frequency,
            epoch,
            learning_scale,
        }
    }
}

impl Frame for RoundHeader {
    const SIZE: usize = 14;

    fn encode(&self, buf: &mut [u8]) {
        self.is_dev.encode(&mut buf[0..1]);
        self.end_of_epoch.encode(&mut buf[1..2]);
        buf[2..6].copy_from_slice(&self.report_frequency.to_be_bytes());
        buf[6..10].copy_from_slice(&self.epoch.to_be_bytes());
        buf[10..14].copy_from_slice(&self.learning_scale.to_be_bytes());
    }

    fn decode(buf: &[u8]) -> io::Result<Self> {
        Ok(Self {
            is_dev: bool::decode(&buf[0..1])?,
            end_of_epoch: bool::decode(&buf[1..2])?,
            report_frequency: read_u32(&buf[2..6]),
            epoch: read_u32(&buf[6..10]),
            learning_scale: f32::from_bits(read_u32(&buf[10..14])),
        })
    }
}

/// The orchestrator to worker control signal.
///
/// On the wire a signal is a `bool` continue flag, followed by a
/// `RoundHeader` only when the flag is set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Signal {
    Continue(RoundHeader),
    Stop,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_keeps_field_order() {
        let header = RoundHeader::train(true, 7, 3, 0.5);
        let mut buf = [0; RoundHeader::SIZE];
        header.encode(&mut buf);

        assert_eq!(buf[0], 0);
        assert_eq!(buf[1], 1);
        assert_eq!(&buf[2..6], &7u32.to_be_bytes());
        assert_eq!(&buf[6..10], &3u32.to_be_bytes());
        assert_eq!(&buf[10..14], &0.5f32.to_be_bytes());
        assert_eq!(RoundHeader::decode(&buf).unwrap(), header);
    }

    #[test]
    fn header_rejects_bad_flag() {
        let mut buf = [0; RoundHeader::SIZE];
        RoundHeader::dev(1, 1, 1.0).encode(&mut buf);
        buf[1] = 9;

        let err = RoundHeader::decode(&buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
