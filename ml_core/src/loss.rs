use std::{fmt::Debug, ops::AddAssign};

use bytemuck::Pod;

/// An accumulable, comparable quantity returned per datum and summed per round.
///
/// The coordinator never looks inside a metric, it only needs:
/// - a zero value (`Default`);
/// - in-place accumulation, which must be commutative and associative since
///   replies from different workers are folded in arrival order;
/// - an ordering, `a < b` meaning `a` is the better loss;
/// - a fixed-size byte representation (`Pod`) to cross the control pipe.
///
/// Implemented for every type meeting those bounds, `f32` and `f64` included.
pub trait LossMetric: Pod + Default + AddAssign + PartialOrd + Debug {}

impl<T> LossMetric for T where T: Pod + Default + AddAssign + PartialOrd + Debug {}
