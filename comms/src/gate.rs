//! The cross-process gate serializing model updates.

use std::{io, ptr::NonNull};

use nix::libc;

use crate::shm::{Semaphore, SemaphoreGuard, SharedRegion};

#[repr(C)]
struct GateLayout {
    update: libc::sem_t,
    counter_lock: libc::sem_t,
    counter: u32,
}

/// A shared counter and two binary semaphores living in anonymous shared memory.
///
/// The gate must be created before the worker processes are forked, every
/// worker then holds its own handle onto the same memory. Invariants:
/// - the counter is only touched through a `CounterGuard`;
/// - the model update is only applied while holding an `UpdateGuard`.
pub struct Gate {
    update: Semaphore,
    counter_lock: Semaphore,
    counter: NonNull<u32>,
    _region: SharedRegion,
}

impl Gate {
    /// Creates a new `Gate` with both semaphores released and the counter at zero.
    ///
    /// # Returns
    /// A new gate or an io error if the shared memory couldn't be set up.
    pub fn new() -> io::Result<Self> {
        let region = SharedRegion::anonymous(size_of::<GateLayout>())?;
        let base = region.at::<GateLayout>(0).as_ptr();

        // SAFETY: `base` points to a zeroed mapping owned by `region`, which the
        //         gate keeps alive for as long as the semaphores are in use.
        let (update, counter_lock, counter) = unsafe {
            (
                Semaphore::init(NonNull::new_unchecked(&raw mut (*base).update), 1)?,
                Semaphore::init(NonNull::new_unchecked(&raw mut (*base).counter_lock), 1)?,
                NonNull::new_unchecked(&raw mut (*base).counter),
            )
        };

        Ok(Self {
            update,
            counter_lock,
            counter,
            _region: region,
        })
    }

    /// Blocks until the counter lock is held.
    pub fn lock_counter(&self) -> io::Result<CounterGuard<'_>> {
        Ok(CounterGuard {
            _lock: self.counter_lock.acquire()?,
            counter: self.counter,
        })
    }

    /// Blocks until the update lock is held.
    pub fn lock_update(&self) -> io::Result<UpdateGuard<'_>> {
        Ok(UpdateGuard {
            _lock: self.update.acquire()?,
        })
    }
}

/// Exclusive access to the shared counter, released on drop.
pub struct CounterGuard<'a> {
    _lock: SemaphoreGuard<'a>,
    counter: NonNull<u32>,
}

impl CounterGuard<'_> {
    /// The current counter value.
    pub fn value(&self) -> u32 {
        // SAFETY: The counter lock is held and the gate's region is still mapped.
        unsafe { self.counter.as_ptr().read_volatile() }
    }

    /// Increments the counter.
    ///
    /// # Returns
    /// The value after the increment.
    pub fn increment(&mut self) -> u32 {
        let next = self.value().wrapping_add(1);
        // SAFETY: The counter lock is held and the gate's region is still mapped.
        unsafe { self.counter.as_ptr().write_volatile(next) };
        next
    }

    /// Sets the counter back to zero.
    pub fn reset(&mut self) {
        // SAFETY: The counter lock is held and the gate's region is still mapped.
        unsafe { self.counter.as_ptr().write_volatile(0) };
    }
}

/// Proof of holding the update critical section, released on drop.
pub struct UpdateGuard<'a> {
    _lock: SemaphoreGuard<'a>,
}
