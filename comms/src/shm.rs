//! Anonymous shared memory and the process-shared semaphores living in it.
//!
//! Every mapping here is created with `MAP_SHARED | MAP_ANONYMOUS`, so it is
//! only reachable by the creating process and the children it forks after
//! creating it. No names are involved, a run can never collide with the
//! leftovers of a previous one.

use std::{
    io,
    num::NonZeroUsize,
    ptr::{self, NonNull},
};

use bytemuck::Pod;
use log::error;
use nix::{
    errno::Errno,
    libc,
    sys::mman::{self, MapFlags, ProtFlags},
};

/// A zero-initialized anonymous memory mapping shared with forked children.
///
/// Dropping the region unmaps it from the current process only, the other
/// processes keep their own mapping of the same pages.
pub struct SharedRegion {
    ptr: NonNull<u8>,
    len: NonZeroUsize,
}

impl SharedRegion {
    /// Maps a new region of `len` bytes.
    ///
    /// # Errors
    /// `io::ErrorKind::InvalidInput` if `len` is zero, or the `mmap` failure.
    pub fn anonymous(len: usize) -> io::Result<Self> {
        let len = NonZeroUsize::new(len).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "shared region must not be empty")
        })?;

        // SAFETY: A fresh anonymous mapping doesn't alias any existing object.
        let ptr = unsafe {
            mman::mmap_anonymous(
                None,
                len,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_SHARED,
            )
        }?;

        Ok(Self {
            ptr: ptr.cast(),
            len,
        })
    }

    /// Returns a typed pointer `offset` bytes into the region.
    pub(crate) fn at<T>(&self, offset: usize) -> NonNull<T> {
        debug_assert!(offset + size_of::<T>() <= self.len.get());
        debug_assert_eq!((self.ptr.as_ptr() as usize + offset) % align_of::<T>(), 0);

        // SAFETY: The offset stays inside the mapping, checked above in debug builds
        //         and guaranteed by every caller's layout computation.
        unsafe { self.ptr.add(offset).cast() }
    }
}

impl Drop for SharedRegion {
    fn drop(&mut self) {
        // SAFETY: The pointer and length come from the `mmap` call in `anonymous`.
        if let Err(e) = unsafe { mman::munmap(self.ptr.cast(), self.len.get()) } {
            error!("failed to unmap shared region: {e}");
        }
    }
}

/// A POSIX semaphore initialized as shared between processes.
pub struct Semaphore {
    raw: NonNull<libc::sem_t>,
}

impl Semaphore {
    /// Initializes the semaphore stored at `raw` with `value`.
    ///
    /// # Safety
    /// `raw` must point into a `SharedRegion` that outlives the returned
    /// semaphore, and no other semaphore may be initialized at that address.
    pub(crate) unsafe fn init(raw: NonNull<libc::sem_t>, value: u32) -> io::Result<Self> {
        // SAFETY: Guaranteed by the caller.
        if unsafe { libc::sem_init(raw.as_ptr(), 1, value) } == -1 {
            return Err(Errno::last().into());
        }

        Ok(Self { raw })
    }

    /// Decrements the semaphore, blocking while its value is zero.
    pub fn wait(&self) -> io::Result<()> {
        loop {
            // SAFETY: `raw` was initialized in `init` and is still mapped.
            if unsafe { libc::sem_wait(self.raw.as_ptr()) } == 0 {
                return Ok(());
            }

            match Errno::last() {
                Errno::EINTR => continue,
                errno => return Err(errno.into()),
            }
        }
    }

    /// Decrements the semaphore if its value is positive, never blocks.
    ///
    /// # Returns
    /// Whether the semaphore was decremented.
    pub fn try_wait(&self) -> io::Result<bool> {
        loop {
            // SAFETY: `raw` was initialized in `init` and is still mapped.
            if unsafe { libc::sem_trywait(self.raw.as_ptr()) } == 0 {
                return Ok(true);
            }

            match Errno::last() {
                Errno::EAGAIN => return Ok(false),
                Errno::EINTR => continue,
                errno => return Err(errno.into()),
            }
        }
    }

    /// Increments the semaphore, waking one blocked waiter if any.
    pub fn post(&self) -> io::Result<()> {
        // SAFETY: `raw` was initialized in `init` and is still mapped.
        if unsafe { libc::sem_post(self.raw.as_ptr()) } == -1 {
            return Err(Errno::last().into());
        }

        Ok(())
    }

    /// Waits on the semaphore and returns a guard that posts it back on drop.
    pub fn acquire(&self) -> io::Result<SemaphoreGuard<'_>> {
        self.wait()?;
        Ok(SemaphoreGuard { sem: self })
    }
}

/// Holds one unit of a binary semaphore used as a mutex.
pub struct SemaphoreGuard<'a> {
    sem: &'a Semaphore,
}

impl Drop for SemaphoreGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.sem.post() {
            error!("failed to release semaphore: {e}");
        }
    }
}

#[repr(C)]
struct CellLayout<T> {
    lock: libc::sem_t,
    value: T,
}

/// A single plain-old-data value visible to every process forked after its creation.
///
/// Every access holds the cell's own process-shared lock, so `update` is a
/// single atomic read-modify-write across processes.
pub struct SharedCell<T: Pod> {
    lock: Semaphore,
    value: NonNull<T>,
    _region: SharedRegion,
}

impl<T: Pod> SharedCell<T> {
    /// Maps a new cell holding `value`.
    pub fn new(value: T) -> io::Result<Self> {
        let region = SharedRegion::anonymous(size_of::<CellLayout<T>>())?;
        let base = region.at::<CellLayout<T>>(0).as_ptr();

        // SAFETY: `base` points to a zeroed mapping owned by `region`, large
        //         enough and page aligned for the layout.
        let (lock, value) = unsafe {
            let lock = Semaphore::init(NonNull::new_unchecked(&raw mut (*base).lock), 1)?;
            let slot = NonNull::new_unchecked(&raw mut (*base).value);
            ptr::write_volatile(slot.as_ptr(), value);
            (lock, slot)
        };

        Ok(Self {
            lock,
            value,
            _region: region,
        })
    }

    /// Reads the current value.
    pub fn get(&self) -> io::Result<T> {
        let _lock = self.lock.acquire()?;
        // SAFETY: The cell was initialized in `new` and `T` is `Pod`.
        Ok(unsafe { ptr::read_volatile(self.value.as_ptr()) })
    }

    /// Overwrites the current value.
    pub fn set(&self, value: T) -> io::Result<()> {
        let _lock = self.lock.acquire()?;
        // SAFETY: The cell was initialized in `new` and `T` is `Pod`.
        unsafe { ptr::write_volatile(self.value.as_ptr(), value) };
        Ok(())
    }

    /// Stores `value`, handing back the one it replaces.
    pub fn replace(&self, value: T) -> io::Result<T> {
        let _lock = self.lock.acquire()?;
        // SAFETY: The cell was initialized in `new` and `T` is `Pod`.
        let previous = unsafe { ptr::read_volatile(self.value.as_ptr()) };
        // SAFETY: Same as above.
        unsafe { ptr::write_volatile(self.value.as_ptr(), value) };
        Ok(previous)
    }

    /// Applies `f` to the current value and stores the result, without any
    /// other process accessing the cell in between.
    ///
    /// # Returns
    /// The stored value.
    pub fn update(&self, f: impl FnOnce(T) -> T) -> io::Result<T> {
        let _lock = self.lock.acquire()?;
        // SAFETY: The cell was initialized in `new` and `T` is `Pod`.
        let value = f(unsafe { ptr::read_volatile(self.value.as_ptr()) });
        // SAFETY: Same as above.
        unsafe { ptr::write_volatile(self.value.as_ptr(), value) };
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_region_is_rejected() {
        let err = SharedRegion::anonymous(0).err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn semaphore_counts() -> io::Result<()> {
        let region = SharedRegion::anonymous(size_of::<libc::sem_t>())?;
        let sem = unsafe { Semaphore::init(region.at(0), 2)? };

        assert!(sem.try_wait()?);
        assert!(sem.try_wait()?);
        assert!(!sem.try_wait()?);

        sem.post()?;
        {
            let _guard = sem.acquire()?;
            assert!(!sem.try_wait()?);
        }
        assert!(sem.try_wait()?);
        Ok(())
    }

    #[test]
    fn cell_updates_in_place() -> io::Result<()> {
        let cell = SharedCell::new([1.0f32, 2.0])?;
        assert_eq!(cell.update(|[a, b]| [a + 1.0, b * 2.0])?, [2.0, 4.0]);
        assert_eq!(cell.get()?, [2.0, 4.0]);

        cell.set([0.0; 2])?;
        assert_eq!(cell.get()?, [0.0, 0.0]);
        Ok(())
    }

    #[test]
    fn replace_hands_back_the_previous_value() -> io::Result<()> {
        let cell = SharedCell::new(7u64)?;
        assert_eq!(cell.replace(0)?, 7);
        assert_eq!(cell.replace(3)?, 0);
        assert_eq!(cell.get()?, 3);
        Ok(())
    }
}
