//! The bounded, priority-ordered work queue shared by the orchestrator and its workers.

use std::{io, ptr::NonNull};

use nix::libc;

use crate::shm::{Semaphore, SharedRegion};

/// The reserved raw index telling a worker its round is over.
pub const STOP_INDEX: u32 = u32::MAX;

const LANES: usize = 2;

/// The lane an item is enqueued in, higher priorities are drained first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    Normal = 0,
    Urgent = 1,
}

/// A single record travelling through the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkItem {
    /// A dataset index for the current round.
    Index(u32),
    /// The poison pill ending a worker's round.
    Stop,
}

impl WorkItem {
    fn into_raw(self) -> u32 {
        match self {
            WorkItem::Index(index) => index,
            WorkItem::Stop => STOP_INDEX,
        }
    }

    fn from_raw(raw: u32) -> Self {
        match raw {
            STOP_INDEX => WorkItem::Stop,
            index => WorkItem::Index(index),
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy)]
struct Lane {
    head: u32,
    len: u32,
}

#[repr(C)]
struct QueueLayout {
    lock: libc::sem_t,
    items: libc::sem_t,
    slots: libc::sem_t,
    lanes: [Lane; LANES],
}

/// A bounded multi-producer/multi-consumer queue of `u32` records.
///
/// The queue lives in anonymous shared memory and has to be created before the
/// workers are forked. Three semaphores drive it: `slots` counts free space
/// (senders block on it), `items` counts queued records (receivers block on
/// it) and `lock` guards the two ring buffers.
pub struct WorkQueue {
    lock: Semaphore,
    items: Semaphore,
    slots: Semaphore,
    lanes: NonNull<Lane>,
    buffers: NonNull<u32>,
    capacity: usize,
    _region: SharedRegion,
}

impl WorkQueue {
    /// Creates a new `WorkQueue` holding at most `capacity` records overall.
    ///
    /// # Errors
    /// `io::ErrorKind::InvalidInput` for a zero capacity or one a semaphore
    /// can't count up to, or the shared memory setup failure.
    pub fn new(capacity: usize) -> io::Result<Self> {
        if capacity == 0 || capacity > i32::MAX as usize {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid work queue capacity {capacity}"),
            ));
        }

        let data_offset = size_of::<QueueLayout>().next_multiple_of(align_of::<u32>());
        let region = SharedRegion::anonymous(data_offset + LANES * capacity * size_of::<u32>())?;
        let base = region.at::<QueueLayout>(0).as_ptr();

        // SAFETY: `base` points to a zeroed mapping owned by `region`, which the
        //         queue keeps alive for as long as the semaphores are in use.
        let (lock, items, slots, lanes) = unsafe {
            (
                Semaphore::init(NonNull::new_unchecked(&raw mut (*base).lock), 1)?,
                Semaphore::init(NonNull::new_unchecked(&raw mut (*base).items), 0)?,
                Semaphore::init(NonNull::new_unchecked(&raw mut (*base).slots), capacity as u32)?,
                NonNull::new_unchecked(&raw mut (*base).lanes).cast(),
            )
        };

        Ok(Self {
            lock,
            items,
            slots,
            lanes,
            buffers: region.at(data_offset),
            capacity,
            _region: region,
        })
    }

    /// Enqueues `item`, blocking while the queue is full.
    ///
    /// # Errors
    /// `io::ErrorKind::InvalidInput` if an index collides with the stop
    /// sentinel, or a semaphore failure.
    pub fn send(&self, item: WorkItem, priority: Priority) -> io::Result<()> {
        if item == WorkItem::Index(STOP_INDEX) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "index collides with the stop sentinel",
            ));
        }

        self.slots.wait()?;
        {
            let _lock = self.lock.acquire()?;
            let lane = priority as usize;

            // SAFETY: The ring lock is held and `slots` guarantees a free cell.
            unsafe {
                let Lane { head, len } = self.lane(lane).read();
                debug_assert!((len as usize) < self.capacity);

                let tail = (head as usize + len as usize) % self.capacity;
                self.cell(lane, tail).write(item.into_raw());
                self.lane(lane).write(Lane { head, len: len + 1 });
            }
        }
        self.items.post()
    }

    /// Dequeues the oldest item of the highest non-empty lane, blocking while
    /// the queue is empty.
    pub fn recv(&self) -> io::Result<WorkItem> {
        self.items.wait()?;
        self.pop()
    }

    /// Dequeues an item if one is available, never blocks.
    pub fn try_recv(&self) -> io::Result<Option<WorkItem>> {
        if !self.items.try_wait()? {
            return Ok(None);
        }

        self.pop().map(Some)
    }

    fn pop(&self) -> io::Result<WorkItem> {
        let raw = {
            let _lock = self.lock.acquire()?;

            // SAFETY: The ring lock is held and `items` guarantees a queued record.
            unsafe {
                let urgent = Priority::Urgent as usize;
                let lane = if self.lane(urgent).read().len > 0 {
                    urgent
                } else {
                    Priority::Normal as usize
                };

                let Lane { head, len } = self.lane(lane).read();
                debug_assert!(len > 0);

                let raw = self.cell(lane, head as usize).read();
                let head = (head as usize + 1) % self.capacity;
                self.lane(lane).write(Lane {
                    head: head as u32,
                    len: len - 1,
                });
                raw
            }
        };

        self.slots.post()?;
        Ok(WorkItem::from_raw(raw))
    }

    /// # Safety
    /// The caller must hold the ring lock and `lane < LANES`.
    unsafe fn lane(&self, lane: usize) -> *mut Lane {
        unsafe { self.lanes.as_ptr().add(lane) }
    }

    /// # Safety
    /// The caller must hold the ring lock, `lane < LANES` and `pos < capacity`.
    unsafe fn cell(&self, lane: usize, pos: usize) -> *mut u32 {
        unsafe { self.buffers.as_ptr().add(lane * self.capacity + pos) }
    }
}
