//! Lock-Free Telemetry Queue Between the Sampling and Dispatch Cadences
#![allow(unsafe_code)] // Required for lock-free atomic operations
//!
//! ## Overview
//!
//! This module implements the bounded, lock-free Single Producer Single Consumer
//! (SPSC) queue that sits between the sampling task (producer) and the dispatch
//! task (consumer). It is the only buffer the two cadences share.
//!
//! ## Why Lock-Free?
//!
//! The sampling task may run from a timer interrupt while the dispatcher runs
//! at thread level. A mutex would let a low-priority dispatcher block the
//! sampler, and a blocking sampler would skew the sample timing. With atomic
//! indices neither side ever waits:
//! ```text
//! Sampler (producer)                 Dispatcher (consumer)
//!      ↓                                   ↓
//!   Atomic Write ────→ Ring Buffer ←─── Atomic Read
//!      ↓                                   ↓
//!   Never Blocks                       Never Blocks
//! ```
//!
//! ## Algorithm
//!
//! Indices run over `[0, 2N)` and the slot is `index % N`. Running the indices
//! over twice the capacity lets the queue tell "full" from "empty" without
//! sacrificing a slot, so all `N` slots are usable:
//!
//! ```text
//! ┌─────┬─────┬─────┬─────┬─────┬─────┬─────┬─────┐
//! │  0  │  1  │  2  │  3  │  4  │  5  │  6  │  7  │
//! └─────┴─────┴─────┴─────┴─────┴─────┴─────┴─────┘
//!          ↑                       ↑
//!        tail                    head
//!        (next read)          (next write)
//!
//! len = (head - tail) mod 2N     empty: len == 0     full: len == N
//! ```
//!
//! ### Enqueue (Producer)
//! 1. Load head (Relaxed, only the producer writes it)
//! 2. Load tail with Acquire ordering
//! 3. If full: count the drop and reject the new sample (drop-newest)
//! 4. Write the slot
//! 5. Publish head with Release ordering
//!
//! ### Dequeue (Consumer)
//! 1. Load tail (Relaxed, only the consumer writes it)
//! 2. Load head with Acquire ordering
//! 3. If empty: return `None`
//! 4. Read the slot
//! 5. Publish tail with Release ordering
//!
//! ## Ownership
//!
//! The single-producer/single-consumer contract is enforced by the type
//! system: [`TelemetryQueue::split`] hands out exactly one
//! [`QueueProducer`] and one [`QueueConsumer`], and only once. Neither handle
//! is `Clone`.
//!
//! ## Performance Characteristics
//!
//! | Operation | Time Complexity | Blocking |
//! |-----------|----------------|----------|
//! | Enqueue   | O(1)           | Never    |
//! | Dequeue   | O(1)           | Never    |
//! | Len       | O(1)           | Never    |

use core::cell::UnsafeCell;
use core::mem::MaybeUninit;
use core::ptr;
use core::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

use crate::errors::QueueFull;

/// Bounded lock-free SPSC queue
///
/// ## Memory Layout
///
/// ```text
/// TelemetryQueue<SensorSample, 20> layout:
/// ├── buffer: 20 * 48 = 960 bytes
/// ├── head/tail: 2 * 8 bytes
/// ├── split flag: 1 byte
/// ├── stats: 16 bytes
/// Total: ~1 KB
/// ```
///
/// ## Example Usage
///
/// ```rust
/// use vibemon_core::queue::TelemetryQueue;
/// use vibemon_core::sample::SensorSample;
///
/// static QUEUE: TelemetryQueue<SensorSample, 20> = TelemetryQueue::new();
///
/// let (mut producer, mut consumer) = QUEUE.split().unwrap();
///
/// // Sampling task
/// if producer.enqueue(SensorSample::new(1000)).is_err() {
///     // Dropped, queue full
/// }
///
/// // Dispatch task
/// while let Some(sample) = consumer.dequeue() {
///     assert_eq!(sample.timestamp, 1000);
/// }
/// ```
pub struct TelemetryQueue<T, const N: usize> {
    /// Ring buffer storage
    buffer: UnsafeCell<[MaybeUninit<T>; N]>,

    /// Next write index in `[0, 2N)` (producer owned)
    head: AtomicUsize,

    /// Next read index in `[0, 2N)` (consumer owned)
    tail: AtomicUsize,

    /// Set once the producer/consumer handles have been handed out
    split: AtomicBool,

    /// Queue statistics
    stats: QueueStats,
}

/// Queue statistics
///
/// Track queue health without impacting performance
#[derive(Debug)]
pub struct QueueStats {
    /// Total samples accepted
    pub pushed: AtomicU32,
    /// Total samples removed
    pub popped: AtomicU32,
    /// Samples rejected because the queue was full
    pub dropped: AtomicU32,
    /// Maximum queue depth seen
    pub max_depth: AtomicU32,
}

/// Point-in-time copy of [`QueueStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStatsSnapshot {
    pub pushed: u32,
    pub popped: u32,
    pub dropped: u32,
    pub max_depth: u32,
}

impl QueueStats {
    const fn new() -> Self {
        Self {
            pushed: AtomicU32::new(0),
            popped: AtomicU32::new(0),
            dropped: AtomicU32::new(0),
            max_depth: AtomicU32::new(0),
        }
    }

    /// Update max depth if current is higher
    fn update_max_depth(&self, current: u32) {
        let mut max = self.max_depth.load(Ordering::Relaxed);
        while current > max {
            match self.max_depth.compare_exchange_weak(
                max,
                current,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => max = actual,
            }
        }
    }

    /// Copy the counters
    pub fn snapshot(&self) -> QueueStatsSnapshot {
        QueueStatsSnapshot {
            pushed: self.pushed.load(Ordering::Relaxed),
            popped: self.popped.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            max_depth: self.max_depth.load(Ordering::Relaxed),
        }
    }
}

impl<T: Copy, const N: usize> TelemetryQueue<T, N> {
    const NONZERO_CAPACITY: () = assert!(N > 0, "Queue capacity must be non-zero");

    /// Create new empty queue
    ///
    /// Can be used in static context
    pub const fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::NONZERO_CAPACITY;

        Self {
            // An array of `MaybeUninit` needs no initialization
            buffer: UnsafeCell::new(unsafe { MaybeUninit::uninit().assume_init() }),
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
            split: AtomicBool::new(false),
            stats: QueueStats::new(),
        }
    }

    /// Hand out the producer and consumer handles
    ///
    /// Returns `None` on every call after the first.
    pub fn split(&self) -> Option<(QueueProducer<'_, T, N>, QueueConsumer<'_, T, N>)> {
        if self.split.swap(true, Ordering::AcqRel) {
            return None;
        }
        Some((QueueProducer { queue: self }, QueueConsumer { queue: self }))
    }

    /// Maximum number of queued samples
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Get current queue length
    ///
    /// The other side may change it immediately after the call returns.
    pub fn len(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        Self::distance(head, tail)
    }

    /// Check if queue is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check if queue is full
    pub fn is_full(&self) -> bool {
        self.len() == N
    }

    /// Get queue statistics
    pub fn stats(&self) -> &QueueStats {
        &self.stats
    }

    /// Number of occupied slots between two indices
    #[inline]
    fn distance(head: usize, tail: usize) -> usize {
        (head + 2 * N - tail) % (2 * N)
    }

    /// Advance an index, wrapping at `2N`
    #[inline]
    fn next_index(index: usize) -> usize {
        if index + 1 == 2 * N {
            0
        } else {
            index + 1
        }
    }

    #[inline]
    fn slot(&self, index: usize) -> *mut MaybeUninit<T> {
        // Pointer arithmetic only; no reference to the whole array is formed
        // so the two sides never alias.
        unsafe { (self.buffer.get() as *mut MaybeUninit<T>).add(index % N) }
    }

    fn enqueue(&self, item: T) -> Result<(), QueueFull> {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);

        let depth = Self::distance(head, tail);
        if depth == N {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            return Err(QueueFull { capacity: N });
        }

        // Safe because the slot is outside [tail, head) so the consumer
        // does not touch it, and there is only one producer.
        unsafe {
            ptr::write(self.slot(head), MaybeUninit::new(item));
        }

        // Make write visible before updating head
        self.head.store(Self::next_index(head), Ordering::Release);

        self.stats.pushed.fetch_add(1, Ordering::Relaxed);
        self.stats.update_max_depth((depth + 1) as u32);

        Ok(())
    }

    fn dequeue(&self) -> Option<T> {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);

        if head == tail {
            return None;
        }

        // Safe because the producer published this slot with the Release
        // store observed above and will not reuse it until tail moves.
        let item = unsafe { ptr::read(self.slot(tail)).assume_init() };

        self.tail.store(Self::next_index(tail), Ordering::Release);
        self.stats.popped.fetch_add(1, Ordering::Relaxed);

        Some(item)
    }
}

impl<T: Copy, const N: usize> Default for TelemetryQueue<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

// Safe to share between threads: the split handles guarantee one writer per index
unsafe impl<T: Send, const N: usize> Sync for TelemetryQueue<T, N> {}

/// Writing half of a [`TelemetryQueue`]
pub struct QueueProducer<'a, T, const N: usize> {
    queue: &'a TelemetryQueue<T, N>,
}

impl<'a, T: Copy, const N: usize> QueueProducer<'a, T, N> {
    /// Append a sample, rejecting it if the queue is full
    ///
    /// Never blocks and never overwrites queued samples.
    pub fn enqueue(&mut self, item: T) -> Result<(), QueueFull> {
        self.queue.enqueue(item)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.queue.is_full()
    }

    pub const fn capacity(&self) -> usize {
        N
    }
}

/// Reading half of a [`TelemetryQueue`]
pub struct QueueConsumer<'a, T, const N: usize> {
    queue: &'a TelemetryQueue<T, N>,
}

impl<'a, T: Copy, const N: usize> QueueConsumer<'a, T, N> {
    /// Remove the oldest sample
    pub fn dequeue(&mut self) -> Option<T> {
        self.queue.dequeue()
    }

    /// Drain every sample currently queued
    ///
    /// Samples enqueued while draining are drained too.
    pub fn drain(&mut self) -> QueueDrain<'_, 'a, T, N> {
        QueueDrain { consumer: self }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// Queue iterator for draining all samples
pub struct QueueDrain<'c, 'a, T, const N: usize> {
    consumer: &'c mut QueueConsumer<'a, T, N>,
}

impl<'c, 'a, T: Copy, const N: usize> Iterator for QueueDrain<'c, 'a, T, N> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        self.consumer.dequeue()
    }
}
