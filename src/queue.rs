/// `queue.rs` — lock-free SPSC ring queue
///
/// Fixed-capacity single-producer/single-consumer ring, one instance per
/// direction per worker. `split()` hands out exactly one `Producer` and one
/// `Consumer`; neither is `Clone`, so the one-producer/one-consumer
/// discipline is enforced by the type system rather than by convention.
///
/// Contract: `push` never blocks and reports a full ring by handing the item
/// back; `pop` never blocks and returns `None` on empty. Callers own their
/// backpressure policy. Usable capacity is `capacity - 1` (a ring with
/// `head == tail` is empty, so one slot always stays free).

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Default slot count for the high-rate signal ring (worker → host).
pub const SIGNAL_QUEUE_CAPACITY: usize = 65_536;
/// Default slot count for the low-rate UI event ring (worker → host).
pub const EVENT_QUEUE_CAPACITY: usize = 1_024;

// ── Ring storage ──────────────────────────────────────────────────────────────

struct Slot<T> {
    value: UnsafeCell<MaybeUninit<T>>,
    valid: AtomicBool,
}

/// Head/tail live on their own cache lines so the producer and consumer do
/// not invalidate each other on every advance.
#[repr(align(64))]
struct CacheAligned(AtomicUsize);

pub struct SpscRing<T> {
    slots: Box<[Slot<T>]>,
    /// Consumer-owned read index.
    head: CacheAligned,
    /// Producer-owned write index.
    tail: CacheAligned,
}

// SAFETY: slots are transferred between the two sides through the
// valid/head/tail protocol below; a slot is only written while invalid and
// unreachable by the consumer, and only read after an acquire-load of `valid`.
unsafe impl<T: Send> Send for SpscRing<T> {}
unsafe impl<T: Send> Sync for SpscRing<T> {}

impl<T> SpscRing<T> {
    /// `capacity` is the slot count; `capacity - 1` items fit at once.
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity >= 2, "SPSC ring needs at least 2 slots");
        let slots = (0..capacity)
            .map(|_| Slot {
                value: UnsafeCell::new(MaybeUninit::uninit()),
                valid: AtomicBool::new(false),
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            slots,
            head: CacheAligned(AtomicUsize::new(0)),
            tail: CacheAligned(AtomicUsize::new(0)),
        }
    }

    /// Consume the ring and hand out the two endpoint handles.
    pub fn split(self) -> (Producer<T>, Consumer<T>) {
        let ring = Arc::new(self);
        (Producer { ring: Arc::clone(&ring) }, Consumer { ring })
    }

    /// Approximate number of queued items. Exact only when neither side is
    /// mid-operation.
    fn len(&self) -> usize {
        let h = self.head.0.load(Ordering::Acquire);
        let t = self.tail.0.load(Ordering::Acquire);
        if t >= h {
            t - h
        } else {
            self.slots.len() - h + t
        }
    }

    fn is_empty(&self) -> bool {
        self.head.0.load(Ordering::Acquire) == self.tail.0.load(Ordering::Acquire)
    }
}

impl<T> Drop for SpscRing<T> {
    fn drop(&mut self) {
        // Exclusive access here; drop whatever the consumer never took.
        for slot in self.slots.iter_mut() {
            if *slot.valid.get_mut() {
                unsafe { slot.value.get_mut().assume_init_drop() };
            }
        }
    }
}

// ── Producer ──────────────────────────────────────────────────────────────────

/// Write half. Exactly one exists per ring; lives on the worker side.
pub struct Producer<T> {
    ring: Arc<SpscRing<T>>,
}

impl<T> Producer<T> {
    /// Non-blocking push. A full ring hands the item back so the caller can
    /// drop it or retry later.
    pub fn push(&mut self, item: T) -> Result<(), T> {
        let ring = &*self.ring;
        let tail = ring.tail.0.load(Ordering::Relaxed);
        let next = (tail + 1) % ring.slots.len();

        // Full when advancing tail would collide with head.
        if next == ring.head.0.load(Ordering::Acquire) {
            return Err(item);
        }

        let slot = &ring.slots[tail];
        unsafe { (*slot.value.get()).write(item) };
        slot.valid.store(true, Ordering::Release);
        ring.tail.0.store(next, Ordering::Release);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }
}

// ── Consumer ──────────────────────────────────────────────────────────────────

/// Read half. Exactly one exists per ring; lives on the application side.
pub struct Consumer<T> {
    ring: Arc<SpscRing<T>>,
}

impl<T> Consumer<T> {
    /// Non-blocking pop. `None` is the ordinary end condition of a drain loop.
    pub fn pop(&mut self) -> Option<T> {
        let ring = &*self.ring;
        let head = ring.head.0.load(Ordering::Relaxed);

        if head == ring.tail.0.load(Ordering::Acquire) {
            return None;
        }

        let slot = &ring.slots[head];
        if !slot.valid.load(Ordering::Acquire) {
            return None;
        }

        let item = unsafe { (*slot.value.get()).assume_init_read() };
        slot.valid.store(false, Ordering::Release);
        ring.head.0.store((head + 1) % ring.slots.len(), Ordering::Release);
        Some(item)
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_preserves_push_order() {
        let (mut tx, mut rx) = SpscRing::with_capacity(16).split();
        for i in 0..15 {
            assert!(tx.push(i).is_ok(), "push {i} should fit in a 16-slot ring");
        }
        for i in 0..15 {
            assert_eq!(rx.pop(), Some(i), "pop {i} should come back in push order");
        }
        assert_eq!(rx.pop(), None, "ring should be empty after full drain");
    }

    #[test]
    fn push_on_full_ring_fails_and_size_unchanged() {
        let (mut tx, rx) = SpscRing::<u32>::with_capacity(8).split();
        for i in 0..7 {
            assert!(tx.push(i).is_ok(), "ring holds capacity - 1 items");
        }
        assert_eq!(tx.len(), 7);
        assert_eq!(tx.push(99), Err(99), "push onto a full ring must hand the item back");
        assert_eq!(rx.len(), 7, "failed push must not change the size");
    }

    #[test]
    fn pop_empty_is_none() {
        let (_tx, mut rx) = SpscRing::<u8>::with_capacity(4).split();
        assert!(rx.is_empty());
        assert_eq!(rx.pop(), None);
    }

    #[test]
    fn wraps_around_many_times() {
        let (mut tx, mut rx) = SpscRing::with_capacity(4).split();
        for i in 0u32..1000 {
            assert!(tx.push(i).is_ok());
            assert_eq!(rx.pop(), Some(i));
        }
    }

    #[test]
    fn cross_thread_transfer_is_lossless_and_ordered() {
        const COUNT: u64 = 50_000;
        let (mut tx, mut rx) = SpscRing::with_capacity(256).split();

        let producer = std::thread::spawn(move || {
            let mut next = 0u64;
            while next < COUNT {
                if tx.push(next).is_ok() {
                    next += 1;
                } else {
                    std::hint::spin_loop();
                }
            }
        });

        let mut expected = 0u64;
        while expected < COUNT {
            if let Some(v) = rx.pop() {
                assert_eq!(v, expected, "items must arrive in push order");
                expected += 1;
            } else {
                std::hint::spin_loop();
            }
        }
        producer.join().unwrap();
    }

    #[test]
    fn dropping_a_loaded_ring_drops_the_items() {
        let marker = Arc::new(());
        {
            let (mut tx, rx) = SpscRing::with_capacity(8).split();
            for _ in 0..5 {
                assert!(tx.push(Arc::clone(&marker)).is_ok());
            }
            drop(tx);
            drop(rx);
        }
        assert_eq!(Arc::strong_count(&marker), 1, "undrained items must be dropped");
    }
}
