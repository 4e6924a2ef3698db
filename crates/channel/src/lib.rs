//! Blocking stub channels.
//!
//! Architecture role:
//! - moves key/value records between the orchestration driver thread and the
//!   stub worker threads executing a job's logic
//! - the only legitimate suspension point in the dispatch core: driver and
//!   worker rendezvous exclusively through [`StubChannel::push`] /
//!   [`StubChannel::pop`]
//!
//! Cancellation is cooperative: [`StubChannel::cancel`] enqueues a `Finish`
//! sentinel that unblocks one pending or future `pop`. A sentinel never
//! displaces an already-pushed record.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

use fdp_schema::{Record, Value};
use tracing::warn;

/// Default bound for stub channels. The reference design used unbounded
/// queues per port; production pipelines need a cap to bound memory.
pub const DEFAULT_CAPACITY: usize = 1024;

/// One item popped from a stub channel.
#[derive(Debug, Clone, PartialEq)]
pub enum Item<T> {
    /// A real record.
    Data(T),
    /// The cancellation/completion sentinel.
    Finish,
}

struct State<T> {
    queue: VecDeque<Item<T>>,
}

/// A strictly-ordered blocking FIFO between driver and stub.
///
/// Single producer, single consumer. Every `push` is matched by exactly one
/// `pop`; on shutdown the channel is drained through the `Finish` sentinel.
pub struct StubChannel<T> {
    state: Mutex<State<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

impl<T> StubChannel<T> {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// A channel bounded to `capacity` data items. Sentinels are exempt from
    /// the bound so `cancel` can never block.
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "channel capacity must be at least 1");
        Self {
            state: Mutex::new(State {
                queue: VecDeque::new(),
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State<T>> {
        // A poisoned channel means a stub worker panicked mid-push/pop; the
        // queue contents are still structurally valid, so keep draining.
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!(operator = "StubChannel", "channel lock poisoned; continuing");
                poisoned.into_inner()
            }
        }
    }

    /// Append one record, blocking while the channel is full.
    pub fn push(&self, value: T) {
        let mut state = self.lock();
        while state.queue.len() >= self.capacity {
            state = match self.not_full.wait(state) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
        state.queue.push_back(Item::Data(value));
        drop(state);
        self.not_empty.notify_one();
    }

    /// Remove the oldest item, blocking while the channel is empty.
    pub fn pop(&self) -> Item<T> {
        let mut state = self.lock();
        loop {
            if let Some(item) = state.queue.pop_front() {
                drop(state);
                self.not_full.notify_one();
                return item;
            }
            state = match self.not_empty.wait(state) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
    }

    /// Enqueue the `Finish` sentinel, unblocking one pending or future `pop`.
    ///
    /// Used both for normal completion (the producer is done) and for
    /// cooperative shutdown. Call once per outstanding or future consumer.
    /// Already-pushed records stay ahead of the sentinel and are never
    /// dropped.
    pub fn cancel(&self) {
        let mut state = self.lock();
        state.queue.push_back(Item::Finish);
        drop(state);
        self.not_empty.notify_one();
    }

    /// Number of queued items (data and sentinels).
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for StubChannel<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// The key/value channel pair for one logical port.
///
/// The producer always publishes the key before the corresponding value, with
/// no interleaving from other producers on the same pair; `push_record` and
/// `pop_record` encode that contract.
pub struct KeyValueChannel {
    keys: StubChannel<Value>,
    values: StubChannel<Value>,
}

impl KeyValueChannel {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            keys: StubChannel::with_capacity(capacity),
            values: StubChannel::with_capacity(capacity),
        }
    }

    /// Publish one record: key first, then value.
    pub fn push_record(&self, record: Record) {
        self.keys.push(record.key);
        self.values.push(record.value);
    }

    /// Take one record: key first, then value. A sentinel on the key channel
    /// ends the stream without touching the value channel.
    pub fn pop_record(&self) -> Item<Record> {
        match self.keys.pop() {
            Item::Finish => Item::Finish,
            Item::Data(key) => match self.values.pop() {
                // A sentinel between key and value only happens on shutdown;
                // the half-read record is discarded with the stream.
                Item::Finish => Item::Finish,
                Item::Data(value) => Item::Data(Record::new(key, value)),
            },
        }
    }

    /// Unblock one pending or future `pop_record` with the sentinel.
    pub fn cancel(&self) {
        self.keys.cancel();
    }
}

impl Default for KeyValueChannel {
    fn default() -> Self {
        Self::new()
    }
}
