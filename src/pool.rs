//! A generic connection pool keyed by URL, tracking a refcount and last-use
//! time per entry so an idle sweeper can reclaim connections nobody holds.
//! Generic over the pooled connection type so it serves vault, AWS, and
//! NATS clients alike.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

struct Slot<C> {
    conn: C,
    refcount: usize,
    last_used: Instant,
}

/// A concurrent-safe pool of connections keyed by URL (or any other
/// per-target identity string).
pub struct Pool<C> {
    slots: Mutex<HashMap<String, Slot<C>>>,
    max_idle_time: Duration,
}

impl<C> Pool<C> {
    pub fn new(max_idle_time: Duration) -> Self {
        Pool {
            slots: Mutex::new(HashMap::new()),
            max_idle_time,
        }
    }

    /// Checks out the connection for `key`, constructing it with `make` on
    /// first use. Increments the refcount and refreshes `last_used`.
    pub fn checkout(&self, key: &str, make: impl FnOnce() -> C) -> C
    where
        C: Clone,
    {
        let mut slots = self.slots.lock();
        let slot = slots.entry(key.to_string()).or_insert_with(|| Slot {
            conn: make(),
            refcount: 0,
            last_used: Instant::now(),
        });
        slot.refcount += 1;
        slot.last_used = Instant::now();
        slot.conn.clone()
    }

    /// Releases one reference to the connection for `key`.
    pub fn release(&self, key: &str) {
        let mut slots = self.slots.lock();
        if let Some(slot) = slots.get_mut(key) {
            slot.refcount = slot.refcount.saturating_sub(1);
            slot.last_used = Instant::now();
        }
    }

    /// Closes every connection with a zero refcount idle for at least
    /// `max_idle_time`. Intended to run on a periodic cleanup interval
    /// (default one minute, per spec).
    pub fn sweep(&self) {
        let now = Instant::now();
        let max_idle = self.max_idle_time;
        self.slots
            .lock()
            .retain(|_, slot| slot.refcount > 0 || now.duration_since(slot.last_used) < max_idle);
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every pooled connection unconditionally (used by shutdown).
    pub fn clear(&self) {
        self.slots.lock().clear();
    }
}

pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_MAX_IDLE_TIME: Duration = Duration::from_secs(5 * 60);

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn checkout_reuses_existing_connection() {
        let pool: Pool<u32> = Pool::new(Duration::from_secs(60));
        let mut next = 0u32;
        let a = pool.checkout("vault:default", || {
            next += 1;
            next
        });
        let b = pool.checkout("vault:default", || {
            next += 1;
            next
        });
        assert_eq!(a, b);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn sweep_keeps_referenced_connections() {
        let pool: Pool<u32> = Pool::new(Duration::from_millis(1));
        pool.checkout("a", || 1);
        std::thread::sleep(Duration::from_millis(5));
        pool.sweep();
        assert_eq!(pool.len(), 1, "referenced connection must survive a sweep");
    }

    #[test]
    fn sweep_reclaims_idle_unreferenced_connections() {
        let pool: Pool<u32> = Pool::new(Duration::from_millis(1));
        pool.checkout("a", || 1);
        pool.release("a");
        std::thread::sleep(Duration::from_millis(5));
        pool.sweep();
        assert!(pool.is_empty());
    }
}
