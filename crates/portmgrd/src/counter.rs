//! Bounded port number pools.
//!
//! A [`Counter`] hands out integers from a fixed window `[base, base + capacity)`,
//! always returning the lowest free value. The registry keeps two of them: one
//! for interface numbers and one for bond numbers. The windows are chosen so
//! the two pools never share a value.

use std::collections::BTreeSet;

use thiserror::Error;

/// Error type for Counter operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CounterError {
    #[error("pool exhausted")]
    PoolExhausted,

    #[error("id {0} is not allocated")]
    NotAllocated(u32),

    #[error("id {0} is outside the pool")]
    OutOfRange(u32),
}

/// Lowest-free-first id pool.
#[derive(Debug, Clone)]
pub struct Counter {
    base: u32,
    capacity: u32,
    free: BTreeSet<u32>,
}

impl Counter {
    /// Creates a pool covering `[base, base + capacity)`.
    pub fn new(base: u32, capacity: u32) -> Self {
        Self {
            base,
            capacity,
            free: (base..base + capacity).collect(),
        }
    }

    /// First id of the pool.
    pub fn base(&self) -> u32 {
        self.base
    }

    /// Number of ids currently handed out.
    pub fn in_use(&self) -> u32 {
        self.capacity - self.free.len() as u32
    }

    /// Returns true if `id` belongs to this pool's window.
    pub fn contains(&self, id: u32) -> bool {
        id >= self.base && id < self.base + self.capacity
    }

    /// Takes the lowest free id.
    pub fn acquire(&mut self) -> Result<u32, CounterError> {
        self.free.pop_first().ok_or(CounterError::PoolExhausted)
    }

    /// Returns `id` to the pool.
    ///
    /// Releasing an id that is already free is a caller bug and is rejected.
    pub fn release(&mut self, id: u32) -> Result<(), CounterError> {
        if !self.contains(id) {
            return Err(CounterError::OutOfRange(id));
        }
        if !self.free.insert(id) {
            return Err(CounterError::NotAllocated(id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_lowest_first() {
        let mut c = Counter::new(1, 4);
        assert_eq!(c.acquire().unwrap(), 1);
        assert_eq!(c.acquire().unwrap(), 2);
        assert_eq!(c.acquire().unwrap(), 3);
        c.release(2).unwrap();
        assert_eq!(c.acquire().unwrap(), 2);
        assert_eq!(c.in_use(), 3);
    }

    #[test]
    fn test_exhaustion() {
        let mut c = Counter::new(1, 2);
        c.acquire().unwrap();
        c.acquire().unwrap();
        assert_eq!(c.acquire(), Err(CounterError::PoolExhausted));
    }

    #[test]
    fn test_double_release_rejected() {
        let mut c = Counter::new(10, 2);
        let id = c.acquire().unwrap();
        assert_eq!(id, 10);
        c.release(id).unwrap();
        assert_eq!(c.release(id), Err(CounterError::NotAllocated(10)));
    }

    #[test]
    fn test_release_out_of_range() {
        let mut c = Counter::new(505, 8);
        assert_eq!(c.release(1), Err(CounterError::OutOfRange(1)));
        assert_eq!(c.release(513), Err(CounterError::OutOfRange(513)));
        assert!(c.contains(512));
    }
}
