use std::collections::BTreeSet;

use parking_lot::Mutex;
use thiserror::Error;

/// Hands out UDP ports for transport processes from a contiguous range.
///
/// Every live room owns exactly one port from this pool, and the pool is the
/// single authority on which ports are in use. All operations are lock-guarded
/// and never touch I/O.
#[derive(Debug)]
pub struct PortAllocator {
    base: u16,
    range: u16,
    in_use: Mutex<BTreeSet<u16>>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PortError {
    #[error("No free transport ports available")]
    Exhausted,
}

impl PortAllocator {
    pub fn new(base: u16, range: u16) -> Self {
        Self {
            base,
            range,
            in_use: Mutex::new(BTreeSet::new()),
        }
    }

    /// Reserves the lowest free port in the range.
    pub fn acquire(&self) -> Result<u16, PortError> {
        let mut in_use = self.in_use.lock();

        for offset in 0..self.range {
            let candidate = self.base + offset;

            if in_use.insert(candidate) {
                return Ok(candidate);
            }
        }

        Err(PortError::Exhausted)
    }

    /// Returns a port to the pool. Releasing a free port is a no-op.
    pub fn release(&self, port: u16) {
        self.in_use.lock().remove(&port);
    }

    /// How many ports are currently handed out
    pub fn in_use_count(&self) -> usize {
        self.in_use.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_ascending_from_base() {
        let ports = PortAllocator::new(4464, 4);

        assert_eq!(ports.acquire(), Ok(4464));
        assert_eq!(ports.acquire(), Ok(4465));
        assert_eq!(ports.acquire(), Ok(4466));
    }

    #[test]
    fn exhausts_after_range_allocations() {
        let ports = PortAllocator::new(4464, 2);

        ports.acquire().unwrap();
        ports.acquire().unwrap();

        assert_eq!(ports.acquire(), Err(PortError::Exhausted));
    }

    #[test]
    fn released_port_is_reused_first() {
        let ports = PortAllocator::new(4464, 4);

        let first = ports.acquire().unwrap();
        ports.acquire().unwrap();
        ports.release(first);

        assert_eq!(ports.acquire(), Ok(first));
    }

    #[test]
    fn double_release_is_a_noop() {
        let ports = PortAllocator::new(4464, 2);

        let port = ports.acquire().unwrap();
        ports.release(port);
        ports.release(port);

        assert_eq!(ports.in_use_count(), 0);
        assert_eq!(ports.acquire(), Ok(port));
        assert_eq!(ports.in_use_count(), 1);
    }

    #[test]
    fn never_hands_out_the_same_port_twice() {
        let ports = PortAllocator::new(4464, 8);
        let mut seen = std::collections::HashSet::new();

        for _ in 0..8 {
            assert!(seen.insert(ports.acquire().unwrap()));
        }
    }
}
