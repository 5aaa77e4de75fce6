//! Remote-control port pool.
//!
//! Every job's child process gets its own loopback HTTP endpoint, so ports
//! are a leased singleton resource: exactly one executor holds a given port
//! at a time. Candidates are double-checked with a bind-and-drop probe in
//! case something outside the daemon squats on the range.

use std::collections::HashSet;
use std::net::TcpListener;
use std::sync::Mutex;

use crate::error::{CoreError, CoreResult};

/// Default remote-control port range.
pub const DEFAULT_PORT_START: u16 = 55720;
pub const DEFAULT_PORT_END: u16 = 55800;

struct PoolState {
    start: u16,
    end: u16,
    in_use: HashSet<u16>,
}

/// Hands out locally-unused TCP ports from a half-open range `[start, end)`.
pub struct PortPool {
    state: Mutex<PoolState>,
}

impl PortPool {
    pub fn new(start: u16, end: u16) -> Self {
        let (start, end) = clamp_range(start, end, DEFAULT_PORT_START);
        Self {
            state: Mutex::new(PoolState {
                start,
                end,
                in_use: HashSet::new(),
            }),
        }
    }

    /// Updates the range bounds live.
    ///
    /// Ports already leased outside the new range are not reclaimed; they
    /// return to circulation when released and simply stop being handed out.
    pub fn set_range(&self, start: u16, end: u16) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let fallback = state.start;
        let (start, end) = clamp_range(start, end, fallback);
        state.start = start;
        state.end = end;
    }

    /// Leases the first free port in the range.
    ///
    /// A candidate must be absent from the in-use set and accepted by the
    /// OS for a momentary loopback listener.
    pub fn acquire(&self) -> CoreResult<u16> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        for port in state.start..state.end {
            if state.in_use.contains(&port) {
                continue;
            }
            match TcpListener::bind(("127.0.0.1", port)) {
                Ok(listener) => {
                    drop(listener);
                    state.in_use.insert(port);
                    return Ok(port);
                }
                Err(_) => continue,
            }
        }
        Err(CoreError::NoPortAvailable {
            start: state.start,
            end: state.end,
        })
    }

    /// Returns a leased port to the pool. Idempotent.
    pub fn release(&self, port: u16) {
        if port == 0 {
            return;
        }
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.in_use.remove(&port);
    }

    /// Number of currently leased ports.
    pub fn leased(&self) -> usize {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.in_use.len()
    }
}

fn clamp_range(start: u16, end: u16, fallback: u16) -> (u16, u16) {
    let start = if start == 0 { fallback } else { start };
    let end = end.max(start);
    (start, end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_release_cycle() {
        let pool = PortPool::new(56700, 56710);
        let port = pool.acquire().unwrap();
        assert!((56700..56710).contains(&port));
        assert_eq!(pool.leased(), 1);
        pool.release(port);
        assert_eq!(pool.leased(), 0);
    }

    #[test]
    fn test_distinct_ports() {
        let pool = PortPool::new(56710, 56720);
        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        assert_ne!(a, b);
        pool.release(a);
        pool.release(b);
    }

    #[test]
    fn test_exhaustion() {
        let pool = PortPool::new(56720, 56722);
        let _a = pool.acquire().unwrap();
        let _b = pool.acquire().unwrap();
        let err = pool.acquire().unwrap_err();
        assert!(matches!(err, CoreError::NoPortAvailable { .. }));
    }

    #[test]
    fn test_release_is_idempotent() {
        let pool = PortPool::new(56722, 56724);
        let port = pool.acquire().unwrap();
        pool.release(port);
        pool.release(port);
        pool.release(0);
        assert_eq!(pool.leased(), 0);
    }

    #[test]
    fn test_set_range_live() {
        let pool = PortPool::new(56724, 56726);
        let old = pool.acquire().unwrap();
        pool.set_range(56730, 56732);
        let new = pool.acquire().unwrap();
        assert!((56730..56732).contains(&new));
        // The out-of-range lease is still tracked until released.
        assert_eq!(pool.leased(), 2);
        pool.release(old);
        pool.release(new);
    }

    #[test]
    fn test_degenerate_range_is_empty() {
        let pool = PortPool::new(56740, 56740);
        assert!(pool.acquire().is_err());
    }
}
