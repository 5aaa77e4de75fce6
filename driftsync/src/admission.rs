//! Global job admission.
//!
//! A counting limiter capping concurrent jobs across all rules. The cap is
//! read from settings every supervisor tick, so it must be mutable on a live
//! limiter: raising it admits waiting jobs within one recheck interval,
//! lowering it only gates new admissions and never kills running jobs.

use std::sync::Mutex;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// How often a blocked acquire rechecks the cap.
pub const RECHECK_INTERVAL: Duration = Duration::from_millis(150);

struct LimiterState {
    cap: usize,
    holders: usize,
}

/// Counting limiter with a mutable cap. A cap of 0 means unlimited.
pub struct GlobalJobLimiter {
    state: Mutex<LimiterState>,
}

impl GlobalJobLimiter {
    pub fn new(cap: usize) -> Self {
        Self {
            state: Mutex::new(LimiterState { cap, holders: 0 }),
        }
    }

    /// Replaces the cap. Takes effect on the next acquire attempt.
    pub fn set_cap(&self, cap: usize) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.cap = cap;
    }

    /// Acquires one slot, waiting while the limiter is at capacity.
    ///
    /// Returns false only when `cancel` fires first. With cap 0 this is a
    /// no-op that still counts the holder, so a later cap applies to it.
    pub async fn acquire(&self, cancel: &CancellationToken) -> bool {
        loop {
            if cancel.is_cancelled() {
                return false;
            }
            {
                let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
                if state.cap == 0 || state.holders < state.cap {
                    state.holders += 1;
                    return true;
                }
            }
            tokio::select! {
                _ = cancel.cancelled() => return false,
                _ = tokio::time::sleep(RECHECK_INTERVAL) => {}
            }
        }
    }

    /// Returns one slot. Tolerates over-release on error paths.
    pub fn release(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.holders = state.holders.saturating_sub(1);
    }

    /// Current number of admitted jobs.
    pub fn holders(&self) -> usize {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.holders
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_unlimited_cap() {
        let limiter = GlobalJobLimiter::new(0);
        let cancel = CancellationToken::new();
        for _ in 0..10 {
            assert!(limiter.acquire(&cancel).await);
        }
        assert_eq!(limiter.holders(), 10);
    }

    #[tokio::test]
    async fn test_cap_blocks_until_release() {
        let limiter = Arc::new(GlobalJobLimiter::new(1));
        let cancel = CancellationToken::new();
        assert!(limiter.acquire(&cancel).await);

        let limiter2 = limiter.clone();
        let cancel2 = cancel.clone();
        let waiter = tokio::spawn(async move { limiter2.acquire(&cancel2).await });

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!waiter.is_finished());

        limiter.release();
        let got = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should finish")
            .expect("waiter should not panic");
        assert!(got);
    }

    #[tokio::test]
    async fn test_cancel_aborts_acquire() {
        let limiter = GlobalJobLimiter::new(1);
        let cancel = CancellationToken::new();
        assert!(limiter.acquire(&cancel).await);

        cancel.cancel();
        assert!(!limiter.acquire(&cancel).await);
        assert_eq!(limiter.holders(), 1);
    }

    #[tokio::test]
    async fn test_cap_raise_admits_waiter() {
        let limiter = Arc::new(GlobalJobLimiter::new(1));
        let cancel = CancellationToken::new();
        assert!(limiter.acquire(&cancel).await);

        let limiter2 = limiter.clone();
        let cancel2 = cancel.clone();
        let waiter = tokio::spawn(async move { limiter2.acquire(&cancel2).await });

        tokio::time::sleep(Duration::from_millis(30)).await;
        limiter.set_cap(2);

        let got = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should finish")
            .expect("waiter should not panic");
        assert!(got);
        assert_eq!(limiter.holders(), 2);
    }

    #[test]
    fn test_over_release_is_tolerated() {
        let limiter = GlobalJobLimiter::new(2);
        limiter.release();
        limiter.release();
        assert_eq!(limiter.holders(), 0);
    }
}
