//! Session Pool
//!
//! Owns a fixed set of pre-loaded sessions for one model. A checkout moves a
//! session out of the idle set into a guard, so no two callers can ever run
//! the same session at once. Dropping the guard puts the session back and
//! wakes one waiter.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};

use crate::{InferenceError, InferenceSession, ModelSpec, Tensor};

/// Idle slots plus the rotating cursor; only touched under the pool mutex
struct PoolState<S> {
    idle: Vec<Option<S>>,
    cursor: usize,
}

impl<S> PoolState<S> {
    /// Take the first idle session at or after the cursor
    fn take_idle(&mut self) -> Option<(usize, S)> {
        let n = self.idle.len();
        for k in 0..n {
            let slot = self.cursor.wrapping_add(k) % n;
            if let Some(session) = self.idle[slot].take() {
                self.cursor = self.cursor.wrapping_add(k + 1);
                return Some((slot, session));
            }
        }
        None
    }
}

/// Whole milliseconds, saturating at `u64::MAX`
fn timeout_millis(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)
}

/// Atomic pool activity counters
#[derive(Debug, Default)]
struct PoolCounters {
    checkouts: AtomicU64,
    contended: AtomicU64,
    runs: AtomicU64,
    failures: AtomicU64,
}

/// Snapshot of pool activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Sessions handed out
    pub checkouts: u64,
    /// Checkouts that found every session busy and had to wait
    pub contended: u64,
    /// Inference calls issued
    pub runs: u64,
    /// Inference calls that returned an error
    pub failures: u64,
}

/// Fixed-size pool of exclusive inference sessions
pub struct SessionPool<S> {
    spec: ModelSpec,
    size: usize,
    state: Mutex<PoolState<S>>,
    available: Condvar,
    counters: PoolCounters,
}

impl<S> SessionPool<S> {
    /// Build `size` sessions through `factory`, which receives the slot index.
    /// Construction is expensive (engine compilation) and happens once.
    pub fn construct<F>(spec: ModelSpec, size: usize, mut factory: F) -> Result<Self, InferenceError>
    where
        F: FnMut(usize) -> Result<S, InferenceError>,
    {
        if size == 0 {
            return Err(InferenceError::EmptyPool);
        }

        info!(
            "Constructing session pool: model={:?}, sessions={}",
            spec.id, size
        );
        let sessions = (0..size).map(&mut factory).collect::<Result<Vec<_>, _>>()?;
        Self::from_sessions(spec, sessions)
    }

    /// Wrap already-loaded sessions
    pub fn from_sessions(spec: ModelSpec, sessions: Vec<S>) -> Result<Self, InferenceError> {
        if sessions.is_empty() {
            return Err(InferenceError::EmptyPool);
        }

        let size = sessions.len();
        Ok(Self {
            spec,
            size,
            state: Mutex::new(PoolState {
                idle: sessions.into_iter().map(Some).collect(),
                cursor: 0,
            }),
            available: Condvar::new(),
            counters: PoolCounters::default(),
        })
    }

    pub fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    /// Number of sessions owned by the pool
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of sessions currently checked out
    pub fn in_use(&self) -> usize {
        self.state.lock().idle.iter().filter(|s| s.is_none()).count()
    }

    /// Check out a session, blocking until one is idle
    pub fn checkout(&self) -> SessionGuard<'_, S> {
        let mut state = self.state.lock();
        let mut waited = false;
        loop {
            if let Some((slot, session)) = state.take_idle() {
                return self.guard(slot, session);
            }
            if !waited {
                waited = true;
                self.counters.contended.fetch_add(1, Ordering::Relaxed);
                debug!("All {} sessions busy, waiting for release", self.size);
            }
            self.available.wait(&mut state);
        }
    }

    /// Check out a session without blocking; `None` when every session is busy
    pub fn try_checkout(&self) -> Option<SessionGuard<'_, S>> {
        let (slot, session) = self.state.lock().take_idle()?;
        Some(self.guard(slot, session))
    }

    /// Check out a session, giving up after `timeout`
    pub fn checkout_timeout(&self, timeout: Duration) -> Result<SessionGuard<'_, S>, InferenceError> {
        // A deadline past the clock's range is no deadline at all
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return Ok(self.checkout());
        };
        let mut state = self.state.lock();
        let mut waited = false;
        loop {
            if let Some((slot, session)) = state.take_idle() {
                return Ok(self.guard(slot, session));
            }
            if !waited {
                waited = true;
                self.counters.contended.fetch_add(1, Ordering::Relaxed);
            }
            if self.available.wait_until(&mut state, deadline).timed_out() {
                return match state.take_idle() {
                    Some((slot, session)) => Ok(self.guard(slot, session)),
                    None => {
                        warn!("Session checkout timed out after {:?}", timeout);
                        Err(InferenceError::PoolTimeout(timeout_millis(timeout)))
                    }
                };
            }
        }
    }

    /// Return a session to the pool. Equivalent to dropping the guard.
    pub fn release(&self, guard: SessionGuard<'_, S>) {
        drop(guard);
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            checkouts: self.counters.checkouts.load(Ordering::Relaxed),
            contended: self.counters.contended.load(Ordering::Relaxed),
            runs: self.counters.runs.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
        }
    }

    fn guard(&self, slot: usize, session: S) -> SessionGuard<'_, S> {
        self.counters.checkouts.fetch_add(1, Ordering::Relaxed);
        debug!(slot, "Session checked out");
        SessionGuard {
            pool: self,
            slot,
            session: Some(session),
        }
    }

    fn give_back(&self, slot: usize, session: S) {
        {
            let mut state = self.state.lock();
            debug_assert!(state.idle[slot].is_none(), "slot {} returned twice", slot);
            state.idle[slot] = Some(session);
        }
        self.available.notify_one();
    }
}

impl<S: InferenceSession> SessionPool<S> {
    /// Run inference on a checked-out session. Failures are returned as-is, never retried.
    pub fn run(&self, guard: &mut SessionGuard<'_, S>, input: &Tensor) -> Result<Vec<f32>, InferenceError> {
        self.counters.runs.fetch_add(1, Ordering::Relaxed);
        let result = guard.run(input);
        if let Err(e) = &result {
            self.counters.failures.fetch_add(1, Ordering::Relaxed);
            warn!(slot = guard.slot, "Inference failed: {}", e);
        }
        result
    }
}

/// Exclusive handle to one pooled session; returns it to the pool on drop
pub struct SessionGuard<'a, S> {
    pool: &'a SessionPool<S>,
    slot: usize,
    session: Option<S>,
}

impl<S> SessionGuard<'_, S> {
    /// Pool slot this session lives in
    pub fn slot(&self) -> usize {
        self.slot
    }
}

impl<S> Deref for SessionGuard<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        self.session.as_ref().expect("session is held until the guard drops")
    }
}

impl<S> DerefMut for SessionGuard<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        self.session.as_mut().expect("session is held until the guard drops")
    }
}

impl<S> Drop for SessionGuard<'_, S> {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            self.pool.give_back(self.slot, session);
            debug!(slot = self.slot, "Session released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ModelRegistry;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::sync::Arc;

    /// Stub engine that flags any overlapping use of the same session id
    struct ProbeSession {
        id: usize,
        busy: Arc<Vec<AtomicBool>>,
        overlaps: Arc<AtomicUsize>,
        calls: Arc<AtomicUsize>,
        delay: Duration,
        fail: bool,
    }

    impl InferenceSession for ProbeSession {
        fn run(&mut self, _input: &Tensor) -> Result<Vec<f32>, InferenceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.busy[self.id].swap(true, Ordering::SeqCst) {
                self.overlaps.fetch_add(1, Ordering::SeqCst);
            }
            std::thread::sleep(self.delay);
            self.busy[self.id].store(false, Ordering::SeqCst);
            if self.fail {
                Err(InferenceError::InferenceFailed("stub fault".into()))
            } else {
                Ok(vec![self.id as f32])
            }
        }
    }

    struct Probe {
        overlaps: Arc<AtomicUsize>,
        calls: Arc<AtomicUsize>,
    }

    fn probe_pool(size: usize, delay: Duration, fail: bool) -> (SessionPool<ProbeSession>, Probe) {
        let busy = Arc::new((0..size).map(|_| AtomicBool::new(false)).collect::<Vec<_>>());
        let overlaps = Arc::new(AtomicUsize::new(0));
        let calls = Arc::new(AtomicUsize::new(0));
        let spec = ModelRegistry::resolve(0).unwrap();
        let pool = SessionPool::construct(spec, size, |id| {
            Ok(ProbeSession {
                id,
                busy: busy.clone(),
                overlaps: overlaps.clone(),
                calls: calls.clone(),
                delay,
                fail,
            })
        })
        .unwrap();
        (pool, Probe { overlaps, calls })
    }

    fn input() -> Tensor {
        Tensor::Single(ndarray::ArrayD::zeros(ndarray::IxDyn(&[1])))
    }

    #[test]
    fn test_empty_pool_rejected() {
        let spec = ModelRegistry::resolve(0).unwrap();
        let result = SessionPool::<ProbeSession>::from_sessions(spec, Vec::new());
        assert!(matches!(result, Err(InferenceError::EmptyPool)));
        let result = SessionPool::<ProbeSession>::construct(spec, 0, |_| unreachable!());
        assert!(matches!(result, Err(InferenceError::EmptyPool)));
    }

    #[test]
    fn test_factory_failure_aborts_construction() {
        let spec = ModelRegistry::resolve(6).unwrap();
        let result = SessionPool::<ProbeSession>::construct(spec, 3, |slot| {
            Err(InferenceError::ModelLoad(format!("slot {}", slot)))
        });
        assert!(matches!(result, Err(InferenceError::ModelLoad(m)) if m == "slot 0"));
    }

    #[test]
    fn test_cursor_rotates_across_sessions() {
        let (pool, _) = probe_pool(3, Duration::ZERO, false);
        let slots: Vec<usize> = (0..5).map(|_| pool.checkout().slot()).collect();
        assert_eq!(slots, vec![0, 1, 2, 0, 1]);
    }

    #[test]
    fn test_busy_session_is_skipped() {
        let (pool, _) = probe_pool(2, Duration::ZERO, false);
        let first = pool.checkout();
        assert_eq!(first.slot(), 0);
        // Cursor now points at 1; after that comes 0, which is still busy
        let second = pool.checkout();
        assert_eq!(second.slot(), 1);
        drop(second);
        let third = pool.checkout();
        assert_eq!(third.slot(), 1);
        assert_eq!(pool.in_use(), 2);
    }

    #[test]
    fn test_try_checkout_rejects_when_exhausted() {
        let (pool, _) = probe_pool(1, Duration::ZERO, false);
        let held = pool.checkout();
        assert!(pool.try_checkout().is_none());
        pool.release(held);
        assert!(pool.try_checkout().is_some());
        assert_eq!(pool.in_use(), 0);
    }

    #[test]
    fn test_checkout_timeout() {
        let (pool, _) = probe_pool(1, Duration::ZERO, false);
        let _held = pool.checkout();
        let result = pool.checkout_timeout(Duration::from_millis(20));
        assert!(matches!(result, Err(InferenceError::PoolTimeout(20))));
        assert_eq!(pool.stats().contended, 1);
    }

    #[test]
    fn test_timeout_millis_saturates() {
        assert_eq!(timeout_millis(Duration::from_millis(20)), 20);
        assert_eq!(timeout_millis(Duration::MAX), u64::MAX);
    }

    #[test]
    fn test_unbounded_timeout_checks_out() {
        let (pool, _) = probe_pool(1, Duration::ZERO, false);
        let guard = pool.checkout_timeout(Duration::MAX).unwrap();
        assert_eq!(guard.slot(), 0);
    }

    #[test]
    fn test_blocked_checkout_wakes_on_release() {
        let (pool, _) = probe_pool(1, Duration::ZERO, false);
        let held = pool.checkout();
        std::thread::scope(|s| {
            let waiter = s.spawn(|| pool.checkout().slot());
            std::thread::sleep(Duration::from_millis(20));
            drop(held);
            assert_eq!(waiter.join().unwrap(), 0);
        });
        assert_eq!(pool.stats().checkouts, 2);
    }

    #[test]
    fn test_failures_are_counted_not_retried() {
        let (pool, probe) = probe_pool(1, Duration::ZERO, true);
        let mut guard = pool.checkout();
        let result = pool.run(&mut guard, &input());
        assert!(matches!(result, Err(InferenceError::InferenceFailed(_))));
        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
        assert_eq!(pool.stats().runs, 1);
        assert_eq!(pool.stats().failures, 1);
    }

    #[test]
    fn test_session_returned_after_panic() {
        let (pool, _) = probe_pool(1, Duration::ZERO, false);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = pool.checkout();
            panic!("driver aborted");
        }));
        assert!(result.is_err());
        assert!(pool.try_checkout().is_some());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_no_session_runs_concurrently(size in 1usize..4, calls in 1usize..24, callers in 1usize..8) {
            let (pool, probe) = probe_pool(size, Duration::from_micros(300), false);
            let next = AtomicUsize::new(0);

            std::thread::scope(|s| {
                for _ in 0..callers {
                    s.spawn(|| {
                        while next.fetch_add(1, Ordering::SeqCst) < calls {
                            let mut guard = pool.checkout();
                            pool.run(&mut guard, &input()).unwrap();
                        }
                    });
                }
            });

            prop_assert_eq!(probe.overlaps.load(Ordering::SeqCst), 0);
            prop_assert_eq!(probe.calls.load(Ordering::SeqCst), calls);
            prop_assert_eq!(pool.in_use(), 0);
            prop_assert_eq!(pool.stats().checkouts as usize, calls);
        }
    }
}
