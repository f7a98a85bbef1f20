//! Clock capability
//!
//! Components that wait on time take an `Arc<dyn Clock>` instead of calling
//! tokio timers directly, so tests can drive them with `FakeClock`.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::{Interval, MissedTickBehavior, Sleep};

/// Source of time and timers
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// One-shot timer firing once `duration` has elapsed
    fn new_timer(&self, duration: Duration) -> Box<dyn Timer>;

    /// Periodic ticker; the first tick comes one `period` after creation
    fn new_ticker(&self, period: Duration) -> Box<dyn Ticker>;
}

#[async_trait]
pub trait Timer: Send {
    /// Completes when the timer fires. Never completes a second time.
    async fn fired(&mut self);
}

#[async_trait]
pub trait Ticker: Send {
    async fn tick(&mut self);
}

// ============================================================================
// System clock
// ============================================================================

/// Wall clock backed by tokio timers
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn new_timer(&self, duration: Duration) -> Box<dyn Timer> {
        Box::new(SystemTimer {
            sleep: Box::pin(tokio::time::sleep(duration)),
            fired: false,
        })
    }

    fn new_ticker(&self, period: Duration) -> Box<dyn Ticker> {
        let period = period.max(Duration::from_millis(1));
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Box::new(SystemTicker { interval })
    }
}

struct SystemTimer {
    sleep: Pin<Box<Sleep>>,
    fired: bool,
}

#[async_trait]
impl Timer for SystemTimer {
    async fn fired(&mut self) {
        if self.fired {
            std::future::pending::<()>().await;
        }
        self.sleep.as_mut().await;
        self.fired = true;
    }
}

struct SystemTicker {
    interval: Interval,
}

#[async_trait]
impl Ticker for SystemTicker {
    async fn tick(&mut self) {
        self.interval.tick().await;
    }
}

// ============================================================================
// Fake clock
// ============================================================================

/// Manually advanced clock for deterministic tests
///
/// Time only moves on `increment`. Every live timer or ticker counts as a
/// watcher until it fires (timers) or is dropped.
#[derive(Clone)]
pub struct FakeClock {
    state: Arc<Mutex<FakeClockState>>,
}

struct FakeClockState {
    start: DateTime<Utc>,
    elapsed: Duration,
    next_id: u64,
    watchers: Vec<FakeWatcher>,
}

struct FakeWatcher {
    id: u64,
    deadline: Duration,
    period: Option<Duration>,
    sender: mpsc::UnboundedSender<()>,
}

impl FakeClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeClockState {
                start: now,
                elapsed: Duration::ZERO,
                next_id: 0,
                watchers: Vec::new(),
            })),
        }
    }

    /// Advance time, firing every watcher whose deadline has passed
    pub fn increment(&self, duration: Duration) {
        let mut state = self.state.lock();
        state.elapsed += duration;
        let now = state.elapsed;

        state.watchers.retain_mut(|watcher| {
            if watcher.deadline > now {
                return true;
            }
            let _ = watcher.sender.send(());
            match watcher.period {
                Some(period) => {
                    watcher.deadline = now + period;
                    true
                }
                None => false,
            }
        });
    }

    /// Number of timers and tickers currently waiting
    pub fn watcher_count(&self) -> usize {
        self.state.lock().watchers.len()
    }

    pub async fn wait_for_watcher_and_increment(&self, duration: Duration) {
        self.wait_for_n_watchers_and_increment(duration, 1).await;
    }

    pub async fn wait_for_n_watchers_and_increment(&self, duration: Duration, count: usize) {
        while self.watcher_count() < count {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        self.increment(duration);
    }

    fn watch(&self, duration: Duration, period: Option<Duration>) -> FakeWatch {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;

        if duration.is_zero() && period.is_none() {
            let _ = sender.send(());
        } else {
            let deadline = state.elapsed + duration;
            state.watchers.push(FakeWatcher {
                id,
                deadline,
                period,
                sender,
            });
        }

        FakeWatch {
            id,
            receiver,
            state: self.state.clone(),
        }
    }
}

impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        let state = self.state.lock();
        state.start + chrono::Duration::from_std(state.elapsed).unwrap_or_else(|_| chrono::Duration::zero())
    }

    fn new_timer(&self, duration: Duration) -> Box<dyn Timer> {
        Box::new(self.watch(duration, None))
    }

    fn new_ticker(&self, period: Duration) -> Box<dyn Ticker> {
        let period = period.max(Duration::from_millis(1));
        Box::new(self.watch(period, Some(period)))
    }
}

struct FakeWatch {
    id: u64,
    receiver: mpsc::UnboundedReceiver<()>,
    state: Arc<Mutex<FakeClockState>>,
}

impl FakeWatch {
    async fn next(&mut self) {
        if self.receiver.recv().await.is_none() {
            std::future::pending::<()>().await;
        }
    }
}

#[async_trait]
impl Timer for FakeWatch {
    async fn fired(&mut self) {
        self.next().await;
    }
}

#[async_trait]
impl Ticker for FakeWatch {
    async fn tick(&mut self) {
        self.next().await;
    }
}

impl Drop for FakeWatch {
    fn drop(&mut self) {
        let id = self.id;
        self.state.lock().watchers.retain(|w| w.id != id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn is_ready(timer: &mut Box<dyn Timer>) -> bool {
        tokio::time::timeout(Duration::from_millis(20), timer.fired())
            .await
            .is_ok()
    }

    #[tokio::test]
    async fn test_fake_timer_fires_after_duration() {
        let clock = FakeClock::new(Utc::now());
        let mut timer = clock.new_timer(Duration::from_secs(25));
        assert_eq!(clock.watcher_count(), 1);

        clock.increment(Duration::from_secs(24));
        assert!(!is_ready(&mut timer).await);

        clock.increment(Duration::from_secs(1));
        assert!(is_ready(&mut timer).await);
        assert_eq!(clock.watcher_count(), 0);

        // A fired timer does not fire again
        clock.increment(Duration::from_secs(25));
        assert!(!is_ready(&mut timer).await);
    }

    #[tokio::test]
    async fn test_fake_timer_drop_removes_watcher() {
        let clock = FakeClock::new(Utc::now());
        let timer = clock.new_timer(Duration::from_secs(5));
        let _other = clock.new_timer(Duration::from_secs(5));
        assert_eq!(clock.watcher_count(), 2);

        drop(timer);
        assert_eq!(clock.watcher_count(), 1);
    }

    #[tokio::test]
    async fn test_fake_zero_timer_fires_immediately() {
        let clock = FakeClock::new(Utc::now());
        let mut timer = clock.new_timer(Duration::ZERO);
        assert_eq!(clock.watcher_count(), 0);
        assert!(is_ready(&mut timer).await);
    }

    #[tokio::test]
    async fn test_fake_ticker_ticks_every_period() {
        let clock = FakeClock::new(Utc::now());
        let mut ticker = clock.new_ticker(Duration::from_secs(5));

        for _ in 0..3 {
            clock.increment(Duration::from_secs(5));
            tokio::time::timeout(Duration::from_millis(100), ticker.tick())
                .await
                .expect("ticker should tick");
        }
        assert_eq!(clock.watcher_count(), 1);
    }

    #[tokio::test]
    async fn test_fake_clock_now_advances() {
        let start = Utc::now();
        let clock = FakeClock::new(start);
        clock.increment(Duration::from_secs(90));
        assert_eq!(clock.now(), start + chrono::Duration::seconds(90));
    }

    #[tokio::test]
    async fn test_wait_for_watcher_and_increment() {
        let clock = FakeClock::new(Utc::now());
        let waiter = clock.clone();
        let handle = tokio::spawn(async move {
            let mut timer = waiter.new_timer(Duration::from_secs(10));
            timer.fired().await;
        });

        clock
            .wait_for_watcher_and_increment(Duration::from_secs(10))
            .await;
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("timer task should finish")
            .unwrap();
    }

    #[tokio::test]
    async fn test_system_timer_fires() {
        let clock = SystemClock;
        let mut timer = clock.new_timer(Duration::from_millis(5));
        tokio::time::timeout(Duration::from_secs(1), timer.fired())
            .await
            .expect("system timer should fire");
    }
}
