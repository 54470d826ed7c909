//! Single-driver-task timer wheel backing spot reclaim and instance reap
//! scheduling (`spec.md` §9: one tokio task draining a min-heap instead of a
//! task-per-timer). Callers get a handle they can cancel by id; a generation
//! counter means a timer fired just as it's being cancelled is silently
//! dropped rather than double-firing or racing the cancel.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(pub u64);

struct Entry {
    fire_at: Instant,
    id: TimerId,
    generation: u64,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.fire_at == other.fire_at
    }
}
impl Eq for Entry {}
impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Entry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.fire_at.cmp(&other.fire_at)
    }
}

struct Shared<F> {
    heap: Mutex<BinaryHeap<Reverse<Entry>>>,
    generations: Mutex<HashMap<u64, u64>>,
    next_id: std::sync::atomic::AtomicU64,
    on_fire: F,
}

/// A scheduler for one kind of callback. `F` is invoked with the `TimerId`
/// that fired; it runs on the shared driver task, so handlers must be cheap
/// (spawn their own task if real work is needed).
pub struct TimerWheel<F> {
    shared: Arc<Shared<F>>,
    wake: mpsc::UnboundedSender<()>,
}

impl<F> Clone for TimerWheel<F> {
    fn clone(&self) -> Self {
        TimerWheel { shared: self.shared.clone(), wake: self.wake.clone() }
    }
}

impl<F> TimerWheel<F>
where
    F: Fn(TimerId) + Send + Sync + 'static,
{
    pub fn spawn(on_fire: F) -> Self {
        let shared = Arc::new(Shared {
            heap: Mutex::new(BinaryHeap::new()),
            generations: Mutex::new(HashMap::new()),
            next_id: std::sync::atomic::AtomicU64::new(1),
            on_fire,
        });
        let (wake_tx, mut wake_rx) = mpsc::unbounded_channel();
        let driver_shared = shared.clone();
        tokio::spawn(async move {
            loop {
                let next_fire_at = {
                    let heap = driver_shared.heap.lock().await;
                    heap.peek().map(|Reverse(e)| e.fire_at)
                };
                match next_fire_at {
                    None => {
                        if wake_rx.recv().await.is_none() {
                            return;
                        }
                    }
                    Some(fire_at) => {
                        tokio::select! {
                            _ = tokio::time::sleep_until(fire_at) => {
                                let due = {
                                    let mut heap = driver_shared.heap.lock().await;
                                    let mut due = Vec::new();
                                    while let Some(Reverse(e)) = heap.peek() {
                                        if e.fire_at <= Instant::now() {
                                            let Reverse(e) = heap.pop().unwrap();
                                            due.push(e);
                                        } else {
                                            break;
                                        }
                                    }
                                    due
                                };
                                for e in due {
                                    let current_gen = driver_shared.generations.lock().await.get(&e.id.0).copied();
                                    if current_gen == Some(e.generation) {
                                        (driver_shared.on_fire)(e.id);
                                    }
                                }
                            }
                            msg = wake_rx.recv() => {
                                if msg.is_none() {
                                    return;
                                }
                            }
                        }
                    }
                }
            }
        });
        TimerWheel { shared, wake: wake_tx }
    }

    /// Schedules a new timer and returns its id. Any earlier timer with the
    /// same id (if the caller reuses one, e.g. re-arming a reclaim timer on
    /// instance restart) is superseded via a fresh generation.
    pub async fn schedule(&self, after: Duration) -> TimerId {
        let id = TimerId(self.shared.next_id.fetch_add(1, std::sync::atomic::Ordering::Relaxed));
        self.arm(id, after).await;
        id
    }

    /// Re-arms a specific, caller-chosen id, bumping its generation so any
    /// timer already in the heap under the previous generation is ignored.
    pub async fn arm(&self, id: TimerId, after: Duration) {
        let generation = {
            let mut gens = self.shared.generations.lock().await;
            let g = gens.entry(id.0).or_insert(0);
            *g += 1;
            *g
        };
        let fire_at = Instant::now() + after;
        self.shared.heap.lock().await.push(Reverse(Entry { fire_at, id, generation }));
        let _ = self.wake.send(());
    }

    /// Cancels a timer. Safe to call even if it already fired or was never
    /// scheduled.
    pub async fn cancel(&self, id: TimerId) {
        let mut gens = self.shared.generations.lock().await;
        gens.insert(id.0, gens.get(&id.0).copied().unwrap_or(0) + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn fires_after_delay() {
        let fired = Arc::new(AtomicUsize::new(0));
        let fired2 = fired.clone();
        let wheel = TimerWheel::spawn(move |_id| {
            fired2.fetch_add(1, Ordering::SeqCst);
        });
        wheel.schedule(Duration::from_secs(5)).await;
        tokio::time::advance(Duration::from_secs(4)).await;
        tokio::task::yield_now().await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        tokio::time::advance(Duration::from_secs(2)).await;
        tokio::task::yield_now().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_suppresses_fire() {
        let fired = Arc::new(AtomicUsize::new(0));
        let fired2 = fired.clone();
        let wheel = TimerWheel::spawn(move |_id| {
            fired2.fetch_add(1, Ordering::SeqCst);
        });
        let id = wheel.schedule(Duration::from_secs(5)).await;
        wheel.cancel(id).await;
        tokio::time::advance(Duration::from_secs(10)).await;
        tokio::task::yield_now().await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn rearm_replaces_previous_fire() {
        let fired = Arc::new(AtomicUsize::new(0));
        let fired2 = fired.clone();
        let wheel = TimerWheel::spawn(move |_id| {
            fired2.fetch_add(1, Ordering::SeqCst);
        });
        let id = TimerId(999);
        wheel.arm(id, Duration::from_secs(5)).await;
        wheel.arm(id, Duration::from_secs(10)).await;
        tokio::time::advance(Duration::from_secs(6)).await;
        tokio::task::yield_now().await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        tokio::time::advance(Duration::from_secs(5)).await;
        tokio::task::yield_now().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
