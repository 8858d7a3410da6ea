use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Fired when a [`Timer`] elapses. `generation` lets the receiver tell a
/// live alarm from a stale one (see [`Timer::is_current`]).
#[derive(Debug, Clone, Copy)]
pub struct Alarm {
    pub generation: u64,
}

struct TimerState {
    generation: u64,
    end_time: Option<Instant>,
    handle: Option<JoinHandle<()>>,
}

/// A single-shot countdown that restarts cleanly on every `start` call.
///
/// Starting an already-running timer cancels the previous countdown and
/// begins a new one, matching the source timer's "stop the old one, start a
/// new one" `Start` semantics. Because cancellation and an in-flight alarm
/// send can race (the alarm task may already be past its `abort` window),
/// every alarm carries the generation it was started with; callers must
/// check [`Timer::is_current`] before acting on one, which is how stale
/// alarms are tolerated without the receiver needing its own bookkeeping.
pub struct Timer {
    alarm_tx: mpsc::UnboundedSender<Alarm>,
    state: Mutex<TimerState>,
}

impl Timer {
    pub fn new(alarm_tx: mpsc::UnboundedSender<Alarm>) -> Self {
        Self {
            alarm_tx,
            state: Mutex::new(TimerState {
                generation: 0,
                end_time: None,
                handle: None,
            }),
        }
    }

    /// (Re)starts the countdown for `duration`.
    pub fn start(&self, duration: Duration) {
        let mut state = self.state.lock().unwrap();
        if let Some(handle) = state.handle.take() {
            handle.abort();
        }
        state.generation += 1;
        let generation = state.generation;
        state.end_time = Some(Instant::now() + duration);
        let alarm_tx = self.alarm_tx.clone();
        state.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let _ = alarm_tx.send(Alarm { generation });
        }));
    }

    /// Cancels any running countdown. A no-op if nothing was running.
    pub fn stop(&self) {
        let mut state = self.state.lock().unwrap();
        if let Some(handle) = state.handle.take() {
            handle.abort();
        }
        state.end_time = None;
        state.generation += 1;
    }

    /// Time left on the current countdown, or zero if nothing is running.
    pub fn remaining(&self) -> Duration {
        let state = self.state.lock().unwrap();
        state
            .end_time
            .map(|end| end.saturating_duration_since(Instant::now()))
            .unwrap_or_default()
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().unwrap().end_time.is_some()
    }

    /// Whether `generation` is still the current countdown's generation.
    pub fn is_current(&self, generation: u64) -> bool {
        self.state.lock().unwrap().generation == generation
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn fires_after_duration() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let timer = Timer::new(tx);
        timer.start(Duration::from_millis(100));
        assert!(timer.is_running());
        tokio::time::advance(Duration::from_millis(150)).await;
        let alarm = rx.recv().await.unwrap();
        assert!(timer.is_current(alarm.generation));
    }

    #[tokio::test(start_paused = true)]
    async fn restarting_invalidates_the_previous_alarm() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let timer = Timer::new(tx);
        timer.start(Duration::from_millis(100));
        let first_generation = timer.current_generation_for_test();
        timer.start(Duration::from_millis(100));
        tokio::time::advance(Duration::from_millis(150)).await;
        let alarm = rx.recv().await.unwrap();
        assert!(!timer.is_current(first_generation));
        assert!(timer.is_current(alarm.generation));
    }

    #[tokio::test]
    async fn stop_cancels_the_countdown() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let timer = Timer::new(tx);
        timer.start(Duration::from_secs(10));
        timer.stop();
        assert!(!timer.is_running());
        assert_eq!(timer.remaining(), Duration::ZERO);
    }

    impl Timer {
        fn current_generation_for_test(&self) -> u64 {
            self.state.lock().unwrap().generation
        }
    }
}
