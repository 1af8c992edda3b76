//! Timer handles.

use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::trace;

use crate::completion::Event;
use crate::error::LoopError;
use crate::event_loop::EventLoop;
use crate::handle::{Handle, HandleId, HandleKind, HandleState, TimerState};

/// Longest timeout or repeat honoured; anything longer waits this long.
/// Keeps deadline arithmetic on `Instant` from overflowing.
pub(crate) const MAX_TIMER_DELAY: Duration = Duration::from_secs(86_400 * 365 * 30);

impl EventLoop {
    pub fn timer_new(&self) -> HandleId {
        self.insert_handle(HandleState::Timer(TimerState::default()))
    }

    /// Fire after `timeout`, then every `repeat` if given. A zero `repeat`
    /// means one-shot. Starting a running timer replaces its schedule.
    /// Both are capped at thirty years.
    pub fn timer_start(
        &self,
        id: HandleId,
        timeout: Duration,
        repeat: Option<Duration>,
    ) -> Result<(), LoopError> {
        let timeout = timeout.min(MAX_TIMER_DELAY);
        let repeat = repeat
            .filter(|period| !period.is_zero())
            .map(|period| period.min(MAX_TIMER_DELAY));
        let tx = self.sender();
        self.with_timer("timer_start", id, |handle| {
            let Handle { flags, state, .. } = handle;
            if let HandleState::Timer(timer) = state {
                timer.cancel();
                timer.repeat = repeat;
                let generation = timer.generation;
                timer.task = Some(self.spawn(fire(tx, id, generation, timeout, repeat)));
            }
            self.adjust_refs(flags.set_active(true));
            trace!(handle = %id, ?timeout, ?repeat, "timer started");
            Ok(())
        })
    }

    pub fn timer_stop(&self, id: HandleId) -> Result<(), LoopError> {
        self.with_timer("timer_stop", id, |handle| {
            let Handle { flags, state, .. } = handle;
            if let HandleState::Timer(timer) = state {
                timer.cancel();
            }
            self.adjust_refs(flags.set_active(false));
            Ok(())
        })
    }

    /// Repeat interval of a timer, `None` for one-shot.
    pub fn timer_repeat(&self, id: HandleId) -> Result<Option<Duration>, LoopError> {
        self.with_timer("timer_get_repeat", id, |handle| match &handle.state {
            HandleState::Timer(timer) => Ok(timer.repeat),
            HandleState::Tcp(_) => Ok(None),
        })
    }

    fn with_timer<R>(
        &self,
        op: &'static str,
        id: HandleId,
        f: impl FnOnce(&mut Handle) -> Result<R, LoopError>,
    ) -> Result<R, LoopError> {
        self.with_handle(id, |handle| match handle.kind() {
            HandleKind::Timer => f(handle),
            actual => Err(LoopError::WrongKind {
                op,
                expected: HandleKind::Timer,
                actual,
            }),
        })
    }
}

async fn fire(
    tx: UnboundedSender<Event>,
    handle: HandleId,
    generation: u64,
    timeout: Duration,
    repeat: Option<Duration>,
) {
    time::sleep(timeout).await;
    if tx.send(Event::TimerFired { handle, generation }).is_err() {
        return;
    }
    let Some(period) = repeat else {
        return;
    };
    let start = Instant::now()
        .checked_add(period)
        .unwrap_or_else(|| Instant::now() + MAX_TIMER_DELAY);
    let mut ticks = time::interval_at(start, period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticks.tick().await;
        if tx.send(Event::TimerFired { handle, generation }).is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::MAX_TIMER_DELAY;
    use crate::{Completion, EventLoop, HandleKind, LoopError, RunMode};
    use std::time::{Duration, Instant};

    #[test]
    fn one_shot_timer_fires_once_then_goes_idle() {
        let event_loop = EventLoop::new().unwrap();
        let timer = event_loop.timer_new();
        event_loop
            .timer_start(timer, Duration::from_millis(10), None)
            .unwrap();
        assert!(event_loop.is_active(timer).unwrap());
        assert_eq!(event_loop.ref_count(), 1);

        let started = Instant::now();
        let mut fired = 0;
        event_loop
            .run(RunMode::Default, |completion| {
                assert!(matches!(completion, Completion::Timer { handle } if handle == timer));
                fired += 1;
                Ok::<_, LoopError>(())
            })
            .unwrap();

        assert_eq!(fired, 1);
        assert!(started.elapsed() >= Duration::from_millis(10));
        assert!(!event_loop.is_active(timer).unwrap());
        assert_eq!(event_loop.ref_count(), 0);
    }

    #[test]
    fn repeating_timer_runs_until_stopped() {
        let event_loop = EventLoop::new().unwrap();
        let timer = event_loop.timer_new();
        event_loop
            .timer_start(timer, Duration::from_millis(1), Some(Duration::from_millis(2)))
            .unwrap();
        assert_eq!(event_loop.timer_repeat(timer).unwrap(), Some(Duration::from_millis(2)));

        let mut fired = 0;
        event_loop
            .run(RunMode::Default, |_| {
                fired += 1;
                if fired == 3 {
                    event_loop.timer_stop(timer)?;
                }
                Ok::<_, LoopError>(())
            })
            .unwrap();

        assert_eq!(fired, 3);
        assert!(!event_loop.is_active(timer).unwrap());
    }

    #[test]
    fn zero_repeat_means_one_shot() {
        let event_loop = EventLoop::new().unwrap();
        let timer = event_loop.timer_new();
        event_loop
            .timer_start(timer, Duration::ZERO, Some(Duration::ZERO))
            .unwrap();
        assert_eq!(event_loop.timer_repeat(timer).unwrap(), None);
    }

    #[test]
    fn huge_delays_are_capped() {
        let event_loop = EventLoop::new().unwrap();
        let timer = event_loop.timer_new();
        event_loop
            .timer_start(timer, Duration::ZERO, Some(Duration::MAX))
            .unwrap();
        assert_eq!(event_loop.timer_repeat(timer).unwrap(), Some(MAX_TIMER_DELAY));

        // The first tick fires; the repeat schedule must not kill the task.
        let mut fired = 0;
        event_loop
            .run(RunMode::Default, |_| {
                fired += 1;
                event_loop.timer_stop(timer)?;
                Ok::<_, LoopError>(())
            })
            .unwrap();
        assert_eq!(fired, 1);

        event_loop.timer_start(timer, Duration::MAX, None).unwrap();
        assert!(event_loop.is_active(timer).unwrap());
        event_loop.timer_stop(timer).unwrap();
        assert_eq!(event_loop.ref_count(), 0);
    }

    #[test]
    fn stopped_timer_never_fires() {
        let event_loop = EventLoop::new().unwrap();
        let timer = event_loop.timer_new();
        event_loop
            .timer_start(timer, Duration::from_millis(1), None)
            .unwrap();
        event_loop.timer_stop(timer).unwrap();
        assert_eq!(event_loop.ref_count(), 0);

        let mut fired = 0;
        event_loop
            .run(RunMode::Default, |_| {
                fired += 1;
                Ok::<_, LoopError>(())
            })
            .unwrap();
        assert_eq!(fired, 0);
    }

    #[test]
    fn restarting_replaces_the_schedule() {
        let event_loop = EventLoop::new().unwrap();
        let timer = event_loop.timer_new();
        event_loop
            .timer_start(timer, Duration::from_millis(1), None)
            .unwrap();
        event_loop
            .timer_start(timer, Duration::from_millis(5), None)
            .unwrap();
        // Restarting an active timer does not take a second reference.
        assert_eq!(event_loop.ref_count(), 1);

        let mut fired = 0;
        event_loop
            .run(RunMode::Default, |_| {
                fired += 1;
                Ok::<_, LoopError>(())
            })
            .unwrap();
        assert_eq!(fired, 1);
    }

    #[test]
    fn unreferenced_timer_does_not_hold_the_loop() {
        let event_loop = EventLoop::new().unwrap();
        let timer = event_loop.timer_new();
        event_loop
            .timer_start(timer, Duration::from_secs(60), None)
            .unwrap();
        event_loop.unref_handle(timer).unwrap();
        assert!(!event_loop.has_ref(timer).unwrap());
        assert_eq!(event_loop.ref_count(), 0);

        let started = Instant::now();
        event_loop
            .run(RunMode::Default, |_| Ok::<_, LoopError>(()))
            .unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(event_loop.is_active(timer).unwrap());

        event_loop.ref_handle(timer).unwrap();
        assert_eq!(event_loop.ref_count(), 1);
    }

    #[test]
    fn closing_from_the_callback_reports_closed() {
        let event_loop = EventLoop::new().unwrap();
        let timer = event_loop.timer_new();
        event_loop
            .timer_start(timer, Duration::ZERO, Some(Duration::from_millis(1)))
            .unwrap();

        let mut seen = Vec::new();
        event_loop
            .run(RunMode::Default, |completion| {
                if let Completion::Timer { handle } = completion {
                    event_loop.close(handle)?;
                }
                seen.push(completion);
                Ok::<_, LoopError>(())
            })
            .unwrap();

        assert!(matches!(
            seen.as_slice(),
            [Completion::Timer { .. }, Completion::Closed { handle }] if *handle == timer
        ));
        assert_eq!(event_loop.ref_count(), 0);
    }

    #[test]
    fn timer_ops_reject_tcp_handles() {
        let event_loop = EventLoop::new().unwrap();
        let tcp = event_loop.tcp_new();
        let err = event_loop
            .timer_start(tcp, Duration::ZERO, None)
            .unwrap_err();
        assert!(matches!(
            err,
            LoopError::WrongKind { expected: HandleKind::Timer, actual: HandleKind::Tcp, .. }
        ));
    }
}
