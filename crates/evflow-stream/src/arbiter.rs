//! Exactly-once terminal state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::FlowError;

#[derive(Debug)]
enum TerminalState {
    Running,
    Failed(FlowError),
    Completed,
}

/// Result of an attempted terminal transition.
#[derive(Debug)]
pub enum Transition<T = ()> {
    /// This caller moved the stream from running to done; carries whatever
    /// its notification produced.
    Won(T),
    /// The stream already failed with this cause.
    AlreadyFailed(FlowError),
    /// The stream already completed successfully.
    AlreadyCompleted,
}

/// Owns the single `running -> done` transition.
///
/// Every trigger (transport failure, transport completion, decoded error
/// message) goes through the same lock, so exactly one wins. The winner's
/// notification runs while the lock is held: a losing trigger blocks until
/// the winner has finished notifying, so it never observes a terminal state
/// whose consumers have not been told yet.
///
/// [`is_done`](Self::is_done) does not take the lock and is safe to call
/// from inside a notification.
#[derive(Debug)]
pub struct TerminalArbiter {
    state: Mutex<TerminalState>,
    done: AtomicBool,
}

impl Default for TerminalArbiter {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminalArbiter {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(TerminalState::Running),
            done: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TerminalState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// The captured failure cause, if the stream failed.
    ///
    /// Blocks while a winner is still notifying.
    pub fn failure(&self) -> Option<FlowError> {
        match &*self.lock() {
            TerminalState::Failed(cause) => Some(cause.clone()),
            _ => None,
        }
    }

    /// Try to finish the stream with `cause`.
    pub fn try_fail(&self, cause: &FlowError) -> Transition {
        self.fail_with(cause, |_| ())
    }

    /// Try to finish the stream with `cause`; on a win, run `notify` before
    /// any other trigger can observe the outcome.
    pub fn fail_with<T, F>(&self, cause: &FlowError, notify: F) -> Transition<T>
    where
        F: FnOnce(&FlowError) -> T,
    {
        let mut state = self.lock();
        match &*state {
            TerminalState::Running => {
                *state = TerminalState::Failed(cause.clone());
                self.done.store(true, Ordering::Release);
                Transition::Won(notify(cause))
            }
            TerminalState::Failed(first) => Transition::AlreadyFailed(first.clone()),
            TerminalState::Completed => Transition::AlreadyCompleted,
        }
    }

    /// Try to finish the stream successfully.
    pub fn try_complete(&self) -> Transition {
        self.complete_with(|| ())
    }

    /// Try to finish the stream successfully; on a win, run `notify` before
    /// any other trigger can observe the outcome.
    pub fn complete_with<T, F>(&self, notify: F) -> Transition<T>
    where
        F: FnOnce() -> T,
    {
        let mut state = self.lock();
        match &*state {
            TerminalState::Running => {
                *state = TerminalState::Completed;
                self.done.store(true, Ordering::Release);
                Transition::Won(notify())
            }
            TerminalState::Failed(first) => Transition::AlreadyFailed(first.clone()),
            TerminalState::Completed => Transition::AlreadyCompleted,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Arc, Barrier};
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn first_failure_wins_and_is_kept() {
        let arbiter = TerminalArbiter::new();
        assert!(matches!(
            arbiter.try_fail(&FlowError::protocol("A", "first")),
            Transition::Won(())
        ));

        match arbiter.try_fail(&FlowError::protocol("B", "second")) {
            Transition::AlreadyFailed(FlowError::Protocol { code, .. }) => assert_eq!(code, "A"),
            other => panic!("unexpected transition {other:?}"),
        }
        assert!(arbiter.is_done());
    }

    #[test]
    fn completion_after_failure_reports_original_cause() {
        let arbiter = TerminalArbiter::new();
        arbiter.try_fail(&FlowError::protocol("Boom", "bad"));

        match arbiter.try_complete() {
            Transition::AlreadyFailed(FlowError::Protocol { message, .. }) => {
                assert_eq!(message, "bad")
            }
            other => panic!("unexpected transition {other:?}"),
        }
    }

    #[test]
    fn failure_after_completion_is_rejected() {
        let arbiter = TerminalArbiter::new();
        assert!(matches!(arbiter.try_complete(), Transition::Won(())));
        assert!(matches!(
            arbiter.try_fail(&FlowError::NoSubscriber),
            Transition::AlreadyCompleted
        ));
        assert!(arbiter.failure().is_none());
    }

    #[test]
    fn racing_triggers_have_exactly_one_winner() {
        for _ in 0..50 {
            let arbiter = Arc::new(TerminalArbiter::new());
            let winners = Arc::new(AtomicUsize::new(0));
            let barrier = Arc::new(Barrier::new(8));

            let threads: Vec<_> = (0..8)
                .map(|i| {
                    let arbiter = Arc::clone(&arbiter);
                    let winners = Arc::clone(&winners);
                    let barrier = Arc::clone(&barrier);
                    thread::spawn(move || {
                        barrier.wait();
                        let transition = if i % 2 == 0 {
                            arbiter.try_complete()
                        } else {
                            arbiter.try_fail(&FlowError::protocol("Race", i.to_string()))
                        };
                        if matches!(transition, Transition::Won(())) {
                            winners.fetch_add(1, Ordering::SeqCst);
                        }
                    })
                })
                .collect();
            for thread in threads {
                thread.join().unwrap();
            }

            assert_eq!(winners.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn winner_notification_result_is_returned() {
        let arbiter = TerminalArbiter::new();

        match arbiter.complete_with(|| 7) {
            Transition::Won(value) => assert_eq!(value, 7),
            other => panic!("unexpected transition {other:?}"),
        }
        assert!(matches!(
            arbiter.fail_with::<(), _>(&FlowError::NoSubscriber, |_| unreachable!()),
            Transition::AlreadyCompleted
        ));
    }

    #[test]
    fn is_done_is_visible_inside_the_notification() {
        let arbiter = TerminalArbiter::new();
        let transition = arbiter.fail_with(&FlowError::NoSubscriber, |_| arbiter.is_done());
        assert!(matches!(transition, Transition::Won(true)));
    }

    #[test]
    fn loser_waits_for_the_winner_to_finish_notifying() {
        let arbiter = Arc::new(TerminalArbiter::new());
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        let notifying = Arc::new(Barrier::new(2));

        let winner = {
            let arbiter = Arc::clone(&arbiter);
            let log = Arc::clone(&log);
            let notifying = Arc::clone(&notifying);
            thread::spawn(move || {
                arbiter.fail_with(&FlowError::protocol("Slow", "down"), |_| {
                    notifying.wait();
                    thread::sleep(Duration::from_millis(100));
                    log.lock().unwrap().push("notified");
                });
            })
        };

        notifying.wait();
        let transition = arbiter.try_complete();
        log.lock().unwrap().push("loser returned");
        winner.join().unwrap();

        assert!(matches!(transition, Transition::AlreadyFailed(_)));
        assert_eq!(*log.lock().unwrap(), vec!["notified", "loser returned"]);
    }
}
