//! Per-call timer state: idle window and soft ceiling.
//!
//! Both timers are owned handles tied to one streaming call, not free-running
//! background tasks. The idle deadline moves forward on every raw stdout
//! chunk ([`CallTimers::touch`]); the soft ceiling is a fixed wall-clock
//! deadline that fires at most once and never kills anything.
//!
//! While a clarifying question is awaiting its external answer the call sits
//! in `AwaitingAnswer` for an unbounded span. [`CallTimers::suspend`] /
//! [`CallTimers::resume`] bracket that window: on resume the idle deadline
//! restarts and the ceiling deadline is pushed out by the suspended span, so
//! a slow human answer can neither trigger a spurious idle kill nor burn
//! ceiling budget.

use std::pin::Pin;
use std::time::Duration;

use tokio::time::{sleep, Instant, Sleep};

/// Which timer fired out of [`CallTimers::expired`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    /// Idle window elapsed with no stdout activity — destructive.
    Idle,
    /// Soft ceiling reached — notify only, the call continues.
    SoftCeiling,
}

/// Owned idle and soft-ceiling deadlines for one streaming call.
pub struct CallTimers {
    idle_window: Duration,
    idle: Pin<Box<Sleep>>,
    ceiling: Pin<Box<Sleep>>,
    ceiling_fired: bool,
    suspended_at: Option<Instant>,
}

impl CallTimers {
    /// Start both timers now.
    #[must_use]
    pub fn start(idle_window: Duration, ceiling_window: Duration) -> Self {
        Self {
            idle_window,
            idle: Box::pin(sleep(idle_window)),
            ceiling: Box::pin(sleep(ceiling_window)),
            ceiling_fired: false,
            suspended_at: None,
        }
    }

    /// Push the idle deadline forward; called on every raw stdout chunk.
    pub fn touch(&mut self) {
        self.idle.as_mut().reset(Instant::now() + self.idle_window);
    }

    /// Stop the clock for the `AwaitingAnswer` window.
    pub fn suspend(&mut self) {
        self.suspended_at = Some(Instant::now());
    }

    /// Restart after a suspension: the idle window begins anew and the
    /// ceiling deadline is extended by the span spent suspended.
    pub fn resume(&mut self) {
        let Some(since) = self.suspended_at.take() else {
            return;
        };
        let gap = since.elapsed();
        self.idle.as_mut().reset(Instant::now() + self.idle_window);
        if !self.ceiling_fired {
            let deadline = self.ceiling.deadline() + gap;
            self.ceiling.as_mut().reset(deadline);
        }
    }

    /// Whether the soft ceiling has already fired for this call.
    #[must_use]
    pub fn ceiling_fired(&self) -> bool {
        self.ceiling_fired
    }

    /// Wait for the next timer expiry.
    ///
    /// Returns [`TimerEvent::SoftCeiling`] at most once per call; after that
    /// only the idle deadline is armed. Cancel-safe: dropping the future and
    /// polling again later observes the same deadlines.
    pub async fn expired(&mut self) -> TimerEvent {
        if self.ceiling_fired {
            self.idle.as_mut().await;
            return TimerEvent::Idle;
        }
        tokio::select! {
            () = self.idle.as_mut() => TimerEvent::Idle,
            () = self.ceiling.as_mut() => {
                self.ceiling_fired = true;
                TimerEvent::SoftCeiling
            }
        }
    }
}

impl std::fmt::Debug for CallTimers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallTimers")
            .field("idle_window", &self.idle_window)
            .field("ceiling_fired", &self.ceiling_fired)
            .field("suspended", &self.suspended_at.is_some())
            .finish_non_exhaustive()
    }
}
