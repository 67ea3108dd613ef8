//! Periodic checkpointer thread
//!
//! One named background thread (`tidemark-checkpointer`) that calls its
//! tick function once per period. The period can be changed at any time;
//! changing it restarts the current wait. A zero period parks the thread
//! until the period is changed or the checkpointer is stopped.
//!
//! The tick runs without any checkpointer lock held, so `set_period` and
//! `stop` never wait on a checkpoint in progress (`stop` does wait for the
//! thread to exit, which happens after the current tick).

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tidemark_core::Result;
use tracing::{debug, info};

/// Name of the checkpointer thread
pub const THREAD_NAME: &str = "tidemark-checkpointer";

struct State {
    period: Duration,
    // Bumped on every period change so a waiting thread restarts its timer.
    generation: u64,
    stop: bool,
    ticks: u64,
}

struct Shared {
    state: Mutex<State>,
    wake: Condvar,
}

/// Handle to the periodic checkpointer thread
pub struct Checkpointer {
    shared: Arc<Shared>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Checkpointer {
    /// Start the thread
    ///
    /// `tick` is called once per period; returning `false` ends the thread.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the thread cannot be spawned.
    pub fn spawn<F>(period: Duration, tick: F) -> Result<Self>
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                period,
                generation: 0,
                stop: false,
                ticks: 0,
            }),
            wake: Condvar::new(),
        });

        let worker = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || run(&worker, tick))?;

        info!(target: "tidemark::checkpointer", ?period, "Checkpointer started");
        Ok(Self {
            shared,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Current period (zero = disabled)
    pub fn period(&self) -> Duration {
        self.shared.state.lock().period
    }

    /// Change the period and restart the current wait
    pub fn set_period(&self, period: Duration) {
        let mut state = self.shared.state.lock();
        state.period = period;
        state.generation += 1;
        self.shared.wake.notify_all();
        debug!(target: "tidemark::checkpointer", ?period, "Checkpoint period changed");
    }

    /// Number of completed ticks
    pub fn ticks(&self) -> u64 {
        self.shared.state.lock().ticks
    }

    /// Has the thread been asked to stop?
    pub fn is_stopped(&self) -> bool {
        self.shared.state.lock().stop
    }

    /// Stop the thread and wait for it to exit
    ///
    /// Idempotent. When called from the checkpointer thread itself the
    /// thread is only signalled, not joined.
    pub fn stop(&self) {
        {
            let mut state = self.shared.state.lock();
            state.stop = true;
            self.shared.wake.notify_all();
        }

        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            let _ = handle.join();
            info!(target: "tidemark::checkpointer", "Checkpointer stopped");
        }
    }
}

impl Drop for Checkpointer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run<F>(shared: &Shared, mut tick: F)
where
    F: FnMut() -> bool,
{
    let mut state = shared.state.lock();
    loop {
        if state.stop {
            return;
        }

        let generation = state.generation;
        if state.period.is_zero() {
            shared.wake.wait(&mut state);
            continue;
        }

        let deadline = Instant::now() + state.period;
        while !state.stop && state.generation == generation && Instant::now() < deadline {
            shared.wake.wait_until(&mut state, deadline);
        }
        if state.stop {
            return;
        }
        if state.generation != generation {
            continue;
        }

        drop(state);
        let keep_going = tick();
        state = shared.state.lock();
        state.ticks += 1;
        if !keep_going {
            return;
        }
    }
}
