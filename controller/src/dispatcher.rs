use std::{sync::Arc, time::Duration};

use tokio::{
    sync::{Mutex, Notify},
    task::JoinHandle,
    time::Instant,
};
use tracing::{debug, info, warn};

use lirc_thermostat_common::ThermostatModel;

use crate::lirc::Transport;

/// Milliseconds since the accessory was created. Backed by tokio's clock so
/// paused-time tests drive it.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    started: Instant,
}

impl Clock {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    /// Rounded up to the next whole millisecond, so a deadline derived from
    /// it never lands before the requested delay has elapsed.
    pub fn now_ms(&self) -> u64 {
        ceil_millis(self.started.elapsed())
    }

    fn instant_at(&self, ms: u64) -> Instant {
        self.started + Duration::from_millis(ms)
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

fn ceil_millis(elapsed: Duration) -> u64 {
    let whole: u64 = elapsed.as_millis().try_into().unwrap_or(u64::MAX);
    if elapsed.subsec_nanos() % 1_000_000 == 0 {
        whole
    } else {
        whole.saturating_add(1)
    }
}

/// Sleeps until the model's pending dispatch is due, commits it and hands
/// the command to the transport. The send runs on its own task; the timer is
/// the only thing this loop waits on besides a new request.
pub fn spawn_dispatcher<T: Transport>(
    model: Arc<Mutex<ThermostatModel>>,
    wake: Arc<Notify>,
    clock: Clock,
    transport: Arc<T>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let deadline = { model.lock().await.next_deadline_ms() };

            match deadline {
                None => {
                    wake.notified().await;
                    continue;
                }
                Some(due_ms) => {
                    tokio::select! {
                        _ = tokio::time::sleep_until(clock.instant_at(due_ms)) => {}
                        _ = wake.notified() => continue,
                    }
                }
            }

            let command = {
                let mut model = model.lock().await;
                let Some(dispatch) = model.take_due(clock.now_ms()) else {
                    debug!("dispatch window moved, rescheduling");
                    continue;
                };
                let command = dispatch.command.clone();
                model.complete(dispatch);
                command
            };

            info!("sending command: {command}");
            let transport = transport.clone();
            tokio::spawn(async move {
                if let Err(err) = transport.send(&command).await {
                    warn!("command {command} transmission failed: {err:#}");
                }
            });
        }
    })
}
