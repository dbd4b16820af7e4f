//! Timer service of the hosted kernel.
//!
//! One daemon thread per kernel instance, started with the first timer.
//! Callbacks run on the daemon without the kernel lock, so they may start,
//! stop or query timers.

use std::sync::Arc;
use std::time::Instant;
use std::vec::Vec;

use super::Inner;
use crate::kernel::TimerKind;

pub(super) fn ensure_daemon(inner: &Arc<Inner>) {
    inner.timer_daemon.call_once(|| {
        let daemon = Arc::clone(inner);
        let spawned = std::thread::Builder::new()
            .name("host-timer".into())
            .spawn(move || run(&daemon));
        if let Err(err) = spawned {
            log::error!("host kernel: timer service failed to start: {err}");
        }
    });
}

fn run(inner: &Inner) {
    log::debug!("host kernel {}: timer service running", inner.instance);
    loop {
        let mut due = Vec::new();
        {
            let mut state = inner.state.lock();
            let now = Instant::now();
            let mut earliest: Option<Instant> = None;

            for timer in state.timers_mut() {
                if !timer.running {
                    continue;
                }
                if timer.next <= now {
                    due.push(Arc::clone(&timer.callback));
                    match timer.kind {
                        TimerKind::Once => timer.running = false,
                        TimerKind::Periodic => {
                            timer.next += timer.period;
                            // Missed periods are skipped, not replayed.
                            if timer.next <= now {
                                timer.next = now + timer.period;
                            }
                        }
                    }
                }
                if timer.running {
                    earliest = Some(earliest.map_or(timer.next, |at| at.min(timer.next)));
                }
            }

            if due.is_empty() {
                match earliest {
                    Some(at) => {
                        inner.timer_wakeup.wait_until(&mut state, at);
                    }
                    None => inner.timer_wakeup.wait(&mut state),
                }
                continue;
            }
        }

        for callback in due {
            callback();
        }
        crate::os::run_idle_hook();
    }
}
