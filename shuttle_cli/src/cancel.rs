//! Run cancellation: a `STOP` line on stdin or Ctrl-C.

use crossbeam_channel as xch;
use std::io::BufRead;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Line that cancels a run when read from stdin.
pub const STOP_LINE: &str = "STOP";

/// Non-blocking cancellation source checked once per control tick.
pub struct Cancellation {
    lines: xch::Receiver<String>,
    interrupted: Arc<AtomicBool>,
    stopped: AtomicBool,
}

impl Cancellation {
    /// Spawn the stdin reader and install the Ctrl-C handler.
    pub fn install() -> Self {
        let (tx, rx) = xch::unbounded();
        std::thread::spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
            tracing::trace!("stdin reader exiting");
        });

        let interrupted = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&interrupted);
        if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed)) {
            tracing::warn!(error = %e, "failed to install Ctrl-C handler; STOP on stdin still works");
        }
        Self::from_parts(rx, interrupted)
    }

    pub fn from_parts(lines: xch::Receiver<String>, interrupted: Arc<AtomicBool>) -> Self {
        Self {
            lines,
            interrupted,
            stopped: AtomicBool::new(false),
        }
    }

    /// Drain pending lines; `true` once STOP or Ctrl-C has been seen.
    pub fn requested(&self) -> bool {
        if self.stopped.load(Ordering::Relaxed) {
            return true;
        }
        if self.interrupted.load(Ordering::Relaxed) {
            tracing::warn!("interrupt received");
            self.stopped.store(true, Ordering::Relaxed);
            return true;
        }
        while let Ok(line) = self.lines.try_recv() {
            if line.trim().eq_ignore_ascii_case(STOP_LINE) {
                tracing::warn!("STOP received on stdin");
                self.stopped.store(true, Ordering::Relaxed);
                return true;
            }
            tracing::debug!(line = %line.trim(), "ignoring stdin line");
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_line_is_latched() {
        let (tx, rx) = xch::unbounded();
        let c = Cancellation::from_parts(rx, Arc::new(AtomicBool::new(false)));
        assert!(!c.requested());
        tx.send("hello".into()).unwrap();
        assert!(!c.requested());
        tx.send(" stop ".into()).unwrap();
        assert!(c.requested());
        assert!(c.requested());
    }

    #[test]
    fn interrupt_flag_cancels() {
        let (_tx, rx) = xch::unbounded::<String>();
        let flag = Arc::new(AtomicBool::new(false));
        let c = Cancellation::from_parts(rx, Arc::clone(&flag));
        flag.store(true, Ordering::Relaxed);
        assert!(c.requested());
    }

    #[test]
    fn closed_stdin_never_cancels() {
        let (tx, rx) = xch::unbounded::<String>();
        drop(tx);
        let c = Cancellation::from_parts(rx, Arc::new(AtomicBool::new(false)));
        assert!(!c.requested());
    }
}
