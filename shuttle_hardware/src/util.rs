use std::io::{ErrorKind, Read};
use std::time::{Duration, Instant};

use crate::error::{HwError, Result};

/// Fill `buf` from `reader`, or fail with `Timeout` once `timeout` expires.
///
/// Empty reads and `TimedOut`/`WouldBlock` errors are retried after
/// `poll_interval`; serial ports report "nothing yet" either way.
pub fn read_exact_with_deadline(
    reader: &mut impl Read,
    buf: &mut [u8],
    timeout: Duration,
    poll_interval: Duration,
) -> Result<()> {
    let deadline = Instant::now() + timeout;
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => {}
            Ok(n) => {
                filled += n;
                continue;
            }
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) => {}
            Err(e) => return Err(HwError::Io(e)),
        }
        if Instant::now() >= deadline {
            return Err(HwError::Timeout);
        }
        std::thread::sleep(poll_interval);
    }
    Ok(())
}
