use std::io::{self, Read};
use std::time::{Duration, Instant};

use shuttle_hardware::error::HwError;
use shuttle_hardware::util::read_exact_with_deadline;

/// Yields one byte per call after a few empty or timed-out reads.
struct Trickle {
    data: Vec<u8>,
    calls: usize,
}

impl Read for Trickle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.calls += 1;
        match self.calls % 3 {
            0 => Err(io::Error::from(io::ErrorKind::TimedOut)),
            1 => Ok(0),
            _ => {
                if self.data.is_empty() || buf.is_empty() {
                    return Ok(0);
                }
                buf[0] = self.data.remove(0);
                Ok(1)
            }
        }
    }
}

#[test]
fn slow_reader_fills_the_buffer() {
    let mut r = Trickle {
        data: vec![1, 2, 3, 4],
        calls: 0,
    };
    let mut buf = [0u8; 4];
    read_exact_with_deadline(
        &mut r,
        &mut buf,
        Duration::from_millis(500),
        Duration::from_micros(200),
    )
    .expect("filled");
    assert_eq!(buf, [1, 2, 3, 4]);
}

#[test]
fn short_reader_times_out() {
    let mut r = Trickle {
        data: vec![1],
        calls: 0,
    };
    let mut buf = [0u8; 4];
    let start = Instant::now();
    let err = read_exact_with_deadline(
        &mut r,
        &mut buf,
        Duration::from_millis(5),
        Duration::from_micros(200),
    )
    .expect_err("expected timeout error");
    assert!(matches!(err, HwError::Timeout), "unexpected error: {err:?}");
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[test]
fn hard_io_errors_propagate() {
    struct Broken;
    impl Read for Broken {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }
    }
    let mut buf = [0u8; 1];
    let err = read_exact_with_deadline(
        &mut Broken,
        &mut buf,
        Duration::from_millis(5),
        Duration::from_micros(200),
    )
    .expect_err("broken pipe");
    assert!(matches!(err, HwError::Io(_)));
}
