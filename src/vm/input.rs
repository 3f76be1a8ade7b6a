//! Character input for the `in` instruction
//!
//! `in` must stay cancellable while it waits for a byte. Plain readers are
//! read directly, which only notices the interrupt flag if the read itself
//! returns `ErrorKind::Interrupted`. [`ThreadedInput`] moves the blocking read
//! onto a helper thread and polls the flag while it waits, so a raised flag
//! ends the wait even when the underlying read never returns.

use log::debug;
use std::io::{self, ErrorKind, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;

/// How often a waiting `in` checks the interrupt flag
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Outcome of waiting for one input byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    Byte(u8),

    /// End of input
    Closed,

    /// The interrupt flag was raised before a byte arrived. No input was consumed.
    Cancelled,
}

/// Source of bytes for `in`
pub trait CharInput {
    /// Wait for the next byte, giving up when `interrupt` is raised
    fn read_byte(&mut self, interrupt: &AtomicBool) -> io::Result<InputEvent>;
}

impl<R> CharInput for R
where
    R: Read,
{
    fn read_byte(&mut self, interrupt: &AtomicBool) -> io::Result<InputEvent> {
        let mut byte = [0u8; 1];
        loop {
            match self.read(&mut byte) {
                Ok(0) => return Ok(InputEvent::Closed),
                Ok(_) => return Ok(InputEvent::Byte(byte[0])),
                Err(err) if err.kind() == ErrorKind::Interrupted => {
                    if interrupt.load(Ordering::SeqCst) {
                        return Ok(InputEvent::Cancelled);
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// A reader driven from a helper thread.
///
/// The thread reads exactly one byte per request, so nothing is read ahead
/// of what `in` asks for. A request abandoned by a cancelled `in` stays
/// outstanding and its byte is delivered to the next `in`.
pub struct ThreadedInput {
    requests: Sender<()>,
    bytes: Receiver<io::Result<Option<u8>>>,
    outstanding: bool,
}

impl ThreadedInput {
    /// Serve `reader` from a new helper thread
    pub fn new<R>(mut reader: R) -> Self
    where
        R: Read + Send + 'static,
    {
        let (requests, pending) = mpsc::channel::<()>();
        let (deliver, bytes) = mpsc::channel();

        thread::spawn(move || {
            let mut byte = [0u8; 1];
            while pending.recv().is_ok() {
                let result = loop {
                    match reader.read(&mut byte) {
                        Ok(0) => break Ok(None),
                        Ok(_) => break Ok(Some(byte[0])),
                        Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                        Err(err) => break Err(err),
                    }
                };
                let closed = !matches!(result, Ok(Some(_)));
                if deliver.send(result).is_err() || closed {
                    break;
                }
            }
            debug!("input thread finished");
        });

        Self {
            requests,
            bytes,
            outstanding: false,
        }
    }

    /// Serve the process's standard input
    pub fn stdin() -> Self {
        Self::new(io::stdin())
    }
}

impl CharInput for ThreadedInput {
    fn read_byte(&mut self, interrupt: &AtomicBool) -> io::Result<InputEvent> {
        if !self.outstanding {
            if self.requests.send(()).is_err() {
                return Ok(InputEvent::Closed);
            }
            self.outstanding = true;
        }

        loop {
            if interrupt.load(Ordering::SeqCst) {
                return Ok(InputEvent::Cancelled);
            }
            match self.bytes.recv_timeout(POLL_INTERVAL) {
                Ok(result) => {
                    self.outstanding = false;
                    return Ok(match result? {
                        Some(byte) => InputEvent::Byte(byte),
                        None => InputEvent::Closed,
                    });
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    self.outstanding = false;
                    return Ok(InputEvent::Closed);
                }
            }
        }
    }
}

impl std::fmt::Debug for ThreadedInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadedInput")
            .field("outstanding", &self.outstanding)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::Arc;

    /// Blocks until bytes are fed through the paired sender
    struct Stalled(Receiver<u8>);

    impl Read for Stalled {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.0.recv() {
                Ok(byte) => {
                    buf[0] = byte;
                    Ok(1)
                }
                Err(_) => Ok(0),
            }
        }
    }

    #[test]
    fn test_plain_reader() {
        let flag = AtomicBool::new(false);
        let mut input = Cursor::new(b"a".to_vec());
        assert_eq!(input.read_byte(&flag).unwrap(), InputEvent::Byte(b'a'));
        assert_eq!(input.read_byte(&flag).unwrap(), InputEvent::Closed);
    }

    #[test]
    fn test_threaded_reader_delivers_bytes_then_closes() {
        let flag = AtomicBool::new(false);
        let mut input = ThreadedInput::new(Cursor::new(b"hi".to_vec()));
        assert_eq!(input.read_byte(&flag).unwrap(), InputEvent::Byte(b'h'));
        assert_eq!(input.read_byte(&flag).unwrap(), InputEvent::Byte(b'i'));
        assert_eq!(input.read_byte(&flag).unwrap(), InputEvent::Closed);
        assert_eq!(input.read_byte(&flag).unwrap(), InputEvent::Closed);
    }

    #[test]
    fn test_cancel_keeps_pending_byte() {
        let (feed, source) = mpsc::channel();
        let mut input = ThreadedInput::new(Stalled(source));
        let flag = Arc::new(AtomicBool::new(false));

        let raiser = Arc::clone(&flag);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            raiser.store(true, Ordering::SeqCst);
        });
        assert_eq!(input.read_byte(&flag).unwrap(), InputEvent::Cancelled);
        handle.join().unwrap();

        flag.store(false, Ordering::SeqCst);
        feed.send(b'z').unwrap();
        assert_eq!(input.read_byte(&flag).unwrap(), InputEvent::Byte(b'z'));
    }
}
