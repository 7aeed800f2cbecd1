//! The `flash\n` probe exchange.

use crate::link::Link;
use crate::SerialError;
use std::io::{self, Write};
use std::time::{Duration, Instant};

/// Sent to a port, and expected back verbatim from a dumper.
pub const HANDSHAKE: &[u8] = b"flash\n";

/// Longest response line read before giving up on a newline
pub const MAX_RESPONSE_LEN: usize = 64;

/// Send the handshake on `link` and check the echoed line.
pub fn handshake(link: &mut dyn Link, port: &str, timeout: Duration) -> Result<(), SerialError> {
    link.write_all(HANDSHAKE)?;
    link.flush()?;

    let response = read_line(link, timeout)?;
    if response.is_empty() {
        return Err(SerialError::HandshakeTimeout {
            port: port.to_string(),
        });
    }
    if response != HANDSHAKE {
        return Err(SerialError::HandshakeMismatch {
            port: port.to_string(),
            response: String::from_utf8_lossy(&response).into_owned(),
        });
    }
    Ok(())
}

/// Read up to and including `\n`.
///
/// Stops early, returning what was read so far, when the link times out,
/// reaches end of stream, the overall `timeout` elapses, or
/// [`MAX_RESPONSE_LEN`] bytes arrive without a newline.
pub fn read_line(link: &mut dyn Link, timeout: Duration) -> io::Result<Vec<u8>> {
    let deadline = Instant::now() + timeout;
    let mut line = Vec::new();
    let mut byte = [0u8; 1];

    while line.len() < MAX_RESPONSE_LEN {
        if Instant::now() > deadline {
            break;
        }
        match link.read(&mut byte) {
            Ok(0) => break,
            Ok(_) => {
                line.push(byte[0]);
                if byte[0] == b'\n' {
                    break;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
                ) =>
            {
                break
            }
            Err(e) => return Err(e),
        }
    }
    Ok(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    /// Replays a canned response and records what was written
    struct Scripted {
        reply: io::Cursor<Vec<u8>>,
        written: Vec<u8>,
        timeout_when_empty: bool,
    }

    impl Scripted {
        fn new(reply: &[u8]) -> Self {
            Self {
                reply: io::Cursor::new(reply.to_vec()),
                written: Vec::new(),
                timeout_when_empty: true,
            }
        }
    }

    impl Read for Scripted {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.reply.read(buf)?;
            if n == 0 && self.timeout_when_empty {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "timed out"));
            }
            Ok(n)
        }
    }

    impl Write for Scripted {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    const TIMEOUT: Duration = Duration::from_millis(200);

    #[test]
    fn test_echo_is_accepted() {
        let mut link = Scripted::new(b"flash\n");
        handshake(&mut link, "COM3", TIMEOUT).unwrap();
        assert_eq!(link.written, b"flash\n");
    }

    #[test]
    fn test_only_first_line_is_read() {
        let mut link = Scripted::new(b"flash\nready\n");
        handshake(&mut link, "COM3", TIMEOUT).unwrap();
    }

    #[test]
    fn test_garbage_is_mismatch() {
        let mut link = Scripted::new(b"garbage\n");
        match handshake(&mut link, "COM3", TIMEOUT) {
            Err(SerialError::HandshakeMismatch { port, response }) => {
                assert_eq!(port, "COM3");
                assert_eq!(response, "garbage\n");
            }
            other => panic!("expected mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_newline_is_mismatch() {
        let mut link = Scripted::new(b"flash");
        assert!(matches!(
            handshake(&mut link, "COM3", TIMEOUT),
            Err(SerialError::HandshakeMismatch { .. })
        ));
    }

    #[test]
    fn test_silence_is_timeout() {
        let mut link = Scripted::new(b"");
        assert!(matches!(
            handshake(&mut link, "COM3", TIMEOUT),
            Err(SerialError::HandshakeTimeout { .. })
        ));

        let mut eof = Scripted::new(b"");
        eof.timeout_when_empty = false;
        assert!(matches!(
            handshake(&mut eof, "COM3", TIMEOUT),
            Err(SerialError::HandshakeTimeout { .. })
        ));
    }

    #[test]
    fn test_endless_line_is_capped() {
        let noise = vec![b'x'; MAX_RESPONSE_LEN * 4];
        let mut link = Scripted::new(&noise);
        let line = read_line(&mut link, TIMEOUT).unwrap();
        assert_eq!(line.len(), MAX_RESPONSE_LEN);
    }

    #[test]
    fn test_hard_errors_propagate() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged"))
            }
        }
        impl Write for Broken {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                Ok(buf.len())
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }
        assert!(matches!(
            handshake(&mut Broken, "COM9", TIMEOUT),
            Err(SerialError::Io(_))
        ));
    }
}
