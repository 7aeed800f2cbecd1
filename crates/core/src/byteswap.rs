//! 16-bit byte swapping for images dumped in the wrong word order.

use std::io::{self, Read, Write};

const SWAP_BUFFER: usize = 4096;

/// Copy `reader` to `writer`, exchanging the two bytes of every 16-bit word.
///
/// A final odd byte is written through unchanged. Returns the number of
/// bytes written.
pub fn swap_words<R: Read, W: Write>(reader: &mut R, writer: &mut W) -> io::Result<u64> {
    let mut buf = [0u8; SWAP_BUFFER];
    // byte left over from a read that ended mid-word
    let mut carry: Option<u8> = None;
    let mut written = 0u64;

    loop {
        let start = usize::from(carry.is_some());
        if let Some(b) = carry.take() {
            buf[0] = b;
        }
        let n = match reader.read(&mut buf[start..]) {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                carry = (start == 1).then_some(buf[0]);
                continue;
            }
            Err(e) => return Err(e),
        };
        let len = start + n;
        if n == 0 {
            writer.write_all(&buf[..len])?;
            written += len as u64;
            break;
        }

        let even = len & !1;
        for pair in buf[..even].chunks_exact_mut(2) {
            pair.swap(0, 1);
        }
        writer.write_all(&buf[..even])?;
        written += even as u64;
        if even < len {
            carry = Some(buf[even]);
        }
    }

    writer.flush()?;
    Ok(written)
}
