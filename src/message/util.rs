use std::io::prelude::*;
use crate::error::{Error, Result};

/// Compute the log-base-two of the next power of two: 8 -> 3, 9 -> 4.
/// 
pub fn ceil_log2(x: usize) -> usize {
    let mut n = 0;
    while 1 << n < x {
        n += 1
    }
    n
}

/// Read a usize out of the given stream.
/// 
pub fn read_usize<R: Read>(stream: &mut R) -> Result<usize> {
    Ok(usize::from_le_bytes(read_bytes_array(stream)?))
}

/// Read the given number of bytes from a stream, into a vec.
/// 
pub fn read_bytes_vec<R: Read>(stream: &mut R, size: usize) -> Result<Vec<u8>> {
    let mut buffer = vec![0; size];
    read_bytes_into(stream, &mut buffer)?;
    Ok(buffer)
}

/// Read the given (const) number of bytes from a stream, into an array.
/// 
pub fn read_bytes_array<R: Read, const SIZE: usize>(stream: &mut R) -> Result<[u8; SIZE]> {
    let mut buffer = [0; SIZE];
    read_bytes_into(stream, &mut buffer)?;
    Ok(buffer)
}

/// Fill up the given buffer by reading bytes from a stream.
///
pub fn read_bytes_into<R: Read>(stream: &mut R, buffer: &mut [u8]) -> Result<()> {
    stream
        .read_exact(buffer)
        .map_err(|e| Error::Communication(format!("truncated message: {}", e)))
}

/// Prefix a message with the rank that contributed it and its length.
/// Framed messages can be concatenated and split apart again with
/// `unframe`.
///
pub fn frame(rank: usize, message: &[u8]) -> Vec<u8> {
    let mut buffer = Vec::with_capacity(message.len() + 16);
    buffer.extend_from_slice(&rank.to_le_bytes());
    buffer.extend_from_slice(&message.len().to_le_bytes());
    buffer.extend_from_slice(message);
    buffer
}

/// Split a concatenation of framed messages into (rank, message) pairs.
///
pub fn unframe(mut buffer: &[u8]) -> Result<Vec<(usize, Vec<u8>)>> {
    let mut messages = Vec::new();
    while !buffer.is_empty() {
        let rank = read_usize(&mut buffer)?;
        let size = read_usize(&mut buffer)?;
        messages.push((rank, read_bytes_vec(&mut buffer, size)?));
    }
    Ok(messages)
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::{ceil_log2, frame, unframe};

    #[test]
    fn ceil_log2_rounds_up() {
        assert_eq!(ceil_log2(1), 0);
        assert_eq!(ceil_log2(2), 1);
        assert_eq!(ceil_log2(3), 2);
        assert_eq!(ceil_log2(8), 3);
        assert_eq!(ceil_log2(9), 4);
    }

    #[test]
    fn concatenated_frames_split_apart() {
        let mut buffer = frame(3, b"abc");
        buffer.extend(frame(0, b""));
        buffer.extend(frame(1, b"z"));

        let messages = unframe(&buffer).unwrap();
        assert_eq!(messages, vec![(3, b"abc".to_vec()), (0, vec![]), (1, b"z".to_vec())]);
        assert!(unframe(&buffer[..buffer.len() - 1]).is_err());
    }
}
