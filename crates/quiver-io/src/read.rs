//! Blocking read helpers.

use std::io::{self, Read};
use std::mem;

use crate::error::{StreamError, StreamResult};

/// Chunk size used by [`read_data`].
pub const READ_DATA_CHUNK_SIZE: usize = 16 * 1024;

/// Fill `buf` completely from `reader`.
///
/// Partial reads are accumulated until the buffer is full. A read returning
/// zero before that point fails with [`StreamError::UnexpectedEof`].
pub fn read_entire_block<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> StreamResult<()> {
    let mut total = 0;
    while total < buf.len() {
        match reader.read(&mut buf[total..]) {
            Ok(0) => {
                return Err(StreamError::UnexpectedEof {
                    expected: buf.len(),
                    read: total,
                });
            }
            Ok(n) => total += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Allocate a `count`-byte buffer and fill it with [`read_entire_block`].
pub fn read_entire_block_vec<R: Read + ?Sized>(reader: &mut R, count: usize) -> StreamResult<Vec<u8>> {
    let mut buf = vec![0u8; count];
    read_entire_block(reader, &mut buf)?;
    Ok(buf)
}

/// Read `reader` to exhaustion into one contiguous buffer.
///
/// Bytes are gathered into fixed [`READ_DATA_CHUNK_SIZE`] chunks; the result
/// is allocated once at the end, sized to the exact total, so the read loop
/// never reallocates.
pub fn read_data<R: Read + ?Sized>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut full: Vec<Box<[u8]>> = Vec::new();
    let mut current = new_chunk();
    let mut offset = 0;

    loop {
        let n = match reader.read(&mut current[offset..]) {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        if n == 0 {
            break;
        }
        offset += n;
        if offset == current.len() {
            full.push(mem::replace(&mut current, new_chunk()));
            offset = 0;
        }
    }

    let total = full.iter().map(|chunk| chunk.len()).sum::<usize>() + offset;
    let mut result = Vec::with_capacity(total);
    for chunk in &full {
        result.extend_from_slice(chunk);
    }
    result.extend_from_slice(&current[..offset]);
    Ok(result)
}

fn new_chunk() -> Box<[u8]> {
    vec![0u8; READ_DATA_CHUNK_SIZE].into_boxed_slice()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Reader that hands out at most `step` bytes per call.
    struct Trickle {
        data: Vec<u8>,
        pos: usize,
        step: usize,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.step.min(buf.len()).min(self.data.len() - self.pos);
            buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 % 256) as u8).collect()
    }

    #[test]
    fn exact_block_from_exact_length_stream() {
        let data = pattern(100);
        let block = read_entire_block_vec(&mut Cursor::new(data.clone()), 100).unwrap();
        assert_eq!(block, data);
    }

    #[test]
    fn exact_block_fails_on_short_stream() {
        let err = read_entire_block_vec(&mut Cursor::new(pattern(99)), 100).unwrap_err();
        match err {
            StreamError::UnexpectedEof { expected, read } => {
                assert_eq!(expected, 100);
                assert_eq!(read, 99);
            }
            other => panic!("expected UnexpectedEof, got {other:?}"),
        }
    }

    #[test]
    fn exact_block_accumulates_partial_reads() {
        let data = pattern(50);
        let mut reader = Trickle {
            data: data.clone(),
            pos: 0,
            step: 3,
        };
        let mut buf = [0u8; 40];
        read_entire_block(&mut reader, &mut buf).unwrap();
        assert_eq!(&buf[..], &data[..40]);
        assert_eq!(reader.pos, 40);
    }

    #[test]
    fn exact_block_of_zero_bytes_reads_nothing() {
        let mut reader = Cursor::new(Vec::<u8>::new());
        assert!(read_entire_block_vec(&mut reader, 0).unwrap().is_empty());
    }

    #[test]
    fn read_data_matches_source_across_chunk_boundaries() {
        for len in [
            0,
            10,
            READ_DATA_CHUNK_SIZE - 1,
            READ_DATA_CHUNK_SIZE,
            READ_DATA_CHUNK_SIZE * 3,
            READ_DATA_CHUNK_SIZE * 2 + 513,
        ] {
            let data = pattern(len);
            let out = read_data(&mut Cursor::new(data.clone())).unwrap();
            assert_eq!(out.len(), len);
            assert_eq!(out, data);
        }
    }

    #[test]
    fn read_data_concatenates_trickled_reads() {
        let data = pattern(READ_DATA_CHUNK_SIZE + 100);
        let mut reader = Trickle {
            data: data.clone(),
            pos: 0,
            step: 1000,
        };
        assert_eq!(read_data(&mut reader).unwrap(), data);
    }
}
