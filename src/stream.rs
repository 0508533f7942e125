//! Chunked stream driver feeding byte handlers.
//!
//! Signing and verification both accumulate a hash over the message bytes.
//! [`process`] reads the message in fixed-size chunks and hands each chunk to
//! a caller-supplied handler, so neither path ever holds the whole message in
//! memory. The handler must not retain the slice past the call; the buffer is
//! reused for the next read.

use std::io::Read;

use crate::error::SigningError;

/// Default read chunk size in bytes.
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024;

/// Drive `reader` to end-of-stream, invoking `handler` once per chunk.
///
/// Returns the total number of bytes fed through the handler. A handler
/// failure aborts the remaining reads and is returned as-is.
pub fn process<R, F>(reader: R, handler: F) -> Result<u64, SigningError>
where
    R: Read,
    F: FnMut(&[u8]) -> Result<(), SigningError>,
{
    process_with_chunk_size(reader, DEFAULT_CHUNK_SIZE, handler)
}

/// [`process`] with an explicit chunk size.
pub fn process_with_chunk_size<R, F>(
    mut reader: R,
    chunk_size: usize,
    mut handler: F,
) -> Result<u64, SigningError>
where
    R: Read,
    F: FnMut(&[u8]) -> Result<(), SigningError>,
{
    debug_assert!(chunk_size > 0);
    let mut buffer = vec![0u8; chunk_size];
    let mut total: u64 = 0;
    loop {
        let read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(SigningError::Io(e)),
        };
        handler(&buffer[..read])?;
        total += read as u64;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::io::Read;
    use std::io::Write;

    use super::*;

    #[test]
    fn feeds_all_bytes_in_order() {
        let data: Vec<u8> = (0u8..=255).cycle().take(20_000).collect();
        let mut seen = Vec::new();
        let total = process(Cursor::new(&data), |chunk| {
            seen.extend_from_slice(chunk);
            Ok(())
        })
        .unwrap();
        assert_eq!(total, data.len() as u64);
        assert_eq!(seen, data);
    }

    #[test]
    fn respects_chunk_size() {
        let data = vec![7u8; 100];
        let mut chunks = Vec::new();
        process_with_chunk_size(Cursor::new(&data), 32, |chunk| {
            chunks.push(chunk.len());
            Ok(())
        })
        .unwrap();
        assert_eq!(chunks, vec![32, 32, 32, 4]);
    }

    #[test]
    fn empty_stream_feeds_nothing() {
        let mut calls = 0;
        let total = process(Cursor::new(Vec::new()), |_| {
            calls += 1;
            Ok(())
        })
        .unwrap();
        assert_eq!(total, 0);
        assert_eq!(calls, 0);
    }

    #[test]
    fn handler_failure_aborts_remaining_reads() {
        let data = vec![0u8; 64 * 1024];
        let mut calls = 0;
        let err = process(Cursor::new(&data), |_| {
            calls += 1;
            Err(SigningError::NoSignaturesFound)
        })
        .unwrap_err();
        assert!(matches!(err, SigningError::NoSignaturesFound));
        assert_eq!(calls, 1, "no further chunks after a handler failure");
    }

    #[test]
    fn file_backed_stream() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("message.bin");
        std::fs::File::create(&path).unwrap().write_all(b"on disk").unwrap();

        let mut seen = Vec::new();
        let file = std::fs::File::open(&path).unwrap();
        process(file.take(u64::MAX), |chunk| {
            seen.extend_from_slice(chunk);
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, b"on disk");
    }
}
