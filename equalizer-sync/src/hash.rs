//! Streaming content digests.
//!
//! Files are read in fixed-size chunks so hashing uses constant memory no
//! matter how large the file is. [`HashingWriter`] hashes bytes on their way
//! to disk, which lets extraction compare content without a second read.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

use sha2::{Digest, Sha256};
use xxhash_rust::xxh3::Xxh3;

use equalizer_core::HashAlgorithm;

use crate::error::{io_err, SyncError};

/// Incremental hasher for any supported [`HashAlgorithm`].
pub enum StreamHasher {
    Xxh3(Box<Xxh3>),
    Sha256(Sha256),
}

impl StreamHasher {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Xxh3 => StreamHasher::Xxh3(Box::new(Xxh3::new())),
            HashAlgorithm::Sha256 => StreamHasher::Sha256(Sha256::new()),
        }
    }

    pub fn update(&mut self, bytes: &[u8]) {
        match self {
            StreamHasher::Xxh3(h) => h.update(bytes),
            StreamHasher::Sha256(h) => h.update(bytes),
        }
    }

    /// Lower-case hex digest.
    pub fn finish_hex(self) -> String {
        match self {
            StreamHasher::Xxh3(h) => format!("{:032x}", h.digest128()),
            StreamHasher::Sha256(h) => hex::encode(h.finalize()),
        }
    }
}

/// Hash everything `reader` yields, `chunk_size` bytes at a time.
pub fn hash_reader<R: Read>(
    mut reader: R,
    algorithm: HashAlgorithm,
    chunk_size: usize,
) -> io::Result<String> {
    let mut hasher = StreamHasher::new(algorithm);
    let mut buf = vec![0u8; chunk_size.max(1)];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finish_hex())
}

/// Hash the contents of the file at `path`.
pub fn hash_file(
    path: &Path,
    algorithm: HashAlgorithm,
    chunk_size: usize,
) -> Result<String, SyncError> {
    let file = File::open(path).map_err(|e| io_err(path, e))?;
    hash_reader(file, algorithm, chunk_size).map_err(|e| io_err(path, e))
}

/// Digest of an in-memory buffer.
pub fn hash_bytes(bytes: &[u8], algorithm: HashAlgorithm) -> String {
    let mut hasher = StreamHasher::new(algorithm);
    hasher.update(bytes);
    hasher.finish_hex()
}

/// A writer that hashes every byte it forwards.
pub struct HashingWriter<W> {
    inner: W,
    hasher: StreamHasher,
}

impl<W: Write> HashingWriter<W> {
    pub fn new(inner: W, algorithm: HashAlgorithm) -> Self {
        Self {
            inner,
            hasher: StreamHasher::new(algorithm),
        }
    }

    /// Flush and return the wrapped writer with the digest of what passed
    /// through.
    pub fn finish(mut self) -> io::Result<(W, String)> {
        self.inner.flush()?;
        Ok((self.inner, self.hasher.finish_hex()))
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::TempDir;

    #[test]
    fn digest_lengths_match_algorithm() {
        for algorithm in [HashAlgorithm::Xxh3, HashAlgorithm::Sha256] {
            let digest = hash_bytes(b"payload", algorithm);
            assert_eq!(digest.len(), algorithm.hex_len(), "{algorithm}");
            assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
        }
    }

    #[test]
    fn sha256_matches_known_vector() {
        assert_eq!(
            hash_bytes(b"abc", HashAlgorithm::Sha256),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn chunk_size_does_not_change_digest() {
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        for algorithm in [HashAlgorithm::Xxh3, HashAlgorithm::Sha256] {
            let whole = hash_bytes(&data, algorithm);
            let small = hash_reader(Cursor::new(&data), algorithm, 7).unwrap();
            let large = hash_reader(Cursor::new(&data), algorithm, 64 * 1024).unwrap();
            assert_eq!(small, whole);
            assert_eq!(large, whole);
        }
    }

    #[test]
    fn different_content_gives_different_digest() {
        assert_ne!(
            hash_bytes(b"version 1", HashAlgorithm::Xxh3),
            hash_bytes(b"version 2", HashAlgorithm::Xxh3)
        );
    }

    #[test]
    fn hash_file_reports_missing_path() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("gone.bin");
        match hash_file(&missing, HashAlgorithm::Xxh3, 4096) {
            Err(SyncError::Io { path, .. }) => assert_eq!(path, missing),
            other => panic!("expected Io error, got {other:?}"),
        }
    }

    #[test]
    fn hashing_writer_matches_reader_digest() {
        let mut writer = HashingWriter::new(Vec::new(), HashAlgorithm::Sha256);
        writer.write_all(b"hello ").unwrap();
        writer.write_all(b"world").unwrap();
        let (bytes, digest) = writer.finish().unwrap();
        assert_eq!(bytes, b"hello world");
        assert_eq!(digest, hash_bytes(b"hello world", HashAlgorithm::Sha256));
    }
}
