//! Pipelined file digests.
//!
//! Large files are hashed by two threads: one performs blocking reads into a
//! small fixed ring of buffers, the other feeds filled buffers into the
//! [`Digest`]. The reader blocks when no buffer is free and the hasher blocks
//! when none is filled, so I/O and hashing overlap while memory stays bounded
//! by `buffer_size * buffer_count` regardless of file size.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::thread;

use parking_lot::{Condvar, Mutex};

use crate::hash::{ContentHash, Digest};

/// Default size of one pipeline buffer (1 MiB).
pub const DEFAULT_BUFFER_SIZE: usize = 1 << 20;

/// Default number of buffers rotating through the pipeline.
pub const DEFAULT_BUFFER_COUNT: usize = 4;

/// Tuning for the two-stage digest pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Bytes per read buffer. Files no larger than this are hashed inline.
    pub buffer_size: usize,
    /// Number of rotating buffers shared by reader and hasher.
    pub buffer_count: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            buffer_count: DEFAULT_BUFFER_COUNT,
        }
    }
}

/// Computes the content digest of a file with the default pipeline options.
pub fn digest_file(path: &Path) -> io::Result<ContentHash> {
    digest_file_with(path, PipelineOptions::default())
}

/// Computes the content digest of a file.
///
/// Files that fit in one buffer are read and hashed on the calling thread;
/// anything larger goes through [`digest_reader`].
pub fn digest_file_with(path: &Path, options: PipelineOptions) -> io::Result<ContentHash> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    if len <= options.buffer_size as u64 {
        let mut content = Vec::with_capacity(len as usize);
        file.read_to_end(&mut content)?;
        return Ok(ContentHash::from_bytes(&content));
    }
    digest_reader(file, options)
}

/// Digests everything `reader` yields using the reader/hasher pipeline.
///
/// The reader runs on a scoped helper thread; hashing happens on the calling
/// thread. A read error stops the pipeline and is returned after the hasher
/// has drained the buffers already filled.
pub fn digest_reader<R: Read + Send>(
    reader: R,
    options: PipelineOptions,
) -> io::Result<ContentHash> {
    let buffer_size = options.buffer_size.max(1);
    let ring = Ring::new(buffer_size, options.buffer_count.max(1));

    thread::scope(|scope| {
        let reader_thread = scope.spawn(|| fill_ring(reader, &ring));

        let mut digest = Digest::new();
        while let Some((buffer, len)) = ring.take_filled() {
            digest.update(&buffer[..len]);
            ring.release(buffer);
        }

        match reader_thread.join() {
            Ok(result) => result.map(|()| digest.finish()),
            Err(_) => Err(io::Error::other("digest reader thread panicked")),
        }
    })
}

/// Reader stage: fills free buffers until end of input or an error.
fn fill_ring<R: Read>(mut reader: R, ring: &Ring) -> io::Result<()> {
    let result = loop {
        let mut buffer = ring.take_free();
        match read_full(&mut reader, &mut buffer) {
            Ok(0) => {
                ring.release(buffer);
                break Ok(());
            }
            Ok(len) => {
                let short = len < buffer.len();
                ring.push_filled(buffer, len);
                if short {
                    break Ok(());
                }
            }
            Err(e) => {
                ring.release(buffer);
                break Err(e);
            }
        }
    };
    ring.finish();
    result
}

/// Reads until `buffer` is full or the reader reports end of input.
fn read_full<R: Read>(reader: &mut R, buffer: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        match reader.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Bounded producer/consumer channel of rotating buffers.
struct Ring {
    state: Mutex<RingState>,
    free_available: Condvar,
    filled_available: Condvar,
}

struct RingState {
    free: Vec<Vec<u8>>,
    filled: VecDeque<(Vec<u8>, usize)>,
    finished: bool,
}

impl Ring {
    fn new(buffer_size: usize, buffer_count: usize) -> Self {
        Self {
            state: Mutex::new(RingState {
                free: (0..buffer_count).map(|_| vec![0u8; buffer_size]).collect(),
                filled: VecDeque::with_capacity(buffer_count),
                finished: false,
            }),
            free_available: Condvar::new(),
            filled_available: Condvar::new(),
        }
    }

    fn take_free(&self) -> Vec<u8> {
        let mut state = self.state.lock();
        loop {
            if let Some(buffer) = state.free.pop() {
                return buffer;
            }
            self.free_available.wait(&mut state);
        }
    }

    fn push_filled(&self, buffer: Vec<u8>, len: usize) {
        let mut state = self.state.lock();
        state.filled.push_back((buffer, len));
        self.filled_available.notify_one();
    }

    /// Returns `None` once the reader has finished and every filled buffer
    /// has been handed out.
    fn take_filled(&self) -> Option<(Vec<u8>, usize)> {
        let mut state = self.state.lock();
        loop {
            if let Some(entry) = state.filled.pop_front() {
                return Some(entry);
            }
            if state.finished {
                return None;
            }
            self.filled_available.wait(&mut state);
        }
    }

    fn release(&self, buffer: Vec<u8>) {
        let mut state = self.state.lock();
        state.free.push(buffer);
        self.free_available.notify_one();
    }

    fn finish(&self) {
        let mut state = self.state.lock();
        state.finished = true;
        self.filled_available.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 253) as u8).collect()
    }

    fn small_ring() -> PipelineOptions {
        PipelineOptions {
            buffer_size: 64,
            buffer_count: 2,
        }
    }

    #[test]
    fn pipeline_matches_one_shot() {
        let data = sample(10_000);
        let hash = digest_reader(&data[..], small_ring()).unwrap();
        assert_eq!(hash, ContentHash::from_bytes(&data));
    }

    #[test]
    fn exact_multiple_of_buffer_size() {
        let data = sample(64 * 8);
        let hash = digest_reader(&data[..], small_ring()).unwrap();
        assert_eq!(hash, ContentHash::from_bytes(&data));
    }

    #[test]
    fn empty_input() {
        let hash = digest_reader(&b""[..], small_ring()).unwrap();
        assert_eq!(hash, ContentHash::from_bytes(b""));
    }

    #[test]
    fn single_buffer_ring() {
        let data = sample(1_000);
        let options = PipelineOptions {
            buffer_size: 10,
            buffer_count: 1,
        };
        let hash = digest_reader(&data[..], options).unwrap();
        assert_eq!(hash, ContentHash::from_bytes(&data));
    }

    #[test]
    fn read_error_propagates() {
        struct Failing {
            served: usize,
        }
        impl Read for Failing {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                if self.served >= 200 {
                    return Err(io::Error::new(io::ErrorKind::Other, "disk on fire"));
                }
                let n = buf.len().min(50);
                buf[..n].fill(7);
                self.served += n;
                Ok(n)
            }
        }
        let err = digest_reader(Failing { served: 0 }, small_ring()).unwrap_err();
        assert!(err.to_string().contains("disk on fire"));
    }

    #[test]
    fn file_digest_small_and_large_agree() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("texture.tif");
        let data = sample(5_000);
        std::fs::write(&path, &data).unwrap();

        let inline = digest_file(&path).unwrap();
        let piped = digest_file_with(&path, small_ring()).unwrap();
        assert_eq!(inline, piped);
        assert_eq!(inline, ContentHash::from_bytes(&data));
    }

    #[test]
    fn missing_file_errors() {
        assert!(digest_file(Path::new("/nonexistent/kiln/file.tif")).is_err());
    }
}
