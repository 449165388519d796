//! In-memory transcoder
//!
//! Each spawn opens a `tokio::io::duplex` pipe. The relay reads one end; the
//! test keeps the other and writes whatever "media" it wants delivered.
//! Once the relay drops its end, writes fail with `BrokenPipe`, which is how
//! tests observe that a transcoder was killed.

use std::collections::HashMap;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, DuplexStream, ReadBuf};
use watchdog_server::relay::{RelayError, TranscodeOutput, Transcoder};

/// URLs with this scheme fail to spawn
pub const FAIL_SCHEME: &str = "fail://";

/// URLs with this scheme spawn, emit [`BROKEN_PREFIX`], then fail to read
pub const BROKEN_SCHEME: &str = "broken://";

pub const BROKEN_PREFIX: &[u8] = b"moov";

/// Output that yields a prefix and then a read error
struct FailingReader {
    prefix: Option<Vec<u8>>,
}

impl AsyncRead for FailingReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.prefix.take() {
            Some(prefix) => {
                buf.put_slice(&prefix);
                Poll::Ready(Ok(()))
            }
            None => Poll::Ready(Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "connection reset by camera",
            ))),
        }
    }
}

const PIPE_CAPACITY: usize = 64 * 1024;

#[derive(Default)]
struct Feeds {
    by_url: HashMap<String, DuplexStream>,
}

#[derive(Clone, Default)]
pub struct FakeTranscoder {
    feeds: Arc<Mutex<Feeds>>,
    spawned: Arc<AtomicUsize>,
}

impl FakeTranscoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write end of the most recent pipe spawned for `url`
    pub fn take_feed(&self, url: &str) -> Option<DuplexStream> {
        self.feeds.lock().unwrap().by_url.remove(url)
    }

    pub fn spawn_count(&self) -> usize {
        self.spawned.load(Ordering::SeqCst)
    }
}

impl Transcoder for FakeTranscoder {
    fn spawn(&self, url: &str) -> Result<TranscodeOutput, RelayError> {
        if url.starts_with(FAIL_SCHEME) {
            return Err(RelayError::Spawn {
                url: url.to_string(),
                reason: "no such file or directory".to_string(),
            });
        }

        if url.starts_with(BROKEN_SCHEME) {
            self.spawned.fetch_add(1, Ordering::SeqCst);
            return Ok(TranscodeOutput::from_reader(FailingReader {
                prefix: Some(BROKEN_PREFIX.to_vec()),
            }));
        }

        let (feed, output) = tokio::io::duplex(PIPE_CAPACITY);
        self.feeds
            .lock()
            .unwrap()
            .by_url
            .insert(url.to_string(), feed);
        self.spawned.fetch_add(1, Ordering::SeqCst);

        Ok(TranscodeOutput::from_reader(output))
    }
}
