//! Fault-injecting wrapper around [`LocalStore`] for tests.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use burrow_remote::{LocalStore, RemoteError, RemoteFile, RemoteFuture, RemoteSession, RemoteStat};

#[derive(Default)]
pub(crate) struct Faults {
    fail_writes: AtomicU32,
    max_write: AtomicUsize,
    opens: AtomicUsize,
    closes: AtomicUsize,
    chmods: AtomicUsize,
    /// Offsets at or past this one fail every write. 0 disables.
    poison_from: AtomicU64,
    /// Delay applied to writes, larger for lower offsets.
    reverse_delay: AtomicBool,
    /// `ready()` reports a closed session.
    fail_ready: AtomicBool,
    order: Mutex<Vec<u64>>,
}

impl Faults {
    pub(crate) fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub(crate) fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub(crate) fn chmods(&self) -> usize {
        self.chmods.load(Ordering::SeqCst)
    }

    /// Chunk offsets in the order their writes completed.
    pub(crate) fn completion_order(&self) -> Vec<u64> {
        self.order.lock().unwrap().clone()
    }

    fn take_failure(&self) -> bool {
        self.fail_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

pub(crate) struct FlakyStore {
    inner: LocalStore,
    faults: Arc<Faults>,
}

impl FlakyStore {
    pub(crate) fn new(root: PathBuf) -> Self {
        std::fs::create_dir_all(&root).unwrap();
        Self {
            inner: LocalStore::new(root),
            faults: Arc::default(),
        }
    }

    /// Holds `ready()` until [`FlakyStore::set_ready`].
    pub(crate) fn pending(mut self) -> Self {
        self.inner = LocalStore::pending(self.inner.root().to_path_buf());
        self
    }

    pub(crate) fn set_ready(&self) {
        self.inner.set_ready();
    }

    /// Makes `ready()` fail as if the connection was lost.
    pub(crate) fn fail_ready(self) -> Self {
        self.faults.fail_ready.store(true, Ordering::SeqCst);
        self
    }

    /// Fails the next `n` writes with a connection reset.
    pub(crate) fn fail_writes(self, n: u32) -> Self {
        self.faults.fail_writes.store(n, Ordering::SeqCst);
        self
    }

    /// Accepts at most `n` bytes per write call.
    pub(crate) fn max_write(self, n: usize) -> Self {
        self.faults.max_write.store(n, Ordering::SeqCst);
        self
    }

    /// Every write to a handle seeked at or past `offset` fails.
    pub(crate) fn poison_from(self, offset: u64) -> Self {
        self.faults.poison_from.store(offset, Ordering::SeqCst);
        self
    }

    /// Makes chunks with lower offsets finish last.
    pub(crate) fn reverse_delay(self) -> Self {
        self.faults.reverse_delay.store(true, Ordering::SeqCst);
        self
    }

    pub(crate) fn faults(&self) -> &Faults {
        &self.faults
    }

    pub(crate) fn local(&self, path: &str) -> PathBuf {
        self.inner.root().join(path.trim_start_matches('/'))
    }

    pub(crate) fn read(&self, path: &str) -> Vec<u8> {
        std::fs::read(self.local(path)).unwrap()
    }
}

impl RemoteSession for FlakyStore {
    fn ready(&self) -> RemoteFuture<'_, ()> {
        if self.faults.fail_ready.load(Ordering::SeqCst) {
            return Box::pin(async { Err(RemoteError::SessionClosed) });
        }
        self.inner.ready()
    }

    fn canonicalize<'a>(&'a self, path: &'a str) -> RemoteFuture<'a, String> {
        self.inner.canonicalize(path)
    }

    fn stat<'a>(&'a self, path: &'a str) -> RemoteFuture<'a, RemoteStat> {
        self.inner.stat(path)
    }

    fn open_write<'a>(&'a self, path: &'a str) -> RemoteFuture<'a, Box<dyn RemoteFile>> {
        Box::pin(async move {
            let inner = self.inner.open_write(path).await?;
            self.faults.opens.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FlakyFile {
                inner,
                path: path.to_string(),
                offset: 0,
                faults: Arc::clone(&self.faults),
            }) as Box<dyn RemoteFile>)
        })
    }

    fn mkdir<'a>(&'a self, path: &'a str) -> RemoteFuture<'a, ()> {
        self.inner.mkdir(path)
    }

    fn chmod<'a>(&'a self, path: &'a str, mode: u32) -> RemoteFuture<'a, ()> {
        self.faults.chmods.fetch_add(1, Ordering::SeqCst);
        self.inner.chmod(path, mode)
    }
}

struct FlakyFile {
    inner: Box<dyn RemoteFile>,
    path: String,
    offset: u64,
    faults: Arc<Faults>,
}

impl RemoteFile for FlakyFile {
    fn seek(&mut self, offset: u64) -> RemoteFuture<'_, ()> {
        self.offset = offset;
        self.inner.seek(offset)
    }

    fn write<'a>(&'a mut self, buf: &'a [u8]) -> RemoteFuture<'a, usize> {
        Box::pin(async move {
            let poison = self.faults.poison_from.load(Ordering::SeqCst);
            if (poison > 0 && self.offset >= poison) || self.faults.take_failure() {
                return Err(RemoteError::io(
                    self.path.clone(),
                    std::io::Error::from(std::io::ErrorKind::ConnectionReset),
                ));
            }
            if self.faults.reverse_delay.load(Ordering::SeqCst) {
                let delay = 40u64.saturating_sub(self.offset / 1024);
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            let max = self.faults.max_write.load(Ordering::SeqCst);
            let len = if max == 0 { buf.len() } else { buf.len().min(max) };
            let n = self.inner.write(&buf[..len]).await?;
            self.faults.order.lock().unwrap().push(self.offset);
            Ok(n)
        })
    }

    fn close(&mut self) -> RemoteFuture<'_, ()> {
        self.faults.closes.fetch_add(1, Ordering::SeqCst);
        self.inner.close()
    }
}
