use std::collections::{HashMap, VecDeque};
use std::fs;
use std::panic;
use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use thiserror::Error;

#[derive(Clone, Debug)]
pub struct LoadedBytes {
    pub bytes: Vec<u8>,
    pub duration: Duration,
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("failed to load {uri}: {message}")]
pub struct LoadFailure {
    pub uri: String,
    pub message: String,
}

pub type LoadResult = Result<LoadedBytes, LoadFailure>;
pub type LoadCallback = Box<dyn FnOnce(LoadResult) + Send + 'static>;

/// Fetches raw bytes for a URI and reports back exactly once, on whatever
/// thread the implementation chooses.
pub trait ByteLoader {
    fn load(&self, uri: &str, on_complete: LoadCallback);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoaderMode {
    Inline,
    Threaded,
}

/// Reads local files; `file://` URIs and bare paths are accepted.
pub struct FileByteLoader {
    mode: LoaderMode,
    queue: Option<Arc<RequestQueue>>,
    workers: Vec<JoinHandle<()>>,
}

struct Request {
    uri: String,
    on_complete: LoadCallback,
}

struct RequestQueue {
    state: Mutex<QueueState>,
    wake: Condvar,
}

struct QueueState {
    entries: VecDeque<Request>,
    shutdown: bool,
}

impl FileByteLoader {
    /// Completes every request synchronously inside `load`.
    pub fn inline() -> Self {
        Self {
            mode: LoaderMode::Inline,
            queue: None,
            workers: Vec::new(),
        }
    }

    /// Serves requests from `workers` background threads.
    pub fn threaded(workers: usize) -> Result<Self, std::io::Error> {
        let queue = Arc::new(RequestQueue {
            state: Mutex::new(QueueState {
                entries: VecDeque::new(),
                shutdown: false,
            }),
            wake: Condvar::new(),
        });
        let mut handles = Vec::new();
        for index in 0..workers.max(1) {
            let queue = Arc::clone(&queue);
            let handle = thread::Builder::new()
                .name(format!("manifest-loader-{}", index))
                .spawn(move || worker_loop(&queue))?;
            handles.push(handle);
        }
        Ok(Self {
            mode: LoaderMode::Threaded,
            queue: Some(queue),
            workers: handles,
        })
    }

    pub fn mode(&self) -> LoaderMode {
        self.mode
    }
}

impl ByteLoader for FileByteLoader {
    fn load(&self, uri: &str, on_complete: LoadCallback) {
        let request = Request {
            uri: uri.to_string(),
            on_complete,
        };
        match &self.queue {
            Some(queue) => {
                let mut guard = lock_unpoisoned(&queue.state);
                if guard.shutdown {
                    drop(guard);
                    let uri = request.uri.clone();
                    (request.on_complete)(Err(LoadFailure {
                        uri,
                        message: "loader is shutting down".to_string(),
                    }));
                    return;
                }
                guard.entries.push_back(request);
                queue.wake.notify_one();
            }
            None => serve(request),
        }
    }
}

impl Drop for FileByteLoader {
    fn drop(&mut self) {
        if let Some(queue) = &self.queue {
            let mut guard = lock_unpoisoned(&queue.state);
            guard.shutdown = true;
            queue.wake.notify_all();
        }
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

fn worker_loop(queue: &RequestQueue) {
    loop {
        let request = {
            let mut guard = lock_unpoisoned(&queue.state);
            loop {
                if let Some(request) = guard.entries.pop_front() {
                    break request;
                }
                if guard.shutdown {
                    return;
                }
                guard = match queue.wake.wait(guard) {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
            }
        };
        serve(request);
    }
}

fn serve(request: Request) {
    let Request { uri, on_complete } = request;
    let result = panic::catch_unwind(panic::AssertUnwindSafe(|| {
        let started = Instant::now();
        let path = uri_to_path(&uri);
        let outcome = fs::read(&path)
            .map(|bytes| LoadedBytes {
                bytes,
                duration: started.elapsed(),
            })
            .map_err(|err| LoadFailure {
                uri: uri.clone(),
                message: err.to_string(),
            });
        on_complete(outcome);
    }));
    if result.is_err() {
        tracing::error!(uri = %uri, "manifest load callback panicked");
    }
}

fn uri_to_path(uri: &str) -> PathBuf {
    PathBuf::from(uri.strip_prefix("file://").unwrap_or(uri))
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Serves bytes registered up front, inline. Unknown URIs fail.
#[derive(Debug, Default)]
pub struct MemoryByteLoader {
    files: HashMap<String, Vec<u8>>,
}

impl MemoryByteLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, uri: impl Into<String>, bytes: Vec<u8>) {
        self.files.insert(uri.into(), bytes);
    }
}

impl ByteLoader for MemoryByteLoader {
    fn load(&self, uri: &str, on_complete: LoadCallback) {
        let result = match self.files.get(uri) {
            Some(bytes) => Ok(LoadedBytes {
                bytes: bytes.clone(),
                duration: Duration::ZERO,
            }),
            None => Err(LoadFailure {
                uri: uri.to_string(),
                message: "not found".to_string(),
            }),
        };
        on_complete(result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn inline_loader_completes_before_returning() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("list.dat");
        fs::write(&path, b"bytes").unwrap();

        let loader = FileByteLoader::inline();
        let (tx, rx) = mpsc::channel();
        loader.load(
            &format!("file://{}", path.display()),
            Box::new(move |result| {
                let _ = tx.send(result);
            }),
        );
        let loaded = rx.try_recv().unwrap().unwrap();
        assert_eq!(loaded.bytes, b"bytes");
    }

    #[test]
    fn threaded_loader_reports_failures() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.dat");
        let loader = FileByteLoader::threaded(2).unwrap();
        assert_eq!(loader.mode(), LoaderMode::Threaded);
        let (tx, rx) = mpsc::channel();
        loader.load(
            missing.to_str().unwrap(),
            Box::new(move |result| {
                let _ = tx.send(result);
            }),
        );
        let failure = rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap_err();
        assert_eq!(failure.uri, missing.to_str().unwrap());
        assert!(!failure.message.is_empty());
    }

    #[test]
    fn memory_loader_serves_registered_bytes() {
        let mut loader = MemoryByteLoader::new();
        loader.insert("remote", vec![1, 2, 3]);
        let (tx, rx) = mpsc::channel();
        let tx_missing = tx.clone();
        loader.load("remote", Box::new(move |result| tx.send(result).unwrap()));
        loader.load(
            "other",
            Box::new(move |result| tx_missing.send(result).unwrap()),
        );
        assert_eq!(rx.try_recv().unwrap().unwrap().bytes, vec![1, 2, 3]);
        assert!(rx.try_recv().unwrap().is_err());
    }
}
