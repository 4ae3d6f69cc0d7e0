//! Worker thread creation

use std::io;
use std::thread::{self, JoinHandle};

/// Work handed to a freshly spawned thread.
pub type WorkerBody = Box<dyn FnOnce() + Send + 'static>;

/// Creates the dedicated engine thread.
pub trait ThreadSpawner: Send + Sync {
    fn spawn(
        &self,
        name: &str,
        stack_size: Option<usize>,
        body: WorkerBody,
    ) -> io::Result<JoinHandle<()>>;
}

/// Spawns named OS threads through `std::thread::Builder`.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsThreadSpawner;

impl ThreadSpawner for OsThreadSpawner {
    fn spawn(
        &self,
        name: &str,
        stack_size: Option<usize>,
        body: WorkerBody,
    ) -> io::Result<JoinHandle<()>> {
        let mut builder = thread::Builder::new().name(name.to_string());
        if let Some(size) = stack_size {
            builder = builder.stack_size(size);
        }
        builder.spawn(body)
    }
}
