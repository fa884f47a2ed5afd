use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
};

/// A thread handle that can be signaled to stop.
///
/// Wraps a join handle with a cancellation flag that the thread
/// polls to determine when to exit.
pub struct CancelableJoinHandle<T> {
    handle: thread::JoinHandle<T>,
    running: Arc<AtomicBool>,
}

/// Spawns a named, cancelable thread that can be joined later.
///
/// The thread is passed an `Arc<AtomicBool>` that stays `true` until [`CancelableJoinHandle::join`]
/// is called. The flag is stored with `Release` and should be loaded with `Acquire`.
///
/// # Errors
///
/// Returns an error if the OS refuses to create the thread.
pub fn spawn_cancelable<T: Send + 'static>(
    name: &str,
    func: impl FnOnce(Arc<AtomicBool>) -> T + Send + 'static,
) -> io::Result<CancelableJoinHandle<T>> {
    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    let handle = thread::Builder::new()
        .name(name.to_string())
        .spawn(move || func(r))?;
    Ok(CancelableJoinHandle { handle, running })
}

impl<T> CancelableJoinHandle<T> {
    /// Checks if the thread has not been signaled to stop yet.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Signals the thread to stop and waits for it to finish.
    ///
    /// # Errors
    ///
    /// Returns error if thread panicked
    pub fn join(self) -> thread::Result<T> {
        self.running.store(false, Ordering::Release);
        self.handle.join()
    }
}
