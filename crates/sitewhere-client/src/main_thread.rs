//! Explicit hand-off of work onto the host's thread.
//!
//! Worker threads and tasks never touch host state directly. They post
//! closures through a [`MainThread`] handle; the host drains its
//! [`MainQueue`] on its own thread and runs each closure with `&mut` access
//! to its state.

use tokio::sync::mpsc;
use tracing::trace;

/// Work posted to the host thread.
pub type MainTask<S> = Box<dyn FnOnce(&mut S) + Send>;

/// The host thread's queue has been dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("main thread queue closed")]
pub struct MainThreadClosed;

/// Cloneable, `Send` handle for posting work to the host thread.
pub struct MainThread<S> {
    tx: mpsc::UnboundedSender<MainTask<S>>,
}

impl<S> Clone for MainThread<S> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<S> std::fmt::Debug for MainThread<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MainThread")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

impl<S> MainThread<S> {
    /// Queues `task` to run on the host thread.
    pub fn run_on_main_thread<F>(&self, task: F) -> Result<(), MainThreadClosed>
    where
        F: FnOnce(&mut S) + Send + 'static,
    {
        self.tx.send(Box::new(task)).map_err(|_| MainThreadClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receiving side, owned by the host thread.
pub struct MainQueue<S> {
    rx: mpsc::UnboundedReceiver<MainTask<S>>,
}

impl<S> std::fmt::Debug for MainQueue<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MainQueue").finish_non_exhaustive()
    }
}

impl<S> MainQueue<S> {
    /// Creates a connected handle and queue.
    pub fn channel() -> (MainThread<S>, MainQueue<S>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (MainThread { tx }, MainQueue { rx })
    }

    /// Waits for the next task. Returns `None` once every handle is dropped.
    pub async fn recv(&mut self) -> Option<MainTask<S>> {
        self.rx.recv().await
    }

    /// Runs every task already queued, without waiting. Returns how many ran.
    pub fn run_pending(&mut self, state: &mut S) -> usize {
        let mut ran = 0;
        while let Ok(task) = self.rx.try_recv() {
            task(state);
            ran += 1;
        }
        if ran > 0 {
            trace!(tasks = ran, "ran main thread tasks");
        }
        ran
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tasks_run_in_order_on_owner() {
        let (main, mut queue) = MainQueue::<Vec<u32>>::channel();

        let worker = {
            let main = main.clone();
            std::thread::spawn(move || {
                for i in 0..3 {
                    main.run_on_main_thread(move |log| log.push(i)).unwrap();
                }
            })
        };
        worker.join().unwrap();

        let mut log = Vec::new();
        assert_eq!(queue.run_pending(&mut log), 3);
        assert_eq!(log, vec![0, 1, 2]);
        assert_eq!(queue.run_pending(&mut log), 0);
    }

    #[test]
    fn closed_queue_reported() {
        let (main, queue) = MainQueue::<()>::channel();
        drop(queue);
        assert!(main.is_closed());
        assert_eq!(main.run_on_main_thread(|_| {}), Err(MainThreadClosed));
    }

    #[tokio::test]
    async fn recv_waits_for_task() {
        let (main, mut queue) = MainQueue::<String>::channel();
        tokio::spawn(async move {
            main.run_on_main_thread(|s| s.push_str("hi")).unwrap();
        });

        let task = queue.recv().await.unwrap();
        let mut state = String::new();
        task(&mut state);
        assert_eq!(state, "hi");
        assert!(queue.recv().await.is_none());
    }
}
