use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use super::{DataError, Feed};

type Answer<T> = Result<T, DataError>;

/// Runs a feed on a helper thread and waits for it at most `timeout`.
///
/// A fetch that outlives its timeout is not abandoned: its channel is kept
/// and the next call waits on it again instead of starting another thread,
/// so a hung source costs one thread, not one per tick.
pub struct BoundedFetcher<T> {
    feed: Arc<dyn Feed<T>>,
    timeout: Duration,
    in_flight: Option<Receiver<Answer<T>>>,
}

impl<T: Send + 'static> BoundedFetcher<T> {
    pub fn new(feed: Arc<dyn Feed<T>>, timeout: Duration) -> Self {
        Self {
            feed,
            timeout,
            in_flight: None,
        }
    }

    pub fn name(&self) -> &str {
        self.feed.name()
    }

    /// True while an earlier fetch is still running.
    pub fn is_pending(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn fetch(&mut self) -> Answer<T> {
        let receiver = match self.in_flight.take() {
            Some(receiver) => {
                log::debug!("{} fetch still running, waiting on it", self.feed.name());
                receiver
            }
            None => self.spawn()?,
        };

        match receiver.recv_timeout(self.timeout) {
            Ok(answer) => answer,
            Err(RecvTimeoutError::Timeout) => {
                self.in_flight = Some(receiver);
                Err(DataError::Timeout(self.timeout))
            }
            Err(RecvTimeoutError::Disconnected) => Err(DataError::WorkerLost),
        }
    }

    fn spawn(&self) -> Result<Receiver<Answer<T>>, DataError> {
        let (sender, receiver) = mpsc::channel();
        let feed = Arc::clone(&self.feed);
        thread::Builder::new()
            .name(format!("fetch-{}", feed.name()))
            .spawn(move || {
                // The receiver may be gone when the process is shutting down
                let _ = sender.send(feed.fetch());
            })
            .map_err(|_| DataError::WorkerLost)?;
        Ok(receiver)
    }
}
