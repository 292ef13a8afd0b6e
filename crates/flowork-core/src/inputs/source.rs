//! PathSource -- a lazy, stoppable stream of input paths.
//!
//! A producer task pushes paths into a bounded channel through a
//! [`SourceFeed`]; the pipeline pulls them one at a time with
//! [`PathSource::next`]. Stopping the source cancels a shared token, which the
//! feed observes on every send, so the producer always exits and the channel
//! always closes.

use std::future::Future;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use flowork_types::error::SourceError;
use flowork_types::files::StorePath;

/// Channel capacity used by [`PathSource::from_paths`].
pub const DEFAULT_SOURCE_CAPACITY: usize = 16;

pub type SourceItem = Result<StorePath, SourceError>;

/// Consumer half of an input path stream.
#[derive(Debug)]
pub struct PathSource {
    rx: mpsc::Receiver<SourceItem>,
    stop: CancellationToken,
}

/// Producer half of an input path stream.
#[derive(Debug, Clone)]
pub struct SourceFeed {
    tx: mpsc::Sender<SourceItem>,
    stop: CancellationToken,
}

/// Cloneable handle that stops a [`PathSource`] from anywhere.
#[derive(Debug, Clone)]
pub struct SourceStopper {
    stop: CancellationToken,
}

impl PathSource {
    /// Create a connected feed/source pair with a bounded buffer.
    pub fn channel(capacity: usize) -> (SourceFeed, PathSource) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let stop = CancellationToken::new();
        (
            SourceFeed {
                tx,
                stop: stop.clone(),
            },
            PathSource { rx, stop },
        )
    }

    /// Spawn `producer` on the current Tokio runtime, feeding a new source.
    pub fn spawn<F, Fut>(capacity: usize, producer: F) -> PathSource
    where
        F: FnOnce(SourceFeed) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (feed, source) = Self::channel(capacity);
        tokio::spawn(producer(feed));
        source
    }

    /// A source over a fixed list of paths, yielded in order.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn from_paths(paths: impl IntoIterator<Item = StorePath>) -> PathSource {
        let paths: Vec<StorePath> = paths.into_iter().collect();
        Self::spawn(DEFAULT_SOURCE_CAPACITY, |feed| async move {
            for path in paths {
                if !feed.send(Ok(path)).await {
                    break;
                }
            }
        })
    }

    /// The next path, or `None` once the producer is done or the source was
    /// stopped.
    pub async fn next(&mut self) -> Option<SourceItem> {
        if self.stop.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.stop.cancelled() => None,
            item = self.rx.recv() => item,
        }
    }

    /// Stop iteration. The producer exits at its next send and `next` returns
    /// `None` from now on.
    pub fn stop(&mut self) {
        self.stop.cancel();
        self.rx.close();
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }

    pub fn stopper(&self) -> SourceStopper {
        SourceStopper {
            stop: self.stop.clone(),
        }
    }
}

impl SourceFeed {
    /// Push one item. Returns `false` if the source was stopped or dropped,
    /// in which case the producer should return.
    pub async fn send(&self, item: SourceItem) -> bool {
        if self.stop.is_cancelled() {
            return false;
        }
        tokio::select! {
            biased;
            _ = self.stop.cancelled() => false,
            res = self.tx.send(item) => res.is_ok(),
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled() || self.tx.is_closed()
    }
}

impl SourceStopper {
    pub fn stop(&self) {
        self.stop.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use super::*;

    async fn collect(mut source: PathSource) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(item) = source.next().await {
            out.push(item.unwrap().to_string());
        }
        out
    }

    #[tokio::test]
    async fn from_paths_yields_in_order_then_ends() {
        let source = PathSource::from_paths(["/a", "/b", "/c"].map(StorePath::new));
        assert_eq!(collect(source).await, vec!["/a", "/b", "/c"]);
    }

    #[tokio::test]
    async fn errors_are_passed_through() {
        let mut source = PathSource::spawn(1, |feed| async move {
            feed.send(Err(SourceError::NonUtf8("bad".to_string()))).await;
            feed.send(Ok(StorePath::new("/ok"))).await;
        });
        assert!(source.next().await.unwrap().is_err());
        assert_eq!(source.next().await.unwrap().unwrap().as_str(), "/ok");
        assert!(source.next().await.is_none());
    }

    #[tokio::test]
    async fn stop_ends_iteration_and_releases_producer() {
        let exited = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&exited);
        let mut source = PathSource::spawn(1, |feed| async move {
            let mut i = 0;
            while feed.send(Ok(StorePath::new(format!("/{i}")))).await {
                i += 1;
            }
            flag.store(true, Ordering::SeqCst);
        });

        assert!(source.next().await.is_some());
        source.stop();
        assert!(source.next().await.is_none());

        tokio::time::timeout(Duration::from_secs(5), async {
            while !exited.load(Ordering::SeqCst) {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("producer did not exit after stop");
    }

    #[tokio::test]
    async fn stopper_wakes_pending_next() {
        let (feed, mut source) = PathSource::channel(1);
        let stopper = source.stopper();

        let waiter = tokio::spawn(async move { source.next().await.is_none() });
        tokio::time::sleep(Duration::from_millis(10)).await;
        stopper.stop();

        assert!(waiter.await.unwrap());
        assert!(feed.is_stopped());
        assert!(!feed.send(Ok(StorePath::new("/late"))).await);
    }
}
