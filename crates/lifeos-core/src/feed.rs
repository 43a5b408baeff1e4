//! Live snapshot feeds and their cancellation handles.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use crate::record::{Stored, UserId};

// ─── Cancellation ────────────────────────────────────────────────────────────

/// Stops a feed. Clones share the same flag; cancelling more than once, or
/// after the feed has ended, does nothing.
#[derive(Debug, Clone)]
pub struct CancelHandle {
  flag: Arc<watch::Sender<bool>>,
}

impl Default for CancelHandle {
  fn default() -> Self { Self::new() }
}

impl CancelHandle {
  pub fn new() -> Self {
    let (tx, _) = watch::channel(false);
    Self { flag: Arc::new(tx) }
  }

  pub fn cancel(&self) { self.flag.send_replace(true); }

  pub fn is_cancelled(&self) -> bool { *self.flag.borrow() }

  /// Resolves once [`CancelHandle::cancel`] has been called on any clone.
  pub async fn cancelled(&self) {
    let mut rx = self.flag.subscribe();
    // The sender lives in `self`, so `wait_for` cannot fail here.
    let _ = rx.wait_for(|cancelled| *cancelled).await;
  }
}

// ─── Feed ────────────────────────────────────────────────────────────────────

/// Receiving end of a live query. Dropping it cancels the producer.
#[derive(Debug)]
pub struct Feed<I> {
  rx:     mpsc::Receiver<I>,
  cancel: CancelHandle,
}

impl<I> Feed<I> {
  pub(crate) fn new(rx: mpsc::Receiver<I>, cancel: CancelHandle) -> Self {
    Self { rx, cancel }
  }

  /// The next item, or `None` once cancelled or once the producer has ended.
  ///
  /// Nothing is yielded after cancellation, even if items were already
  /// buffered.
  pub async fn next(&mut self) -> Option<I> {
    if self.cancel.is_cancelled() {
      return None;
    }
    tokio::select! {
      biased;
      () = self.cancel.cancelled() => None,
      item = self.rx.recv() => item.filter(|_| !self.cancel.is_cancelled()),
    }
  }

  pub fn cancel(&self) { self.cancel.cancel(); }

  /// A handle that can cancel this feed from elsewhere.
  pub fn canceller(&self) -> CancelHandle { self.cancel.clone() }
}

impl<I> Drop for Feed<I> {
  fn drop(&mut self) { self.cancel.cancel(); }
}

// ─── Payloads ────────────────────────────────────────────────────────────────

/// The full set of one owner's records at a point in time, ordered by
/// `(createdAt, id)`.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Snapshot<T> {
  #[serde(skip)]
  pub owner:   UserId,
  pub records: Vec<Stored<T>>,
}

impl<T> Snapshot<T> {
  pub fn len(&self) -> usize { self.records.len() }

  pub fn is_empty(&self) -> bool { self.records.is_empty() }

  pub fn iter(&self) -> impl Iterator<Item = &Stored<T>> { self.records.iter() }

  pub fn find(&self, id: uuid::Uuid) -> Option<&Stored<T>> {
    self.records.iter().find(|r| r.id == id)
  }
}

/// A live query over a collection for one owner.
pub type Subscription<T> = Feed<Snapshot<T>>;

/// What a consumer following the session sees.
#[derive(Debug, Clone, PartialEq)]
pub enum ScopedView<T> {
  SignedOut,
  /// Signing in, or signed in before the first snapshot for this identity
  /// has arrived.
  Loading,
  Ready(Snapshot<T>),
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use super::*;

  #[tokio::test]
  async fn cancel_is_idempotent() {
    let handle = CancelHandle::new();
    let other = handle.clone();
    handle.cancel();
    other.cancel();
    assert!(handle.is_cancelled());
    tokio::time::timeout(Duration::from_secs(1), other.cancelled())
      .await
      .unwrap();
  }

  #[tokio::test]
  async fn cancelled_feed_yields_nothing_more() {
    let (tx, rx) = mpsc::channel(4);
    let mut feed = Feed::new(rx, CancelHandle::new());
    tx.send(1).await.unwrap();
    assert_eq!(feed.next().await, Some(1));

    tx.send(2).await.unwrap();
    feed.canceller().cancel();
    assert_eq!(feed.next().await, None);
    assert_eq!(feed.next().await, None);
  }

  #[tokio::test]
  async fn ends_when_producer_goes_away() {
    let (tx, rx) = mpsc::channel::<u8>(1);
    let mut feed = Feed::new(rx, CancelHandle::new());
    drop(tx);
    assert_eq!(feed.next().await, None);
  }

  #[tokio::test]
  async fn dropping_the_feed_cancels() {
    let (_tx, rx) = mpsc::channel::<u8>(1);
    let handle = CancelHandle::new();
    drop(Feed::new(rx, handle.clone()));
    assert!(handle.is_cancelled());
  }
}
