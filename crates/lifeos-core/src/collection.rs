//! Owner-scoped typed collections over a [`DocumentStore`].
//!
//! A [`Collection`] is the only way records are read and written. It stamps
//! the owner, timestamps and schema version on every write, decodes documents
//! through [`schema::decode`] on every read, and turns the store's change
//! feed into live [`Subscription`]s that re-deliver the owner's full record
//! set after every relevant write.

use std::{marker::PhantomData, sync::Arc};

use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
  Error, Result,
  clock::MonotonicClock,
  feed::{CancelHandle, Feed, ScopedView, Snapshot, Subscription},
  record::{
    Checklist, ErasmusInternship, HasChecklist, JobApplication,
    MasterApplication, Record, ScholarshipProgram, Stored, Task, UsefulLink,
    UserId,
  },
  schema,
  session::SessionState,
  store::{Change, DocumentStore, Filter},
};

/// Snapshots buffered per subscriber before the producer waits.
const FEED_CAPACITY: usize = 16;

// ─── Db ──────────────────────────────────────────────────────────────────────

/// Entry point to every collection of one backing store. All collections
/// handed out by the same `Db` share one clock.
pub struct Db<S> {
  store: Arc<S>,
  clock: Arc<MonotonicClock>,
}

impl<S> Clone for Db<S> {
  fn clone(&self) -> Self {
    Self { store: self.store.clone(), clock: self.clock.clone() }
  }
}

impl<S: DocumentStore + 'static> Db<S> {
  pub fn new(store: Arc<S>) -> Self {
    Self { store, clock: Arc::new(MonotonicClock::new()) }
  }

  pub fn store(&self) -> &Arc<S> { &self.store }

  pub fn collection<T: Record>(&self) -> Collection<T, S> {
    Collection {
      store:   self.store.clone(),
      clock:   self.clock.clone(),
      _record: PhantomData,
    }
  }

  pub fn tasks(&self) -> Collection<Task, S> { self.collection() }

  pub fn jobs(&self) -> Collection<JobApplication, S> { self.collection() }

  pub fn masters(&self) -> Collection<MasterApplication, S> { self.collection() }

  pub fn internships(&self) -> Collection<ErasmusInternship, S> {
    self.collection()
  }

  pub fn links(&self) -> Collection<UsefulLink, S> { self.collection() }

  pub fn scholarships(&self) -> Collection<ScholarshipProgram, S> {
    self.collection()
  }
}

// ─── Collection ──────────────────────────────────────────────────────────────

/// Typed access to the collection backing record type `T`.
pub struct Collection<T, S> {
  pub(crate) store: Arc<S>,
  pub(crate) clock: Arc<MonotonicClock>,
  _record:          PhantomData<fn() -> T>,
}

impl<T, S> Clone for Collection<T, S> {
  fn clone(&self) -> Self {
    Self {
      store:   self.store.clone(),
      clock:   self.clock.clone(),
      _record: PhantomData,
    }
  }
}

impl<T: Record, S: DocumentStore + 'static> Collection<T, S> {
  pub fn name(&self) -> &'static str { T::COLLECTION }

  // ── Live queries ──────────────────────────────────────────────────────

  /// Live query over `owner`'s records.
  ///
  /// The first item is the current record set; after that a fresh full set
  /// arrives after every write that touches one of `owner`'s records in this
  /// collection. Must be called from within a tokio runtime.
  pub fn subscribe(&self, owner: UserId) -> Subscription<T> {
    let (tx, rx) = mpsc::channel(FEED_CAPACITY);
    let cancel = CancelHandle::new();
    // Subscribe before the first query so no write can fall in between.
    let changes = self.store.changes();
    tokio::spawn(pump::<T, S>(
      self.store.clone(),
      owner,
      changes,
      tx,
      cancel.clone(),
    ));
    Feed::new(rx, cancel)
  }

  /// Callback form of [`Collection::subscribe`]. The callback runs on a
  /// background task for every snapshot until the handle is cancelled.
  pub fn subscribe_with<F>(&self, owner: UserId, mut callback: F) -> CancelHandle
  where
    F: FnMut(Snapshot<T>) + Send + 'static,
  {
    let mut feed = self.subscribe(owner);
    let handle = feed.canceller();
    tokio::spawn(async move {
      while let Some(snapshot) = feed.next().await {
        callback(snapshot);
      }
    });
    handle
  }

  /// Follow whoever is signed in: every identity change tears down the
  /// current subscription and, for a new identity, opens a fresh one. A
  /// sign-in in progress shows as [`ScopedView::Loading`].
  pub fn follow(
    &self,
    session: watch::Receiver<SessionState>,
  ) -> Feed<ScopedView<T>> {
    let (tx, rx) = mpsc::channel(FEED_CAPACITY);
    let cancel = CancelHandle::new();
    tokio::spawn(follow_session(self.clone(), session, tx, cancel.clone()));
    Feed::new(rx, cancel)
  }

  // ── One-shot reads ────────────────────────────────────────────────────

  pub async fn get(&self, id: Uuid) -> Result<Option<Stored<T>>> {
    let doc = self
      .store
      .get(T::COLLECTION, id)
      .await
      .map_err(Error::store)?;
    doc
      .map(|doc| schema::decode::<T>(&doc).map(|d| d.record))
      .transpose()
  }

  /// `owner`'s records, in snapshot order.
  pub async fn list(&self, owner: &UserId) -> Result<Vec<Stored<T>>> {
    Ok(load::<T, S>(&self.store, owner).await?.records)
  }

  // ── Writes ────────────────────────────────────────────────────────────

  /// Persist a new record owned by `owner`.
  pub async fn add(&self, record: T, owner: &UserId) -> Result<Stored<T>> {
    record.validate()?;
    let fields = schema::encode_new(&record, owner, self.clock.now())?;
    let doc = self
      .store
      .insert(T::COLLECTION, fields)
      .await
      .map_err(Error::store)?;
    debug!(collection = T::COLLECTION, id = %doc.id, %owner, "record added");
    Ok(schema::decode::<T>(&doc)?.record)
  }

  /// Merge the fields `patch` sets into record `id` and re-stamp
  /// `updatedAt`. Ownership is not checked here.
  pub async fn update(&self, id: Uuid, patch: T::Patch) -> Result<Stored<T>> {
    T::validate_patch(&patch)?;
    let fields = schema::encode_patch::<T>(&patch, self.clock.now())?;
    let doc = self
      .store
      .merge(T::COLLECTION, id, fields)
      .await
      .map_err(Error::store)?
      .ok_or(Error::RecordNotFound { collection: T::COLLECTION, id })?;
    debug!(collection = T::COLLECTION, %id, "record updated");
    Ok(schema::decode::<T>(&doc)?.record)
  }

  /// Hard-delete record `id`. Deleting a record that does not exist is not
  /// an error.
  pub async fn delete(&self, id: Uuid) -> Result<()> {
    let existed = self
      .store
      .remove(T::COLLECTION, id)
      .await
      .map_err(Error::store)?;
    debug!(collection = T::COLLECTION, %id, existed, "record deleted");
    Ok(())
  }
}

// ─── Checklist operations ────────────────────────────────────────────────────

impl<T: HasChecklist, S: DocumentStore + 'static> Collection<T, S> {
  /// Apply `edit` to the checklist of record `id` and write the result back
  /// as a single update.
  pub async fn edit_checklist<R, F>(&self, id: Uuid, edit: F) -> Result<(Stored<T>, R)>
  where
    F: FnOnce(&mut Checklist) -> Result<R> + Send,
    R: Send,
  {
    let current = self
      .get(id)
      .await?
      .ok_or(Error::RecordNotFound { collection: T::COLLECTION, id })?;
    let mut checklist = current.record.checklist().clone();
    let out = edit(&mut checklist)?;
    let stored = self.update(id, T::checklist_patch(checklist)).await?;
    Ok((stored, out))
  }

  pub async fn toggle_item(&self, id: Uuid, item: Uuid) -> Result<Stored<T>> {
    let (stored, _) = self.edit_checklist(id, |c| c.toggle(item)).await?;
    Ok(stored)
  }

  pub async fn rename_item(
    &self,
    id: Uuid,
    item: Uuid,
    name: String,
  ) -> Result<Stored<T>> {
    let (stored, ()) = self.edit_checklist(id, |c| c.rename(item, name)).await?;
    Ok(stored)
  }

  pub async fn remove_item(&self, id: Uuid, item: Uuid) -> Result<Stored<T>> {
    let (stored, _) = self.edit_checklist(id, |c| c.remove(item)).await?;
    Ok(stored)
  }

  /// Append an item; returns the updated record and the new item's id.
  pub async fn add_item(
    &self,
    id: Uuid,
    name: String,
    is_required: bool,
  ) -> Result<(Stored<T>, Uuid)> {
    self.edit_checklist(id, |c| c.push(name, is_required)).await
  }
}

// ─── Background tasks ────────────────────────────────────────────────────────

/// Query and decode `owner`'s records. Documents that fail to decode are
/// logged and left out.
async fn load<T: Record, S: DocumentStore>(
  store: &S,
  owner: &UserId,
) -> Result<Snapshot<T>> {
  let filter = Filter::OwnedBy(owner.clone());
  let docs = store
    .query(T::COLLECTION, &filter)
    .await
    .map_err(Error::store)?;

  let mut records: Vec<Stored<T>> = docs
    .iter()
    .filter_map(|doc| match schema::decode::<T>(doc) {
      Ok(decoded) => Some(decoded.record),
      Err(e) => {
        warn!(
          collection = T::COLLECTION,
          id = %doc.id,
          error = %e,
          "skipping undecodable document"
        );
        None
      }
    })
    .collect();
  records.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));

  Ok(Snapshot { owner: owner.clone(), records })
}

/// Send `item` unless `cancel` fires first. Returns whether the receiver is
/// still there.
async fn deliver<I>(tx: &mpsc::Sender<I>, cancel: &CancelHandle, item: I) -> bool {
  tokio::select! {
    biased;
    () = cancel.cancelled() => false,
    sent = tx.send(item) => sent.is_ok(),
  }
}

enum Wake {
  Refresh,
  Stop,
}

/// Block until a change relevant to `owner` arrives. A lagged receiver may
/// have missed one, so it counts as relevant.
async fn wait_for_change<T: Record>(
  changes: &mut broadcast::Receiver<Change>,
  owner: &UserId,
  cancel: &CancelHandle,
) -> Wake {
  loop {
    let received = tokio::select! {
      biased;
      () = cancel.cancelled() => return Wake::Stop,
      received = changes.recv() => received,
    };
    match received {
      Ok(change) if change.affects(T::COLLECTION, owner) => return Wake::Refresh,
      Ok(_) => {}
      Err(broadcast::error::RecvError::Lagged(missed)) => {
        warn!(collection = T::COLLECTION, missed, "change feed lagged; re-querying");
        return Wake::Refresh;
      }
      Err(broadcast::error::RecvError::Closed) => return Wake::Stop,
    }
  }
}

async fn pump<T: Record, S: DocumentStore>(
  store: Arc<S>,
  owner: UserId,
  mut changes: broadcast::Receiver<Change>,
  tx: mpsc::Sender<Snapshot<T>>,
  cancel: CancelHandle,
) {
  debug!(collection = T::COLLECTION, %owner, "subscription opened");
  loop {
    match load::<T, S>(&store, &owner).await {
      Ok(snapshot) => {
        if !deliver(&tx, &cancel, snapshot).await {
          break;
        }
      }
      Err(e) => {
        warn!(collection = T::COLLECTION, %owner, error = %e, "snapshot query failed");
      }
    }
    match wait_for_change::<T>(&mut changes, &owner, &cancel).await {
      Wake::Refresh => {}
      Wake::Stop => break,
    }
  }
  debug!(collection = T::COLLECTION, %owner, "subscription closed");
}

async fn next_snapshot<T>(sub: &mut Option<Subscription<T>>) -> Option<Snapshot<T>> {
  match sub {
    Some(feed) => feed.next().await,
    None => std::future::pending().await,
  }
}

/// What a followed session currently scopes views to.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Scope {
  SignedOut,
  SigningIn,
  Owner(UserId),
}

impl Scope {
  fn of(state: &SessionState) -> Self {
    match state {
      SessionState::Anonymous => Self::SignedOut,
      SessionState::Authenticating => Self::SigningIn,
      SessionState::Authenticated(identity) => Self::Owner(identity.user_id.clone()),
    }
  }

  fn owner(&self) -> Option<&UserId> {
    match self {
      Self::Owner(id) => Some(id),
      _ => None,
    }
  }
}

async fn follow_session<T: Record, S: DocumentStore + 'static>(
  collection: Collection<T, S>,
  mut session: watch::Receiver<SessionState>,
  tx: mpsc::Sender<ScopedView<T>>,
  cancel: CancelHandle,
) {
  let mut scope: Option<Scope> = None;
  let mut sub: Option<Subscription<T>> = None;

  loop {
    let wanted = Scope::of(&session.borrow_and_update());
    if scope.as_ref() != Some(&wanted) {
      // Dropping the old feed cancels it.
      sub = None;
      let was_signing_in = scope == Some(Scope::SigningIn);
      let view = match &wanted {
        Scope::SignedOut => Some(ScopedView::SignedOut),
        Scope::SigningIn => Some(ScopedView::Loading),
        Scope::Owner(id) => {
          sub = Some(collection.subscribe(id.clone()));
          // Already showing `Loading` since the sign-in started.
          (!was_signing_in).then_some(ScopedView::Loading)
        }
      };
      scope = Some(wanted);
      if let Some(view) = view
        && !deliver(&tx, &cancel, view).await
      {
        break;
      }
    }
    let owner = scope.as_ref().and_then(Scope::owner);

    tokio::select! {
      biased;
      () = cancel.cancelled() => break,
      changed = session.changed() => {
        if changed.is_err() {
          break;
        }
      }
      snapshot = next_snapshot(&mut sub) => match snapshot {
        // Drop anything that raced with an identity change.
        Some(snapshot)
          if Some(&snapshot.owner) == owner
            && !session.has_changed().unwrap_or(true) =>
        {
          if !deliver(&tx, &cancel, ScopedView::Ready(snapshot)).await {
            break;
          }
        }
        Some(_) => {}
        None => sub = None,
      },
    }
  }
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use super::*;
  use crate::{
    memory::MemoryStore,
    record::{TaskPatch, master::DEFAULT_DOCUMENTS},
  };

  fn db() -> Db<MemoryStore> { Db::new(Arc::new(MemoryStore::new())) }

  async fn next<I>(feed: &mut Feed<I>) -> I {
    tokio::time::timeout(Duration::from_secs(2), feed.next())
      .await
      .expect("timed out waiting for feed")
      .expect("feed ended")
  }

  async fn quiet<I: std::fmt::Debug>(feed: &mut Feed<I>) {
    let got = tokio::time::timeout(Duration::from_millis(100), feed.next()).await;
    assert!(got.is_err(), "expected no delivery, got {got:?}");
  }

  #[tokio::test]
  async fn subscription_only_sees_owner_records() {
    let db = db();
    let tasks = db.tasks();
    let u1 = UserId::from("u1");
    let u2 = UserId::from("u2");

    let mut feed = tasks.subscribe(u1.clone());
    assert!(next(&mut feed).await.is_empty());

    tasks.add(Task::titled("Write spec"), &u1).await.unwrap();
    let snapshot = next(&mut feed).await;
    assert_eq!(snapshot.len(), 1);
    let stored = &snapshot.records[0];
    assert_eq!(stored.record.title, "Write spec");
    assert_eq!(stored.user_id, u1);
    assert_eq!(stored.created_at, stored.updated_at);

    let mut other = tasks.subscribe(u2.clone());
    assert!(next(&mut other).await.is_empty());
    tasks.add(Task::titled("Someone else's"), &u2).await.unwrap();
    assert_eq!(next(&mut other).await.len(), 1);
    quiet(&mut feed).await;
  }

  #[tokio::test]
  async fn created_at_is_non_decreasing_and_snapshots_ordered() {
    let db = db();
    let tasks = db.tasks();
    let owner = UserId::from("u1");
    for title in ["a", "b", "c"] {
      tasks.add(Task::titled(title), &owner).await.unwrap();
    }
    let list = tasks.list(&owner).await.unwrap();
    let titles: Vec<_> = list.iter().map(|t| t.record.title.as_str()).collect();
    assert_eq!(titles, ["a", "b", "c"]);
    assert!(list.windows(2).all(|w| w[0].created_at <= w[1].created_at));
  }

  #[tokio::test]
  async fn update_restamps_and_keeps_untouched_fields() {
    let db = db();
    let tasks = db.tasks();
    let owner = UserId::from("u1");
    let added = tasks
      .add(
        Task { description: Some("draft".into()), ..Task::titled("Write spec") },
        &owner,
      )
      .await
      .unwrap();

    let once = tasks.update(added.id, TaskPatch::completed(true)).await.unwrap();
    let twice = tasks.update(added.id, TaskPatch::completed(false)).await.unwrap();

    assert!(once.updated_at > added.updated_at);
    assert!(twice.updated_at > once.updated_at);
    assert_eq!(twice.created_at, added.created_at);
    assert_eq!(twice.user_id, owner);
    assert_eq!(twice.record.description.as_deref(), Some("draft"));
    assert_eq!(twice.record.title, "Write spec");
  }

  #[tokio::test]
  async fn update_of_missing_record_fails() {
    let err = db()
      .tasks()
      .update(Uuid::new_v4(), TaskPatch::completed(true))
      .await
      .unwrap_err();
    assert!(matches!(err, Error::RecordNotFound { collection: "tasks", .. }));
  }

  #[tokio::test]
  async fn delete_then_resubscribe_is_absent() {
    let db = db();
    let tasks = db.tasks();
    let owner = UserId::from("u1");
    let added = tasks.add(Task::titled("Gone soon"), &owner).await.unwrap();

    tasks.delete(added.id).await.unwrap();
    tasks.delete(added.id).await.unwrap();

    let mut feed = tasks.subscribe(owner);
    assert!(next(&mut feed).await.find(added.id).is_none());
  }

  #[tokio::test]
  async fn cancel_twice_stops_deliveries() {
    let db = db();
    let tasks = db.tasks();
    let owner = UserId::from("u1");
    let mut feed = tasks.subscribe(owner.clone());
    next(&mut feed).await;

    let handle = feed.canceller();
    handle.cancel();
    handle.cancel();
    feed.cancel();

    tasks.add(Task::titled("After cancel"), &owner).await.unwrap();
    assert!(feed.next().await.is_none());
  }

  #[tokio::test]
  async fn callback_receives_snapshots_until_cancelled() {
    let db = db();
    let tasks = db.tasks();
    let owner = UserId::from("u1");
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = tasks.subscribe_with(owner.clone(), move |s| {
      let _ = tx.send(s.len());
    });

    assert_eq!(rx.recv().await, Some(0));
    tasks.add(Task::titled("One"), &owner).await.unwrap();
    assert_eq!(rx.recv().await, Some(1));

    handle.cancel();
    // The background task drops the sender once it notices.
    assert_eq!(
      tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap(),
      None
    );
  }

  #[tokio::test]
  async fn toggling_one_item_flips_only_that_item() {
    let db = db();
    let masters = db.masters();
    let owner = UserId::from("u1");
    let app = masters
      .add(MasterApplication::new("ETH Zurich", "Data Science"), &owner)
      .await
      .unwrap();
    assert_eq!(app.record.documents.len(), DEFAULT_DOCUMENTS.len());
    let target = app.record.documents.items()[1].id;

    let toggled = masters.toggle_item(app.id, target).await.unwrap();
    let items = toggled.record.documents.items();
    assert!(!items[0].is_completed);
    assert!(items[1].is_completed);
    assert!(!items[2].is_completed);
    assert!(toggled.updated_at > app.updated_at);

    let err = masters.toggle_item(app.id, Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, Error::ChecklistItemNotFound(_)));
  }

  #[tokio::test]
  async fn checklist_add_rename_remove() {
    let db = db();
    let scholarships = db.scholarships();
    let owner = UserId::from("u1");
    let program = scholarships
      .add(ScholarshipProgram::named("DAAD"), &owner)
      .await
      .unwrap();

    let (with_item, item) = scholarships
      .add_item(program.id, "Portfolio".into(), false)
      .await
      .unwrap();
    assert_eq!(with_item.record.documents.len(), 7);

    let renamed = scholarships
      .rename_item(program.id, item, "Work samples".into())
      .await
      .unwrap();
    assert_eq!(renamed.record.documents.get(item).unwrap().name, "Work samples");

    let removed = scholarships.remove_item(program.id, item).await.unwrap();
    assert!(removed.record.documents.get(item).is_none());
  }

  #[tokio::test]
  async fn invalid_records_are_rejected_before_the_store() {
    let db = db();
    let err = db
      .links()
      .add(UsefulLink::new("", "https://example.com"), &UserId::from("u1"))
      .await
      .unwrap_err();
    assert!(matches!(err, Error::Invalid(_)));
    assert_eq!(db.store().write_count(), 0);
  }

  #[tokio::test]
  async fn follow_switches_identity() {
    use crate::session::{Identity, SessionState};

    let db = db();
    let tasks = db.tasks();
    let u1 = UserId::from("u1");
    let u2 = UserId::from("u2");
    tasks.add(Task::titled("mine"), &u1).await.unwrap();
    tasks.add(Task::titled("theirs"), &u2).await.unwrap();

    let (state, rx) = watch::channel(SessionState::Anonymous);
    let mut view = tasks.follow(rx);
    assert_eq!(next(&mut view).await, ScopedView::SignedOut);

    let identity = |id: &UserId| Identity {
      user_id:      id.clone(),
      email:        format!("{id}@example.com"),
      display_name: id.to_string(),
    };

    state.send_replace(SessionState::Authenticating);
    assert_eq!(next(&mut view).await, ScopedView::Loading);
    quiet(&mut view).await;

    state.send_replace(SessionState::Authenticated(identity(&u1)));
    match next(&mut view).await {
      ScopedView::Ready(s) => {
        assert_eq!(s.owner, u1);
        assert_eq!(s.records[0].record.title, "mine");
      }
      other => panic!("unexpected {other:?}"),
    }

    state.send_replace(SessionState::Anonymous);
    assert_eq!(next(&mut view).await, ScopedView::SignedOut);

    state.send_replace(SessionState::Authenticated(identity(&u2)));
    assert_eq!(next(&mut view).await, ScopedView::Loading);
    match next(&mut view).await {
      ScopedView::Ready(s) => assert_eq!(s.records[0].record.title, "theirs"),
      other => panic!("unexpected {other:?}"),
    }
  }

  #[tokio::test]
  async fn failed_sign_in_returns_to_signed_out() {
    use crate::session::SessionState;

    let db = db();
    let (state, rx) = watch::channel(SessionState::Anonymous);
    let mut view = db.tasks().follow(rx);
    assert_eq!(next(&mut view).await, ScopedView::SignedOut);

    state.send_replace(SessionState::Authenticating);
    assert_eq!(next(&mut view).await, ScopedView::Loading);
    state.send_replace(SessionState::Anonymous);
    assert_eq!(next(&mut view).await, ScopedView::SignedOut);
  }
}
