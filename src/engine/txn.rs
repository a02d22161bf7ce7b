use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, OwnedSemaphorePermit};

use crate::model::*;

use super::conflict::check_no_conflict;
use super::resolve::{resolve, ResourceKeys};
use super::store::Catalog;
use super::{place_entry, Engine, EngineError, ValidationError};

/// Unit of work for one placement.
///
/// `begin` reserves an entry slot, resolves the association and locks every
/// lane the placement would occupy; `commit` appends to the WAL and applies;
/// dropping the value without committing is the rollback and leaves the
/// store untouched.
pub(crate) struct PlacementTxn<'a> {
    engine: &'a Engine,
    // Held so the association cannot be unlinked before commit.
    catalog: OwnedRwLockReadGuard<Catalog>,
    capacity: OwnedSemaphorePermit,
    keys: ResourceKeys,
    slot: Slot,
    lanes: Vec<OwnedRwLockWriteGuard<LaneState>>,
}

impl<'a> PlacementTxn<'a> {
    pub(crate) async fn begin(
        engine: &'a Engine,
        class_id: ClassId,
        subject_id: SubjectId,
        slot: Slot,
        room: Option<String>,
    ) -> Result<Self, EngineError> {
        let capacity = engine
            .entry_capacity
            .clone()
            .try_acquire_owned()
            .map_err(|_| ValidationError::LimitExceeded("too many schedule entries"))?;

        let catalog = engine.catalog.clone().read_owned().await;
        let keys = resolve(&catalog, class_id, subject_id, room)?;

        // Sorted key order is the global lock order.
        let mut lanes = Vec::with_capacity(3);
        for key in keys.lane_keys(slot.day) {
            lanes.push(engine.store.lane(&key).write_owned().await);
        }

        Ok(Self {
            engine,
            catalog,
            capacity,
            keys,
            slot,
            lanes,
        })
    }

    /// Teacher, then class, then room. First hit wins.
    pub(crate) fn check(&self) -> Result<(), EngineError> {
        let views: Vec<&LaneState> = self.lanes.iter().map(|g| &**g).collect();
        check_no_conflict(&self.keys, &self.slot, &views)?;
        Ok(())
    }

    pub(crate) async fn commit(self) -> Result<EntryId, EngineError> {
        let Self {
            engine,
            catalog,
            capacity,
            keys,
            slot,
            mut lanes,
        } = self;

        let id = engine.allocate_entry_id();
        let entry = ScheduleEntry {
            id,
            class_id: keys.class_id,
            subject_id: keys.subject_id,
            slot,
            room: keys.room,
        };
        let event = Event::EntryAdded {
            id,
            class_id: entry.class_id,
            subject_id: entry.subject_id,
            slot: entry.slot,
            room: entry.room.clone(),
        };

        let store = engine.store.clone();
        engine
            .persist_then(event, async move {
                place_entry(&store, entry, &mut lanes);
                capacity.forget();
                drop(catalog);
                id
            })
            .await
    }
}
