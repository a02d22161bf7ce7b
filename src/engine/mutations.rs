use std::time::Instant;

use chrono::NaiveTime;
use tokio::sync::{oneshot, OwnedRwLockWriteGuard};
use tracing::{debug, error, info, warn};

use crate::limits::*;
use crate::model::*;
use crate::observability::{
    outcome_label, ADD_DURATION_SECONDS, ADD_TOTAL, CONFLICTS_TOTAL, ENTRIES,
};

use super::conflict::{validate_room, validate_slot};
use super::resolve::{keys_of, normalize_room};
use super::store::Catalog;
use super::txn::PlacementTxn;
use super::{unplace_entry, Engine, EngineError, ValidationError, WalCommand};

fn check_name(name: &str) -> Result<(), ValidationError> {
    if name.len() > MAX_NAME_LEN {
        return Err(ValidationError::NameTooLong);
    }
    Ok(())
}

impl Engine {
    /// Place a weekly session for a class-subject pair.
    ///
    /// The teacher comes from the subject. Teacher, class and room (when
    /// given) are checked against existing entries on the same day; the
    /// first collision in that order is returned and nothing is stored.
    pub async fn add_schedule_entry(
        &self,
        class_id: ClassId,
        subject_id: SubjectId,
        day: DayOfWeek,
        start: NaiveTime,
        end: NaiveTime,
        room: Option<String>,
    ) -> Result<EntryId, EngineError> {
        let started = Instant::now();
        let result = self
            .try_add_schedule_entry(class_id, subject_id, day, start, end, room)
            .await;

        metrics::counter!(ADD_TOTAL, "outcome" => outcome_label(&result)).increment(1);
        metrics::histogram!(ADD_DURATION_SECONDS).record(started.elapsed().as_secs_f64());

        match &result {
            Ok(id) => {
                metrics::gauge!(ENTRIES).set(self.store.entry_count() as f64);
                debug!(id, class_id, subject_id, %day, %start, %end, "entry added");
            }
            Err(EngineError::Conflict(c)) => {
                metrics::counter!(CONFLICTS_TOTAL, "dimension" => c.dimension.label())
                    .increment(1);
                debug!(class_id, subject_id, %day, %start, %end, conflict = %c, "entry rejected");
            }
            Err(EngineError::Validation(v)) => {
                debug!(class_id, subject_id, %day, %start, %end, error = %v, "entry rejected");
            }
            Err(e @ EngineError::Storage(_)) => {
                error!(
                    op = "add_schedule_entry",
                    class_id,
                    subject_id,
                    %day,
                    %start,
                    %end,
                    error = %e,
                    "entry not persisted"
                );
            }
        }
        result
    }

    async fn try_add_schedule_entry(
        &self,
        class_id: ClassId,
        subject_id: SubjectId,
        day: DayOfWeek,
        start: NaiveTime,
        end: NaiveTime,
        room: Option<String>,
    ) -> Result<EntryId, EngineError> {
        let slot = validate_slot(day, start, end)?;
        validate_room(room.as_deref())?;
        let room = normalize_room(room);

        let txn = PlacementTxn::begin(self, class_id, subject_id, slot, room).await?;
        txn.check()?;
        txn.commit().await
    }

    pub async fn add_teacher(
        &self,
        id: TeacherId,
        first_name: String,
        last_name: String,
    ) -> Result<(), EngineError> {
        check_name(&first_name)?;
        check_name(&last_name)?;
        let catalog = self.catalog.clone().write_owned().await;
        if catalog.teacher(id).is_some() {
            return Err(ValidationError::AlreadyExists("teacher", id.to_string()).into());
        }

        let event = Event::TeacherAdded {
            id,
            first_name,
            last_name,
        };
        self.persist_catalog(catalog, event).await
    }

    pub async fn add_class(&self, id: ClassId, name: String) -> Result<(), EngineError> {
        check_name(&name)?;
        let catalog = self.catalog.clone().write_owned().await;
        if catalog.class(id).is_some() {
            return Err(ValidationError::AlreadyExists("class", id.to_string()).into());
        }

        let event = Event::ClassAdded { id, name };
        self.persist_catalog(catalog, event).await
    }

    /// Teacher binding is fixed at creation; placed entries derive their
    /// teacher lane from it.
    pub async fn add_subject(
        &self,
        id: SubjectId,
        name: String,
        teacher_id: Option<TeacherId>,
    ) -> Result<(), EngineError> {
        check_name(&name)?;
        let catalog = self.catalog.clone().write_owned().await;
        if catalog.subject(id).is_some() {
            return Err(ValidationError::AlreadyExists("subject", id.to_string()).into());
        }
        if let Some(tid) = teacher_id
            && catalog.teacher(tid).is_none()
        {
            return Err(ValidationError::UnknownTeacher(tid).into());
        }

        let event = Event::SubjectAdded {
            id,
            name,
            teacher_id,
        };
        self.persist_catalog(catalog, event).await
    }

    pub async fn link_class_subject(
        &self,
        class_id: ClassId,
        subject_id: SubjectId,
    ) -> Result<(), EngineError> {
        let catalog = self.catalog.clone().write_owned().await;
        if catalog.class(class_id).is_none() {
            return Err(ValidationError::UnknownClass(class_id).into());
        }
        if catalog.subject(subject_id).is_none() {
            return Err(ValidationError::UnknownSubject(subject_id).into());
        }
        if catalog.is_linked(class_id, subject_id) {
            return Err(ValidationError::AlreadyExists(
                "class-subject",
                format!("({class_id}, {subject_id})"),
            )
            .into());
        }

        let event = Event::ClassSubjectLinked {
            class_id,
            subject_id,
        };
        self.persist_catalog(catalog, event).await
    }

    /// Remove the association and every entry placed under it.
    /// Returns the removed entry ids, ascending.
    pub async fn unlink_class_subject(
        &self,
        class_id: ClassId,
        subject_id: SubjectId,
    ) -> Result<Vec<EntryId>, EngineError> {
        // Exclusive: no add is between lookup and commit while this runs.
        let mut catalog = self.catalog.clone().write_owned().await;
        if !catalog.is_linked(class_id, subject_id) {
            return Err(ValidationError::UnknownClassSubject {
                class_id,
                subject_id,
            }
            .into());
        }

        let event = Event::ClassSubjectUnlinked {
            class_id,
            subject_id,
        };
        let store = self.store.clone();
        let capacity = self.entry_capacity.clone();
        let cascade = {
            let event = event.clone();
            async move {
                catalog.apply(&event);
                let link = ClassSubject {
                    class_id,
                    subject_id,
                };
                let mut doomed = store.entries_where(|e| e.class_subject() == link);
                doomed.sort_by_key(|e| e.id);

                let mut removed = Vec::with_capacity(doomed.len());
                for entry in doomed {
                    let mut guards = Vec::with_capacity(3);
                    for key in keys_of(&catalog, &entry).lane_keys(entry.slot.day) {
                        guards.push(store.lane(&key).write_owned().await);
                    }
                    unplace_entry(&store, entry.id, &mut guards);
                    removed.push(entry.id);
                }
                capacity.add_permits(removed.len());
                removed
            }
        };

        let removed = match self.persist_then(event, cascade).await {
            Ok(removed) => removed,
            Err(e) => {
                error!(op = "unlink_class_subject", class_id, subject_id, error = %e, "unlink not persisted");
                return Err(e);
            }
        };

        metrics::gauge!(ENTRIES).set(self.store.entry_count() as f64);
        info!(class_id, subject_id, removed = removed.len(), "class-subject unlinked");
        Ok(removed)
    }

    /// Catalog changes hold the write guard from validation through apply.
    async fn persist_catalog(
        &self,
        mut catalog: OwnedRwLockWriteGuard<Catalog>,
        event: Event,
    ) -> Result<(), EngineError> {
        let apply = {
            let event = event.clone();
            async move { catalog.apply(&event) }
        };
        self.persist_then(event, apply).await
    }

    pub async fn list_class_subjects(&self) -> Vec<ClassSubject> {
        self.catalog.read().await.links()
    }

    /// Rewrite the WAL with only the events needed to recreate the current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        // Write guard: no add or catalog change is in flight.
        let catalog = self.catalog.write().await;

        let mut events = vec![Event::Checkpoint {
            next_entry_id: self.peek_next_entry_id(),
        }];
        events.extend(catalog.snapshot_events());

        let mut entries = self.store.entries_where(|_| true);
        entries.sort_by_key(|e| e.id);
        events.extend(entries.into_iter().map(|e| Event::EntryAdded {
            id: e.id,
            class_id: e.class_id,
            subject_id: e.subject_id,
            slot: e.slot,
            room: e.room,
        }));
        let count = events.len();

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::Storage("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::Storage("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::Storage(e.to_string()))?;

        drop(catalog);
        info!(events = count, "WAL compacted");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if let Err(e) = self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
        {
            warn!(error = %e, "WAL writer unavailable, append count unknown");
            return 0;
        }
        rx.await.unwrap_or_else(|e| {
            warn!(error = %e, "WAL writer dropped append count");
            0
        })
    }

    /// Compact once `threshold` appends have accumulated. Returns whether it ran.
    pub async fn maybe_compact(&self, threshold: u64) -> Result<bool, EngineError> {
        if threshold == 0 || self.wal_appends_since_compact().await < threshold {
            return Ok(false);
        }
        self.compact_wal().await?;
        Ok(true)
    }
}
