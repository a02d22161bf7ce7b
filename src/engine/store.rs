use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::RwLock;

use crate::model::*;

use super::SharedLane;

/// Teachers, classes, subjects and the class–subject associations entries hang off.
#[derive(Debug, Default, Clone)]
pub struct Catalog {
    pub(crate) teachers: BTreeMap<TeacherId, Teacher>,
    pub(crate) classes: BTreeMap<ClassId, SchoolClass>,
    pub(crate) subjects: BTreeMap<SubjectId, Subject>,
    pub(crate) links: BTreeSet<ClassSubject>,
}

impl Catalog {
    pub fn teacher(&self, id: TeacherId) -> Option<&Teacher> {
        self.teachers.get(&id)
    }

    pub fn class(&self, id: ClassId) -> Option<&SchoolClass> {
        self.classes.get(&id)
    }

    pub fn subject(&self, id: SubjectId) -> Option<&Subject> {
        self.subjects.get(&id)
    }

    pub fn is_linked(&self, class_id: ClassId, subject_id: SubjectId) -> bool {
        self.links.contains(&ClassSubject {
            class_id,
            subject_id,
        })
    }

    /// Teacher bound to a subject right now, if any.
    pub fn teacher_of(&self, subject_id: SubjectId) -> Option<TeacherId> {
        self.subjects.get(&subject_id).and_then(|s| s.teacher_id)
    }

    pub fn links(&self) -> Vec<ClassSubject> {
        self.links.iter().copied().collect()
    }

    /// Apply a catalog event. Entry events and cascades are the store's business.
    pub(crate) fn apply(&mut self, event: &Event) {
        match event {
            Event::TeacherAdded {
                id,
                first_name,
                last_name,
            } => {
                self.teachers.insert(
                    *id,
                    Teacher {
                        id: *id,
                        first_name: first_name.clone(),
                        last_name: last_name.clone(),
                    },
                );
            }
            Event::ClassAdded { id, name } => {
                self.classes.insert(
                    *id,
                    SchoolClass {
                        id: *id,
                        name: name.clone(),
                    },
                );
            }
            Event::SubjectAdded {
                id,
                name,
                teacher_id,
            } => {
                self.subjects.insert(
                    *id,
                    Subject {
                        id: *id,
                        name: name.clone(),
                        teacher_id: *teacher_id,
                    },
                );
            }
            Event::ClassSubjectLinked {
                class_id,
                subject_id,
            } => {
                self.links.insert(ClassSubject {
                    class_id: *class_id,
                    subject_id: *subject_id,
                });
            }
            Event::ClassSubjectUnlinked {
                class_id,
                subject_id,
            } => {
                self.links.remove(&ClassSubject {
                    class_id: *class_id,
                    subject_id: *subject_id,
                });
            }
            Event::EntryAdded { .. } | Event::Checkpoint { .. } => {}
        }
    }

    /// Events that recreate this catalog, parents before children.
    pub(crate) fn snapshot_events(&self) -> Vec<Event> {
        let mut events = Vec::new();
        for t in self.teachers.values() {
            events.push(Event::TeacherAdded {
                id: t.id,
                first_name: t.first_name.clone(),
                last_name: t.last_name.clone(),
            });
        }
        for c in self.classes.values() {
            events.push(Event::ClassAdded {
                id: c.id,
                name: c.name.clone(),
            });
        }
        for s in self.subjects.values() {
            events.push(Event::SubjectAdded {
                id: s.id,
                name: s.name.clone(),
                teacher_id: s.teacher_id,
            });
        }
        for link in &self.links {
            events.push(Event::ClassSubjectLinked {
                class_id: link.class_id,
                subject_id: link.subject_id,
            });
        }
        events
    }
}

/// Entry collection plus the per-resource lanes used for conflict lookups.
pub struct InMemoryStore {
    entries: DashMap<EntryId, ScheduleEntry>,
    lanes: DashMap<LaneKey, SharedLane>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            lanes: DashMap::new(),
        }
    }

    // ── Entries ──────────────────────────────────────────────

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    pub fn get_entry(&self, id: EntryId) -> Option<ScheduleEntry> {
        self.entries.get(&id).map(|e| e.value().clone())
    }

    pub fn insert_entry(&self, entry: ScheduleEntry) {
        self.entries.insert(entry.id, entry);
    }

    pub fn remove_entry(&self, id: EntryId) -> Option<ScheduleEntry> {
        self.entries.remove(&id).map(|(_, e)| e)
    }

    /// Clone out every entry matching `pred`. No ordering.
    pub fn entries_where(&self, pred: impl Fn(&ScheduleEntry) -> bool) -> Vec<ScheduleEntry> {
        self.entries
            .iter()
            .filter(|e| pred(e.value()))
            .map(|e| e.value().clone())
            .collect()
    }

    // ── Lanes ────────────────────────────────────────────────

    /// Get the lane for `key`, creating an empty one on first use.
    pub fn lane(&self, key: &LaneKey) -> SharedLane {
        if let Some(lane) = self.lanes.get(key) {
            return lane.value().clone();
        }
        self.lanes
            .entry(key.clone())
            .or_insert_with(|| Arc::new(RwLock::new(LaneState::new(key.clone()))))
            .value()
            .clone()
    }

    pub fn lane_count(&self) -> usize {
        self.lanes.len()
    }
}
