use crate::model::*;

use super::store::Catalog;
use super::Engine;

/// Join an entry with the catalog. Missing names fall back to placeholders
/// rather than hiding the entry.
fn to_view(catalog: &Catalog, entry: ScheduleEntry) -> ScheduleView {
    let subject = catalog.subject(entry.subject_id);
    let teacher_id = subject.and_then(|s| s.teacher_id);
    let teacher_name = teacher_id
        .and_then(|t| catalog.teacher(t))
        .map_or_else(|| NO_TEACHER.to_string(), Teacher::display_name);

    ScheduleView {
        id: entry.id,
        class_id: entry.class_id,
        class_name: catalog
            .class(entry.class_id)
            .map_or_else(|| UNKNOWN_CLASS.to_string(), |c| c.name.clone()),
        subject_id: entry.subject_id,
        subject_name: subject.map_or_else(|| UNKNOWN_SUBJECT.to_string(), |s| s.name.clone()),
        teacher_id,
        teacher_name,
        day: entry.slot.day,
        start: entry.slot.start,
        end: entry.slot.end,
        room: entry.room,
    }
}

fn sorted_views(catalog: &Catalog, mut entries: Vec<ScheduleEntry>) -> Vec<ScheduleView> {
    entries.sort_by_key(|e| (e.slot.day, e.slot.start, e.id));
    entries.into_iter().map(|e| to_view(catalog, e)).collect()
}

impl Engine {
    /// Entries of one class, by day then start time. Unknown class yields nothing.
    pub async fn schedule_for_class(&self, class_id: ClassId) -> Vec<ScheduleView> {
        let catalog = self.catalog.read().await;
        let entries = self.store.entries_where(|e| e.class_id == class_id);
        sorted_views(&catalog, entries)
    }

    /// Entries whose subject is taught by `teacher_id`.
    pub async fn schedule_for_teacher(&self, teacher_id: TeacherId) -> Vec<ScheduleView> {
        let catalog = self.catalog.read().await;
        let entries = self
            .store
            .entries_where(|e| catalog.teacher_of(e.subject_id) == Some(teacher_id));
        sorted_views(&catalog, entries)
    }

    pub async fn get_entry(&self, id: EntryId) -> Option<ScheduleView> {
        let entry = self.store.get_entry(id)?;
        let catalog = self.catalog.read().await;
        Some(to_view(&catalog, entry))
    }

    pub fn entry_count(&self) -> usize {
        self.store.entry_count()
    }
}
