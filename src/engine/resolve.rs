use crate::model::*;

use super::error::ValidationError;
use super::store::Catalog;

/// The conflict dimensions of one placement. Teacher and room are optional;
/// a missing one is simply not checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceKeys {
    pub class_id: ClassId,
    pub subject_id: SubjectId,
    pub teacher_id: Option<TeacherId>,
    pub room: Option<String>,
}

impl ResourceKeys {
    pub fn lane_key(&self, dimension: Dimension, day: DayOfWeek) -> Option<LaneKey> {
        match dimension {
            Dimension::Teacher => self.teacher_id.map(|t| LaneKey::Teacher(t, day)),
            Dimension::Class => Some(LaneKey::Class(self.class_id, day)),
            Dimension::Room => self.room.clone().map(|r| LaneKey::Room(r, day)),
        }
    }

    /// Every lane this placement occupies on `day`, in lock order.
    pub fn lane_keys(&self, day: DayOfWeek) -> Vec<LaneKey> {
        let mut keys: Vec<LaneKey> = [Dimension::Teacher, Dimension::Class, Dimension::Room]
            .into_iter()
            .filter_map(|d| self.lane_key(d, day))
            .collect();
        keys.sort();
        keys
    }
}

/// Empty room labels mean "no room".
pub fn normalize_room(room: Option<String>) -> Option<String> {
    room.filter(|r| !r.is_empty())
}

/// Look up the association and derive the teacher through its subject.
pub fn resolve(
    catalog: &Catalog,
    class_id: ClassId,
    subject_id: SubjectId,
    room: Option<String>,
) -> Result<ResourceKeys, ValidationError> {
    if !catalog.is_linked(class_id, subject_id) {
        return Err(ValidationError::UnknownClassSubject {
            class_id,
            subject_id,
        });
    }
    Ok(ResourceKeys {
        class_id,
        subject_id,
        teacher_id: catalog.teacher_of(subject_id),
        room: normalize_room(room),
    })
}

/// Keys of an entry already in the store.
pub fn keys_of(catalog: &Catalog, entry: &ScheduleEntry) -> ResourceKeys {
    ResourceKeys {
        class_id: entry.class_id,
        subject_id: entry.subject_id,
        teacher_id: catalog.teacher_of(entry.subject_id),
        room: entry.room.clone(),
    }
}
