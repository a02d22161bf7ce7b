use std::fmt;

use chrono::{NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

pub type ClassId = u32;
pub type SubjectId = u32;
pub type TeacherId = u32;
/// Surrogate id of a schedule entry, assigned on insert.
pub type EntryId = u64;

/// Day tag of a weekly session. Numbered 0–6 starting on Sunday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum DayOfWeek {
    Sunday = 0,
    Monday = 1,
    Tuesday = 2,
    Wednesday = 3,
    Thursday = 4,
    Friday = 5,
    Saturday = 6,
}

impl DayOfWeek {
    pub const ALL: [DayOfWeek; 7] = [
        DayOfWeek::Sunday,
        DayOfWeek::Monday,
        DayOfWeek::Tuesday,
        DayOfWeek::Wednesday,
        DayOfWeek::Thursday,
        DayOfWeek::Friday,
        DayOfWeek::Saturday,
    ];

    pub fn from_index(n: u8) -> Option<Self> {
        Self::ALL.get(n as usize).copied()
    }

    pub fn index(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            DayOfWeek::Sunday => "Sunday",
            DayOfWeek::Monday => "Monday",
            DayOfWeek::Tuesday => "Tuesday",
            DayOfWeek::Wednesday => "Wednesday",
            DayOfWeek::Thursday => "Thursday",
            DayOfWeek::Friday => "Friday",
            DayOfWeek::Saturday => "Saturday",
        }
    }

    /// Accepts full English names and three-letter abbreviations, any case.
    pub fn parse_name(s: &str) -> Option<Self> {
        let lower = s.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|d| {
            let name = d.name().to_ascii_lowercase();
            lower == name || lower == name[..3]
        })
    }
}

impl From<Weekday> for DayOfWeek {
    fn from(w: Weekday) -> Self {
        Self::ALL[w.num_days_from_sunday() as usize]
    }
}

impl fmt::Display for DayOfWeek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Half-open time-of-day window `[start, end)` on one day of the week.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Slot {
    pub day: DayOfWeek,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl Slot {
    pub fn new(day: DayOfWeek, start: NaiveTime, end: NaiveTime) -> Self {
        debug_assert!(start < end, "Slot start must be before end");
        Self { day, start, end }
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }

    /// Same day and intersecting half-open ranges. Back-to-back slots do not overlap.
    pub fn overlaps(&self, other: &Slot) -> bool {
        self.day == other.day && self.start < other.end && other.start < self.end
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}-{}",
            self.day,
            self.start.format("%H:%M"),
            self.end.format("%H:%M")
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Teacher {
    pub id: TeacherId,
    pub first_name: String,
    pub last_name: String,
}

impl Teacher {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchoolClass {
    pub id: ClassId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub id: SubjectId,
    pub name: String,
    pub teacher_id: Option<TeacherId>,
}

/// A class is taught a subject. Composite identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClassSubject {
    pub class_id: ClassId,
    pub subject_id: SubjectId,
}

/// One weekly recurring session. The teacher is not stored; it is resolved
/// through the subject whenever it is needed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub id: EntryId,
    pub class_id: ClassId,
    pub subject_id: SubjectId,
    pub slot: Slot,
    pub room: Option<String>,
}

impl ScheduleEntry {
    pub fn class_subject(&self) -> ClassSubject {
        ClassSubject {
            class_id: self.class_id,
            subject_id: self.subject_id,
        }
    }
}

/// Axis along which two sessions must not overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dimension {
    Teacher,
    Class,
    Room,
}

impl Dimension {
    pub fn label(self) -> &'static str {
        match self {
            Dimension::Teacher => "teacher",
            Dimension::Class => "class",
            Dimension::Room => "room",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One resource on one day. Every placed entry sits in the lanes of each
/// dimension it occupies.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LaneKey {
    Teacher(TeacherId, DayOfWeek),
    Class(ClassId, DayOfWeek),
    Room(String, DayOfWeek),
}

impl LaneKey {
    pub fn dimension(&self) -> Dimension {
        match self {
            LaneKey::Teacher(..) => Dimension::Teacher,
            LaneKey::Class(..) => Dimension::Class,
            LaneKey::Room(..) => Dimension::Room,
        }
    }

    pub fn resource(&self) -> String {
        match self {
            LaneKey::Teacher(id, _) => id.to_string(),
            LaneKey::Class(id, _) => id.to_string(),
            LaneKey::Room(room, _) => room.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub entry_id: EntryId,
    pub slot: Slot,
}

#[derive(Debug, Clone)]
pub struct LaneState {
    pub key: LaneKey,
    /// Sorted by `slot.start`.
    pub placements: Vec<Placement>,
}

impl LaneState {
    pub fn new(key: LaneKey) -> Self {
        Self {
            key,
            placements: Vec::new(),
        }
    }

    /// Insert placement maintaining sort order by start time.
    pub fn insert(&mut self, placement: Placement) {
        let pos = self
            .placements
            .partition_point(|p| p.slot.start <= placement.slot.start);
        self.placements.insert(pos, placement);
    }

    pub fn remove(&mut self, entry_id: EntryId) -> Option<Placement> {
        let pos = self.placements.iter().position(|p| p.entry_id == entry_id)?;
        Some(self.placements.remove(pos))
    }

    /// Placements whose slot overlaps the query.
    /// Uses binary search to skip placements starting at or after `query.end`.
    pub fn overlapping(&self, query: &Slot) -> impl Iterator<Item = &Placement> {
        let right_bound = self.placements.partition_point(|p| p.slot.start < query.end);
        let query = *query;
        self.placements[..right_bound]
            .iter()
            .filter(move |p| p.slot.overlaps(&query))
    }
}

/// WAL record format. Flat, no nesting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    TeacherAdded {
        id: TeacherId,
        first_name: String,
        last_name: String,
    },
    ClassAdded {
        id: ClassId,
        name: String,
    },
    SubjectAdded {
        id: SubjectId,
        name: String,
        teacher_id: Option<TeacherId>,
    },
    ClassSubjectLinked {
        class_id: ClassId,
        subject_id: SubjectId,
    },
    /// Removes the association and every entry referencing it.
    ClassSubjectUnlinked {
        class_id: ClassId,
        subject_id: SubjectId,
    },
    EntryAdded {
        id: EntryId,
        class_id: ClassId,
        subject_id: SubjectId,
        slot: Slot,
        room: Option<String>,
    },
    /// Written at the head of a compacted log so ids of cascaded entries are never reused.
    Checkpoint {
        next_entry_id: EntryId,
    },
}

// ── Query result types ───────────────────────────────────────────

pub const NO_TEACHER: &str = "No Teacher";
pub const UNKNOWN_CLASS: &str = "Unknown Class";
pub const UNKNOWN_SUBJECT: &str = "Unknown Subject";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleView {
    pub id: EntryId,
    pub class_id: ClassId,
    pub class_name: String,
    pub subject_id: SubjectId,
    pub subject_name: String,
    pub teacher_id: Option<TeacherId>,
    pub teacher_name: String,
    pub day: DayOfWeek,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub room: Option<String>,
}
