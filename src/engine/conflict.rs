use chrono::NaiveTime;

use crate::limits::*;
use crate::model::*;

use super::error::{Conflict, ValidationError};
use super::resolve::ResourceKeys;

/// Fixed reporting priority. When several dimensions collide the caller sees
/// only the first one in this order.
pub(crate) const CHECK_ORDER: [Dimension; 3] =
    [Dimension::Teacher, Dimension::Class, Dimension::Room];

pub(crate) fn validate_slot(
    day: DayOfWeek,
    start: NaiveTime,
    end: NaiveTime,
) -> Result<Slot, ValidationError> {
    if start >= end {
        return Err(ValidationError::EmptyInterval { start, end });
    }
    Ok(Slot::new(day, start, end))
}

pub(crate) fn validate_room(room: Option<&str>) -> Result<(), ValidationError> {
    match room {
        Some(r) if r.len() > MAX_ROOM_LEN => Err(ValidationError::RoomTooLong),
        _ => Ok(()),
    }
}

/// Check `slot` against the lanes of each present dimension. `lanes` must
/// contain every lane named by `keys` on `slot.day`; a lane that is absent
/// is treated as empty.
pub(crate) fn check_no_conflict(
    keys: &ResourceKeys,
    slot: &Slot,
    lanes: &[&LaneState],
) -> Result<(), Conflict> {
    for dimension in CHECK_ORDER {
        let Some(key) = keys.lane_key(dimension, slot.day) else {
            continue;
        };
        let Some(lane) = lanes.iter().find(|l| l.key == key) else {
            continue;
        };
        if let Some(hit) = lane.overlapping(slot).next() {
            return Err(Conflict {
                dimension,
                resource: key.resource(),
                existing: hit.entry_id,
                existing_slot: hit.slot,
            });
        }
    }
    Ok(())
}
