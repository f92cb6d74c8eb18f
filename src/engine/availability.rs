use chrono::NaiveDate;

use crate::limits::*;
use crate::model::*;

use super::{Engine, EngineError};

// ── Availability Algorithm ────────────────────────────────────────

/// Free sub-ranges of `window` for one room: the window minus every
/// Confirmed/CheckedIn stay. Inactive rooms have no free nights.
pub fn free_stays(ledger: &RoomLedger, window: &Stay) -> Vec<Stay> {
    if !ledger.room.active {
        return Vec::new();
    }
    // Ledger order is by check-in, so the blocked list comes out sorted.
    let blocked: Vec<Stay> = ledger
        .overlapping(window)
        .filter(|r| r.status.is_blocking())
        .map(|r| r.stay)
        .collect();
    subtract_stays(&[*window], &merge_overlapping(&blocked))
}

/// Merge sorted overlapping/adjacent stays into disjoint stays.
pub fn merge_overlapping(sorted: &[Stay]) -> Vec<Stay> {
    let mut merged: Vec<Stay> = Vec::new();
    for &stay in sorted {
        if let Some(last) = merged.last_mut()
            && stay.check_in <= last.check_out
        {
            last.check_out = last.check_out.max(stay.check_out);
            continue;
        }
        merged.push(stay);
    }
    merged
}

/// `base` minus `to_remove`; both sorted and disjoint.
pub fn subtract_stays(base: &[Stay], to_remove: &[Stay]) -> Vec<Stay> {
    let mut result = Vec::new();
    let mut ri = 0;

    for &b in base {
        let mut current_start = b.check_in;
        let current_end = b.check_out;

        while ri < to_remove.len() && to_remove[ri].check_out <= current_start {
            ri += 1;
        }

        let mut j = ri;
        while j < to_remove.len() && to_remove[j].check_in < current_end {
            let r = &to_remove[j];
            if r.check_in > current_start {
                result.push(Stay::new(current_start, r.check_in));
            }
            current_start = current_start.max(r.check_out);
            j += 1;
        }

        if current_start < current_end {
            result.push(Stay::new(current_start, current_end));
        }
    }

    result
}

/// Validate a query range: ordered, and no wider than the query window.
pub(super) fn query_window(check_in: NaiveDate, check_out: NaiveDate) -> Result<Stay, EngineError> {
    if check_in >= check_out {
        return Err(EngineError::InvalidRange {
            check_in,
            check_out,
            reason: "check-in must be before check-out",
        });
    }
    if (check_out - check_in).num_days() > MAX_QUERY_WINDOW_DAYS {
        return Err(EngineError::LimitExceeded("query window too wide"));
    }
    Ok(Stay::new(check_in, check_out))
}

impl Engine {
    /// True iff the room is active and no Confirmed/CheckedIn reservation
    /// overlaps `[check_in, check_out)`.
    pub async fn is_available(
        &self,
        room_id: &RoomId,
        check_in: NaiveDate,
        check_out: NaiveDate,
    ) -> Result<bool, EngineError> {
        let stay = query_window(check_in, check_out)?;
        let ledger = self.ledger(room_id)?;
        let guard = ledger.read().await;
        Ok(guard.room.active && guard.first_conflict(&stay, None).is_none())
    }

    /// Ids of active rooms of `room_type` free for the whole range, ascending.
    pub async fn find_available_rooms(
        &self,
        room_type: RoomType,
        check_in: NaiveDate,
        check_out: NaiveDate,
    ) -> Result<Vec<RoomId>, EngineError> {
        let stay = query_window(check_in, check_out)?;
        let mut free = Vec::new();
        for (room_id, ledger) in self.all_ledgers() {
            let guard = ledger.read().await;
            if guard.room.room_type == room_type
                && guard.room.active
                && guard.first_conflict(&stay, None).is_none()
            {
                free.push(room_id);
            }
        }
        Ok(free)
    }

    /// Availability calendar: maximal free ranges of one room inside the window.
    pub async fn free_stays(
        &self,
        room_id: &RoomId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Stay>, EngineError> {
        let window = query_window(from, to)?;
        let ledger = self.ledger(room_id)?;
        let guard = ledger.read().await;
        Ok(free_stays(&guard, &window))
    }

    /// Active rooms, and how many of them are held for the night of `date`.
    pub async fn occupancy(&self, date: NaiveDate) -> Occupancy {
        let mut active_rooms = 0;
        let mut occupied_rooms = 0;
        for (_, ledger) in self.all_ledgers() {
            let guard = ledger.read().await;
            if !guard.room.active {
                continue;
            }
            active_rooms += 1;
            if guard
                .reservations
                .iter()
                .any(|r| r.status.is_blocking() && r.stay.covers_night(date))
            {
                occupied_rooms += 1;
            }
        }
        Occupancy {
            date,
            active_rooms,
            occupied_rooms,
        }
    }

    /// Nights × current base rate. Informational; billing owns real pricing.
    pub async fn quote(
        &self,
        room_id: &RoomId,
        check_in: NaiveDate,
        check_out: NaiveDate,
    ) -> Result<Money, EngineError> {
        let stay = query_window(check_in, check_out)?;
        let ledger = self.ledger(room_id)?;
        let guard = ledger.read().await;
        guard
            .room
            .base_rate
            .checked_mul(stay.nights() as Money)
            .ok_or(EngineError::LimitExceeded("quote overflow"))
    }
}
