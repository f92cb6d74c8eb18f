use chrono::{DateTime, NaiveDate, Utc};

use crate::limits::MAX_STAY_NIGHTS;
use crate::model::*;

use super::EngineError;

/// Reservation state machine.
///
/// ```text
/// Pending ──► Confirmed ──► CheckedIn ──► CheckedOut
///    │            │
///    └────────────┴──► Cancelled
/// ```
///
/// CheckedOut and Cancelled are terminal.
pub fn can_transition(from: ReservationStatus, to: ReservationStatus) -> bool {
    use ReservationStatus::*;
    matches!(
        (from, to),
        (Pending, Confirmed)
            | (Pending, Cancelled)
            | (Confirmed, CheckedIn)
            | (Confirmed, Cancelled)
            | (CheckedIn, CheckedOut)
    )
}

/// Move `reservation` to `to`, recording the audit entry and bumping the
/// version. Leaves the reservation untouched on error.
pub fn transition(
    reservation: &mut Reservation,
    to: ReservationStatus,
    at: DateTime<Utc>,
) -> Result<(), EngineError> {
    let from = reservation.status;
    if !can_transition(from, to) {
        return Err(EngineError::InvalidTransition {
            id: reservation.id,
            from,
            to,
        });
    }
    reservation.status = to;
    reservation.version += 1;
    reservation.history.push(Transition {
        from: Some(from),
        to,
        at,
    });
    Ok(())
}

/// Push a held stay's check-out later. The status is unchanged; the audit
/// entry records it as a self-transition.
pub fn extend(
    reservation: &mut Reservation,
    new_check_out: NaiveDate,
    at: DateTime<Utc>,
) -> Result<(), EngineError> {
    let status = reservation.status;
    if !matches!(status, ReservationStatus::Confirmed | ReservationStatus::CheckedIn) {
        return Err(EngineError::InvalidTransition {
            id: reservation.id,
            from: status,
            to: status,
        });
    }
    let check_in = reservation.stay.check_in;
    let invalid = |reason| EngineError::InvalidRange {
        check_in,
        check_out: new_check_out,
        reason,
    };
    if new_check_out <= reservation.stay.check_out {
        return Err(invalid("new check-out must be after the current one"));
    }
    if (new_check_out - check_in).num_days() > MAX_STAY_NIGHTS {
        return Err(invalid("stay too long"));
    }
    reservation.stay = Stay::new(check_in, new_check_out);
    reservation.version += 1;
    reservation.history.push(Transition {
        from: Some(status),
        to: status,
        at,
    });
    Ok(())
}
