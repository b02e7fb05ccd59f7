use chrono::NaiveDate;

use crate::limits::*;
use crate::model::*;

use super::EngineError;

/// Business date used when the caller does not supply one.
pub fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

/// Date-range rules for a new booking, checked in order: both dates present
/// and ordered, check-in not in the past, stay not absurdly long.
pub(crate) fn validate_stay(
    check_in: Option<NaiveDate>,
    check_out: Option<NaiveDate>,
    today: NaiveDate,
) -> Result<Stay, EngineError> {
    let stay = Stay::checked(check_in, check_out).ok_or(EngineError::InvalidDateRange)?;
    if stay.check_in < today {
        return Err(EngineError::PastDateBooking);
    }
    if stay.nights() > MAX_STAY_NIGHTS {
        return Err(EngineError::LimitExceeded("stay too long"));
    }
    Ok(stay)
}

pub(crate) fn check_no_conflict(rs: &RoomState, stay: &Stay) -> Result<(), EngineError> {
    match rs.conflicting(stay) {
        Some(existing) => Err(EngineError::RoomUnavailable {
            room_id: rs.room.id,
            conflicting: existing.id,
        }),
        None => Ok(()),
    }
}

/// Non-blank, bounded text field. Returns the trimmed value.
pub(crate) fn required_text(field: &'static str, value: &str) -> Result<String, EngineError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(EngineError::InvalidField(field, "must not be blank"));
    }
    if trimmed.len() > MAX_TEXT_LEN {
        return Err(EngineError::LimitExceeded("text field too long"));
    }
    Ok(trimmed.to_string())
}

pub(crate) fn optional_text(value: Option<&str>) -> Result<Option<String>, EngineError> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) if v.len() > MAX_TEXT_LEN => Err(EngineError::LimitExceeded("text field too long")),
        Some(v) => Ok(Some(v.to_string())),
    }
}

pub(crate) fn validate_rate(rate: f64) -> Result<(), EngineError> {
    if !rate.is_finite() || rate <= 0.0 {
        return Err(EngineError::InvalidField("rate", "must be positive"));
    }
    Ok(())
}

pub(crate) fn validate_capacity(capacity: u32) -> Result<(), EngineError> {
    if !(MIN_ROOM_CAPACITY..=MAX_ROOM_CAPACITY).contains(&capacity) {
        return Err(EngineError::InvalidField("capacity", "must be between 1 and 5"));
    }
    Ok(())
}

pub(crate) fn validate_amount(amount: f64) -> Result<(), EngineError> {
    if !amount.is_finite() || amount < 0.0 {
        return Err(EngineError::InvalidField("amount", "must not be negative"));
    }
    Ok(())
}
