use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::*;

use super::Engine;

// ── Availability ──────────────────────────────────────────────────

/// A room can take a new booking for `stay` if it is marked free and no
/// active booking overlaps the stay. Checked-out history never blocks.
fn is_bookable(rs: &RoomState, stay: &Stay) -> bool {
    rs.room.status == RoomStatus::Free && rs.conflicting(stay).is_none()
}

pub(super) fn sort_by_number(rooms: &mut [Room]) {
    rooms.sort_by(|a, b| a.number.cmp(&b.number).then(a.id.cmp(&b.id)));
}

impl Engine {
    /// Rooms bookable for `[start, end)`, ordered by room number. Missing or
    /// inverted dates yield an empty list rather than an error.
    pub async fn available_rooms(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Vec<Room> {
        let Some(stay) = Stay::checked(start, end) else {
            return Vec::new();
        };
        let mut free = Vec::new();
        for rs in self.store.room_states() {
            let guard = rs.read().await;
            if !guard.retired && is_bookable(&guard, &stay) {
                free.push(guard.room.clone());
            }
        }
        sort_by_number(&mut free);
        free
    }

    /// True iff an active booking for `room_id` overlaps `[start, end)`.
    /// An unknown room or an empty range has no overlap.
    pub async fn has_overlap(&self, room_id: &Ulid, start: NaiveDate, end: NaiveDate) -> bool {
        let Some(stay) = Stay::checked(Some(start), Some(end)) else {
            return false;
        };
        match self.store.get_room(room_id) {
            Some(rs) => rs.read().await.conflicting(&stay).is_some(),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn state(status: RoomStatus) -> RoomState {
        RoomState::new(Room {
            id: Ulid::new(),
            number: "201".into(),
            category: "Standard".into(),
            rate: 120.0,
            capacity: 2,
            status,
        })
    }

    fn add(rs: &mut RoomState, from: u32, to: u32, status: BookingStatus) {
        rs.insert_booking(Booking {
            id: Ulid::new(),
            room_id: rs.room.id,
            guest_id: Ulid::new(),
            stay: Stay::new(d(from), d(to)),
            status,
        });
    }

    #[test]
    fn occupied_room_is_not_bookable() {
        let rs = state(RoomStatus::Occupied);
        assert!(!is_bookable(&rs, &Stay::new(d(1), d(2))));
    }

    #[test]
    fn free_room_with_adjacent_bookings_is_bookable() {
        let mut rs = state(RoomStatus::Free);
        add(&mut rs, 1, 5, BookingStatus::Booked);
        add(&mut rs, 10, 12, BookingStatus::CheckedIn);
        assert!(is_bookable(&rs, &Stay::new(d(5), d(10))));
        assert!(!is_bookable(&rs, &Stay::new(d(4), d(6))));
        assert!(!is_bookable(&rs, &Stay::new(d(11), d(13))));
    }

    #[test]
    fn history_does_not_block() {
        let mut rs = state(RoomStatus::Free);
        add(&mut rs, 1, 5, BookingStatus::CheckedOut);
        assert!(is_bookable(&rs, &Stay::new(d(2), d(3))));
    }
}
