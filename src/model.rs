use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Half-open stay `[check_in, check_out)`. The check-out day is not a night.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Stay {
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
}

impl Stay {
    pub fn new(check_in: NaiveDate, check_out: NaiveDate) -> Self {
        debug_assert!(check_in < check_out, "Stay check_in must be before check_out");
        Self { check_in, check_out }
    }

    /// `None` unless both dates are present and `check_in < check_out`.
    pub fn checked(check_in: Option<NaiveDate>, check_out: Option<NaiveDate>) -> Option<Self> {
        match (check_in, check_out) {
            (Some(a), Some(b)) if a < b => Some(Self { check_in: a, check_out: b }),
            _ => None,
        }
    }

    pub fn nights(&self) -> i64 {
        (self.check_out - self.check_in).num_days()
    }

    pub fn overlaps(&self, other: &Stay) -> bool {
        self.check_in < other.check_out && other.check_in < self.check_out
    }
}

/// Nightly rate times nights. Integer rates stay exact.
pub fn stay_cost(stay: &Stay, rate: f64) -> f64 {
    stay.nights() as f64 * rate
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseStatusError(pub String);

impl fmt::Display for ParseStatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown status: {}", self.0)
    }
}

impl std::error::Error for ParseStatusError {}

/// Physical occupancy. Not authoritative for future availability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoomStatus {
    Free,
    Occupied,
}

impl RoomStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomStatus::Free => "FREE",
            RoomStatus::Occupied => "OCCUPIED",
        }
    }
}

impl fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoomStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "FREE" => Ok(RoomStatus::Free),
            "OCCUPIED" => Ok(RoomStatus::Occupied),
            _ => Err(ParseStatusError(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BookingStatus {
    Booked,
    CheckedIn,
    CheckedOut,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Booked => "BOOKED",
            BookingStatus::CheckedIn => "CHECKED_IN",
            BookingStatus::CheckedOut => "CHECKED_OUT",
        }
    }

    /// Active bookings hold their room; checked-out ones are history.
    pub fn is_active(&self) -> bool {
        !matches!(self, BookingStatus::CheckedOut)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BOOKED" => Ok(BookingStatus::Booked),
            "CHECKED_IN" => Ok(BookingStatus::CheckedIn),
            "CHECKED_OUT" => Ok(BookingStatus::CheckedOut),
            _ => Err(ParseStatusError(s.to_string())),
        }
    }
}

// ── Rows ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub id: Ulid,
    pub number: String,
    pub category: String,
    pub rate: f64,
    pub capacity: u32,
    pub status: RoomStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guest {
    pub id: Ulid,
    pub name: String,
    pub passport: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub room_id: Ulid,
    pub guest_id: Ulid,
    pub stay: Stay,
    pub status: BookingStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: Ulid,
    pub booking_id: Ulid,
    pub amount: f64,
    pub paid: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Ulid,
    pub username: String,
    /// Argon2id PHC string.
    pub password_hash: String,
    pub role: String,
}

// ── Per-room state ───────────────────────────────────────────────

/// A room and every booking ever made for it. One lock guards both, so the
/// overlap check and the booking insert happen in the same critical section.
#[derive(Debug, Clone)]
pub struct RoomState {
    pub room: Room,
    /// Sorted by `stay.check_in`. Checked-out bookings stay as history.
    pub bookings: Vec<Booking>,
    /// Set under the write lock on delete; writers that raced the delete see it.
    pub retired: bool,
}

impl RoomState {
    pub fn new(room: Room) -> Self {
        Self {
            room,
            bookings: Vec::new(),
            retired: false,
        }
    }

    /// Insert booking maintaining sort order by check-in.
    pub fn insert_booking(&mut self, booking: Booking) {
        let pos = self
            .bookings
            .partition_point(|b| b.stay.check_in <= booking.stay.check_in);
        self.bookings.insert(pos, booking);
    }

    pub fn booking(&self, id: &Ulid) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == *id)
    }

    pub fn booking_mut(&mut self, id: &Ulid) -> Option<&mut Booking> {
        self.bookings.iter_mut().find(|b| b.id == *id)
    }

    /// Bookings of any status whose stay overlaps `query`.
    pub fn overlapping(&self, query: &Stay) -> impl Iterator<Item = &Booking> {
        // Everything at index >= right_bound checks in on or after query.check_out.
        let right_bound = self
            .bookings
            .partition_point(|b| b.stay.check_in < query.check_out);
        self.bookings[..right_bound]
            .iter()
            .filter(move |b| b.stay.check_out > query.check_in)
    }

    /// First active booking that overlaps `query`, if any.
    pub fn conflicting(&self, query: &Stay) -> Option<&Booking> {
        self.overlapping(query).find(|b| b.status.is_active())
    }
}

/// The event types. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    UserCreated {
        user: User,
    },
    RoomSaved {
        room: Room,
    },
    RoomDeleted {
        id: Ulid,
    },
    RoomStatusSet {
        id: Ulid,
        status: RoomStatus,
    },
    GuestSaved {
        guest: Guest,
    },
    GuestDeleted {
        id: Ulid,
    },
    BookingCreated {
        booking: Booking,
    },
    BookingCheckedIn {
        id: Ulid,
        room_id: Ulid,
    },
    /// Check-out frees the room and books the payment in one record.
    BookingCheckedOut {
        id: Ulid,
        room_id: Ulid,
        payment: Payment,
    },
    PaymentRecorded {
        room_id: Ulid,
        payment: Payment,
    },
    PaymentMarkedPaid {
        booking_id: Ulid,
        room_id: Ulid,
    },
}

// ── Query result types ───────────────────────────────────────────

/// A booking joined with its room number and guest name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingView {
    pub id: Ulid,
    pub room_id: Ulid,
    pub room_number: String,
    pub guest_id: Ulid,
    pub guest_name: Option<String>,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub nights: i64,
    pub status: BookingStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn booking(check_in: NaiveDate, check_out: NaiveDate, status: BookingStatus) -> Booking {
        Booking {
            id: Ulid::new(),
            room_id: Ulid::new(),
            guest_id: Ulid::new(),
            stay: Stay::new(check_in, check_out),
            status,
        }
    }

    fn room_state() -> RoomState {
        RoomState::new(Room {
            id: Ulid::new(),
            number: "101".into(),
            category: "Economy".into(),
            rate: 80.0,
            capacity: 2,
            status: RoomStatus::Free,
        })
    }

    #[test]
    fn nights_counts_whole_days() {
        let stay = Stay::new(d(2024, 1, 1), d(2024, 1, 4));
        assert_eq!(stay.nights(), 3);
        assert_eq!(stay_cost(&stay, 100.0), 300.0);
    }

    #[test]
    fn nights_across_month_end() {
        let stay = Stay::new(d(2024, 2, 27), d(2024, 3, 2));
        assert_eq!(stay.nights(), 4); // leap year
    }

    #[test]
    fn touching_stays_do_not_overlap() {
        let a = Stay::new(d(2024, 1, 1), d(2024, 1, 5));
        let b = Stay::new(d(2024, 1, 5), d(2024, 1, 10));
        assert!(!a.overlaps(&b));
        assert!(!b.overlaps(&a));
    }

    #[test]
    fn one_shared_night_overlaps() {
        let a = Stay::new(d(2024, 1, 1), d(2024, 1, 5));
        let b = Stay::new(d(2024, 1, 4), d(2024, 1, 6));
        assert!(a.overlaps(&b));
    }

    #[test]
    fn checked_rejects_missing_and_inverted() {
        assert!(Stay::checked(None, Some(d(2024, 1, 2))).is_none());
        assert!(Stay::checked(Some(d(2024, 1, 2)), None).is_none());
        assert!(Stay::checked(Some(d(2024, 1, 2)), Some(d(2024, 1, 2))).is_none());
        assert!(Stay::checked(Some(d(2024, 1, 3)), Some(d(2024, 1, 2))).is_none());
        assert!(Stay::checked(Some(d(2024, 1, 2)), Some(d(2024, 1, 3))).is_some());
    }

    #[test]
    fn status_parse_is_case_insensitive() {
        assert_eq!("occupied".parse::<RoomStatus>(), Ok(RoomStatus::Occupied));
        assert_eq!(" checked_in ".parse::<BookingStatus>(), Ok(BookingStatus::CheckedIn));
        assert!("LOST".parse::<BookingStatus>().is_err());
        assert_eq!(BookingStatus::CheckedOut.to_string(), "CHECKED_OUT");
    }

    #[test]
    fn bookings_kept_sorted_by_check_in() {
        let mut rs = room_state();
        rs.insert_booking(booking(d(2024, 3, 1), d(2024, 3, 2), BookingStatus::Booked));
        rs.insert_booking(booking(d(2024, 1, 1), d(2024, 1, 2), BookingStatus::Booked));
        rs.insert_booking(booking(d(2024, 2, 1), d(2024, 2, 2), BookingStatus::Booked));
        let starts: Vec<_> = rs.bookings.iter().map(|b| b.stay.check_in).collect();
        assert_eq!(starts, vec![d(2024, 1, 1), d(2024, 2, 1), d(2024, 3, 1)]);
    }

    #[test]
    fn overlapping_skips_past_and_future() {
        let mut rs = room_state();
        rs.insert_booking(booking(d(2024, 1, 1), d(2024, 1, 3), BookingStatus::Booked));
        rs.insert_booking(booking(d(2024, 1, 9), d(2024, 1, 12), BookingStatus::Booked));
        rs.insert_booking(booking(d(2024, 2, 1), d(2024, 2, 3), BookingStatus::Booked));

        let query = Stay::new(d(2024, 1, 10), d(2024, 1, 20));
        let hits: Vec<_> = rs.overlapping(&query).collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].stay.check_in, d(2024, 1, 9));
    }

    #[test]
    fn long_booking_spanning_query_is_found() {
        let mut rs = room_state();
        rs.insert_booking(booking(d(2024, 1, 1), d(2024, 3, 1), BookingStatus::Booked));
        let query = Stay::new(d(2024, 2, 1), d(2024, 2, 2));
        assert_eq!(rs.overlapping(&query).count(), 1);
    }

    #[test]
    fn checked_out_booking_is_not_a_conflict() {
        let mut rs = room_state();
        rs.insert_booking(booking(d(2024, 1, 1), d(2024, 1, 5), BookingStatus::CheckedOut));
        let query = Stay::new(d(2024, 1, 2), d(2024, 1, 4));
        assert_eq!(rs.overlapping(&query).count(), 1);
        assert!(rs.conflicting(&query).is_none());

        rs.insert_booking(booking(d(2024, 1, 3), d(2024, 1, 6), BookingStatus::CheckedIn));
        assert!(rs.conflicting(&query).is_some());
    }

    #[test]
    fn event_survives_bincode() {
        let event = Event::BookingCreated {
            booking: booking(d(2024, 6, 1), d(2024, 6, 4), BookingStatus::Booked),
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}
