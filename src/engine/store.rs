use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::model::*;

pub type SharedRoomState = Arc<RwLock<RoomState>>;

/// In-memory tables behind the engine. Rooms carry their bookings and sit
/// behind per-room locks; guests, payments and users are plain rows.
pub struct Store {
    rooms: DashMap<Ulid, SharedRoomState>,
    /// Room number → room id. Claimed before the WAL write so two rooms can
    /// never commit the same number.
    room_numbers: DashMap<String, Ulid>,
    /// Booking id → room id.
    booking_rooms: DashMap<Ulid, Ulid>,
    guests: DashMap<Ulid, Guest>,
    /// Keyed by booking id: at most one payment per booking.
    payments: DashMap<Ulid, Payment>,
    /// Keyed by username.
    users: DashMap<String, User>,
}

impl Store {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
            room_numbers: DashMap::new(),
            booking_rooms: DashMap::new(),
            guests: DashMap::new(),
            payments: DashMap::new(),
            users: DashMap::new(),
        }
    }

    // ── Rooms ────────────────────────────────────────────────

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn get_room(&self, id: &Ulid) -> Option<SharedRoomState> {
        self.rooms.get(id).map(|e| e.value().clone())
    }

    pub fn room_states(&self) -> Vec<SharedRoomState> {
        self.rooms.iter().map(|e| e.value().clone()).collect()
    }

    pub fn insert_room_state(&self, id: Ulid, rs: RoomState) {
        self.rooms.insert(id, Arc::new(RwLock::new(rs)));
    }

    /// Drop a room whose lock the caller holds; marks it retired for anyone
    /// already waiting on that lock.
    pub fn retire_room(&self, rs: &mut RoomState) {
        rs.retired = true;
        self.rooms.remove(&rs.room.id);
        self.release_room_number(&rs.room.number, &rs.room.id);
    }

    // ── Room number index ────────────────────────────────────

    /// Claim `number` for `room_id`. `Ok(true)` if newly claimed, `Ok(false)`
    /// if the room already held it, `Err(holder)` if another room does.
    pub fn claim_room_number(&self, number: &str, room_id: Ulid) -> Result<bool, Ulid> {
        match self.room_numbers.entry(number.to_string()) {
            Entry::Occupied(e) if *e.get() == room_id => Ok(false),
            Entry::Occupied(e) => Err(*e.get()),
            Entry::Vacant(v) => {
                v.insert(room_id);
                Ok(true)
            }
        }
    }

    pub fn index_room_number(&self, number: &str, room_id: Ulid) {
        self.room_numbers.insert(number.to_string(), room_id);
    }

    /// Release `number` only if `room_id` still holds it.
    pub fn release_room_number(&self, number: &str, room_id: &Ulid) {
        self.room_numbers.remove_if(number, |_, holder| holder == room_id);
    }

    // ── Booking index ────────────────────────────────────────

    pub fn room_for_booking(&self, booking_id: &Ulid) -> Option<Ulid> {
        self.booking_rooms.get(booking_id).map(|e| *e.value())
    }

    /// Reserve a booking id before its room is locked. False if taken.
    pub fn claim_booking_id(&self, booking_id: Ulid, room_id: Ulid) -> bool {
        match self.booking_rooms.entry(booking_id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(v) => {
                v.insert(room_id);
                true
            }
        }
    }

    pub fn unmap_booking(&self, booking_id: &Ulid) {
        self.booking_rooms.remove(booking_id);
    }

    // ── Guests ───────────────────────────────────────────────

    pub fn guest_count(&self) -> usize {
        self.guests.len()
    }

    pub fn get_guest(&self, id: &Ulid) -> Option<Guest> {
        self.guests.get(id).map(|e| e.value().clone())
    }

    pub fn contains_guest(&self, id: &Ulid) -> bool {
        self.guests.contains_key(id)
    }

    pub fn guests(&self) -> Vec<Guest> {
        self.guests.iter().map(|e| e.value().clone()).collect()
    }

    // ── Payments ─────────────────────────────────────────────

    pub fn payment(&self, booking_id: &Ulid) -> Option<Payment> {
        self.payments.get(booking_id).map(|e| e.value().clone())
    }

    pub fn payments(&self) -> Vec<Payment> {
        self.payments.iter().map(|e| e.value().clone()).collect()
    }

    // ── Users ────────────────────────────────────────────────

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn get_user(&self, username: &str) -> Option<User> {
        self.users.get(username).map(|e| e.value().clone())
    }

    pub fn users(&self) -> Vec<User> {
        self.users.iter().map(|e| e.value().clone()).collect()
    }

    // ── Event application ────────────────────────────────────

    /// Apply a room-scoped event. The caller holds the room's write lock
    /// (or owns the state outright during replay).
    pub fn apply_to_room(&self, rs: &mut RoomState, event: &Event) {
        match event {
            Event::RoomSaved { room } => {
                if rs.room.number != room.number {
                    self.release_room_number(&rs.room.number, &room.id);
                    self.index_room_number(&room.number, room.id);
                }
                rs.room = room.clone();
            }
            Event::RoomStatusSet { status, .. } => {
                rs.room.status = *status;
            }
            Event::BookingCreated { booking } => {
                self.booking_rooms.insert(booking.id, booking.room_id);
                rs.insert_booking(booking.clone());
            }
            Event::BookingCheckedIn { id, .. } => {
                if let Some(b) = rs.booking_mut(id) {
                    b.status = BookingStatus::CheckedIn;
                }
                rs.room.status = RoomStatus::Occupied;
            }
            Event::BookingCheckedOut { id, payment, .. } => {
                if let Some(b) = rs.booking_mut(id) {
                    b.status = BookingStatus::CheckedOut;
                }
                rs.room.status = RoomStatus::Free;
                self.payments.insert(payment.booking_id, payment.clone());
            }
            Event::PaymentRecorded { payment, .. } => {
                self.payments.insert(payment.booking_id, payment.clone());
            }
            Event::PaymentMarkedPaid { booking_id, .. } => {
                if let Some(mut p) = self.payments.get_mut(booking_id) {
                    p.paid = true;
                }
            }
            // Room creation and deletion change the room map, not the state.
            Event::RoomDeleted { .. }
            | Event::UserCreated { .. }
            | Event::GuestSaved { .. }
            | Event::GuestDeleted { .. } => {}
        }
    }

    /// Apply an event that touches no room.
    pub fn apply_global(&self, event: &Event) {
        match event {
            Event::UserCreated { user } => {
                self.users.insert(user.username.clone(), user.clone());
            }
            Event::GuestSaved { guest } => {
                self.guests.insert(guest.id, guest.clone());
            }
            Event::GuestDeleted { id } => {
                self.guests.remove(id);
            }
            _ => {}
        }
    }
}
