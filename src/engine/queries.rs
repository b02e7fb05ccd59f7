use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::*;

use super::availability::sort_by_number;
use super::Engine;

impl Engine {
    // ── Rooms & guests ───────────────────────────────────────

    /// Every room, ordered by number.
    pub async fn list_rooms(&self) -> Vec<Room> {
        let mut rooms = Vec::new();
        for rs in self.store.room_states() {
            let guard = rs.read().await;
            if !guard.retired {
                rooms.push(guard.room.clone());
            }
        }
        sort_by_number(&mut rooms);
        rooms
    }

    pub async fn find_room(&self, id: &Ulid) -> Option<Room> {
        let rs = self.store.get_room(id)?;
        let guard = rs.read().await;
        (!guard.retired).then(|| guard.room.clone())
    }

    /// Every guest, ordered by name.
    pub fn list_guests(&self) -> Vec<Guest> {
        let mut guests = self.store.guests();
        guests.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        guests
    }

    pub fn find_guest(&self, id: &Ulid) -> Option<Guest> {
        self.store.get_guest(id)
    }

    // ── Bookings ─────────────────────────────────────────────

    pub async fn find_booking(&self, id: &Ulid) -> Option<Booking> {
        let room_id = self.store.room_for_booking(id)?;
        let rs = self.store.get_room(&room_id)?;
        let guard = rs.read().await;
        guard.booking(id).cloned()
    }

    /// Joined booking rows matching `keep`, ordered by check-in then room number.
    async fn booking_views(&self, keep: impl Fn(&Booking) -> bool) -> Vec<BookingView> {
        let mut views = Vec::new();
        for rs in self.store.room_states() {
            let guard = rs.read().await;
            for b in guard.bookings.iter().filter(|b| keep(b)) {
                views.push(BookingView {
                    id: b.id,
                    room_id: b.room_id,
                    room_number: guard.room.number.clone(),
                    guest_id: b.guest_id,
                    guest_name: self.store.get_guest(&b.guest_id).map(|g| g.name),
                    check_in: b.stay.check_in,
                    check_out: b.stay.check_out,
                    nights: b.stay.nights(),
                    status: b.status,
                });
            }
        }
        views.sort_by(|a, b| {
            a.check_in
                .cmp(&b.check_in)
                .then_with(|| a.room_number.cmp(&b.room_number))
                .then(a.id.cmp(&b.id))
        });
        views
    }

    pub async fn list_bookings(&self) -> Vec<BookingView> {
        self.booking_views(|_| true).await
    }

    pub async fn bookings_by_status(&self, status: BookingStatus) -> Vec<BookingView> {
        self.booking_views(|b| b.status == status).await
    }

    /// Bookings still waiting for their guest: BOOKED with check-in on or
    /// before `on_or_before`. Late arrivals stay on the list.
    pub async fn bookings_due_in(&self, on_or_before: NaiveDate) -> Vec<BookingView> {
        self.booking_views(|b| {
            b.status == BookingStatus::Booked && b.stay.check_in <= on_or_before
        })
        .await
    }

    /// Guests currently in house.
    pub async fn bookings_awaiting_checkout(&self) -> Vec<BookingView> {
        self.bookings_by_status(BookingStatus::CheckedIn).await
    }

    // ── Payments ─────────────────────────────────────────────

    pub fn list_payments(&self) -> Vec<Payment> {
        let mut payments = self.store.payments();
        payments.sort_by_key(|p| p.id);
        payments
    }

    pub fn payment_for_booking(&self, booking_id: &Ulid) -> Option<Payment> {
        self.store.payment(booking_id)
    }
}
