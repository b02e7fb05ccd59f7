use chrono::NaiveDate;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability::{BOOKINGS_CREATED_TOTAL, BOOKING_CONFLICTS_TOTAL};

use super::conflict::{
    check_no_conflict, optional_text, required_text, today, validate_amount, validate_capacity,
    validate_rate, validate_stay,
};
use super::{Engine, EngineError};

impl Engine {
    // ── Booking lifecycle ────────────────────────────────────

    /// Book `room_id` for `guest_id` over `[check_in, check_out)`, using the
    /// local calendar date as "today".
    pub async fn create_booking(
        &self,
        id: Ulid,
        guest_id: Ulid,
        room_id: Ulid,
        check_in: Option<NaiveDate>,
        check_out: Option<NaiveDate>,
    ) -> Result<Booking, EngineError> {
        self.create_booking_at(id, guest_id, room_id, check_in, check_out, today())
            .await
    }

    /// Same as `create_booking` with an explicit business date.
    pub async fn create_booking_at(
        &self,
        id: Ulid,
        guest_id: Ulid,
        room_id: Ulid,
        check_in: Option<NaiveDate>,
        check_out: Option<NaiveDate>,
        today: NaiveDate,
    ) -> Result<Booking, EngineError> {
        let stay = validate_stay(check_in, check_out, today)?;
        let _gate = self.begin_write().await;

        let rs = self
            .store
            .get_room(&room_id)
            .ok_or(EngineError::RoomNotFound(room_id))?;
        if !self.store.contains_guest(&guest_id) {
            return Err(EngineError::GuestNotFound(guest_id));
        }
        if !self.store.claim_booking_id(id, room_id) {
            return Err(EngineError::AlreadyExists(id));
        }

        let mut guard = rs.write().await;
        let result = async {
            if guard.retired {
                return Err(EngineError::RoomNotFound(room_id));
            }
            if guard.bookings.len() >= MAX_BOOKINGS_PER_ROOM {
                return Err(EngineError::LimitExceeded("too many bookings on room"));
            }
            if let Err(e) = check_no_conflict(&guard, &stay) {
                metrics::counter!(BOOKING_CONFLICTS_TOTAL).increment(1);
                return Err(e);
            }
            let booking = Booking {
                id,
                room_id,
                guest_id,
                stay,
                status: BookingStatus::Booked,
            };
            let event = Event::BookingCreated {
                booking: booking.clone(),
            };
            self.persist_and_apply(&mut guard, &event).await?;
            Ok(booking)
        }
        .await;

        match &result {
            Ok(b) => {
                metrics::counter!(BOOKINGS_CREATED_TOTAL).increment(1);
                tracing::info!(
                    "booking {id} created: room {} {}..{} ({} nights)",
                    guard.room.number,
                    b.stay.check_in,
                    b.stay.check_out,
                    b.stay.nights()
                );
            }
            Err(e) => {
                self.store.unmap_booking(&id);
                tracing::debug!("booking {id} rejected: {e}");
            }
        }
        result
    }

    /// BOOKED → CHECKED_IN; the room becomes OCCUPIED.
    pub async fn check_in(&self, booking_id: Ulid) -> Result<Booking, EngineError> {
        let _gate = self.begin_write().await;
        let (room_id, mut guard) = self.resolve_booking_write(&booking_id).await?;
        let current = guard
            .booking(&booking_id)
            .map(|b| b.status)
            .ok_or(EngineError::BookingNotFound(booking_id))?;
        if current != BookingStatus::Booked {
            return Err(EngineError::InvalidStateTransition {
                booking_id,
                from: current,
                to: BookingStatus::CheckedIn,
            });
        }

        let event = Event::BookingCheckedIn {
            id: booking_id,
            room_id,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        tracing::info!("booking {booking_id} checked in to room {}", guard.room.number);
        guard
            .booking(&booking_id)
            .cloned()
            .ok_or(EngineError::BookingNotFound(booking_id))
    }

    /// CHECKED_IN → CHECKED_OUT; the room becomes FREE and the stay is billed.
    /// Returns the total cost.
    pub async fn check_out(&self, booking_id: Ulid, paid: bool) -> Result<f64, EngineError> {
        let _gate = self.begin_write().await;
        let (room_id, mut guard) = self.resolve_booking_write(&booking_id).await?;
        let booking = guard
            .booking(&booking_id)
            .cloned()
            .ok_or(EngineError::BookingNotFound(booking_id))?;
        if booking.status != BookingStatus::CheckedIn {
            return Err(EngineError::InvalidStateTransition {
                booking_id,
                from: booking.status,
                to: BookingStatus::CheckedOut,
            });
        }

        let amount = stay_cost(&booking.stay, guard.room.rate);
        // An earlier deposit is settled by the check-out payment.
        let payment = match self.store.payment(&booking_id) {
            Some(existing) => Payment {
                amount,
                paid: paid || existing.paid,
                ..existing
            },
            None => Payment {
                id: Ulid::new(),
                booking_id,
                amount,
                paid,
            },
        };
        let event = Event::BookingCheckedOut {
            id: booking_id,
            room_id,
            payment,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        tracing::info!(
            "booking {booking_id} checked out of room {}: {amount:.2} ({})",
            guard.room.number,
            if paid { "paid" } else { "unpaid" }
        );
        Ok(amount)
    }

    /// Nights × the room's current rate.
    pub async fn calculate_total_cost(&self, booking: &Booking) -> Result<f64, EngineError> {
        let rs = self
            .store
            .get_room(&booking.room_id)
            .ok_or(EngineError::RoomNotFound(booking.room_id))?;
        let guard = rs.read().await;
        Ok(stay_cost(&booking.stay, guard.room.rate))
    }

    // ── Rooms ────────────────────────────────────────────────

    /// Insert or update a room by id. Inventory changes are rare, so they
    /// run with every other write held off.
    pub async fn save_room(
        &self,
        id: Ulid,
        number: &str,
        category: &str,
        rate: f64,
        capacity: u32,
    ) -> Result<Room, EngineError> {
        let number = required_text("number", number)?;
        let category = required_text("category", category)?;
        validate_rate(rate)?;
        validate_capacity(capacity)?;

        let _gate = self.begin_exclusive().await;
        let existing = self.store.get_room(&id);
        if existing.is_none() && self.store.room_count() >= MAX_ROOMS {
            return Err(EngineError::LimitExceeded("too many rooms"));
        }
        let newly_claimed = self
            .store
            .claim_room_number(&number, id)
            .map_err(|_| EngineError::DuplicateRoomNumber(number.clone()))?;

        let result = match existing {
            Some(rs) => {
                let mut guard = rs.write().await;
                let room = Room {
                    id,
                    number: number.clone(),
                    category,
                    rate,
                    capacity,
                    status: guard.room.status,
                };
                let event = Event::RoomSaved { room: room.clone() };
                self.persist_and_apply(&mut guard, &event)
                    .await
                    .map(|()| room)
            }
            None => {
                let room = Room {
                    id,
                    number: number.clone(),
                    category,
                    rate,
                    capacity,
                    status: RoomStatus::Free,
                };
                let event = Event::RoomSaved { room: room.clone() };
                match self.wal_append(&event).await {
                    Ok(()) => {
                        self.store.insert_room_state(id, RoomState::new(room.clone()));
                        Ok(room)
                    }
                    Err(e) => Err(e),
                }
            }
        };

        match &result {
            Ok(room) => tracing::info!("room {} saved ({}, {:.2}/night)", room.number, room.category, room.rate),
            Err(_) if newly_claimed => self.store.release_room_number(&number, &id),
            Err(_) => {}
        }
        result
    }

    /// Remove a room that has never been booked.
    pub async fn delete_room(&self, id: Ulid) -> Result<(), EngineError> {
        let _gate = self.begin_exclusive().await;
        let rs = self
            .store
            .get_room(&id)
            .ok_or(EngineError::RoomNotFound(id))?;
        let mut guard = rs.write().await;
        if !guard.bookings.is_empty() {
            return Err(EngineError::RoomInUse(id));
        }
        self.wal_append(&Event::RoomDeleted { id }).await?;
        self.store.retire_room(&mut guard);
        tracing::info!("room {} deleted", guard.room.number);
        Ok(())
    }

    /// Manual status override, e.g. a room taken out for maintenance.
    pub async fn set_room_status(&self, id: Ulid, status: RoomStatus) -> Result<(), EngineError> {
        let _gate = self.begin_write().await;
        let rs = self
            .store
            .get_room(&id)
            .ok_or(EngineError::RoomNotFound(id))?;
        let mut guard = rs.write().await;
        if guard.retired {
            return Err(EngineError::RoomNotFound(id));
        }
        let event = Event::RoomStatusSet { id, status };
        self.persist_and_apply(&mut guard, &event).await
    }

    // ── Guests ───────────────────────────────────────────────

    pub async fn save_guest(
        &self,
        id: Ulid,
        name: &str,
        passport: &str,
        phone: Option<&str>,
    ) -> Result<Guest, EngineError> {
        let guest = Guest {
            id,
            name: required_text("name", name)?,
            passport: required_text("passport", passport)?,
            phone: optional_text(phone)?,
        };
        let _gate = self.begin_write().await;
        if !self.store.contains_guest(&id) && self.store.guest_count() >= MAX_GUESTS {
            return Err(EngineError::LimitExceeded("too many guests"));
        }
        self.persist_global(&Event::GuestSaved {
            guest: guest.clone(),
        })
        .await?;
        tracing::debug!("guest {id} saved");
        Ok(guest)
    }

    /// Remove a guest no booking refers to. Runs exclusively so no booking
    /// for this guest can commit between the scan and the delete.
    pub async fn delete_guest(&self, id: Ulid) -> Result<(), EngineError> {
        let _gate = self.begin_exclusive().await;
        if !self.store.contains_guest(&id) {
            return Err(EngineError::GuestNotFound(id));
        }
        for rs in self.store.room_states() {
            let guard = rs.read().await;
            if guard.bookings.iter().any(|b| b.guest_id == id) {
                return Err(EngineError::GuestInUse(id));
            }
        }
        self.persist_global(&Event::GuestDeleted { id }).await?;
        tracing::info!("guest {id} deleted");
        Ok(())
    }

    // ── Payments ─────────────────────────────────────────────

    /// Record a payment ahead of check-out (a deposit). One per booking.
    pub async fn record_payment(
        &self,
        booking_id: Ulid,
        amount: f64,
        paid: bool,
    ) -> Result<Payment, EngineError> {
        validate_amount(amount)?;
        let _gate = self.begin_write().await;
        let (room_id, mut guard) = self.resolve_booking_write(&booking_id).await?;
        if self.store.payment(&booking_id).is_some() {
            return Err(EngineError::PaymentExists(booking_id));
        }
        let payment = Payment {
            id: Ulid::new(),
            booking_id,
            amount,
            paid,
        };
        let event = Event::PaymentRecorded {
            room_id,
            payment: payment.clone(),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        tracing::info!("payment {} recorded for booking {booking_id}: {amount:.2}", payment.id);
        Ok(payment)
    }

    /// Flip a booking's payment to paid. Already-paid is a no-op.
    pub async fn mark_paid(&self, booking_id: Ulid) -> Result<Payment, EngineError> {
        let _gate = self.begin_write().await;
        let (room_id, mut guard) = self.resolve_booking_write(&booking_id).await?;
        let payment = self
            .store
            .payment(&booking_id)
            .ok_or(EngineError::PaymentNotFound(booking_id))?;
        if payment.paid {
            return Ok(payment);
        }
        let event = Event::PaymentMarkedPaid {
            booking_id,
            room_id,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        tracing::info!("booking {booking_id} marked paid");
        Ok(Payment {
            paid: true,
            ..payment
        })
    }
}
