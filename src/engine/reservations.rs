use crate::limits::*;
use crate::model::*;

use super::availability::saturated_spans;
use super::{Engine, EngineError, now_ms};

/// Payment modes that are refunded automatically on admin cancellation.
const REFUND_MODES: [&str; 3] = ["GCash", "Maya", "Card"];

fn validate_text(
    field: &'static str,
    value: &str,
    max: usize,
) -> Result<(), EngineError> {
    if value.is_empty() {
        return Err(EngineError::Validation {
            field,
            reason: "must not be empty",
        });
    }
    if value.len() > max {
        return Err(EngineError::Validation {
            field,
            reason: "too long",
        });
    }
    Ok(())
}

fn cancellation_message(r: &Reservation, location_name: &str) -> String {
    if REFUND_MODES.contains(&r.mode_of_payment.as_str()) {
        format!(
            "Your reservation on {} at {} has been cancelled. A refund will be processed shortly.",
            r.date, location_name
        )
    } else if r.mode_of_payment == "Cash" && r.is_paid {
        format!(
            "Your reservation on {} at {} has been cancelled. Please contact the administrator for a refund.",
            r.date, location_name
        )
    } else {
        format!(
            "Your reservation on {} at {} has been cancelled.",
            r.date, location_name
        )
    }
}

impl Engine {
    pub async fn create_reservation(&self, new: NewReservation) -> Result<(), EngineError> {
        if new.duration_hours == 0 || new.duration_hours > MAX_DURATION_HOURS {
            return Err(EngineError::Validation {
                field: "duration_hours",
                reason: "must be between 1 and 24",
            });
        }
        if let Some(ref user) = new.user {
            validate_text("user", user, MAX_NAME_LEN)?;
        }
        validate_text("plate_number", &new.plate_number, MAX_TEXT_LEN)?;
        validate_text("vehicle_make", &new.vehicle_make, MAX_TEXT_LEN)?;
        validate_text("vehicle_model", &new.vehicle_model, MAX_TEXT_LEN)?;
        validate_text("color", &new.color, MAX_TEXT_LEN)?;
        validate_text("mode_of_payment", &new.mode_of_payment, MAX_NAME_LEN)?;

        if !self.slot_types.contains_key(&new.slot_type_id) {
            return Err(EngineError::UnknownReference {
                field: "slot_type_id",
                id: new.slot_type_id as u64,
            });
        }
        if !self.vehicle_types.contains_key(&new.vehicle_type_id) {
            return Err(EngineError::UnknownReference {
                field: "vehicle_type_id",
                id: new.vehicle_type_id as u64,
            });
        }
        if self.reservation_index.contains_key(&new.id) {
            return Err(EngineError::AlreadyExists {
                entity: "reservation",
                id: new.id,
            });
        }
        let state = self
            .get_location(new.location_id)
            .ok_or(EngineError::UnknownReference {
                field: "location_id",
                id: new.location_id as u64,
            })?;
        let mut guard = state.write().await;
        if guard.reservations.len() >= MAX_RESERVATIONS_PER_LOCATION {
            return Err(EngineError::LimitExceeded("too many reservations on location"));
        }

        let reservation = Reservation {
            id: new.id,
            user: new.user,
            location_id: new.location_id,
            slot_type_id: new.slot_type_id,
            vehicle_type_id: new.vehicle_type_id,
            date: new.date,
            time: new.time,
            duration_hours: new.duration_hours,
            plate_number: new.plate_number,
            vehicle_make: new.vehicle_make,
            vehicle_model: new.vehicle_model,
            color: new.color,
            mode_of_payment: new.mode_of_payment,
            is_paid: false,
            is_cancelled: false,
            has_arrived: false,
            has_exited: false,
            is_approved: false,
            created_at: now_ms(),
        };

        // Off by default: availability checks and creation are independent
        // operations, so two concurrent creations can both pass the same
        // capacity read. Strict mode re-derives the overlap count under the
        // location's write lock and rejects an insert past capacity.
        if self.strict_capacity {
            let available = guard
                .pricing
                .iter()
                .find(|p| {
                    p.slot_type_id == reservation.slot_type_id
                        && p.vehicle_type_id == reservation.vehicle_type_id
                })
                .map(|p| p.available_slots)
                .unwrap_or(0);
            if available == 0 {
                return Err(EngineError::CapacityExceeded {
                    slot_type_id: reservation.slot_type_id,
                    available,
                });
            }
            let span = reservation.span();
            let mut occupied: Vec<Span> = guard
                .active_on(reservation.date, reservation.vehicle_type_id)
                .filter(|r| r.slot_type_id == reservation.slot_type_id)
                .map(|r| r.span())
                .collect();
            occupied.sort_by_key(|s| s.start);
            if saturated_spans(&occupied, available)
                .iter()
                .any(|s| s.overlaps(&span))
            {
                return Err(EngineError::CapacityExceeded {
                    slot_type_id: reservation.slot_type_id,
                    available,
                });
            }
        }

        let location_id = reservation.location_id;
        let event = Event::ReservationCreated { reservation };
        self.persist_and_apply(location_id, &mut guard, &event).await
    }

    /// Cancel a reservation. A user-initiated cancel of an already-cancelled
    /// reservation is an error; an admin cancel always succeeds and leaves a
    /// notification for the owning user with the applicable refund note.
    pub async fn cancel_reservation(&self, id: u64, by_admin: bool) -> Result<(), EngineError> {
        let (location_id, mut guard) = self.resolve_reservation_write(id).await?;
        let reservation = guard
            .reservation(id)
            .ok_or(EngineError::NotFound {
                entity: "reservation",
                id,
            })?
            .clone();
        if !by_admin && reservation.is_cancelled {
            return Err(EngineError::AlreadyCancelled(id));
        }

        let event = Event::ReservationCancelled { id, by_admin };
        self.persist_and_apply(location_id, &mut guard, &event)
            .await?;

        if by_admin
            && let Some(user) = reservation.user.clone()
            && self
                .notifications
                .get(&user)
                .is_none_or(|list| list.len() < MAX_NOTIFICATIONS_PER_USER)
        {
            let notification = Notification {
                id: self.next_notification_id(),
                user,
                reservation_id: id,
                message: cancellation_message(&reservation, &guard.name),
                is_read: false,
                created_at: now_ms(),
            };
            let event = Event::NotificationCreated { notification };
            self.wal_append(&event).await?;
            self.apply_notification(&event);
        }
        Ok(())
    }

    /// No ordering constraints between the lifecycle flags: approval, payment,
    /// check-in and check-out may each be set regardless of the others, and
    /// regardless of cancellation.
    pub async fn approve_reservation(&self, id: u64) -> Result<(), EngineError> {
        self.set_flag(id, Event::ReservationApproved { id }).await
    }

    pub async fn mark_paid(&self, id: u64) -> Result<(), EngineError> {
        self.set_flag(id, Event::ReservationPaid { id }).await
    }

    pub async fn check_in(&self, id: u64) -> Result<(), EngineError> {
        self.set_flag(id, Event::ReservationCheckedIn { id }).await
    }

    pub async fn check_out(&self, id: u64) -> Result<(), EngineError> {
        self.set_flag(id, Event::ReservationCheckedOut { id }).await
    }

    async fn set_flag(&self, id: u64, event: Event) -> Result<(), EngineError> {
        let (location_id, mut guard) = self.resolve_reservation_write(id).await?;
        if guard.reservation(id).is_none() {
            return Err(EngineError::NotFound {
                entity: "reservation",
                id,
            });
        }
        self.persist_and_apply(location_id, &mut guard, &event).await
    }

    /// Mark all of a user's notifications read. Returns the number of rows
    /// that were unread. No WAL traffic when there is nothing to change.
    pub async fn mark_notifications_read(&self, user: &str) -> Result<usize, EngineError> {
        let unread = self
            .notifications
            .get(user)
            .map(|list| list.iter().filter(|n| !n.is_read).count())
            .unwrap_or(0);
        if unread == 0 {
            return Ok(0);
        }
        let event = Event::NotificationsRead { user: user.into() };
        self.wal_append(&event).await?;
        self.apply_notification(&event);
        Ok(unread)
    }
}
