use chrono::{NaiveDate, NaiveTime, Timelike};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Unix milliseconds — used for `created_at` stamps.
pub type Ms = i64;

/// Minutes since midnight of the reservation's date. A reservation that
/// runs past midnight simply extends beyond 1440.
pub type Minutes = i32;

/// Half-open occupancy interval `[start, end)` in minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Minutes,
    pub end: Minutes,
}

impl Span {
    pub fn new(start: Minutes, end: Minutes) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_minutes(&self) -> Minutes {
        self.end - self.start
    }

    /// Half-open overlap: touching endpoints do not count.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Convert a time of day to minutes since midnight (seconds ignored —
/// reservations are minute-granular).
pub fn minutes_of(time: NaiveTime) -> Minutes {
    (time.hour() * 60 + time.minute()) as Minutes
}

// ── Reference data ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotType {
    pub id: u32,
    pub name: String,
    pub description: String,
    /// Free-text category, surfaced as the `type` column.
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleType {
    pub id: u32,
    pub name: String,
}

/// One catalog row: static capacity and hourly rate for a
/// (location, slot type, vehicle type) combination. `available_slots` is
/// the physical slot count, never decremented by reservation traffic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingRow {
    pub slot_type_id: u32,
    pub vehicle_type_id: u32,
    pub rate_per_hour: Decimal,
    pub available_slots: u32,
}

// ── Reservations ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: u64,
    /// Owning user, if any. Auth lives outside this system.
    pub user: Option<String>,
    pub location_id: u32,
    pub slot_type_id: u32,
    pub vehicle_type_id: u32,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub duration_hours: u32,
    pub plate_number: String,
    pub vehicle_make: String,
    pub vehicle_model: String,
    pub color: String,
    pub mode_of_payment: String,
    pub is_paid: bool,
    pub is_cancelled: bool,
    pub has_arrived: bool,
    pub has_exited: bool,
    pub is_approved: bool,
    /// Set once at creation, immutable thereafter.
    pub created_at: Ms,
}

impl Reservation {
    /// Occupancy interval on the reservation's own date.
    pub fn span(&self) -> Span {
        let start = minutes_of(self.time);
        Span::new(start, start + self.duration_hours as Minutes * 60)
    }
}

/// Input for reservation creation. All lifecycle flags start false and
/// `created_at` is stamped by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReservation {
    pub id: u64,
    pub user: Option<String>,
    pub location_id: u32,
    pub slot_type_id: u32,
    pub vehicle_type_id: u32,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub duration_hours: u32,
    pub plate_number: String,
    pub vehicle_make: String,
    pub vehicle_model: String,
    pub color: String,
    pub mode_of_payment: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: u64,
    pub user: String,
    pub reservation_id: u64,
    pub message: String,
    pub is_read: bool,
    pub created_at: Ms,
}

// ── Per-location state ───────────────────────────────────────────

/// Everything owned by one location: its pricing catalog and every
/// reservation ever made against it (cancelled rows included — they are
/// only removed by cascade when the location is deleted).
#[derive(Debug, Clone)]
pub struct LocationState {
    pub id: u32,
    pub name: String,
    pub address: String,
    pub pricing: Vec<PricingRow>,
    pub reservations: Vec<Reservation>,
}

impl LocationState {
    pub fn new(id: u32, name: String, address: String) -> Self {
        Self {
            id,
            name,
            address,
            pricing: Vec::new(),
            reservations: Vec::new(),
        }
    }

    pub fn reservation(&self, id: u64) -> Option<&Reservation> {
        self.reservations.iter().find(|r| r.id == id)
    }

    pub fn reservation_mut(&mut self, id: u64) -> Option<&mut Reservation> {
        self.reservations.iter_mut().find(|r| r.id == id)
    }

    /// Active (not cancelled) reservations for a vehicle type on a date.
    pub fn active_on(
        &self,
        date: NaiveDate,
        vehicle_type_id: u32,
    ) -> impl Iterator<Item = &Reservation> {
        self.reservations.iter().filter(move |r| {
            !r.is_cancelled && r.date == date && r.vehicle_type_id == vehicle_type_id
        })
    }
}

// ── WAL events ───────────────────────────────────────────────────

/// The event types — flat, no nesting. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    LocationCreated {
        id: u32,
        name: String,
        address: String,
    },
    LocationDeleted {
        id: u32,
    },
    SlotTypeCreated {
        slot_type: SlotType,
    },
    VehicleTypeCreated {
        vehicle_type: VehicleType,
    },
    /// Atomic replacement of a location's full pricing set.
    PricingReplaced {
        location_id: u32,
        rows: Vec<PricingRow>,
    },
    ReservationCreated {
        reservation: Reservation,
    },
    ReservationCancelled {
        id: u64,
        by_admin: bool,
    },
    ReservationApproved {
        id: u64,
    },
    ReservationPaid {
        id: u64,
    },
    ReservationCheckedIn {
        id: u64,
    },
    ReservationCheckedOut {
        id: u64,
    },
    NotificationCreated {
        notification: Notification,
    },
    NotificationsRead {
        user: String,
    },
}

// ── Query result types ───────────────────────────────────────────

/// One availability row: a catalog row decorated with slot-type detail
/// and the remaining (never negative) capacity for the queried window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilityRow {
    pub slot_type: String,
    pub rate_per_hour: Decimal,
    pub available_slots: u32,
    pub description: String,
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationInfo {
    pub id: u32,
    pub name: String,
    pub address: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn span_basics() {
        let s = Span::new(600, 720);
        assert_eq!(s.duration_minutes(), 120);
    }

    #[test]
    fn span_overlap_half_open() {
        let a = Span::new(720, 840); // 12:00–14:00
        let b = Span::new(750, 810); // 12:30–13:30
        let c = Span::new(840, 900); // 14:00–15:00
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c)); // adjacent, not overlapping
        assert!(!c.overlaps(&a));
    }

    #[test]
    fn minutes_of_ignores_seconds() {
        let t = NaiveTime::from_hms_opt(12, 30, 59).unwrap();
        assert_eq!(minutes_of(t), 750);
    }

    #[test]
    fn reservation_span_extends_past_midnight() {
        let r = Reservation {
            id: 1,
            user: None,
            location_id: 1,
            slot_type_id: 1,
            vehicle_type_id: 1,
            date: NaiveDate::from_ymd_opt(2025, 6, 25).unwrap(),
            time: NaiveTime::from_hms_opt(23, 0, 0).unwrap(),
            duration_hours: 3,
            plate_number: "ABC-123".into(),
            vehicle_make: "Toyota".into(),
            vehicle_model: "Vios".into(),
            color: "red".into(),
            mode_of_payment: "Cash".into(),
            is_paid: false,
            is_cancelled: false,
            has_arrived: false,
            has_exited: false,
            is_approved: false,
            created_at: 0,
        };
        assert_eq!(r.span(), Span::new(1380, 1560));
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::PricingReplaced {
            location_id: 7,
            rows: vec![PricingRow {
                slot_type_id: 1,
                vehicle_type_id: 2,
                rate_per_hour: Decimal::from_str("75.50").unwrap(),
                available_slots: 5,
            }],
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }

    #[test]
    fn rate_scale_survives_roundtrip() {
        let event = Event::PricingReplaced {
            location_id: 1,
            rows: vec![PricingRow {
                slot_type_id: 1,
                vehicle_type_id: 1,
                rate_per_hour: Decimal::from_str("120.00").unwrap(),
                available_slots: 1,
            }],
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        match decoded {
            Event::PricingReplaced { rows, .. } => {
                assert_eq!(rows[0].rate_per_hour.to_string(), "120.00");
            }
            _ => unreachable!(),
        }
    }
}
