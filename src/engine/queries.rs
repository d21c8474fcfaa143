use chrono::{NaiveDate, NaiveTime};

use crate::model::*;

use super::availability::remaining_slots;
use super::{Engine, SharedLocationState};

impl Engine {
    /// Remaining capacity per catalog row for a one-hour window starting at
    /// `time`. A pure read: an unknown location or vehicle type is not an
    /// error, it simply yields zero rows.
    pub async fn check_availability(
        &self,
        location_id: u32,
        vehicle_type_id: u32,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Vec<AvailabilityRow> {
        let Some(state) = self.get_location(location_id) else {
            return Vec::new();
        };
        let guard = state.read().await;

        remaining_slots(&guard, vehicle_type_id, date, time)
            .into_iter()
            .filter_map(|(row, remaining)| {
                let slot_type = self.slot_types.get(&row.slot_type_id)?;
                Some(AvailabilityRow {
                    slot_type: slot_type.name.clone(),
                    rate_per_hour: row.rate_per_hour,
                    available_slots: remaining,
                    description: slot_type.description.clone(),
                    kind: slot_type.kind.clone(),
                })
            })
            .collect()
    }

    pub async fn list_locations(&self) -> Vec<LocationInfo> {
        let arcs: Vec<SharedLocationState> = self
            .locations
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        let mut infos = Vec::with_capacity(arcs.len());
        for arc in arcs {
            let guard = arc.read().await;
            infos.push(LocationInfo {
                id: guard.id,
                name: guard.name.clone(),
                address: guard.address.clone(),
            });
        }
        infos.sort_by_key(|l| l.id);
        infos
    }

    pub fn list_slot_types(&self) -> Vec<SlotType> {
        let mut types: Vec<SlotType> = self.slot_types.iter().map(|e| e.value().clone()).collect();
        types.sort_by_key(|t| t.id);
        types
    }

    pub fn list_vehicle_types(&self) -> Vec<VehicleType> {
        let mut types: Vec<VehicleType> = self
            .vehicle_types
            .iter()
            .map(|e| e.value().clone())
            .collect();
        types.sort_by_key(|t| t.id);
        types
    }

    /// Pricing rows for a location in catalog order. Unknown location yields
    /// an empty set.
    pub async fn get_pricing(&self, location_id: u32) -> Vec<PricingRow> {
        let Some(state) = self.get_location(location_id) else {
            return Vec::new();
        };
        let guard = state.read().await;
        guard.pricing.clone()
    }

    /// Reservations across all locations, newest date and time first,
    /// optionally filtered to one user.
    pub async fn list_reservations(&self, user: Option<&str>) -> Vec<Reservation> {
        let arcs: Vec<SharedLocationState> = self
            .locations
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        let mut rows = Vec::new();
        for arc in arcs {
            let guard = arc.read().await;
            for r in &guard.reservations {
                if let Some(u) = user
                    && r.user.as_deref() != Some(u) {
                        continue;
                    }
                rows.push(r.clone());
            }
        }
        rows.sort_by(|a, b| {
            b.date
                .cmp(&a.date)
                .then(b.time.cmp(&a.time))
                .then(b.id.cmp(&a.id))
        });
        rows
    }

    /// A user's notifications, newest first.
    pub fn list_notifications(&self, user: &str, unread_only: bool) -> Vec<Notification> {
        let mut rows: Vec<Notification> = self
            .notifications
            .get(user)
            .map(|list| {
                list.iter()
                    .filter(|n| !unread_only || !n.is_read)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        rows
    }
}
