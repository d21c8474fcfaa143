use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::limits::*;
use crate::model::*;

use super::{Engine, EngineError};

impl Engine {
    pub async fn create_location(
        &self,
        id: u32,
        name: String,
        address: String,
    ) -> Result<(), EngineError> {
        if self.locations.len() >= MAX_LOCATIONS_PER_TENANT {
            return Err(EngineError::LimitExceeded("too many locations"));
        }
        if name.is_empty() || name.len() > MAX_NAME_LEN {
            return Err(EngineError::Validation {
                field: "name",
                reason: "must be 1-100 characters",
            });
        }
        if address.len() > MAX_TEXT_LEN {
            return Err(EngineError::Validation {
                field: "address",
                reason: "too long",
            });
        }
        if self.locations.contains_key(&id) {
            return Err(EngineError::AlreadyExists {
                entity: "location",
                id: id as u64,
            });
        }

        let event = Event::LocationCreated {
            id,
            name: name.clone(),
            address: address.clone(),
        };
        self.wal_append(&event).await?;
        let state = LocationState::new(id, name, address);
        self.locations.insert(id, Arc::new(RwLock::new(state)));
        self.notify.send(id, &event);
        Ok(())
    }

    /// Delete a location and cascade to everything it owns: pricing rows
    /// and all reservations, cancelled or not.
    pub async fn delete_location(&self, id: u32) -> Result<(), EngineError> {
        let state = self.get_location(id).ok_or(EngineError::NotFound {
            entity: "location",
            id: id as u64,
        })?;
        // Hold the write lock so no mutation lands between the WAL append
        // and the map removal.
        let guard = state.write().await;

        let event = Event::LocationDeleted { id };
        self.wal_append(&event).await?;
        for r in &guard.reservations {
            self.reservation_index.remove(&r.id);
        }
        drop(guard);
        self.locations.remove(&id);
        self.notify.send(id, &event);
        self.notify.remove(id);
        Ok(())
    }

    pub async fn create_slot_type(&self, slot_type: SlotType) -> Result<(), EngineError> {
        if self.slot_types.len() >= MAX_SLOT_TYPES_PER_TENANT {
            return Err(EngineError::LimitExceeded("too many slot types"));
        }
        if slot_type.name.is_empty() || slot_type.name.len() > MAX_NAME_LEN {
            return Err(EngineError::Validation {
                field: "name",
                reason: "must be 1-100 characters",
            });
        }
        if slot_type.description.len() > MAX_TEXT_LEN {
            return Err(EngineError::Validation {
                field: "description",
                reason: "too long",
            });
        }
        if slot_type.kind.len() > MAX_NAME_LEN {
            return Err(EngineError::Validation {
                field: "type",
                reason: "too long",
            });
        }
        if self.slot_types.contains_key(&slot_type.id) {
            return Err(EngineError::AlreadyExists {
                entity: "slot type",
                id: slot_type.id as u64,
            });
        }

        let event = Event::SlotTypeCreated {
            slot_type: slot_type.clone(),
        };
        self.wal_append(&event).await?;
        self.slot_types.insert(slot_type.id, slot_type);
        Ok(())
    }

    pub async fn create_vehicle_type(&self, vehicle_type: VehicleType) -> Result<(), EngineError> {
        if self.vehicle_types.len() >= MAX_VEHICLE_TYPES_PER_TENANT {
            return Err(EngineError::LimitExceeded("too many vehicle types"));
        }
        if vehicle_type.name.is_empty() || vehicle_type.name.len() > MAX_NAME_LEN {
            return Err(EngineError::Validation {
                field: "name",
                reason: "must be 1-100 characters",
            });
        }
        if self.vehicle_types.contains_key(&vehicle_type.id) {
            return Err(EngineError::AlreadyExists {
                entity: "vehicle type",
                id: vehicle_type.id as u64,
            });
        }

        let event = Event::VehicleTypeCreated {
            vehicle_type: vehicle_type.clone(),
        };
        self.wal_append(&event).await?;
        self.vehicle_types.insert(vehicle_type.id, vehicle_type);
        Ok(())
    }

    /// Atomically replace a location's full pricing set. Each input row
    /// carries the location id it was submitted with; all rows must agree.
    /// On any validation failure the existing rows are left untouched.
    pub async fn replace_pricing(
        &self,
        rows: Vec<(u32, PricingRow)>,
    ) -> Result<(u32, usize), EngineError> {
        let Some(&(location_id, _)) = rows.first() else {
            return Err(EngineError::Validation {
                field: "slot_pricing",
                reason: "at least one row required",
            });
        };
        if rows.iter().any(|(lid, _)| *lid != location_id) {
            return Err(EngineError::MixedLocations);
        }
        if rows.len() > MAX_PRICING_ROWS_PER_LOCATION {
            return Err(EngineError::LimitExceeded("too many pricing rows"));
        }

        let mut seen: HashSet<(u32, u32)> = HashSet::new();
        for (_, row) in &rows {
            if !self.slot_types.contains_key(&row.slot_type_id) {
                return Err(EngineError::UnknownReference {
                    field: "slot_type_id",
                    id: row.slot_type_id as u64,
                });
            }
            if !self.vehicle_types.contains_key(&row.vehicle_type_id) {
                return Err(EngineError::UnknownReference {
                    field: "vehicle_type_id",
                    id: row.vehicle_type_id as u64,
                });
            }
            if row.rate_per_hour.is_sign_negative() {
                return Err(EngineError::Validation {
                    field: "rate_per_hour",
                    reason: "must not be negative",
                });
            }
            if row.rate_per_hour.scale() > MAX_RATE_SCALE {
                return Err(EngineError::Validation {
                    field: "rate_per_hour",
                    reason: "at most two decimal places",
                });
            }
            if !seen.insert((row.slot_type_id, row.vehicle_type_id)) {
                return Err(EngineError::Validation {
                    field: "slot_type_id",
                    reason: "duplicate (slot type, vehicle type) pair",
                });
            }
        }

        let state = self.get_location(location_id).ok_or(EngineError::UnknownReference {
            field: "location_id",
            id: location_id as u64,
        })?;
        let mut guard = state.write().await;

        let count = rows.len();
        let event = Event::PricingReplaced {
            location_id,
            rows: rows.into_iter().map(|(_, row)| row).collect(),
        };
        self.persist_and_apply(location_id, &mut guard, &event)
            .await?;
        Ok((location_id, count))
    }
}
