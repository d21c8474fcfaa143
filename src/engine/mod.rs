mod availability;
mod catalog;
mod error;
mod queries;
mod reservations;

pub use availability::{merge_overlapping, overlap_counts, query_window, remaining_slots, saturated_spans};
pub use error::EngineError;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::{RwLock, mpsc, oneshot};

use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

pub type SharedLocationState = Arc<RwLock<LocationState>>;

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as Ms
}

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond Ok to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                // Drain all immediately available appends
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush current batch first, then handle the non-append command
                            metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE)
                                .record(batch.len() as f64);
                            let flush_start = std::time::Instant::now();
                            let result = flush_batch(&mut wal, &mut batch);
                            metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
                                .record(flush_start.elapsed().as_secs_f64());
                            respond_batch(&mut batch, &result);
                            handle_non_append(&mut wal, other);
                            break;
                        }
                        Err(_) => break, // channel empty — flush batch
                    }
                }

                if !batch.is_empty() {
                    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE)
                        .record(batch.len() as f64);
                    let flush_start = std::time::Instant::now();
                    let result = flush_batch(&mut wal, &mut batch);
                    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
                        .record(flush_start.elapsed().as_secs_f64());
                    respond_batch(&mut batch, &result);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_batch(
    wal: &mut Wal,
    batch: &mut [(Event, oneshot::Sender<io::Result<()>>)],
) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush — even on append error — so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn respond_batch(
    batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>,
    result: &io::Result<()>,
) {
    for (_, tx) in batch.drain(..) {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

// ── Engine ───────────────────────────────────────────────

pub struct Engine {
    pub locations: DashMap<u32, SharedLocationState>,
    pub slot_types: DashMap<u32, SlotType>,
    pub vehicle_types: DashMap<u32, VehicleType>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
    /// Reverse lookup: reservation id → location id
    pub(super) reservation_index: DashMap<u64, u32>,
    /// Notifications keyed by owning user.
    pub(super) notifications: DashMap<String, Vec<Notification>>,
    notification_seq: AtomicU64,
    /// Opt-in: make capacity verification and reservation insertion one
    /// atomic unit under the location's write lock.
    pub(super) strict_capacity: bool,
}

/// Apply a location-scoped event directly to a LocationState
/// (no locking — caller holds the lock).
fn apply_to_location(state: &mut LocationState, event: &Event, index: &DashMap<u64, u32>) {
    match event {
        Event::PricingReplaced { rows, .. } => {
            state.pricing = rows.clone();
        }
        Event::ReservationCreated { reservation } => {
            index.insert(reservation.id, state.id);
            state.reservations.push(reservation.clone());
        }
        Event::ReservationCancelled { id, .. } => {
            if let Some(r) = state.reservation_mut(*id) {
                r.is_cancelled = true;
            }
        }
        Event::ReservationApproved { id } => {
            if let Some(r) = state.reservation_mut(*id) {
                r.is_approved = true;
            }
        }
        Event::ReservationPaid { id } => {
            if let Some(r) = state.reservation_mut(*id) {
                r.is_paid = true;
            }
        }
        Event::ReservationCheckedIn { id } => {
            if let Some(r) = state.reservation_mut(*id) {
                r.has_arrived = true;
            }
        }
        Event::ReservationCheckedOut { id } => {
            if let Some(r) = state.reservation_mut(*id) {
                r.has_exited = true;
            }
        }
        // Catalog and notification events are handled at the Engine level
        _ => {}
    }
}

impl Engine {
    pub fn new(
        wal_path: PathBuf,
        notify: Arc<NotifyHub>,
        strict_capacity: bool,
    ) -> std::io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            locations: DashMap::new(),
            slot_types: DashMap::new(),
            vehicle_types: DashMap::new(),
            wal_tx,
            notify,
            reservation_index: DashMap::new(),
            notifications: DashMap::new(),
            notification_seq: AtomicU64::new(0),
            strict_capacity,
        };

        // Replay events — we're the sole owner of these Arcs, so try_write
        // always succeeds instantly (no contention). Never use blocking_write
        // here because this may run inside an async context (e.g. lazy tenant
        // creation).
        for event in &events {
            match event {
                Event::LocationCreated { id, name, address } => {
                    let state = LocationState::new(*id, name.clone(), address.clone());
                    engine.locations.insert(*id, Arc::new(RwLock::new(state)));
                }
                Event::LocationDeleted { id } => {
                    if let Some((_, arc)) = engine.locations.remove(id) {
                        let guard = arc.try_read().expect("replay: uncontended read");
                        for r in &guard.reservations {
                            engine.reservation_index.remove(&r.id);
                        }
                    }
                }
                Event::SlotTypeCreated { slot_type } => {
                    engine.slot_types.insert(slot_type.id, slot_type.clone());
                }
                Event::VehicleTypeCreated { vehicle_type } => {
                    engine
                        .vehicle_types
                        .insert(vehicle_type.id, vehicle_type.clone());
                }
                Event::NotificationCreated { .. } | Event::NotificationsRead { .. } => {
                    engine.apply_notification(event);
                }
                other => {
                    let location_id = event_location_id(other, &engine.reservation_index);
                    if let Some(location_id) = location_id
                        && let Some(entry) = engine.locations.get(&location_id) {
                            let arc = entry.clone();
                            let mut guard =
                                arc.try_write().expect("replay: uncontended write");
                            apply_to_location(&mut guard, other, &engine.reservation_index);
                        }
                }
            }
        }

        Ok(engine)
    }

    /// Write event to WAL via the background group-commit writer.
    pub(super) async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub fn get_location(&self, id: u32) -> Option<SharedLocationState> {
        self.locations.get(&id).map(|e| e.value().clone())
    }

    pub fn location_for_reservation(&self, reservation_id: u64) -> Option<u32> {
        self.reservation_index
            .get(&reservation_id)
            .map(|e| *e.value())
    }

    /// WAL-append + apply + notify in one call. Eliminates the repeated 3-line pattern.
    pub(super) async fn persist_and_apply(
        &self,
        location_id: u32,
        state: &mut LocationState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_location(state, event, &self.reservation_index);
        self.notify.send(location_id, event);
        Ok(())
    }

    /// Lookup reservation → location, get location, acquire write lock.
    pub(super) async fn resolve_reservation_write(
        &self,
        reservation_id: u64,
    ) -> Result<(u32, tokio::sync::OwnedRwLockWriteGuard<LocationState>), EngineError> {
        let location_id = self.location_for_reservation(reservation_id).ok_or(
            EngineError::NotFound {
                entity: "reservation",
                id: reservation_id,
            },
        )?;
        let state = self
            .get_location(location_id)
            .ok_or(EngineError::NotFound {
                entity: "location",
                id: location_id as u64,
            })?;
        let guard = state.write_owned().await;
        Ok((location_id, guard))
    }

    pub(super) fn next_notification_id(&self) -> u64 {
        self.notification_seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Apply a notification event to the per-user map. Shared by the live
    /// path and replay.
    pub(super) fn apply_notification(&self, event: &Event) {
        match event {
            Event::NotificationCreated { notification } => {
                let seq = self.notification_seq.load(Ordering::Relaxed);
                if notification.id > seq {
                    self.notification_seq
                        .store(notification.id, Ordering::Relaxed);
                }
                self.notifications
                    .entry(notification.user.clone())
                    .or_default()
                    .push(notification.clone());
            }
            Event::NotificationsRead { user } => {
                if let Some(mut list) = self.notifications.get_mut(user) {
                    for n in list.iter_mut() {
                        n.is_read = true;
                    }
                }
            }
            _ => {}
        }
    }

    /// Compact the WAL by rewriting it with only the events needed to
    /// recreate the current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let mut events = Vec::new();

        let mut slot_types: Vec<SlotType> =
            self.slot_types.iter().map(|e| e.value().clone()).collect();
        slot_types.sort_by_key(|s| s.id);
        for slot_type in slot_types {
            events.push(Event::SlotTypeCreated { slot_type });
        }

        let mut vehicle_types: Vec<VehicleType> = self
            .vehicle_types
            .iter()
            .map(|e| e.value().clone())
            .collect();
        vehicle_types.sort_by_key(|v| v.id);
        for vehicle_type in vehicle_types {
            events.push(Event::VehicleTypeCreated { vehicle_type });
        }

        let mut location_ids: Vec<u32> = self.locations.iter().map(|e| *e.key()).collect();
        location_ids.sort_unstable();
        for id in location_ids {
            let Some(arc) = self.get_location(id) else {
                continue;
            };
            let guard = arc.read().await;
            events.push(Event::LocationCreated {
                id: guard.id,
                name: guard.name.clone(),
                address: guard.address.clone(),
            });
            if !guard.pricing.is_empty() {
                events.push(Event::PricingReplaced {
                    location_id: guard.id,
                    rows: guard.pricing.clone(),
                });
            }
            // ReservationCreated carries the full row, flags included, so
            // replay restores the exact state.
            for r in &guard.reservations {
                events.push(Event::ReservationCreated {
                    reservation: r.clone(),
                });
            }
        }

        let mut users: Vec<String> = self.notifications.iter().map(|e| e.key().clone()).collect();
        users.sort_unstable();
        for user in users {
            if let Some(list) = self.notifications.get(&user) {
                for n in list.iter() {
                    events.push(Event::NotificationCreated {
                        notification: n.clone(),
                    });
                }
            }
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact {
                events,
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

/// Extract the location id from a location-scoped event, resolving
/// reservation-flag events through the reverse index.
fn event_location_id(event: &Event, index: &DashMap<u64, u32>) -> Option<u32> {
    match event {
        Event::PricingReplaced { location_id, .. } => Some(*location_id),
        Event::ReservationCreated { reservation } => Some(reservation.location_id),
        Event::ReservationCancelled { id, .. }
        | Event::ReservationApproved { id }
        | Event::ReservationPaid { id }
        | Event::ReservationCheckedIn { id }
        | Event::ReservationCheckedOut { id } => index.get(id).map(|e| *e.value()),
        _ => None,
    }
}
