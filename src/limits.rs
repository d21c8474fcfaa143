//! Hard caps that keep a single misbehaving client from exhausting memory.

pub const MAX_TENANTS: usize = 64;
pub const MAX_TENANT_NAME_LEN: usize = 128;

pub const MAX_LOCATIONS_PER_TENANT: usize = 4096;
pub const MAX_SLOT_TYPES_PER_TENANT: usize = 1024;
pub const MAX_VEHICLE_TYPES_PER_TENANT: usize = 1024;
pub const MAX_PRICING_ROWS_PER_LOCATION: usize = 256;
pub const MAX_RESERVATIONS_PER_LOCATION: usize = 100_000;
pub const MAX_NOTIFICATIONS_PER_USER: usize = 10_000;

pub const MAX_NAME_LEN: usize = 100;
pub const MAX_TEXT_LEN: usize = 200;
pub const MAX_MESSAGE_LEN: usize = 500;

/// Longest reservation a client may book.
pub const MAX_DURATION_HOURS: u32 = 24;

/// Availability queries always probe a fixed one-hour window.
pub const SEARCH_WINDOW_MINUTES: i32 = 60;

/// Maximum fractional digits accepted for hourly rates.
pub const MAX_RATE_SCALE: u32 = 2;
