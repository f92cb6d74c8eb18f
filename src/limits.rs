/// Max rooms in one property.
pub const MAX_ROOMS: usize = 10_000;

/// Max length of room and guest identifiers.
pub const MAX_ID_LEN: usize = 64;

/// Max length of guest names and contact fields.
pub const MAX_NAME_LEN: usize = 256;

/// Longest bookable stay.
pub const MAX_STAY_NIGHTS: i64 = 365;

/// Widest window accepted by calendar and occupancy queries.
pub const MAX_QUERY_WINDOW_DAYS: i64 = 3 * 366;

/// Max reservations (any status) tracked per room.
pub const MAX_RESERVATIONS_PER_ROOM: usize = 100_000;
