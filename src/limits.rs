//! Hard caps that keep a single property's state bounded.

pub const MAX_ROOMS: usize = 2_000;
pub const MAX_GUESTS: usize = 500_000;
pub const MAX_USERS: usize = 1_000;

/// Bookings kept per room, history included.
pub const MAX_BOOKINGS_PER_ROOM: usize = 20_000;

/// Longest stay a single booking may cover.
pub const MAX_STAY_NIGHTS: i64 = 365;

/// Applies to room numbers, categories, guest names, passports, phones, usernames, roles.
pub const MAX_TEXT_LEN: usize = 256;

pub const MIN_ROOM_CAPACITY: u32 = 1;
pub const MAX_ROOM_CAPACITY: u32 = 5;

/// Largest encoded WAL entry. A longer length prefix on replay is treated as corruption.
pub const MAX_EVENT_BYTES: usize = 1 << 20;

/// Pending commands buffered in front of the WAL writer.
pub const WAL_CHANNEL_CAPACITY: usize = 4096;
