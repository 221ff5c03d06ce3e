/// Max bytes in a table identifier.
pub const MAX_TABLE_ID_LEN: usize = 64;

/// Max bytes in a guest name.
pub const MAX_NAME_LEN: usize = 256;

/// Max bytes in a phone number or email address.
pub const MAX_CONTACT_LEN: usize = 256;

/// Max bytes in the raw arrival-time string.
pub const MAX_ARRIVAL_TIME_LEN: usize = 64;

/// Max live reservations held by one store.
pub const MAX_RESERVATIONS: usize = 100_000;

/// Max payload bytes in one WAL entry. A larger length prefix is corruption.
pub const MAX_WAL_ENTRY: usize = 64 * 1024;
