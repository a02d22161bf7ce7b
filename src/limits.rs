/// Maximum length of a teacher, class or subject name.
pub const MAX_NAME_LEN: usize = 256;

/// Maximum length of a room label.
pub const MAX_ROOM_LEN: usize = 64;

/// Maximum number of schedule entries held by one engine.
pub const MAX_ENTRIES: usize = 100_000;

/// Maximum length of a single console statement.
pub const MAX_STATEMENT_LEN: usize = 8 * 1024;
