use crate::model::Ms;

/// One calendar day in ms; spans live inside `[0, DAY_MS]`.
pub const DAY_MS: Ms = 86_400_000;

/// Supported reservation dates. Keeps week arithmetic clear of chrono's range ends.
pub const MIN_VALID_YEAR: i32 = 1970;
pub const MAX_VALID_YEAR: i32 = 9999;

pub const MAX_NAME_LEN: usize = 256;
pub const MAX_LOCATION_LEN: usize = 512;
pub const MAX_DESCRIPTION_LEN: usize = 4096;
pub const MAX_EMAIL_LEN: usize = 320;

pub const MAX_PLACES: usize = 10_000;
pub const MAX_SPACES_PER_PLACE: usize = 1_000;
/// Reservations on one space for one date.
pub const MAX_RESERVATIONS_PER_SLOT_KEY: usize = 1_000;

pub const MAX_PAGE_LIMIT: usize = 500;
