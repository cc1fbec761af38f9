use thiserror::Error;

pub(crate) const NOT_INITIALIZED_MSG: &str = "Parking lot has not been initialized. Please create it first.";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub(crate) enum LotError {
    #[error("{0}")]
    InvalidArgument(String),
    #[error("{}", NOT_INITIALIZED_MSG)]
    NotInitialized,
    #[error("Sorry, parking lot is full.")]
    Full,
    #[error("Car with registration number {0} is already parked.")]
    AlreadyParked(String),
    #[error("Slot number {0} is already free.")]
    AlreadyFree(u32),
    #[error("Car with registration number {0} not found.")]
    NotFound(String),
    // allocator bookkeeping went out of sync, never caused by caller input
    #[error("Internal allocation fault: {0}")]
    Inconsistent(String),
}

impl LotError {
    /// Slot outside `1..=total_slots`. Takes `i64` so callers can report values that never fit a slot.
    pub fn invalid_slot(slot_number: i64, total_slots: u32) -> Self {
        LotError::InvalidArgument(format!("Invalid slot number {slot_number}. Must be between 1 and {total_slots}."))
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, LotError::Inconsistent(_))
    }

    /// HTTP status the server answers with for this failure.
    pub fn status_code(&self) -> u16 {
        match self {
            LotError::InvalidArgument(_) | LotError::NotInitialized => 400,
            LotError::Full | LotError::AlreadyParked(_) => 409,
            LotError::NotFound(_) | LotError::AlreadyFree(_) => 404,
            LotError::Inconsistent(_) => 500,
        }
    }
}
