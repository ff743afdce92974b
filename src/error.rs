use thiserror::Error;

/// Fatal conditions. Anything returned as `SigError` aborts the current
/// operation; advisory conditions are carried as `audit::Warning` instead.
#[derive(Error, Debug)]
pub enum SigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid dose: {0}")]
    InvalidDose(String),

    #[error("Invalid timing: {0}")]
    InvalidTiming(String),

    #[error("Invalid route: {0}")]
    InvalidRoute(String),

    #[error("Dose out of range: {0}")]
    DoseOutOfRange(String),

    #[error("Frequency out of range: {0}")]
    FrequencyOutOfRange(String),

    #[error("Dose of {0} tablet is below the minimum of 1/4 tablet")]
    BelowTabletFloor(f64),

    #[error("Fractional dose not allowed: {0}")]
    FractionalDoseNotAllowed(String),

    #[error("Dispenser limit exceeded: {0}")]
    DispenserLimitExceeded(String),

    #[error("Incomplete builder state: {0}")]
    IncompleteState(String),

    #[error("Tapering schedule has no phases")]
    MissingPhases,

    #[error("Tapering phases are not contiguous: {0}")]
    NonContiguousPhases(String),

    #[error("Invalid tapering phase: {0}")]
    InvalidPhase(String),

    #[error("Ambiguous strategy selection: {0}")]
    AmbiguousStrategy(String),

    #[error("No strategy matches: {0}")]
    NoMatchingStrategy(String),

    #[error("Invalid medication profile: {0}")]
    InvalidMedication(String),

    #[error("Invalid engine configuration: {0}")]
    InvalidConfig(String),
}

pub type SigResult<T> = Result<T, SigError>;
