#[derive(Debug)]
pub enum EngineError {
    NotFound { entity: &'static str, id: u64 },
    AlreadyExists { entity: &'static str, id: u64 },
    AlreadyCancelled(u64),
    UnknownReference { field: &'static str, id: u64 },
    MixedLocations,
    CapacityExceeded { slot_type_id: u32, available: u32 },
    LimitExceeded(&'static str),
    Validation { field: &'static str, reason: &'static str },
    WalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound { entity, id } => write!(f, "{entity} not found: {id}"),
            EngineError::AlreadyExists { entity, id } => {
                write!(f, "{entity} already exists: {id}")
            }
            EngineError::AlreadyCancelled(id) => {
                write!(f, "reservation already cancelled: {id}")
            }
            EngineError::UnknownReference { field, id } => {
                write!(f, "{field} references unknown id: {id}")
            }
            EngineError::MixedLocations => {
                write!(f, "pricing rows must all belong to the same location")
            }
            EngineError::CapacityExceeded {
                slot_type_id,
                available,
            } => {
                write!(
                    f,
                    "capacity exceeded for slot type {slot_type_id}: all {available} slots occupied"
                )
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::Validation { field, reason } => write!(f, "invalid {field}: {reason}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
