use std::error::Error;
use std::fmt;
use std::sync::PoisonError;

#[derive(Debug, Clone, PartialEq)]
pub enum ClassroomError {
    // Input errors
    InvalidInput(String),
    MessageParseError(String),

    // Registry lookups
    UnknownClass(String),
    UnknownGroup(String),
    UnknownUser(String),
    NameTaken(String),
    NotMember(String),

    // Store errors
    PersistenceError(String),

    // Admin secret mismatch, never surfaced to clients
    Unauthorized,

    // Plumbing errors
    SessionLock(String),
    ConfigError(String),
}

impl ClassroomError {
    /// Text delivered to the client inside a `server_error` event
    pub fn client_message(&self) -> String {
        match self {
            Self::InvalidInput(msg)
            | Self::MessageParseError(msg)
            | Self::PersistenceError(msg) => msg.clone(),
            Self::UnknownClass(id) => format!("Class ID {} is invalid.", id),
            Self::UnknownGroup(id) => format!("Group ID {} is invalid.", id),
            Self::UnknownUser(name) => format!("Username {} is invalid.", name),
            Self::NameTaken(name) => format!("Username {} is already taken.", name),
            Self::NotMember(name) => format!("Username {} is not a member of this group.", name),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for ClassroomError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            Self::MessageParseError(msg) => write!(f, "Message parse error: {}", msg),
            Self::UnknownClass(id) => write!(f, "Unknown class: {}", id),
            Self::UnknownGroup(id) => write!(f, "Unknown group: {}", id),
            Self::UnknownUser(name) => write!(f, "Unknown user: {}", name),
            Self::NameTaken(name) => write!(f, "Username already taken: {}", name),
            Self::NotMember(name) => write!(f, "Not a member of the group: {}", name),
            Self::PersistenceError(msg) => write!(f, "Persistence error: {}", msg),
            Self::Unauthorized => write!(f, "Unauthorized access"),
            Self::SessionLock(msg) => write!(f, "Session lock error: {}", msg),
            Self::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl Error for ClassroomError {}

// A poisoned registry lock means the in-memory state can no longer be trusted
impl<T> From<PoisonError<T>> for ClassroomError {
    fn from(err: PoisonError<T>) -> Self {
        ClassroomError::SessionLock(format!("Mutex poisoned: {}", err))
    }
}

impl From<serde_json::Error> for ClassroomError {
    fn from(err: serde_json::Error) -> Self {
        ClassroomError::MessageParseError(err.to_string())
    }
}

// Generic result type for the classroom server
pub type Result<T> = std::result::Result<T, ClassroomError>;
