pub mod config;
pub mod domain;
pub mod errors;

pub use domain::conversation::{ConversationSession, ConversationTurn, Role, SessionId};
pub use domain::passage::RetrievedPassage;
pub use errors::{ApplicationError, DomainError, InterfaceError};
