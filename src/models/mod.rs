pub mod auth_token;
pub mod resource;
pub mod reset_token;

pub use auth_token::AuthTokenEntry;
pub use resource::{ConfirmationState, NewResource, Resource};
pub use reset_token::{ResetArtifact, ResetTokenRecord};
