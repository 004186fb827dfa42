pub mod auth;
pub mod credential_update;
pub mod email;
pub mod identity;
pub mod password;
pub mod password_reset;
pub mod redirect;
pub mod token_codec;
pub mod token_store;

pub use auth::AuthService;
pub use credential_update::{CredentialUpdateService, UpdatePassword};
pub use email::{LogMailer, MemoryMailer, ResetMailer};
pub use password_reset::{PasswordResetService, RedeemRequest, ResetRequest};
pub use token_store::TokenStore;
