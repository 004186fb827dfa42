pub mod health;
pub mod password;
pub mod payload;
pub mod session;

pub use health::health_check;
pub use session::{sign_in, sign_out, validate_token};
