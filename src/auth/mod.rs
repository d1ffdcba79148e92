// Authentication module
// Verifies HS256 bearer tokens issued by the auth service; carts are owned by the token subject

pub mod error;
pub mod middleware;
pub mod token;

// Re-export commonly used types
pub use error::AuthError;
pub use middleware::{AuthenticatedUser, MaybeUser};
pub use token::{Claims, TokenService};
