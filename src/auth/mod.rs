mod helpers;
mod middleware;
mod token;

pub use helpers::{authenticate, extract_bearer_token};
pub use middleware::{AuthError, MaybeUser, RequireUser};
pub use token::{TokenGenerator, parse_token};

use crate::types::{Session, User, Username};

/// The authenticated caller of a request.
///
/// Every write that touches per-user data takes its identity from here,
/// never from the request body.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user: User,
    pub session: Session,
}

impl AuthContext {
    #[must_use]
    pub fn username(&self) -> &Username {
        &self.user.username
    }
}
