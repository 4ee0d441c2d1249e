use reactor_http::protocol::ParsedMessage;

/// Name given to requests let through by [`AllowAll`].
pub const ANONYMOUS: &str = "anonymous";

/// The verdict on the credentials of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    Authenticated(String),
    /// The credentials are malformed, answered with 400.
    BadRequest,
    /// The credentials are missing or wrong, answered with 401 and a fresh challenge.
    Unauthorized,
}

/// Looks up the stored password of a user.
#[cfg_attr(test, mockall::automock)]
pub trait UserResolver {
    fn resolve_user(&self, name: &str) -> Option<String>;
}

/// Checks the `Authorization` header of a request against the users of a domain.
///
/// How credentials are verified is up to the implementation. The server only consumes the
/// outcome and, for every 401 it sends, hands the nonce of the challenge to
/// [`register_nonce`](Authenticator::register_nonce).
#[cfg_attr(test, mockall::automock)]
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, message: &ParsedMessage, domain: &str, users: &dyn UserResolver) -> AuthOutcome;

    fn register_nonce(&self, nonce: &str);
}

/// Accepts every request as [`ANONYMOUS`].
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl Authenticator for AllowAll {
    fn authenticate(&self, _message: &ParsedMessage, _domain: &str, _users: &dyn UserResolver) -> AuthOutcome {
        AuthOutcome::Authenticated(ANONYMOUS.to_string())
    }

    fn register_nonce(&self, _nonce: &str) {}
}
