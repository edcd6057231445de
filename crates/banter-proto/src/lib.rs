pub mod protocol;

/// Name of the session cookie carried on the WebSocket handshake and API calls.
pub const SESSION_COOKIE: &str = "user_session";
