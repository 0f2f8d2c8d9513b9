/// Router Module Index
///
/// Splits the shell's HTTP surface by access requirement. Access control is
/// applied per module via Axum layers in `create_router`.

/// Routes usable without a session: health, navigation, login/logout.
pub mod public;

/// Routes that act on the active session.
/// Protected by the `ActiveSession` extractor middleware.
pub mod session;
