pub mod auth;
pub mod blocking;
pub mod conversations;
pub mod error;
pub mod messages;
pub mod middleware;
pub mod notify;
pub mod password;
pub mod session;
pub mod state;
pub mod tokens;
pub mod validate;

pub use error::{ApiError, ErrorKind};
pub use state::{AppState, AppStateInner};
