pub mod connection;
pub mod delivery;
pub mod presence;

pub use connection::{IdentityVerifier, handle_connection};
pub use delivery::{Delivery, DeliveryCoordinator};
pub use presence::{ConnectionHandle, PresenceDirectory};
