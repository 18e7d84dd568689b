//! TrustDesk Core - shared types for the trust & risk subsystem
//!
//! - [`ids`]: typed `Uuid` identifiers
//! - [`money`]: `Money` / `Currency` inputs consumed by risk scoring
//! - [`clock`]: `Clock` and `IdGenerator` collaborators
//! - [`error`]: the `TrustError` taxonomy

pub mod clock;
pub mod error;
pub mod ids;
pub mod money;

pub use clock::{Clock, IdGenerator, ManualClock, RandomIds, SequentialIds, SystemClock};
pub use error::{ErrorKind, TrustError, TrustResult};
pub use ids::{AuditId, BookingId, DisputeId, UserId, VerificationId};
pub use money::{Currency, Money, MoneyError};
