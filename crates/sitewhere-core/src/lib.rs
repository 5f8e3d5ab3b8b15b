//! Shared concerns for the SiteWhere device crates: tracing setup and
//! device identity.

pub mod identity;
pub mod tracing;

pub use identity::{IdentityError, IdentityProvider, MachineIdentity, StaticIdentity};
pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
