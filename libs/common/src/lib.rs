pub mod events;

pub use events::{Envelope, EventKind};

/// Opaque key for an authenticated principal. Issued by the auth service;
/// nothing in this workspace ever generates one.
pub type UserId = u64;

/// Opaque key for an organization (tenant).
pub type OrgId = u64;
