//! User Operations
//!
//! Use cases for user provisioning and OAuth identity reconciliation.

pub mod create_user_for_agency;
pub mod resolve_identity_conflict;

pub use create_user_for_agency::{CreateUserForAgencyCommand, CreateUserForAgencyUseCase};
pub use resolve_identity_conflict::{
    ResolveIdentityConflictCommand, ResolveIdentityConflictUseCase,
};
