//! `tradeflow-auth`: authentication and authorization boundary.
//!
//! Token verification, the role → permission policy and the users directory.
//! Decoupled from HTTP and storage.

pub mod authorize;
pub mod claims;
pub mod jwt;
pub mod permissions;
pub mod policy;
pub mod roles;
pub mod user;

pub use authorize::{AuthzError, CommandAuthorization, Principal, TenantMembership, authorize};
pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use jwt::{Hs256JwtValidator, JwtError, JwtValidator};
pub use permissions::Permission;
pub use policy::{BUILTIN_ROLES, default_role_permissions, permissions_for_roles};
pub use roles::Role;
pub use user::{
    ActivateUser, AssignRole, CreateUser, RevokeRole, SuspendUser, User, UserCommand, UserEvent,
    UserStatus, user_stream_id,
};
