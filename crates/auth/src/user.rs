//! User directory aggregate (event-sourced).
//!
//! Users are tenant-scoped. Their roles feed both permission checks and
//! approval route matching, so role changes are audited like any document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tradeflow_core::{Aggregate, AggregateId, AggregateRoot, DomainError, TenantId, UserId};
use tradeflow_events::Event;

use crate::Role;

/// Event stream id of a user's directory entry.
pub fn user_stream_id(user_id: UserId) -> AggregateId {
    AggregateId::from_uuid(*user_id.as_uuid())
}

fn normalize_role(role: &Role) -> Result<Role, DomainError> {
    let name = role.as_str().trim().to_lowercase();
    if name.is_empty() {
        return Err(DomainError::validation("role name cannot be empty"));
    }
    if name.chars().any(char::is_whitespace) {
        return Err(DomainError::validation("role name cannot contain whitespace"));
    }
    Ok(Role::new(name))
}

// ─────────────────────────────────────────────────────────────────────────────
// User Status
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    #[default]
    Active,
    /// Refused by the API even when presenting a valid token.
    Suspended,
}

impl UserStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            UserStatus::Active => "active",
            UserStatus::Suspended => "suspended",
        }
    }
}

impl core::fmt::Display for UserStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// User Aggregate
// ─────────────────────────────────────────────────────────────────────────────

/// # Invariants
/// - A user belongs to exactly one tenant (tenant_id is immutable after creation).
/// - Email is unique per tenant (enforced by the directory read model on create).
/// - Suspended users cannot be granted roles.
/// - Non-admin actors can only grant roles they hold themselves.
#[derive(Debug, Clone)]
pub struct User {
    pub id: UserId,
    pub tenant_id: Option<TenantId>,
    pub email: String,
    pub display_name: String,
    pub roles: Vec<Role>,
    pub status: UserStatus,
    pub version: u64,
    pub created: bool,
}

impl User {
    pub fn empty(id: UserId) -> Self {
        Self {
            id,
            tenant_id: None,
            email: String::new(),
            display_name: String::new(),
            roles: Vec::new(),
            status: UserStatus::Active,
            version: 0,
            created: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.created && self.status == UserStatus::Active
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r.as_str() == role)
    }

    fn ensure_existing(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::NotFound);
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }
}

impl AggregateRoot for User {
    type Id = UserId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUser {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub email: String,
    pub display_name: String,
    pub initial_roles: Vec<Role>,
    /// Roles of the acting administrator (escalation check).
    pub actor_roles: Vec<Role>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignRole {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub role: Role,
    pub actor_roles: Vec<Role>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevokeRole {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub role: Role,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuspendUser {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivateUser {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum UserCommand {
    Create(CreateUser),
    AssignRole(AssignRole),
    RevokeRole(RevokeRole),
    Suspend(SuspendUser),
    Activate(ActivateUser),
}

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserCreated {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub email: String,
    pub display_name: String,
    pub roles: Vec<Role>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleAssigned {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub role: Role,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleRevoked {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub role: Role,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSuspended {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserActivated {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum UserEvent {
    Created(UserCreated),
    RoleAssigned(RoleAssigned),
    RoleRevoked(RoleRevoked),
    Suspended(UserSuspended),
    Activated(UserActivated),
}

impl Event for UserEvent {
    fn event_type(&self) -> &'static str {
        match self {
            UserEvent::Created(_) => "auth.user.created",
            UserEvent::RoleAssigned(_) => "auth.user.role_assigned",
            UserEvent::RoleRevoked(_) => "auth.user.role_revoked",
            UserEvent::Suspended(_) => "auth.user.suspended",
            UserEvent::Activated(_) => "auth.user.activated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            UserEvent::Created(e) => e.occurred_at,
            UserEvent::RoleAssigned(e) => e.occurred_at,
            UserEvent::RoleRevoked(e) => e.occurred_at,
            UserEvent::Suspended(e) => e.occurred_at,
            UserEvent::Activated(e) => e.occurred_at,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Aggregate Implementation
// ─────────────────────────────────────────────────────────────────────────────

impl Aggregate for User {
    type Command = UserCommand;
    type Event = UserEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            UserEvent::Created(e) => {
                self.id = e.user_id;
                self.tenant_id = Some(e.tenant_id);
                self.email = e.email.clone();
                self.display_name = e.display_name.clone();
                self.roles = e.roles.clone();
                self.status = UserStatus::Active;
                self.created = true;
            }
            UserEvent::RoleAssigned(e) => self.roles.push(e.role.clone()),
            UserEvent::RoleRevoked(e) => self.roles.retain(|r| r != &e.role),
            UserEvent::Suspended(_) => self.status = UserStatus::Suspended,
            UserEvent::Activated(_) => self.status = UserStatus::Active,
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            UserCommand::Create(cmd) => self.handle_create(cmd),
            UserCommand::AssignRole(cmd) => self.handle_assign_role(cmd),
            UserCommand::RevokeRole(cmd) => self.handle_revoke_role(cmd),
            UserCommand::Suspend(cmd) => self.handle_suspend(cmd),
            UserCommand::Activate(cmd) => self.handle_activate(cmd),
        }
    }
}

/// Privilege escalation guard: admins grant anything, others only what they hold.
fn ensure_may_grant(actor_roles: &[Role], role: &Role) -> Result<(), DomainError> {
    if actor_roles.iter().any(Role::is_admin) || actor_roles.contains(role) {
        Ok(())
    } else {
        Err(DomainError::Unauthorized)
    }
}

impl User {
    fn handle_create(&self, cmd: &CreateUser) -> Result<Vec<UserEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("user already exists"));
        }

        let email = cmd.email.trim().to_lowercase();
        let valid_email = email
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
        if !valid_email {
            return Err(DomainError::validation("invalid email format"));
        }
        if cmd.display_name.trim().is_empty() {
            return Err(DomainError::validation("display name cannot be empty"));
        }

        let mut roles: Vec<Role> = Vec::with_capacity(cmd.initial_roles.len());
        for role in &cmd.initial_roles {
            let role = normalize_role(role)?;
            ensure_may_grant(&cmd.actor_roles, &role)?;
            if !roles.contains(&role) {
                roles.push(role);
            }
        }

        Ok(vec![UserEvent::Created(UserCreated {
            tenant_id: cmd.tenant_id,
            user_id: cmd.user_id,
            email,
            display_name: cmd.display_name.trim().to_string(),
            roles,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_assign_role(&self, cmd: &AssignRole) -> Result<Vec<UserEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id)?;
        if self.status == UserStatus::Suspended {
            return Err(DomainError::invariant("user is suspended"));
        }
        let role = normalize_role(&cmd.role)?;
        if self.roles.contains(&role) {
            return Err(DomainError::conflict("role already assigned"));
        }
        ensure_may_grant(&cmd.actor_roles, &role)?;

        Ok(vec![UserEvent::RoleAssigned(RoleAssigned {
            tenant_id: cmd.tenant_id,
            user_id: cmd.user_id,
            role,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_revoke_role(&self, cmd: &RevokeRole) -> Result<Vec<UserEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id)?;
        let role = normalize_role(&cmd.role)?;
        if !self.roles.contains(&role) {
            return Err(DomainError::invariant("role not assigned"));
        }

        Ok(vec![UserEvent::RoleRevoked(RoleRevoked {
            tenant_id: cmd.tenant_id,
            user_id: cmd.user_id,
            role,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_suspend(&self, cmd: &SuspendUser) -> Result<Vec<UserEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id)?;
        if self.status == UserStatus::Suspended {
            return Err(DomainError::invariant("user already suspended"));
        }

        Ok(vec![UserEvent::Suspended(UserSuspended {
            tenant_id: cmd.tenant_id,
            user_id: cmd.user_id,
            reason: cmd.reason.trim().to_string(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_activate(&self, cmd: &ActivateUser) -> Result<Vec<UserEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id)?;
        if self.status == UserStatus::Active {
            return Err(DomainError::invariant("user already active"));
        }

        Ok(vec![UserEvent::Activated(UserActivated {
            tenant_id: cmd.tenant_id,
            user_id: cmd.user_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tradeflow_events::execute;

    fn admin() -> Vec<Role> {
        vec![Role::new("admin")]
    }

    fn created(tenant_id: TenantId, roles: &[&'static str]) -> User {
        let user_id = UserId::new();
        let mut user = User::empty(user_id);
        execute(
            &mut user,
            &UserCommand::Create(CreateUser {
                tenant_id,
                user_id,
                email: " Alice@Example.com ".to_string(),
                display_name: "Alice Smith".to_string(),
                initial_roles: roles.iter().map(|r| Role::new(*r)).collect(),
                actor_roles: admin(),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        user
    }

    fn assign(user: &User, tenant_id: TenantId, role: &'static str, actor_roles: Vec<Role>) -> Result<Vec<UserEvent>, DomainError> {
        user.handle(&UserCommand::AssignRole(AssignRole {
            tenant_id,
            user_id: user.id,
            role: Role::new(role),
            actor_roles,
            occurred_at: Utc::now(),
        }))
    }

    #[test]
    fn create_normalizes_email_and_roles() {
        let tenant_id = TenantId::new();
        let user = created(tenant_id, &["Purchaser", "purchaser"]);
        assert_eq!(user.email, "alice@example.com");
        assert_eq!(user.roles, vec![Role::new("purchaser")]);
        assert!(user.is_active());
    }

    #[test]
    fn create_rejects_invalid_email() {
        let user_id = UserId::new();
        let err = User::empty(user_id)
            .handle(&UserCommand::Create(CreateUser {
                tenant_id: TenantId::new(),
                user_id,
                email: "invalid-email".to_string(),
                display_name: "Alice".to_string(),
                initial_roles: vec![],
                actor_roles: admin(),
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn non_admin_cannot_grant_roles_they_lack() {
        let tenant_id = TenantId::new();
        let user = created(tenant_id, &[]);
        let err = assign(&user, tenant_id, "admin", vec![Role::new("manager")]).unwrap_err();
        assert_eq!(err, DomainError::Unauthorized);
        assert!(assign(&user, tenant_id, "manager", vec![Role::new("manager")]).is_ok());
    }

    #[test]
    fn suspended_user_cannot_be_granted_roles_until_activated() {
        let tenant_id = TenantId::new();
        let mut user = created(tenant_id, &["user"]);
        let user_id = user.id;
        execute(
            &mut user,
            &UserCommand::Suspend(SuspendUser {
                tenant_id,
                user_id,
                reason: "left the company".to_string(),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        assert!(!user.is_active());
        let err = assign(&user, tenant_id, "manager", admin()).unwrap_err();
        assert!(err.to_string().contains("suspended"));

        execute(
            &mut user,
            &UserCommand::Activate(ActivateUser {
                tenant_id,
                user_id,
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        assert_eq!(user.status, UserStatus::Active);
    }

    #[test]
    fn tenant_isolation_enforced() {
        let user = created(TenantId::new(), &[]);
        let err = assign(&user, TenantId::new(), "manager", admin()).unwrap_err();
        assert!(err.to_string().contains("tenant"));
    }

    #[test]
    fn revoke_role() {
        let tenant_id = TenantId::new();
        let mut user = created(tenant_id, &["manager", "purchaser"]);
        let user_id = user.id;
        execute(
            &mut user,
            &UserCommand::RevokeRole(RevokeRole {
                tenant_id,
                user_id,
                role: Role::new("manager"),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        assert!(!user.has_role("manager"));
        assert!(user.has_role("purchaser"));
        assert_eq!(user.version, 2);
    }
}
