//! Permission names known to the service.
//!
//! Seeded by the initial migration; the evaluator itself treats permission
//! names as opaque strings.

pub const ORG_VIEW_HEALTH: &str = "org:view_health";
pub const ORG_INVITE_USER: &str = "org:invite_user";
pub const ORG_VIEW_MEMBERS: &str = "org:view_members";
pub const ORG_DELETE: &str = "org:delete";
pub const ORG_UPDATE: &str = "org:update";

pub const USER_CREATE: &str = "user:create";
pub const USER_VIEW: &str = "user:view";
pub const USER_UPDATE: &str = "user:update";
pub const USER_DELETE: &str = "user:delete";
pub const USER_UPDATE_PERMISSION: &str = "user:update_permission";
pub const USER_UPDATE_ROLE: &str = "user:update_role";

/// Every permission in the catalog.
pub const ALL: &[&str] = &[
    ORG_VIEW_HEALTH,
    ORG_INVITE_USER,
    ORG_VIEW_MEMBERS,
    ORG_DELETE,
    ORG_UPDATE,
    USER_CREATE,
    USER_VIEW,
    USER_UPDATE,
    USER_DELETE,
    USER_UPDATE_PERMISSION,
    USER_UPDATE_ROLE,
];
