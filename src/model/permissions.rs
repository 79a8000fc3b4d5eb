//! Role to module allow-lists.

use serde_json::Map;

use super::RolePermission;

pub const MODULE_DASHBOARD: &str = "dashboard";
pub const MODULE_INVENTORY: &str = "inventory";
pub const MODULE_ORDERS: &str = "orders";
pub const MODULE_CUSTOMERS: &str = "customers";
pub const MODULE_USERS: &str = "users";
pub const MODULE_NOTIFICATIONS: &str = "notifications";
pub const MODULE_REPORTS: &str = "reports";
pub const MODULE_SETTINGS: &str = "settings";

/// The five console roles, most privileged first.
pub const ROLES: [&str; 5] = ["admin", "manager", "supervisor", "staff", "viewer"];

/// Built-in allow-list for `role`, empty for unknown roles.
pub fn default_modules(role: &str) -> &'static [&'static str] {
  match role {
    "admin" => &[
      MODULE_DASHBOARD,
      MODULE_INVENTORY,
      MODULE_ORDERS,
      MODULE_CUSTOMERS,
      MODULE_USERS,
      MODULE_NOTIFICATIONS,
      MODULE_REPORTS,
      MODULE_SETTINGS,
    ],
    "manager" => &[
      MODULE_DASHBOARD,
      MODULE_INVENTORY,
      MODULE_ORDERS,
      MODULE_CUSTOMERS,
      MODULE_NOTIFICATIONS,
      MODULE_REPORTS,
    ],
    "supervisor" => &[
      MODULE_DASHBOARD,
      MODULE_INVENTORY,
      MODULE_ORDERS,
      MODULE_NOTIFICATIONS,
    ],
    "staff" => &[MODULE_DASHBOARD, MODULE_INVENTORY, MODULE_NOTIFICATIONS],
    "viewer" => &[MODULE_DASHBOARD],
    _ => &[],
  }
}

/// Default mapping as records, keyed by role name.
pub fn default_permissions() -> Vec<RolePermission> {
  ROLES
    .iter()
    .map(|role| RolePermission {
      id: Some(role.to_string()),
      instance_id: None,
      updated_at: None,
      modules: default_modules(role).iter().map(|m| m.to_string()).collect(),
      extra: Map::new(),
    })
    .collect()
}

/// Modules allowed for `role`, preferring a stored record over the default.
pub fn resolve(role: &str, stored: &[RolePermission]) -> Vec<String> {
  stored
    .iter()
    .find(|p| p.id.as_deref() == Some(role))
    .map(|p| p.modules.clone())
    .unwrap_or_else(|| default_modules(role).iter().map(|m| m.to_string()).collect())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_every_role_can_see_dashboard() {
    for role in ROLES {
      assert!(default_modules(role).contains(&MODULE_DASHBOARD), "{role}");
    }
  }

  #[test]
  fn test_unknown_role_gets_nothing() {
    assert!(resolve("intern", &[]).is_empty());
  }

  #[test]
  fn test_stored_record_wins() {
    let stored = vec![RolePermission {
      id: Some("staff".into()),
      modules: vec!["orders".into()],
      ..RolePermission::default()
    }];
    assert_eq!(resolve("staff", &stored), vec!["orders"]);
    assert_eq!(resolve("viewer", &stored), vec!["dashboard"]);
  }
}
