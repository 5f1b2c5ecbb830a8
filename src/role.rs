//! Marketplace roles and the dashboard prefix each one owns.
//!
//! The role set is closed. Each role owns exactly one dashboard prefix and
//! is the only role served under it without redirection.

use serde::{Deserialize, Serialize};

/// Dashboard prefix owned by [`Role::Admin`].
pub const ADMIN_DASHBOARD: &str = "/admin-dashboard";
/// Dashboard prefix owned by [`Role::Student`].
pub const STUDENT_DASHBOARD: &str = "/student-dashboard";
/// Dashboard prefix owned by [`Role::Tutor`].
pub const TUTOR_DASHBOARD: &str = "/tutor-dashboard";

/// A caller's role as issued by the session provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Admin,
    Student,
    Tutor,
}

impl Role {
    /// All roles, in a stable order.
    pub const ALL: [Role; 3] = [Role::Admin, Role::Student, Role::Tutor];

    /// Parse the wire representation. Matching is exact: the provider
    /// issues upper-case values and anything else is not a role.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ADMIN" => Some(Role::Admin),
            "STUDENT" => Some(Role::Student),
            "TUTOR" => Some(Role::Tutor),
            _ => None,
        }
    }

    /// Wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Student => "STUDENT",
            Role::Tutor => "TUTOR",
        }
    }

    /// The dashboard prefix this role owns.
    pub fn dashboard(&self) -> &'static str {
        match self {
            Role::Admin => ADMIN_DASHBOARD,
            Role::Student => STUDENT_DASHBOARD,
            Role::Tutor => TUTOR_DASHBOARD,
        }
    }

    /// Whether `path` falls under a dashboard owned by some *other* role.
    ///
    /// Uses plain prefix comparison so nested pages inherit the root's rule.
    pub fn is_foreign_dashboard(&self, path: &str) -> bool {
        Role::ALL
            .iter()
            .filter(|other| *other != self)
            .any(|other| path.starts_with(other.dashboard()))
    }

    /// Sidebar navigation for this role's dashboard.
    pub fn navigation(&self) -> Vec<NavGroup> {
        match self {
            Role::Admin => vec![
                NavGroup::new("Dashboard", &[("Statistics", "/admin-dashboard/")]),
                NavGroup::new("Users", &[("Manage Users", "/admin-dashboard/users")]),
                NavGroup::new("Bookings", &[("All Bookings", "/admin-dashboard/bookings")]),
                NavGroup::new(
                    "Categories",
                    &[("Manage Categories", "/admin-dashboard/categories")],
                ),
            ],
            Role::Student => vec![NavGroup::new(
                "Dashboard",
                &[
                    ("Home", "/student-dashboard/"),
                    ("MyBookings", "/student-dashboard/MyBookings"),
                    ("Profile", "/student-dashboard/StudentProfileEdit"),
                ],
            )],
            Role::Tutor => vec![NavGroup::new(
                "Dashboard",
                &[
                    ("Home", "/tutor-dashboard/"),
                    ("CreateProfile", "/tutor-dashboard/CreateProfile"),
                    ("My Booking", "/tutor-dashboard/MyBooking"),
                ],
            )],
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A titled group of sidebar links.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NavGroup {
    pub title: String,
    pub items: Vec<NavItem>,
}

/// A single sidebar link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NavItem {
    pub title: String,
    pub url: String,
}

impl NavGroup {
    fn new(title: &str, items: &[(&str, &str)]) -> Self {
        Self {
            title: title.to_string(),
            items: items
                .iter()
                .map(|(title, url)| NavItem {
                    title: title.to_string(),
                    url: url.to_string(),
                })
                .collect(),
        }
    }
}
