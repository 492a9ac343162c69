//! Route classification
//!
//! Static configuration consumed by the gating pipeline: for every route,
//! whether it is school-scoped, whether it requires authentication, which
//! roles may call it, and which rate-limit class it belongs to. Domain
//! handlers never re-check any of this.

use crate::domain::Role;
use crate::ratelimit::RouteClass;
use std::collections::HashMap;

/// All roles, for routes any authenticated caller may use
pub const ALL_ROLES: &[Role] = &[
    Role::SuperAdmin,
    Role::SchoolAdmin,
    Role::Teacher,
    Role::Student,
    Role::Parent,
];

/// Teaching staff and above
pub const STAFF: &[Role] = &[Role::SuperAdmin, Role::SchoolAdmin, Role::Teacher];

/// School administration and above
pub const ADMINS: &[Role] = &[Role::SuperAdmin, Role::SchoolAdmin];

/// Platform operators only
pub const PLATFORM: &[Role] = &[Role::SuperAdmin];

/// Gating requirements for one route
#[derive(Debug, Clone, Copy)]
pub struct RouteClassification {
    /// Whether the Host header must resolve to a school
    pub requires_school: bool,
    /// Whether a valid bearer credential is required
    pub requires_auth: bool,
    /// Roles permitted on this route (ignored when `requires_auth` is false)
    pub allowed_roles: &'static [Role],
    /// Rate-limit class
    pub rate_class: RouteClass,
}

impl RouteClassification {
    const fn open(rate_class: RouteClass) -> Self {
        Self {
            requires_school: false,
            requires_auth: false,
            allowed_roles: ALL_ROLES,
            rate_class,
        }
    }

    const fn school_scoped(allowed_roles: &'static [Role], rate_class: RouteClass) -> Self {
        Self {
            requires_school: true,
            requires_auth: true,
            allowed_roles,
            rate_class,
        }
    }
}

/// Route classification table
///
/// Lookup is by `METHOD:path` with path parameters normalized to `{id}`.
/// Routes not listed fall back to the default: school-scoped, authenticated,
/// any role, `general` class.
pub struct RoutePolicies {
    routes: HashMap<String, RouteClassification>,
    default: RouteClassification,
}

impl RoutePolicies {
    /// The production route table
    pub fn standard() -> Self {
        let mut routes = HashMap::new();

        // Infrastructure endpoints: no tenant, no credential
        routes.insert(
            "GET:/health".to_string(),
            RouteClassification::open(RouteClass::General),
        );
        routes.insert(
            "GET:/ready".to_string(),
            RouteClassification::open(RouteClass::General),
        );
        routes.insert(
            "GET:/metrics".to_string(),
            RouteClassification::open(RouteClass::General),
        );

        // Credential flows: school-scoped but unauthenticated, auth class
        routes.insert(
            "POST:/api/v1/auth/login".to_string(),
            RouteClassification {
                requires_school: true,
                requires_auth: false,
                allowed_roles: ALL_ROLES,
                rate_class: RouteClass::Auth,
            },
        );
        routes.insert(
            "POST:/api/v1/auth/refresh".to_string(),
            RouteClassification {
                requires_school: true,
                requires_auth: false,
                allowed_roles: ALL_ROLES,
                rate_class: RouteClass::Auth,
            },
        );
        routes.insert(
            "GET:/api/v1/auth/me".to_string(),
            RouteClassification::school_scoped(ALL_ROLES, RouteClass::General),
        );

        // Domain routes served by downstream handlers
        routes.insert(
            "GET:/api/v1/students".to_string(),
            RouteClassification::school_scoped(STAFF, RouteClass::General),
        );
        routes.insert(
            "POST:/api/v1/students".to_string(),
            RouteClassification::school_scoped(STAFF, RouteClass::General),
        );
        routes.insert(
            "GET:/api/v1/students/{id}".to_string(),
            RouteClassification::school_scoped(STAFF, RouteClass::General),
        );
        routes.insert(
            "PUT:/api/v1/students/{id}".to_string(),
            RouteClassification::school_scoped(STAFF, RouteClass::General),
        );
        routes.insert(
            "DELETE:/api/v1/students/{id}".to_string(),
            RouteClassification::school_scoped(ADMINS, RouteClass::General),
        );
        routes.insert(
            "GET:/api/v1/classes".to_string(),
            RouteClassification::school_scoped(STAFF, RouteClass::General),
        );
        routes.insert(
            "POST:/api/v1/classes".to_string(),
            RouteClassification::school_scoped(ADMINS, RouteClass::General),
        );
        routes.insert(
            "PUT:/api/v1/classes/{id}".to_string(),
            RouteClassification::school_scoped(ADMINS, RouteClass::General),
        );
        routes.insert(
            "DELETE:/api/v1/classes/{id}".to_string(),
            RouteClassification::school_scoped(ADMINS, RouteClass::General),
        );
        routes.insert(
            "GET:/api/v1/teachers".to_string(),
            RouteClassification::school_scoped(ADMINS, RouteClass::General),
        );
        routes.insert(
            "POST:/api/v1/teachers".to_string(),
            RouteClassification::school_scoped(ADMINS, RouteClass::General),
        );
        routes.insert(
            "POST:/api/v1/schools".to_string(),
            RouteClassification::school_scoped(PLATFORM, RouteClass::General),
        );
        routes.insert(
            "DELETE:/api/v1/schools/{id}".to_string(),
            RouteClassification::school_scoped(PLATFORM, RouteClass::General),
        );

        Self {
            routes,
            default: RouteClassification {
                requires_school: true,
                requires_auth: true,
                allowed_roles: ALL_ROLES,
                rate_class: RouteClass::General,
            },
        }
    }

    /// Build a table from explicit entries (used in tests)
    pub fn with_routes(
        routes: HashMap<String, RouteClassification>,
        default: RouteClassification,
    ) -> Self {
        Self { routes, default }
    }

    /// Classify a request by method and path
    pub fn classify(&self, method: &str, path: &str) -> RouteClassification {
        let key = format!("{}:{}", method, normalize_path(path));
        self.routes.get(&key).copied().unwrap_or(self.default)
    }
}

/// Collapse concrete path parameters to `{id}` so lookups match the table
fn normalize_path(path: &str) -> String {
    if path.contains('{') {
        return path.to_string();
    }
    let normalized: Vec<String> = path
        .split('/')
        .map(|segment| {
            if segment.is_empty() {
                String::new()
            } else if segment.parse::<u64>().is_ok() || uuid::Uuid::parse_str(segment).is_ok() {
                "{id}".to_string()
            } else {
                segment.to_string()
            }
        })
        .collect();
    normalized.join("/")
}
