//! Role-based route access control.
//!
//! Route access is decided by comparing the profile's role against a
//! per-route allow-list. Authenticated-but-unauthorized access resolves to
//! [`RouteAccess::NotFound`] rather than a "forbidden" page, so the
//! existence of restricted routes is never confirmed to users who cannot
//! reach them.

use frozen_mango_core::Role;

/// Outcome of an access check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteAccess {
    /// Render the route.
    Granted,
    /// No session; send the user to the login view.
    Login,
    /// Unknown route, or a role outside the allow-list. Render not-found.
    NotFound,
}

/// Any authenticated role.
const ANY_ROLE: &[Role] = &[Role::Customer, Role::Staff, Role::Admin];

/// Operations roles only.
const OPERATIONS: &[Role] = &[Role::Staff, Role::Admin];

struct RouteRule {
    path: &'static str,
    /// `None` means public; otherwise the roles allowed through.
    allowed: Option<&'static [Role]>,
}

/// The shop's route table. Nested paths (`/products/3`,
/// `/profile/orders/7`) inherit their parent's rule.
const ROUTES: &[RouteRule] = &[
    RouteRule { path: "/", allowed: None },
    RouteRule { path: "/products", allowed: None },
    RouteRule { path: "/cart", allowed: None },
    RouteRule { path: "/checkout", allowed: None },
    RouteRule { path: "/order-confirmed", allowed: None },
    RouteRule { path: "/about", allowed: None },
    RouteRule { path: "/location", allowed: None },
    RouteRule { path: "/contact", allowed: None },
    RouteRule { path: "/login", allowed: None },
    RouteRule { path: "/profile", allowed: Some(ANY_ROLE) },
    RouteRule { path: "/operations", allowed: Some(OPERATIONS) },
];

/// Decide whether `role` may see `path`.
#[must_use]
pub fn resolve(path: &str, role: Option<Role>) -> RouteAccess {
    let normalized = path.split(['?', '#']).next().unwrap_or(path);
    let Some(rule) = ROUTES
        .iter()
        .find(|rule| path_matches(rule.path, normalized))
    else {
        return RouteAccess::NotFound;
    };

    match rule.allowed {
        None => RouteAccess::Granted,
        Some(allowed) => match role {
            None => RouteAccess::Login,
            Some(role) if allowed.contains(&role) => RouteAccess::Granted,
            // Deliberately indistinguishable from a route that does not exist
            Some(_) => RouteAccess::NotFound,
        },
    }
}

/// Exact match, or a nested path under the rule (`/profile/orders/7`).
fn path_matches(rule: &str, path: &str) -> bool {
    if path == rule {
        return true;
    }
    rule != "/" && path.starts_with(rule) && path.as_bytes().get(rule.len()) == Some(&b'/')
}
