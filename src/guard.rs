//! Route guarding and layout classification.
//!
//! Pure functions over `(path, is_authenticated)`: callers re-evaluate on
//! every navigation and every session change rather than caching a
//! one-time answer.

/// Routes reachable without a session. Matched exactly, not by prefix.
pub const PUBLIC_ROUTES: [&str; 2] = ["/login", "/signup"];

/// Route prefixes that render inside the admin shell.
const DASHBOARD_PREFIXES: [&str; 4] = [
    "/dashboard",
    "/accounts",
    "/service-health",
    "/support-tickets",
];

/// What navigation should do for a path given the current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    /// Path and session agree; show the page.
    Render,
    /// Protected path without a session.
    RedirectToLogin,
    /// Auth page with a live session; nothing to do there.
    RedirectToDashboard,
}

pub fn is_public_route(path: &str) -> bool {
    PUBLIC_ROUTES.contains(&path)
}

/// Decide whether `path` renders or redirects for a session in the given
/// state.
pub fn decide(path: &str, is_authenticated: bool) -> RouteDecision {
    let public = is_public_route(path);
    if !is_authenticated && !public {
        RouteDecision::RedirectToLogin
    } else if is_authenticated && public {
        RouteDecision::RedirectToDashboard
    } else {
        RouteDecision::Render
    }
}

/// Which shell a path renders in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// Auth pages; they bring their own centering.
    Bare,
    /// Admin pages; edge-to-edge inside the navigation shell.
    FullBleed,
    /// Everything else; a centered single-column card.
    Centered,
}

pub fn layout_for(path: &str) -> Layout {
    if DASHBOARD_PREFIXES
        .iter()
        .any(|prefix| path.starts_with(prefix))
    {
        Layout::FullBleed
    } else if is_public_route(path) {
        Layout::Bare
    } else {
        Layout::Centered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthenticated_visitors_are_sent_to_login() {
        assert_eq!(decide("/dashboard", false), RouteDecision::RedirectToLogin);
        assert_eq!(decide("/accounts", false), RouteDecision::RedirectToLogin);
        assert_eq!(decide("/", false), RouteDecision::RedirectToLogin);
        assert_eq!(decide("/anything-else", false), RouteDecision::RedirectToLogin);
    }

    #[test]
    fn unauthenticated_visitors_may_use_auth_pages() {
        assert_eq!(decide("/login", false), RouteDecision::Render);
        assert_eq!(decide("/signup", false), RouteDecision::Render);
    }

    #[test]
    fn authenticated_users_render_protected_pages() {
        assert_eq!(decide("/dashboard", true), RouteDecision::Render);
        assert_eq!(decide("/support-tickets/t1", true), RouteDecision::Render);
    }

    #[test]
    fn authenticated_users_skip_auth_pages() {
        assert_eq!(decide("/login", true), RouteDecision::RedirectToDashboard);
        assert_eq!(decide("/signup", true), RouteDecision::RedirectToDashboard);
    }

    #[test]
    fn public_match_is_exact_not_prefix() {
        assert!(!is_public_route("/login/reset"));
        assert_eq!(decide("/login/reset", false), RouteDecision::RedirectToLogin);
    }

    #[test]
    fn decision_flips_when_the_session_changes() {
        // Same path, before and after login.
        assert_eq!(decide("/accounts", false), RouteDecision::RedirectToLogin);
        assert_eq!(decide("/accounts", true), RouteDecision::Render);
        // Session cleared by a 401 while the user sits on an admin page.
        assert_eq!(decide("/service-health", false), RouteDecision::RedirectToLogin);
    }

    #[test]
    fn admin_pages_use_the_full_bleed_shell() {
        assert_eq!(layout_for("/dashboard"), Layout::FullBleed);
        assert_eq!(layout_for("/accounts/a1"), Layout::FullBleed);
        assert_eq!(layout_for("/service-health"), Layout::FullBleed);
        assert_eq!(layout_for("/support-tickets?page=2"), Layout::FullBleed);
    }

    #[test]
    fn auth_pages_are_bare_and_the_rest_centered() {
        assert_eq!(layout_for("/login"), Layout::Bare);
        assert_eq!(layout_for("/signup"), Layout::Bare);
        assert_eq!(layout_for("/settings"), Layout::Centered);
        assert_eq!(layout_for("/"), Layout::Centered);
    }
}
