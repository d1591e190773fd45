use std::fmt;
use std::str::FromStr;

use crate::auth::responses::Role;
use crate::auth::session::{SessionPhase, SessionSnapshot};

/// Screens of the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Login,
    Dashboard,
    Classes,
    Students,
    Fees,
    Users,
    Profile,
}

impl Route {
    pub const ALL: [Route; 7] = [
        Route::Login,
        Route::Dashboard,
        Route::Classes,
        Route::Students,
        Route::Fees,
        Route::Users,
        Route::Profile,
    ];

    /// Entry screen unauthenticated visitors are sent to.
    pub const ENTRY: Route = Route::Login;

    pub fn path(&self) -> &'static str {
        match self {
            Route::Login => "/login",
            Route::Dashboard => "/",
            Route::Classes => "/classes",
            Route::Students => "/students",
            Route::Fees => "/fees",
            Route::Users => "/users",
            Route::Profile => "/profile",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Route::Login => "Login",
            Route::Dashboard => "Dashboard",
            Route::Classes => "Classes",
            Route::Students => "Students",
            Route::Fees => "Fees",
            Route::Users => "Users",
            Route::Profile => "Profile",
        }
    }

    pub fn is_public(&self) -> bool {
        matches!(self, Route::Login)
    }

    pub fn requires_admin(&self) -> bool {
        matches!(self, Route::Classes | Route::Users)
    }

    pub fn gate(&self) -> AccessGate {
        AccessGate::new(self.requires_admin())
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

impl FromStr for Route {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let needle = value.trim();
        let normalized = needle.trim_start_matches('/');
        Route::ALL
            .into_iter()
            .find(|route| {
                route.path().trim_start_matches('/') == normalized
                    || route.title().eq_ignore_ascii_case(normalized)
            })
            .ok_or_else(|| format!("unknown route '{needle}'"))
    }
}

/// Menu entries visible to a role, in display order.
pub fn navigation_for(role: Role) -> Vec<Route> {
    Route::ALL
        .into_iter()
        .filter(|route| !route.is_public())
        .filter(|route| role == Role::Admin || !route.requires_admin())
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Loading,
    /// Go to `to`, replacing the history entry of the guarded screen.
    Redirect { to: Route, replace: bool },
    AccessDenied,
    Admit,
}

/// Outcome of guarding a screen, carrying the content only when admitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Guarded<V> {
    Loading,
    Redirect { to: Route, replace: bool },
    AccessDenied,
    Content(V),
}

impl<V> Guarded<V> {
    pub fn decision(&self) -> GateDecision {
        match self {
            Guarded::Loading => GateDecision::Loading,
            Guarded::Redirect { to, replace } => GateDecision::Redirect {
                to: *to,
                replace: *replace,
            },
            Guarded::AccessDenied => GateDecision::AccessDenied,
            Guarded::Content(_) => GateDecision::Admit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AccessGate {
    pub require_admin: bool,
}

impl AccessGate {
    pub fn new(require_admin: bool) -> Self {
        Self { require_admin }
    }

    // Bootstrap, then authentication, then role. Checking the role first
    // would deny admins during the bootstrap window.
    pub fn decide(&self, session: &SessionSnapshot) -> GateDecision {
        match session.phase() {
            SessionPhase::Bootstrapping => GateDecision::Loading,
            SessionPhase::Anonymous => GateDecision::Redirect {
                to: Route::ENTRY,
                replace: true,
            },
            SessionPhase::Authenticated if self.require_admin && !session.is_admin() => {
                GateDecision::AccessDenied
            }
            SessionPhase::Authenticated => GateDecision::Admit,
        }
    }

    /// Builds the protected content only when the session is admitted.
    pub fn guard<V>(&self, session: &SessionSnapshot, content: impl FnOnce() -> V) -> Guarded<V> {
        match self.decide(session) {
            GateDecision::Loading => Guarded::Loading,
            GateDecision::Redirect { to, replace } => Guarded::Redirect { to, replace },
            GateDecision::AccessDenied => Guarded::AccessDenied,
            GateDecision::Admit => Guarded::Content(content()),
        }
    }
}
