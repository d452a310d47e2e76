// Route guards

use chrono::Utc;
use log::info;

use super::session::{Action, Role, Session};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Login,
    Dashboard,
    AdminHome,
}

impl Role {
    /// Landing page for the role.
    pub fn home(&self) -> Route {
        match self {
            Role::Member => Route::Dashboard,
            Role::Admin | Role::SuperAdmin => Route::AdminHome,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    Redirect(Route),
    AccessDenied { module: String },
}

/// Signed-in users with one of `roles`; others go to login or their own home.
pub fn protected_route(session: Option<&Session>, roles: &[Role]) -> GuardDecision {
    let Some(session) = session else {
        return GuardDecision::Redirect(Route::Login);
    };
    if session.is_expired_at(Utc::now()) {
        info!("[PHASE: auth] [STEP: guard] Session expired; redirecting to login");
        return GuardDecision::Redirect(Route::Login);
    }
    if !roles.contains(&session.role) {
        return GuardDecision::Redirect(session.role.home());
    }
    GuardDecision::Allow
}

/// The intake wizard is for members whose application is still a draft.
pub fn application_guard(session: Option<&Session>) -> GuardDecision {
    match protected_route(session, &[Role::Member]) {
        GuardDecision::Allow => {}
        other => return other,
    }
    match session.and_then(|s| s.application_status) {
        Some(status) if !status.is_editable() => {
            info!(
                "[PHASE: auth] [STEP: guard] Application is {:?}; wizard closed",
                status
            );
            GuardDecision::Redirect(Route::Dashboard)
        }
        _ => GuardDecision::Allow,
    }
}

/// Capability check for admin screens; failures render an access-denied view.
pub fn with_permission(session: Option<&Session>, module: &str, action: Action) -> GuardDecision {
    match protected_route(session, &[Role::Admin, Role::SuperAdmin]) {
        GuardDecision::Allow => {}
        other => return other,
    }
    match session {
        Some(s) if s.can(module, action) => GuardDecision::Allow,
        _ => GuardDecision::AccessDenied {
            module: module.to_string(),
        },
    }
}
