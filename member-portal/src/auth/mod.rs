// Session and route guards
//
// The portal backend signs and verifies tokens. The client only reads the
// claims it needs for routing and checks expiry; guards never raise errors,
// they decide between allow, redirect and access-denied.

pub mod guards;
pub mod session;

pub use guards::{application_guard, protected_route, with_permission, GuardDecision, Route};
pub use session::{Action, AuthError, ModulePermission, Role, Session};
