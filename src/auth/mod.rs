//! Authentication: the provider contract, session cookies and the request
//! gate.

pub mod cookies;
pub mod gate;
pub mod provider;

// Re-export commonly used items
pub use gate::{decide, login_url, safe_return_path, session_gate, CurrentUser, GateDecision};
pub use provider::{AuthProvider, AuthUser, LocalAuth, Session, REFRESH_GRACE_SECS};
