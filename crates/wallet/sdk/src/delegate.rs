//! Seam towards the application's user interface

use std::{fmt, time::Duration};

use async_trait::async_trait;

use crate::session::SessionState;

/// Receives prompts and progress from a running session
///
/// Every method has a no-op default, so implementors only override what
/// they display.
#[async_trait]
pub trait SessionDelegate: Send + Sync + fmt::Debug {
    /// Ask the user for the access code. `attempt` starts at 1.
    ///
    /// Returning `None` cancels the session.
    async fn request_access_code(&self, attempt: u8) -> Option<String> {
        let _ = attempt;
        None
    }

    /// The card enforces a security delay with `remaining` time left
    fn security_delay(&self, remaining: Duration) {
        let _ = remaining;
    }

    /// The session moved to `state`
    fn state_changed(&self, state: SessionState) {
        let _ = state;
    }
}

/// Delegate that ignores everything and never provides a code
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDelegate;

impl SessionDelegate for NoopDelegate {}
