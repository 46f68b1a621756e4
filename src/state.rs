//! Connection states
//!
//! ```text
//!            +----------------------+
//!            |     connection       |
//!            +----------------------+
//!                       ||
//!                       \/
//!            +----------------------+
//!            |  not authenticated   |
//!            +----------------------+
//!              ||                ||
//!              || (LOGIN /       ||
//!              ||  AUTHENTICATE) || (PREAUTH greeting)
//!              \/                \/
//!            +----------------------+
//!            |    authenticated     |<=++
//!            +----------------------+  ||
//!              ||                      || (CLOSE / failed
//!              || (SELECT / EXAMINE)   ||  SELECT / CLOSED)
//!              \/                      ||
//!            +----------------------+  ||
//!            |       selected       |==++
//!            +----------------------+
//!                       ||
//!                       \/ (LOGOUT / BYE / dropped connection)
//!            +----------------------+
//!            |        logout        |
//!            +----------------------+
//! ```
//!
//! ([RFC 3501](https://www.rfc-editor.org/rfc/rfc3501.html), section 3)

/// The state of a connection, as seen by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Commands like LOGIN and AUTHENTICATE are permitted, most others are
    /// not.
    NotAuthenticated,
    /// The client has identified itself; mailbox commands are permitted.
    Authenticated,
    /// A mailbox is selected; message commands are permitted.
    Selected,
    /// The connection is (being) terminated. Terminal: no transition leaves
    /// this state.
    Logout,
}

impl ConnectionState {
    /// Whether `self` may transition into `next`.
    ///
    /// Re-entering the current state is always allowed; this makes
    /// transitions idempotent under concurrent completion handling.
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;

        if self == next {
            return true;
        }

        match (self, next) {
            (Logout, _) => false,
            (_, Logout) => true,
            (NotAuthenticated, Authenticated) => true,
            (Authenticated, Selected) => true,
            (Selected, Authenticated) => true,
            _ => false,
        }
    }
}
