use crate::db::Database;
use crate::model::UserId;
use anyhow::Result;

/// Whose data an operation works on. Passed explicitly instead of being
/// kept as process-wide state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: UserId,
    pub username: String,
}

impl Session {
    pub fn new(user_id: UserId, username: &str) -> Session {
        Session {
            user_id,
            username: username.to_string(),
        }
    }

    /// Open a session for `username`, registering the user on first use.
    pub fn login(db: &Database, username: &str) -> Result<Session> {
        let user_id = db.ensure_user(username)?;
        Ok(Session::new(user_id, username.trim()))
    }
}
