/// Session key under which the surrounding application stores the authenticated user id.
pub const USER_ID: &str = "user_id";
