/// Check a username against the rules enforced at registration and rename.
///
/// Usernames are 3 to 24 characters of ASCII letters, digits, and
/// underscores. Returns a user-facing message on failure.
pub fn validate_username(username: &str) -> Result<(), String> {
    if username.is_empty() {
        return Err("Username is required.".to_string());
    }
    if username.len() < 3 {
        return Err("Username must be at least 3 characters.".to_string());
    }
    if username.len() > 24 {
        return Err("Username must be 24 characters or less.".to_string());
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err("Username may only contain letters, numbers, and underscores.".to_string());
    }
    Ok(())
}
