// Extract bearer token dari Authorization header
pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_bearer_token() {
        assert_eq!(extract_bearer_token("Bearer abc123token"), Some("abc123token"));
        assert_eq!(extract_bearer_token("Token abc123"), None);
        assert_eq!(extract_bearer_token("Bearer   "), None);
    }
}
