//! Shared-secret handshake authentication.

/// Token policy for WebSocket handshakes.
#[derive(Debug, Clone, Default)]
pub struct AuthPolicy {
    token: Option<String>,
}

impl AuthPolicy {
    /// `None` accepts every handshake (loopback hubs).
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: token.filter(|t| !t.is_empty()),
        }
    }

    pub fn required(&self) -> bool {
        self.token.is_some()
    }

    pub fn check(&self, presented: Option<&str>) -> bool {
        match (&self.token, presented) {
            (None, _) => true,
            (Some(expected), Some(presented)) => constant_time_eq(expected.as_bytes(), presented.as_bytes()),
            (Some(_), None) => false,
        }
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_policy_accepts_anything() {
        let policy = AuthPolicy::new(None);
        assert!(!policy.required());
        assert!(policy.check(None));
        assert!(policy.check(Some("whatever")));
    }

    #[test]
    fn token_policy_requires_exact_match() {
        let policy = AuthPolicy::new(Some("s3cret".into()));
        assert!(policy.required());
        assert!(policy.check(Some("s3cret")));
        assert!(!policy.check(Some("s3cre")));
        assert!(!policy.check(Some("S3cret")));
        assert!(!policy.check(None));
    }
}
