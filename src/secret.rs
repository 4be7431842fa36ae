use secrecy::{ExposeSecret, SecretString};
use serde::{Serialize, Serializer};
use std::fmt;

/// A write-only secret attribute value.
///
/// The plain text can be read exactly once through [`GuardedString::access`];
/// the buffer is zeroed when it is taken out or when the value is dropped.
#[derive(Clone)]
pub struct GuardedString(Option<SecretString>);

impl GuardedString {
    pub fn new(plain: impl Into<String>) -> Self {
        Self(Some(SecretString::from(plain.into())))
    }

    /// Run `f` over the plain text and zero it afterwards.
    ///
    /// Returns `None` when the secret was already consumed.
    pub fn access<R>(&mut self, f: impl FnOnce(&str) -> R) -> Option<R> {
        let secret = self.0.take()?;
        Some(f(secret.expose_secret()))
    }

    pub fn is_consumed(&self) -> bool {
        self.0.is_none()
    }
}

impl PartialEq for GuardedString {
    // Secrets never compare equal, not even to themselves.
    fn eq(&self, _other: &Self) -> bool {
        false
    }
}

impl fmt::Debug for GuardedString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GuardedString(***)")
    }
}

impl Serialize for GuardedString {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_use_access() {
        let mut secret = GuardedString::new("s3cret");
        assert_eq!(secret.access(|p| p.len()), Some(6));
        assert!(secret.is_consumed());
        assert_eq!(secret.access(|p| p.to_string()), None);
    }

    #[test]
    fn test_never_echoed() {
        let secret = GuardedString::new("s3cret");
        assert_eq!(format!("{:?}", secret), "GuardedString(***)");
        assert_eq!(serde_json::to_string(&secret).unwrap(), "null");
    }
}
