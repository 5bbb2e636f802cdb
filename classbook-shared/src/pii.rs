use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Free text supplied by parents (medical notes, allergies) that must not leak into logs.
/// Debug and Display print a mask; serialization keeps the real value for API responses
/// and the local snapshot.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Masked<T>(pub T);

impl<T> fmt::Debug for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "********")
    }
}

impl<T> fmt::Display for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "********")
    }
}

impl<T: Serialize> Serialize for Masked<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<T> Masked<T> {
    pub fn expose(&self) -> &T {
        &self.0
    }

    pub fn into_inner(self) -> T {
        self.0
    }
}

impl From<String> for Masked<String> {
    fn from(value: String) -> Self {
        Masked(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_is_masked() {
        let note = Masked("peanut allergy".to_string());
        assert_eq!(format!("{:?}", note), "********");
        assert_eq!(note.to_string(), "********");
        assert_eq!(note.expose(), "peanut allergy");
    }

    #[test]
    fn test_serializes_real_value() {
        let note = Masked("needs a booster seat".to_string());
        let json = serde_json::to_string(&note).unwrap();
        assert_eq!(json, "\"needs a booster seat\"");

        let back: Masked<String> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, note);
    }
}
