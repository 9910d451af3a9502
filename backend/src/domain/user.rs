use serde::{Deserialize, Serialize};
use std::fmt;

/// Identité de l'utilisateur appelant.
///
/// L'authentification est assurée en amont : ce type ne transporte que
/// l'identifiant opaque (principal) transmis par la couche d'identité.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallerId(String);

impl CallerId {
    /// Crée une identité à partir d'un principal déjà authentifié
    pub fn new(principal: impl Into<String>) -> Self {
        Self(principal.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CallerId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}
