use crate::errors::CredentialError;
use std::collections::HashMap;

/// Resolves a shed to the IRRMS authenticate key used on its behalf.
#[derive(Clone, Default)]
pub struct CredentialStore {
    // Keys are stored uppercased
    keys: HashMap<String, String>,
}

impl CredentialStore {
    pub fn new(keys: &HashMap<String, String>) -> Self {
        Self {
            keys: keys
                .iter()
                .map(|(shed, key)| (shed.to_uppercase(), key.clone()))
                .collect(),
        }
    }

    /// A non-empty caller-supplied key wins over the configured table.
    pub fn resolve(
        &self,
        shed_name: &str,
        override_key: Option<&str>,
    ) -> Result<String, CredentialError> {
        if let Some(key) = override_key.filter(|k| !k.is_empty()) {
            return Ok(key.to_string());
        }

        self.keys
            .get(&shed_name.to_uppercase())
            .filter(|key| !key.is_empty())
            .cloned()
            .ok_or_else(|| CredentialError::UnknownShed(shed_name.to_string()))
    }

    /// Number of sheds with a usable key
    pub fn len(&self) -> usize {
        self.keys.values().filter(|k| !k.is_empty()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut sheds: Vec<_> = self.keys.keys().collect();
        sheds.sort();
        f.debug_struct("CredentialStore")
            .field("sheds", &sheds)
            .finish()
    }
}
