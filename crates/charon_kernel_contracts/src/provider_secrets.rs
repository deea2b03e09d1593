#![forbid(unsafe_code)]

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProviderSecretId {
    OpenRouterApiKey,
}

impl ProviderSecretId {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OpenRouterApiKey => "openrouter_api_key",
        }
    }

    pub const fn all() -> &'static [Self] {
        &[Self::OpenRouterApiKey]
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "openrouter_api_key" => Some(Self::OpenRouterApiKey),
            _ => None,
        }
    }

    pub fn allowed_key_names() -> Vec<&'static str> {
        Self::all().iter().map(|id| id.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::ProviderSecretId;

    #[test]
    fn provider_secret_ids_are_roundtrippable() {
        for secret in ProviderSecretId::all() {
            let parsed = ProviderSecretId::parse(secret.as_str());
            assert_eq!(parsed, Some(*secret));
        }
    }
}
