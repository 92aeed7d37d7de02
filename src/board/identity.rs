/// Supplies the authenticated owner. "No owner" means nothing to load, not an error.
pub trait IdentityProvider: Send + Sync {
    fn current_owner(&self) -> Option<String>;

    fn session_valid(&self) -> bool {
        self.current_owner().is_some()
    }
}

/// Fixed identity, resolved once from configuration or CLI flags.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity {
    owner: Option<String>,
}

impl StaticIdentity {
    pub fn new(owner: Option<String>) -> Self {
        let owner = owner
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty());
        Self { owner }
    }

    pub fn anonymous() -> Self {
        Self { owner: None }
    }
}

impl IdentityProvider for StaticIdentity {
    fn current_owner(&self) -> Option<String> {
        self.owner.clone()
    }
}
