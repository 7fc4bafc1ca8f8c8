//! Role and policy checks used by the authorization behavior.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use octoadmin_core::Identity;

/// Answers role and policy questions about an identity.
///
/// Called on every authorized request; implementations must not assume
/// their answers are cached.
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn is_in_role(&self, identity: &Identity, role: &str) -> bool;

    async fn authorize(&self, identity: &Identity, policy: &str) -> bool;
}

type PolicyFn = Arc<dyn Fn(&Identity) -> bool + Send + Sync>;

/// Authorizer over the claims carried by [`Identity`].
///
/// Roles come from `Identity::roles`. Policies are named predicates; an
/// unknown policy never authorizes.
#[derive(Clone, Default)]
pub struct ClaimsAuthorizer {
    policies: HashMap<String, PolicyFn>,
}

impl ClaimsAuthorizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy<F>(mut self, name: impl Into<String>, policy: F) -> Self
    where
        F: Fn(&Identity) -> bool + Send + Sync + 'static,
    {
        self.policies.insert(name.into(), Arc::new(policy));
        self
    }
}

impl std::fmt::Debug for ClaimsAuthorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.policies.keys().collect();
        names.sort();
        f.debug_struct("ClaimsAuthorizer")
            .field("policies", &names)
            .finish()
    }
}

#[async_trait]
impl Authorizer for ClaimsAuthorizer {
    async fn is_in_role(&self, identity: &Identity, role: &str) -> bool {
        identity.has_role(role)
    }

    async fn authorize(&self, identity: &Identity, policy: &str) -> bool {
        match self.policies.get(policy) {
            Some(check) => check(identity),
            None => {
                tracing::warn!(policy = %policy, "unknown authorization policy");
                false
            }
        }
    }
}
