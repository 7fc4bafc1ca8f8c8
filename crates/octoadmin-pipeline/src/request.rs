//! Requests and the capabilities they may expose.

use std::time::Duration;

/// One unit of work sent through the pipeline.
///
/// Capabilities are opt-in: override the matching `as_*` accessor to return
/// `Some(self)` and the corresponding behavior joins the chain.
///
/// ```ignore
/// impl Request for CustomersPage {
///     type Response = Vec<Customer>;
///     fn as_cacheable(&self) -> Option<&dyn Cacheable> {
///         Some(self)
///     }
/// }
/// ```
pub trait Request: Send + Sync + 'static {
    type Response: Clone + Send + Sync + 'static;

    /// Name used in logs and metric labels.
    fn request_name(&self) -> &'static str {
        let full = std::any::type_name::<Self>();
        // Generic arguments carry paths of their own.
        let base = full.split('<').next().unwrap_or(full);
        base.rsplit("::").next().unwrap_or(base)
    }

    fn as_authorizable(&self) -> Option<&dyn Authorizable> {
        None
    }

    fn as_cacheable(&self) -> Option<&dyn Cacheable> {
        None
    }

    fn as_cache_invalidator(&self) -> Option<&dyn CacheInvalidator> {
        None
    }
}

/// Role and policy requirements of an [`Authorizable`] request.
///
/// The caller must hold at least one role of any one group, and every
/// policy must authorize.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizationRequirements {
    pub role_groups: Vec<Vec<String>>,
    pub policies: Vec<String>,
}

impl AuthorizationRequirements {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn role(self, role: impl Into<String>) -> Self {
        self.any_role([role])
    }

    pub fn any_role<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let group: Vec<String> = roles.into_iter().map(Into::into).collect();
        if !group.is_empty() {
            self.role_groups.push(group);
        }
        self
    }

    pub fn policy(mut self, policy: impl Into<String>) -> Self {
        self.policies.push(policy.into());
        self
    }

    /// Only an authenticated caller is required.
    pub fn is_empty(&self) -> bool {
        self.role_groups.is_empty() && self.policies.is_empty()
    }
}

pub trait Authorizable: Send + Sync {
    fn requirements(&self) -> AuthorizationRequirements;
}

/// A read whose response is cached read-through.
pub trait Cacheable: Send + Sync {
    fn cache_key(&self) -> String;

    fn cache_tags(&self) -> Vec<String> {
        Vec::new()
    }

    /// Per-request TTL. `None` falls back to the store default.
    fn expiration(&self) -> Option<Duration> {
        None
    }

    /// Token namespace the cached response depends on.
    fn dependency_token(&self) -> Option<String> {
        None
    }

    /// Skip the cache for this request instance.
    fn bypass_cache(&self) -> bool {
        false
    }
}

/// A write that invalidates cached reads once it succeeds.
pub trait CacheInvalidator: Send + Sync {
    fn cache_key(&self) -> Option<String> {
        None
    }

    fn cache_tags(&self) -> Vec<String> {
        Vec::new()
    }

    fn invalidation_token(&self) -> Option<String> {
        None
    }
}

/// Which capabilities one request exposes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub authorizable: bool,
    pub cacheable: bool,
    pub cache_invalidator: bool,
}

impl Capabilities {
    pub fn of<R: Request>(request: &R) -> Self {
        Self {
            authorizable: request.as_authorizable().is_some(),
            cacheable: request.as_cacheable().is_some(),
            cache_invalidator: request.as_cache_invalidator().is_some(),
        }
    }
}
