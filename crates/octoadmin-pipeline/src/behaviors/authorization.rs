use std::sync::Arc;

use async_trait::async_trait;
use octoadmin_core::PipelineError;
use tracing::debug;

use crate::auth::Authorizer;
use crate::behavior::{Behavior, Flow, Next};
use crate::context::RequestContext;
use crate::request::Request;

/// Checks the caller against an [`Authorizable`](crate::Authorizable) request's
/// requirements before anything else runs.
///
/// 1. The caller must be authenticated.
/// 2. With role groups declared, one role of one group must match.
/// 3. Every declared policy must authorize.
///
/// Nothing is cached: each request asks the [`Authorizer`] again.
pub struct AuthorizationBehavior {
    authorizer: Arc<dyn Authorizer>,
}

impl AuthorizationBehavior {
    pub fn new(authorizer: Arc<dyn Authorizer>) -> Self {
        Self { authorizer }
    }
}

#[async_trait]
impl<R: Request> Behavior<R> for AuthorizationBehavior {
    fn name(&self) -> &'static str {
        "authorization"
    }

    async fn handle(&self, ctx: &RequestContext, request: &R, next: Next<'_, R>) -> Flow<R::Response> {
        let Some(authorizable) = request.as_authorizable() else {
            return next.run(ctx, request).await;
        };
        let requirements = authorizable.requirements();

        let Some(identity) = ctx.identity().await else {
            debug!(request = ctx.request_name(), "anonymous caller rejected");
            return Err(PipelineError::AuthenticationRequired);
        };

        if !requirements.role_groups.is_empty() {
            let mut satisfied = false;
            'groups: for group in &requirements.role_groups {
                for role in group {
                    if self.authorizer.is_in_role(identity, role).await {
                        satisfied = true;
                        break 'groups;
                    }
                }
            }
            if !satisfied {
                debug!(
                    request = ctx.request_name(),
                    user = %identity.name,
                    roles = ?requirements.role_groups,
                    "caller lacks required role"
                );
                return Err(PipelineError::forbidden("missing required role"));
            }
        }

        for policy in &requirements.policies {
            if !self.authorizer.authorize(identity, policy).await {
                debug!(
                    request = ctx.request_name(),
                    user = %identity.name,
                    policy = %policy,
                    "policy denied"
                );
                return Err(PipelineError::forbidden(format!("policy '{policy}' denied")));
            }
        }

        next.run(ctx, request).await
    }
}
