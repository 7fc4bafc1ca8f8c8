use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use octoadmin_cache::CacheOptions;
use octoadmin_core::{ErrorKind, PersistenceError, PersistenceErrorKind};
use octoadmin_pipeline::{
    Authorizable, AuthorizationRequirements, CacheInvalidator, Cacheable, Caller,
    ClaimsAuthorizer, FieldError, Flow, Handler, Identity, Outcome, Pipeline, PipelineError,
    Request, RequestContext,
};

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

struct Ping;

impl Request for Ping {
    type Response = String;
}

#[derive(Default)]
struct CreateCustomer {
    name: String,
    email: String,
    code: String,
}

impl Request for CreateCustomer {
    type Response = u64;
}

struct DeleteCustomer {
    id: u64,
}

impl Authorizable for DeleteCustomer {
    fn requirements(&self) -> AuthorizationRequirements {
        AuthorizationRequirements::new()
            .any_role(["admin", "manager"])
            .policy("same-tenant")
    }
}

impl Request for DeleteCustomer {
    type Response = u64;

    fn as_authorizable(&self) -> Option<&dyn Authorizable> {
        Some(self)
    }
}

struct RenameCustomer {
    fail: bool,
}

impl CacheInvalidator for RenameCustomer {
    fn cache_key(&self) -> Option<String> {
        Some("customers:all".into())
    }

    fn cache_tags(&self) -> Vec<String> {
        vec!["customers".into()]
    }
}

impl Request for RenameCustomer {
    type Response = ();

    fn as_cache_invalidator(&self) -> Option<&dyn CacheInvalidator> {
        Some(self)
    }
}

/// Misconfigured on purpose: a cached read that also invalidates.
struct Confused;

impl Cacheable for Confused {
    fn cache_key(&self) -> String {
        "confused".into()
    }
}

impl CacheInvalidator for Confused {}

impl Request for Confused {
    type Response = ();

    fn as_cacheable(&self) -> Option<&dyn Cacheable> {
        Some(self)
    }

    fn as_cache_invalidator(&self) -> Option<&dyn CacheInvalidator> {
        Some(self)
    }
}

struct Explode;

impl Request for Explode {
    type Response = ();
}

struct Unhandled;

impl Request for Unhandled {
    type Response = ();
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
struct Calls(Arc<AtomicUsize>);

impl Calls {
    fn hit(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

struct PingHandler;

#[async_trait]
impl Handler<Ping> for PingHandler {
    async fn handle(&self, _request: &Ping, _ctx: &RequestContext) -> Flow<String> {
        Ok("pong".into())
    }
}

struct CreateCustomerHandler(Calls);

#[async_trait]
impl Handler<CreateCustomer> for CreateCustomerHandler {
    async fn handle(&self, request: &CreateCustomer, _ctx: &RequestContext) -> Flow<u64> {
        self.0.hit();
        if request.code == "TAKEN" {
            return Err(PersistenceError::unique("code", "duplicate key value violates unique constraint \"customers_code_key\"").into());
        }
        Ok(42)
    }
}

struct DeleteCustomerHandler(Calls);

#[async_trait]
impl Handler<DeleteCustomer> for DeleteCustomerHandler {
    async fn handle(&self, request: &DeleteCustomer, _ctx: &RequestContext) -> Flow<u64> {
        self.0.hit();
        Ok(request.id)
    }
}

struct RenameCustomerHandler;

#[async_trait]
impl Handler<RenameCustomer> for RenameCustomerHandler {
    async fn handle(&self, request: &RenameCustomer, _ctx: &RequestContext) -> Flow<()> {
        if request.fail {
            return Err(PipelineError::not_found("customer", "7"));
        }
        Ok(())
    }
}

struct ConfusedHandler(Calls);

#[async_trait]
impl Handler<Confused> for ConfusedHandler {
    async fn handle(&self, _request: &Confused, _ctx: &RequestContext) -> Flow<()> {
        self.0.hit();
        Ok(())
    }
}

struct ExplodeHandler;

#[async_trait]
impl Handler<Explode> for ExplodeHandler {
    async fn handle(&self, _request: &Explode, _ctx: &RequestContext) -> Flow<()> {
        panic!("connection string leaked: postgres://admin:secret@db");
    }
}

fn authorizer() -> Arc<ClaimsAuthorizer> {
    Arc::new(ClaimsAuthorizer::new().with_policy("same-tenant", |identity| {
        identity.attribute("tenant") == Some(&serde_json::json!("acme"))
    }))
}

fn pipeline(calls: &Calls) -> Pipeline {
    Pipeline::builder()
        .authorizer(authorizer())
        .handler::<Ping, _>(PingHandler)
        .handler::<CreateCustomer, _>(CreateCustomerHandler(calls.clone()))
        .handler::<DeleteCustomer, _>(DeleteCustomerHandler(calls.clone()))
        .handler::<RenameCustomer, _>(RenameCustomerHandler)
        .handler::<Confused, _>(ConfusedHandler(calls.clone()))
        .handler::<Explode, _>(ExplodeHandler)
        .validator_fn::<CreateCustomer, _>(|r| {
            if r.name.trim().is_empty() {
                vec![FieldError::new("name", "Name is required")]
            } else {
                Vec::new()
            }
        })
        .validator_fn::<CreateCustomer, _>(|r| {
            if r.email.contains('@') {
                Vec::new()
            } else {
                vec![FieldError::new("email", "Email is invalid")]
            }
        })
        .validator_fn::<CreateCustomer, _>(|r| {
            if r.code.len() > 5 {
                vec![FieldError::new("code", "Code must be at most 5 characters")]
            } else {
                Vec::new()
            }
        })
        .build()
}

fn failure<T: std::fmt::Debug>(outcome: Outcome<T>) -> octoadmin_core::Failure {
    match outcome {
        Outcome::Failure(failure) => failure,
        Outcome::Success(value) => panic!("expected failure, got {value:?}"),
    }
}

fn names<R: Request>(pipeline: &Pipeline, request: &R) -> Vec<&'static str> {
    pipeline
        .compose(request)
        .unwrap()
        .iter()
        .map(|b| b.name())
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn plain_request_skips_capability_behaviors() {
    let pipeline = pipeline(&Calls::default());

    assert_eq!(pipeline.send(Ping).await, Outcome::Success("pong".to_string()));
    assert_eq!(
        names(&pipeline, &Ping),
        ["exception_translation", "logging", "performance"]
    );
    assert_eq!(pipeline.caching().invocations(), 0);
}

#[tokio::test]
async fn chain_order_is_fixed() {
    let pipeline = pipeline(&Calls::default());
    assert_eq!(
        names(&pipeline, &CreateCustomer::default()),
        ["exception_translation", "logging", "performance", "validation"]
    );
    assert_eq!(
        names(&pipeline, &DeleteCustomer { id: 1 }),
        ["exception_translation", "logging", "performance", "authorization"]
    );
    assert_eq!(
        names(&pipeline, &RenameCustomer { fail: false }),
        ["exception_translation", "logging", "performance", "cache_invalidation"]
    );
}

#[tokio::test]
async fn validation_aggregates_every_error() {
    let calls = Calls::default();
    let pipeline = pipeline(&calls);

    let request = CreateCustomer {
        name: " ".into(),
        email: "nobody".into(),
        code: "TOO-LONG".into(),
    };
    let failure = failure(pipeline.send(request).await);

    assert_eq!(failure.kind, ErrorKind::Validation);
    assert_eq!(
        failure.messages(),
        [
            "Name is required",
            "Email is invalid",
            "Code must be at most 5 characters"
        ]
    );
    assert_eq!(calls.count(), 0);
}

#[tokio::test]
async fn valid_request_reaches_handler() {
    let calls = Calls::default();
    let pipeline = pipeline(&calls);
    let request = CreateCustomer {
        name: "Ada".into(),
        email: "ada@example.com".into(),
        code: "ADA".into(),
    };
    assert_eq!(pipeline.send(request).await, Outcome::Success(42));
    assert_eq!(calls.count(), 1);
}

#[tokio::test]
async fn persistence_errors_are_user_safe() {
    let pipeline = pipeline(&Calls::default());
    let request = CreateCustomer {
        name: "Ada".into(),
        email: "ada@example.com".into(),
        code: "TAKEN".into(),
    };
    let failure = failure(pipeline.send(request).await);

    assert_eq!(
        failure.kind,
        ErrorKind::Persistence(PersistenceErrorKind::UniqueConstraint)
    );
    assert_eq!(failure.errors[0].field, "code");
    assert!(!failure.message.contains("customers_code_key"));
}

#[tokio::test]
async fn authorization_requires_identity() {
    let calls = Calls::default();
    let pipeline = pipeline(&calls);

    let failure = failure(pipeline.send(DeleteCustomer { id: 7 }).await);
    assert_eq!(failure.kind, ErrorKind::AuthenticationRequired);
    assert_eq!(calls.count(), 0);
}

#[tokio::test]
async fn authorization_checks_roles_then_policies() {
    let calls = Calls::default();
    let pipeline = pipeline(&calls);

    let clerk = Caller::with_identity(
        Identity::new("u1", "clerk").with_attribute("tenant", serde_json::json!("acme")),
    );
    let outsider = Caller::with_identity(
        Identity::new("u2", "outsider")
            .with_role("manager")
            .with_attribute("tenant", serde_json::json!("globex")),
    );
    let manager = Caller::with_identity(
        Identity::new("u3", "manager")
            .with_role("manager")
            .with_attribute("tenant", serde_json::json!("acme")),
    );

    let denied = failure(pipeline.send_with(&clerk, DeleteCustomer { id: 7 }).await);
    assert_eq!(denied.kind, ErrorKind::Forbidden);

    let denied = failure(pipeline.send_with(&outsider, DeleteCustomer { id: 7 }).await);
    assert_eq!(denied.kind, ErrorKind::Forbidden);
    assert_eq!(calls.count(), 0);

    let allowed = pipeline.send_with(&manager, DeleteCustomer { id: 7 }).await;
    assert_eq!(allowed, Outcome::Success(7));
    assert_eq!(calls.count(), 1);
}

#[tokio::test]
async fn invalidation_runs_only_after_success() {
    let pipeline = pipeline(&Calls::default());
    let tagged = CacheOptions::new().with_tag("customers");
    pipeline.cache().insert("customers:all", vec![1u32], &tagged);
    pipeline.cache().insert("customers:page:2", vec![2u32], &tagged);

    let failure = failure(pipeline.send(RenameCustomer { fail: true }).await);
    assert_eq!(failure.kind, ErrorKind::NotFound);
    assert!(pipeline.cache().contains_key("customers:all"));

    assert!(pipeline.send(RenameCustomer { fail: false }).await.is_success());
    assert!(!pipeline.cache().contains_key("customers:all"));
    assert!(!pipeline.cache().contains_key("customers:page:2"));
}

#[tokio::test]
async fn cacheable_invalidator_is_rejected() {
    let calls = Calls::default();
    let pipeline = pipeline(&calls);

    let failure = failure(pipeline.send(Confused).await);
    assert_eq!(failure.kind, ErrorKind::Unexpected);
    assert_eq!(calls.count(), 0);
    assert!(pipeline.compose(&Confused).is_err());
}

#[tokio::test]
async fn panics_become_unexpected_failures() {
    let pipeline = pipeline(&Calls::default());

    let failure = failure(pipeline.send(Explode).await);
    assert_eq!(failure.kind, ErrorKind::Unexpected);
    assert!(failure.message.contains(&failure.correlation_id.to_string()));
    assert!(!failure.message.contains("secret"));
}

#[tokio::test]
async fn missing_handler_is_unexpected() {
    let pipeline = pipeline(&Calls::default());
    let failure = failure(pipeline.send(Unhandled).await);
    assert_eq!(failure.kind, ErrorKind::Unexpected);
    assert_eq!(failure.messages().len(), 1);
}

#[tokio::test]
async fn executions_are_counted_per_send() {
    let pipeline = pipeline(&Calls::default());
    for _ in 0..3 {
        pipeline.send(Ping).await;
    }
    assert_eq!(pipeline.execution_metrics().executions(), 3);
}
