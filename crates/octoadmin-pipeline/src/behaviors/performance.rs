use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::warn;

use crate::behavior::{Behavior, Flow, Next};
use crate::config::PerformanceConfig;
use crate::context::RequestContext;
use crate::metrics::{self, ExecutionMetrics};
use crate::request::Request;

/// Times the inner chain and warns once per slow request.
#[derive(Debug)]
pub struct PerformanceBehavior {
    metrics: Arc<ExecutionMetrics>,
    config: PerformanceConfig,
}

impl PerformanceBehavior {
    pub fn new(metrics: Arc<ExecutionMetrics>, config: PerformanceConfig) -> Self {
        Self { metrics, config }
    }

    pub fn execution_metrics(&self) -> &Arc<ExecutionMetrics> {
        &self.metrics
    }
}

#[async_trait]
impl<R: Request> Behavior<R> for PerformanceBehavior {
    fn name(&self) -> &'static str {
        "performance"
    }

    async fn handle(&self, ctx: &RequestContext, request: &R, next: Next<'_, R>) -> Flow<R::Response> {
        let execution = self.metrics.record_execution();
        let start = Instant::now();
        let result = next.run(ctx, request).await;
        let elapsed = start.elapsed();

        metrics::record_request_duration(ctx.request_name(), elapsed);

        let threshold = self.metrics.threshold_for(execution, &self.config);
        if elapsed > threshold {
            metrics::record_slow_request(ctx.request_name());
            warn!(
                request = ctx.request_name(),
                correlation_id = %ctx.correlation_id(),
                user = ctx.resolved_identity().map(|i| i.name.as_str()).unwrap_or("anonymous"),
                elapsed_ms = elapsed.as_millis() as u64,
                threshold_ms = threshold.as_millis() as u64,
                warming_up = self.metrics.is_warming_up(execution, &self.config),
                "slow request"
            );
        }
        result
    }
}
