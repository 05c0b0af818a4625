//! Hook- and metrics-wrapped operation execution

use serde::Serialize;
use serde_json::{json, Value};
use std::fmt::Display;
use std::future::Future;
use std::time::Instant;

use super::core::Manager;
use super::hooks::HookPoint;
use crate::domain::entities::ManagerEvent;

impl Manager {
    /// Run `op(data)` wrapped in `beforeOperation` / `afterOperation` / `onError`.
    ///
    /// The operation's own result or error is returned unchanged; hook
    /// failures are reported as events and never replace it.
    pub async fn execute_operation<T, E, F, Fut>(&self, operation: &str, data: Value, op: F) -> Result<T, E>
    where
        T: Serialize,
        E: Display,
        F: FnOnce(Value) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.metrics.record_operation();
        self.run_hook(HookPoint::BeforeOperation, json!({
            "operation": operation,
            "data": data,
        }))
        .await;

        let started = Instant::now();
        let result = op(data.clone()).await;
        let elapsed = started.elapsed();

        match &result {
            Ok(value) => {
                let duration_ms = elapsed.as_secs_f64() * 1000.0;
                self.metrics.record_duration(operation, elapsed);

                let result = serde_json::to_value(value).unwrap_or(Value::Null);
                self.run_hook(HookPoint::AfterOperation, json!({
                    "operation": operation,
                    "data": data,
                    "result": result,
                    "duration_ms": duration_ms,
                }))
                .await;

                tracing::debug!(manager = %self.name, operation, duration_ms, "Operation complete");
                self.emit(ManagerEvent::OperationComplete {
                    manager: self.name.clone(),
                    operation: operation.to_string(),
                    duration_ms,
                });
            }
            Err(e) => {
                self.metrics.record_error();
                let error = e.to_string();
                tracing::error!(manager = %self.name, operation, error = %error, "Operation failed");
                self.run_hook(HookPoint::OnError, json!({
                    "operation": operation,
                    "data": data,
                    "error": error,
                }))
                .await;
            }
        }

        result
    }
}
