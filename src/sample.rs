//! Sample service exercising every binding strategy.
//!
//! | Operation   | Route                              |
//! |-------------|------------------------------------|
//! | `waitEvent` | GET `waitEvent/{requestId}`        |
//! | `release`   | GET `release`                      |
//! | `synthetic` | GET `synthetic/{b}/{i}/{d}/{dt}/{s}` |
//! | `add`       | GET `add?a=..&b=..`                |
//! | `div`       | GET `div:{a}/{b}`                  |
//! | `readJson`  | POST `readJson`                    |

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::routing::{Call, Fault, Operation, PatternError, Reply, ServiceBinding, ValueType};
use crate::sync::{SemaphoreGroup, WaitOutcome, DEFAULT_GROUP};

const OK: &str = "OK";

/// Typed echo of the `synthetic` route.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyntheticEcho {
    pub bool_value: bool,
    pub int_value: i32,
    pub double_value: f64,
    pub date_value: DateTime<Utc>,
    pub string_value: String,
}

#[derive(Debug, Clone, Default)]
pub struct SampleService {
    gates: SemaphoreGroup,
}

impl SampleService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gates(&self) -> &SemaphoreGroup {
        &self.gates
    }

    /// Park until `release` is called.
    pub async fn wait_event(&self, request_id: &str) -> &'static str {
        tracing::debug!(request_id, "Waiting for release");
        match self.gates.wait(DEFAULT_GROUP).await {
            WaitOutcome::Released => tracing::debug!(request_id, "Released"),
            WaitOutcome::Evicted => tracing::debug!(request_id, "Evicted by newer waiters"),
        }
        OK
    }

    pub fn release(&self) -> &'static str {
        let released = self.gates.release_all(DEFAULT_GROUP);
        tracing::debug!(released, "Released waiters");
        OK
    }

    pub fn add(&self, a: i32, b: i32) -> Result<i32, Fault> {
        a.checked_add(b)
            .ok_or_else(|| Fault::internal(format!("{a} + {b} overflows")))
    }

    pub fn div(&self, a: f64, b: f64) -> Result<f64, Fault> {
        if b == 0.0 {
            return Err(Fault::internal("division by zero"));
        }
        Ok(a / b)
    }

    pub fn read_json(&self, s: &str, i: i64, dt: DateTime<Utc>) -> String {
        format!("s={s}, i={i}, dt={}", dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
    }

    /// Register every operation, served from this instance.
    pub fn binding(self) -> Result<ServiceBinding<SampleService>, PatternError> {
        ServiceBinding::singleton(self)
            .operation(
                Operation::get("waitEvent")
                    .template("waitEvent/{requestId}")
                    .param("requestId", ValueType::String)
                    .returns(ValueType::String),
                |service: Arc<SampleService>, call: Call| async move {
                    let request_id: String = call.args.get(0)?;
                    Ok(Reply::text(service.wait_event(&request_id).await))
                },
            )?
            .operation(
                Operation::get("release").returns(ValueType::String),
                |service: Arc<SampleService>, _: Call| async move { Ok(Reply::text(service.release())) },
            )?
            .operation(
                Operation::get("synthetic")
                    .template("synthetic/{b}/{i}/{d}/{dt}/{s}")
                    .param("b", ValueType::Bool)
                    .param("i", ValueType::Int)
                    .param("d", ValueType::Double)
                    .param("dt", ValueType::DateTime)
                    .param("s", ValueType::String)
                    .returns(ValueType::Object),
                |_: Arc<SampleService>, call: Call| async move {
                    let args = &call.args;
                    Reply::json(&SyntheticEcho {
                        bool_value: args.get(0)?,
                        int_value: args.get(1)?,
                        double_value: args.get(2)?,
                        date_value: args.get(3)?,
                        string_value: args.get(4)?,
                    })
                },
            )?
            .operation(
                Operation::get("add")
                    .param("a", ValueType::Int)
                    .param("b", ValueType::Int)
                    .returns(ValueType::Int),
                |service: Arc<SampleService>, call: Call| async move {
                    let sum = service.add(call.args.get(0)?, call.args.get(1)?)?;
                    Reply::json(&sum)
                },
            )?
            .operation(
                Operation::get("div")
                    .template("div:{a}/{b}")
                    .param("a", ValueType::Decimal)
                    .param("b", ValueType::Decimal)
                    .returns(ValueType::Decimal),
                |service: Arc<SampleService>, call: Call| async move {
                    let quotient = service.div(call.args.get(0)?, call.args.get(1)?)?;
                    Reply::json(&quotient)
                },
            )?
            .operation(
                Operation::post("readJson")
                    .param("s", ValueType::String)
                    .param("i", ValueType::Long)
                    .param("dt", ValueType::DateTime)
                    .returns(ValueType::String),
                |service: Arc<SampleService>, call: Call| async move {
                    let summary = service.read_json(
                        &call.args.get::<String>(0)?,
                        call.args.get(1)?,
                        call.args.get(2)?,
                    );
                    Ok(Reply::text(summary))
                },
            )
    }
}
