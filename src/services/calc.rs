//! Calculator service - arithmetic demos over all four call shapes.
//!
//! One method per shape, each with per-call local state only:
//!
//! - `calc.sum` (unary): add two numbers.
//! - `calc.sqrt` (unary): square root, rejecting negative input.
//! - `calc.decompose` (server-stream): prime factors, smallest first.
//! - `calc.average` (client-stream): mean of the streamed values,
//!   computed once the client closes.
//! - `calc.max` (bidi): a response exactly when a strictly new maximum
//!   arrives.

use serde::{Deserialize, Serialize};

use crate::engine::stream::{StreamReceiver, StreamSender};
use crate::engine::EngineBuilder;
use crate::status::Status;

/// Method name for `sum`.
pub const METHOD_SUM: &str = "calc.sum";
/// Method name for `sqrt`.
pub const METHOD_SQRT: &str = "calc.sqrt";
/// Method name for `decompose`.
pub const METHOD_DECOMPOSE: &str = "calc.decompose";
/// Method name for `average`.
pub const METHOD_AVERAGE: &str = "calc.average";
/// Method name for `max`.
pub const METHOD_MAX: &str = "calc.max";

/// Request for `calc.sum`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SumRequest {
    pub a: i64,
    pub b: i64,
}

/// Response for `calc.sum`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SumResponse {
    pub sum: i64,
}

/// Request for `calc.sqrt`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SquareRootRequest {
    pub number: i64,
}

/// Response for `calc.sqrt`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SquareRootResponse {
    pub root: f64,
}

/// Request for `calc.decompose`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecomposeRequest {
    pub number: u64,
}

/// One prime factor streamed by `calc.decompose`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecomposeResponse {
    pub factor: u64,
}

/// One value streamed into `calc.average`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AverageRequest {
    pub number: i64,
}

/// Aggregate response of `calc.average`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AverageResponse {
    pub average: f64,
}

/// One value streamed into `calc.max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaxRequest {
    pub number: i64,
}

/// A new running maximum streamed out of `calc.max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaxResponse {
    pub maximum: i64,
}

/// Register the five calculator methods on an engine builder.
pub fn register(builder: EngineBuilder) -> EngineBuilder {
    builder
        .unary(METHOD_SUM, |request: SumRequest| async move {
            Ok(SumResponse {
                sum: request.a + request.b,
            })
        })
        .unary(METHOD_SQRT, |request: SquareRootRequest| async move {
            if request.number < 0 {
                return Err(Status::invalid_argument(format!(
                    "cannot take the square root of a negative number: {}",
                    request.number
                )));
            }
            Ok(SquareRootResponse {
                root: (request.number as f64).sqrt(),
            })
        })
        .server_stream(
            METHOD_DECOMPOSE,
            |request: DecomposeRequest, out: StreamSender<DecomposeResponse>| async move {
                let mut remaining = request.number;
                let mut factor = 2u64;
                while remaining > 1 {
                    if remaining % factor == 0 {
                        out.send(&DecomposeResponse { factor }).await?;
                        remaining /= factor;
                    } else {
                        factor += 1;
                    }
                }
                Ok(())
            },
        )
        .client_stream(
            METHOD_AVERAGE,
            |mut input: StreamReceiver<AverageRequest>| async move {
                let mut sum = 0i64;
                let mut count = 0u64;
                while let Some(request) = input.recv().await? {
                    sum += request.number;
                    count += 1;
                }
                if count == 0 {
                    return Err(Status::invalid_argument(
                        "cannot average an empty stream of values",
                    ));
                }
                Ok(AverageResponse {
                    average: sum as f64 / count as f64,
                })
            },
        )
        .bidi(
            METHOD_MAX,
            |mut input: StreamReceiver<MaxRequest>, out: StreamSender<MaxResponse>| async move {
                let mut maximum: Option<i64> = None;
                while let Some(request) = input.recv().await? {
                    if maximum.map_or(true, |m| request.number > m) {
                        maximum = Some(request.number);
                        out.send(&MaxResponse {
                            maximum: request.number,
                        })
                        .await?;
                    }
                }
                Ok(())
            },
        )
}

/// Build an engine serving only the calculator methods.
pub fn engine() -> crate::engine::Engine {
    register(EngineBuilder::new()).build()
}
