/*!
 * Monitoring
 * Structured tracing for the managers and backends
 */

mod tracer;

pub use tracer::{generate_trace_id, init_tracing, span_operation, OperationSpan, SLOW_OPERATION};
