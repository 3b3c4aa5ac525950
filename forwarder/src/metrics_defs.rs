//! Metrics definitions for the forwarder.

use shared::metrics_defs::{MetricDef, MetricType};

pub const INBOUND_REQUESTS: MetricDef = MetricDef {
    name: "inbound.requests",
    metric_type: MetricType::Counter,
    description: "Inbound requests by operation and response status",
};

pub const AUTH_REJECTED: MetricDef = MetricDef {
    name: "auth.rejected",
    metric_type: MetricType::Counter,
    description: "Inbound requests rejected by the shared-secret gate",
};

pub const UPSTREAM_ATTEMPTS: MetricDef = MetricDef {
    name: "upstream.attempts",
    metric_type: MetricType::Counter,
    description: "Outbound HTTP attempts, retries included",
};

pub const UPSTREAM_RETRIES: MetricDef = MetricDef {
    name: "upstream.retries",
    metric_type: MetricType::Counter,
    description: "Outbound HTTP attempts repeated after a transient failure",
};

pub const UPSTREAM_FAILURES: MetricDef = MetricDef {
    name: "upstream.failures",
    metric_type: MetricType::Counter,
    description: "Outbound calls that ended in a transport error",
};

pub const UPSTREAM_DURATION: MetricDef = MetricDef {
    name: "upstream.duration",
    metric_type: MetricType::Histogram,
    description: "Time spent on an outbound call including retries, in seconds",
};

pub const IRRMS_LOGIN_REJECTED: MetricDef = MetricDef {
    name: "irrms.login.rejected",
    metric_type: MetricType::Counter,
    description: "IRRMS logins answered with a non-200 status",
};

pub const ALL_METRICS: &[MetricDef] = &[
    INBOUND_REQUESTS,
    AUTH_REJECTED,
    UPSTREAM_ATTEMPTS,
    UPSTREAM_RETRIES,
    UPSTREAM_FAILURES,
    UPSTREAM_DURATION,
    IRRMS_LOGIN_REJECTED,
];
