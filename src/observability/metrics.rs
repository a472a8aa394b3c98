use prometheus::{
    Encoder, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub assignments_total: IntCounterVec,
    pub orders_in_queue: IntGauge,
    pub deadline_fires_total: IntCounterVec,
    pub assignment_cycle_seconds: HistogramVec,
    pub orders_cancelled_total: IntCounter,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let assignments_total = IntCounterVec::new(
            Opts::new("assignments_total", "Terminal assignments by outcome"),
            &["outcome"],
        )
        .expect("valid assignments_total metric");

        let orders_in_queue = IntGauge::new("orders_in_queue", "Current dispatch queue depth")
            .expect("valid orders_in_queue metric");

        let deadline_fires_total = IntCounterVec::new(
            Opts::new(
                "deadline_fires_total",
                "Fired deadline callbacks by kind and whether they acted or were stale",
            ),
            &["kind", "result"],
        )
        .expect("valid deadline_fires_total metric");

        let assignment_cycle_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "assignment_cycle_seconds",
                "Time from hand-off to terminal assignment status in seconds",
            ),
            &["outcome"],
        )
        .expect("valid assignment_cycle_seconds metric");

        let orders_cancelled_total = IntCounter::new(
            "orders_cancelled_total",
            "Orders cancelled by delivery-window expiry or retry exhaustion",
        )
        .expect("valid orders_cancelled_total metric");

        registry
            .register(Box::new(assignments_total.clone()))
            .expect("register assignments_total");
        registry
            .register(Box::new(orders_in_queue.clone()))
            .expect("register orders_in_queue");
        registry
            .register(Box::new(deadline_fires_total.clone()))
            .expect("register deadline_fires_total");
        registry
            .register(Box::new(assignment_cycle_seconds.clone()))
            .expect("register assignment_cycle_seconds");
        registry
            .register(Box::new(orders_cancelled_total.clone()))
            .expect("register orders_cancelled_total");

        Self {
            registry,
            assignments_total,
            orders_in_queue,
            deadline_fires_total,
            assignment_cycle_seconds,
            orders_cancelled_total,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}
