
use autometrics::prometheus_exporter;
use lazy_static::lazy_static;
use prometheus::Encoder;
use prometheus::IntCounterVec;
use prometheus::IntGaugeVec;
use prometheus::Opts;
use prometheus::Registry;
use tracing::error;

lazy_static! {
    pub static ref CURRENT_TERM: IntGaugeVec = IntGaugeVec::new(
        Opts::new("current_term", "Latest term observed by the peer"),
        &["node_id"]
    )
    .expect("metric can not be created");

    pub static ref COMMIT_INDEX: IntGaugeVec = IntGaugeVec::new(
        Opts::new("commit_index", "Highest log index known to be committed"),
        &["node_id"]
    )
    .expect("metric can not be created");

    pub static ref ROLE_TRANSITIONS: IntCounterVec = IntCounterVec::new(
        Opts::new("role_transitions", "Role changes, labelled by the role entered"),
        &["node_id", "role"]
    )
    .expect("metric can not be created");

    pub static ref APPLIED_ENTRIES: IntCounterVec = IntCounterVec::new(
        Opts::new("applied_entries", "Committed entries delivered to the service"),
        &["node_id"]
    )
    .expect("metric can not be created");

    pub static ref RPC_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new("rpc_failures", "Outbound RPCs that failed or timed out"),
        &["node_id", "rpc"]
    )
    .expect("metric can not be created");

    pub static ref REGISTRY: Registry = {
        let registry = Registry::new();
        if let Err(e) = register_custom_metrics(&registry) {
            error!("could not register custom metrics: {:?}", e);
        }
        registry
    };
}

pub(crate) fn register_custom_metrics(registry: &Registry) -> prometheus::Result<()> {
    registry.register(Box::new(CURRENT_TERM.clone()))?;
    registry.register(Box::new(COMMIT_INDEX.clone()))?;
    registry.register(Box::new(ROLE_TRANSITIONS.clone()))?;
    registry.register(Box::new(APPLIED_ENTRIES.clone()))?;
    registry.register(Box::new(RPC_FAILURES.clone()))?;
    Ok(())
}

/// Renders the crate collectors followed by the autometrics function
/// metrics, in the Prometheus text exposition format.
pub fn gather_metrics() -> String {
    let encoder = prometheus::TextEncoder::new();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        error!("could not encode custom metrics: {}", e);
    };
    let mut res = match String::from_utf8(buffer) {
        Ok(v) => v,
        Err(e) => {
            error!("custom metrics could not be from_utf8'd: {}", e);
            String::default()
        }
    };

    res.push_str(&get_metrics_body());
    res
}

/// Export autometrics function metrics
pub fn get_metrics_body() -> String {
    prometheus_exporter::encode_http_response().into_body()
}
