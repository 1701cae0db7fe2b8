pub mod audit;
pub mod config;
pub mod models;
pub mod pipeline;

pub use audit::{AuditRecord, AuditSink, JsonLinesAuditSink, MemoryAuditSink, TracingAuditSink};
pub use pipeline::assembly::{AssemblyError, FragmentSet, ReportAssembler, ReportDocument};
pub use pipeline::registry::{ConfigError, KpiSchemaRegistry};

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber. `RUST_LOG` wins over the default
/// filter. Safe to call more than once; later calls are ignored.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .with_writer(std::io::stderr)
        .try_init();
}
