/// Proxy core for veil: middleware pipelines composed over a backend handle.
///
/// Two pipelines share one composition kernel:
///
/// ```text
/// Tool pipeline:     audit > pii-tool > backend
/// Resource pipeline:         pii-resource > backend
/// ```
///
/// The onion order is load-bearing: the audit layer wraps the PII layer so
/// its post-processing only ever observes already-redacted responses. That
/// ordering, not convention, is what keeps raw PII out of the audit stream.
pub mod audit;
pub mod backend;
pub mod pii;
pub mod pipeline;
pub mod proxy;
pub mod sink;

pub use audit::AuditLayer;
pub use pii::{PiiResourceLayer, PiiToolLayer};
pub use pipeline::{Layer, Next, Pipeline, Terminal};
pub use proxy::VeilProxy;
pub use sink::{InMemorySink, JsonLineSink};
