pub mod backend;
pub mod hash;
pub mod router;

pub use backend::{Backend, BackendError, BackendType, ByteRange, MetricsSink, TracingMetricsSink};
pub use router::{RouterError, StorageRouter};
