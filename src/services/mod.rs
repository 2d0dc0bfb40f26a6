pub mod alert_service;
pub mod connection_service;
pub mod pipeline_service;

pub use alert_service::AlertService;
pub use connection_service::ConnectionService;
pub use pipeline_service::{PipelineDraft, PipelineService};
