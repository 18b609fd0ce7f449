pub mod extract;
pub mod graph;
pub mod handlers;
pub mod templates;

pub use extract::{apply_extracted_fields, AiResponseParser, ExtractedFields};
pub use graph::{
    build_execution_order, ExecutionContext, NodeKind, NodeOutcome, WorkflowExecutor,
    WorkflowRunResult,
};
pub use handlers::HandlerEnv;
pub use templates::{
    available_templates, install_template, lead_qualification_template, TemplateInfo,
};
