mod download;
mod health;
mod iterations;

use crate::api::response::ApiError;
use crate::pipeline::PipelineError;

pub use download::get_project_file;
pub use health::{connection_check, health_check};
pub use iterations::{edit_iteration, remove_iteration, upload_iteration};

/// Map a PipelineError to an ApiError
fn pipeline_error(e: PipelineError) -> ApiError {
    match e {
        PipelineError::Rejected { code, message } => ApiError::bad_request(code, message),
        PipelineError::Failed { code, message } => ApiError::internal_with_code(code, message),
        other => ApiError::internal(other.to_string()),
    }
}
