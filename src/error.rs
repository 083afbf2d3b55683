// Error types for the graphics core
//
// Only the fatal tier lives here. Recoverable failures (shader compile/link,
// texture decode, unknown handles) are logged and reported as `Handle::NONE`.

use thiserror::Error;

pub type BackendResult<T> = Result<T, BackendError>;

/// Unrecoverable environment or hardware mismatch.
///
/// Returned up to the single top-level caller, which decides whether to
/// abort. No variant is ever retried with reduced requirements.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("could not create window: {0}")]
    Window(String),

    #[error("could not create graphics context: {0}")]
    Context(String),

    #[error("could not create instance: {0}")]
    Instance(String),

    #[error("could not create window surface: {0}")]
    Surface(String),

    #[error("no suitable GPU found")]
    NoSuitableGpu,

    #[error("could not create logical device: {0}")]
    Device(String),

    #[error("could not create swapchain: {0}")]
    Swapchain(String),

    #[error("could not create image views: {0}")]
    ImageViews(String),

    #[error("could not create render pass: {0}")]
    RenderPass(String),

    #[error("could not create frame resources: {0}")]
    FrameResources(String),

    #[error("could not create graphics pipeline: {0}")]
    Pipeline(String),

    #[error("frame submission failed: {0}")]
    Frame(String),

    #[error("backend `{0}` was not compiled into this build")]
    Unavailable(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_the_failed_stage() {
        let err = BackendError::Swapchain("ERROR_SURFACE_LOST_KHR".into());
        assert_eq!(
            err.to_string(),
            "could not create swapchain: ERROR_SURFACE_LOST_KHR"
        );
    }

    #[test]
    fn test_no_suitable_gpu_message() {
        assert_eq!(BackendError::NoSuitableGpu.to_string(), "no suitable GPU found");
    }

    #[test]
    fn test_unavailable_backend_message() {
        let err = BackendError::Unavailable("vulkan");
        assert!(err.to_string().contains("`vulkan`"));
    }

    #[test]
    fn test_converts_into_anyhow() {
        let err: anyhow::Error = BackendError::Pipeline("layout".into()).into();
        assert!(err.to_string().starts_with("could not create graphics pipeline"));
    }
}
