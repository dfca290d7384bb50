use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Load balancer not found: {0}")]
    LoadBalancerNotFound(String),

    #[error("Command `{command}` failed: {message}")]
    Command { command: String, message: String },

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Kubernetes error: {0}")]
    KubernetesError(#[from] kube::error::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}
