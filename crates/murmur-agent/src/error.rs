use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("reasoning error: {0}")]
    Reasoner(String),

    #[error("tool error: {0}")]
    Tool(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}
