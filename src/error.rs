use thiserror::Error;

/// Startup failures. These are fatal: the window never opens.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("{0} is not set; export your Gemini API key before starting")]
    MissingApiKey(&'static str),
}

/// Failures of a single call to the model endpoint.
#[derive(Debug, Clone, Error)]
pub enum EndpointError {
    #[error("request to the model failed: {0}")]
    Network(String),
    #[error("model API error: HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("the prompt was blocked by the model ({0})")]
    Blocked(String),
    #[error("the model returned no text")]
    EmptyResponse,
    #[error("could not decode the model response: {0}")]
    Decode(String),
}

/// Failures while turning a file or URL into something we can submit.
#[derive(Debug, Clone, Error)]
pub enum DocumentError {
    #[error("failed to download the document: {0}")]
    Fetch(String),
    #[error("failed to download the document: HTTP {0}")]
    HttpStatus(u16),
    #[error("failed to read {path}: {reason}")]
    Read { path: String, reason: String },
    #[error("unreadable document: {0}")]
    Unreadable(String),
    #[error("the document contains no text")]
    NoContent,
    #[error("could not decode the image: {0}")]
    Image(String),
}

impl DocumentError {
    /// True when the document could not be obtained at all, as opposed to
    /// obtained but not parsed.
    pub fn is_fetch_failure(&self) -> bool {
        matches!(self, DocumentError::Fetch(_) | DocumentError::HttpStatus(_))
    }
}

/// Everything that can stop a submission. None of these mutate a thread.
#[derive(Debug, Clone, Error)]
pub enum SubmitError {
    #[error("{0}")]
    MissingInput(&'static str),
    #[error(transparent)]
    Endpoint(#[from] EndpointError),
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error("the conversation changed while the reply was pending; please resend")]
    Stale,
}
