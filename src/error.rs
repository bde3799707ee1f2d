use std::fmt;

// =========================================================
// 错误类别 (Error Kinds)
// =========================================================

/// Error kinds, each with its own handling policy in the views.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request could not complete (connection, timeout, DNS).
    Network,
    /// 401, or a missing/expired/undecodable token. Always routes to login.
    Auth,
    /// Detected on the client before any request was sent.
    Validation,
    /// Non-2xx answer from the server other than 401.
    ServerRejection,
    /// A 2xx body that does not match the expected shape.
    Serialization,
    /// The local session storage failed.
    Storage,
}

impl ErrorKind {
    pub fn error_code(&self) -> &'static str {
        match self {
            ErrorKind::Network => "NETWORK_ERROR",
            ErrorKind::Auth => "AUTH_ERROR",
            ErrorKind::Validation => "VALIDATION_ERROR",
            ErrorKind::ServerRejection => "SERVER_REJECTION",
            ErrorKind::Serialization => "RESPONSE_PARSE_ERROR",
            ErrorKind::Storage => "STORAGE_ERROR",
        }
    }
}

// =========================================================
// 错误上下文追踪
// =========================================================

/// One step of the operation trail recorded on an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorSpan {
    /// Operation name, e.g. "api.send", "booking.submit"
    pub operation: String,
    pub detail: Option<String>,
}

impl ErrorSpan {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            detail: None,
        }
    }

    pub fn with_detail(operation: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            detail: Some(detail.into()),
        }
    }
}

// =========================================================
// 核心错误类型 (ClientError)
// =========================================================

/// Client-side error.
///
/// - kind: what went wrong, and therefore how the view reacts
/// - message: text fit to show inline (server messages are kept verbatim)
/// - status: HTTP status, when a response was received
/// - from_server: whether `message` is the server's own text
/// - source: underlying error, for debugging
/// - spans: operation trail
#[derive(Debug)]
pub struct ClientError {
    pub kind: ErrorKind,
    pub message: String,
    status: Option<u16>,
    from_server: bool,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
    spans: Vec<ErrorSpan>,
}

impl ClientError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            from_server: false,
            source: None,
            spans: Vec::new(),
        }
    }

    // --- 便捷构造函数 ---

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Auth, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    /// Rejection carrying the server's own message.
    pub fn rejected(status: u16, message: impl Into<String>) -> Self {
        let mut e = Self::new(ErrorKind::ServerRejection, message);
        e.status = Some(status);
        e.from_server = true;
        e
    }

    /// Rejection whose response had no usable message.
    pub fn rejected_silently(status: u16) -> Self {
        let mut e = Self::new(
            ErrorKind::ServerRejection,
            format!("request failed with status {}", status),
        );
        e.status = Some(status);
        e
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Serialization, message)
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Storage, message)
    }

    // --- 上下文构建 ---

    pub fn in_op(mut self, operation: impl Into<String>) -> Self {
        self.spans.push(ErrorSpan::new(operation));
        self
    }

    pub fn in_op_with(mut self, operation: impl Into<String>, detail: impl Into<String>) -> Self {
        self.spans.push(ErrorSpan::with_detail(operation, detail));
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_source<E: std::error::Error + Send + Sync + 'static>(mut self, source: E) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    // --- 访问器 ---

    pub fn error_code(&self) -> &'static str {
        self.kind.error_code()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn spans(&self) -> &[ErrorSpan] {
        &self.spans
    }

    /// The server's message, verbatim, if the server supplied one.
    pub fn server_message(&self) -> Option<&str> {
        self.from_server.then_some(self.message.as_str())
    }

    pub fn is_auth(&self) -> bool {
        self.kind == ErrorKind::Auth
    }

    pub fn is_validation(&self) -> bool {
        self.kind == ErrorKind::Validation
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.error_code(), self.message)?;

        if !self.spans.is_empty() {
            write!(f, " | trace: ")?;
            for (i, span) in self.spans.iter().enumerate() {
                if i > 0 {
                    write!(f, " -> ")?;
                }
                write!(f, "{}", span.operation)?;
                if let Some(detail) = &span.detail {
                    write!(f, "({})", detail)?;
                }
            }
        }
        Ok(())
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

pub type ClientResult<T> = std::result::Result<T, ClientError>;

// =========================================================
// 类型转换 (Conversions)
// =========================================================

/// Failures of the on-disk session storage.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("session file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("session file is not valid JSON: {0}")]
    Corrupt(#[from] serde_json::Error),
}

impl From<StorageError> for ClientError {
    fn from(e: StorageError) -> Self {
        ClientError::storage(e.to_string()).with_source(e)
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        let msg = if e.is_timeout() {
            "request timed out".to_string()
        } else {
            e.to_string()
        };
        ClientError::network(msg).with_source(e)
    }
}
