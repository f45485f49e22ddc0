use thiserror::Error;

const MISSING_SCOPE_MESSAGE: &str = "Missing the 'notifications' scope";
const RATE_LIMIT_MESSAGES: &[&str] = &[
    "API rate limit exceeded",
    "You have exceeded a secondary rate limit",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    BadCredentials,
    MissingScopes,
    RateLimited,
    Network,
    Unknown,
}

impl FailureKind {
    pub fn title(self) -> &'static str {
        match self {
            FailureKind::BadCredentials => "Bad Credentials",
            FailureKind::MissingScopes => "Missing Scopes",
            FailureKind::RateLimited => "Rate Limited",
            FailureKind::Network => "Network Error",
            FailureKind::Unknown => "Oops! Something went wrong",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            FailureKind::BadCredentials => "The token you are using is invalid.",
            FailureKind::MissingScopes => "Your credentials are missing a required API scope.",
            FailureKind::RateLimited => "Please wait a while before trying again.",
            FailureKind::Network => {
                "Unable to connect to one or more of your GitHub hosts. Please check your network connection, including any VPNs, and try again."
            }
            FailureKind::Unknown => "Please try again later.",
        }
    }
}

/// A failed GitHub API call, classified once at the adapter boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}: {message}", .kind.title())]
pub struct GitifyError {
    pub kind: FailureKind,
    pub message: String,
}

impl GitifyError {
    pub fn new(kind: FailureKind) -> Self {
        Self {
            kind,
            message: kind.description().to_owned(),
        }
    }

    pub fn with_message(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Maps a non-2xx response onto the failure taxonomy.
///
/// `rate_limit_remaining` is the raw `x-ratelimit-remaining` header and
/// `body_message` the `message` field of GitHub's JSON error body, if any.
pub fn classify_status(
    status: u16,
    rate_limit_remaining: Option<&str>,
    body_message: Option<&str>,
) -> FailureKind {
    match status {
        401 => FailureKind::BadCredentials,
        403 => {
            let message = body_message.unwrap_or_default();
            if message.contains(MISSING_SCOPE_MESSAGE) {
                FailureKind::MissingScopes
            } else if rate_limit_remaining.map(str::trim) == Some("0")
                || RATE_LIMIT_MESSAGES
                    .iter()
                    .any(|needle| message.contains(needle))
            {
                FailureKind::RateLimited
            } else {
                FailureKind::BadCredentials
            }
        }
        429 => FailureKind::RateLimited,
        _ => FailureKind::Unknown,
    }
}
