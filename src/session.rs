//! Explicit session context shared by every backend-facing component.
//!
//! A [`Session`] bundles the backend base URL, the credentials, the extra
//! request headers and one pooled HTTP client. It is cheap to clone and is
//! passed by value or reference to the submitter, poller and dispatcher; two
//! sessions with different hosts or users can live side by side.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, RequestBuilder};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::user_agent;

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default overall request timeout (5 minutes, large resources stream for a while).
pub const REQUEST_TIMEOUT_SECS: u64 = 300;

/// Header used by the backend to act on behalf of another user.
pub const IMPERSONATE_HEADER: &str = "X-VDS-UserId";

/// Environment variable holding the basic-auth username.
pub const ENV_USER: &str = "VDS_USER";
/// Environment variable holding the basic-auth password.
pub const ENV_PASS: &str = "VDS_PASS";
/// Environment variable holding an OAuth bearer token.
pub const ENV_OAUTH_TOKEN: &str = "PL_VDS_OAUTH_TOKEN";

/// Errors raised while assembling a session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Username/password and a bearer token were both supplied.
    #[error("use either username/password or an OAuth token, not both")]
    ConflictingCredentials,

    /// The base URL could not be parsed.
    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),

    /// An extra header had an invalid name or value.
    #[error("invalid header {name}")]
    InvalidHeader {
        /// Offending header name.
        name: String,
    },

    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

/// Known backend deployments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    /// Public production deployment.
    #[default]
    Maps,
    /// Internal staging deployment.
    Staging,
}

impl Environment {
    /// Returns the host name of the deployment.
    #[must_use]
    pub fn host(self) -> &'static str {
        match self {
            Self::Maps => "maps.vandersat.com",
            Self::Staging => "staging.maps.planetary-variables.prod.planet-labs.com",
        }
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "maps" => Ok(Self::Maps),
            "staging" => Ok(Self::Staging),
            other => Err(format!(
                "unknown environment '{other}', choose from {{maps, staging}}"
            )),
        }
    }
}

/// Credentials attached to every request.
#[derive(Clone, Default, PartialEq, Eq)]
pub enum Credentials {
    /// Anonymous requests.
    #[default]
    None,
    /// HTTP basic authentication.
    Basic {
        /// Account user name.
        username: String,
        /// Account password.
        password: String,
    },
    /// OAuth bearer token.
    Bearer(String),
}

impl Credentials {
    /// Resolves credentials from explicit values, falling back to the
    /// `VDS_USER` / `VDS_PASS` / `PL_VDS_OAUTH_TOKEN` environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::ConflictingCredentials`] when a full
    /// username/password pair and a token are both supplied.
    pub fn resolve(
        username: Option<String>,
        password: Option<String>,
        token: Option<String>,
    ) -> Result<Self, SessionError> {
        let explicit = (username.is_some() && password.is_some()) || token.is_some();
        let (username, password, token) = if explicit {
            (username, password, token)
        } else {
            debug!("extracting credentials from environment variables");
            (
                username.or_else(|| env_non_empty(ENV_USER)),
                password.or_else(|| env_non_empty(ENV_PASS)),
                token.or_else(|| env_non_empty(ENV_OAUTH_TOKEN)),
            )
        };
        Self::from_parts(username, password, token)
    }

    /// Builds credentials from already-resolved parts.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::ConflictingCredentials`] when both forms are given.
    pub fn from_parts(
        username: Option<String>,
        password: Option<String>,
        token: Option<String>,
    ) -> Result<Self, SessionError> {
        match (username, password, token) {
            (Some(_), Some(_), Some(_)) => Err(SessionError::ConflictingCredentials),
            (_, _, Some(token)) => Ok(Self::Bearer(token)),
            (Some(username), Some(password), None) => Ok(Self::Basic { username, password }),
            _ => Ok(Self::None),
        }
    }

    fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        match self {
            Self::None => request,
            Self::Basic { username, password } => request.basic_auth(username, Some(password)),
            Self::Bearer(token) => request.bearer_auth(token),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Basic { username, .. } => write!(f, "Basic({username}, ***)"),
            Self::Bearer(_) => f.write_str("Bearer(***)"),
        }
    }
}

fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Backend session: base URL, credentials, headers and a pooled client.
#[derive(Debug, Clone)]
pub struct Session {
    base_url: Url,
    credentials: Credentials,
    headers: HeaderMap,
    client: Client,
}

impl Session {
    /// Starts building a session.
    #[must_use]
    pub fn builder() -> SessionBuilder {
        SessionBuilder::default()
    }

    /// Returns the backend base URL.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Returns the base URL without a trailing slash, for string templating.
    #[must_use]
    pub fn base(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }

    /// Returns the credentials in use.
    #[must_use]
    pub fn auth(&self) -> &Credentials {
        &self.credentials
    }

    /// Returns the extra headers sent with every request.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Joins a backend path (starting with `/`) onto the base URL.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base(), path)
    }

    /// Creates an authenticated GET request builder.
    pub(crate) fn get(&self, url: &str) -> RequestBuilder {
        let request = self.client.get(url).headers(self.headers.clone());
        self.credentials.apply(request)
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let user = match &self.credentials {
            Credentials::Basic { username, .. } => username.as_str(),
            Credentials::Bearer(_) => "token",
            Credentials::None => "anonymous",
        };
        let host = self.base_url.host_str().unwrap_or("?");
        match self.headers.get(IMPERSONATE_HEADER).and_then(|v| v.to_str().ok()) {
            Some(target) => write!(f, "{target} --impersonated by-- {user} @ {host}"),
            None => write!(f, "{user} @ {host}"),
        }
    }
}

/// Builder for [`Session`].
#[derive(Debug, Clone, Default)]
pub struct SessionBuilder {
    environment: Environment,
    base_url: Option<String>,
    credentials: Credentials,
    headers: Vec<(String, String)>,
    connect_timeout: Option<Duration>,
    request_timeout: Option<Duration>,
}

impl SessionBuilder {
    /// Targets a known deployment.
    #[must_use]
    pub fn environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// Targets an explicit base URL, overriding the environment.
    #[must_use]
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Sets the credentials.
    #[must_use]
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Adds an extra header sent with every request.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Acts on behalf of another user.
    #[must_use]
    pub fn impersonate(self, user_email: impl Into<String>) -> Self {
        self.header(IMPERSONATE_HEADER, user_email)
    }

    /// Overrides connect and overall request timeouts.
    #[must_use]
    pub fn timeouts(mut self, connect: Duration, request: Duration) -> Self {
        self.connect_timeout = Some(connect);
        self.request_timeout = Some(request);
        self
    }

    /// Builds the session and its HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] for an unparsable base URL, an invalid header,
    /// or a client build failure.
    pub fn build(self) -> Result<Session, SessionError> {
        let raw = self
            .base_url
            .unwrap_or_else(|| format!("https://{}", self.environment.host()));
        let base_url = Url::parse(&raw).map_err(|_| SessionError::InvalidBaseUrl(raw.clone()))?;

        let mut headers = HeaderMap::new();
        for (name, value) in self.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| SessionError::InvalidHeader { name: name.clone() })?;
            let header_value = HeaderValue::from_str(&value)
                .map_err(|_| SessionError::InvalidHeader { name: name.clone() })?;
            headers.insert(header_name, header_value);
        }

        let client = Client::builder()
            .connect_timeout(
                self.connect_timeout
                    .unwrap_or(Duration::from_secs(CONNECT_TIMEOUT_SECS)),
            )
            .timeout(
                self.request_timeout
                    .unwrap_or(Duration::from_secs(REQUEST_TIMEOUT_SECS)),
            )
            .gzip(true)
            .user_agent(user_agent::default_user_agent())
            .build()
            .map_err(SessionError::Client)?;

        debug!(base_url = %base_url, credentials = ?self.credentials, "session created");

        Ok(Session {
            base_url,
            credentials: self.credentials,
            headers,
            client,
        })
    }
}
