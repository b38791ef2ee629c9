//! Request-scoped state shared between the access logger and handlers.
//!
//! The logger inserts a [`RequestScope`] into the request extensions before
//! running the rest of the chain. Handlers pick it up with the extractor and
//! append debug annotations or record errors; the logger reads both back
//! once the chain returns.

use std::convert::Infallible;
use std::fmt::{self, Write as _};
use std::sync::{Arc, Mutex, MutexGuard};

use axum::{
    async_trait,
    extract::{FromRequestParts, Request},
    http::{request::Parts, Extensions},
};
use tracing::trace;

/// Name under which debug annotations are reported.
pub const DEBUG_VALUES_KEY: &str = "Debug";

/// Visibility of an error attached to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorType {
    /// Internal detail, printed in the access log only.
    #[default]
    Private,
    /// Meant for the client; the access log skips it.
    Public,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestError {
    pub message: String,
    pub kind: ErrorType,
    pub meta: Option<String>,
}

impl RequestError {
    pub fn new(message: impl Into<String>, kind: ErrorType) -> Self {
        Self {
            message: message.into(),
            kind,
            meta: None,
        }
    }

    pub fn with_meta(mut self, meta: impl Into<String>) -> Self {
        self.meta = Some(meta.into());
        self
    }
}

/// Ordered list of errors, printed as numbered `Error #NN:` lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorList(Vec<RequestError>);

impl ErrorList {
    pub fn by_type(&self, kind: ErrorType) -> ErrorList {
        ErrorList(self.0.iter().filter(|e| e.kind == kind).cloned().collect())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RequestError> {
        self.0.iter()
    }
}

impl fmt::Display for ErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            writeln!(f, "Error #{:02}: {}", i + 1, err.message)?;
            if let Some(meta) = &err.meta {
                writeln!(f, "     Meta: {}", meta)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct ScopeState {
    debug_values: Option<Vec<String>>,
    errors: Vec<RequestError>,
}

/// Handle to the state of one request. Clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct RequestScope {
    inner: Arc<Mutex<ScopeState>>,
}

impl RequestScope {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, ScopeState> {
        // a panicking handler must not take the log entry down with it
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Appends `value` to the debug annotations of this request.
    pub fn add_debug_value(&self, value: impl Into<String>) {
        let value = value.into();
        trace!(key = DEBUG_VALUES_KEY, value = %value, "debug value added");
        self.state()
            .debug_values
            .get_or_insert_with(Vec::new)
            .push(value);
    }

    /// Annotations in insertion order, `None` if nothing was ever added.
    pub fn debug_values(&self) -> Option<Vec<String>> {
        self.state().debug_values.clone()
    }

    /// Renders annotations as `[a] [b] ` (each followed by a space).
    pub fn format_debug_values(&self) -> String {
        let state = self.state();
        let mut out = String::new();
        for value in state.debug_values.iter().flatten() {
            let _ = write!(out, "[{}] ", value);
        }
        out
    }

    pub fn push_error(&self, error: RequestError) {
        self.state().errors.push(error);
    }

    /// Records a private error, the default kind.
    pub fn error(&self, message: impl Into<String>) {
        self.push_error(RequestError::new(message, ErrorType::Private));
    }

    pub fn errors(&self) -> ErrorList {
        ErrorList(self.state().errors.clone())
    }

    /// Returns the scope attached to `request`, attaching a new one if absent.
    pub fn of(request: &mut Request) -> RequestScope {
        scope_in(request.extensions_mut())
    }
}

fn scope_in(extensions: &mut Extensions) -> RequestScope {
    if let Some(scope) = extensions.get::<RequestScope>() {
        return scope.clone();
    }
    let scope = RequestScope::new();
    extensions.insert(scope.clone());
    scope
}

/// Appends a debug annotation to the request's scope.
pub fn add_debug_value(request: &mut Request, value: impl Into<String>) {
    RequestScope::of(request).add_debug_value(value);
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestScope
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(scope_in(&mut parts.extensions))
    }
}
