//! Response acceptance policy for the HTTP strategy.

use std::fmt;
use std::ops::RangeBounds;
use std::sync::Arc;

use reqwest::header::HeaderMap;

/// Predicate over a response status code.
pub type StatusMatcher = Arc<dyn Fn(u16) -> bool + Send + Sync>;

/// Predicate over a response body, cut off at [`MAX_BODY_BYTES`](crate::wait::MAX_BODY_BYTES).
pub type ResponseMatcher = Arc<dyn Fn(&[u8]) -> bool + Send + Sync>;

/// Predicate over response headers.
pub type HeadersMatcher = Arc<dyn Fn(&HeaderMap) -> bool + Send + Sync>;

/// Accept exactly `code`.
pub fn status_is(code: u16) -> impl Fn(u16) -> bool + Send + Sync + 'static {
    move |status: u16| status == code
}

/// Accept any status inside `range`, e.g. `200..300`.
pub fn status_in<R>(range: R) -> impl Fn(u16) -> bool + Send + Sync + 'static
where
    R: RangeBounds<u16> + Send + Sync + 'static,
{
    move |status: u16| range.contains(&status)
}

/// Accept bodies containing `needle` anywhere.
pub fn body_contains(needle: impl Into<Vec<u8>>) -> impl Fn(&[u8]) -> bool + Send + Sync + 'static {
    let needle = needle.into();
    move |body: &[u8]| {
        needle.is_empty() || body.windows(needle.len()).any(|window| window == needle)
    }
}

/// Status, headers and body predicates combined.
///
/// The status predicate always applies (default: `== 200`). The header and
/// body predicates are optional and impose no constraint when absent.
#[derive(Clone)]
pub struct AcceptancePolicy {
    status: StatusMatcher,
    headers: Option<HeadersMatcher>,
    body: Option<ResponseMatcher>,
}

impl Default for AcceptancePolicy {
    fn default() -> Self {
        Self {
            status: Arc::new(status_is(200)),
            headers: None,
            body: None,
        }
    }
}

impl AcceptancePolicy {
    pub(crate) fn set_status<F>(&mut self, matcher: F)
    where
        F: Fn(u16) -> bool + Send + Sync + 'static,
    {
        self.status = Arc::new(matcher);
    }

    pub(crate) fn set_headers<F>(&mut self, matcher: F)
    where
        F: Fn(&HeaderMap) -> bool + Send + Sync + 'static,
    {
        self.headers = Some(Arc::new(matcher));
    }

    pub(crate) fn set_body<F>(&mut self, matcher: F)
    where
        F: Fn(&[u8]) -> bool + Send + Sync + 'static,
    {
        self.body = Some(Arc::new(matcher));
    }

    /// Decide whether a response means "ready".
    ///
    /// Later predicates are not consulted once one rejects.
    pub fn accept(&self, status: u16, headers: &HeaderMap, body: &[u8]) -> bool {
        if !self.accepts_status(status) {
            return false;
        }
        if let Some(matcher) = &self.headers
            && !matcher(headers)
        {
            return false;
        }
        match &self.body {
            Some(matcher) => matcher(body),
            None => true,
        }
    }

    /// The status predicate alone. A response it rejects never needs its
    /// body read.
    pub fn accepts_status(&self, status: u16) -> bool {
        (self.status)(status)
    }

    pub fn has_body_matcher(&self) -> bool {
        self.body.is_some()
    }
}

impl fmt::Debug for AcceptancePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AcceptancePolicy")
            .field("headers", &self.headers.is_some())
            .field("body", &self.body.is_some())
            .finish_non_exhaustive()
    }
}
