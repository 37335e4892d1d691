//! Transport error taxonomy and the predicates classifying it.
//!
//! Low-level failures arrive wrapped: a request-level [`TransportError::Url`]
//! around an operation-level [`TransportError::Op`] around a raw OS code, or
//! buried in the `source()` chain of the HTTP implementation's error. The
//! predicates here unwrap those layers so callers can react to a small, stable
//! set of causes.

use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::io;

use bytes::Bytes;
use http::{Method, Response};
use tokio::task::JoinError;

use crate::error::{BreakerError, Rejection};

/// The classified causes a transport failure can resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The upstream actively refused the connection.
    ConnectRefused,

    /// A dial attempt did not complete within the connect timeout.
    ConnectTimeout,

    /// A request attempt did not complete within the request timeout.
    RequestTimeout,

    /// The upstream answered with a 5xx status.
    StatusCode5XX,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::ConnectRefused => write!(f, "connect refused"),
            ErrorKind::ConnectTimeout => write!(f, "connect timeout"),
            ErrorKind::RequestTimeout => write!(f, "request timeout"),
            ErrorKind::StatusCode5XX => write!(f, "error 5XX"),
        }
    }
}

/// Error type for transport operations.
#[derive(Debug)]
pub enum TransportError {
    /// A cause raised directly by the transport.
    Kind(ErrorKind),

    /// The upstream answered 5xx. Holds the response so it can be handed back
    /// once retries are exhausted.
    Status(Box<Response<Bytes>>),

    /// Request-level wrapper naming the attempt that failed.
    Url {
        /// Method of the failed request.
        method: Method,
        /// Target of the failed request.
        url: String,
        /// What went wrong.
        source: Box<TransportError>,
    },

    /// Operation-level wrapper naming the network operation that failed.
    Op {
        /// Operation name, such as `dial`.
        op: &'static str,
        /// Remote address of the operation.
        addr: String,
        /// What went wrong.
        source: Box<TransportError>,
    },

    /// A raw operating system error code.
    Os(i32),

    /// An I/O failure without an OS error code.
    Io(io::Error),

    /// The request could not be built or sent as HTTP/1.1.
    Http(http::Error),

    /// The request is well-formed but cannot be sent by this transport.
    InvalidRequest(String),

    /// Failure inside the HTTP implementation.
    Hyper(hyper::Error),

    /// Failure reported by a custom transmitter.
    Other(Box<dyn Error + Send + Sync + 'static>),

    /// The transmission task panicked or was cancelled.
    Worker(JoinError),

    /// The breaker refused the request without sending it.
    Rejected(Rejection),

    /// No action was handed to the breaker.
    NilAction,
}

impl TransportError {
    /// Resolves the error to its classified cause, if it has one.
    pub fn kind(&self) -> Option<ErrorKind> {
        if is_connect_refused(self) {
            Some(ErrorKind::ConnectRefused)
        } else if is_connect_timeout(self) {
            Some(ErrorKind::ConnectTimeout)
        } else if is_request_timeout(self) {
            Some(ErrorKind::RequestTimeout)
        } else if is_status_5xx(self) {
            Some(ErrorKind::StatusCode5XX)
        } else {
            None
        }
    }

    /// Returns the breaker rejection, if the breaker refused the request.
    pub fn rejection(&self) -> Option<Rejection> {
        match self {
            TransportError::Rejected(r) => Some(*r),
            _ => None,
        }
    }

    pub(crate) fn op(op: &'static str, addr: impl Into<String>, source: TransportError) -> Self {
        TransportError::Op {
            op,
            addr: addr.into(),
            source: Box::new(source),
        }
    }

    pub(crate) fn url(method: Method, url: impl Into<String>, source: TransportError) -> Self {
        TransportError::Url {
            method,
            url: url.into(),
            source: Box::new(source),
        }
    }
}

/// Checks whether the connection was refused.
///
/// Matches a direct classification, the inner cause of a request or
/// operation wrapper, a raw `ECONNREFUSED` code, an I/O error of kind
/// `ConnectionRefused`, or any of those in an opaque error's source chain.
pub fn is_connect_refused(err: &TransportError) -> bool {
    match err {
        TransportError::Kind(kind) => *kind == ErrorKind::ConnectRefused,
        TransportError::Url { source, .. } | TransportError::Op { source, .. } => {
            is_connect_refused(source)
        }
        TransportError::Os(code) => is_refused_code(*code),
        TransportError::Io(e) => e.kind() == io::ErrorKind::ConnectionRefused,
        TransportError::Hyper(e) => chain_matches(e, &is_connect_refused),
        TransportError::Other(e) => chain_matches(e.as_ref(), &is_connect_refused),
        _ => false,
    }
}

/// Checks whether a dial attempt timed out.
pub fn is_connect_timeout(err: &TransportError) -> bool {
    classified_as(err, ErrorKind::ConnectTimeout)
}

/// Checks whether a request attempt timed out.
pub fn is_request_timeout(err: &TransportError) -> bool {
    classified_as(err, ErrorKind::RequestTimeout)
}

/// Checks whether the upstream answered with a 5xx status.
pub fn is_status_5xx(err: &TransportError) -> bool {
    match err {
        TransportError::Status(res) => res.status().is_server_error(),
        _ => classified_as(err, ErrorKind::StatusCode5XX),
    }
}

/// Checks whether the breaker refused the request.
pub fn is_breaker_error(err: &TransportError) -> bool {
    matches!(err, TransportError::Rejected(_))
}

fn classified_as(err: &TransportError, kind: ErrorKind) -> bool {
    match err {
        TransportError::Kind(k) => *k == kind,
        TransportError::Url { source, .. } | TransportError::Op { source, .. } => {
            classified_as(source, kind)
        }
        TransportError::Other(e) => chain_matches(e.as_ref(), &|t| classified_as(t, kind)),
        _ => false,
    }
}

fn is_refused_code(code: i32) -> bool {
    io::Error::from_raw_os_error(code).kind() == io::ErrorKind::ConnectionRefused
}

/// Walks `err` and its sources looking for a transport error or I/O error
/// that satisfies `predicate`.
fn chain_matches<'a>(
    err: &'a (dyn Error + 'static),
    predicate: &dyn Fn(&TransportError) -> bool,
) -> bool {
    let mut current: Option<&'a (dyn Error + 'static)> = Some(err);

    while let Some(e) = current {
        if let Some(transport) = e.downcast_ref::<TransportError>() {
            if predicate(transport) {
                return true;
            }
        }

        if let Some(io) = e.downcast_ref::<io::Error>() {
            let refused = io.kind() == io::ErrorKind::ConnectionRefused;
            if refused && predicate(&TransportError::Kind(ErrorKind::ConnectRefused)) {
                return true;
            }
        }

        current = e.source();
    }

    false
}

impl Display for TransportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Kind(kind) => write!(f, "{}", kind),
            TransportError::Status(res) => write!(f, "upstream responded {}", res.status()),
            TransportError::Url {
                method,
                url,
                source,
            } => write!(f, "{} {}: {}", method, url, source),
            TransportError::Op { op, addr, source } => write!(f, "{} {}: {}", op, addr, source),
            TransportError::Os(code) => write!(f, "{}", io::Error::from_raw_os_error(*code)),
            TransportError::Io(e) => write!(f, "{}", e),
            TransportError::Http(e) => write!(f, "invalid request: {}", e),
            TransportError::InvalidRequest(msg) => write!(f, "invalid request: {}", msg),
            TransportError::Hyper(e) => write!(f, "http error: {}", e),
            TransportError::Other(e) => write!(f, "{}", e),
            TransportError::Worker(e) => write!(f, "transmission task failed: {}", e),
            TransportError::Rejected(r) => write!(f, "breaker rejected request: {}", r),
            TransportError::NilAction => write!(f, "cannot call nil action"),
        }
    }
}

impl Error for TransportError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            TransportError::Url { source, .. } | TransportError::Op { source, .. } => {
                Some(source.as_ref())
            }
            TransportError::Io(e) => Some(e),
            TransportError::Http(e) => Some(e),
            TransportError::Hyper(e) => Some(e),
            TransportError::Other(e) => Some(e.as_ref()),
            TransportError::Worker(e) => Some(e),
            TransportError::Rejected(r) => Some(r),
            _ => None,
        }
    }
}

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        match err.raw_os_error() {
            Some(code) => TransportError::Os(code),
            None => TransportError::Io(err),
        }
    }
}

impl From<ErrorKind> for TransportError {
    fn from(kind: ErrorKind) -> Self {
        TransportError::Kind(kind)
    }
}

impl From<http::Error> for TransportError {
    fn from(err: http::Error) -> Self {
        TransportError::Http(err)
    }
}

impl From<hyper::Error> for TransportError {
    fn from(err: hyper::Error) -> Self {
        TransportError::Hyper(err)
    }
}

impl From<BreakerError<TransportError>> for TransportError {
    fn from(err: BreakerError<TransportError>) -> Self {
        match err {
            BreakerError::NilAction => TransportError::NilAction,
            BreakerError::Rejected(r) => TransportError::Rejected(r),
            BreakerError::Operation(e) => e,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refused_os_error() -> io::Error {
        io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused")
    }

    fn wrap_url(source: TransportError) -> TransportError {
        TransportError::url(Method::GET, "http://localhost:1/", source)
    }

    fn wrap_op(source: TransportError) -> TransportError {
        TransportError::op("dial", "localhost:1", source)
    }

    #[test]
    fn test_connect_refused_direct() {
        assert!(is_connect_refused(&ErrorKind::ConnectRefused.into()));
        assert!(!is_connect_refused(&ErrorKind::RequestTimeout.into()));
    }

    #[test]
    fn test_connect_refused_through_wrappers() {
        let err = wrap_url(wrap_op(ErrorKind::ConnectRefused.into()));
        assert!(is_connect_refused(&err));

        let err = wrap_op(TransportError::Io(refused_os_error()));
        assert!(is_connect_refused(&err));

        let err = wrap_url(wrap_op(TransportError::Io(io::Error::other("boom"))));
        assert!(!is_connect_refused(&err));
        assert_eq!(err.kind(), None);
    }

    #[test]
    fn test_connect_refused_from_real_socket() {
        // Reserve a port, then free it so nothing listens there.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = std::net::TcpStream::connect(addr).unwrap_err();
        let err = wrap_url(wrap_op(err.into()));

        assert!(is_connect_refused(&err));
        assert_eq!(err.kind(), Some(ErrorKind::ConnectRefused));
    }

    #[test]
    fn test_connect_refused_in_source_chain() {
        let inner = wrap_op(ErrorKind::ConnectRefused.into());
        let err = TransportError::Other(Box::new(inner));
        assert!(is_connect_refused(&err));

        let err = TransportError::Other(Box::new(refused_os_error()));
        assert!(is_connect_refused(&err));
    }

    #[test]
    fn test_timeouts() {
        let err = wrap_url(ErrorKind::RequestTimeout.into());
        assert!(is_request_timeout(&err));
        assert!(!is_connect_timeout(&err));
        assert_eq!(err.kind(), Some(ErrorKind::RequestTimeout));

        let err = wrap_url(wrap_op(ErrorKind::ConnectTimeout.into()));
        assert!(is_connect_timeout(&err));
        assert!(!is_request_timeout(&err));
    }

    #[test]
    fn test_status_5xx() {
        let res = Response::builder().status(503).body(Bytes::new()).unwrap();
        let err = TransportError::Status(Box::new(res));
        assert!(is_status_5xx(&err));
        assert_eq!(err.kind(), Some(ErrorKind::StatusCode5XX));
        assert!(err.to_string().contains("503"));
    }

    #[test]
    fn test_breaker_errors_flatten() {
        let err: TransportError =
            BreakerError::<TransportError>::Rejected(Rejection::ErrorRateExceeded).into();
        assert!(is_breaker_error(&err));
        assert_eq!(err.rejection(), Some(Rejection::ErrorRateExceeded));

        let err: TransportError =
            BreakerError::Operation(wrap_url(ErrorKind::RequestTimeout.into())).into();
        assert!(is_request_timeout(&err));
    }

    #[test]
    fn test_display_keeps_context() {
        let err = wrap_url(wrap_op(ErrorKind::ConnectRefused.into()));
        assert_eq!(
            err.to_string(),
            "GET http://localhost:1/: dial localhost:1: connect refused"
        );
    }
}
