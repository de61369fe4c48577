use axum::body::Body as AxumBody;
use hyper::{Request, Response};

/// HttpHandler defines the port for handling gateway requests.
///
/// Handlers are infallible at the type level: every failure mode maps to an
/// HTTP error response so the server adapter never needs its own error
/// branch.
pub trait HttpHandler: Send + Sync + 'static {
    /// Handle an incoming HTTP request.
    fn handle_request(
        &self,
        req: Request<AxumBody>,
    ) -> impl std::future::Future<Output = Response<AxumBody>> + Send;
}
