use thiserror::Error;

use crate::core::route::Resolution;

/// Errors surfaced by tenant resolution.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ResolveError {
    /// Both API versions answered, neither knows the tenant.
    #[error("tenant is not registered")]
    NotFound,

    /// All retries of both API versions failed at the transport layer.
    #[error("resolution backend unavailable: {0}")]
    Unavailable(String),

    /// The backend answered 200 with a body that does not decode.
    #[error("resolution backend returned an undecodable body: {0}")]
    InvalidResponse(String),

    /// The tenant resolved but its route list is empty.
    #[error("resolution contained no routes")]
    NoRoutes,
}

/// Resolver defines the port (interface) for mapping a tenant key onto an
/// ordered route list.
pub trait Resolver: Send + Sync + 'static {
    /// Resolve a tenant to its current routes.
    ///
    /// # Arguments
    /// * `tenant` - The tenant key extracted from the request host
    ///
    /// # Returns
    /// A future that resolves to the tenant's resolution or an error
    fn resolve(
        &self,
        tenant: &str,
    ) -> impl std::future::Future<Output = Result<Resolution, ResolveError>> + Send;
}
