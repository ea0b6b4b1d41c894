use std::net::{IpAddr, SocketAddr};

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use deployment::Deployment;

use crate::{DeploymentImpl, error::ApiError};

fn client_ip(req: &Request) -> IpAddr {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip())
        .unwrap_or(IpAddr::from([127, 0, 0, 1]))
}

/// Rejects registrations with 429 once the caller's hourly quota is spent.
pub async fn limit_registrations(
    State(deployment): State<DeploymentImpl>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !deployment.registration_limiter().check(client_ip(&req)) {
        return Err(ApiError::RateLimited(
            "Too many registration attempts. Please try again later.".to_string(),
        ));
    }
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;

    use super::*;

    #[test]
    fn client_ip_comes_from_connect_info() {
        let mut req = Request::new(Body::empty());
        assert_eq!(client_ip(&req), IpAddr::from([127, 0, 0, 1]));

        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([203, 0, 113, 7], 51000))));
        assert_eq!(client_ip(&req), IpAddr::from([203, 0, 113, 7]));
    }
}
