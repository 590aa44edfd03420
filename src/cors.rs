use anyhow::Context;
use axum::http::{header, HeaderValue, Method};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

/// Build the CORS layer attached to all routes.
///
/// With an `origin`, only that origin may make credentialed requests.
/// Without one, any origin may make uncredentialed requests.
pub fn layer(origin: Option<&str>) -> anyhow::Result<CorsLayer> {
    let cors = CorsLayer::new()
        .allow_headers([header::ACCEPT, header::CONTENT_TYPE, header::ORIGIN])
        .allow_methods([Method::GET, Method::OPTIONS, Method::POST]);

    match origin {
        Some(origin) => {
            let origin = HeaderValue::from_str(origin)
                .with_context(|| format!("Invalid CORS origin: {}", origin))?;

            Ok(cors
                .allow_origin(AllowOrigin::exact(origin))
                .allow_credentials(true))
        }
        None => Ok(cors.allow_origin(Any)),
    }
}
