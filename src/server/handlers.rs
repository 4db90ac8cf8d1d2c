use crate::metrics_provider::METRICS_PROVIDER;
use crate::server::router::{self, Route};
use crate::server::{Error, ResponseBody, ServerContext};
use hyper::header::{HeaderValue, ALLOW, CACHE_CONTROL, CONTENT_TYPE};
use hyper::{Method, Response, StatusCode};
use serde::Serialize;
use serde_json::json;

pub const JWK_SET_CONTENT_TYPE: &str = "application/jwk-set+json";
const JSON_CONTENT_TYPE: &str = "application/json";

/// Dispatch a request. Every response is a pure function of the current snapshot.
pub fn route(
    context: &ServerContext,
    method: &Method,
    path: &str,
) -> Result<Response<ResponseBody>, Error> {
    match router::parse(method, path, &context.jwks_path) {
        Route::Discovery => handle_get_discovery(context),
        Route::Jwks => handle_get_jwks(context),
        Route::Healthz => handle_get_healthz(context),
        Route::Metrics => handle_get_metrics(),
        Route::MethodNotAllowed => Err(Error::MethodNotAllowed),
        Route::Unknown => Err(Error::NotFound),
    }
}

fn handle_get_discovery(context: &ServerContext) -> Result<Response<ResponseBody>, Error> {
    let snapshot = context.cache.get();
    if !snapshot.is_primed() {
        return Err(Error::NotReady);
    }

    let body = serde_json::to_vec(&snapshot.metadata)?;

    let mut response = fixed_response(StatusCode::OK, JSON_CONTENT_TYPE, body);
    response
        .headers_mut()
        .insert(CACHE_CONTROL, context.cache_control.clone());
    Ok(response)
}

fn handle_get_jwks(context: &ServerContext) -> Result<Response<ResponseBody>, Error> {
    let snapshot = context.cache.get();
    if !snapshot.is_primed() {
        return Err(Error::NotReady);
    }

    let mut response = fixed_response(StatusCode::OK, JWK_SET_CONTENT_TYPE, snapshot.jwks.clone());
    response
        .headers_mut()
        .insert(CACHE_CONTROL, context.cache_control.clone());
    Ok(response)
}

fn handle_get_healthz(context: &ServerContext) -> Result<Response<ResponseBody>, Error> {
    if !context.cache.get().is_primed() {
        return Err(Error::NotReady);
    }

    Ok(fixed_response(
        StatusCode::OK,
        JSON_CONTENT_TYPE,
        r#"{"status":"ok"}"#,
    ))
}

fn handle_get_metrics() -> Result<Response<ResponseBody>, Error> {
    let (content_type, metrics) = METRICS_PROVIDER.gather()?;

    let mut response = Response::new(ResponseBody::fixed(metrics));
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_str(&content_type)?);
    Ok(response)
}

fn fixed_response(
    status: StatusCode,
    content_type: &'static str,
    body: impl Into<hyper::body::Bytes>,
) -> Response<ResponseBody> {
    let mut response = Response::new(ResponseBody::fixed(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

pub fn error_to_response<T>(error: &Error, details: T) -> Response<ResponseBody>
where
    T: Serialize,
{
    let body = json!({
        "errors": [{
            "code": error.code(),
            "message": error.public_message(),
            "detail": details
        }]
    });

    let mut response = fixed_response(error.status(), JSON_CONTENT_TYPE, body.to_string());

    if matches!(error, Error::MethodNotAllowed) {
        response
            .headers_mut()
            .insert(ALLOW, HeaderValue::from_static("GET, HEAD"));
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::{ProviderMetadata, Snapshot, SnapshotCache};
    use bytes::Bytes;
    use chrono::Utc;
    use http_body_util::BodyExt;
    use serde_json::Value;
    use std::sync::Arc;
    use std::time::Duration;

    static UPSTREAM_DISCOVERY: &str = r#"{
        "issuer": "https://api.example:6443",
        "jwks_uri": "https://api.example:6443/openid/v1/jwks",
        "response_types_supported": ["id_token"],
        "subject_types_supported": ["public"],
        "id_token_signing_alg_values_supported": ["RS256"]
    }"#;

    static UPSTREAM_JWKS: &str = r#"{"keys":[{"use":"sig","kty":"RSA","kid":"abc","alg":"RS256","n":"xGOr","e":"AQAB"}]}"#;

    fn context(cache: Arc<SnapshotCache>) -> ServerContext {
        ServerContext::new(cache, "/jwks".to_string(), Duration::from_secs(300)).unwrap()
    }

    fn primed_context() -> ServerContext {
        let metadata: ProviderMetadata = serde_json::from_str(UPSTREAM_DISCOVERY).unwrap();
        let cache = Arc::new(SnapshotCache::new());
        cache.set(Snapshot::new(
            metadata.republish("/jwks"),
            Bytes::from_static(UPSTREAM_JWKS.as_bytes()),
            Utc::now(),
        ));
        context(cache)
    }

    async fn body_bytes(response: Response<ResponseBody>) -> Bytes {
        response.into_body().collect().await.unwrap().to_bytes()
    }

    #[tokio::test]
    async fn test_discovery_points_jwks_uri_at_issuer() {
        let context = primed_context();

        let response = route(&context, &Method::GET, "/.well-known/openid-configuration").unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(response.headers()[CACHE_CONTROL], "public, max-age=300");

        let body: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(body["issuer"], "https://api.example:6443");
        assert_eq!(body["jwks_uri"], "https://api.example:6443/jwks");
        assert_eq!(body["id_token_signing_alg_values_supported"][0], "RS256");
    }

    #[tokio::test]
    async fn test_jwks_is_served_verbatim() {
        let context = primed_context();

        for path in ["/jwks", "/.well-known/jwks.json"] {
            let response = route(&context, &Method::GET, path).unwrap();

            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(response.headers()[CONTENT_TYPE], JWK_SET_CONTENT_TYPE);
            assert_eq!(body_bytes(response).await, UPSTREAM_JWKS.as_bytes());
        }
    }

    #[tokio::test]
    async fn test_healthz() {
        let response = route(&primed_context(), &Method::GET, "/healthz").unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_bytes(response).await, r#"{"status":"ok"}"#.as_bytes());

        let unprimed = context(Arc::new(SnapshotCache::new()));
        let error = route(&unprimed, &Method::GET, "/healthz").unwrap_err();
        assert_eq!(error, Error::NotReady);
    }

    #[test]
    fn test_unprimed_cache_is_not_ready() {
        let context = context(Arc::new(SnapshotCache::new()));

        let error = route(&context, &Method::GET, "/.well-known/openid-configuration").unwrap_err();
        assert_eq!(error.status(), StatusCode::SERVICE_UNAVAILABLE);

        let error = route(&context, &Method::GET, "/jwks").unwrap_err();
        assert_eq!(error, Error::NotReady);
    }

    #[test]
    fn test_unknown_route_and_method() {
        let context = primed_context();

        let error = route(&context, &Method::GET, "/openid/v1/jwks").unwrap_err();
        assert_eq!(error, Error::NotFound);

        let error = route(&context, &Method::POST, "/jwks").unwrap_err();
        assert_eq!(error, Error::MethodNotAllowed);
    }

    #[tokio::test]
    async fn test_metrics() {
        let response = route(&primed_context(), &Method::GET, "/metrics").unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers()[CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/plain"));
    }

    #[tokio::test]
    async fn test_error_response_hides_internal_detail() {
        let error = Error::Internal("secret upstream address 10.0.0.1".to_string());

        let response = error_to_response(&error, json!({}));

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_bytes(response).await;
        let body = String::from_utf8(body.to_vec()).unwrap();
        assert!(body.contains("INTERNAL_SERVER_ERROR"));
        assert!(!body.contains("10.0.0.1"));
    }

    #[test]
    fn test_method_not_allowed_sets_allow_header() {
        let response = error_to_response(&Error::MethodNotAllowed, json!({}));

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[ALLOW], "GET, HEAD");
    }
}
