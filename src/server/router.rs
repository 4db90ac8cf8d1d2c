use crate::discovery::WELL_KNOWN_OPENID_CONFIGURATION;
use hyper::Method;

pub const WELL_KNOWN_JWKS: &str = "/.well-known/jwks.json";

#[derive(Debug, PartialEq)]
pub enum Route {
    Discovery,
    Jwks,
    Healthz,
    Metrics,
    MethodNotAllowed,
    Unknown,
}

pub fn parse(method: &Method, path: &str, jwks_path: &str) -> Route {
    let route = match path {
        WELL_KNOWN_OPENID_CONFIGURATION => Route::Discovery,
        WELL_KNOWN_JWKS => Route::Jwks,
        "/healthz" => Route::Healthz,
        "/metrics" => Route::Metrics,
        path if path == jwks_path => Route::Jwks,
        _ => return Route::Unknown,
    };

    if method == Method::GET || method == Method::HEAD {
        route
    } else {
        Route::MethodNotAllowed
    }
}
