//! Decides how an invocation is served before any I/O happens.

use std::time::Duration;

use http::Method;

use todo_service_shared::{HealthStatus, ServiceInfo};

use crate::event::GatewayResponse;

/// Routes answered by the shim itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShortCircuit {
    Health,
    Root,
    Favicon,
}

impl ShortCircuit {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShortCircuit::Health => "health",
            ShortCircuit::Root => "root",
            ShortCircuit::Favicon => "favicon",
        }
    }

    /// Build the response. Never touches the database or the application.
    pub fn respond(&self, uptime: Duration) -> GatewayResponse {
        match self {
            ShortCircuit::Health => GatewayResponse::json(200, &HealthStatus::ok(uptime)),
            ShortCircuit::Root => GatewayResponse::json(200, &ServiceInfo::current()),
            ShortCircuit::Favicon => GatewayResponse::empty(204).with_cors(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    ShortCircuit(ShortCircuit),
    /// Under `/api`: the store must be connected before dispatch.
    RequiresDatabase,
    /// Dispatched without waiting for the store; a connect may start in the background.
    Stateless,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::ShortCircuit(_) => "short_circuit",
            Classification::RequiresDatabase => "requires_database",
            Classification::Stateless => "stateless",
        }
    }
}

/// Pure function of method and path.
///
/// An empty or malformed path is treated as the service root. `OPTIONS`
/// preflights are answered by the CORS layer and so never need the store.
pub fn classify(method: &Method, path: &str) -> Classification {
    if is_malformed(path) {
        return Classification::ShortCircuit(ShortCircuit::Root);
    }

    match path {
        "/favicon.ico" | "/favicon.png" => {
            return Classification::ShortCircuit(ShortCircuit::Favicon)
        }
        "/health" if method == Method::GET || method == Method::HEAD => {
            return Classification::ShortCircuit(ShortCircuit::Health)
        }
        "/" if method == Method::GET => return Classification::ShortCircuit(ShortCircuit::Root),
        _ => {}
    }

    if method == Method::OPTIONS {
        return Classification::Stateless;
    }
    if path == "/api" || path.starts_with("/api/") {
        Classification::RequiresDatabase
    } else {
        Classification::Stateless
    }
}

fn is_malformed(path: &str) -> bool {
    !path.starts_with('/') || path.parse::<http::uri::PathAndQuery>().is_err() || path.contains('?')
}
