//! Control-plane route table.

use crate::model::HttpRequest;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Operations the control plane can serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlOperation {
    Expectation,
    Clear,
    Reset,
    Retrieve,
    Verify,
    VerifySequence,
    DumpToLog,
    Metrics,
}

impl ControlOperation {
    pub const ALL: [ControlOperation; 8] = [
        ControlOperation::Expectation,
        ControlOperation::Clear,
        ControlOperation::Reset,
        ControlOperation::Retrieve,
        ControlOperation::Verify,
        ControlOperation::VerifySequence,
        ControlOperation::DumpToLog,
        ControlOperation::Metrics,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ControlOperation::Expectation => "expectation",
            ControlOperation::Clear => "clear",
            ControlOperation::Reset => "reset",
            ControlOperation::Retrieve => "retrieve",
            ControlOperation::Verify => "verify",
            ControlOperation::VerifySequence => "verify_sequence",
            ControlOperation::DumpToLog => "dump_to_log",
            ControlOperation::Metrics => "metrics",
        }
    }

    fn default_route(self) -> ControlRoute {
        let (method, path, proxy) = match self {
            ControlOperation::Expectation => ("PUT", "/expectation", false),
            ControlOperation::Clear => ("PUT", "/clear", true),
            ControlOperation::Reset => ("PUT", "/reset", true),
            ControlOperation::Retrieve => ("PUT", "/retrieve", true),
            ControlOperation::Verify => ("PUT", "/verify", true),
            ControlOperation::VerifySequence => ("PUT", "/verifySequence", true),
            ControlOperation::DumpToLog => ("PUT", "/dumpToLog", true),
            ControlOperation::Metrics => ("GET", "/metrics", true),
        };
        ControlRoute {
            operation: self,
            method: method.to_string(),
            path: path.to_string(),
            proxy,
        }
    }
}

impl fmt::Display for ControlOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where one operation is served.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlRoute {
    pub operation: ControlOperation,
    pub method: String,
    pub path: String,
    /// Whether the route is also served when running as a pure proxy
    #[serde(default = "default_true")]
    pub proxy: bool,
}

fn default_true() -> bool {
    true
}

/// Result of looking a request up in the route table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteMatch {
    Operation(ControlOperation),
    /// Known control-plane path reached with the wrong method
    WrongMethod(ControlOperation),
    NotControlPlane,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlPlaneRoutes {
    routes: Vec<ControlRoute>,
    strict_methods: bool,
}

impl Default for ControlPlaneRoutes {
    fn default() -> Self {
        Self {
            routes: ControlOperation::ALL
                .iter()
                .map(|operation| operation.default_route())
                .collect(),
            strict_methods: false,
        }
    }
}

impl ControlPlaneRoutes {
    /// Default table with `overrides` replacing the routes of the operations
    /// they name.
    pub fn with_overrides(overrides: &[ControlRoute], strict_methods: bool) -> Self {
        let mut table = Self::default();
        for route in overrides {
            match table
                .routes
                .iter_mut()
                .find(|existing| existing.operation == route.operation)
            {
                Some(existing) => *existing = route.clone(),
                None => table.routes.push(route.clone()),
            }
        }
        table.strict_methods = strict_methods;
        table
    }

    pub fn routes(&self) -> &[ControlRoute] {
        &self.routes
    }

    pub fn strict_methods(&self) -> bool {
        self.strict_methods
    }

    pub fn resolve(&self, request: &HttpRequest, is_proxy: bool) -> RouteMatch {
        let mut wrong_method = None;
        for route in &self.routes {
            if is_proxy && !route.proxy {
                continue;
            }
            if route.path != request.path {
                continue;
            }
            if request.method.eq_ignore_ascii_case(&route.method) {
                return RouteMatch::Operation(route.operation);
            }
            wrong_method.get_or_insert(route.operation);
        }
        match wrong_method {
            Some(operation) if self.strict_methods => RouteMatch::WrongMethod(operation),
            _ => RouteMatch::NotControlPlane,
        }
    }
}
