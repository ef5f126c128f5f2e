//! Control-plane route table.

use crate::state::{ControlPlaneRoutes, ControlRoute};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ControlPlaneConfig {
    /// Replaces the default route of each listed operation
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<ControlRoute>,
    /// Answer 501 when a control-plane path is hit with the wrong method
    #[serde(default)]
    pub strict_methods: bool,
}

impl ControlPlaneConfig {
    pub fn to_routes(&self) -> ControlPlaneRoutes {
        ControlPlaneRoutes::with_overrides(&self.routes, self.strict_methods)
    }
}
