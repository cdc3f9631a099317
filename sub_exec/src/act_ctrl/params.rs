//! Parameters structure for ActCtrl

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;

use super::Bindings;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for Actuation control.
#[derive(Debug, Default, Deserialize)]
pub struct Params {
    // ---- LIGHT ----

    /// Duty applied the first time the light is switched on.
    ///
    /// Units: percent
    pub light_initial_duty: u8,

    /// Step applied per dim/brighten press.
    ///
    /// Units: percent
    pub light_step: u8,

    /// Lowest duty the dim button may reach.
    ///
    /// Units: percent
    pub light_min_duty: u8,

    /// Highest duty the brighten button may reach.
    ///
    /// Units: percent
    pub light_max_duty: u8,

    // ---- BINDINGS ----

    /// Raw event code to function bindings.
    pub bindings: Bindings,
}
