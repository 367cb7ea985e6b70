// Copyright (c) Asymptotic Labs
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Boogie translation options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BoogieOptions {
    /// Whether literals are wrapped in `Lit` markers. Dropping them is sound but may make
    /// fewer literal computations provable.
    pub use_literal_hints: bool,
    /// Whether quantifiers carrying an induction hint are proved by induction.
    pub induction_enabled: bool,
    /// Call graph height below which called predicates are inlined when splitting. `None`
    /// uses the height of the declaration being verified.
    pub inline_depth_limit: Option<usize>,
    /// Unfolding depth for assumptions, when no fuel annotation applies.
    pub default_fuel_low: u32,
    /// Unfolding depth for assertions, when no fuel annotation applies.
    pub default_fuel_high: u32,
    /// Whether frame axioms are emitted for the closure projections.
    pub emit_closure_frame_axioms: bool,
    /// A preamble replacing the built-in one.
    pub prelude_path: Option<PathBuf>,
}

impl Default for BoogieOptions {
    fn default() -> Self {
        Self {
            use_literal_hints: true,
            induction_enabled: true,
            inline_depth_limit: None,
            default_fuel_low: 1,
            default_fuel_high: 2,
            emit_closure_frame_axioms: true,
            prelude_path: None,
        }
    }
}

impl BoogieOptions {
    /// The inlining limit for a declaration of the given call graph height.
    pub fn inline_limit(&self, height: usize) -> usize {
        self.inline_depth_limit.unwrap_or(height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let options: BoogieOptions = toml::from_str("default_fuel_low = 3").unwrap();
        assert_eq!(options.default_fuel_low, 3);
        assert_eq!(options.default_fuel_high, 2);
        assert!(options.use_literal_hints);
        assert_eq!(options.inline_limit(4), 4);
        assert!(toml::from_str::<BoogieOptions>("no_such_option = 1").is_err());
    }
}
