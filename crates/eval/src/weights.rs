//! Fellegi-Sunter weight derivation.
//!
//! For an attribute with agreement probability `m` among true matches and
//! `u` among random pairs:
//!
//! ```text
//! matchWeight    = log2(m / u)
//! nonMatchWeight = log2((1 - m) / (1 - u))
//! ```

use serde::Serialize;

use crate::error::MatchError;

/// The pair of weights an attribute contributes on agreement/disagreement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Weights {
    pub match_weight: f64,
    pub non_match_weight: f64,
}

pub fn match_weight(m: f64, u: f64) -> f64 {
    (m / u).log2()
}

pub fn non_match_weight(m: f64, u: f64) -> f64 {
    ((1.0 - m) / (1.0 - u)).log2()
}

/// Resolve an attribute's weights. Explicit weights win; a missing one is
/// derived from `m`/`u`, which must then both be present.
pub fn derive(
    attribute: &str,
    m: Option<f64>,
    u: Option<f64>,
    explicit_match: Option<f64>,
    explicit_non_match: Option<f64>,
) -> Result<Weights, MatchError> {
    if let (Some(match_weight), Some(non_match_weight)) = (explicit_match, explicit_non_match) {
        return Ok(Weights {
            match_weight,
            non_match_weight,
        });
    }
    let (Some(m), Some(u)) = (m, u) else {
        return Err(MatchError::invalid_state(format!(
            "attribute '{}' has no m/u probabilities to derive weights from",
            attribute
        )));
    };
    Ok(Weights {
        match_weight: explicit_match.unwrap_or_else(|| match_weight(m, u)),
        non_match_weight: explicit_non_match.unwrap_or_else(|| non_match_weight(m, u)),
    })
}
