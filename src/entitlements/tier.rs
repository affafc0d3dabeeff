//! Subscription tier mapping.
//!
//! Maps provider product identifiers onto the internal tier enum. The table
//! is static; unknown products always fall back to [`Tier::None`].

use serde::{Deserialize, Serialize};

/// Internal subscription tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// No paid entitlement.
    #[default]
    None,
    /// Entry-level paid tier.
    HomeChef,
    /// Top paid tier.
    MasterChef,
}

impl Tier {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::HomeChef => "home_chef",
            Self::MasterChef => "master_chef",
        }
    }

    #[must_use]
    pub fn is_paid(self) -> bool {
        self != Self::None
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map a provider product identifier to a tier.
///
/// Lookup is case-insensitive; `None`, empty, and unrecognized identifiers
/// map to [`Tier::None`]. Total function, no failure mode.
#[must_use]
pub fn map_product_to_tier(product_id: Option<&str>) -> Tier {
    let Some(product_id) = product_id else {
        return Tier::None;
    };
    match product_id.trim().to_ascii_lowercase().as_str() {
        "home_chef_monthly" | "home_chef_yearly" => Tier::HomeChef,
        "master_chef_monthly" | "master_chef_yearly" => Tier::MasterChef,
        _ => Tier::None,
    }
}
