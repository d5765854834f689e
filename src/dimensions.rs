use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// The closed set of dimensions an event or goal row can be filtered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DimensionKind {
    Funnel,
    Unit,
    Seller,
    Origin,
}

impl DimensionKind {
    pub const ALL: [DimensionKind; 4] = [
        DimensionKind::Funnel,
        DimensionKind::Unit,
        DimensionKind::Seller,
        DimensionKind::Origin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DimensionKind::Funnel => "funnel",
            DimensionKind::Unit => "unit",
            DimensionKind::Seller => "seller",
            DimensionKind::Origin => "origin",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "funnel" => Ok(DimensionKind::Funnel),
            "unit" => Ok(DimensionKind::Unit),
            "seller" => Ok(DimensionKind::Seller),
            "origin" => Ok(DimensionKind::Origin),
            other => Err(Error::InvalidFilter(format!(
                "unknown dimension '{other}'. Use: funnel, unit, seller, origin"
            ))),
        }
    }
}

impl std::fmt::Display for DimensionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dimension values attached to a single event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub funnel_id: Option<String>,
    pub unit_id: Option<String>,
    pub seller_id: Option<String>,
    pub origin_id: Option<String>,
}

/// Optional match constraints narrowing both retrieval and goal resolution.
/// `None` means "unfiltered" for that dimension.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DimensionFilters {
    pub funnel_id: Option<String>,
    pub unit_id: Option<String>,
    pub seller_id: Option<String>,
    pub origin_id: Option<String>,
}

impl DimensionFilters {
    pub fn get(&self, kind: DimensionKind) -> Option<&str> {
        match kind {
            DimensionKind::Funnel => self.funnel_id.as_deref(),
            DimensionKind::Unit => self.unit_id.as_deref(),
            DimensionKind::Seller => self.seller_id.as_deref(),
            DimensionKind::Origin => self.origin_id.as_deref(),
        }
    }

    /// Active filters as `(kind, id)` pairs.
    pub fn active(&self) -> Vec<(DimensionKind, &str)> {
        DimensionKind::ALL
            .iter()
            .filter_map(|k| self.get(*k).map(|id| (*k, id)))
            .collect()
    }

    pub fn has_specific_funnel(&self) -> bool {
        self.funnel_id.is_some()
    }

    pub fn matches(&self, dims: &Dimensions) -> bool {
        fn ok(filter: &Option<String>, value: &Option<String>) -> bool {
            match filter {
                None => true,
                Some(f) => value.as_deref() == Some(f.as_str()),
            }
        }
        ok(&self.funnel_id, &dims.funnel_id)
            && ok(&self.unit_id, &dims.unit_id)
            && ok(&self.seller_id, &dims.seller_id)
            && ok(&self.origin_id, &dims.origin_id)
    }

    /// Normalize empty strings and the literal "all" to "unfiltered".
    pub fn normalized(self) -> Self {
        fn norm(v: Option<String>) -> Option<String> {
            v.map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("all"))
        }
        Self {
            funnel_id: norm(self.funnel_id),
            unit_id: norm(self.unit_id),
            seller_id: norm(self.seller_id),
            origin_id: norm(self.origin_id),
        }
    }
}
