use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Descriptive attributes carried on a WBS node.
///
/// The engine only reads `building`, `status` and `target_kw` (for filtering);
/// everything else is passed through to the grid untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WbsAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub building: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Target calendar week, e.g. `KW12` or `2026-KW12`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_kw: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget_eur: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Any other columns the server sends (qty_ext, nta_ref, ...)
    #[serde(flatten)]
    pub extra: IndexMap<String, serde_json::Value>,
}

/// One node of the work-breakdown structure, as served by the WBS endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WbsNode {
    pub id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(rename = "wbs_code", alias = "code")]
    pub code: String,
    #[serde(rename = "wbs_name", alias = "name")]
    pub name: String,
    #[serde(rename = "qty", alias = "quantity", default)]
    pub quantity: f64,
    #[serde(default)]
    pub unit: String,
    /// Depth below the root (0 = root). Recomputed by the tree builder.
    #[serde(default)]
    pub level: u32,
    /// Summary nodes aggregate their descendants and are never edited directly
    #[serde(default)]
    pub is_summary: bool,
    #[serde(default)]
    pub sort_order: i64,
    #[serde(flatten)]
    pub attributes: WbsAttributes,
}

impl WbsNode {
    /// Create a node with empty attributes
    pub fn new(id: &str, parent_id: Option<&str>, code: &str, name: &str) -> Self {
        WbsNode {
            id: id.to_string(),
            parent_id: parent_id.map(str::to_string),
            code: code.to_string(),
            name: name.to_string(),
            quantity: 0.0,
            unit: String::new(),
            level: 0,
            is_summary: false,
            sort_order: 0,
            attributes: WbsAttributes::default(),
        }
    }

    pub fn summary(mut self) -> Self {
        self.is_summary = true;
        self
    }

    pub fn with_quantity(mut self, quantity: f64, unit: &str) -> Self {
        self.quantity = quantity;
        self.unit = unit.to_string();
        self
    }
}
