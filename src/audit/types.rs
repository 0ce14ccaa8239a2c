// src/audit/types.rs
// =============================================================================
// Finding types.
//
// Field names follow the axe-core result format (camelCase on the wire), so
// a rule engine response can be decoded straight into these structs.
// =============================================================================

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Severity of a finding, least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    Minor,
    Moderate,
    Serious,
    Critical,
}

impl std::fmt::Display for Impact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Impact::Minor => "minor",
            Impact::Moderate => "moderate",
            Impact::Serious => "serious",
            Impact::Critical => "critical",
        };
        f.write_str(name)
    }
}

/// One step of an element's selector path
///
/// Plain elements are a CSS selector. Elements inside a shadow root come as
/// a list: the host's selector first, then selectors within each shadow tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetSelector {
    Css(String),
    Shadow(Vec<String>),
}

impl std::fmt::Display for TargetSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetSelector::Css(selector) => f.write_str(selector),
            TargetSelector::Shadow(path) => f.write_str(&path.join(" >>> ")),
        }
    }
}

/// One element a rule failed on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AffectedNode {
    pub html: String,
    /// Selector path to the element, one entry per frame
    pub target: Vec<TargetSelector>,
    #[serde(default)]
    pub failure_summary: String,
}

/// A rule that failed on a page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    /// Rule id, e.g. "image-alt"
    pub id: String,
    pub impact: Impact,
    pub description: String,
    /// Short rule title
    #[serde(default)]
    pub help: String,
    pub help_url: String,
    #[serde(default)]
    pub nodes: Vec<AffectedNode>,
}

/// What the rule engine found on one page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditResults {
    pub violations: Vec<Violation>,
    pub passes: usize,
    pub incomplete: usize,
    pub inapplicable: usize,
}

/// A page the rule engine couldn't audit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanFailure {
    pub url: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationCount {
    pub id: String,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSummary {
    /// Pages submitted to the scan stage
    pub total_pages: usize,
    pub total_violations: usize,
    pub violations_by_impact: BTreeMap<Impact, usize>,
    /// Most frequent rule ids, most frequent first (at most 5)
    pub top_violations: Vec<ViolationCount>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_axe_violation() {
        let json = r#"{
            "id": "image-alt",
            "impact": "critical",
            "tags": ["wcag2a", "wcag111"],
            "description": "Ensures <img> elements have alternate text",
            "help": "Images must have alternate text",
            "helpUrl": "https://dequeuniversity.com/rules/axe/4.8/image-alt",
            "nodes": [{
                "html": "<img src=\"logo.png\">",
                "target": ["header > img"],
                "failureSummary": "Fix any of the following: Element does not have an alt attribute",
                "any": []
            }]
        }"#;

        let violation: Violation = serde_json::from_str(json).unwrap();
        assert_eq!(violation.id, "image-alt");
        assert_eq!(violation.impact, Impact::Critical);
        assert_eq!(
            violation.nodes[0].target,
            vec![TargetSelector::Css("header > img".to_string())]
        );
    }

    #[test]
    fn test_decode_shadow_dom_target() {
        let json = r##"{
            "id": "button-name",
            "impact": "critical",
            "description": "Ensures buttons have discernible text",
            "helpUrl": "https://dequeuniversity.com/rules/axe/4.8/button-name",
            "nodes": [
                {"html": "<button></button>", "target": [["#app-shell", "button.menu"]]},
                {"html": "<button></button>", "target": ["iframe#ads", "button"]}
            ]
        }"##;

        let violation: Violation = serde_json::from_str(json).unwrap();
        let shadow = &violation.nodes[0].target[0];
        assert_eq!(
            shadow,
            &TargetSelector::Shadow(vec!["#app-shell".to_string(), "button.menu".to_string()])
        );
        assert_eq!(shadow.to_string(), "#app-shell >>> button.menu");
        assert_eq!(violation.nodes[1].target.len(), 2);

        // Written back in the shape it was read
        let written = serde_json::to_value(&violation.nodes[0]).unwrap();
        assert_eq!(written["target"], serde_json::json!([["#app-shell", "button.menu"]]));
    }

    #[test]
    fn test_impact_order_and_display() {
        assert!(Impact::Critical > Impact::Serious);
        assert!(Impact::Moderate > Impact::Minor);
        assert_eq!(Impact::Serious.to_string(), "serious");
    }

    #[test]
    fn test_summary_map_keys_serialize_as_names() {
        let mut summary = ScanSummary::default();
        summary.violations_by_impact.insert(Impact::Serious, 2);
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["violationsByImpact"]["serious"], 2);
    }
}
