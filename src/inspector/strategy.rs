//! Regenerate-control matcher specs
//!
//! The chat page's markup is not under our control, so the regenerate control
//! is located by an ordered list of independent strategies. Each strategy is
//! plain data; adding a heuristic means adding an entry to the config, not a
//! branch to the inspector.

use serde::{Deserialize, Serialize};

use crate::utils::constants::{
    CLICKABLE_ANCESTOR_SELECTOR, ICON_BUTTON_SELECTOR, REGENERATE_ICON_SELECTOR,
    REGENERATE_MARKER_TEXT, REGENERATE_NESTED_ICON_SELECTOR,
};

/// One way of finding the regenerate control
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ButtonStrategy {
    /// First element matching `marker`, then its nearest ancestor (or itself)
    /// matching `clickable`.
    MarkerAncestor { marker: String, clickable: String },

    /// First element matching `container`, accepted only when an element
    /// matching `marker` sits inside it.
    ContainerWithMarker { container: String, marker: String },

    /// Every element matching `container`, in document order; the first whose
    /// inner markup contains `text` wins.
    MarkupScan { container: String, text: String },
}

impl ButtonStrategy {
    /// Short name used in logs and by test doubles
    pub fn label(&self) -> &'static str {
        match self {
            ButtonStrategy::MarkerAncestor { .. } => "marker_ancestor",
            ButtonStrategy::ContainerWithMarker { .. } => "container_with_marker",
            ButtonStrategy::MarkupScan { .. } => "markup_scan",
        }
    }
}

/// Strategies for the DeepSeek chat page, most specific first
pub fn default_regenerate_strategies() -> Vec<ButtonStrategy> {
    vec![
        ButtonStrategy::MarkerAncestor {
            marker: REGENERATE_ICON_SELECTOR.to_string(),
            clickable: CLICKABLE_ANCESTOR_SELECTOR.to_string(),
        },
        ButtonStrategy::ContainerWithMarker {
            container: ICON_BUTTON_SELECTOR.to_string(),
            marker: REGENERATE_NESTED_ICON_SELECTOR.to_string(),
        },
        ButtonStrategy::MarkupScan {
            container: ICON_BUTTON_SELECTOR.to_string(),
            text: REGENERATE_MARKER_TEXT.to_string(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_ordered_most_specific_first() {
        let labels: Vec<_> = default_regenerate_strategies()
            .iter()
            .map(ButtonStrategy::label)
            .collect();
        assert_eq!(
            labels,
            ["marker_ancestor", "container_with_marker", "markup_scan"]
        );
    }

    #[test]
    fn strategies_parse_from_tagged_yaml() {
        let yaml = r#"
- kind: markup_scan
  container: "div.icon"
  text: "Regenerate"
- kind: marker_ancestor
  marker: "svg#regen"
  clickable: "button"
"#;
        let parsed: Vec<ButtonStrategy> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            parsed[0],
            ButtonStrategy::MarkupScan {
                container: "div.icon".into(),
                text: "Regenerate".into()
            }
        );
        assert_eq!(parsed[1].label(), "marker_ancestor");
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let yaml = "- kind: xpath\n  path: //button\n";
        assert!(serde_yaml::from_str::<Vec<ButtonStrategy>>(yaml).is_err());
    }
}
