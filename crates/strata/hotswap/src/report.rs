//! Rejection reporting
//!
//! Pure formatting: rejected changes render to one explanatory line each,
//! wrapped in a banner. In hotswap-only mode, rejections kept only for
//! fall-back bookkeeping are filtered out first; the banner appears only
//! when the filtered list is non-empty.

use strata_types::{HotswapMode, RejectedChange, RejectionSubject};

const BANNER_HEADER: &str = "===== changes that cannot be hotswapped =====";
const BANNER_FOOTER: &str = "=============================================";

/// Render one rejected change
pub fn render_rejected_change(change: &RejectedChange) -> String {
    match &change.subject {
        RejectionSubject::Resource {
            logical_id,
            resource_type,
            rejected_properties,
            ..
        } => format!(
            "resource: {}, type: {}, rejected changes: [{}], reason: {}",
            logical_id,
            resource_type,
            rejected_properties.join(", "),
            change.description,
        ),
        RejectionSubject::Output { output_id } => {
            format!("output: {}, reason: {}", output_id, change.description)
        }
    }
}

/// Render the full rejection report for the given mode. Empty when nothing
/// is visible; otherwise one banner line, one line per change, and a
/// closing banner line.
pub fn render_rejections(mode: HotswapMode, changes: &[RejectedChange]) -> Vec<String> {
    let visible: Vec<&RejectedChange> = changes
        .iter()
        .filter(|change| match mode {
            HotswapMode::FallBack => true,
            HotswapMode::HotswapOnly => change.visible_in_hotswap_only_mode,
        })
        .collect();

    if visible.is_empty() {
        return Vec::new();
    }

    let mut lines = Vec::with_capacity(visible.len() + 2);
    lines.push(BANNER_HEADER.to_string());
    lines.extend(visible.into_iter().map(render_rejected_change));
    lines.push(BANNER_FOOTER.to_string());
    lines
}
