//! Plain-text outline rendering for feature trees.

use crate::models::{FeatureTreeNode, NodeStatus};

const NOT_STARTED: char = '○';
const IN_PROGRESS: char = '◐';
const COMPLETE: char = '●';
const BLOCKED: char = '✗';

const INDENT: &str = "  ";

fn status_symbol(status: NodeStatus) -> char {
    match status {
        NodeStatus::NotStarted => NOT_STARTED,
        NodeStatus::InProgress => IN_PROGRESS,
        NodeStatus::Complete => COMPLETE,
        NodeStatus::Blocked => BLOCKED,
    }
}

/// Render a forest as an indented outline, one line per node.
///
/// Example output:
/// ```text
/// ✗ [Epic] Checkout (blocked)
///   ● [Feature] Payment (complete)
///     > Card and wallet payments
///   ✗ [Feature] Shipping (blocked)
/// ```
pub fn render_outline(forest: &[FeatureTreeNode], include_descriptions: bool) -> String {
    let mut output = String::new();
    for root in forest {
        root.walk(0, &mut |tree_node, depth| {
            render_line(&mut output, tree_node, depth, include_descriptions)
        });
    }
    output
}

fn render_line(
    output: &mut String,
    tree_node: &FeatureTreeNode,
    depth: usize,
    include_descriptions: bool,
) {
    let node = &tree_node.node;
    let indent = INDENT.repeat(depth);

    output.push_str(&indent);
    output.push(status_symbol(node.status));
    output.push_str(&format!(
        " [{}] {} ({})\n",
        node.level.label(),
        node.title,
        node.status.as_str()
    ));

    if !include_descriptions {
        return;
    }
    if let Some(description) = node.description.as_deref() {
        for line in description.lines().filter(|l| !l.trim().is_empty()) {
            output.push_str(&indent);
            output.push_str(INDENT);
            output.push_str("> ");
            output.push_str(line.trim_end());
            output.push('\n');
        }
    }
}
