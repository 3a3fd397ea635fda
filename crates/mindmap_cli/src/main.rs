//! CLI probe for `mindmap_core`.
//!
//! # Responsibility
//! - Verify crate linkage with a deterministic edit/undo/save round.

use mindmap_core::{IconPosition, MapModel, MindIcon, ModeController, NodeText};
use std::process::ExitCode;

fn main() -> ExitCode {
    match run() {
        Ok(xml) => {
            println!("mindmap_core version={}", mindmap_core::core_version());
            println!("{xml}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("mindmap_cli failed: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<String, Box<dyn std::error::Error>> {
    let mut controller = ModeController::new(MapModel::new(NodeText::plain("Root")));
    let root = controller.map().root_id();
    let first = controller.add_node(root, None, NodeText::plain("A"))?;
    let second = controller.add_node(root, None, NodeText::plain("B"))?;
    controller.add_icon(first, IconPosition::Last, MindIcon::new("idea"))?;
    controller.move_node(second, root, 0)?;
    controller.undo()?;

    let bytes = controller.save_to_writer(Vec::new())?;
    Ok(String::from_utf8(bytes)?)
}
