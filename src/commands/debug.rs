use std::path::Path;

use nodekit::{Node, NodeError};

pub(crate) async fn cmd_debug(node: &Node, data_dir: Option<&Path>) -> anyhow::Result<()> {
    let data_dir = match node.resolve_data_dir(data_dir) {
        Ok(dir) => dir,
        Err(NodeError::NotFound(_)) => Default::default(),
        Err(e) => return Err(e.into()),
    };
    let info = node.debug_info(&data_dir).await?;
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}
