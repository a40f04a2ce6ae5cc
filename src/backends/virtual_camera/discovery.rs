// SPDX-License-Identifier: GPL-3.0-only

//! Discovery of published video sources on the PipeWire graph
//!
//! Nodes are read from `pw-dump`, which prints the whole graph as JSON.
//! Only nodes with `media.class = Video/Source` are considered.

use crate::constants::pipeline::MEDIA_CLASS;
use crate::errors::InputError;
use serde_json::Value;
use tracing::{debug, info};

/// Identity record of a published video node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    pub id: u32,
    pub serial: Option<u64>,
    pub node_name: Option<String>,
    pub media_name: Option<String>,
    pub description: Option<String>,
}

/// How `pipewiresrc` should address a node, most stable first
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeTarget {
    Serial(u64),
    NodeName(String),
    MediaName(String),
    Id(u32),
}

impl NodeInfo {
    /// Human-readable name, falling back through the available properties
    pub fn display_name(&self) -> String {
        self.description
            .clone()
            .or_else(|| self.media_name.clone())
            .or_else(|| self.node_name.clone())
            .unwrap_or_else(|| format!("node {}", self.id))
    }

    /// Preferred way to subscribe: serial > node name > media name > id
    pub fn target(&self) -> NodeTarget {
        if let Some(serial) = self.serial {
            NodeTarget::Serial(serial)
        } else if let Some(name) = &self.node_name {
            NodeTarget::NodeName(name.clone())
        } else if let Some(name) = &self.media_name {
            NodeTarget::MediaName(name.clone())
        } else {
            NodeTarget::Id(self.id)
        }
    }

    fn matches(&self, name: &str) -> bool {
        [&self.media_name, &self.node_name, &self.description]
            .into_iter()
            .any(|p| p.as_deref() == Some(name))
    }
}

/// Source of node listings
pub trait NodeDirectory: Send + Sync {
    fn video_sources(&self) -> Result<Vec<NodeInfo>, InputError>;
}

/// Lists nodes by running `pw-dump`
#[derive(Debug, Default, Clone, Copy)]
pub struct PwDump;

impl NodeDirectory for PwDump {
    fn video_sources(&self) -> Result<Vec<NodeInfo>, InputError> {
        let output = std::process::Command::new("pw-dump")
            .output()
            .map_err(|e| InputError::Discovery(format!("failed to run pw-dump: {}", e)))?;
        if !output.status.success() {
            return Err(InputError::Discovery(format!(
                "pw-dump exited with {}",
                output.status
            )));
        }
        parse_pw_dump(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Extract video source nodes from `pw-dump` JSON output
pub fn parse_pw_dump(json: &str) -> Result<Vec<NodeInfo>, InputError> {
    let objects: Vec<Value> = serde_json::from_str(json)
        .map_err(|e| InputError::Discovery(format!("invalid pw-dump output: {}", e)))?;

    let nodes: Vec<NodeInfo> = objects
        .iter()
        .filter(|obj| obj["type"].as_str() == Some("PipeWire:Interface:Node"))
        .filter_map(|obj| {
            let props = &obj["info"]["props"];
            if props["media.class"].as_str() != Some(MEDIA_CLASS) {
                return None;
            }
            let id = obj["id"].as_u64()? as u32;
            let text = |key: &str| props[key].as_str().map(str::to_string);
            // object.serial is a number in recent releases, a string in older ones
            let serial = props["object.serial"]
                .as_u64()
                .or_else(|| props["object.serial"].as_str()?.parse().ok());
            Some(NodeInfo {
                id,
                serial,
                node_name: text("node.name"),
                media_name: text("media.name"),
                description: text("node.description"),
            })
        })
        .collect();

    debug!(count = nodes.len(), "Found video source nodes");
    Ok(nodes)
}

/// Find the published source called `name`
pub fn discover(directory: &dyn NodeDirectory, name: &str) -> Result<NodeInfo, InputError> {
    let node = directory
        .video_sources()?
        .into_iter()
        .find(|n| n.matches(name))
        .ok_or_else(|| InputError::NotFound(name.to_string()))?;
    info!(id = node.id, name = %node.display_name(), target = ?node.target(), "Found virtual camera node");
    Ok(node)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DUMP: &str = r#"[
        {"id": 30, "type": "PipeWire:Interface:Node",
         "info": {"props": {"media.class": "Audio/Sink", "node.name": "speakers"}}},
        {"id": 41, "type": "PipeWire:Interface:Node",
         "info": {"props": {"media.class": "Video/Source", "node.name": "v4l2_input.usb",
                            "node.description": "USB Camera", "object.serial": 112}}},
        {"id": 57, "type": "PipeWire:Interface:Node",
         "info": {"props": {"media.class": "Video/Source", "media.name": "camfx",
                            "object.serial": "205"}}},
        {"id": 60, "type": "PipeWire:Interface:Port", "info": {"props": {}}}
    ]"#;

    struct Fixed(&'static str);

    impl NodeDirectory for Fixed {
        fn video_sources(&self) -> Result<Vec<NodeInfo>, InputError> {
            parse_pw_dump(self.0)
        }
    }

    #[test]
    fn test_parse_filters_video_sources() {
        let nodes = parse_pw_dump(DUMP).unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].serial, Some(112));
        assert_eq!(nodes[1].serial, Some(205));
    }

    #[test]
    fn test_discover_by_media_name() {
        let node = discover(&Fixed(DUMP), "camfx").unwrap();
        assert_eq!(node.id, 57);
        assert_eq!(node.target(), NodeTarget::Serial(205));
    }

    #[test]
    fn test_discover_missing() {
        assert_eq!(
            discover(&Fixed(DUMP), "other"),
            Err(InputError::NotFound("other".into()))
        );
    }

    #[test]
    fn test_target_priority() {
        let mut node = NodeInfo {
            id: 9,
            serial: None,
            node_name: Some("camfx-node".into()),
            media_name: Some("camfx".into()),
            description: None,
        };
        assert_eq!(node.target(), NodeTarget::NodeName("camfx-node".into()));
        node.node_name = None;
        assert_eq!(node.target(), NodeTarget::MediaName("camfx".into()));
        node.media_name = None;
        assert_eq!(node.target(), NodeTarget::Id(9));
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            parse_pw_dump("not json"),
            Err(InputError::Discovery(_))
        ));
    }
}
