//! The canonical test tree model.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::address::{NodeAddress, ROOT_ID};

/// Label of the synthetic root suite.
pub const ROOT_LABEL: &str = "Pester";

/// Whether a node groups other nodes or is an executable test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Suite,
    Test,
}

/// A suite or test in the canonical tree.
///
/// Serializes to the Test Explorer shape `{type, id, label, file?, line?, children}`, which is also
/// the shape the discovery script prints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestNode {
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub id: String,
    #[serde(default, deserialize_with = "label_or_empty")]
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    /// Zero-based declaration line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default)]
    pub children: Vec<TestNode>,
}

impl TestNode {
    /// The empty synthetic root.
    pub fn root() -> Self {
        Self::suite(ROOT_ID, ROOT_LABEL)
    }

    /// A suite with no location and no children.
    pub fn suite(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            kind: NodeKind::Suite,
            id: id.into(),
            label: label.into(),
            file: None,
            line: None,
            children: Vec::new(),
        }
    }

    /// A test with no location.
    pub fn test(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            kind: NodeKind::Test,
            ..Self::suite(id, label)
        }
    }

    /// Set the source location, keeping the id untouched.
    pub fn at(mut self, file: impl Into<PathBuf>, line: Option<u32>) -> Self {
        self.file = Some(file.into());
        self.line = line;
        self
    }

    /// Append a child (builder style).
    pub fn with_child(mut self, child: TestNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn is_suite(&self) -> bool {
        self.kind == NodeKind::Suite
    }

    pub fn is_root(&self) -> bool {
        self.id == ROOT_ID
    }

    /// Decode this node's id.
    pub fn address(&self) -> NodeAddress {
        NodeAddress::parse(&self.id)
    }

    /// Depth-first search for the node with `id`, including `self`.
    pub fn find(&self, id: &str) -> Option<&TestNode> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(id))
    }

    /// Visit this node and every descendant in tree order (parent before children).
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a TestNode)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }

    /// Number of test leaves under (and including) this node.
    pub fn test_count(&self) -> usize {
        let mut count = 0;
        self.walk(&mut |node| {
            if node.kind == NodeKind::Test {
                count += 1;
            }
        });
        count
    }
}

fn label_or_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    // ConvertTo-Json writes `null` for blocks whose name evaluated to nothing.
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TestNode {
        TestNode::root().with_child(
            TestNode::suite("/ws/a.Tests.ps1", "a.Tests.ps1")
                .at("/ws/a.Tests.ps1", None)
                .with_child(
                    TestNode::suite("/ws/a.Tests.ps1;3", "Math")
                        .at("/ws/a.Tests.ps1", Some(2))
                        .with_child(TestNode::test("/ws/a.Tests.ps1;4", "adds").at("/ws/a.Tests.ps1", Some(3))),
                ),
        )
    }

    #[test]
    fn test_find_descends_into_children() {
        let tree = sample();
        assert_eq!(tree.find("/ws/a.Tests.ps1;4").map(|n| n.label.as_str()), Some("adds"));
        assert!(tree.find("root").is_some_and(TestNode::is_root));
        assert!(tree.find("/ws/missing.Tests.ps1").is_none());
    }

    #[test]
    fn test_walk_is_tree_order() {
        let tree = sample();
        let mut ids = Vec::new();
        tree.walk(&mut |node| ids.push(node.id.clone()));
        assert_eq!(ids, ["root", "/ws/a.Tests.ps1", "/ws/a.Tests.ps1;3", "/ws/a.Tests.ps1;4"]);
        assert_eq!(tree.test_count(), 1);
    }

    #[test]
    fn test_serializes_to_test_explorer_shape() {
        let test = TestNode::test("/ws/a.Tests.ps1;4", "adds").at("/ws/a.Tests.ps1", Some(3));
        let json = serde_json::to_value(&test).unwrap();
        assert_eq!(json["type"], "test");
        assert_eq!(json["line"], 3);
        assert!(TestNode::root().file.is_none());
        assert!(serde_json::to_value(TestNode::root()).unwrap().get("file").is_none());
    }

    #[test]
    fn test_null_label_deserializes_to_empty() {
        let node: TestNode = serde_json::from_str(r#"{"type":"test","id":"x;1","label":null}"#).unwrap();
        assert_eq!(node.label, "");
        assert!(node.children.is_empty());
    }
}
