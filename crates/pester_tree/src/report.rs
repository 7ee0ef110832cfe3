//! NUnit-style result reports written by `Invoke-Pester`.
//!
//! Only the nesting of `test-suite` / `test-case` elements and a handful of attributes matter here:
//!
//! ```xml
//! <test-results>
//!   <test-suite description="Pester" result="Success">
//!     <results>
//!       <test-suite description="/ws/a.Tests.ps1">
//!         <results>
//!           <test-case description="adds" result="Success" />
//!         </results>
//!       </test-suite>
//!     </results>
//!   </test-suite>
//! </test-results>
//! ```
//!
//! A `results` grouping may hold a single element or many; the parsed [`ReportNode::children`] is
//! always an ordered sequence either way.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

/// The report could not be read.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReportParseError {
    #[error("malformed result report: {0}")]
    Xml(String),

    #[error("result report has no `test-results` element")]
    MissingResults,

    #[error("result report has no top-level `test-suite`")]
    MissingRootSuite,
}

/// One `test-suite` or `test-case` element of a report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportNode {
    /// The `description` attribute; compared against node ids and labels.
    pub description: Option<String>,
    /// The raw `result` token; absent means the node was not executed.
    pub result: Option<String>,
    pub name: Option<String>,
    pub executed: Option<bool>,
    /// Text of a nested `failure/message` or `reason/message`.
    pub message: Option<String>,
    pub children: Vec<ReportNode>,
}

impl ReportNode {
    /// A node with only a description, for building reports by hand.
    pub fn described(description: impl Into<String>) -> Self {
        Self {
            description: Some(description.into()),
            ..Self::default()
        }
    }

    pub fn with_result(mut self, result: impl Into<String>) -> Self {
        self.result = Some(result.into());
        self
    }

    pub fn with_child(mut self, child: ReportNode) -> Self {
        self.children.push(child);
        self
    }

    fn from_element(element: &BytesStart<'_>) -> Result<Self, ReportParseError> {
        let mut node = ReportNode::default();
        for attribute in element.attributes() {
            let attribute = attribute.map_err(|e| ReportParseError::Xml(e.to_string()))?;
            let value = attribute
                .unescape_value()
                .map_err(|e| ReportParseError::Xml(e.to_string()))?
                .into_owned();
            match attribute.key.as_ref() {
                b"description" => node.description = Some(value),
                b"result" => node.result = Some(value),
                b"name" => node.name = Some(value),
                b"executed" => node.executed = Some(value.eq_ignore_ascii_case("true")),
                _ => {}
            }
        }
        Ok(node)
    }
}

enum Frame {
    Node(ReportNode),
    Element(Vec<u8>),
}

fn is_node_element(name: &[u8]) -> bool {
    name == b"test-suite" || name == b"test-case"
}

/// Parse a report and return its top-level `test-results > test-suite`.
#[tracing::instrument(skip_all, fields(report_len = xml.len()))]
pub fn parse_report(xml: &str) -> Result<ReportNode, ReportParseError> {
    let mut reader = Reader::from_str(xml.trim_start_matches('\u{feff}'));
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Frame> = Vec::new();
    let mut seen_results = false;
    let mut root: Option<ReportNode> = None;
    let mut message: Option<String> = None;

    loop {
        match reader.read_event().map_err(|e| ReportParseError::Xml(e.to_string()))? {
            Event::Start(element) => {
                let name = element.name().as_ref().to_vec();
                if name == b"test-results" {
                    seen_results = true;
                }
                if name == b"message" && inside_failure_or_reason(&stack) {
                    message = Some(String::new());
                }
                if is_node_element(&name) {
                    stack.push(Frame::Node(ReportNode::from_element(&element)?));
                } else {
                    stack.push(Frame::Element(name));
                }
            }
            Event::Empty(element) => {
                if element.name().as_ref() == b"test-results" {
                    seen_results = true;
                }
                if is_node_element(element.name().as_ref()) {
                    let node = ReportNode::from_element(&element)?;
                    attach(&mut stack, &mut root, node);
                }
            }
            Event::Text(text) => {
                if let Some(buffer) = message.as_mut() {
                    let text = text.unescape().map_err(|e| ReportParseError::Xml(e.to_string()))?;
                    buffer.push_str(&text);
                }
            }
            Event::CData(data) => {
                if let Some(buffer) = message.as_mut() {
                    buffer.push_str(&String::from_utf8_lossy(&data));
                }
            }
            Event::End(_) => match stack.pop() {
                Some(Frame::Node(node)) => attach(&mut stack, &mut root, node),
                Some(Frame::Element(name)) if name == b"message" => {
                    if let Some(text) = message.take() {
                        set_message(&mut stack, text);
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    if !seen_results {
        return Err(ReportParseError::MissingResults);
    }
    root.ok_or(ReportParseError::MissingRootSuite)
}

/// Add a finished node to its nearest enclosing node, or make it the report root.
fn attach(stack: &mut [Frame], root: &mut Option<ReportNode>, node: ReportNode) {
    let parent = stack.iter_mut().rev().find_map(|frame| match frame {
        Frame::Node(parent) => Some(parent),
        Frame::Element(_) => None,
    });
    match parent {
        Some(parent) => parent.children.push(node),
        None if root.is_none() => *root = Some(node),
        None => tracing::debug!("ignoring additional top-level test-suite"),
    }
}

fn inside_failure_or_reason(stack: &[Frame]) -> bool {
    matches!(stack.last(), Some(Frame::Element(name)) if name == b"failure" || name == b"reason")
}

fn set_message(stack: &mut [Frame], text: String) {
    if let Some(Frame::Node(node)) = stack
        .iter_mut()
        .rev()
        .find(|frame| matches!(frame, Frame::Node(_)))
    {
        node.message = Some(text.trim().to_string());
    }
}
