//! Node addresses: the identity of a suite or test across process boundaries.
//!
//! Internally an address is a tagged union. It only becomes a string at the external boundary
//! (discovery output, editor selections, run requests), using the wire format:
//!
//! - `root` for the whole tree
//! - `<absolute file path>` for a whole file
//! - `<absolute file path>;<line>` for a suite or test declared at a location
//!
//! `;` cannot appear in a path produced by the discovery script on the supported platforms, so the
//! last `;` always separates the path from the line.

use std::fmt;
use std::path::{Path, PathBuf};

/// Reserved id of the synthetic root suite.
pub const ROOT_ID: &str = "root";

/// Separator between the file path and the line number in a located id.
pub const LINE_DELIMITER: char = ';';

/// Identity of a node in the canonical tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeAddress {
    /// The synthetic root; running it means running the whole test root.
    Root,
    /// A whole test file.
    File(PathBuf),
    /// A suite or test declared at `line` (one-based, as Pester reports `StartLine`) of `file`.
    Located { file: PathBuf, line: u32 },
}

impl NodeAddress {
    /// Address of a node declared at `line` of `file`.
    ///
    /// ## Parameters
    /// - `file`: absolute path of the defining script.
    /// - `line`: one-based declaration line.
    ///
    /// ## Notes
    /// - Pure: equal inputs always produce equal addresses (and equal wire ids).
    pub fn located(file: impl Into<PathBuf>, line: u32) -> Self {
        NodeAddress::Located {
            file: file.into(),
            line,
        }
    }

    /// Address of a whole file.
    pub fn file(file: impl Into<PathBuf>) -> Self {
        NodeAddress::File(file.into())
    }

    /// Decode a wire id.
    ///
    /// ## Returns
    /// - `Root` for the literal `root`.
    /// - `Located` when the id contains `;` followed by an unsigned integer.
    /// - `File` otherwise (including a `;` followed by something that is not a number).
    pub fn parse(id: &str) -> Self {
        if id == ROOT_ID {
            return NodeAddress::Root;
        }
        if let Some((file, line)) = id.rsplit_once(LINE_DELIMITER) {
            if let Ok(line) = line.parse::<u32>() {
                return NodeAddress::located(file, line);
            }
        }
        NodeAddress::File(PathBuf::from(id))
    }

    /// Encode to the wire format.
    pub fn to_wire(&self) -> String {
        self.to_string()
    }

    /// The defining file, if any.
    pub fn path(&self) -> Option<&Path> {
        match self {
            NodeAddress::Root => None,
            NodeAddress::File(file) | NodeAddress::Located { file, .. } => Some(file),
        }
    }

    /// The one-based line, if the address is located.
    pub fn line(&self) -> Option<u32> {
        match self {
            NodeAddress::Located { line, .. } => Some(*line),
            _ => None,
        }
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeAddress::Root => f.write_str(ROOT_ID),
            NodeAddress::File(file) => write!(f, "{}", file.display()),
            NodeAddress::Located { file, line } => write!(f, "{}{}{}", file.display(), LINE_DELIMITER, line),
        }
    }
}

impl From<&str> for NodeAddress {
    fn from(id: &str) -> Self {
        NodeAddress::parse(id)
    }
}
