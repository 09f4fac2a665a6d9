// Deferred stream references and the handles they point at

use crate::error::GraphResult;
use std::fmt;

/// Label of an input: its insertion index in the owning command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InputId(pub usize);

impl InputId {
    pub fn label(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutputId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GraphId(pub usize);

/// A chain's place in the command: which graph, and its append index in that graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChainId {
    pub graph: GraphId,
    pub position: usize,
}

impl ChainId {
    pub fn new(graph: GraphId, position: usize) -> Self {
        Self { graph, position }
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.graph.0 == 0 {
            write!(f, "chain{}", self.position)
        } else {
            write!(f, "graph{}_chain{}", self.graph.0, self.position)
        }
    }
}

/// A reference to one stream, resolved to text only when the command is rendered.
///
/// Two specifiers are interchangeable exactly when they compare equal: same anchor,
/// same track or pad.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StreamSpecifier {
    Input {
        input: InputId,
        track: Option<String>,
    },
    FilterOutput {
        chain: ChainId,
        pad: usize,
    },
}

impl StreamSpecifier {
    /// Reference a stream of an input. `track` is emitted verbatim (`v`, `a:1`, `0`).
    pub fn from_input(input: InputId, track: Option<&str>) -> Self {
        StreamSpecifier::Input {
            input,
            track: track.map(str::to_string),
        }
    }

    /// Reference an output pad of a chain. Prefer `Command::output_pad`, which checks the
    /// pad against the chain's arity and registers the consumer.
    pub fn from_filter_output(chain: ChainId, pad: usize) -> Self {
        StreamSpecifier::FilterOutput { chain, pad }
    }

    /// Unbracketed input form `label[:track]`; `None` for filter outputs.
    pub fn input_text(&self) -> Option<String> {
        match self {
            StreamSpecifier::Input { input, track } => Some(match track {
                Some(track) => format!("{}:{}", input.0, track),
                None => input.0.to_string(),
            }),
            StreamSpecifier::FilterOutput { .. } => None,
        }
    }
}

/// Turns specifiers into text against the current state of a command.
pub trait Resolver {
    /// Text used inside a filter graph and as a `-map` value.
    fn resolve(&self, specifier: &StreamSpecifier) -> GraphResult<String>;
}

/// Generated name of an output pad.
pub fn pad_label(chain: ChainId, last_filter: &str, pad: usize) -> String {
    format!("{}_{}_{}", chain, last_filter, pad)
}

/// Wrap in brackets unless already wrapped.
pub fn bracketed(text: &str) -> String {
    if text.starts_with('[') && text.ends_with(']') {
        text.to_string()
    } else {
        format!("[{}]", text)
    }
}
