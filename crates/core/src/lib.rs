// Filter-graph command compiler library modules

pub mod arity;
pub mod chain;
pub mod command;
pub mod config;
pub mod error;
pub mod graph;
pub mod job;
pub mod node;
pub mod options;
pub mod specifier;

// Re-export commonly used types
pub use arity::Arity;
pub use chain::{FilterChain, PadSelector};
pub use command::{Command, Input, Invocation, MapPlacement, Mapping, Output};
pub use config::CompilerConfig;
pub use error::{ErrorKind, GraphError, GraphResult};
pub use graph::FilterGraph;
pub use job::Job;
pub use node::FilterNode;
pub use options::OptionMap;
pub use specifier::{ChainId, GraphId, InputId, OutputId, Resolver, StreamSpecifier};
