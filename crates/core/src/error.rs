use thiserror::Error;

pub type GraphResult<T> = Result<T, GraphError>;

/// Broad classes of failure, used by callers that only care about the category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Construction,
    Arity,
    Mapping,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    // Construction errors
    #[error("construction error: a filter chain needs at least one filter")]
    EmptyChain,

    #[error("construction error: invalid filter name {name:?}")]
    InvalidFilterName { name: String },

    #[error("construction error: option key must not be empty")]
    EmptyOptionKey,

    // Arity errors
    #[error("arity error: chain {chain} accepts at most {arity} input(s)")]
    TooManyInputs { chain: String, arity: usize },

    #[error("arity error: output pad {pad} is out of range for chain {chain} with {arity} output(s)")]
    PadOutOfRange {
        chain: String,
        pad: usize,
        arity: usize,
    },

    #[error("arity error: every output pad of chain {chain} is already requested")]
    NoFreeOutputPad { chain: String },

    #[error("arity error: output pad {pad} of chain {chain} skips ahead of its next pad {next}")]
    PadNotContiguous {
        chain: String,
        pad: usize,
        next: usize,
    },

    // Mapping errors
    #[error("mapping error: unknown mapping source {source_desc}")]
    UnknownMappingSource { source_desc: String },

    #[error("mapping error: input {label} is not part of this command")]
    UnknownInput { label: usize },

    #[error("mapping error: output {index} is not part of this command")]
    UnknownOutput { index: usize },

    #[error("mapping error: filter graph {index} is not part of this command")]
    UnknownGraph { index: usize },

    #[error("mapping error: output pad [{label}] is already consumed")]
    PadAlreadyConsumed { label: String },

    #[error("mapping error: chain {chain} cannot consume its own output")]
    SelfReference { chain: String },

    #[error("mapping error: chain {chain} renders as an output -filter and has no labelled pads")]
    AttachedChain { chain: String },
}

impl GraphError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GraphError::EmptyChain
            | GraphError::InvalidFilterName { .. }
            | GraphError::EmptyOptionKey => ErrorKind::Construction,
            GraphError::TooManyInputs { .. }
            | GraphError::PadOutOfRange { .. }
            | GraphError::NoFreeOutputPad { .. }
            | GraphError::PadNotContiguous { .. } => ErrorKind::Arity,
            GraphError::UnknownMappingSource { .. }
            | GraphError::UnknownInput { .. }
            | GraphError::UnknownOutput { .. }
            | GraphError::UnknownGraph { .. }
            | GraphError::PadAlreadyConsumed { .. }
            | GraphError::SelfReference { .. }
            | GraphError::AttachedChain { .. } => ErrorKind::Mapping,
        }
    }
}
