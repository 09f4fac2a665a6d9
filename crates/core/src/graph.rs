use crate::chain::FilterChain;
use crate::error::GraphResult;
use crate::specifier::{ChainId, GraphId, Resolver};

/// Ordered chains forming one filter-graph expression.
///
/// A chain's position is its append index and never changes; it is part of every
/// pad label the chain generates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterGraph {
    chains: Vec<FilterChain>,
}

impl FilterGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chain and return its position.
    pub fn append(&mut self, chain: FilterChain) -> usize {
        self.chains.push(chain);
        self.chains.len() - 1
    }

    pub fn len(&self) -> usize {
        self.chains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    pub fn chains(&self) -> &[FilterChain] {
        &self.chains
    }

    pub fn chain(&self, position: usize) -> Option<&FilterChain> {
        self.chains.get(position)
    }

    pub(crate) fn chain_mut(&mut self, position: usize) -> Option<&mut FilterChain> {
        self.chains.get_mut(position)
    }

    /// Chains joined with `;` in append order. Empty graphs render to an empty string.
    pub fn render(&self, id: GraphId, resolver: &impl Resolver) -> GraphResult<String> {
        let statements = self
            .chains
            .iter()
            .enumerate()
            .map(|(position, chain)| chain.render(ChainId::new(id, position), resolver))
            .collect::<GraphResult<Vec<_>>>()?;

        Ok(statements.join(";"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::FilterNode;
    use crate::specifier::StreamSpecifier;

    struct InputsOnly;

    impl Resolver for InputsOnly {
        fn resolve(&self, specifier: &StreamSpecifier) -> GraphResult<String> {
            Ok(specifier.input_text().unwrap_or_default())
        }
    }

    #[test]
    fn test_positions_follow_append_order() {
        let mut graph = FilterGraph::new();
        for expected in 0..4 {
            let chain = FilterChain::single(FilterNode::new("null").unwrap());
            assert_eq!(graph.append(chain), expected);
        }
        assert_eq!(graph.len(), 4);
    }

    #[test]
    fn test_empty_graph_renders_empty() {
        let graph = FilterGraph::new();
        assert!(graph.is_empty());
        assert_eq!(graph.render(GraphId(0), &InputsOnly).unwrap(), "");
    }

    #[test]
    fn test_chains_joined_with_semicolon() {
        let mut graph = FilterGraph::new();
        graph.append(FilterChain::single(FilterNode::new("hflip").unwrap()));
        graph.append(FilterChain::single(FilterNode::new("vflip").unwrap()));
        assert_eq!(graph.render(GraphId(0), &InputsOnly).unwrap(), "hflip;vflip");
    }
}
