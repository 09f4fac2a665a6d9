// Filter chain: a linear run of filters rendered as one graph statement

use crate::arity::Arity;
use crate::error::{GraphError, GraphResult};
use crate::node::FilterNode;
use crate::specifier::{bracketed, pad_label, ChainId, Resolver, StreamSpecifier};
use tracing::debug;

/// Which output pad a new specifier should point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PadSelector {
    /// First pad that nobody has asked for yet. Asking counts as a reference even if
    /// the specifier is never consumed, so a single-output chain answers `Next` once
    /// and later requests must name the pad by index.
    #[default]
    Next,
    Index(usize),
}

impl From<usize> for PadSelector {
    fn from(index: usize) -> Self {
        PadSelector::Index(index)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct PadUsage {
    requested: usize,
    consumed: bool,
}

impl PadUsage {
    fn is_named(&self) -> bool {
        self.requested > 0 || self.consumed
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterChain {
    nodes: Vec<FilterNode>,
    inputs: Vec<StreamSpecifier>,
    pads: Vec<PadUsage>,
}

impl FilterChain {
    pub fn new(nodes: Vec<FilterNode>) -> GraphResult<Self> {
        if nodes.is_empty() {
            return Err(GraphError::EmptyChain);
        }

        Ok(Self {
            nodes,
            inputs: Vec::new(),
            pads: Vec::new(),
        })
    }

    pub fn single(node: FilterNode) -> Self {
        Self {
            nodes: vec![node],
            inputs: Vec::new(),
            pads: Vec::new(),
        }
    }

    pub fn append_nodes(&mut self, nodes: impl IntoIterator<Item = FilterNode>) {
        self.nodes.extend(nodes);
    }

    pub fn prepend_nodes(&mut self, nodes: impl IntoIterator<Item = FilterNode>) {
        let mut nodes: Vec<FilterNode> = nodes.into_iter().collect();
        nodes.append(&mut self.nodes);
        self.nodes = nodes;
    }

    pub fn nodes(&self) -> &[FilterNode] {
        &self.nodes
    }

    /// Input arity of the first filter.
    pub fn input_arity(&self) -> Arity {
        self.first().input_arity()
    }

    /// Output arity of the last filter.
    pub fn output_arity(&self) -> Arity {
        self.last().output_arity()
    }

    pub fn last_filter_name(&self) -> &str {
        self.last().name()
    }

    pub fn inputs(&self) -> &[StreamSpecifier] {
        &self.inputs
    }

    pub fn add_input(&mut self, specifier: StreamSpecifier) -> GraphResult<()> {
        let arity = self.input_arity();
        if !arity.accepts(self.inputs.len() + 1) {
            return Err(GraphError::TooManyInputs {
                chain: self.describe(),
                arity: arity.fixed().unwrap_or_default(),
            });
        }

        debug!(chain = %self.describe(), ?specifier, "Binding chain input");
        self.inputs.push(specifier);
        Ok(())
    }

    /// Bind several inputs; stops at the first one that does not fit.
    pub fn add_inputs(
        &mut self,
        specifiers: impl IntoIterator<Item = StreamSpecifier>,
    ) -> GraphResult<()> {
        for specifier in specifiers {
            self.add_input(specifier)?;
        }
        Ok(())
    }

    /// Fewer bound inputs than a finite input arity asks for. The external tool may still
    /// connect the rest implicitly, so this is advisory only.
    pub fn is_under_connected(&self) -> bool {
        match self.input_arity() {
            Arity::Fixed(n) => self.inputs.len() < n,
            Arity::Unbounded => false,
        }
    }

    /// Whether rendering will name this pad.
    pub fn is_pad_named(&self, pad: usize) -> bool {
        self.pads.get(pad).is_some_and(PadUsage::is_named)
    }

    pub fn is_pad_consumed(&self, pad: usize) -> bool {
        self.pads.get(pad).is_some_and(|usage| usage.consumed)
    }

    /// Register a consumer on a pad and return its index.
    pub(crate) fn request_pad(&mut self, id: ChainId, selector: PadSelector) -> GraphResult<usize> {
        let arity = self.output_arity();
        let pad = match selector {
            PadSelector::Index(pad) => pad,
            PadSelector::Next => {
                let free = self
                    .pads
                    .iter()
                    .position(|usage| !usage.is_named())
                    .unwrap_or(self.pads.len());
                if !arity.contains(free) {
                    return Err(GraphError::NoFreeOutputPad {
                        chain: id.to_string(),
                    });
                }
                free
            }
        };

        self.check_pad(id, pad)?;
        self.usage_mut(id, pad)?.requested += 1;
        Ok(pad)
    }

    /// Mark a pad as consumed. A pad feeds exactly one destination.
    pub(crate) fn consume_pad(&mut self, id: ChainId, pad: usize) -> GraphResult<()> {
        self.check_pad(id, pad)?;
        if self.is_pad_consumed(pad) {
            return Err(GraphError::PadAlreadyConsumed {
                label: pad_label(id, self.last_filter_name(), pad),
            });
        }

        self.usage_mut(id, pad)?.consumed = true;
        Ok(())
    }

    /// Pads of an unbounded chain grow one at a time: an index may reach at most one
    /// past the highest pad seen so far.
    pub(crate) fn check_pad(&self, id: ChainId, pad: usize) -> GraphResult<()> {
        match self.output_arity() {
            Arity::Fixed(n) if pad < n => Ok(()),
            Arity::Fixed(n) => Err(GraphError::PadOutOfRange {
                chain: id.to_string(),
                pad,
                arity: n,
            }),
            Arity::Unbounded if pad <= self.pads.len() => Ok(()),
            Arity::Unbounded => Err(GraphError::PadNotContiguous {
                chain: id.to_string(),
                pad,
                next: self.pads.len(),
            }),
        }
    }

    /// Label of a pad at render time.
    pub fn pad_label(&self, id: ChainId, pad: usize) -> String {
        pad_label(id, self.last_filter_name(), pad)
    }

    /// Render `[in]...filter,filter...[out]...`.
    ///
    /// Output labels run from pad 0 up to the highest named pad so that every label
    /// keeps its positional meaning; a chain nobody references gets none.
    pub fn render(&self, id: ChainId, resolver: &impl Resolver) -> GraphResult<String> {
        let mut text = String::new();

        for specifier in &self.inputs {
            text.push_str(&bracketed(&resolver.resolve(specifier)?));
        }

        let filters: Vec<String> = self.nodes.iter().map(FilterNode::render).collect();
        text.push_str(&filters.join(","));

        if let Some(highest) = self.pads.iter().rposition(PadUsage::is_named) {
            for pad in 0..=highest {
                text.push_str(&bracketed(&self.pad_label(id, pad)));
            }
        }

        Ok(text)
    }

    fn usage_mut(&mut self, id: ChainId, pad: usize) -> GraphResult<&mut PadUsage> {
        if self.pads.len() <= pad {
            let len = pad.checked_add(1).ok_or_else(|| GraphError::PadOutOfRange {
                chain: id.to_string(),
                pad,
                arity: self.output_arity().fixed().unwrap_or_default(),
            })?;
            self.pads.resize(len, PadUsage::default());
        }
        Ok(&mut self.pads[pad])
    }

    fn describe(&self) -> String {
        self.nodes
            .iter()
            .map(FilterNode::name)
            .collect::<Vec<_>>()
            .join(",")
    }

    fn first(&self) -> &FilterNode {
        // Construction guarantees at least one node.
        &self.nodes[0]
    }

    fn last(&self) -> &FilterNode {
        &self.nodes[self.nodes.len() - 1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::specifier::{GraphId, InputId};

    /// Resolves inputs the way a command does and names chain pads by position only.
    struct PlainResolver;

    impl Resolver for PlainResolver {
        fn resolve(&self, specifier: &StreamSpecifier) -> GraphResult<String> {
            match specifier {
                StreamSpecifier::Input { .. } => Ok(specifier.input_text().unwrap_or_default()),
                StreamSpecifier::FilterOutput { chain, pad } => {
                    Ok(format!("[{}_{}]", chain, pad))
                }
            }
        }
    }

    fn id(position: usize) -> ChainId {
        ChainId::new(GraphId(0), position)
    }

    fn node(name: &str) -> FilterNode {
        FilterNode::new(name).unwrap()
    }

    #[test]
    fn test_empty_chain_rejected() {
        assert_eq!(FilterChain::new(vec![]).unwrap_err(), GraphError::EmptyChain);
    }

    #[test]
    fn test_arity_follows_first_and_last_node() {
        let mut chain = FilterChain::single(node("scale"));
        chain.prepend_nodes(vec![
            node("overlay").with_arity(Arity::Fixed(2), Arity::Fixed(1))
        ]);
        chain.append_nodes(vec![
            node("split").with_arity(Arity::Fixed(1), Arity::Fixed(3))
        ]);

        assert_eq!(chain.input_arity(), Arity::Fixed(2));
        assert_eq!(chain.output_arity(), Arity::Fixed(3));
        assert_eq!(chain.last_filter_name(), "split");
    }

    #[test]
    fn test_unreferenced_chain_renders_without_labels() {
        let chain = FilterChain::single(node("edgedetect"));
        assert_eq!(chain.render(id(0), &PlainResolver).unwrap(), "edgedetect");
        assert!(chain.is_under_connected());
    }

    #[test]
    fn test_render_brackets_inputs_once() {
        let mut chain = FilterChain::new(vec![
            node("overlay").with_arity(Arity::Fixed(2), Arity::Fixed(1)),
            node("format").option("pix_fmts", "yuv420p").unwrap(),
        ])
        .unwrap();
        chain
            .add_inputs(vec![
                StreamSpecifier::from_input(InputId(0), Some("v")),
                StreamSpecifier::from_filter_output(id(0), 0),
            ])
            .unwrap();

        assert_eq!(
            chain.render(id(1), &PlainResolver).unwrap(),
            "[0:v][chain0_0]overlay,format=pix_fmts=yuv420p"
        );
        assert!(!chain.is_under_connected());
    }

    #[test]
    fn test_too_many_inputs() {
        let mut chain = FilterChain::single(node("hflip"));
        chain
            .add_input(StreamSpecifier::from_input(InputId(0), None))
            .unwrap();
        let err = chain
            .add_input(StreamSpecifier::from_input(InputId(1), None))
            .unwrap_err();
        assert!(matches!(err, GraphError::TooManyInputs { arity: 1, .. }));
        assert_eq!(chain.inputs().len(), 1);
    }

    #[test]
    fn test_next_pad_walks_outputs() {
        let mut chain = FilterChain::single(
            node("split").with_arity(Arity::Fixed(1), Arity::Fixed(2)),
        );
        assert_eq!(chain.request_pad(id(0), PadSelector::Next).unwrap(), 0);
        assert_eq!(chain.request_pad(id(0), PadSelector::Next).unwrap(), 1);
        let err = chain.request_pad(id(0), PadSelector::Next).unwrap_err();
        assert!(matches!(err, GraphError::NoFreeOutputPad { .. }));
    }

    #[test]
    fn test_index_out_of_range_fails_at_request() {
        let mut chain = FilterChain::single(node("null"));
        let err = chain.request_pad(id(0), PadSelector::Index(1)).unwrap_err();
        assert!(matches!(err, GraphError::PadOutOfRange { pad: 1, arity: 1, .. }));
    }

    #[test]
    fn test_labels_fill_up_to_highest_named_pad() {
        let mut chain = FilterChain::single(
            node("asplit").with_arity(Arity::Fixed(1), Arity::Fixed(3)),
        );
        chain.request_pad(id(2), PadSelector::Index(1)).unwrap();

        assert_eq!(
            chain.render(id(2), &PlainResolver).unwrap(),
            "asplit[chain2_asplit_0][chain2_asplit_1]"
        );
        assert!(!chain.is_pad_named(0));
        assert!(chain.is_pad_named(1));
    }

    #[test]
    fn test_consume_once() {
        let mut chain = FilterChain::single(node("null"));
        chain.consume_pad(id(0), 0).unwrap();
        let err = chain.consume_pad(id(0), 0).unwrap_err();
        assert_eq!(
            err,
            GraphError::PadAlreadyConsumed {
                label: "chain0_null_0".to_string()
            }
        );
    }

    #[test]
    fn test_unbounded_outputs_grow() {
        let mut chain = FilterChain::single(
            node("segment").with_arity(Arity::Fixed(1), Arity::Unbounded),
        );
        for expected in 0..5 {
            assert_eq!(chain.request_pad(id(0), PadSelector::Next).unwrap(), expected);
        }
        assert_eq!(chain.request_pad(id(0), PadSelector::Index(5)).unwrap(), 5);
        assert_eq!(chain.request_pad(id(0), PadSelector::Index(2)).unwrap(), 2);
    }

    #[test]
    fn test_unbounded_pad_index_cannot_skip_ahead() {
        let mut chain = FilterChain::single(
            node("segment").with_arity(Arity::Fixed(1), Arity::Unbounded),
        );
        chain.request_pad(id(0), PadSelector::Next).unwrap();

        for pad in [2, 10_000, 1 << 40, usize::MAX] {
            let err = chain.request_pad(id(0), PadSelector::Index(pad)).unwrap_err();
            assert_eq!(
                err,
                GraphError::PadNotContiguous {
                    chain: "chain0".to_string(),
                    pad,
                    next: 1,
                }
            );
            assert!(matches!(
                chain.consume_pad(id(0), pad),
                Err(GraphError::PadNotContiguous { .. })
            ));
        }

        assert_eq!(
            chain.render(id(0), &PlainResolver).unwrap(),
            "segment[chain0_segment_0]"
        );
    }

    #[test]
    fn test_next_counts_requests_not_consumption() {
        let mut chain = FilterChain::single(node("null"));
        assert_eq!(chain.request_pad(id(0), PadSelector::Next).unwrap(), 0);
        assert!(!chain.is_pad_consumed(0));

        let err = chain.request_pad(id(0), PadSelector::Next).unwrap_err();
        assert!(matches!(err, GraphError::NoFreeOutputPad { .. }));
        assert_eq!(chain.request_pad(id(0), PadSelector::Index(0)).unwrap(), 0);
    }
}
