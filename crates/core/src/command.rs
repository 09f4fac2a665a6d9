// Command compiler: owns inputs, graphs and outputs and renders the argument list

use crate::chain::{FilterChain, PadSelector};
use crate::error::{GraphError, GraphResult};
use crate::graph::FilterGraph;
use crate::options::OptionMap;
use crate::specifier::{
    bracketed, ChainId, GraphId, InputId, OutputId, Resolver, StreamSpecifier,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Input {
    url: String,
    options: OptionMap,
}

impl Input {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            options: OptionMap::new(),
        }
    }

    pub fn with_options(url: impl Into<String>, options: OptionMap) -> Self {
        Self {
            url: url.into(),
            options,
        }
    }

    pub fn option(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.options.set(key, value);
        self
    }

    pub fn flag(mut self, key: impl Into<String>) -> Self {
        self.options.flag(key);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn options(&self) -> &OptionMap {
        &self.options
    }

    /// Options first, they apply to the `-i` that follows.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = self.options.to_args();
        args.push("-i".to_string());
        args.push(self.url.clone());
        args
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Output {
    url: String,
    options: OptionMap,
    maps: Vec<StreamSpecifier>,
}

impl Output {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            options: OptionMap::new(),
            maps: Vec::new(),
        }
    }

    pub fn with_options(url: impl Into<String>, options: OptionMap) -> Self {
        Self {
            url: url.into(),
            options,
            maps: Vec::new(),
        }
    }

    pub fn option(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.options.set(key, value);
        self
    }

    pub fn flag(mut self, key: impl Into<String>) -> Self {
        self.options.flag(key);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn options(&self) -> &OptionMap {
        &self.options
    }

    /// Mapped sources; a source's index here is its track index in this output.
    pub fn maps(&self) -> &[StreamSpecifier] {
        &self.maps
    }

    /// Options, then the attached filter graph if any, then the URL.
    pub fn to_args(&self, filter: Option<&str>) -> Vec<String> {
        let mut args = self.options.to_args();
        if let Some(filter) = filter {
            args.push("-filter".to_string());
            args.push(filter.to_string());
        }
        args.push(self.url.clone());
        args
    }
}

/// One `-map` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mapping {
    pub output: OutputId,
    pub track: usize,
    pub source: StreamSpecifier,
}

/// Where `-map` arguments land in the rendered command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MapPlacement {
    /// All maps after the filter graph, before the first output block.
    #[default]
    Leading,
    /// Each output's maps right before that output's block.
    PerOutput,
}

/// Everything needed to spawn the external tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invocation {
    pub executable: String,
    pub args: Vec<String>,
}

impl Invocation {
    /// Shell-quoted one-liner for display and logs. Flags stay bare.
    pub fn to_text(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        if self.executable.chars().any(char::is_whitespace) {
            parts.push(quote_arg(&self.executable));
        } else {
            parts.push(self.executable.clone());
        }
        for arg in &self.args {
            if arg.starts_with('-') {
                parts.push(arg.clone());
            } else {
                parts.push(quote_arg(arg));
            }
        }
        parts.join(" ")
    }
}

fn quote_arg(arg: &str) -> String {
    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('"');
    for c in arg.chars() {
        if matches!(c, '"' | '\\' | '$' | '`') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct GraphSlot {
    graph: FilterGraph,
    output: Option<OutputId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    executable: String,
    global_options: OptionMap,
    inputs: Vec<Input>,
    outputs: Vec<Output>,
    graphs: Vec<GraphSlot>,
    mappings: Vec<Mapping>,
    map_placement: MapPlacement,
}

impl Default for Command {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl Command {
    pub fn new(executable: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
            global_options: OptionMap::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            graphs: Vec::new(),
            mappings: Vec::new(),
            map_placement: MapPlacement::default(),
        }
    }

    pub fn executable(&self) -> &str {
        &self.executable
    }

    pub fn set_map_placement(&mut self, placement: MapPlacement) {
        self.map_placement = placement;
    }

    pub fn global_option(&mut self, key: impl Into<String>, value: impl ToString) {
        self.global_options.set(key, value);
    }

    pub fn global_flag(&mut self, key: impl Into<String>) {
        self.global_options.flag(key);
    }

    pub fn global_options(&self) -> &OptionMap {
        &self.global_options
    }

    /// Append an input; its label is its index and never changes.
    pub fn add_input(&mut self, input: Input) -> InputId {
        let id = InputId(self.inputs.len());
        debug!(label = id.0, url = %input.url(), "Added input");
        self.inputs.push(input);
        id
    }

    pub fn input(&self, id: InputId) -> Option<&Input> {
        self.inputs.get(id.0)
    }

    pub fn inputs(&self) -> &[Input] {
        &self.inputs
    }

    /// Specifier for a stream of one of this command's inputs.
    pub fn input_stream(&self, id: InputId, track: Option<&str>) -> GraphResult<StreamSpecifier> {
        let specifier = StreamSpecifier::from_input(id, track);
        self.check_source(&specifier)?;
        Ok(specifier)
    }

    /// Append a graph. Chains already in it are validated and their bound inputs consumed.
    /// With `on_output`, the graph renders into that output's `-filter` option instead of
    /// `-filter_complex`; its chains then take no bound inputs and expose no pads.
    pub fn add_filter_graph(
        &mut self,
        graph: FilterGraph,
        on_output: Option<OutputId>,
    ) -> GraphResult<GraphId> {
        if let Some(output) = on_output {
            self.output(output)?;
        }

        self.atomically(|cmd| {
            let id = GraphId(cmd.graphs.len());
            cmd.graphs.push(GraphSlot {
                graph: FilterGraph::new(),
                output: on_output,
            });
            for chain in graph.chains() {
                cmd.add_chain(id, chain.clone())?;
            }
            debug!(graph = id.0, chains = graph.len(), ?on_output, "Added filter graph");
            Ok(id)
        })
    }

    /// Append a chain to one of this command's graphs and return its handle.
    pub fn add_chain(&mut self, graph: GraphId, chain: FilterChain) -> GraphResult<ChainId> {
        let position = self.graph_slot(graph)?.graph.len();
        let id = ChainId::new(graph, position);
        if !chain.inputs().is_empty() {
            self.ensure_labelled(id)?;
        }

        self.atomically(|cmd| {
            for specifier in chain.inputs() {
                cmd.check_source(specifier)?;
                cmd.consume(specifier)?;
            }
            cmd.graph_slot_mut(graph)?.graph.append(chain);
            debug!(chain = %id, "Added filter chain");
            Ok(id)
        })
    }

    pub fn graph(&self, id: GraphId) -> Option<&FilterGraph> {
        self.graphs.get(id.0).map(|slot| &slot.graph)
    }

    pub fn chain(&self, id: ChainId) -> Option<&FilterChain> {
        self.graph(id.graph).and_then(|graph| graph.chain(id.position))
    }

    /// Bind one more input to a chain that is already part of the command.
    pub fn bind_input(&mut self, chain: ChainId, specifier: StreamSpecifier) -> GraphResult<()> {
        if let StreamSpecifier::FilterOutput { chain: source, .. } = &specifier {
            if *source == chain {
                return Err(GraphError::SelfReference {
                    chain: chain.to_string(),
                });
            }
        }

        self.ensure_labelled(chain)?;
        self.check_source(&specifier)?;
        self.chain_mut(chain)?.add_input(specifier.clone())?;
        self.consume(&specifier)
    }

    pub fn bind_inputs(
        &mut self,
        chain: ChainId,
        specifiers: impl IntoIterator<Item = StreamSpecifier>,
    ) -> GraphResult<()> {
        self.atomically(|cmd| {
            for specifier in specifiers {
                cmd.bind_input(chain, specifier)?;
            }
            Ok(())
        })
    }

    /// Specifier for an output pad of a chain. The pad is checked against the chain's
    /// output arity now, and gets a consumer registered so rendering will name it.
    pub fn output_pad(
        &mut self,
        chain: ChainId,
        selector: impl Into<PadSelector>,
    ) -> GraphResult<StreamSpecifier> {
        self.ensure_labelled(chain)?;
        let pad = self.chain_mut(chain)?.request_pad(chain, selector.into())?;
        Ok(StreamSpecifier::from_filter_output(chain, pad))
    }

    /// Append an output and record a mapping for each source, in order.
    pub fn add_output(
        &mut self,
        output: Output,
        mappings: impl IntoIterator<Item = StreamSpecifier>,
    ) -> GraphResult<OutputId> {
        self.atomically(|cmd| {
            let id = OutputId(cmd.outputs.len());
            debug!(index = id.0, url = %output.url(), "Added output");
            cmd.outputs.push(output);
            for source in mappings {
                cmd.map_stream(id, source)?;
            }
            Ok(id)
        })
    }

    pub fn output(&self, id: OutputId) -> GraphResult<&Output> {
        self.outputs
            .get(id.0)
            .ok_or(GraphError::UnknownOutput { index: id.0 })
    }

    pub fn outputs(&self) -> &[Output] {
        &self.outputs
    }

    /// Record one mapping request for an existing output and return its track index.
    pub fn map_stream(&mut self, output: OutputId, source: StreamSpecifier) -> GraphResult<usize> {
        self.output(output)?;
        let value = self.mapping_parameter_value(&source)?;

        let target = &mut self.outputs[output.0];
        let track = target.maps.len();
        target.maps.push(source.clone());
        self.mappings.push(Mapping {
            output,
            track,
            source,
        });

        debug!(output = output.0, track, map = %value, "Recorded mapping");
        Ok(track)
    }

    /// Resolve a mapping source and mark a filter-output pad as consumed.
    ///
    /// Inputs render as `label:track`, chain pads as their bracketed label. Anchors that
    /// do not belong to this command are rejected.
    pub fn mapping_parameter_value(&mut self, source: &StreamSpecifier) -> GraphResult<String> {
        self.check_source(source)?;
        self.consume(source)?;
        self.resolve(source)
    }

    pub fn mappings(&self) -> &[Mapping] {
        &self.mappings
    }

    /// Unattached graphs joined into one `-filter_complex` value; `None` when all are empty.
    pub fn filter_complex(&self) -> GraphResult<Option<String>> {
        let mut statements = Vec::new();
        for (index, slot) in self.graphs.iter().enumerate() {
            if slot.output.is_some() || slot.graph.is_empty() {
                continue;
            }
            statements.push(slot.graph.render(GraphId(index), self)?);
        }

        if statements.is_empty() {
            Ok(None)
        } else {
            Ok(Some(statements.join(";")))
        }
    }

    /// Render the ordered argument list. Does not modify the command.
    pub fn to_command(&self) -> GraphResult<Invocation> {
        self.warn_under_connected();

        let mut args = self.global_options.to_args();

        for input in &self.inputs {
            args.extend(input.to_args());
        }

        if let Some(filter_complex) = self.filter_complex()? {
            args.push("-filter_complex".to_string());
            args.push(filter_complex);
        }

        if self.map_placement == MapPlacement::Leading {
            for mapping in &self.mappings {
                args.push("-map".to_string());
                args.push(self.map_value(&mapping.source)?);
            }
        }

        for (index, output) in self.outputs.iter().enumerate() {
            if self.map_placement == MapPlacement::PerOutput {
                for source in output.maps() {
                    args.push("-map".to_string());
                    args.push(self.map_value(source)?);
                }
            }
            let filter = self.attached_filter(OutputId(index))?;
            args.extend(output.to_args(filter.as_deref()));
        }

        Ok(Invocation {
            executable: self.executable.clone(),
            args,
        })
    }

    pub fn to_text(&self) -> GraphResult<String> {
        Ok(self.to_command()?.to_text())
    }

    fn map_value(&self, source: &StreamSpecifier) -> GraphResult<String> {
        self.resolve(source)
    }

    fn attached_filter(&self, output: OutputId) -> GraphResult<Option<String>> {
        let mut statements = Vec::new();
        for (index, slot) in self.graphs.iter().enumerate() {
            if slot.output == Some(output) && !slot.graph.is_empty() {
                statements.push(slot.graph.render(GraphId(index), self)?);
            }
        }

        if statements.is_empty() {
            Ok(None)
        } else {
            Ok(Some(statements.join(";")))
        }
    }

    fn warn_under_connected(&self) {
        for (index, slot) in self.graphs.iter().enumerate() {
            for (position, chain) in slot.graph.chains().iter().enumerate() {
                if chain.is_under_connected() {
                    warn!(
                        chain = %ChainId::new(GraphId(index), position),
                        bound = chain.inputs().len(),
                        arity = %chain.input_arity(),
                        "Filter chain has fewer bound inputs than its first filter accepts"
                    );
                }
            }
        }
    }

    /// Check that a source belongs to this command and is still available.
    fn check_source(&self, source: &StreamSpecifier) -> GraphResult<()> {
        match source {
            StreamSpecifier::Input { input, .. } => {
                if self.input(*input).is_none() {
                    return Err(GraphError::UnknownInput { label: input.0 });
                }
            }
            StreamSpecifier::FilterOutput { chain, pad } => {
                let target = self.chain(*chain).ok_or_else(|| GraphError::UnknownMappingSource {
                    source_desc: chain.to_string(),
                })?;
                self.ensure_labelled(*chain)?;
                target.check_pad(*chain, *pad)?;
                if target.is_pad_consumed(*pad) {
                    return Err(GraphError::PadAlreadyConsumed {
                        label: target.pad_label(*chain, *pad),
                    });
                }
            }
        }
        Ok(())
    }

    /// Chains of a graph attached to an output render into a simple `-filter` value,
    /// which has no room for pad labels.
    fn ensure_labelled(&self, chain: ChainId) -> GraphResult<()> {
        let attached = self
            .graphs
            .get(chain.graph.0)
            .is_some_and(|slot| slot.output.is_some());
        if attached {
            return Err(GraphError::AttachedChain {
                chain: chain.to_string(),
            });
        }
        Ok(())
    }

    fn consume(&mut self, source: &StreamSpecifier) -> GraphResult<()> {
        match source {
            StreamSpecifier::Input { .. } => Ok(()),
            StreamSpecifier::FilterOutput { chain, pad } => {
                let id = *chain;
                self.chain_mut(id)?.consume_pad(id, *pad)
            }
        }
    }

    fn chain_mut(&mut self, id: ChainId) -> GraphResult<&mut FilterChain> {
        self.graphs
            .get_mut(id.graph.0)
            .and_then(|slot| slot.graph.chain_mut(id.position))
            .ok_or_else(|| GraphError::UnknownMappingSource {
                source_desc: id.to_string(),
            })
    }

    fn graph_slot(&self, id: GraphId) -> GraphResult<&GraphSlot> {
        self.graphs
            .get(id.0)
            .ok_or(GraphError::UnknownGraph { index: id.0 })
    }

    fn graph_slot_mut(&mut self, id: GraphId) -> GraphResult<&mut GraphSlot> {
        self.graphs
            .get_mut(id.0)
            .ok_or(GraphError::UnknownGraph { index: id.0 })
    }

    /// Run `f`; on failure restore the state from before the call. Clones the whole
    /// command per call, which is linear in its size.
    // TODO: keep an undo log of touched pads instead of a full snapshot if commands
    // with thousands of chains show up.
    fn atomically<T>(&mut self, f: impl FnOnce(&mut Self) -> GraphResult<T>) -> GraphResult<T> {
        let snapshot = self.clone();
        let result = f(self);
        if result.is_err() {
            *self = snapshot;
        }
        result
    }
}

impl Resolver for Command {
    fn resolve(&self, specifier: &StreamSpecifier) -> GraphResult<String> {
        match specifier {
            StreamSpecifier::Input { input, .. } => {
                if self.input(*input).is_none() {
                    return Err(GraphError::UnknownInput { label: input.0 });
                }
                Ok(specifier.input_text().unwrap_or_default())
            }
            StreamSpecifier::FilterOutput { chain, pad } => {
                let target = self.chain(*chain).ok_or_else(|| GraphError::UnknownMappingSource {
                    source_desc: chain.to_string(),
                })?;
                target.check_pad(*chain, *pad)?;
                Ok(bracketed(&target.pad_label(*chain, *pad)))
            }
        }
    }
}
