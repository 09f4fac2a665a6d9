// Declarative job files: inputs, filter graphs and outputs described in TOML

use crate::arity::Arity;
use crate::chain::{FilterChain, PadSelector};
use crate::command::{Command, Input, Output};
use crate::config::CompilerConfig;
use crate::graph::FilterGraph;
use crate::node::FilterNode;
use crate::options::OptionMap;
use crate::specifier::{ChainId, InputId, OutputId, StreamSpecifier};
use anyhow::{anyhow, Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

const ID_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_.-]*$";
const REFERENCE_PATTERN: &str = r"^([A-Za-z_][A-Za-z0-9_.-]*)(?::(.+))?$";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Job {
    pub global: OptionMap,
    pub inputs: Vec<JobInput>,
    pub graphs: Vec<JobGraph>,
    pub outputs: Vec<JobOutput>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobInput {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub options: OptionMap,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JobGraph {
    /// Id of the output this graph is attached to; unattached graphs go to `-filter_complex`.
    pub output: Option<String>,
    pub chains: Vec<JobChain>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobChain {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub inputs: Vec<String>,
    pub filters: Vec<JobFilter>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobFilter {
    pub name: String,
    #[serde(default)]
    pub args: Vec<toml::Value>,
    #[serde(default)]
    pub options: OptionMap,
    #[serde(default)]
    pub input_pads: Arity,
    #[serde(default)]
    pub output_pads: Arity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobOutput {
    #[serde(default)]
    pub id: Option<String>,
    pub url: String,
    #[serde(default)]
    pub options: OptionMap,
    #[serde(default)]
    pub map: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
enum Anchor {
    Input(InputId),
    Chain(ChainId),
    Output(OutputId),
}

pub fn load_job(path: &Path) -> Result<Job> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read job file {:?}", path))?;

    toml::from_str::<Job>(&contents)
        .map_err(|e| anyhow!("Failed to parse TOML job: {}", e))
}

impl Job {
    /// Build the command this job describes.
    ///
    /// Outputs are created before graphs so graphs can attach to them, and chains are
    /// all placed before any input is bound so a chain may reference a later one.
    pub fn compile(&self, config: &CompilerConfig) -> Result<Command> {
        let id_re = Regex::new(ID_PATTERN).context("Failed to compile id pattern")?;
        let reference_re =
            Regex::new(REFERENCE_PATTERN).context("Failed to compile reference pattern")?;

        let mut cmd = config.command();
        for (key, value) in self.global.iter() {
            match value {
                Some(value) => cmd.global_option(key, value),
                None => cmd.global_flag(key),
            }
        }

        let mut anchors: HashMap<String, Anchor> = HashMap::new();

        for input in &self.inputs {
            let id = cmd.add_input(Input::with_options(&input.url, input.options.clone()));
            register(&mut anchors, &id_re, &input.id, Anchor::Input(id))?;
        }

        for output in &self.outputs {
            let id = cmd
                .add_output(
                    Output::with_options(&output.url, output.options.clone()),
                    Vec::new(),
                )
                .with_context(|| format!("Failed to add output {:?}", output.url))?;
            if let Some(name) = &output.id {
                register(&mut anchors, &id_re, name, Anchor::Output(id))?;
            }
        }

        let mut placed = Vec::new();
        for (index, graph) in self.graphs.iter().enumerate() {
            let target = match &graph.output {
                Some(name) => match anchors.get(name) {
                    Some(Anchor::Output(id)) => Some(*id),
                    _ => anyhow::bail!("Graph {} is attached to unknown output {:?}", index, name),
                },
                None => None,
            };
            let graph_id = cmd
                .add_filter_graph(FilterGraph::new(), target)
                .with_context(|| format!("Failed to add graph {}", index))?;

            for job_chain in &graph.chains {
                let chain = build_chain(job_chain)?;
                let chain_id = cmd
                    .add_chain(graph_id, chain)
                    .with_context(|| format!("Failed to add chain to graph {}", index))?;
                if let Some(name) = &job_chain.id {
                    register(&mut anchors, &id_re, name, Anchor::Chain(chain_id))?;
                }
                placed.push((chain_id, job_chain));
            }
        }

        for (chain_id, job_chain) in placed {
            for reference in &job_chain.inputs {
                let specifier = resolve_reference(&mut cmd, &anchors, &reference_re, reference)?;
                cmd.bind_input(chain_id, specifier)
                    .with_context(|| format!("Failed to bind {:?} to {}", reference, chain_id))?;
            }
        }

        for (index, output) in self.outputs.iter().enumerate() {
            for reference in &output.map {
                let specifier = resolve_reference(&mut cmd, &anchors, &reference_re, reference)?;
                cmd.map_stream(OutputId(index), specifier)
                    .with_context(|| format!("Failed to map {:?} into {:?}", reference, output.url))?;
            }
        }

        debug!(
            inputs = cmd.inputs().len(),
            outputs = cmd.outputs().len(),
            mappings = cmd.mappings().len(),
            "Compiled job"
        );
        Ok(cmd)
    }
}

fn register(
    anchors: &mut HashMap<String, Anchor>,
    id_re: &Regex,
    id: &str,
    anchor: Anchor,
) -> Result<()> {
    if !id_re.is_match(id) {
        anyhow::bail!("Invalid id {:?}", id);
    }
    if anchors.insert(id.to_string(), anchor).is_some() {
        anyhow::bail!("Duplicate id {:?}", id);
    }
    Ok(())
}

fn build_chain(job_chain: &JobChain) -> Result<FilterChain> {
    let nodes = job_chain
        .filters
        .iter()
        .map(build_node)
        .collect::<Result<Vec<_>>>()?;

    FilterChain::new(nodes).map_err(|e| anyhow!("Invalid chain {:?}: {}", job_chain.id, e))
}

fn build_node(filter: &JobFilter) -> Result<FilterNode> {
    let mut node = FilterNode::new(&filter.name)?.with_arity(filter.input_pads, filter.output_pads);

    for arg in &filter.args {
        let text = match arg {
            toml::Value::String(s) => s.clone(),
            toml::Value::Integer(i) => i.to_string(),
            toml::Value::Float(f) => f.to_string(),
            toml::Value::Boolean(b) => b.to_string(),
            other => anyhow::bail!(
                "Unsupported argument {} for filter {:?}",
                other,
                filter.name
            ),
        };
        node = node.arg(text);
    }

    for (key, value) in filter.options.iter() {
        let value = value.ok_or_else(|| {
            anyhow!("Filter option {:?} of {:?} needs a value", key, filter.name)
        })?;
        node = node.option(key, value)?;
    }

    Ok(node)
}

/// Parse `<id>` or `<id>:<selector>` into a specifier.
fn resolve_reference(
    cmd: &mut Command,
    anchors: &HashMap<String, Anchor>,
    reference_re: &Regex,
    reference: &str,
) -> Result<StreamSpecifier> {
    let caps = reference_re
        .captures(reference)
        .ok_or_else(|| anyhow!("Malformed stream reference {:?}", reference))?;
    let name = &caps[1];
    let selector = caps.get(2).map(|m| m.as_str());

    match anchors.get(name) {
        Some(Anchor::Input(id)) => Ok(cmd.input_stream(*id, selector)?),
        Some(Anchor::Chain(id)) => {
            let selector = match selector {
                Some(pad) => PadSelector::Index(
                    pad.parse::<usize>()
                        .with_context(|| format!("Invalid pad index in {:?}", reference))?,
                ),
                None => PadSelector::Next,
            };
            Ok(cmd.output_pad(*id, selector)?)
        }
        Some(Anchor::Output(_)) => {
            anyhow::bail!("Reference {:?} points at an output, not a stream", reference)
        }
        None => anyhow::bail!("Unknown stream reference {:?}", reference),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(text: &str) -> Result<Command> {
        let job: Job = toml::from_str(text).expect("job should parse");
        let config = CompilerConfig {
            overwrite: false,
            hide_banner: false,
            ..Default::default()
        };
        job.compile(&config)
    }

    #[test]
    fn test_edgedetect_job() {
        let cmd = compile(
            r#"
[[inputs]]
id = "clip"
url = "clip.mov"

[[graphs]]
[[graphs.chains]]
id = "edges"
inputs = ["clip"]
[[graphs.chains.filters]]
name = "edgedetect"

[[outputs]]
url = "edges.mp4"
map = ["edges"]
"#,
        )
        .unwrap();

        assert_eq!(
            cmd.to_command().unwrap().args,
            vec![
                "-i",
                "clip.mov",
                "-filter_complex",
                "[0]edgedetect[chain0_edgedetect_0]",
                "-map",
                "[chain0_edgedetect_0]",
                "edges.mp4",
            ]
        );
    }

    #[test]
    fn test_forward_reference_between_chains() {
        let cmd = compile(
            r#"
[[inputs]]
id = "main"
url = "main.mp4"

[[inputs]]
id = "logo"
url = "logo.png"

[[graphs]]
[[graphs.chains]]
id = "mix"
inputs = ["main:v", "small"]
[[graphs.chains.filters]]
name = "overlay"
input_pads = 2
options = { x = 10, y = 10 }

[[graphs.chains]]
id = "small"
inputs = ["logo"]
[[graphs.chains.filters]]
name = "scale"
args = [64, -1]

[[outputs]]
url = "out.mp4"
map = ["mix", "main:a"]
options = { "c:a" = "copy" }
"#,
        )
        .unwrap();

        assert_eq!(
            cmd.filter_complex().unwrap().as_deref(),
            Some("[0:v][chain1_scale_0]overlay=x=10:y=10[chain0_overlay_0];[1]scale=64:-1[chain1_scale_0]")
        );
        let args = cmd.to_command().unwrap().args;
        assert_eq!(
            &args[args.len() - 7..],
            &["-map", "[chain0_overlay_0]", "-map", "0:a", "-c:a", "copy", "out.mp4"]
        );
    }

    #[test]
    fn test_graph_attached_to_output() {
        let cmd = compile(
            r#"
[[inputs]]
id = "src"
url = "in.mkv"

[[outputs]]
id = "small"
url = "small.mkv"

[[graphs]]
output = "small"
[[graphs.chains]]
[[graphs.chains.filters]]
name = "scale"
args = [640, -2]
"#,
        )
        .unwrap();

        assert_eq!(
            cmd.to_command().unwrap().args,
            vec!["-i", "in.mkv", "-filter", "scale=640:-2", "small.mkv"]
        );
    }

    #[test]
    fn test_attached_graph_chain_cannot_be_mapped() {
        let err = compile(
            r#"
[[inputs]]
id = "src"
url = "in.mkv"

[[outputs]]
id = "small"
url = "small.mkv"

[[graphs]]
output = "small"
[[graphs.chains]]
id = "scaled"
inputs = ["src"]
[[graphs.chains.filters]]
name = "scale"
args = [640, -2]
"#,
        )
        .unwrap_err();
        assert!(format!("{:#}", err).contains("no labelled pads"), "{:#}", err);
    }

    #[test]
    fn test_unbounded_pad_reference_far_ahead() {
        let err = compile(
            r#"
[[inputs]]
id = "src"
url = "in.mkv"

[[graphs]]
[[graphs.chains]]
id = "seg"
inputs = ["src"]
[[graphs.chains.filters]]
name = "segment"
output_pads = "unbounded"

[[outputs]]
url = "out.mkv"
map = ["seg:18446744073709551615"]
"#,
        )
        .unwrap_err();
        assert!(format!("{:#}", err).contains("skips ahead"), "{:#}", err);
    }

    #[test]
    fn test_unknown_reference() {
        let err = compile(
            r#"
[[outputs]]
url = "out.mp4"
map = ["nowhere:v"]
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("Unknown stream reference"));
    }

    #[test]
    fn test_duplicate_id() {
        let err = compile(
            r#"
[[inputs]]
id = "a"
url = "1.mp4"

[[inputs]]
id = "a"
url = "2.mp4"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("Duplicate id"));
    }

    #[test]
    fn test_double_map_of_chain_pad_fails() {
        let err = compile(
            r#"
[[inputs]]
id = "src"
url = "in.mp4"

[[graphs]]
[[graphs.chains]]
id = "flip"
inputs = ["src"]
[[graphs.chains.filters]]
name = "hflip"

[[outputs]]
url = "a.mp4"
map = ["flip:0"]

[[outputs]]
url = "b.mp4"
map = ["flip:0"]
"#,
        )
        .unwrap_err();
        assert!(format!("{:#}", err).contains("already consumed"));
    }

    #[test]
    fn test_filter_option_flag_rejected() {
        let err = compile(
            r#"
[[graphs]]
[[graphs.chains]]
[[graphs.chains.filters]]
name = "fps"
options = { round = true }
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("needs a value"));
    }
}
