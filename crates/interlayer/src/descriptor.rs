//! YAML descriptor files: layouts, layer workloads and dependency maps.
//!
//! All loaders are strict: an unreadable file or malformed document is a
//! [`DescriptorError`]. Unknown keys are ignored.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::dataspace::{DependencyGraph, LayerId, Role, Workload};
use crate::error::DescriptorError;
use crate::layout::{LayoutDescriptor, LayoutKind, LayoutNest};
use crate::rank::{FactorMap, Permutation, Rank};

fn read(path: &Path) -> Result<String, DescriptorError> {
    std::fs::read_to_string(path).map_err(|source| DescriptorError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn yaml_error(origin: &str) -> impl FnOnce(serde_yaml::Error) -> DescriptorError + '_ {
    move |source| DescriptorError::Yaml {
        origin: origin.to_string(),
        source,
    }
}

// Layout files - `layout: [{target, type, factors, permutation}]`

#[derive(Debug, Serialize, Deserialize)]
struct LayoutFile {
    #[serde(default)]
    layout: Vec<LayoutEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct LayoutEntry {
    target: String,
    #[serde(rename = "type", alias = "kind")]
    kind: String,
    #[serde(default)]
    factors: String,
    #[serde(default)]
    permutation: String,
}

/// Parse a layout document. `origin` names the source in error messages.
pub fn parse_layout(text: &str, origin: &str) -> Result<LayoutDescriptor, DescriptorError> {
    let file: Option<LayoutFile> = serde_yaml::from_str(text).map_err(yaml_error(origin))?;
    let entries = file.map(|f| f.layout).unwrap_or_default();
    let mut nests = Vec::with_capacity(entries.len());
    for entry in entries {
        let Some(kind) = LayoutKind::parse(&entry.kind) else {
            warn!(
                origin,
                memory = %entry.target,
                kind = %entry.kind,
                "skipping layout entry of unknown type"
            );
            continue;
        };
        let factors: FactorMap = entry.factors.parse()?;
        nests.push(LayoutNest {
            target: entry.target,
            kind,
            factors,
            permutation: Permutation::from(entry.permutation.as_str()),
        });
    }
    let layout = LayoutDescriptor::new(nests)?;
    for target in layout.targets() {
        let oversized = layout.oversized_authblock(target);
        if !oversized.is_empty() {
            warn!(
                origin,
                memory = %target,
                ranks = ?oversized,
                "authblock_lines factor exceeds interline factor"
            );
        }
    }
    Ok(layout)
}

pub fn load_layout(path: impl AsRef<Path>) -> Result<LayoutDescriptor, DescriptorError> {
    let path = path.as_ref();
    parse_layout(&read(path)?, &path.display().to_string())
}

/// Serialize a descriptor in the same format [`parse_layout`] reads.
pub fn layout_to_yaml(layout: &LayoutDescriptor) -> Result<String, DescriptorError> {
    let file = LayoutFile {
        layout: layout
            .nests()
            .iter()
            .map(|n| LayoutEntry {
                target: n.target.clone(),
                kind: n.kind.as_str().to_string(),
                factors: n.factors.to_string(),
                permutation: n.permutation.to_string(),
            })
            .collect(),
    };
    serde_yaml::to_string(&file).map_err(DescriptorError::Serialize)
}

pub fn write_layout(
    path: impl AsRef<Path>,
    layout: &LayoutDescriptor,
) -> Result<(), DescriptorError> {
    let path = path.as_ref();
    std::fs::write(path, layout_to_yaml(layout)?).map_err(|source| DescriptorError::Io {
        path: path.to_path_buf(),
        source,
    })
}

// Workload files - `problem: {instance, shape: {data-spaces: [...]}}`

#[derive(Debug, Deserialize)]
struct WorkloadFile {
    problem: ProblemEntry,
}

#[derive(Debug, Deserialize)]
struct ProblemEntry {
    #[serde(default)]
    instance: BTreeMap<String, serde_yaml::Value>,
    shape: ShapeEntry,
}

#[derive(Debug, Deserialize)]
struct ShapeEntry {
    #[serde(default, rename = "data-spaces", alias = "data_spaces")]
    data_spaces: Vec<DataSpaceEntry>,
}

#[derive(Debug, Deserialize)]
struct DataSpaceEntry {
    name: String,
    #[serde(default)]
    ranks: Vec<String>,
}

pub fn parse_workload(text: &str, origin: &str) -> Result<Workload, DescriptorError> {
    let file: WorkloadFile = serde_yaml::from_str(text).map_err(yaml_error(origin))?;
    let mut workload = Workload::default();
    for (name, value) in &file.problem.instance {
        // Instance maps also carry strides and dilations (`Hstride`, ...).
        let (Ok(rank), Some(extent)) = (name.parse::<Rank>(), value.as_u64()) else {
            debug!(origin, key = %name, "ignoring non-rank instance entry");
            continue;
        };
        workload.instance.insert(rank, extent);
    }
    for ds in file.problem.shape.data_spaces {
        let Some(role) = Role::parse(&ds.name) else {
            debug!(origin, name = %ds.name, "ignoring unknown dataspace");
            continue;
        };
        let ranks = ds
            .ranks
            .iter()
            .map(|r| r.parse())
            .collect::<Result<Vec<Rank>, _>>()?;
        workload.dataspaces.insert(role, ranks);
    }
    Ok(workload)
}

pub fn load_workload(path: impl AsRef<Path>) -> Result<Workload, DescriptorError> {
    let path = path.as_ref();
    parse_workload(&read(path)?, &path.display().to_string())
}

// Dependency files - `layer: [producers]`, null for none

pub fn parse_dependencies(text: &str, origin: &str) -> Result<DependencyGraph, DescriptorError> {
    let map: Option<BTreeMap<LayerId, Option<Vec<LayerId>>>> =
        serde_yaml::from_str(text).map_err(yaml_error(origin))?;
    let mut graph = DependencyGraph::new();
    for (layer, producers) in map.unwrap_or_default() {
        graph.add_layer(layer);
        for producer in producers.unwrap_or_default() {
            graph.add_edge(producer, layer);
        }
    }
    Ok(graph)
}

pub fn load_dependencies(path: impl AsRef<Path>) -> Result<DependencyGraph, DescriptorError> {
    let path = path.as_ref();
    parse_dependencies(&read(path)?, &path.display().to_string())
}
