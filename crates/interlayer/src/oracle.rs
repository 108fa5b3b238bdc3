//! Per-layer cost oracle: the black box that prices a layer under a fixed layout.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info};

use crate::Cycles;
use crate::dataspace::LayerId;
use crate::descriptor::write_layout;
use crate::error::OracleError;
use crate::layout::LayoutDescriptor;

/// Stats file written by the mapper into its working directory.
pub const DEFAULT_STATS_FILE: &str = "timeloop-mapper.stats.txt";

/// Layout file written for each submission.
pub const LAYOUT_FILE: &str = "layout.yaml";

// CostOracle - Latency of one layer under one layout

pub trait CostOracle {
    /// Compute latency of `layer` with `layout` fixed as input. Blocking; not retried.
    fn submit(&mut self, layer: LayerId, layout: &LayoutDescriptor) -> Result<Cycles, OracleError>;
}

impl<F> CostOracle for F
where
    F: FnMut(LayerId, &LayoutDescriptor) -> Result<Cycles, OracleError>,
{
    fn submit(&mut self, layer: LayerId, layout: &LayoutDescriptor) -> Result<Cycles, OracleError> {
        self(layer, layout)
    }
}

// CachedOracle - Memoizes submissions by (layer, layout)

/// Search trials re-price the same (layer, layout) many times; this answers
/// repeats from memory. Errors are not cached.
#[derive(Debug)]
pub struct CachedOracle<O> {
    inner: O,
    cache: HashMap<(LayerId, LayoutDescriptor), Cycles>,
    calls: usize,
}

impl<O: CostOracle> CachedOracle<O> {
    pub fn new(inner: O) -> Self {
        CachedOracle {
            inner,
            cache: HashMap::new(),
            calls: 0,
        }
    }

    /// Submissions forwarded to the wrapped oracle.
    pub fn calls(&self) -> usize {
        self.calls
    }

    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    pub fn into_inner(self) -> O {
        self.inner
    }
}

impl<O: CostOracle> CostOracle for CachedOracle<O> {
    fn submit(&mut self, layer: LayerId, layout: &LayoutDescriptor) -> Result<Cycles, OracleError> {
        if let Some(&cycles) = self.cache.get(&(layer, layout.clone())) {
            return Ok(cycles);
        }
        self.calls += 1;
        let cycles = self.inner.submit(layer, layout)?;
        self.cache.insert((layer, layout.clone()), cycles);
        Ok(cycles)
    }
}

// StatsReport - Fields parsed from a mapper stats file

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatsReport {
    pub cycles: Cycles,
    pub energy: Option<f64>,
}

impl StatsReport {
    /// Read `Cycles:` and `Energy:` from the `Summary Stats` section, falling
    /// back to the first `Cycles:` line anywhere in the report.
    pub fn parse(text: &str) -> Result<StatsReport, OracleError> {
        let lines: Vec<&str> = text.lines().map(str::trim).collect();
        let summary = lines
            .iter()
            .position(|l| *l == "Summary Stats")
            .map(|i| &lines[i + 1..])
            .unwrap_or(&[]);

        let cycles = match field(summary, "Cycles:") {
            Some(v) => Some(v),
            None => field(&lines, "Cycles:"),
        };
        let cycles = cycles.ok_or(OracleError::MissingField("Cycles"))?;
        let cycles: Cycles = cycles.parse().map_err(|_| OracleError::InvalidField {
            field: "Cycles",
            value: cycles.to_string(),
        })?;

        let energy = match field(summary, "Energy:") {
            Some(v) => Some(v.parse::<f64>().map_err(|_| OracleError::InvalidField {
                field: "Energy",
                value: v.to_string(),
            })?),
            None => None,
        };
        Ok(StatsReport { cycles, energy })
    }

    pub fn load(path: &Path) -> Result<StatsReport, OracleError> {
        let text = std::fs::read_to_string(path).map_err(|source| OracleError::Artifact {
            path: path.to_path_buf(),
            source,
        })?;
        StatsReport::parse(&text)
    }
}

/// First whitespace token after `prefix` on the first line starting with it.
fn field<'a>(lines: &[&'a str], prefix: &str) -> Option<&'a str> {
    lines
        .iter()
        .find_map(|&l| l.strip_prefix(prefix))
        .and_then(|rest| rest.split_whitespace().next())
}

// CommandOracle - Runs the mapper out of process

/// Prices a layer by writing its layout into `work_dir/layer_<id>/layout.yaml`,
/// running `program` there and parsing the stats file it leaves behind.
///
/// In `args`, `{layer}` expands to the layer id and `{layout}` to the layout
/// file path. When no argument mentions `{layout}`, the path is appended.
#[derive(Debug, Clone)]
pub struct CommandOracle {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub work_dir: PathBuf,
    pub stats_file: String,
}

impl CommandOracle {
    pub fn new(program: impl Into<PathBuf>, work_dir: impl Into<PathBuf>) -> Self {
        CommandOracle {
            program: program.into(),
            args: Vec::new(),
            work_dir: work_dir.into(),
            stats_file: DEFAULT_STATS_FILE.to_string(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn stats_file(mut self, name: impl Into<String>) -> Self {
        self.stats_file = name.into();
        self
    }

    pub fn layer_dir(&self, layer: LayerId) -> PathBuf {
        self.work_dir.join(format!("layer_{}", layer))
    }

    fn expand_args(&self, layer: LayerId, layout: &Path) -> Vec<String> {
        let layout = layout.display().to_string();
        let mut args: Vec<String> = self
            .args
            .iter()
            .map(|a| a.replace("{layer}", &layer.to_string()).replace("{layout}", &layout))
            .collect();
        if !self.args.iter().any(|a| a.contains("{layout}")) {
            args.push(layout);
        }
        args
    }
}

impl CostOracle for CommandOracle {
    fn submit(&mut self, layer: LayerId, layout: &LayoutDescriptor) -> Result<Cycles, OracleError> {
        let dir = self.layer_dir(layer);
        std::fs::create_dir_all(&dir).map_err(|source| OracleError::Artifact {
            path: dir.clone(),
            source,
        })?;
        let layout_path = dir.join(LAYOUT_FILE);
        write_layout(&layout_path, layout)?;

        let program = self.program.display().to_string();
        let args = self.expand_args(layer, &layout_path);
        debug!(layer, %program, ?args, "running cost oracle");
        let output = Command::new(&self.program)
            .args(&args)
            .current_dir(&dir)
            .output()
            .map_err(|source| OracleError::Spawn {
                program: program.clone(),
                source,
            })?;
        if !output.status.success() {
            return Err(OracleError::Failed {
                program,
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let report = StatsReport::load(&dir.join(&self.stats_file))?;
        info!(layer, cycles = report.cycles, energy = ?report.energy, "cost oracle finished");
        Ok(report.cycles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = "\
Buffer and Arithmetic Levels
Cycles: 999

Summary Stats
-------------
GFLOPs (@1GHz): 12.5
Utilization: 0.50
Cycles: 3136
Energy: 1.83 uJ
";

    #[test]
    fn test_summary_section_wins() {
        let r = StatsReport::parse(REPORT).unwrap();
        assert_eq!(r.cycles, 3136);
        assert_eq!(r.energy, Some(1.83));
    }

    #[test]
    fn test_fallback_to_first_cycles_line() {
        let r = StatsReport::parse("Level 0\n  Cycles: 42\n").unwrap();
        assert_eq!(r.cycles, 42);
        assert_eq!(r.energy, None);
    }

    #[test]
    fn test_missing_cycles() {
        assert!(matches!(
            StatsReport::parse("Summary Stats\nEnergy: 1.0 uJ\n"),
            Err(OracleError::MissingField("Cycles"))
        ));
    }

    #[test]
    fn test_unparsable_cycles() {
        assert!(matches!(
            StatsReport::parse("Cycles: lots\n"),
            Err(OracleError::InvalidField { field: "Cycles", .. })
        ));
    }

    #[test]
    fn test_expand_args() {
        let oracle = CommandOracle::new("mapper", "/tmp/w").arg("prob/{layer}.yaml");
        let args = oracle.expand_args(7, Path::new("/tmp/w/layer_7/layout.yaml"));
        assert_eq!(args, vec!["prob/7.yaml", "/tmp/w/layer_7/layout.yaml"]);
    }
}
