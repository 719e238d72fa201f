//! Orchestration: packet source -> normalized events -> per-key windows ->
//! feature series -> datasets, over a single source or a directory tree.

use crate::config::{InputKind, PipelineConfig};
use crate::dataset::{Dataset, DatasetBuilder};
use crate::error::PipelineError;
use crate::features::{assemble, FeatureSeries, FlowGrouper, FlowKey};
use crate::packets::{read_packets, NormalizeStats, Normalizer, ParsedSource, SourceFormat};
use crate::report::{RunSummary, SourceReport};
use crate::storage;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Feature series of one source plus what was lost getting there.
#[derive(Debug)]
pub struct Aggregation {
    pub series: Vec<FeatureSeries>,
    pub normalize: NormalizeStats,
    pub out_of_order: u64,
}

pub struct Pipeline {
    config: PipelineConfig,
    builder: DatasetBuilder,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        let builder = DatasetBuilder::new(&config.sequence);
        Ok(Self { config, builder })
    }

    /// Normalize, group and aggregate one source's records in file order.
    pub fn aggregate(&self, source: ParsedSource) -> Result<Aggregation, PipelineError> {
        let mut normalizer = Normalizer::new();
        for _ in 0..source.unparseable {
            normalizer.record_unparseable();
        }
        let mut grouper = FlowGrouper::new(
            self.config.grouping.group_by.clone(),
            self.config.window.ordering,
            self.config.window.window_secs,
        );
        for record in &source.records {
            let Ok(event) = normalizer.normalize(record) else {
                continue;
            };
            if let Err(e) = grouper.route(event) {
                debug!(error = %e, "event dropped");
            }
        }
        let grouped = grouper.finish();
        Ok(Aggregation {
            series: assemble(grouped.groups)?,
            normalize: normalizer.into_stats(),
            out_of_order: grouped.out_of_order,
        })
    }

    /// Build the dataset of one series. A key that is too short or fails is
    /// recorded in `report` and yields `None`.
    fn build_one(&self, series: &FeatureSeries, report: &mut SourceReport) -> Option<Dataset> {
        let key = series.key().to_string();
        match self.builder.build(series) {
            Ok(outcome) => {
                for note in &outcome.notes {
                    debug!(key = %key, note = %note, "dataset note");
                    report.note(&key, note);
                }
                if outcome.dataset.is_some() {
                    report.datasets += 1;
                }
                outcome.dataset
            }
            Err(e) => {
                warn!(key = %key, error = %e, "dataset build failed");
                report.failed_keys.push(format!("{key}: {e}"));
                None
            }
        }
    }

    /// Process one source and write its artifacts under `output_dir` using
    /// `stem` as the file name prefix.
    pub fn process_source(&self, path: &Path, stem: &str) -> Result<SourceReport, PipelineError> {
        self.process_claiming(path, stem, &mut BTreeSet::new())
    }

    /// `claimed` holds the artifact names already written in this run; a
    /// name produced twice gets a numeric suffix instead of overwriting.
    fn process_claiming(
        &self,
        path: &Path,
        stem: &str,
        claimed: &mut BTreeSet<String>,
    ) -> Result<SourceReport, PipelineError> {
        let mut report = SourceReport::new(path);
        let series = match self.config.input_kind {
            InputKind::Packets => {
                let aggregation = self.aggregate(read_packets(path)?)?;
                report.normalize = aggregation.normalize;
                report.out_of_order = aggregation.out_of_order;
                report.check_malformed(self.config.window.max_malformed_ratio);
                aggregation.series
            }
            InputKind::Features => {
                let records = storage::read_features_file(path)?;
                vec![FeatureSeries::from_unsorted(FlowKey::unit(), records)?]
            }
        };
        report.keys = series.len();
        report.records = series.iter().map(FeatureSeries::len).sum();

        let with_key = series.len() > 1 || series.iter().any(|s| !s.key().is_unit());
        for s in &series {
            let name = claim_name(artifact_name(stem, s.key(), with_key), claimed, &mut report);
            if self.config.input_kind == InputKind::Packets {
                let out = self.config.output_dir.join(format!("{name}_features.csv"));
                storage::write_features_file(&out, s.records())?;
                report.outputs.push(out);
            }
            if let Some(dataset) = self.build_one(s, &mut report) {
                let out = self.config.output_dir.join(format!("{name}_dataset.json"));
                storage::write_json(&out, &dataset)?;
                report.outputs.push(out);
            }
        }

        info!(
            path = %path.display(),
            keys = report.keys,
            records = report.records,
            datasets = report.datasets,
            malformed = report.normalize.malformed_total(),
            "source processed"
        );
        Ok(report)
    }

    /// Walk `input_dir`, process every recognised source, and write
    /// `run_summary.json`. A failing source is reported and skipped; `stop`
    /// is checked between sources.
    pub fn run_dir(&self, stop: &AtomicBool) -> Result<RunSummary, PipelineError> {
        let input = &self.config.input_dir;
        let output = &self.config.output_dir;
        if !input.is_dir() {
            return Err(PipelineError::io(
                input,
                std::io::Error::new(std::io::ErrorKind::NotFound, "input directory not found"),
            ));
        }
        std::fs::create_dir_all(output).map_err(|e| PipelineError::io(output, e))?;

        let mut summary = RunSummary::new();
        let mut claimed = BTreeSet::new();
        let mut cancelled = false;
        for path in self.sources()? {
            if stop.load(Ordering::Relaxed) {
                cancelled = true;
                break;
            }
            let stem = output_stem(input, &path);
            match self.process_claiming(&path, &stem, &mut claimed) {
                Ok(report) => summary.push(report),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "source failed");
                    summary.push(SourceReport::failed(&path, e));
                }
            }
        }
        summary.finish(cancelled);
        storage::write_json(&output.join("run_summary.json"), &summary)?;
        Ok(summary)
    }

    /// Recognised sources under `input_dir`, sorted, excluding `output_dir`.
    pub fn sources(&self) -> Result<Vec<PathBuf>, PipelineError> {
        let output = self.config.output_dir.as_path();
        let mut out = Vec::new();
        let walker = WalkDir::new(&self.config.input_dir)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.path() != output);
        for entry in walker {
            let entry = entry.map_err(|e| {
                let path = e.path().map(Path::to_path_buf).unwrap_or_default();
                let io = e
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::new(std::io::ErrorKind::Other, "walk error"));
                PipelineError::io(path, io)
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let accepted = match (self.config.input_kind, SourceFormat::from_path(entry.path())) {
                (InputKind::Packets, Some(_)) => true,
                (InputKind::Features, Some(SourceFormat::Csv)) => true,
                _ => false,
            };
            if accepted {
                out.push(entry.into_path());
            }
        }
        Ok(out)
    }
}

/// `{folder_id}_{stem}`: sub-directories relative to `root` joined by `-`,
/// or `root` for files directly inside it.
pub fn output_stem(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    let folder_id = rel
        .parent()
        .map(|p| {
            p.components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("-")
        })
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "root".to_string());
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("{folder_id}_{stem}")
}

fn claim_name(name: String, claimed: &mut BTreeSet<String>, report: &mut SourceReport) -> String {
    if claimed.insert(name.clone()) {
        return name;
    }
    let unique = (2u32..)
        .map(|i| format!("{name}_{i}"))
        .find(|candidate| !claimed.contains(candidate))
        .unwrap_or_else(|| name.clone());
    claimed.insert(unique.clone());
    warn!(name = %name, renamed = %unique, "artifact name already used in this run");
    report.renamed_outputs.push(format!("{name} -> {unique}"));
    unique
}

fn artifact_name(stem: &str, key: &FlowKey, with_key: bool) -> String {
    if with_key {
        format!("{stem}_{}", key.slug())
    } else {
        stem.to_string()
    }
}
