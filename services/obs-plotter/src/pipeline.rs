//! Per-date coordination of resume, fetch, binning and rendering.
//!
//! Dates are processed one at a time. Within a date, the enabled variables
//! are grouped by observation source so a single fetch serves all of them,
//! starting from the earliest hour any of them still needs.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use metrics::counter;
use observations::{
    bin_variable, decode_rows, retained_count, ObservationSourceKind, PlotConfig, ProcessingDate, ResumeTracker,
    StartBoundary, TimeOfDay, Variable,
};
use tracing::{debug, info, instrument, warn};

use crate::output::{list_existing, MapRenderer};
use crate::source::{FetchRequest, ObservationSource};

/// A variable to plot and where its maps go.
#[derive(Debug, Clone)]
pub struct VariablePlot {
    pub config: PlotConfig,
    pub output_dir: PathBuf,
}

impl VariablePlot {
    pub fn variable(&self) -> Variable {
        self.config.variable()
    }
}

/// Processing phase of one source within one date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    ComputingStart,
    Fetching,
    Binning,
    Rendering,
    Done,
    SkippedComplete,
    FetchFailed,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Done | Phase::SkippedComplete | Phase::FetchFailed)
    }
}

struct PhaseTracker {
    date: ProcessingDate,
    subtype: &'static str,
    phase: Phase,
}

impl PhaseTracker {
    fn new(date: ProcessingDate, kind: ObservationSourceKind) -> Self {
        Self {
            date,
            subtype: kind.subtype(),
            phase: Phase::Idle,
        }
    }

    fn enter(&mut self, next: Phase) {
        debug_assert!(!self.phase.is_terminal(), "no transition out of {:?}", self.phase);
        debug!(
            date = %self.date,
            subtype = self.subtype,
            from = ?self.phase,
            to = ?next,
            "Phase transition"
        );
        self.phase = next;
    }
}

/// How one source fared for one date.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceOutcome {
    Done {
        start: TimeOfDay,
        rendered: usize,
        failed: usize,
        undecodable: usize,
    },
    SkippedComplete,
    FetchFailed { error: String },
}

impl SourceOutcome {
    pub fn phase(&self) -> Phase {
        match self {
            SourceOutcome::Done { .. } => Phase::Done,
            SourceOutcome::SkippedComplete => Phase::SkippedComplete,
            SourceOutcome::FetchFailed { .. } => Phase::FetchFailed,
        }
    }
}

/// Result of processing one requested date.
#[derive(Debug, Clone, PartialEq)]
pub enum DateReport {
    /// Not a `YYYYMMDD` calendar date; nothing was done.
    Invalid { input: String, reason: String },
    Processed {
        date: ProcessingDate,
        sources: BTreeMap<ObservationSourceKind, SourceOutcome>,
    },
}

impl DateReport {
    /// Maps written for this date.
    pub fn rendered(&self) -> usize {
        match self {
            DateReport::Invalid { .. } => 0,
            DateReport::Processed { sources, .. } => sources
                .values()
                .map(|outcome| match outcome {
                    SourceOutcome::Done { rendered, .. } => *rendered,
                    _ => 0,
                })
                .sum(),
        }
    }
}

impl fmt::Display for DateReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateReport::Invalid { input, reason } => write!(f, "{}: skipped ({})", input, reason),
            DateReport::Processed { date, sources } => {
                write!(f, "{}:", date)?;
                for (kind, outcome) in sources {
                    match outcome {
                        SourceOutcome::Done { start, rendered, failed, .. } => write!(
                            f,
                            " {} from {}Z rendered {} failed {};",
                            kind.subtype(),
                            start,
                            rendered,
                            failed
                        )?,
                        SourceOutcome::SkippedComplete => {
                            write!(f, " {} already complete;", kind.subtype())?
                        }
                        SourceOutcome::FetchFailed { error } => {
                            write!(f, " {} fetch failed ({});", kind.subtype(), error)?
                        }
                    }
                }
                Ok(())
            }
        }
    }
}

/// Totals over the reports of one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSummary {
    /// Inputs that were not calendar dates.
    pub invalid: usize,
    /// Sources skipped because their maps were complete.
    pub complete: usize,
    pub fetch_failed: usize,
    pub rendered: usize,
}

impl SessionSummary {
    pub fn from_reports(reports: &[DateReport]) -> Self {
        let mut summary = Self::default();
        for report in reports {
            summary.rendered += report.rendered();
            match report {
                DateReport::Invalid { .. } => summary.invalid += 1,
                DateReport::Processed { sources, .. } => {
                    for outcome in sources.values() {
                        match outcome {
                            SourceOutcome::SkippedComplete => summary.complete += 1,
                            SourceOutcome::FetchFailed { .. } => summary.fetch_failed += 1,
                            SourceOutcome::Done { .. } => {}
                        }
                    }
                }
            }
        }
        summary
    }
}

/// Drives the processing of requested dates.
pub struct Pipeline {
    source: Box<dyn ObservationSource>,
    renderer: Box<dyn MapRenderer>,
    plots: Vec<VariablePlot>,
    tracker: ResumeTracker,
    contact: String,
    platform: String,
}

impl Pipeline {
    pub fn new(
        source: Box<dyn ObservationSource>,
        renderer: Box<dyn MapRenderer>,
        plots: Vec<VariablePlot>,
        tracker: ResumeTracker,
        contact: impl Into<String>,
        platform: impl Into<String>,
    ) -> Self {
        Self {
            source,
            renderer,
            plots,
            tracker,
            contact: contact.into(),
            platform: platform.into(),
        }
    }

    /// Process every date in order. Failures stay within their date.
    pub async fn run(&self, dates: &[String], now: DateTime<Utc>) -> Vec<DateReport> {
        let mut reports = Vec::with_capacity(dates.len());
        for input in dates {
            let report = match ProcessingDate::parse(input) {
                Ok(date) => self.process_date(date, now).await,
                Err(e) => {
                    warn!(date = %input, error = %e, "Skipping invalid date");
                    DateReport::Invalid {
                        input: input.clone(),
                        reason: e.to_string(),
                    }
                }
            };
            info!(report = %report, "Date finished");
            reports.push(report);
        }
        reports
    }

    /// Process one date for every source with an enabled variable.
    #[instrument(skip_all, fields(date = %date))]
    pub async fn process_date(&self, date: ProcessingDate, now: DateTime<Utc>) -> DateReport {
        let mut sources = BTreeMap::new();
        for kind in ObservationSourceKind::ALL {
            let plots: Vec<&VariablePlot> = self
                .plots
                .iter()
                .filter(|plot| plot.variable().source() == kind)
                .collect();
            if plots.is_empty() {
                continue;
            }
            let outcome = self.process_source(date, kind, &plots, now).await;
            debug!(subtype = kind.subtype(), phase = ?outcome.phase(), "Source finished");
            sources.insert(kind, outcome);
        }
        DateReport::Processed { date, sources }
    }

    async fn process_source(
        &self,
        date: ProcessingDate,
        kind: ObservationSourceKind,
        plots: &[&VariablePlot],
        now: DateTime<Utc>,
    ) -> SourceOutcome {
        let mut phase = PhaseTracker::new(date, kind);

        phase.enter(Phase::ComputingStart);
        let starts = self.variable_starts(date, plots, now);
        let start = match ResumeTracker::earliest_across_variables(&starts) {
            StartBoundary::From(start) => start,
            StartBoundary::AlreadyComplete => {
                phase.enter(Phase::SkippedComplete);
                info!(subtype = kind.subtype(), "Maps already complete for date");
                return SourceOutcome::SkippedComplete;
            }
        };

        phase.enter(Phase::Fetching);
        let request = FetchRequest::new(kind, date, start, &self.contact, &self.platform);
        let rows = match self.source.fetch(&request).await {
            Ok(rows) => rows,
            Err(e) => {
                phase.enter(Phase::FetchFailed);
                counter!("obs_fetch_failures_total", "subtype" => kind.subtype()).increment(1);
                warn!(subtype = kind.subtype(), error = %e, "Fetch failed, skipping date");
                return SourceOutcome::FetchFailed {
                    error: e.to_string(),
                };
            }
        };

        phase.enter(Phase::Binning);
        let (records, undecodable) = decode_rows(kind, &rows);
        if undecodable > 0 {
            counter!("obs_records_dropped_total", "reason" => "undecodable")
                .increment(undecodable as u64);
        }

        phase.enter(Phase::Rendering);
        let mut rendered = 0;
        let mut failed = 0;
        for plot in plots {
            let variable = plot.variable();
            let Some(variable_start) = starts.get(&variable).and_then(StartBoundary::start) else {
                debug!(variable = %variable, "Variable already complete");
                continue;
            };

            let buckets = bin_variable(&records, variable);
            let dropped = records.len().saturating_sub(retained_count(&buckets));
            if dropped > 0 {
                counter!("obs_records_dropped_total", "reason" => "masked")
                    .increment(dropped as u64);
            }

            for (key, points) in buckets
                .iter()
                .filter(|(key, _)| key.is_on(&date) && key.time_of_day() >= variable_start)
            {
                match self.renderer.render(key, points, &plot.config, &plot.output_dir) {
                    Ok(_) => {
                        rendered += 1;
                        counter!("obs_maps_rendered_total", "variable" => variable.name())
                            .increment(1);
                    }
                    Err(e) => {
                        failed += 1;
                        warn!(variable = %variable, key = %key, error = %e, "Render failed");
                    }
                }
            }
        }

        phase.enter(Phase::Done);
        info!(
            subtype = kind.subtype(),
            start = %start,
            records = records.len(),
            undecodable,
            rendered,
            failed,
            "Source processed"
        );
        SourceOutcome::Done {
            start,
            rendered,
            failed,
            undecodable,
        }
    }

    fn variable_starts(
        &self,
        date: ProcessingDate,
        plots: &[&VariablePlot],
        now: DateTime<Utc>,
    ) -> BTreeMap<Variable, StartBoundary> {
        plots
            .iter()
            .map(|plot| {
                let existing = list_existing(&plot.output_dir, &date.prefix()).unwrap_or_else(|e| {
                    warn!(
                        dir = %plot.output_dir.display(),
                        error = %e,
                        "Could not scan output directory, treating as empty"
                    );
                    Default::default()
                });
                let boundary = self.tracker.compute_start_for_date(&existing, &date, now);
                debug!(variable = %plot.variable(), start = ?boundary, "Computed start");
                (plot.variable(), boundary)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::TimeZone;
    use observations::{RawRecord, StationValue, TimestampKey};
    use test_utils::{dates, hourly_landsyn_rows, hourly_srew_rows, landsyn_row, srew_row, stations};

    use crate::output::RenderError;
    use crate::source::FetchError;

    #[derive(Default)]
    struct MockSource {
        rows: HashMap<&'static str, Vec<RawRecord>>,
        failing: Vec<&'static str>,
        requests: Mutex<Vec<FetchRequest>>,
    }

    #[async_trait]
    impl ObservationSource for MockSource {
        async fn fetch(&self, request: &FetchRequest) -> Result<Vec<RawRecord>, FetchError> {
            self.requests.lock().unwrap().push(request.clone());
            if self.failing.contains(&request.subtype.as_str()) {
                return Err(FetchError::Status(503));
            }
            Ok(self
                .rows
                .get(request.subtype.as_str())
                .cloned()
                .unwrap_or_default())
        }
    }

    /// Records renders and touches the artifact so resume scans see it.
    #[derive(Default)]
    struct MockRenderer {
        rendered: Mutex<Vec<(Variable, String, Vec<StationValue>)>>,
    }

    impl MapRenderer for MockRenderer {
        fn render(
            &self,
            key: &TimestampKey,
            points: &[StationValue],
            plot: &PlotConfig,
            output_dir: &Path,
        ) -> Result<PathBuf, RenderError> {
            let path = crate::output::artifact_path(output_dir, key);
            std::fs::create_dir_all(output_dir).map_err(|source| RenderError::Io {
                path: output_dir.to_path_buf(),
                source,
            })?;
            std::fs::write(&path, b"").map_err(|source| RenderError::Io {
                path: path.clone(),
                source,
            })?;
            self.rendered.lock().unwrap().push((
                plot.variable(),
                key.to_string(),
                points.to_vec(),
            ));
            Ok(path)
        }
    }

    struct Harness {
        dir: tempfile::TempDir,
        source: std::sync::Arc<MockSource>,
        renderer: std::sync::Arc<MockRenderer>,
    }

    #[async_trait]
    impl ObservationSource for std::sync::Arc<MockSource> {
        async fn fetch(&self, request: &FetchRequest) -> Result<Vec<RawRecord>, FetchError> {
            (**self).fetch(request).await
        }
    }

    impl MapRenderer for std::sync::Arc<MockRenderer> {
        fn render(
            &self,
            key: &TimestampKey,
            points: &[StationValue],
            plot: &PlotConfig,
            output_dir: &Path,
        ) -> Result<PathBuf, RenderError> {
            (**self).render(key, points, plot, output_dir)
        }
    }

    impl Harness {
        fn new(source: MockSource) -> Self {
            Self {
                dir: tempfile::tempdir().unwrap(),
                source: std::sync::Arc::new(source),
                renderer: Default::default(),
            }
        }

        fn output_dir(&self, variable: Variable) -> PathBuf {
            self.dir.path().join(variable.name())
        }

        fn pipeline(&self, variables: &[Variable]) -> Pipeline {
            let plots = variables
                .iter()
                .map(|&variable| VariablePlot {
                    config: PlotConfig::new(variable).unwrap(),
                    output_dir: self.output_dir(variable),
                })
                .collect();
            Pipeline::new(
                Box::new(self.source.clone()),
                Box::new(self.renderer.clone()),
                plots,
                ResumeTracker::default(),
                "tester",
                "03",
            )
        }

        fn touch(&self, variable: Variable, key: &str) {
            let dir = self.output_dir(variable);
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join(format!("{}.png", key)), b"").unwrap();
        }

        fn rendered_keys(&self, variable: Variable) -> Vec<String> {
            self.renderer
                .rendered
                .lock()
                .unwrap()
                .iter()
                .filter(|(v, _, _)| *v == variable)
                .map(|(_, key, _)| key.clone())
                .collect()
        }

        fn requests(&self) -> Vec<FetchRequest> {
            self.source.requests.lock().unwrap().clone()
        }
    }

    fn later_day() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, 8, 0, 0).unwrap()
    }

    fn summer_day() -> Vec<String> {
        vec!["20240601".to_string()]
    }

    // ========================================================================
    // Resume and fetch grouping
    // ========================================================================

    #[tokio::test]
    async fn test_one_fetch_serves_all_landsyn_variables() {
        let mut source = MockSource::default();
        source.rows.insert(
            "LNDSYN",
            hourly_landsyn_rows(stations::HEATHROW, (2024, 6, 1), 0..3, 280.0),
        );
        let harness = Harness::new(source);
        let pipeline = harness.pipeline(&[Variable::Temperature, Variable::WindSpeed]);

        let reports = pipeline.run(&summer_day(), later_day()).await;

        assert_eq!(harness.requests().len(), 1);
        assert_eq!(reports[0].rendered(), 6);
        assert_eq!(
            harness.rendered_keys(Variable::Temperature),
            vec!["202406010000", "202406010100", "202406010200"]
        );
    }

    #[tokio::test]
    async fn test_fetch_starts_at_earliest_variable() {
        let mut source = MockSource::default();
        source.rows.insert(
            "LNDSYN",
            hourly_landsyn_rows(stations::HEATHROW, (2024, 6, 1), 0..6, 280.0),
        );
        let harness = Harness::new(source);
        harness.touch(Variable::Temperature, "202406010400");
        harness.touch(Variable::Visibility, "202406010100");
        let pipeline = harness.pipeline(&[Variable::Temperature, Variable::Visibility]);

        pipeline.run(&summer_day(), later_day()).await;

        let requests = harness.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].keywords[0], "START TIME 20240601/0200Z");

        // Each variable renders only what it is missing.
        assert_eq!(harness.rendered_keys(Variable::Temperature), vec!["202406010500"]);
        assert_eq!(
            harness.rendered_keys(Variable::Visibility),
            vec!["202406010200", "202406010300", "202406010400", "202406010500"]
        );
    }

    #[tokio::test]
    async fn test_complete_date_not_fetched() {
        let harness = Harness::new(MockSource::default());
        harness.touch(Variable::Precipitation, "202406012300");
        let pipeline = harness.pipeline(&[Variable::Precipitation]);

        let reports = pipeline.run(&summer_day(), later_day()).await;

        assert!(harness.requests().is_empty());
        match &reports[0] {
            DateReport::Processed { sources, .. } => {
                assert_eq!(
                    sources.get(&ObservationSourceKind::RainGauge),
                    Some(&SourceOutcome::SkippedComplete)
                );
            }
            other => panic!("unexpected report {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_current_date_up_to_date() {
        let harness = Harness::new(MockSource::default());
        harness.touch(Variable::Precipitation, "202406010900");
        let pipeline = harness.pipeline(&[Variable::Precipitation]);
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 10, 30, 0).unwrap();

        pipeline.run(&summer_day(), now).await;
        assert!(harness.requests().is_empty());
    }

    #[tokio::test]
    async fn test_second_run_resumes() {
        let mut source = MockSource::default();
        source.rows.insert(
            "SREW",
            hourly_srew_rows(stations::LERWICK, (2024, 6, 1), 0..4, 0.2),
        );
        let harness = Harness::new(source);
        let pipeline = harness.pipeline(&[Variable::Precipitation]);

        pipeline.run(&summer_day(), later_day()).await;
        pipeline.run(&summer_day(), later_day()).await;

        let requests = harness.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].keywords[0], "START TIME 20240601/0400Z");
        // The mock ignores the start, so the second run must filter itself.
        assert_eq!(harness.rendered_keys(Variable::Precipitation).len(), 4);
    }

    #[tokio::test]
    async fn test_late_minute_report_settles_date() {
        let mut source = MockSource::default();
        source.rows.insert(
            "LNDSYN",
            vec![
                landsyn_row(stations::HEATHROW, (2024, 6, 1, 22, 50), Some(285.0), None, None),
                landsyn_row(stations::HEATHROW, (2024, 6, 1, 23, 0), Some(284.0), None, None),
            ],
        );
        let harness = Harness::new(source);
        harness.touch(Variable::Temperature, "202406012250");
        let pipeline = harness.pipeline(&[Variable::Temperature]);

        pipeline.run(&summer_day(), later_day()).await;
        let reports = pipeline.run(&summer_day(), later_day()).await;

        let requests = harness.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].keywords[0], "START TIME 20240601/2300Z");
        assert_eq!(requests[0].keywords[1], "END TIME 20240601/2300Z");
        assert_eq!(harness.rendered_keys(Variable::Temperature), vec!["202406012300"]);
        match &reports[0] {
            DateReport::Processed { sources, .. } => assert_eq!(
                sources[&ObservationSourceKind::LandSynoptic],
                SourceOutcome::SkippedComplete
            ),
            other => panic!("unexpected report {:?}", other),
        }
    }

    // ========================================================================
    // Failure isolation
    // ========================================================================

    #[tokio::test]
    async fn test_fetch_failure_skips_only_that_source() {
        let mut source = MockSource {
            failing: vec!["LNDSYN"],
            ..Default::default()
        };
        source.rows.insert(
            "SREW",
            vec![srew_row(stations::CAMBORNE, (2024, 6, 1, 5), Some(1.5))],
        );
        let harness = Harness::new(source);
        let pipeline = harness.pipeline(&[Variable::Temperature, Variable::Precipitation]);

        let reports = pipeline.run(&summer_day(), later_day()).await;

        match &reports[0] {
            DateReport::Processed { sources, .. } => {
                assert_eq!(
                    sources[&ObservationSourceKind::LandSynoptic].phase(),
                    Phase::FetchFailed
                );
                assert_eq!(sources[&ObservationSourceKind::RainGauge].phase(), Phase::Done);
            }
            other => panic!("unexpected report {:?}", other),
        }
        assert_eq!(harness.rendered_keys(Variable::Precipitation), vec!["202406010500"]);
    }

    #[tokio::test]
    async fn test_invalid_date_reported_and_skipped() {
        let mut source = MockSource::default();
        source.rows.insert(
            "SREW",
            vec![srew_row(stations::CAMBORNE, (2024, 6, 1, 5), Some(1.5))],
        );
        let harness = Harness::new(source);
        let pipeline = harness.pipeline(&[Variable::Precipitation]);

        let inputs = vec![dates::INVALID.to_string(), dates::SUMMER_DAY.to_string()];
        let reports = pipeline.run(&inputs, later_day()).await;

        assert_eq!(reports.len(), 2);
        assert!(matches!(reports[0], DateReport::Invalid { .. }));
        assert_eq!(reports[1].rendered(), 1);
        assert_eq!(harness.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_session_summary_counts_every_skip() {
        let mut source = MockSource {
            failing: vec!["LNDSYN"],
            ..Default::default()
        };
        source.rows.insert(
            "SREW",
            vec![srew_row(stations::CAMBORNE, (2024, 6, 2, 5), Some(1.5))],
        );
        let harness = Harness::new(source);
        harness.touch(Variable::Precipitation, "202406012300");
        let pipeline = harness.pipeline(&[Variable::Temperature, Variable::Precipitation]);

        let inputs = vec![
            dates::INVALID.to_string(),
            dates::SUMMER_DAY.to_string(),
            "20240602".to_string(),
        ];
        let reports = pipeline.run(&inputs, later_day()).await;

        assert_eq!(
            SessionSummary::from_reports(&reports),
            SessionSummary {
                invalid: 1,
                complete: 1,
                fetch_failed: 2,
                rendered: 1,
            }
        );
    }

    // ========================================================================
    // Binning into renders
    // ========================================================================

    #[tokio::test]
    async fn test_dropped_records_and_other_dates() {
        let mut source = MockSource::default();
        source.rows.insert(
            "SREW",
            vec![
                srew_row(stations::CAMBORNE, (2024, 6, 1, 5), Some(-1.0)),
                srew_row(stations::LERWICK, (2024, 6, 1, 5), Some(0.0)),
                srew_row(stations::LERWICK, (2024, 6, 2, 0), Some(0.4)),
                vec![None; 8],
            ],
        );
        let harness = Harness::new(source);
        let pipeline = harness.pipeline(&[Variable::Precipitation]);

        let reports = pipeline.run(&summer_day(), later_day()).await;

        let rendered = harness.renderer.rendered.lock().unwrap().clone();
        assert_eq!(rendered.len(), 1);
        assert_eq!(rendered[0].1, "202406010500");
        assert_eq!(rendered[0].2.len(), 1);
        assert_eq!(rendered[0].2[0].station_id, stations::LERWICK.0);

        match &reports[0] {
            DateReport::Processed { sources, .. } => match &sources[&ObservationSourceKind::RainGauge] {
                SourceOutcome::Done { undecodable, .. } => assert_eq!(*undecodable, 1),
                other => panic!("unexpected outcome {:?}", other),
            },
            other => panic!("unexpected report {:?}", other),
        }
    }
}
