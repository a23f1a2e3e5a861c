use perf_lab_abstract::SweepPoint;
use serde::Serialize;
use tracing::debug;

/// Progress of the sweep currently in flight.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SweepState {
    pub ordinal: usize,
    pub total: usize,
    pub current_size: u32,
    pub results: Vec<SweepPoint>,
}

impl SweepState {
    /// `round(ordinal / total * 100)`, or 0 while the total is unknown.
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        let pct = (self.ordinal as f64 / self.total as f64 * 100.0).round();
        pct.clamp(0.0, 100.0) as u8
    }

    /// Keep `ordinal <= total` and `results.len() <= total`.
    fn widen_total(&mut self) {
        self.total = self.total.max(self.ordinal).max(self.results.len());
    }
}

/// Collects the per-size results of a latency sweep.
///
/// Points are kept in arrival order and never deduplicated: a size reported
/// twice shows up twice.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SweepAggregator {
    active: Option<SweepState>,
    frozen: Option<Vec<SweepPoint>>,
}

impl SweepAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a new sweep of `total` sizes, discarding any previous one.
    pub fn start(&mut self, total: usize) {
        debug!("sweep: start, {total} sizes");
        self.frozen = None;
        self.active = Some(SweepState {
            total,
            ..Default::default()
        });
    }

    /// The backend told us how many sizes it is going to run.
    pub fn announce_total(&mut self, total: usize) {
        let state = self.active_mut();
        if total > 0 {
            state.total = total;
        }
        state.widen_total();
    }

    pub fn progress(&mut self, current_size: u32, ordinal: usize) {
        let state = self.active_mut();
        state.current_size = current_size;
        state.ordinal = ordinal.max(state.results.len());
        state.widen_total();
    }

    pub fn record_point(&mut self, point: SweepPoint) {
        let state = self.active_mut();
        debug!(
            "sweep: point {} bytes ({} so far)",
            point.payload_size,
            state.results.len() + 1
        );
        state.results.push(point);
        // Completed points count as progress.
        state.ordinal = state.ordinal.max(state.results.len());
        state.widen_total();
    }

    /// Freeze the collected points as the final result set.
    ///
    /// `reported` is the result list carried by the completion message; it is
    /// used only when nothing was recorded locally.
    pub fn finalize(&mut self, reported: Vec<SweepPoint>) -> &[SweepPoint] {
        let recorded = self.active.take().map(|s| s.results).unwrap_or_default();
        let results = if recorded.is_empty() { reported } else { recorded };
        self.frozen.insert(results)
    }

    pub fn state(&self) -> Option<&SweepState> {
        self.active.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Final results of the last completed sweep.
    pub fn final_results(&self) -> Option<&[SweepPoint]> {
        self.frozen.as_deref()
    }

    /// Whatever is most relevant to show: the running sweep's points, else the last final set.
    pub fn results(&self) -> &[SweepPoint] {
        match (&self.active, &self.frozen) {
            (Some(state), _) => &state.results,
            (None, Some(frozen)) => frozen,
            (None, None) => &[],
        }
    }

    pub fn percent(&self) -> u8 {
        match (&self.active, &self.frozen) {
            (Some(state), _) => state.percent(),
            (None, Some(_)) => 100,
            (None, None) => 0,
        }
    }

    pub fn reset(&mut self) {
        self.active = None;
        self.frozen = None;
    }

    fn active_mut(&mut self) -> &mut SweepState {
        // Results for a sweep we never saw start (e.g. connected mid-run).
        self.active.get_or_insert_with(SweepState::default)
    }
}
