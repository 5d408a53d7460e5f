use chrono::Duration;

/// Tunables of a planning run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannerSettings {
    /// Smallest scheduling step: orders land one unit before the need they serve.
    pub time_unit: Duration,
    /// Lookahead after an order's date at which overstock is measured.
    pub horizon: Duration,
    /// Margin added after the last scheduled event to close the tail window.
    pub tail_margin: Duration,
    /// Hard cap on need resolutions per policy.
    pub max_iterations: usize,
}

impl PlannerSettings {
    /// Settings with a coarser (or finer) time unit; the tail margin follows it.
    pub fn with_time_unit(time_unit: Duration) -> Self {
        Self {
            time_unit,
            tail_margin: time_unit,
            ..Self::default()
        }
    }
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            time_unit: Duration::seconds(1),
            horizon: Duration::days(1),
            tail_margin: Duration::seconds(1),
            max_iterations: 500,
        }
    }
}
