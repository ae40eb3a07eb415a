use std::time::Instant;

/// Structured telemetry for the agent. Counters survive restarts through the
/// state store; timings are per-process.
pub struct AgentMetrics {
    pub cycles_run: u64,
    pub symbols_evaluated: u64,
    pub decisions_emitted: u64,
    pub emissions_throttled: u64,
    pub alerts_sent: u64,
    pub alerts_blocked: u64,
    pub orders_submitted: u64,
    pub orders_skipped: u64,
    pub orders_failed: u64,

    // Per-cycle timing (last cycle)
    pub last_eval_duration_ms: u64,
    pub last_total_duration_ms: u64,

    log_interval_cycles: u64,
}

impl AgentMetrics {
    pub fn new(log_interval_cycles: u64) -> Self {
        Self {
            cycles_run: 0,
            symbols_evaluated: 0,
            decisions_emitted: 0,
            emissions_throttled: 0,
            alerts_sent: 0,
            alerts_blocked: 0,
            orders_submitted: 0,
            orders_skipped: 0,
            orders_failed: 0,
            last_eval_duration_ms: 0,
            last_total_duration_ms: 0,
            log_interval_cycles,
        }
    }

    pub fn start_timer() -> Instant {
        Instant::now()
    }

    pub fn record_eval_duration(&mut self, start: Instant) {
        self.last_eval_duration_ms = start.elapsed().as_millis() as u64;
    }

    pub fn finish_cycle(&mut self, cycle_start: Instant) {
        self.last_total_duration_ms = cycle_start.elapsed().as_millis() as u64;
        self.cycles_run += 1;

        if self.log_interval_cycles > 0 && self.cycles_run % self.log_interval_cycles == 0 {
            self.log_metrics();
        }
    }

    /// Emit structured telemetry via tracing.
    pub fn log_metrics(&self) {
        tracing::info!(
            cycles = self.cycles_run,
            symbols_evaluated = self.symbols_evaluated,
            decisions_emitted = self.decisions_emitted,
            emissions_throttled = self.emissions_throttled,
            alerts_sent = self.alerts_sent,
            alerts_blocked = self.alerts_blocked,
            orders_submitted = self.orders_submitted,
            orders_skipped = self.orders_skipped,
            orders_failed = self.orders_failed,
            last_cycle_ms = self.last_total_duration_ms,
            last_eval_ms = self.last_eval_duration_ms,
            "Agent metrics summary"
        );
    }

    /// Serialize counters to JSON for state persistence.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "cycles_run": self.cycles_run,
            "symbols_evaluated": self.symbols_evaluated,
            "decisions_emitted": self.decisions_emitted,
            "emissions_throttled": self.emissions_throttled,
            "alerts_sent": self.alerts_sent,
            "alerts_blocked": self.alerts_blocked,
            "orders_submitted": self.orders_submitted,
            "orders_skipped": self.orders_skipped,
            "orders_failed": self.orders_failed,
        })
    }

    /// Restore counters from persisted JSON.
    pub fn restore_from_json(&mut self, json: &serde_json::Value) {
        let read = |key: &str| json.get(key).and_then(|v| v.as_u64());
        if let Some(v) = read("cycles_run") {
            self.cycles_run = v;
        }
        if let Some(v) = read("symbols_evaluated") {
            self.symbols_evaluated = v;
        }
        if let Some(v) = read("decisions_emitted") {
            self.decisions_emitted = v;
        }
        if let Some(v) = read("emissions_throttled") {
            self.emissions_throttled = v;
        }
        if let Some(v) = read("alerts_sent") {
            self.alerts_sent = v;
        }
        if let Some(v) = read("alerts_blocked") {
            self.alerts_blocked = v;
        }
        if let Some(v) = read("orders_submitted") {
            self.orders_submitted = v;
        }
        if let Some(v) = read("orders_skipped") {
            self.orders_skipped = v;
        }
        if let Some(v) = read("orders_failed") {
            self.orders_failed = v;
        }
        tracing::info!(
            "Restored metrics from persisted state (cycles={})",
            self.cycles_run
        );
    }
}
