//! Progress reporting for a batch run.
//!
//! The dispatcher calls [`Progress::update`] once per accounted task (success or failure)
//! and [`Progress::close`] once after the last one. What a reporter does with that is its
//! own business: nothing, print a line, or emit a `tracing` event.

use std::{
    str::FromStr,
    time::{Duration, Instant},
};

use fanout_model::ConfigError;
use tracing::info;

/// Sink for per-task completion updates.
pub trait Progress: Send {
    /// Called once per accounted task with the time the task took.
    fn update(&mut self, elapsed: Duration);

    /// Called once after every task is accounted for.
    fn close(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReporterKind {
    #[default]
    Silent,
    Print,
    Log,
}

impl FromStr for ReporterKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm = s.trim().to_ascii_lowercase();
        match norm.as_str() {
            "" | "none" | "silent" => Ok(ReporterKind::Silent),
            "print" => Ok(ReporterKind::Print),
            "log" => Ok(ReporterKind::Log),
            _ => Err(ConfigError::InvalidReporter(s.to_string())),
        }
    }
}

/// Reporter selection and cadence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReporterConfig {
    pub kind: ReporterKind,
    /// Report every `show_interval` completions.
    ///
    /// Values below `1.0` are a fraction of the total; the effective interval is at least 1.
    pub show_interval: f64,
}

impl ReporterConfig {
    pub fn silent() -> Self {
        Self {
            kind: ReporterKind::Silent,
            ..Self::default()
        }
    }

    pub fn print() -> Self {
        Self {
            kind: ReporterKind::Print,
            ..Self::default()
        }
    }

    pub fn log() -> Self {
        Self {
            kind: ReporterKind::Log,
            ..Self::default()
        }
    }

    pub fn with_interval(mut self, show_interval: f64) -> Self {
        self.show_interval = show_interval;
        self
    }

    /// Resolves the configured interval against a run of `total` tasks.
    pub fn interval_for(&self, total: usize) -> usize {
        let raw = if self.show_interval < 1.0 {
            (total as f64 * self.show_interval) as usize
        } else {
            self.show_interval as usize
        };
        raw.max(1)
    }
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            kind: ReporterKind::Silent,
            show_interval: 0.01,
        }
    }
}

/// Builds the reporter for one run.
pub fn make_reporter(
    cfg: &ReporterConfig,
    total: usize,
    func_name: &str,
    label: &str,
) -> Box<dyn Progress> {
    match cfg.kind {
        ReporterKind::Silent => Box::new(Silent),
        ReporterKind::Print => Box::new(Milestones::new(cfg, total, func_name, label, Sink::Stdout)),
        ReporterKind::Log => Box::new(Milestones::new(cfg, total, func_name, label, Sink::Tracing)),
    }
}

/// Reporter that discards every update.
#[derive(Debug, Default)]
pub struct Silent;

impl Progress for Silent {
    fn update(&mut self, _elapsed: Duration) {}

    fn close(&mut self) {}
}

#[derive(Debug, Clone, Copy)]
enum Sink {
    Stdout,
    Tracing,
}

/// Reports every `interval` completions and at the last one.
#[derive(Debug)]
struct Milestones {
    started: Instant,
    total: usize,
    finished: usize,
    interval: usize,
    func_name: String,
    label: String,
    sink: Sink,
}

impl Milestones {
    fn new(cfg: &ReporterConfig, total: usize, func_name: &str, label: &str, sink: Sink) -> Self {
        Self {
            started: Instant::now(),
            total,
            finished: 0,
            interval: cfg.interval_for(total),
            func_name: func_name.to_string(),
            label: label.to_string(),
            sink,
        }
    }

    fn is_milestone(&self) -> bool {
        self.finished % self.interval == 0 || self.finished == self.total
    }

    fn progress_line(&self, elapsed: Duration) -> String {
        format!(
            "[{:>5}/{:<5}] ...... Fns {} with {} ...... in {:>10.4} seconds.",
            self.finished,
            self.total,
            self.func_name,
            self.label,
            elapsed.as_secs_f64(),
        )
    }

    fn summary_line(&self, used: Duration) -> String {
        let secs = used.as_secs_f64();
        let used = if secs <= 100.0 {
            format!("{secs:>10.4} seconds")
        } else {
            format!("{:>10.4} minutes", secs / 60.0)
        };
        format!(
            ">>>>>> Fns {} {} with {} total use {}.",
            self.total, self.func_name, self.label, used
        )
    }

    fn emit(&self, line: String) {
        match self.sink {
            Sink::Stdout => println!("{line}"),
            Sink::Tracing => info!(target: "fanout.observe.progress", "{line}"),
        }
    }
}

impl Progress for Milestones {
    fn update(&mut self, elapsed: Duration) {
        self.finished = (self.finished + 1).min(self.total);
        if self.is_milestone() {
            self.emit(self.progress_line(elapsed));
        }
    }

    fn close(&mut self) {
        self.emit(self.summary_line(self.started.elapsed()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn milestones(total: usize, interval: f64) -> Milestones {
        let cfg = ReporterConfig::print().with_interval(interval);
        Milestones::new(&cfg, total, "work", "inline", Sink::Tracing)
    }

    #[test]
    fn reporter_kind_parsing() {
        assert_eq!("".parse::<ReporterKind>().unwrap(), ReporterKind::Silent);
        assert_eq!("Print".parse::<ReporterKind>().unwrap(), ReporterKind::Print);
        assert_eq!("log".parse::<ReporterKind>().unwrap(), ReporterKind::Log);
        assert!(matches!(
            "tqdm".parse::<ReporterKind>(),
            Err(ConfigError::InvalidReporter(_))
        ));
    }

    #[test]
    fn fractional_interval_scales_with_total() {
        let cfg = ReporterConfig::print().with_interval(0.1);
        assert_eq!(cfg.interval_for(200), 20);
        assert_eq!(cfg.interval_for(5), 1);
        assert_eq!(cfg.interval_for(0), 1);
        assert_eq!(ReporterConfig::print().with_interval(3.0).interval_for(5), 3);
    }

    #[test]
    fn milestones_hit_interval_and_last() {
        let mut m = milestones(5, 2.0);
        let mut hits = Vec::new();
        for _ in 0..5 {
            m.finished += 1;
            hits.push(m.is_milestone());
        }
        assert_eq!(hits, vec![false, true, false, true, true]);
    }

    #[test]
    fn finished_never_exceeds_total() {
        let mut m = milestones(2, 1.0);
        for _ in 0..4 {
            m.update(Duration::from_millis(1));
        }
        assert_eq!(m.finished, 2);
    }

    #[test]
    fn lines_match_print_format() {
        let mut m = milestones(12, 1.0);
        m.finished = 3;
        let line = m.progress_line(Duration::from_millis(1500));
        assert_eq!(
            line,
            "[    3/12   ] ...... Fns work with inline ...... in     1.5000 seconds."
        );
        assert!(m.summary_line(Duration::from_secs(30)).contains("30.0000 seconds"));
        assert!(m.summary_line(Duration::from_secs(600)).contains("10.0000 minutes"));
    }
}
