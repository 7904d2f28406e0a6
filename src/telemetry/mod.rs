//! Telemetry for PotterBuddy
//!
//! Collects per-stage timings, retries, fallbacks, and request outcomes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use colored::Colorize;
use uuid::Uuid;

use crate::errors::ErrorKind;
use crate::rag::lifecycle::RequestState;

/// Telemetry event types
#[derive(Debug, Clone)]
pub enum TelemetryEvent {
    StageCompleted {
        request_id: Uuid,
        stage: RequestState,
        duration_ms: u64,
        timestamp: Instant,
    },
    RetryAttempt {
        request_id: Uuid,
        stage: RequestState,
        attempt: u32,
        timestamp: Instant,
    },
    /// Request answered with a fallback message
    Fallback {
        request_id: Uuid,
        kind: ErrorKind,
        timestamp: Instant,
    },
    /// Retrieval found nothing and the request continued without context
    NoContext {
        request_id: Uuid,
        timestamp: Instant,
    },
    RequestFinished {
        request_id: Uuid,
        success: bool,
        duration_ms: u64,
        timestamp: Instant,
    },
}

/// Telemetry statistics
#[derive(Debug, Clone, Default)]
pub struct TelemetryStats {
    pub requests: usize,
    pub requests_succeeded: usize,
    pub requests_failed: usize,
    pub retry_attempts: usize,
    pub no_context_answers: usize,
    pub fallbacks: HashMap<ErrorKind, usize>,
    /// Total milliseconds per stage name
    pub stage_time_ms: HashMap<&'static str, u64>,
    pub total_request_ms: u64,
}

impl TelemetryStats {
    pub fn average_request_ms(&self) -> u64 {
        if self.requests == 0 {
            0
        } else {
            self.total_request_ms / self.requests as u64
        }
    }

    pub fn fallback_count(&self) -> usize {
        self.fallbacks.values().sum()
    }
}

/// Telemetry collector, cheap to clone and share across tasks
#[derive(Clone)]
pub struct TelemetryCollector {
    events: Arc<Mutex<Vec<TelemetryEvent>>>,
    stats: Arc<Mutex<TelemetryStats>>,
    start_time: Instant,
}

/// Keeps the newest events only
const MAX_EVENTS: usize = 1024;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl TelemetryCollector {
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            stats: Arc::new(Mutex::new(TelemetryStats::default())),
            start_time: Instant::now(),
        }
    }

    /// Record an event
    pub fn record(&self, event: TelemetryEvent) {
        {
            let mut stats = lock(&self.stats);
            match &event {
                TelemetryEvent::StageCompleted { stage, duration_ms, .. } => {
                    *stats.stage_time_ms.entry(stage.display_name()).or_default() += duration_ms;
                }
                TelemetryEvent::RetryAttempt { .. } => {
                    stats.retry_attempts += 1;
                }
                TelemetryEvent::Fallback { kind, .. } => {
                    *stats.fallbacks.entry(*kind).or_default() += 1;
                }
                TelemetryEvent::NoContext { .. } => {
                    stats.no_context_answers += 1;
                }
                TelemetryEvent::RequestFinished { success, duration_ms, .. } => {
                    stats.requests += 1;
                    stats.total_request_ms += duration_ms;
                    if *success {
                        stats.requests_succeeded += 1;
                    } else {
                        stats.requests_failed += 1;
                    }
                }
            }
        }

        let mut events = lock(&self.events);
        if events.len() >= MAX_EVENTS {
            events.remove(0);
        }
        events.push(event);
    }

    pub fn stage_completed(&self, request_id: Uuid, stage: RequestState, duration: Duration) {
        self.record(TelemetryEvent::StageCompleted {
            request_id,
            stage,
            duration_ms: duration.as_millis() as u64,
            timestamp: Instant::now(),
        });
    }

    pub fn retry(&self, request_id: Uuid, stage: RequestState, attempt: u32) {
        self.record(TelemetryEvent::RetryAttempt {
            request_id,
            stage,
            attempt,
            timestamp: Instant::now(),
        });
    }

    pub fn fallback(&self, request_id: Uuid, kind: ErrorKind) {
        self.record(TelemetryEvent::Fallback {
            request_id,
            kind,
            timestamp: Instant::now(),
        });
    }

    pub fn no_context(&self, request_id: Uuid) {
        self.record(TelemetryEvent::NoContext {
            request_id,
            timestamp: Instant::now(),
        });
    }

    pub fn finished(&self, request_id: Uuid, success: bool, duration: Duration) {
        self.record(TelemetryEvent::RequestFinished {
            request_id,
            success,
            duration_ms: duration.as_millis() as u64,
            timestamp: Instant::now(),
        });
    }

    pub fn get_stats(&self) -> TelemetryStats {
        lock(&self.stats).clone()
    }

    /// Time since the collector was created
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn event_count(&self) -> usize {
        lock(&self.events).len()
    }

    /// Last `n` events
    pub fn recent_events(&self, n: usize) -> Vec<TelemetryEvent> {
        let events = lock(&self.events);
        let start = events.len().saturating_sub(n);
        events[start..].to_vec()
    }

    pub fn success_rate(&self) -> f64 {
        let stats = lock(&self.stats);
        if stats.requests == 0 {
            1.0
        } else {
            stats.requests_succeeded as f64 / stats.requests as f64
        }
    }
}

impl Default for TelemetryCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Session summary printer
pub struct TelemetryDisplay {
    collector: TelemetryCollector,
}

impl TelemetryDisplay {
    pub fn new(collector: TelemetryCollector) -> Self {
        Self { collector }
    }

    pub fn display_summary(&self) {
        let stats = self.collector.get_stats();

        println!("\n{}", "📊 Session Summary".bold());
        println!("─────────────────────────────────────");
        println!("Uptime:            {:.1?}", self.collector.elapsed());
        println!("Questions:         {}", stats.requests);
        println!("Success rate:      {:.1}%", self.collector.success_rate() * 100.0);
        println!("Average latency:   {} ms", stats.average_request_ms());
        println!("Retries:           {}", stats.retry_attempts);
        println!("Without context:   {}", stats.no_context_answers);
        println!("Fallback answers:  {}", stats.fallback_count());

        let mut kinds: Vec<_> = stats.fallbacks.iter().collect();
        kinds.sort_by_key(|(kind, _)| kind.as_str());
        for (kind, count) in kinds {
            println!("  {:<24} {}", kind.as_str().dimmed(), count);
        }

        let mut stages: Vec<_> = stats.stage_time_ms.iter().collect();
        stages.sort_by(|a, b| b.1.cmp(a.1));
        if !stages.is_empty() {
            println!("Time by stage:");
            for (stage, ms) in stages {
                println!("  {:<24} {} ms", stage.dimmed(), ms);
            }
        }
        println!();
    }
}
