//! Per-attempt API call accounting.
//!
//! Every binding the gateway actually attempts produces exactly one
//! [`ApiCallRecord`]. The default recorder is [`ApiCallLedger`], a bounded ring
//! buffer that optionally appends each record to a JSONL file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

const MAX_LEDGER_ENTRIES: usize = 10_000;

/// Unit prices for a binding. Token prices are per million tokens; image and
/// request prices are per unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pricing {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_cache_reads: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_cache_writes: Option<f64>,
}

/// Metered usage of one call, in the same dimensions as [`Pricing`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input: u64,
    #[serde(default)]
    pub output: u64,
    #[serde(default)]
    pub image: u64,
    #[serde(default)]
    pub request: u64,
    #[serde(default)]
    pub input_cache_reads: u64,
    #[serde(default)]
    pub input_cache_writes: u64,
}

impl Usage {
    pub fn tokens(input: u64, output: u64) -> Self {
        Self {
            input,
            output,
            request: 1,
            ..Self::default()
        }
    }

    /// Fold a later observation into this one. Stream events report running
    /// totals, so each dimension keeps its maximum.
    pub fn merge(&mut self, other: &Usage) {
        self.input = self.input.max(other.input);
        self.output = self.output.max(other.output);
        self.image = self.image.max(other.image);
        self.request = self.request.max(other.request);
        self.input_cache_reads = self.input_cache_reads.max(other.input_cache_reads);
        self.input_cache_writes = self.input_cache_writes.max(other.input_cache_writes);
    }
}

/// Anything that can report the usage it incurred.
pub trait Metered {
    fn usage(&self) -> Option<Usage>;
}

/// Cost in `f64`. Binary rounding error stays far below the smallest unit
/// any provider bills in.
pub fn calculate_cost(usage: Option<&Usage>, pricing: Option<&Pricing>) -> f64 {
    let (Some(usage), Some(pricing)) = (usage, pricing) else {
        return 0.0;
    };
    let per_million = |count: u64, price: Option<f64>| count as f64 * price.unwrap_or(0.0) / 1_000_000.0;
    let per_unit = |count: u64, price: Option<f64>| count as f64 * price.unwrap_or(0.0);

    per_million(usage.input, pricing.input)
        + per_million(usage.output, pricing.output)
        + per_unit(usage.image, pricing.image)
        + per_unit(usage.request, pricing.request)
        + per_million(usage.input_cache_reads, pricing.input_cache_reads)
        + per_million(usage.input_cache_writes, pricing.input_cache_writes)
}

/// Wall-clock marks for one attempt: start, then completion.
#[derive(Debug, Clone, Default)]
pub struct TimeKeeper {
    marks: Vec<DateTime<Utc>>,
}

impl TimeKeeper {
    pub fn started() -> Self {
        Self {
            marks: vec![Utc::now()],
        }
    }

    pub fn record(&mut self) {
        self.marks.push(Utc::now());
    }

    pub fn timestamps(&self) -> Vec<DateTime<Utc>> {
        self.marks.clone()
    }

    pub fn elapsed_ms(&self) -> i64 {
        match (self.marks.first(), self.marks.last()) {
            (Some(first), Some(last)) => (*last - *first).num_milliseconds(),
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiCallRecord {
    pub timestamp: DateTime<Utc>,
    pub provider: String,
    pub status: u16,
    pub latency_ms: i64,
    pub timestamps: Vec<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    pub cost: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ApiCallRecord {
    pub fn new(
        provider: impl Into<String>,
        status: u16,
        timer: &TimeKeeper,
        usage: Option<Usage>,
        pricing: Option<&Pricing>,
        error: Option<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            provider: provider.into(),
            status,
            latency_ms: timer.elapsed_ms(),
            timestamps: timer.timestamps(),
            cost: calculate_cost(usage.as_ref(), pricing),
            usage,
            error,
        }
    }
}

/// Sink for per-attempt records. Persistence is the implementor's concern.
pub trait BillingRecorder: Send + Sync {
    fn record_api_call(&self, record: ApiCallRecord);
}

struct Ledger {
    entries: VecDeque<ApiCallRecord>,
    writer: Option<BufWriter<File>>,
}

impl Ledger {
    fn open(file_path: Option<&Path>) -> std::io::Result<Self> {
        let mut entries = VecDeque::with_capacity(MAX_LEDGER_ENTRIES);
        let Some(file_path) = file_path else {
            return Ok(Self {
                entries,
                writer: None,
            });
        };

        if let Some(parent) = file_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        if file_path.exists() {
            let reader = BufReader::new(File::open(file_path)?);
            for line in reader.lines().map_while(std::result::Result::ok) {
                if let Ok(record) = serde_json::from_str::<ApiCallRecord>(&line) {
                    if entries.len() >= MAX_LEDGER_ENTRIES {
                        entries.pop_front();
                    }
                    entries.push_back(record);
                }
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(file_path)?;

        Ok(Self {
            entries,
            writer: Some(BufWriter::new(file)),
        })
    }

    fn push(&mut self, record: ApiCallRecord) {
        if let Some(ref mut writer) = self.writer {
            if let Ok(json) = serde_json::to_string(&record) {
                let _ = writeln!(writer, "{json}");
                let _ = writer.flush();
            }
        }
        if self.entries.len() >= MAX_LEDGER_ENTRIES {
            self.entries.pop_front();
        }
        self.entries.push_back(record);
    }
}

/// Shared, cloneable ledger of API call records.
#[derive(Clone)]
pub struct ApiCallLedger(Arc<Mutex<Ledger>>);

impl ApiCallLedger {
    pub fn in_memory() -> Self {
        Self(Arc::new(Mutex::new(Ledger {
            entries: VecDeque::new(),
            writer: None,
        })))
    }

    /// Open a ledger backed by a JSONL file, replaying its tail into memory.
    pub fn open(file_path: Option<PathBuf>) -> std::io::Result<Self> {
        Ok(Self(Arc::new(Mutex::new(Ledger::open(
            file_path.as_deref(),
        )?))))
    }

    /// Most recent records, newest first.
    pub fn recent(&self, limit: usize) -> Vec<ApiCallRecord> {
        self.0
            .lock()
            .map(|l| l.entries.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.0.lock().map(|l| l.entries.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BillingRecorder for ApiCallLedger {
    fn record_api_call(&self, record: ApiCallRecord) {
        tracing::debug!(
            provider = %record.provider,
            status = record.status,
            latency_ms = record.latency_ms,
            cost = record.cost,
            "api call recorded"
        );
        if let Ok(mut ledger) = self.0.lock() {
            ledger.push(record);
        }
    }
}
