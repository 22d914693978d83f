use lazy_static::lazy_static;

pub use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Result};

lazy_static! {
    pub static ref BACKFILL_BATCHES_IMPORTED: Result<IntCounter> = try_create_int_counter(
        "backfill_batches_imported_total",
        "Count of backfill batches imported into the store"
    );
    pub static ref BACKFILL_REMAINING_BATCHES: Result<IntGauge> = try_create_int_gauge(
        "backfill_remaining_batches",
        "Number of backfill batches still to be downloaded and imported"
    );
    pub static ref BACKFILL_BATCHES_WAITING: Result<IntGauge> = try_create_int_gauge(
        "backfill_batches_waiting",
        "Number of verified backfill batches waiting on a higher-slot batch to import first"
    );
    pub static ref BACKFILL_BATCH_TIME_DOWNLOADING: Result<Histogram> = try_create_histogram(
        "backfill_batch_time_downloading_ms",
        "Milliseconds spent downloading a backfill batch"
    );
    pub static ref BACKFILL_BATCH_TIME_VERIFYING: Result<Histogram> = try_create_histogram(
        "backfill_batch_time_verifying_ms",
        "Milliseconds spent verifying a backfill batch"
    );
}

/// Attempts to create an `IntCounter`, returning `Err` if the registry does
/// not accept the counter (potentially due to naming conflict).
pub fn try_create_int_counter(name: &str, help: &str) -> Result<IntCounter> {
    let opts = Opts::new(name, help);
    let counter = IntCounter::with_opts(opts)?;
    prometheus::register(Box::new(counter.clone()))?;
    Ok(counter)
}

/// Attempts to create an `IntGauge`, returning `Err` if the registry does not
/// accept the gauge (potentially due to naming conflict).
pub fn try_create_int_gauge(name: &str, help: &str) -> Result<IntGauge> {
    let opts = Opts::new(name, help);
    let gauge = IntGauge::with_opts(opts)?;
    prometheus::register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

/// Attempts to create a `Histogram`, returning `Err` if the registry does not
/// accept the histogram (potentially due to naming conflict).
pub fn try_create_histogram(name: &str, help: &str) -> Result<Histogram> {
    let opts = HistogramOpts::new(name, help);
    let histogram = Histogram::with_opts(opts)?;
    prometheus::register(Box::new(histogram.clone()))?;
    Ok(histogram)
}

pub fn inc_counter_by(counter: &Result<IntCounter>, value: u64) {
    if let Ok(counter) = counter {
        counter.inc_by(value);
    }
}

pub fn set_gauge(gauge: &Result<IntGauge>, value: i64) {
    if let Ok(gauge) = gauge {
        gauge.set(value);
    }
}

pub fn observe(histogram: &Result<Histogram>, value: f64) {
    if let Ok(histogram) = histogram {
        histogram.observe(value);
    }
}
