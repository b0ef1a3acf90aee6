//! Prometheus collectors for letter generation.

use lazy_static::lazy_static;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};

lazy_static! {
    pub static ref LETTERS_GENERATED: IntCounter = IntCounter::new(
        "letters_generated_total",
        "Letters converted to PDF and recorded in the history log"
    )
    .expect("valid counter");
    pub static ref CONVERSION_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "letter_conversion_failures_total",
            "Failed PDF conversions by error kind"
        ),
        &["kind"]
    )
    .expect("valid counter vec");
    pub static ref CONVERSION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "letter_conversion_seconds",
            "Time spent converting rendered letters to PDF"
        )
        .buckets(vec![0.5, 1.0, 2.0, 5.0, 10.0, 20.0, 30.0, 60.0])
    )
    .expect("valid histogram");
}

/// Registers the letter collectors on `registry`. Registering twice is
/// reported and otherwise ignored.
pub fn register(registry: &Registry) {
    let collectors: [Box<dyn prometheus::core::Collector>; 3] = [
        Box::new(LETTERS_GENERATED.clone()),
        Box::new(CONVERSION_FAILURES.clone()),
        Box::new(CONVERSION_SECONDS.clone()),
    ];
    for collector in collectors {
        if let Err(e) = registry.register(collector) {
            log::warn!("Failed to register letter metric: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_on_fresh_registry() {
        let registry = Registry::new();
        register(&registry);
        CONVERSION_FAILURES.with_label_values(&["timeout"]).inc();
        assert_eq!(registry.gather().len(), 3);

        // Second registration is rejected by prometheus but must not panic.
        register(&registry);
        assert_eq!(registry.gather().len(), 3);
    }
}
