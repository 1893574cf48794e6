use opentelemetry::{
    global,
    metrics::{Counter, Histogram, Meter},
};
use std::sync::LazyLock;

pub static METER: LazyLock<Meter> = LazyLock::new(|| global::meter("ticket-order-report"));

pub static ROWS_FETCHED: LazyLock<Histogram<u64>> = LazyLock::new(|| {
    METER
        .u64_histogram("report.rows_fetched")
        .with_description("Number of rows returned per remote select")
        .with_unit("{row}")
        .build()
});

pub static SUMMARIES_RENDERED: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("report.summaries.rendered")
        .with_description("Summary tables rendered to an image")
        .with_unit("{summary}")
        .build()
});

pub static SUMMARIES_SKIPPED: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("report.summaries.skipped")
        .with_description("Summary tables skipped because the fetch returned no rows")
        .with_unit("{summary}")
        .build()
});

pub static RENDER_DURATION: LazyLock<Histogram<f64>> = LazyLock::new(|| {
    METER
        .f64_histogram("report.render.duration")
        .with_description("Time spent rasterizing and writing a summary image")
        .with_unit("ms")
        .build()
});
