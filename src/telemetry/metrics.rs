use opentelemetry::{
    global,
    metrics::{Counter, Histogram, Meter},
};
use std::sync::LazyLock;

pub static METER: LazyLock<Meter> = LazyLock::new(|| global::meter("report-weaver"));

// --- Browser Session Metrics ---

pub static SESSIONS_OPENED: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("browser.sessions.opened")
        .with_description("Number of browser sessions launched")
        .with_unit("{session}")
        .build()
});

pub static SESSIONS_CLOSED: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("browser.sessions.closed")
        .with_description("Number of browser sessions closed")
        .with_unit("{session}")
        .build()
});

pub static SESSION_CLOSE_FAILURES: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("browser.sessions.close_failures")
        .with_description("Number of browser sessions that failed to close cleanly")
        .with_unit("{session}")
        .build()
});

// --- Domain Metrics ---

pub static REPORT_RUNS: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("report.runs")
        .with_description("Number of report runs by outcome")
        .with_unit("{run}")
        .build()
});

pub static REPORT_RUN_DURATION: LazyLock<Histogram<f64>> = LazyLock::new(|| {
    METER
        .f64_histogram("report.run.duration")
        .with_description("Total report run duration in seconds")
        .with_unit("s")
        .build()
});

pub static LISTING_PAGES_SCANNED: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("report.listing.pages_scanned")
        .with_description("Listing pages scanned while locating a report")
        .with_unit("{page}")
        .build()
});

pub static DOWNLOAD_WAIT_DURATION: LazyLock<Histogram<f64>> = LazyLock::new(|| {
    METER
        .f64_histogram("report.download.wait_duration")
        .with_description("Time spent waiting for the exported artifact in seconds")
        .with_unit("s")
        .build()
});

pub static ERRORS_EXTRACTED: LazyLock<Histogram<f64>> = LazyLock::new(|| {
    METER
        .f64_histogram("report.errors_extracted")
        .with_description("Number of documented errors extracted per run")
        .with_unit("{error}")
        .build()
});

pub static DETAIL_ENTRIES: LazyLock<Histogram<f64>> = LazyLock::new(|| {
    METER
        .f64_histogram("report.detail_entries")
        .with_description("Number of (url, count) entries collected per error")
        .with_unit("{entry}")
        .build()
});

pub static CANDIDATES_DISCARDED: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("report.candidates_discarded")
        .with_description("Candidate errors dropped because documentation could not be fetched")
        .with_unit("{error}")
        .build()
});

// --- HTTP Metrics ---

pub static HTTP_REQUESTS_TOTAL: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("http.requests.total")
        .with_description("Total number of HTTP requests")
        .with_unit("{request}")
        .build()
});

pub static HTTP_REQUEST_DURATION: LazyLock<Histogram<f64>> = LazyLock::new(|| {
    METER
        .f64_histogram("http.request.duration")
        .with_description("HTTP request duration in milliseconds")
        .with_unit("ms")
        .with_boundaries(vec![
            1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0,
            60000.0, 300000.0, 600000.0,
        ])
        .build()
});
