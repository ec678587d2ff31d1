// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Drains a frozen tracefs instance to stdout as JSON lines.
//!
//! Usage: `drain_to_json [INSTANCE] [EVENT...]`, e.g.
//! `drain_to_json boot_trace sched/sched_switch irq/*`.
//!
//! Stop tracing on the instance first (`echo 0 > instances/NAME/tracing_on`);
//! this tool never changes tracefs state.

use std::env;
use std::io;
use std::rc;

use tracepoint_frozen as tf;

fn main() {
    tracing_subscriber::fmt().with_writer(io::stderr).init();

    let mut args = env::args().skip(1);
    let config = tf::FrozenFtraceConfig {
        instance_name: args.next(),
        ftrace_events: args.collect(),
        ..Default::default()
    };

    let raw = match serde_json::to_vec(&config) {
        Ok(raw) => raw,
        Err(error) => {
            eprintln!("config: {}", error);
            return;
        }
    };

    let runner = rc::Rc::new(tf::LocalTaskRunner::new());
    let writer = tf::JsonTraceWriter::new(io::stdout().lock());
    let ds_config = tf::DataSourceConfig::new(tf::FrozenFtraceDataSource::DESCRIPTOR.name, raw);
    let mut source = tf::FrozenFtraceDataSource::new(runner.clone(), &ds_config, 1, Box::new(writer));

    source.start();
    while runner.run_next() {
        // Flush between steps so output streams while draining.
        source.flush(0, || {});
    }
    source.flush(0, || {});

    let stats = source.stats();
    eprintln!(
        "steps={} pages={} events={} parse_errors={} lost_event_pages={}",
        stats.steps, stats.pages, stats.events, stats.parse_errors, stats.lost_event_pages
    );
}
