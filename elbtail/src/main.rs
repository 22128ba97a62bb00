//! Tails load balancer access logs into Honeycomb.
//!
//! `elbtail` reads access logs of AWS Elastic Load Balancers from files or stdin, parses every
//! line into an event and sends a dynamically sampled subset of the events to a Honeycomb
//! dataset. Rare combinations of load balancer and status codes are kept more often than
//! frequent ones, so errors stay visible while the overall volume approaches a goal rate.
//!
//! # Crates
//!
//! The workspace is split into these crates:
//!
//!  - [`elbtail-config`]: Configuration file and command line overrides.
//!  - [`elbtail-event`]: The event model shared by all stages.
//!  - [`elbtail-log`]: Logging facade.
//!  - [`elbtail-parser`]: Parses access log lines into events.
//!  - [`elbtail-publisher`]: The concurrent scan, parse, sample and publish pipeline.
//!  - [`elbtail-sampling`]: Sampling keys and the adaptive sampler.
//!  - [`elbtail-shaper`]: Decomposes request lines and URLs into fields.
//!  - [`elbtail-sink`]: Batched delivery of events to Honeycomb.
//!  - [`elbtail-statsd`]: Internal metrics.
//!  - [`elbtail-test`]: Helpers for tests.
//!
//! [`elbtail-config`]: ../elbtail_config/index.html
//! [`elbtail-event`]: ../elbtail_event/index.html
//! [`elbtail-log`]: ../elbtail_log/index.html
//! [`elbtail-parser`]: ../elbtail_parser/index.html
//! [`elbtail-publisher`]: ../elbtail_publisher/index.html
//! [`elbtail-sampling`]: ../elbtail_sampling/index.html
//! [`elbtail-shaper`]: ../elbtail_shaper/index.html
//! [`elbtail-sink`]: ../elbtail_sink/index.html
//! [`elbtail-statsd`]: ../elbtail_statsd/index.html
//! [`elbtail-test`]: ../elbtail_test/index.html

mod cli;
mod cliapp;
mod setup;

use std::process;

#[cfg(target_os = "linux")]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

pub fn main() {
    let exit_code = match cli::execute() {
        Ok(()) => 0,
        Err(err) => {
            elbtail_log::ensure_error(&err);
            1
        }
    };

    process::exit(exit_code);
}
