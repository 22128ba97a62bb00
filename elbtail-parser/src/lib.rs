//! Parsing of classic load balancer access logs into [`Event`](elbtail_event::Event)s.
//!
//! The [`ElbParser`] turns a single line into an event. The [`ParserPool`] runs a number of
//! parser threads between a channel of lines and a channel of events.

#![warn(missing_docs)]

mod elb;
mod pool;
mod statsd;

pub use self::elb::*;
pub use self::pool::*;
