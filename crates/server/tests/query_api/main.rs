/// End-to-end tests for the query surface: a real node on a loopback port,
/// real fork dispatch, and the error taxonomy on the wire.

mod batch;
mod endpoints;
mod fork;
mod helpers;
mod teardown;
mod validation;
