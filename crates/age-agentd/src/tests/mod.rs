//! Test suites for the agent server.

mod support;
