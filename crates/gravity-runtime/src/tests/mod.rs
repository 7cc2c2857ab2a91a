//! Test suites for the Gravity runtime.

mod support;
