//! Integration tests for the harvester
//!
//! These tests use wiremock to stand in for the catalog and run complete
//! harvests end-to-end against it.

mod harvest_tests;
