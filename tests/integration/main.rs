//! Integration tests for chainscrape
//!
//! These tests run whole configurations against wiremock servers and
//! temporary directories, going through the public API only.

mod scrape_tests;
