//! Property-based tests for locator normalisation and reference resolution.
//!
//! These tests use proptest to generate random paths and references and
//! verify that canonical locators behave as identities.
