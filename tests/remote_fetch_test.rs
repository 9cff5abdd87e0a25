//! Network tests for URL references served over HTTP.
//!
//! These tests reach raw.githubusercontent.com and are ignored unless the
//! `integration-tests` feature is enabled:
//!
//! ```bash
//! cargo test --test remote_fetch_test --features integration-tests
//!
//! # Skip network tests even when the feature is enabled
//! SKIP_NETWORK_TESTS=1 cargo test --features integration-tests
//! ```

mod common;

use url::Url;

use common::prelude::*;
use inrepo_triggers::error::Error;
use inrepo_triggers::fetcher::ContentFetcher;

const REMOTE_URL: &str = "https://raw.githubusercontent.com/rawlingsj/test/master/foo.yaml";

#[test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
fn test_directory_fetcher_reads_url() {
    if should_skip_network_tests() {
        println!("Skipping network integration test");
        return;
    }

    let body = fixture_fetcher()
        .get_url(&Url::parse(REMOTE_URL).unwrap())
        .unwrap();
    assert!(!body.is_empty());
    assert!(std::str::from_utf8(&body).is_ok());
}

#[test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
fn test_missing_url_is_http_status_error() {
    if should_skip_network_tests() {
        println!("Skipping network integration test");
        return;
    }

    let missing =
        Url::parse("https://raw.githubusercontent.com/rawlingsj/test/master/does-not-exist.yaml")
            .unwrap();
    match fixture_fetcher().get_url(&missing) {
        Err(Error::HttpStatus { status, .. }) => assert_eq!(status, 404),
        other => panic!("expected a 404, got {:?}", other),
    }
}
