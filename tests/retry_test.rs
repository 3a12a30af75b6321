//! Tests for transport error classification and the retry budget.

mod support;

use std::sync::Arc;
use std::time::Duration;

use courier_core::cache::{Headers, NoCache};
use courier_core::request::{
    DefaultRetryPolicy, ErrorKind, NetworkResponse, Request, RequestError, MAX_TIMEOUT,
};
use courier_core::CourierConfig;

use support::*;

fn run(
    replies: Vec<Result<NetworkResponse, RequestError>>,
    configure: impl FnOnce(Request<Recorder>) -> Request<Recorder>,
) -> (Event, Vec<Call>) {
    let network = ScriptedNetwork::new(replies);
    let (tx, rx) = channel();
    let queue = started_queue(Arc::new(NoCache), network.clone(), 1, &tx);
    queue.admit(configure(Request::get("https://example.com/r", Recorder::new(&tx))));
    let event = next_callback(&rx);
    next_finish(&rx);
    (event, network.calls())
}

fn policy(max_retries: u32) -> DefaultRetryPolicy {
    DefaultRetryPolicy::new(Duration::from_millis(100), max_retries, 1.0)
}

fn server_error() -> RequestError {
    RequestError::ServerFailed {
        response: Some(NetworkResponse::new(503, Vec::new(), Headers::new(), false, Duration::ZERO)),
    }
}

#[test]
fn retries_until_success_with_growing_timeout() {
    let (event, calls) = run(
        vec![Err(RequestError::Timeout), Err(RequestError::NoConnection("reset".into()))],
        |r| r.with_retry_policy(policy(2)),
    );
    assert_eq!(event, Event::Response("fresh".into()));
    let timeouts: Vec<_> = calls.iter().map(|c| c.timeout.as_millis()).collect();
    assert_eq!(timeouts, vec![100, 200, 400]);
}

#[test]
fn budget_exhaustion_delivers_last_error() {
    let (event, calls) = run(
        vec![Err(RequestError::Timeout), Err(RequestError::Timeout)],
        |r| r.with_retry_policy(policy(1)),
    );
    assert_eq!(event, Event::Error(ErrorKind::Timeout));
    assert_eq!(calls.len(), 2);
}

#[test]
fn default_policy_makes_a_single_attempt() {
    let (event, calls) = run(vec![Err(RequestError::Network("broken pipe".into()))], |r| r);
    assert_eq!(event, Event::Error(ErrorKind::Network));
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].timeout, Duration::from_millis(2500));
}

#[test]
fn client_errors_are_not_retried() {
    let rejected = RequestError::ClientRejected {
        response: NetworkResponse::new(404, Vec::new(), Headers::new(), false, Duration::ZERO),
    };
    let (event, calls) = run(vec![Err(rejected)], |r| r.with_retry_policy(policy(3)));
    assert_eq!(event, Event::Error(ErrorKind::ClientRejected));
    assert_eq!(calls.len(), 1);
}

#[test]
fn auth_failures_are_not_retried() {
    let auth = RequestError::AuthRequired { response: None, resolution: Some("login".into()) };
    let (event, calls) = run(vec![Err(auth)], |r| r.with_retry_policy(policy(3)));
    assert_eq!(event, Event::Error(ErrorKind::AuthRequired));
    assert_eq!(calls.len(), 1);
}

#[test]
fn server_errors_need_opt_in() {
    let (event, calls) = run(vec![Err(server_error())], |r| r.with_retry_policy(policy(2)));
    assert_eq!(event, Event::Error(ErrorKind::ServerFailed));
    assert_eq!(calls.len(), 1);

    let (event, calls) = run(vec![Err(server_error())], |r| {
        r.with_retry_policy(policy(2)).with_retry_server_errors(true)
    });
    assert_eq!(event, Event::Response("fresh".into()));
    assert_eq!(calls.len(), 2);
}

#[test]
fn large_budget_with_steep_backoff_exhausts_cleanly() {
    let replies = (0..101).map(|_| Err(RequestError::Timeout)).collect();
    let network = ScriptedNetwork::new(replies);
    let (tx, rx) = channel();
    let queue = started_queue(Arc::new(NoCache), network.clone(), 1, &tx);
    queue.admit(
        Request::get("https://example.com/r", Recorder::new(&tx))
            .with_retry_policy(DefaultRetryPolicy::new(Duration::from_millis(2500), 100, 2.0)),
    );

    assert_eq!(next_callback(&rx), Event::Error(ErrorKind::Timeout));
    next_finish(&rx);
    let calls = network.calls();
    assert_eq!(calls.len(), 101);
    assert_eq!(calls.last().map(|c| c.timeout), Some(MAX_TIMEOUT));
    assert_eq!(queue.active_count(), 0);

    // The dispatcher thread survived and still serves requests.
    queue.admit(Request::get("https://example.com/after", Recorder::new(&tx)));
    assert_eq!(next_callback(&rx), Event::Response("fresh".into()));
}

#[test]
fn configured_retry_section_applies_to_admitted_requests() {
    let config = CourierConfig::from_toml_str(
        "[retry]\nmax_retries = 3\ninitial_timeout_ms = 100\nbackoff_multiplier = 1.0\n",
    )
    .unwrap();
    let network = ScriptedNetwork::new(vec![Err(RequestError::Timeout)]);
    let (tx, rx) = channel();
    let queue = courier_core::new_request_queue(&config, network.clone()).unwrap();
    listen(&queue, &tx);

    queue.admit(Request::get("https://example.com/r", Recorder::new(&tx)));
    assert_eq!(next_callback(&rx), Event::Response("fresh".into()));
    let timeouts: Vec<_> = network.calls().iter().map(|c| c.timeout.as_millis()).collect();
    assert_eq!(timeouts, vec![100, 200]);

    // A policy set on the request wins over the configured one.
    let own = DefaultRetryPolicy::new(Duration::from_millis(700), 0, 1.0);
    queue.admit(Request::get("https://example.com/own", Recorder::new(&tx)).with_retry_policy(own));
    assert_eq!(next_callback(&rx), Event::Response("fresh".into()));
    assert_eq!(network.calls().last().map(|c| c.timeout.as_millis()), Some(700));
}
