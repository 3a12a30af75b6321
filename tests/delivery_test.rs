//! Tests for delivering callbacks on executors other than the dispatcher threads.

mod support;

use std::sync::mpsc;
use std::sync::Arc;

use serde::Deserialize;

use courier_core::cache::NoCache;
use courier_core::delivery::{Executor, TokioExecutor};
use courier_core::request::{JsonRequest, Request, RequestError, StringRequest};
use courier_core::scheduler::{FinishReason, RequestQueue, RequestQueueConfig};

use support::*;

fn tokio_queue(rt: &tokio::runtime::Runtime, network: Arc<ScriptedNetwork>) -> RequestQueue {
    let executor: Arc<dyn Executor> = Arc::new(TokioExecutor::new(rt.handle().clone()));
    let queue = RequestQueue::with_executor(
        Arc::new(NoCache),
        network,
        RequestQueueConfig::with_network_threads(2),
        executor,
    );
    queue.start().unwrap();
    queue
}

#[test]
fn callbacks_run_on_the_tokio_blocking_pool() {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("app-runtime")
        .build()
        .unwrap();
    let queue = tokio_queue(&rt, ScriptedNetwork::new(vec![Ok(fresh("hello"))]));

    let (tx, rx) = mpsc::channel();
    let handler = StringRequest::new(
        move |body| {
            let thread = std::thread::current().name().map(str::to_string);
            let _ = tx.send((body, thread));
        },
        |_| {},
    );
    queue.admit(Request::get("https://example.com/", handler));

    let (body, thread) = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(body, "hello");
    assert_eq!(thread.as_deref(), Some("app-runtime"));
}

#[test]
fn finish_follows_delivery_on_executor() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let queue = tokio_queue(&rt, ScriptedNetwork::new(Vec::new()));
    let (tx, rx) = channel();
    listen(&queue, &tx);

    queue.admit(Request::get("https://example.com/", Recorder::new(&tx)));
    assert_eq!(next(&rx), Event::Response("fresh".into()));
    assert_eq!(next(&rx), Event::Finished(Some(1), FinishReason::Done));
}

#[derive(Debug, Deserialize, PartialEq)]
struct Profile {
    name: String,
    age: u32,
}

#[test]
fn json_request_delivers_typed_value() {
    let network = ScriptedNetwork::new(vec![Ok(fresh(r#"{"name":"Ada","age":36}"#))]);
    let queue = RequestQueue::new(Arc::new(NoCache), network, RequestQueueConfig::default());
    queue.start().unwrap();

    let (tx, rx) = mpsc::channel();
    let err_tx = tx.clone();
    let handler = JsonRequest::<Profile, _, _>::new(
        move |profile| {
            let _ = tx.send(Ok(profile));
        },
        move |err: RequestError| {
            let _ = err_tx.send(Err(err.kind()));
        },
    );
    queue.admit(Request::get("https://example.com/profile", handler));

    let profile = rx.recv_timeout(WAIT).unwrap().unwrap();
    assert_eq!(profile, Profile { name: "Ada".into(), age: 36 });
}

#[test]
fn json_parse_failure_reaches_error_callback() {
    let network = ScriptedNetwork::new(vec![Ok(fresh("<html>"))]);
    let queue = RequestQueue::new(Arc::new(NoCache), network, RequestQueueConfig::default());
    queue.start().unwrap();

    let (tx, rx) = mpsc::channel();
    let err_tx = tx.clone();
    let handler = JsonRequest::<Profile, _, _>::new(
        move |profile| {
            let _ = tx.send(Ok(profile));
        },
        move |err: RequestError| {
            let _ = err_tx.send(Err(err.kind()));
        },
    );
    queue.admit(Request::get("https://example.com/profile", handler));

    let result = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(result, Err(courier_core::request::ErrorKind::Parse));
}
