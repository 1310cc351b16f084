//! Running resolvers on a tokio event loop.
#![cfg(feature = "tokio")]

mod common;

use common::{init_logging, Loopback};
use domain_mux::{Callback, Config, Error, QueryError, Rtype, Session};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;
use tokio::task::LocalSet;

fn session(transport: Loopback) -> Session<Loopback> {
    init_logging();
    Session::with_transport(transport, Config::new())
}

#[tokio::test]
async fn heise_in_session() {
    LocalSet::new()
        .run_until(async {
            let session = session(Loopback::heise());
            session.query_a("heise.de", None).unwrap();
            session.query_aaaa("heise.de", None).unwrap();
            session.ptr("8.8.8.8".parse().unwrap(), None).unwrap();
            assert_eq!(session.pending(), 3);
            session.settled().await.unwrap();
            assert_eq!(
                session.results(false),
                [
                    (
                        "8.8.8.8".to_string(),
                        vec!["google-public-dns-a.google.com".to_string()]
                    ),
                    (
                        "heise.de".to_string(),
                        vec![
                            "193.99.144.80".to_string(),
                            "2a02:2e0:3fe:1001:302::".to_string()
                        ]
                    ),
                ]
            );
        })
        .await;
}

/// Returns a callback noting the name of an answered NS query.
fn note_ns(seen: Rc<RefCell<Vec<String>>>) -> Callback {
    Box::new(move |name: &str, _: Result<&[String], QueryError>| {
        seen.borrow_mut().push(format!("{name} NS"));
    })
}

#[tokio::test]
async fn callbacks_may_submit_more() {
    LocalSet::new()
        .run_until(async {
            let session = session(Loopback::heise());
            let seen = Rc::new(RefCell::new(Vec::new()));
            let follow_up = {
                let session = session.clone();
                let seen = seen.clone();
                Box::new(
                    move |name: &str, res: Result<&[String], QueryError>| {
                        seen.borrow_mut().push(name.to_string());
                        assert!(res.is_ok());
                        let on_ns = note_ns(seen.clone());
                        session.query_ns(name, Some(on_ns)).unwrap();
                    },
                )
            };
            session.query_a("heise.de", Some(follow_up)).unwrap();
            session.settled().await.unwrap();
            assert_eq!(*seen.borrow(), ["heise.de", "heise.de NS"]);
            assert_eq!(session.results(false)[0].1.len(), 3);
        })
        .await;
}

#[test]
fn deadline_in_session() {
    tokio_test::block_on(LocalSet::new().run_until(async {
        init_logging();
        let mut config = Config::new();
        config.set_query_deadline(Some(Duration::from_millis(50)));
        config.set_reactor_tick(Duration::from_millis(10));
        let session = Session::with_transport(
            Loopback::heise().silent("stuck.example."),
            config,
        );
        session
            .query_many(Rtype::A, ["heise.de", "stuck.example"], None)
            .unwrap();
        session.settled().await.unwrap();
        assert_eq!(session.errors(false), [QueryError::TIMEOUT]);
        assert_eq!(session.results(false).len(), 1);
    }));
}

#[tokio::test]
async fn broken_transport_ends_session() {
    LocalSet::new()
        .run_until(async {
            let mut transport = Loopback::heise();
            transport.set_broken(true);
            let session = session(transport);
            session.query_a("heise.de", None).unwrap();
            assert!(matches!(
                session.settled().await,
                Err(Error::Drive { .. })
            ));
            assert_eq!(session.pending(), 1);
        })
        .await;
}

#[tokio::test]
async fn replay_needs_no_event_loop() {
    LocalSet::new()
        .run_until(async {
            let session = session(Loopback::heise());
            session.query_a("heise.de", None).unwrap();
            session.settled().await.unwrap();

            let replayed = Rc::new(RefCell::new(None));
            let slot = replayed.clone();
            let callback: Callback = Box::new(
                move |_: &str, res: Result<&[String], QueryError>| {
                    let res = res.map(|records| records.to_vec());
                    *slot.borrow_mut() = Some(res);
                },
            );
            session.query_a("heise.de", Some(callback)).unwrap();
            assert_eq!(
                *replayed.borrow(),
                Some(Ok(vec!["193.99.144.80".to_string()]))
            );
            assert_eq!(session.pending(), 0);
        })
        .await;
}
