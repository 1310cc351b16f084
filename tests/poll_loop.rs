//! Running resolvers to completion with the blocking poll loop.

mod common;

use common::{init_logging, Loopback};
use domain_mux::poll::PollLoop;
use domain_mux::{Config, Error, QueryError, Resolver, Rtype};
use rstest::rstest;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

fn resolver(transport: Loopback) -> Resolver<Loopback> {
    init_logging();
    Resolver::new(transport, Config::new())
}

#[test]
fn heise_a_and_aaaa() {
    let mut resolver = resolver(Loopback::heise());
    resolver.query_a("heise.de", None).unwrap();
    resolver.query_aaaa("heise.de", None).unwrap();
    resolver.run().unwrap();
    assert_eq!(resolver.pending(), 0);
    assert_eq!(
        resolver.results(false),
        [(
            "heise.de".to_string(),
            vec![
                "193.99.144.80".to_string(),
                "2a02:2e0:3fe:1001:302::".to_string()
            ]
        )]
    );
    assert!(resolver.errors(false).is_empty());
}

#[test]
fn ptr_for_google_dns() {
    let mut resolver = resolver(Loopback::heise());
    resolver.ptr("8.8.8.8".parse().unwrap(), None).unwrap();
    resolver.run().unwrap();
    assert_eq!(
        resolver.results(false),
        [(
            "8.8.8.8".to_string(),
            vec!["google-public-dns-a.google.com".to_string()]
        )]
    );
}

#[test]
fn ns_appends_after_run() {
    let mut resolver = resolver(Loopback::heise());
    resolver.query_a("heise.de", None).unwrap();
    resolver.run().unwrap();
    resolver.query_ns("heise.de", None).unwrap();
    resolver.run().unwrap();
    assert_eq!(
        resolver.results(false)[0].1,
        ["193.99.144.80", "ns.heise.de", "ns.s.plusline.de"]
    );
}

#[rstest]
#[case::a(Rtype::A)]
#[case::aaaa(Rtype::AAAA)]
#[case::ns(Rtype::NS)]
fn repeated_queries_go_out_once(#[case] rtype: Rtype) {
    let calls = Rc::new(RefCell::new(0));
    let callback = || {
        let calls = calls.clone();
        Some(Box::new(move |_: &str, res: Result<&[String], QueryError>| {
            assert!(res.is_ok());
            *calls.borrow_mut() += 1;
        }) as domain_mux::Callback)
    };
    let mut resolver = resolver(Loopback::heise());
    resolver.query(rtype, "heise.de", callback()).unwrap();
    resolver.query(rtype, "heise.de", callback()).unwrap();
    resolver.run().unwrap();
    assert_eq!(*calls.borrow(), 2);

    // Answered before, so replayed right away.
    resolver.query(rtype, "heise.de", callback()).unwrap();
    assert_eq!(*calls.borrow(), 3);
    assert_eq!(resolver.transport().submitted().len(), 1);
}

#[rstest]
#[case::notfound(QueryError::NOTFOUND)]
#[case::servfail(QueryError::SERVFAIL)]
#[case::refused(QueryError::REFUSED)]
fn errors_are_reported(#[case] err: QueryError) {
    let mut resolver = resolver(
        Loopback::new()
            .fail("one.example.", Rtype::A, err)
            .fail("two.example.", Rtype::A, err),
    );
    resolver
        .query_many(Rtype::A, ["one.example", "two.example"], None)
        .unwrap();
    resolver.run().unwrap();
    assert!(resolver.results(false).is_empty());
    assert_eq!(resolver.errors(false), [err]);
}

#[test]
fn deadline_ends_the_run() {
    let mut config = Config::new();
    config.set_query_deadline(Some(Duration::from_millis(50)));
    let mut resolver =
        Resolver::new(Loopback::heise().silent("stuck.example."), config);
    resolver.query_a("heise.de", None).unwrap();
    resolver.query_a("stuck.example", None).unwrap();
    let start = Instant::now();
    PollLoop::new().run(&mut resolver).unwrap();
    assert!(start.elapsed() >= Duration::from_millis(50));
    assert_eq!(resolver.pending(), 0);
    assert_eq!(resolver.results(false).len(), 1);
    assert_eq!(resolver.errors(false), [QueryError::TIMEOUT]);
}

#[test]
fn broken_transport_aborts_the_run() {
    let mut resolver = resolver(Loopback::heise());
    resolver.query_a("heise.de", None).unwrap();
    resolver.transport_mut().set_broken(true);
    let fd = resolver.transport().fd();
    match resolver.run() {
        Err(Error::Drive { read, write: None, .. }) => {
            assert_eq!(read, Some(fd))
        }
        other => panic!("unexpected result {other:?}"),
    }
    assert_eq!(resolver.pending(), 1);
}

#[test]
fn run_without_queries_returns() {
    let mut resolver = resolver(Loopback::heise());
    resolver.run().unwrap();
    assert!(resolver.results(true).is_empty());
}
