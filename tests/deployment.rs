//! Hot deployment against a real directory, observed through HTTP.

use axum::http::StatusCode;

use nanoservice::deploy::DeploymentMode;
use nanoservice::plugin::builtin::ECHO_SYMBOL;

mod common;

use common::{simple_unit, write_unit, Harness};

#[tokio::test]
async fn test_add_touch_remove_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let h = Harness::started();
    let manager = h.manager(dir.path(), "");

    assert_eq!(manager.redeploy().unwrap(), 0);

    write_unit(dir.path(), "greeter/Hello.unit", &simple_unit("/hello", "hi {0}"), 1_000);
    assert_eq!(manager.redeploy().unwrap(), 1);
    let response = h.get("/hello/bob").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.text(), "hi bob");

    assert_eq!(manager.redeploy().unwrap(), 0);

    write_unit(dir.path(), "greeter/Hello.unit", &simple_unit("/hello", "bye {0}"), 2_000);
    let report = manager.run_cycle().unwrap().unwrap();
    assert_eq!(report.delta["greeter/Hello.unit"], DeploymentMode::Redeploy);
    assert_eq!(report.net(), 0);
    assert_eq!(h.get("/hello/bob").await.text(), "bye bob");

    std::fs::remove_file(dir.path().join("greeter/Hello.unit")).unwrap();
    assert_eq!(manager.redeploy().unwrap(), -1);
    assert_eq!(h.get("/hello/bob").await.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_archive_deploys_every_unit() {
    let dir = tempfile::tempdir().unwrap();
    let h = Harness::started();
    let manager = h.manager(dir.path(), "com.acme");

    let mut builder = tar::Builder::new(Vec::new());
    for (name, text) in [
        ("a/First.unit", simple_unit("/first", "one")),
        ("b/Second.unit", simple_unit("/second", "two")),
        ("README.txt", "not a unit".to_string()),
    ] {
        let mut header = tar::Header::new_gnu();
        header.set_size(text.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, text.as_bytes()).unwrap();
    }
    std::fs::write(dir.path().join("bundle.tar"), builder.into_inner().unwrap()).unwrap();

    assert_eq!(manager.redeploy().unwrap(), 2);
    assert_eq!(h.get("/first/x").await.text(), "one");
    assert_eq!(h.get("/second/x").await.text(), "two");
    assert_eq!(manager.deployed_units()["bundle.tar"], vec!["/first", "/second"]);

    std::fs::remove_file(dir.path().join("bundle.tar")).unwrap();
    assert_eq!(manager.redeploy().unwrap(), -2);
}

#[tokio::test]
async fn test_catalog_symbol_is_remounted() {
    let dir = tempfile::tempdir().unwrap();
    let h = Harness::started();
    let manager = h.manager(dir.path(), "");

    write_unit(
        dir.path(),
        "Echo.unit",
        &format!("symbol = \"{ECHO_SYMBOL}\"\nmount = \"/say\"\n"),
        1_000,
    );
    assert_eq!(manager.redeploy().unwrap(), 1);

    let response = h.get("/say/hello/there").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.text(), "hello/there");
    assert_eq!(h.router.describe()[0].plugin, "EchoPlugin");
}

#[tokio::test]
async fn test_broken_unit_is_isolated_and_retried_on_change() {
    let dir = tempfile::tempdir().unwrap();
    let h = Harness::started();
    let manager = h.manager(dir.path(), "");

    write_unit(dir.path(), "Good.unit", &simple_unit("/good", "ok"), 1_000);
    write_unit(dir.path(), "Broken.unit", "mount = \"/broken\"\n[[route]]\npattern = \"a/*/b\"\n", 1_000);

    let report = manager.run_cycle().unwrap().unwrap();
    assert_eq!(report.deployed, vec!["/good"]);
    assert_eq!(report.failed, vec!["Broken.unit"]);
    assert_eq!(h.get("/good/x").await.text(), "ok");

    write_unit(dir.path(), "Broken.unit", &simple_unit("/broken", "fixed"), 2_000);
    assert_eq!(manager.redeploy().unwrap(), 1);
    assert_eq!(h.get("/broken/x").await.text(), "fixed");
}
