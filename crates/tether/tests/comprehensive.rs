//! Comprehensive tests for tether
//!
//! Drives whole documents through an `Application`: host lifecycle,
//! property sync, targets, actions, orphans and scope boundaries.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde_json::{Value, json};
use tether::tether_dom::{Event, ListenerOptions, Modifiers, NodeId};
use tether::{Application, Context, Controller, Definition, Diagnostic, Params, codec};

// ============================================================================
// FIXTURES
// ============================================================================

type Log = Rc<RefCell<Vec<String>>>;

/// Records every hook as `token:event`
struct Recorder {
    log: Log,
}

impl Recorder {
    fn push(&self, cx: &Context<'_>, entry: impl fmt::Display) {
        self.log.borrow_mut().push(format!("{}:{entry}", cx.token()));
    }
}

impl Controller for Recorder {
    fn initialized(&mut self, cx: &mut Context<'_>) {
        self.push(cx, "initialized");
    }

    fn connected(&mut self, cx: &mut Context<'_>) {
        self.push(cx, "connected");
    }

    fn disconnected(&mut self, cx: &mut Context<'_>) {
        self.push(cx, "disconnected");
    }

    fn property_changed(&mut self, cx: &mut Context<'_>, name: &str, old: &Value, new: &Value) {
        self.push(cx, format!("{name}={old}->{new}"));
    }

    fn target_connected(&mut self, cx: &mut Context<'_>, target_type: &str, _element: NodeId) {
        self.push(cx, format!("+{target_type}"));
    }

    fn target_disconnected(&mut self, cx: &mut Context<'_>, target_type: &str, _element: NodeId) {
        self.push(cx, format!("-{target_type}"));
    }
}

fn recorder(log: &Log) -> Definition<Recorder> {
    let log = Rc::clone(log);
    Definition::new(move || Recorder { log: Rc::clone(&log) })
}

fn drain(log: &Log) -> Vec<String> {
    std::mem::take(&mut *log.borrow_mut())
}

#[derive(Default)]
struct Plain;

impl Controller for Plain {}

#[derive(Default)]
struct Counter {
    clicks: u32,
    params: Params,
}

impl Controller for Counter {}

fn counter() -> Definition<Counter> {
    Definition::<Counter>::default()
        .property("count", 0)
        .action("increment", |counter: &mut Counter, cx, params, _event| {
            counter.clicks += 1;
            counter.params = params.clone();
            let count = cx.property_as::<i64>("count").unwrap_or_default();
            cx.set_property("count", count + 1);
        })
}

#[derive(Default)]
struct Menu {
    opened: u32,
}

impl Controller for Menu {}

fn menu() -> Definition<Menu> {
    Definition::<Menu>::default()
        .target("item")
        .action("open", |menu: &mut Menu, _cx, _params, _event| menu.opened += 1)
}

fn app_for(html: &str) -> Application {
    // RUST_LOG=tether=trace shows the connector at work
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    Application::new(tether_html::parse(html).expect("valid markup"))
}

fn by_id(app: &Application, id: &str) -> NodeId {
    app.document().get_element_by_id(id).expect("element with id")
}

fn click(app: &mut Application, id: &str) -> bool {
    let target = by_id(app, id);
    app.dispatch_event(target, Event::new("click"))
}

// ============================================================================
// SCENARIOS
// ============================================================================

#[test]
fn test_scenario_individual_attribute() -> anyhow::Result<()> {
    let mut app = app_for(r#"<div id="d" data-connect="dropdown" data-dropdown.open="true"></div>"#);
    app.register_controller("dropdown", Definition::<Plain>::default().property("open", false))?;
    app.connect();

    let id = app.get_controller(by_id(&app, "d"), "dropdown").expect("instance");
    assert_eq!(app.property(id, "open"), Some(&json!(true)));
    assert_eq!(app.property_as::<bool>(id, "open"), Some(true));
    Ok(())
}

#[test]
fn test_scenario_bulk_attribute_consumed() -> anyhow::Result<()> {
    let mut app = app_for(r#"<div id="h" data-connect="c" data-c='{"count":5}'></div>"#);
    app.register_controller("c", counter())?;
    app.connect();

    let host = by_id(&app, "h");
    let id = app.get_controller(host, "c").expect("instance");
    assert_eq!(app.property(id, "count"), Some(&json!(5)));
    assert!(!app.document().has_attribute(host, "data-c"));
    assert_eq!(app.document().get_attribute(host, "data-c.count"), Some("5"));
    Ok(())
}

#[test]
fn test_scenario_click_invokes_action() -> anyhow::Result<()> {
    let mut app = app_for(r#"<div id="h" data-connect="c"><button id="b" data-handler="c.increment">+</button></div>"#);
    app.register_controller("c", counter())?;
    app.connect();

    click(&mut app, "b");
    let id = app.get_controller(by_id(&app, "h"), "c").expect("instance");
    assert_eq!(app.controller::<Counter>(id).map(|c| c.clicks), Some(1));
    assert!(app.controller::<Counter>(id).is_some_and(|c| c.params.is_empty()));

    click(&mut app, "b");
    assert_eq!(app.controller::<Counter>(id).map(|c| c.clicks), Some(2));
    assert_eq!(app.property(id, "count"), Some(&json!(2)));
    assert_eq!(app.document().get_attribute(by_id(&app, "h"), "data-c.count"), Some("2"));
    Ok(())
}

#[test]
fn test_scenario_reinsert_preserves_identity() -> anyhow::Result<()> {
    let log = Log::default();
    let mut app = app_for(r#"<div id="h" data-connect="rec"></div>"#);
    app.register_controller("rec", recorder(&log))?;
    app.connect();
    assert_eq!(drain(&log), ["rec:initialized", "rec:connected"]);

    let host = by_id(&app, "h");
    let id = app.get_controller(host, "rec").expect("instance");

    app.document_mut().remove(host)?;
    app.flush();
    assert_eq!(drain(&log), ["rec:disconnected"]);
    assert!(!app.is_controller_connected(id));
    assert_eq!(app.get_controller(host, "rec"), Some(id));

    let body = app.document().body();
    app.document_mut().append_child(body, host)?;
    app.flush();
    assert_eq!(drain(&log), ["rec:connected"]);
    assert_eq!(app.get_controller(host, "rec"), Some(id));
    assert!(app.is_controller_connected(id));
    Ok(())
}

// ============================================================================
// PROPERTY SYNC
// ============================================================================

fn typed() -> Definition<Plain> {
    Definition::<Plain>::default()
        .property("label", "")
        .property("count", 0)
        .property("ratio", 0.5)
        .property("open", false)
        .property("items", json!([]))
        .property("meta", json!({}))
}

#[test]
fn test_defaults_leave_no_attributes() -> anyhow::Result<()> {
    let mut app = app_for(r#"<div id="h" data-connect="c"></div>"#);
    app.register_controller("c", typed())?;
    app.connect();

    let host = by_id(&app, "h");
    let id = app.get_controller(host, "c").expect("instance");
    for (name, default) in [
        ("label", json!("")),
        ("count", json!(0)),
        ("ratio", json!(0.5)),
        ("open", json!(false)),
        ("items", json!([])),
        ("meta", json!({})),
    ] {
        assert_eq!(app.property(id, name), Some(&default), "{name}");
        assert!(!app.document().has_attribute(host, &format!("data-c.{name}")), "{name}");
    }
    Ok(())
}

#[test]
fn test_values_round_trip_through_attributes() -> anyhow::Result<()> {
    let mut app = app_for(r#"<div id="h" data-connect="c"></div>"#);
    app.register_controller("c", typed())?;
    app.connect();

    let host = by_id(&app, "h");
    let id = app.get_controller(host, "c").expect("instance");
    for (name, default, value) in [
        ("label", json!(""), json!("hello world")),
        ("count", json!(0), json!(42)),
        ("ratio", json!(0.5), json!(1.25)),
        ("open", json!(false), json!(true)),
        ("items", json!([]), json!([1, "two", null])),
        ("meta", json!({}), json!({"a": {"b": [1, 2]}})),
    ] {
        assert!(app.set_property(id, name, value.clone()));
        let raw = app
            .document()
            .get_attribute(host, &format!("data-c.{name}"))
            .expect("synced attribute")
            .to_string();
        assert_eq!(codec::decode(&default, &raw), value, "{name}");

        app.flush();
        assert_eq!(app.property(id, name), Some(&value), "{name}");
    }
    Ok(())
}

#[test]
fn test_reset_to_default_removes_attribute() -> anyhow::Result<()> {
    let mut app = app_for(r#"<div id="h" data-connect="c"></div>"#);
    app.register_controller("c", typed())?;
    app.connect();

    let host = by_id(&app, "h");
    let id = app.get_controller(host, "c").expect("instance");
    app.set_property(id, "count", 3);
    app.set_property(id, "meta", json!({"k": 1}));
    assert!(app.document().has_attribute(host, "data-c.count"));

    app.set_property(id, "count", 0);
    app.set_property(id, "meta", json!({}));
    app.flush();
    assert!(!app.document().has_attribute(host, "data-c.count"));
    assert!(!app.document().has_attribute(host, "data-c.meta"));
    assert_eq!(app.property(id, "count"), Some(&json!(0)));
    Ok(())
}

#[test]
fn test_initial_value_precedence() -> anyhow::Result<()> {
    let mut app = app_for(
        r#"<div id="h" data-connect="panel" data-c.label="attr" data-c='{"label":"bulk","count":7}'></div>"#,
    );
    let overrides = json!({"label": "override", "count": 3, "size": 9})
        .as_object()
        .cloned()
        .expect("object");
    app.register_controller(
        "c",
        Definition::<Plain>::default()
            .property("label", "")
            .property("count", 0)
            .property("size", 0)
            .property("other", 1),
    )?;
    app.register_controller("panel", Definition::<Plain>::default().inject_with("c", overrides))?;
    app.connect();

    let host = by_id(&app, "h");
    let id = app.get_controller(host, "c").expect("injected instance");
    assert_eq!(app.property(id, "label"), Some(&json!("attr")));
    assert_eq!(app.property(id, "count"), Some(&json!(7)));
    assert_eq!(app.property(id, "size"), Some(&json!(9)));
    assert_eq!(app.property(id, "other"), Some(&json!(1)));

    assert!(!app.document().has_attribute(host, "data-c"));
    assert_eq!(app.document().get_attribute(host, "data-c.count"), Some("7"));
    assert_eq!(app.document().get_attribute(host, "data-c.size"), Some("9"));
    assert!(!app.document().has_attribute(host, "data-c.other"));
    Ok(())
}

#[test]
fn test_attribute_mutation_updates_property() -> anyhow::Result<()> {
    let log = Log::default();
    let mut app = app_for(r#"<div id="h" data-connect="rec"></div>"#);
    app.register_controller("rec", recorder(&log).property("count", 0))?;
    app.connect();
    drain(&log);

    let host = by_id(&app, "h");
    let id = app.get_controller(host, "rec").expect("instance");
    app.document_mut().set_attribute(host, "data-rec.count", "9")?;
    app.flush();
    assert_eq!(app.property(id, "count"), Some(&json!(9)));
    assert_eq!(drain(&log), ["rec:count=0->9"]);

    app.document_mut().remove_attribute(host, "data-rec.count")?;
    app.flush();
    assert_eq!(app.property(id, "count"), Some(&json!(0)));
    assert_eq!(drain(&log), ["rec:count=9->0"]);
    Ok(())
}

#[test]
fn test_bulk_attribute_reapplied_at_runtime() -> anyhow::Result<()> {
    let log = Log::default();
    let mut app = app_for(r#"<div id="h" data-connect="rec"></div>"#);
    app.register_controller("rec", recorder(&log).property("count", 0).property("label", ""))?;
    app.connect();
    drain(&log);

    let host = by_id(&app, "h");
    let id = app.get_controller(host, "rec").expect("instance");
    app.document_mut().set_attribute(host, "data-rec", r#"{"count":4}"#)?;
    app.flush();

    assert_eq!(app.property(id, "count"), Some(&json!(4)));
    assert_eq!(app.property(id, "label"), Some(&json!("")));
    assert_eq!(app.document().get_attribute(host, "data-rec.count"), Some("4"));
    assert!(!app.document().has_attribute(host, "data-rec"));
    assert_eq!(drain(&log), ["rec:count=0->4"]);
    Ok(())
}

#[test]
fn test_runtime_bulk_attribute_yields_to_individual_attribute() -> anyhow::Result<()> {
    let log = Log::default();
    let mut app = app_for(r#"<div id="h" data-connect="rec" data-rec.open=""></div>"#);
    app.register_controller("rec", recorder(&log).property("open", false).property("count", 0))?;
    app.connect();
    drain(&log);

    let host = by_id(&app, "h");
    let id = app.get_controller(host, "rec").expect("instance");
    assert_eq!(app.property(id, "open"), Some(&json!(true)));

    app.document_mut().set_attribute(host, "data-rec", r#"{"open": false, "count": 2}"#)?;
    app.flush();

    assert_eq!(app.property(id, "open"), Some(&json!(true)));
    assert_eq!(app.document().get_attribute(host, "data-rec.open"), Some(""));
    assert_eq!(app.property(id, "count"), Some(&json!(2)));
    assert!(!app.document().has_attribute(host, "data-rec"));
    assert_eq!(drain(&log), ["rec:count=0->2"]);
    Ok(())
}

#[derive(Default)]
struct AttributeSpy {
    seen: Vec<(String, Option<String>, Option<String>)>,
}

impl Controller for AttributeSpy {
    fn attribute_changed(&mut self, _cx: &mut Context<'_>, name: &str, old: Option<&str>, new: Option<&str>) {
        self.seen.push((name.to_string(), old.map(String::from), new.map(String::from)));
    }
}

#[test]
fn test_undeclared_attributes_pass_through() -> anyhow::Result<()> {
    let mut app = app_for(r#"<div id="h" data-connect="spy" title="a"></div>"#);
    app.register_controller("spy", Definition::<AttributeSpy>::default().property("level", 0))?;
    app.connect();

    let host = by_id(&app, "h");
    let id = app.get_controller(host, "spy").expect("instance");
    app.document_mut().set_attribute(host, "title", "b")?;
    app.document_mut().set_attribute(host, "data-spy.level", "2")?;
    app.flush();

    let seen = &app.controller::<AttributeSpy>(id).expect("spy").seen;
    assert_eq!(seen, &[("title".to_string(), Some("a".to_string()), Some("b".to_string()))]);
    assert_eq!(app.property(id, "level"), Some(&json!(2)));
    Ok(())
}

// ============================================================================
// HOST LIFECYCLE
// ============================================================================

#[test]
fn test_injected_tokens_come_first() -> anyhow::Result<()> {
    let log = Log::default();
    let mut app = app_for(r#"<div id="h" data-connect="panel"></div>"#);
    app.register_controller("base", recorder(&log))?;
    app.register_controller("panel", recorder(&log).inject("base"))?;
    app.connect();

    assert_eq!(
        drain(&log),
        ["base:initialized", "panel:initialized", "base:connected", "panel:connected"]
    );
    let host = by_id(&app, "h");
    let panel = app.get_controller(host, "panel").expect("panel");
    let base = app.get_controller(host, "base").expect("base");
    assert_eq!(app.injected(panel, "base"), Some(base));
    assert_eq!(app.document().get_attribute(host, "data-scope"), Some(" base panel "));
    Ok(())
}

#[test]
fn test_token_removed_from_attribute() -> anyhow::Result<()> {
    let log = Log::default();
    let mut app = app_for(r#"<div id="h" data-connect="a b"></div>"#);
    app.register_controller("a", recorder(&log))?;
    app.register_controller("b", recorder(&log))?;
    app.connect();
    drain(&log);

    let host = by_id(&app, "h");
    let first = app.get_controller(host, "a").expect("a");
    app.document_mut().set_attribute(host, "data-connect", "b")?;
    app.flush();
    assert_eq!(drain(&log), ["a:disconnected"]);
    assert_eq!(app.get_controller(host, "a"), None);
    assert_eq!(app.document().get_attribute(host, "data-scope"), Some(" b "));

    app.document_mut().set_attribute(host, "data-connect", "b a")?;
    app.flush();
    assert_eq!(drain(&log), ["a:initialized", "a:connected"]);
    let second = app.get_controller(host, "a").expect("a again");
    assert_ne!(first, second);
    assert_eq!(app.document().get_attribute(host, "data-scope"), Some(" b a "));
    Ok(())
}

#[test]
fn test_disconnect_and_reconnect_document() -> anyhow::Result<()> {
    let mut app = app_for(r#"<div id="h" data-connect="c"><button id="b" data-handler="c.increment"></button></div>"#);
    app.register_controller("c", counter())?;
    app.connect();
    let id = app.get_controller(by_id(&app, "h"), "c").expect("instance");
    assert_eq!(app.connected_controllers(), vec![id]);

    app.disconnect();
    assert!(!app.is_connected());
    assert!(app.connected_controllers().is_empty());
    click(&mut app, "b");
    assert_eq!(app.controller::<Counter>(id).map(|c| c.clicks), Some(0));

    app.connect();
    assert_eq!(app.connected_controllers(), vec![id]);
    click(&mut app, "b");
    assert_eq!(app.controller::<Counter>(id).map(|c| c.clicks), Some(1));
    Ok(())
}

#[test]
fn test_late_registration_connects_existing_hosts() -> anyhow::Result<()> {
    let log = Log::default();
    let mut app = app_for(r#"<div id="h" data-connect="late"><span id="t" data-connect="late.item"></span></div>"#);
    app.set_diagnostic_hook(|_| {});
    app.connect();
    assert_eq!(app.get_controller(by_id(&app, "h"), "late"), None);

    app.register_controller("late", recorder(&log).target("item"))?;
    let id = app.get_controller(by_id(&app, "h"), "late").expect("instance");
    assert!(app.is_controller_connected(id));
    assert_eq!(app.targets(id, "item"), [by_id(&app, "t")]);
    assert_eq!(drain(&log), ["late:initialized", "late:connected", "late:+item"]);
    Ok(())
}

#[test]
fn test_late_registration_keeps_nested_targets_inside() -> anyhow::Result<()> {
    let log = Log::default();
    let mut app = app_for(
        r#"<div id="o" data-connect="late">
             <div id="i" data-connect="late"><span id="t" data-connect="late.item"></span></div>
           </div>"#,
    );
    app.set_diagnostic_hook(|_| {});
    app.connect();

    app.register_controller("late", recorder(&log).target("item"))?;
    let outer = app.get_controller(by_id(&app, "o"), "late").expect("outer instance");
    let inner = app.get_controller(by_id(&app, "i"), "late").expect("inner instance");

    assert!(app.targets(outer, "item").is_empty());
    assert_eq!(app.targets(inner, "item"), [by_id(&app, "t")]);
    assert_eq!(
        drain(&log),
        ["late:initialized", "late:connected", "late:initialized", "late:connected", "late:+item"]
    );
    Ok(())
}

#[test]
fn test_custom_element_declares_token() -> anyhow::Result<()> {
    let config = tether::Config {
        custom_element_prefix: Some("x-".to_string()),
        ..tether::Config::default()
    };
    let document = tether_html::parse(r#"<x-menu id="m"><li data-connect="menu.item"></li></x-menu>"#)?;
    let mut app = Application::with_config(document, config)?;
    app.register_controller("menu", menu())?;
    app.connect();

    let id = app.get_controller(by_id(&app, "m"), "menu").expect("custom element host");
    assert_eq!(app.targets(id, "item").len(), 1);
    Ok(())
}

#[test]
fn test_release_detached_host() -> anyhow::Result<()> {
    let mut app = app_for(r#"<div id="h" data-connect="c"></div>"#);
    app.register_controller("c", counter())?;
    app.connect();

    let host = by_id(&app, "h");
    assert_eq!(app.release(host), 0);

    app.document_mut().remove(host)?;
    assert_eq!(app.release(host), 1);
    assert_eq!(app.get_controller(host, "c"), None);
    assert!(app.controllers_on(host).is_empty());
    Ok(())
}

// ============================================================================
// TARGETS AND SCOPE
// ============================================================================

#[test]
fn test_targets_in_connection_order() -> anyhow::Result<()> {
    let mut app = app_for(
        r#"<ul id="m" data-connect="menu">
            <li id="a" data-connect="menu.item"></li>
            <li id="b" data-connect="menu.item"></li>
        </ul>"#,
    );
    app.register_controller("menu", menu())?;
    app.connect();

    let id = app.get_controller(by_id(&app, "m"), "menu").expect("instance");
    assert_eq!(app.targets(id, "item"), [by_id(&app, "a"), by_id(&app, "b")]);
    assert_eq!(app.target(id, "item"), Some(by_id(&app, "a")));
    assert_eq!(app.target(id, "missing"), None);
    Ok(())
}

#[test]
fn test_nearest_host_owns_target() -> anyhow::Result<()> {
    let mut app = app_for(
        r#"<div id="outer" data-connect="menu">
            <div id="inner" data-connect="menu">
                <span id="t" data-connect="menu.item"></span>
            </div>
        </div>"#,
    );
    app.register_controller("menu", menu())?;
    app.connect();

    let outer = app.get_controller(by_id(&app, "outer"), "menu").expect("outer");
    let inner = app.get_controller(by_id(&app, "inner"), "menu").expect("inner");
    assert!(app.targets(outer, "item").is_empty());
    assert_eq!(app.targets(inner, "item"), [by_id(&app, "t")]);
    Ok(())
}

#[test]
fn test_new_inner_host_claims_targets() -> anyhow::Result<()> {
    let log = Log::default();
    let mut app = app_for(
        r#"<div id="outer" data-connect="list">
            <div id="inner"><span id="t" data-connect="list.item"></span></div>
        </div>"#,
    );
    app.register_controller("list", recorder(&log).target("item"))?;
    app.connect();
    drain(&log);

    let outer = app.get_controller(by_id(&app, "outer"), "list").expect("outer");
    let inner_el = by_id(&app, "inner");
    app.document_mut().set_attribute(inner_el, "data-connect", "list")?;
    app.flush();

    let inner = app.get_controller(inner_el, "list").expect("inner");
    assert_eq!(drain(&log), ["list:initialized", "list:connected", "list:-item", "list:+item"]);
    assert!(app.targets(outer, "item").is_empty());
    assert_eq!(app.targets(inner, "item"), [by_id(&app, "t")]);

    // Dropping the inner token hands the target back
    app.document_mut().remove_attribute(inner_el, "data-connect")?;
    app.flush();
    assert_eq!(drain(&log), ["list:-item", "list:disconnected", "list:+item"]);
    assert_eq!(app.targets(outer, "item"), [by_id(&app, "t")]);
    assert_eq!(app.get_controller(inner_el, "list"), None);
    Ok(())
}

#[test]
fn test_host_role_becomes_target_role() -> anyhow::Result<()> {
    let log = Log::default();
    let mut app = app_for(r#"<div id="outer" data-connect="list"><div id="x" data-connect="list"></div></div>"#);
    app.register_controller("list", recorder(&log).target("item"))?;
    app.connect();
    drain(&log);

    let x = by_id(&app, "x");
    app.document_mut().set_attribute(x, "data-connect", "list.item")?;
    app.flush();

    assert_eq!(drain(&log), ["list:disconnected", "list:+item"]);
    assert_eq!(app.get_controller(x, "list"), None);
    assert!(!app.document().has_attribute(x, "data-scope"));
    let outer = app.get_controller(by_id(&app, "outer"), "list").expect("outer");
    assert_eq!(app.targets(outer, "item"), [x]);
    Ok(())
}

#[test]
fn test_target_moves_between_hosts() -> anyhow::Result<()> {
    let log = Log::default();
    let mut app = app_for(
        r#"<div id="a" data-connect="list"><span id="t" data-connect="list.item"></span></div>
           <div id="b" data-connect="list"></div>"#,
    );
    app.register_controller("list", recorder(&log).target("item"))?;
    app.connect();
    drain(&log);

    let (a, b, t) = (by_id(&app, "a"), by_id(&app, "b"), by_id(&app, "t"));
    app.document_mut().remove(t)?;
    app.document_mut().append_child(b, t)?;
    app.flush();

    assert_eq!(drain(&log), ["list:-item", "list:+item"]);
    let first = app.get_controller(a, "list").expect("a");
    let second = app.get_controller(b, "list").expect("b");
    assert!(app.targets(first, "item").is_empty());
    assert_eq!(app.targets(second, "item"), [t]);
    Ok(())
}

#[test]
fn test_removal_tears_down_targets_before_hosts() -> anyhow::Result<()> {
    let log = Log::default();
    let mut app = app_for(
        r#"<section id="root">
            <div data-connect="outer">
                <div data-connect="inner"><span data-connect="inner.item outer.item"></span></div>
            </div>
        </section>"#,
    );
    app.register_controller("outer", recorder(&log).target("item"))?;
    app.register_controller("inner", recorder(&log).target("item"))?;
    app.connect();
    drain(&log);

    let root = by_id(&app, "root");
    app.document_mut().remove(root)?;
    app.flush();
    assert_eq!(
        drain(&log),
        ["inner:-item", "outer:-item", "inner:disconnected", "outer:disconnected"]
    );
    Ok(())
}

// ============================================================================
// ORPHANS
// ============================================================================

#[test]
fn test_remote_target_waits_for_host() -> anyhow::Result<()> {
    let log = Log::default();
    let mut app = app_for(r#"<span id="t" data-connect="menu.item#main"></span>"#);
    app.register_controller("menu", recorder(&log).target("item"))?;
    app.connect();
    assert!(drain(&log).is_empty());

    let nav = app.document_mut().create_element("nav");
    app.document_mut().set_attribute(nav, "id", "main")?;
    app.document_mut().set_attribute(nav, "data-connect", "menu")?;
    let body = app.document().body();
    app.document_mut().append_child(body, nav)?;
    app.flush();

    let id = app.get_controller(nav, "menu").expect("instance");
    let t = by_id(&app, "t");
    assert_eq!(drain(&log), ["menu:initialized", "menu:connected", "menu:+item"]);
    assert_eq!(app.targets(id, "item"), [t]);

    app.document_mut().remove(nav)?;
    app.flush();
    assert_eq!(drain(&log), ["menu:-item", "menu:disconnected"]);
    assert!(app.targets(id, "item").is_empty());

    // Still waiting: the same host coming back picks it up again
    app.document_mut().append_child(body, nav)?;
    app.flush();
    assert_eq!(drain(&log), ["menu:connected", "menu:+item"]);
    assert_eq!(app.targets(id, "item"), [t]);
    Ok(())
}

#[test]
fn test_remote_action_waits_for_host() -> anyhow::Result<()> {
    let mut app = app_for(r#"<button id="b" data-handler="menu.open#main"></button>"#);
    app.register_controller("menu", menu())?;
    app.connect();
    click(&mut app, "b");

    let fragment = tether_html::parse_fragment(app.document_mut(), r#"<nav id="main" data-connect="menu"></nav>"#)?;
    let nav = fragment[0];
    let body = app.document().body();
    app.document_mut().append_child(body, nav)?;
    app.flush();

    let id = app.get_controller(nav, "menu").expect("instance");
    click(&mut app, "b");
    assert_eq!(app.controller::<Menu>(id).map(|m| m.opened), Some(1));

    app.document_mut().remove(nav)?;
    app.flush();
    click(&mut app, "b");
    assert_eq!(app.controller::<Menu>(id).map(|m| m.opened), Some(1));

    app.document_mut().append_child(body, nav)?;
    app.flush();
    click(&mut app, "b");
    assert_eq!(app.controller::<Menu>(id).map(|m| m.opened), Some(2));
    Ok(())
}

#[test]
fn test_host_gains_id_later() -> anyhow::Result<()> {
    let mut app = app_for(
        r#"<nav id="n" data-connect="menu"></nav>
           <span id="t" data-connect="menu.item#late"></span>"#,
    );
    app.register_controller("menu", menu())?;
    app.connect();

    let nav = by_id(&app, "n");
    let id = app.get_controller(nav, "menu").expect("instance");
    assert!(app.targets(id, "item").is_empty());

    app.document_mut().set_attribute(nav, "id", "late")?;
    app.flush();
    assert_eq!(app.targets(id, "item"), [by_id(&app, "t")]);
    Ok(())
}

// ============================================================================
// ACTIONS
// ============================================================================

#[test]
fn test_once_fires_a_single_time() -> anyhow::Result<()> {
    let mut app = app_for(r#"<div id="h" data-connect="c"><button id="b" data-handler="click[once]->c.increment"></button></div>"#);
    app.register_controller("c", counter())?;
    app.connect();

    for _ in 0..3 {
        click(&mut app, "b");
    }
    let id = app.get_controller(by_id(&app, "h"), "c").expect("instance");
    assert_eq!(app.controller::<Counter>(id).map(|c| c.clicks), Some(1));
    Ok(())
}

#[test]
fn test_prevent_and_stop() -> anyhow::Result<()> {
    let mut app = app_for(
        r#"<div id="outer"><div id="h" data-connect="c">
            <button id="b" data-handler="click[prevent stop]->c.increment"></button>
        </div></div>"#,
    );
    app.register_controller("c", counter())?;
    app.connect();

    let reached = Rc::new(RefCell::new(0));
    let seen = Rc::clone(&reached);
    let outer = by_id(&app, "outer");
    app.add_event_listener(outer, "click", ListenerOptions::default(), move |_doc, _event| {
        *seen.borrow_mut() += 1;
    });

    assert!(!click(&mut app, "b"));
    assert_eq!(*reached.borrow(), 0);

    let id = app.get_controller(by_id(&app, "h"), "c").expect("instance");
    assert_eq!(app.controller::<Counter>(id).map(|c| c.clicks), Some(1));
    Ok(())
}

#[test]
fn test_keyboard_filters() -> anyhow::Result<()> {
    let mut app = app_for(
        r#"<div id="h" data-connect="c">
            <input id="enter" data-handler="keydown.enter->c.increment">
            <input id="save" data-handler="keydown.ctrl+s->c.increment">
        </div>"#,
    );
    app.register_controller("c", counter())?;
    app.connect();
    let id = app.get_controller(by_id(&app, "h"), "c").expect("instance");
    let clicks = |app: &Application| app.controller::<Counter>(id).map(|c| c.clicks);

    let enter = by_id(&app, "enter");
    app.dispatch_event(enter, Event::keyboard("keydown", "a"));
    assert_eq!(clicks(&app), Some(0));
    app.dispatch_event(enter, Event::keyboard("keydown", "Enter"));
    assert_eq!(clicks(&app), Some(1));

    let save = by_id(&app, "save");
    app.dispatch_event(save, Event::keyboard("keydown", "s"));
    assert_eq!(clicks(&app), Some(1));
    let ctrl = Modifiers {
        ctrl: true,
        ..Modifiers::default()
    };
    app.dispatch_event(save, Event::keyboard("keydown", "S").with_modifiers(ctrl));
    assert_eq!(clicks(&app), Some(2));
    Ok(())
}

#[test]
fn test_action_parameters() -> anyhow::Result<()> {
    let mut app = app_for(
        r#"<div id="h" data-connect="c">
            <button id="b" data-handler="c.increment"
                    data-c.increment='{"step":2,"label":"bulk"}'
                    data-c.increment.label="single"
                    data-c.increment.by-amount="5"></button>
        </div>"#,
    );
    app.register_controller("c", counter())?;
    app.connect();
    click(&mut app, "b");

    let id = app.get_controller(by_id(&app, "h"), "c").expect("instance");
    let params = &app.controller::<Counter>(id).expect("counter").params;
    assert_eq!(params.get("step"), Some(&json!(2)));
    assert_eq!(params.get("label"), Some(&json!("single")));
    assert_eq!(params.get("byAmount"), Some(&json!(5)));
    Ok(())
}

#[test]
fn test_inferred_events_by_tag() -> anyhow::Result<()> {
    let mut app = app_for(
        r#"<form id="h" data-connect="c" data-handler="c.increment">
            <select id="s" data-handler="c.increment"></select>
        </form>"#,
    );
    app.register_controller("c", counter())?;
    app.connect();
    let id = app.get_controller(by_id(&app, "h"), "c").expect("instance");

    click(&mut app, "h");
    assert_eq!(app.controller::<Counter>(id).map(|c| c.clicks), Some(0));

    let form = by_id(&app, "h");
    app.dispatch_event(form, Event::new("submit"));
    assert_eq!(app.controller::<Counter>(id).map(|c| c.clicks), Some(1));

    let select = by_id(&app, "s");
    app.dispatch_event(select, Event::new("change").non_bubbling());
    assert_eq!(app.controller::<Counter>(id).map(|c| c.clicks), Some(2));
    Ok(())
}

#[derive(Default)]
struct Tabs {
    seen: usize,
}

impl Controller for Tabs {}

#[test]
fn test_actions_read_targets_through_context() -> anyhow::Result<()> {
    let mut app = app_for(
        r#"<div id="h" data-connect="tabs">
            <a data-connect="tabs.tab"></a><a data-connect="tabs.tab"></a>
            <button id="b" data-handler="tabs.count"></button>
        </div>"#,
    );
    app.register_controller(
        "tabs",
        Definition::<Tabs>::default()
            .target("tab")
            .action("count", |tabs: &mut Tabs, cx, _params, _event| {
                tabs.seen = cx.targets("tab").len();
            }),
    )?;
    app.connect();
    click(&mut app, "b");

    let id = app.get_controller(by_id(&app, "h"), "tabs").expect("instance");
    assert_eq!(app.controller::<Tabs>(id).map(|t| t.seen), Some(2));
    Ok(())
}

// ============================================================================
// SELECTOR CALLBACKS
// ============================================================================

#[test]
fn test_selector_callbacks() -> anyhow::Result<()> {
    let mut app = app_for(r#"<p id="a" class="fancy"></p><p id="b"></p>"#);
    let seen: Rc<RefCell<Vec<NodeId>>> = Rc::default();
    let sink = Rc::clone(&seen);
    app.register_selector_callback(".fancy", move |_doc, element| sink.borrow_mut().push(element))?;
    assert!(seen.borrow().is_empty());

    app.connect();
    assert_eq!(*seen.borrow(), [by_id(&app, "a")]);

    let added = app.document_mut().create_element("p");
    app.document_mut().set_attribute(added, "class", "fancy")?;
    let body = app.document().body();
    app.document_mut().append_child(body, added)?;
    app.flush();
    assert_eq!(seen.borrow().len(), 2);

    app.document_mut().remove(added)?;
    app.flush();
    assert_eq!(seen.borrow().len(), 2);

    let late: Rc<RefCell<usize>> = Rc::default();
    let counter = Rc::clone(&late);
    app.register_selector_callback("p", move |_doc, _element| *counter.borrow_mut() += 1)?;
    assert_eq!(*late.borrow(), 2);
    Ok(())
}

// ============================================================================
// DIAGNOSTICS
// ============================================================================

#[test]
fn test_diagnostics_are_reported() -> anyhow::Result<()> {
    let mut app = app_for(
        r#"<div id="g" data-connect="ghost"></div>
           <div id="h" data-connect="c">
               <span id="bad" data-connect="c."></span>
               <span id="u" data-connect="c.bogus"></span>
               <button id="m" data-handler="c.nope"></button>
           </div>
           <button id="out" data-handler="c.increment"></button>"#,
    );
    let reported: Rc<RefCell<Vec<Diagnostic>>> = Rc::default();
    let sink = Rc::clone(&reported);
    app.set_diagnostic_hook(move |diagnostic| sink.borrow_mut().push(diagnostic.clone()));
    app.register_controller("c", counter())?;
    app.connect();
    click(&mut app, "m");
    click(&mut app, "out");

    let reported = reported.borrow();
    let expected = [
        Diagnostic::UnknownController {
            token: "ghost".into(),
            element: by_id(&app, "g"),
        },
        Diagnostic::MalformedDescriptor {
            attribute: "data-connect".into(),
            descriptor: "c.".into(),
            element: by_id(&app, "bad"),
        },
        Diagnostic::UndeclaredTarget {
            token: "c".into(),
            target_type: "bogus".into(),
            element: by_id(&app, "u"),
        },
        Diagnostic::MissingAction {
            token: "c".into(),
            method: "nope".into(),
            element: by_id(&app, "m"),
        },
        Diagnostic::UnresolvedAction {
            descriptor: "c.increment".into(),
            element: by_id(&app, "out"),
        },
    ];
    for diagnostic in &expected {
        assert!(reported.contains(diagnostic), "missing {diagnostic}");
    }
    assert_eq!(reported.len(), expected.len());
    Ok(())
}
