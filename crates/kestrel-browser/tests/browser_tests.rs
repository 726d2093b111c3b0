//! Integration tests for tabs, the commit protocol and the compositor.

use std::sync::Arc;
use std::time::Duration;

use kestrel_browser::css::{ItemKind, Selector};
use kestrel_browser::dom::{DomTree, Fragment, NodeId, PropertyMap};
use kestrel_browser::{
    Browser, DomEvent, Document, FetchError, FontCache, HostError, LoadError, ScriptEngine,
    ScriptError, ScriptHost, TabId,
};
use kestrel_common::Settings;
use parking_lot::Mutex;
use url::Url;

const WAIT: Duration = Duration::from_secs(5);

fn settings(refresh_interval_ms: u64) -> Settings {
    Settings {
        refresh_interval_ms,
        ..Settings::default()
    }
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn browser_with_tab(refresh_interval_ms: u64) -> (Browser, TabId) {
    init_logging();
    let mut browser = Browser::with_fonts(settings(refresh_interval_ms), FontCache::empty());
    let tab = browser.new_tab(None).unwrap();
    (browser, tab)
}

fn tree_from_json(json: &str) -> DomTree {
    let fragment: Fragment = serde_json::from_str(json).unwrap();
    DomTree::from_fragment(&fragment)
}

fn document(url: &str, json: &str) -> Document {
    Document::new(Url::parse(url).unwrap(), tree_from_json(json))
}

fn find(tree: &DomTree, tag: &str) -> NodeId {
    tree.iter_all()
        .find(|&id| tree.tag_name(id) == Some(tag))
        .unwrap()
}

/// Draw frames until the compositor shows `url`.
fn render_until_url(browser: &Browser, url: &str) -> tiny_skia::Pixmap {
    let mut surface = browser.new_surface().unwrap();
    for _ in 0..50 {
        let _ = browser.render_frame(&mut surface, WAIT);
        if browser.compositor().url().is_some_and(|u| u.as_str() == url) {
            let _ = browser.compositor().composite_raster_and_draw(&mut surface);
            return surface;
        }
    }
    panic!("{url} was never committed");
}

const FORM_PAGE: &str = r#"{ "tag": "html", "children": [
    { "tag": "body", "children": [
        { "tag": "form", "attributes": { "action": "/submit" }, "children": [
            { "tag": "input", "attributes": { "name": "q", "value": "hi" } },
            { "tag": "button", "children": ["Go"] }
        ]},
        { "tag": "a", "attributes": { "href": "/next" }, "children": ["next"] }
    ]}
]}"#;

#[derive(Default)]
struct Recorded {
    scripts: Vec<String>,
    events: Vec<(DomEvent, NodeId)>,
}

/// Records what the tab asks of it. `run` tags every `p` with the script
/// source, and the source `throw` fails.
struct RecordingEngine {
    log: Arc<Mutex<Recorded>>,
    prevent_default: bool,
}

impl ScriptEngine for RecordingEngine {
    fn run(&mut self, url: &str, source: &str, host: &mut dyn ScriptHost) -> Result<(), ScriptError> {
        self.log.lock().scripts.push(url.to_string());
        if source == "throw" {
            return Err(ScriptError("boom".to_string()));
        }
        for node in host.query_selector_all(&Selector::tag("p")) {
            host.set_attribute(node, "data-script", source)
                .map_err(|err| ScriptError(err.to_string()))?;
        }
        Ok(())
    }

    fn dispatch_event(&mut self, event: DomEvent, target: NodeId, _host: &mut dyn ScriptHost) -> bool {
        self.log.lock().events.push((event, target));
        !self.prevent_default
    }

    fn run_animation_frame(&mut self, _host: &mut dyn ScriptHost) {}

    fn dispatch_timeout(&mut self, _callback: u64, _host: &mut dyn ScriptHost) {}
}

#[test]
fn test_first_tab_becomes_active() {
    let (browser, tab) = browser_with_tab(5);
    assert_eq!(browser.compositor().active_tab(), Some(tab));
}

#[test]
fn test_render_frame_draws_committed_document() {
    let (browser, _) = browser_with_tab(5);
    let _ = browser
        .load(document(
            "http://a.test/",
            r#"{ "tag": "html", "children": [
                { "tag": "body", "children": [
                    { "tag": "div", "style": { "background-color": "red" }, "children": ["hello"] }
                ]}
            ]}"#,
        ))
        .unwrap();
    let surface = render_until_url(&browser, "http://a.test/");

    let inside = surface.pixel(20, 22).unwrap();
    assert_eq!((inside.red(), inside.green(), inside.blue()), (255, 0, 0));
    let outside = surface.pixel(5, 5).unwrap();
    assert_eq!((outside.red(), outside.green(), outside.blue()), (255, 255, 255));
}

#[test]
fn test_commit_from_inactive_tab_is_dropped() {
    init_logging();
    let mut browser = Browser::with_fonts(settings(5), FontCache::empty());
    let first = browser.new_tab(None).unwrap();
    let second = browser.new_tab(None).unwrap();

    browser
        .with_tab(first, |tab| {
            let _ = tab.load(document("http://a.test/", r#"{ "tag": "html" }"#));
            tab.run_animation_frame(0.0);
        })
        .unwrap();
    assert_eq!(browser.compositor().url().unwrap().as_str(), "http://a.test/");

    browser
        .with_tab(second, |tab| {
            let _ = tab.load(document("http://b.test/", r#"{ "tag": "html" }"#));
            tab.run_animation_frame(0.0);
        })
        .unwrap();
    assert_eq!(browser.compositor().url().unwrap().as_str(), "http://a.test/");

    browser.set_active_tab(second);
    let _ = render_until_url(&browser, "http://b.test/");
    assert_eq!(browser.compositor().active_tab(), Some(second));
}

#[test]
fn test_load_skips_resources_blocked_by_csp() {
    let (browser, _) = browser_with_tab(5);
    let doc = document("http://a.test/", r#"{ "tag": "html" }"#)
        .with_header("Content-Security-Policy", "default-src http://a.test")
        .with_script("/ok.js", Ok("ok".to_string()))
        .with_script("http://evil.test/x.js", Ok("bad".to_string()))
        .with_linked_stylesheet("/missing.css", Err(FetchError("404".to_string())));

    let report = browser.load(doc).unwrap();

    assert_eq!(report.skipped.len(), 2);
    assert!(
        report
            .skipped
            .iter()
            .any(|err| matches!(err, LoadError::BlockedByCsp { url } if url.host_str() == Some("evil.test")))
    );
    assert!(
        report
            .skipped
            .iter()
            .any(|err| matches!(err, LoadError::Fetch { .. }))
    );
}

#[test]
fn test_scripts_run_in_order_after_load() {
    init_logging();
    let log = Arc::new(Mutex::new(Recorded::default()));
    let mut browser = Browser::with_fonts(settings(5), FontCache::empty());
    let engine = RecordingEngine {
        log: Arc::clone(&log),
        prevent_default: false,
    };
    let _ = browser.new_tab(Some(Box::new(engine))).unwrap();

    let doc = document(
        "http://a.test/",
        r#"{ "tag": "html", "children": [ { "tag": "p", "children": ["x"] } ] }"#,
    )
    .with_script("/one.js", Ok("throw".to_string()))
    .with_script("/two.js", Ok("second".to_string()));
    let _ = browser.load(doc).unwrap();

    let tagged = browser
        .with_active_tab(|tab| {
            let p = find(tab.dom(), "p");
            tab.get_attribute(p, "data-script")
        })
        .unwrap();

    assert_eq!(tagged, Ok(Some("second".to_string())));
    assert_eq!(
        log.lock().scripts,
        vec!["http://a.test/one.js".to_string(), "http://a.test/two.js".to_string()]
    );
}

#[test]
fn test_removed_node_handle_is_stale() {
    let (browser, _) = browser_with_tab(5);
    let _ = browser
        .load(document(
            "http://a.test/",
            r#"{ "tag": "html", "children": [
                { "tag": "div", "children": [ { "tag": "p", "attributes": { "id": "old" } } ] }
            ]}"#,
        ))
        .unwrap();

    let (old, new) = browser
        .with_active_tab(|tab| {
            let div = find(tab.dom(), "div");
            let p = find(tab.dom(), "p");
            tab.set_inner_content(div, &[Fragment::element("p", Vec::new())])
                .unwrap();
            let fresh = find(tab.dom(), "p");
            (tab.get_attribute(p, "id"), tab.get_attribute(fresh, "id"))
        })
        .unwrap();

    assert!(matches!(old, Err(HostError::StaleNode(_))));
    assert_eq!(new, Ok(None));
}

#[test]
fn test_check_request_enforces_origin_and_csp() {
    let (browser, _) = browser_with_tab(5);
    let doc = document("http://a.test/dir/", r#"{ "tag": "html" }"#)
        .with_header("content-security-policy", "default-src http://a.test http://cdn.test");
    let _ = browser.load(doc).unwrap();

    let (same, cross, blocked) = browser
        .with_active_tab(|tab| {
            (
                tab.check_request("data.json"),
                tab.check_request("http://cdn.test/data.json"),
                tab.check_request("http://evil.test/data.json"),
            )
        })
        .unwrap();

    assert_eq!(same.unwrap().as_str(), "http://a.test/dir/data.json");
    assert!(matches!(cross, Err(HostError::CrossOrigin { .. })));
    assert!(matches!(blocked, Err(HostError::BlockedByCsp { .. })));
}

#[test]
fn test_click_focuses_input_and_typing_fills_it() {
    let (browser, _) = browser_with_tab(5);
    let _ = browser.load(document("http://a.test/", FORM_PAGE)).unwrap();

    let (focus, input, value) = browser
        .with_active_tab(|tab| {
            tab.render();
            let input = find(tab.dom(), "input");
            let layout = tab.layout_tree();
            let rect = layout.get(layout.box_for_node(input).unwrap()).unwrap().rect();
            tab.click(rect.x + 2.0, rect.y + 2.0);
            tab.key_press('o');
            tab.key_press('k');
            let value = tab.get_attribute(input, "value").unwrap();
            (tab.focus(), input, value)
        })
        .unwrap();

    assert_eq!(focus, Some(input));
    assert_eq!(value.as_deref(), Some("ok"));
}

#[test]
fn test_advance_focus_follows_tabindex_then_tree_order() {
    let (browser, _) = browser_with_tab(5);
    let _ = browser
        .load(document(
            "http://a.test/",
            r#"{ "tag": "html", "children": [
                { "tag": "a", "attributes": { "href": "/a" }, "children": ["a"] },
                { "tag": "button", "children": ["b"] },
                { "tag": "input", "attributes": { "tabindex": "1" } },
                { "tag": "div", "attributes": { "tabindex": "-1" } }
            ]}"#,
        ))
        .unwrap();

    let order = browser
        .with_active_tab(|tab| {
            let mut order = Vec::new();
            for _ in 0..4 {
                tab.advance_focus();
                order.push(tab.focus().and_then(|n| tab.dom().tag_name(n).map(str::to_string)));
            }
            order
        })
        .unwrap();

    assert_eq!(
        order,
        vec![
            Some("input".to_string()),
            Some("a".to_string()),
            Some("button".to_string()),
            None,
        ]
    );
}

#[test]
fn test_enter_on_button_submits_form() {
    let (browser, tab_id) = browser_with_tab(5);
    let _ = browser.load(document("http://a.test/page", FORM_PAGE)).unwrap();

    browser
        .with_active_tab(|tab| {
            tab.advance_focus();
            tab.advance_focus();
            tab.enter();
        })
        .unwrap();

    let navigations = browser.compositor().take_navigations();
    assert_eq!(navigations.len(), 1);
    assert_eq!(navigations[0].tab, tab_id);
    assert_eq!(navigations[0].url.as_str(), "http://a.test/submit");
    assert_eq!(navigations[0].body.as_deref(), Some("q=hi"));
}

#[test]
fn test_click_on_link_requests_navigation() {
    let (browser, _) = browser_with_tab(5);
    let _ = browser.load(document("http://a.test/page", FORM_PAGE)).unwrap();

    browser
        .with_active_tab(|tab| {
            tab.render();
            let a = find(tab.dom(), "a");
            let text = tab.dom().children(a)[0];
            let layout = tab.layout_tree();
            let rect = layout.get(layout.box_for_node(text).unwrap()).unwrap().rect();
            tab.click(rect.x + 1.0, rect.y + 1.0);
        })
        .unwrap();

    let navigations = browser.compositor().take_navigations();
    assert_eq!(navigations.len(), 1);
    assert_eq!(navigations[0].url.as_str(), "http://a.test/next");
    assert_eq!(navigations[0].body, None);
}

#[test]
fn test_prevented_click_does_not_focus() {
    init_logging();
    let log = Arc::new(Mutex::new(Recorded::default()));
    let mut browser = Browser::with_fonts(settings(5), FontCache::empty());
    let engine = RecordingEngine {
        log: Arc::clone(&log),
        prevent_default: true,
    };
    let _ = browser.new_tab(Some(Box::new(engine))).unwrap();
    let _ = browser.load(document("http://a.test/", FORM_PAGE)).unwrap();

    let (focus, input) = browser
        .with_active_tab(|tab| {
            tab.render();
            let input = find(tab.dom(), "input");
            let layout = tab.layout_tree();
            let rect = layout.get(layout.box_for_node(input).unwrap()).unwrap().rect();
            tab.click(rect.x + 2.0, rect.y + 2.0);
            (tab.focus(), input)
        })
        .unwrap();

    assert_eq!(focus, None);
    assert_eq!(log.lock().events, vec![(DomEvent::Click, input)]);
}

#[test]
fn test_opacity_transition_commits_paint_only_updates() {
    // A long refresh interval keeps the frame timer out of the way; frames
    // are driven by hand.
    let (browser, _) = browser_with_tab(1000);
    let page = r#"{ "tag": "html", "children": [
        { "tag": "div", "style": { "opacity": "1", "transition": "opacity 10s" }, "children": ["fade"] }
    ]}"#;

    let div = browser
        .with_active_tab(move |tab| {
            let _ = tab.load(document("http://a.test/", page));
            tab.run_animation_frame(0.0);
            let div = find(tab.dom(), "div");
            let style: PropertyMap = [("opacity", "0.5"), ("transition", "opacity 10s")]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            tab.set_inline_style(div, style).unwrap();
            // Starts the transition, then the first step recomposites
            // because the layer was not isolated yet, then paint only.
            tab.run_animation_frame(0.0);
            tab.run_animation_frame(0.0);
            tab.run_animation_frame(0.0);
            div
        })
        .unwrap();

    let opacity_of = |items: &[kestrel_browser::css::DisplayItem]| {
        items.iter().find_map(|item| match item.kind {
            ItemKind::SaveLayer { node, opacity, .. } if node == div => Some(opacity),
            _ => None,
        })
    };

    let compositor = browser.compositor();
    let mut surface = browser.new_surface().unwrap();
    let _ = compositor.composite_raster_and_draw(&mut surface);

    let committed = opacity_of(compositor.display_list().items()).unwrap();
    let drawn = opacity_of(compositor.draw_list().items()).unwrap();
    assert!(committed < 1.0);
    assert!(drawn < committed);
    assert!(drawn > 0.5);
}

#[test]
fn test_scroll_by_is_clamped_to_document() {
    let (browser, _) = browser_with_tab(5);
    let _ = browser
        .load(document(
            "http://a.test/",
            r#"{ "tag": "html", "children": ["short"] }"#,
        ))
        .unwrap();
    let _ = render_until_url(&browser, "http://a.test/");

    browser.scroll_by(500.0);

    assert!(browser.compositor().scroll().abs() < f32::EPSILON);
}

#[test]
fn test_frame_after_input_render_ships_the_display_list() {
    let (browser, _) = browser_with_tab(1000);
    let doc = document(
        "http://a.test/",
        r#"{ "tag": "html", "children": [
            { "tag": "body", "children": [ { "tag": "p", "children": ["hello world"] } ] }
        ]}"#,
    );
    let painted = browser
        .with_active_tab(move |tab| {
            let _ = tab.load(doc);
            tab.scroll_by(0.0);
            tab.run_animation_frame(0.0);
            tab.display_list().len()
        })
        .unwrap();

    assert!(painted > 0);
    assert_eq!(browser.compositor().display_list().len(), painted);
    let mut surface = browser.new_surface().unwrap();
    assert!(browser.compositor().composite_raster_and_draw(&mut surface));
    assert!(!browser.compositor().layer_items().is_empty());
}

#[test]
fn test_switching_tabs_keeps_a_single_frame_timer() {
    init_logging();
    let mut browser = Browser::with_fonts(settings(200), FontCache::empty());
    let _ = browser.new_tab(None).unwrap();
    let second = browser.new_tab(None).unwrap();
    browser.set_active_tab(second);

    std::thread::sleep(Duration::from_millis(1000));
    assert_eq!(browser.compositor().active_tab(), Some(second));
    assert_eq!(browser.compositor().commit_count(), 1);
}
