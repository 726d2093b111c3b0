//! Integration tests for block stacking and line breaking.

use kestrel_common::Settings;
use kestrel_css::{
    ApproximateFontMetrics, BoxKind, LayoutTree, StyleState, Stylesheet, compute_styles, layout,
};
use kestrel_dom::{DomTree, Fragment, NodeId};
use quickcheck_macros::quickcheck;

const EPSILON: f32 = 1e-3;

fn tree_from_json(json: &str) -> DomTree {
    let fragment: Fragment = serde_json::from_str(json).unwrap();
    DomTree::from_fragment(&fragment)
}

fn lay_out(tree: &DomTree, settings: &Settings, zoom: f32) -> LayoutTree {
    let mut state = StyleState::new();
    let _ = compute_styles(tree, &Stylesheet::new(), &mut state, false, 0.033);
    layout(tree, state.styles(), &ApproximateFontMetrics, settings, zoom)
}

fn find(tree: &DomTree, tag: &str) -> NodeId {
    tree.iter_all()
        .find(|&id| tree.tag_name(id) == Some(tag))
        .unwrap()
}

fn lines_of(layout: &LayoutTree, node: NodeId) -> Vec<usize> {
    layout
        .preorder()
        .into_iter()
        .filter(|&id| {
            let b = layout.get(id).unwrap();
            b.kind == BoxKind::Line && b.node == node
        })
        .collect()
}

fn words(count: usize) -> String {
    vec!["aaaa"; count].join(" ")
}

#[test]
fn test_document_box_is_inset_by_margins() {
    let tree = tree_from_json(r#"{ "tag": "html", "children": [ { "tag": "p", "children": ["hi"] } ] }"#);
    let settings = Settings::default();
    let layout = lay_out(&tree, &settings, 1.0);

    let doc = layout.get(layout.root().unwrap()).unwrap();
    assert_eq!(doc.kind, BoxKind::Document);
    assert!((doc.x - settings.h_step).abs() < EPSILON);
    assert!((doc.y - settings.v_step).abs() < EPSILON);
    assert!((doc.width - (settings.viewport_width - 2.0 * settings.h_step)).abs() < EPSILON);

    let child = layout.get(doc.children[0]).unwrap();
    assert!((doc.height - (child.height + 2.0 * settings.v_step)).abs() < EPSILON);
    assert!((layout.height() - doc.height).abs() < EPSILON);
}

#[quickcheck]
fn prop_block_siblings_stack(paragraphs: Vec<u8>) -> bool {
    let children: Vec<Fragment> = paragraphs
        .iter()
        .take(8)
        .map(|&n| Fragment::element("p", vec![Fragment::Text(words(usize::from(n % 24)))]))
        .collect();
    let tree = DomTree::from_fragment(&Fragment::element(
        "html",
        vec![Fragment::element("body", children)],
    ));
    let layout = lay_out(&tree, &Settings::default(), 1.0);

    layout.boxes().iter().all(|b| {
        if b.kind == BoxKind::Document {
            return true;
        }
        let expected = match (b.previous, b.parent) {
            (Some(prev), _) => {
                let prev = layout.get(prev).unwrap();
                match b.kind {
                    BoxKind::Text { .. } | BoxKind::Input { .. } => return true,
                    _ => prev.y + prev.height,
                }
            }
            (None, Some(parent)) => match b.kind {
                BoxKind::Text { .. } | BoxKind::Input { .. } => return true,
                _ => layout.get(parent).unwrap().y,
            },
            (None, None) => return false,
        };
        (b.y - expected).abs() < EPSILON
    })
}

#[test]
fn test_words_break_greedily_into_lines() {
    let json = format!(
        r#"{{ "tag": "html", "children": [ {{ "tag": "p", "children": ["{}"] }} ] }}"#,
        words(7)
    );
    let tree = tree_from_json(&json);
    let settings = Settings {
        viewport_width: 200.0,
        ..Settings::default()
    };
    let layout = lay_out(&tree, &settings, 1.0);
    let p = find(&tree, "p");

    // Each word is 38.4px plus a 9.6px space; three fit in 174px.
    let lines = lines_of(&layout, p);
    let counts: Vec<usize> = lines
        .iter()
        .map(|&l| layout.get(l).unwrap().children.len())
        .collect();
    assert_eq!(counts, vec![3, 3, 1]);

    for &line in &lines {
        let line = layout.get(line).unwrap();
        assert!((line.height - 20.0).abs() < EPSILON);
    }
    let p_box = layout.get(layout.box_for_node(p).unwrap()).unwrap();
    assert!((p_box.height - 60.0).abs() < EPSILON);
}

#[test]
fn test_atoms_chain_and_share_a_baseline() {
    let tree = tree_from_json(
        r#"{ "tag": "html", "children": [ { "tag": "p", "children": ["one two"] } ] }"#,
    );
    let layout = lay_out(&tree, &Settings::default(), 1.0);
    let p = find(&tree, "p");
    let line = layout.get(lines_of(&layout, p)[0]).unwrap();
    let first = layout.get(line.children[0]).unwrap();
    let second = layout.get(line.children[1]).unwrap();

    assert!((first.x - line.x).abs() < EPSILON);
    assert!((second.x - (first.x + first.width + 9.6)).abs() < EPSILON);
    // baseline = y + 1.25 * 12.8; atom top = baseline - 12.8
    assert!((first.y - (line.y + 3.2)).abs() < EPSILON);
    assert!((first.y - second.y).abs() < EPSILON);
}

#[test]
fn test_br_forces_a_new_line() {
    let tree = tree_from_json(
        r#"{ "tag": "html", "children": [
            { "tag": "p", "children": ["a", { "tag": "br" }, "b"] }
        ] }"#,
    );
    let layout = lay_out(&tree, &Settings::default(), 1.0);
    let p = find(&tree, "p");
    let lines = lines_of(&layout, p);
    assert_eq!(lines.len(), 2);

    let second = layout.get(lines[1]).unwrap();
    let atom = layout.get(second.children[0]).unwrap();
    assert!(matches!(&atom.kind, BoxKind::Text { word, .. } if word == "b"));
}

#[test]
fn test_explicit_size_scales_with_zoom() {
    let tree = tree_from_json(
        r#"{ "tag": "html", "children": [
            { "tag": "div", "style": { "width": "100px", "height": "30px" }, "children": ["x"] }
        ] }"#,
    );
    let layout = lay_out(&tree, &Settings::default(), 2.0);
    let div = find(&tree, "div");
    let b = layout.get(layout.box_for_node(div).unwrap()).unwrap();
    assert!((b.width - 200.0).abs() < EPSILON);
    assert!((b.height - 60.0).abs() < EPSILON);
}

#[test]
fn test_malformed_width_falls_back_to_parent() {
    let tree = tree_from_json(
        r#"{ "tag": "html", "children": [
            { "tag": "div", "style": { "width": "wide" }, "children": ["x"] }
        ] }"#,
    );
    let settings = Settings::default();
    let layout = lay_out(&tree, &settings, 1.0);
    let div = find(&tree, "div");
    let b = layout.get(layout.box_for_node(div).unwrap()).unwrap();
    assert!((b.width - (settings.viewport_width - 2.0 * settings.h_step)).abs() < EPSILON);
}

#[test]
fn test_inputs_and_buttons_are_fixed_width_atoms() {
    let tree = tree_from_json(
        r#"{ "tag": "html", "children": [
            { "tag": "p", "children": [
                { "tag": "input", "attributes": { "value": "hi" } },
                { "tag": "button", "children": ["Go"] }
            ] }
        ] }"#,
    );
    let settings = Settings::default();
    let layout = lay_out(&tree, &settings, 1.0);

    let input = layout.get(layout.box_for_node(find(&tree, "input")).unwrap()).unwrap();
    let BoxKind::Input {
        text, text_width, ..
    } = &input.kind
    else {
        panic!("expected an input atom, got {:?}", input.kind);
    };
    assert_eq!(text, "hi");
    assert!((text_width - 19.2).abs() < EPSILON);
    assert!((input.width - settings.input_width).abs() < EPSILON);

    let button = layout.get(layout.box_for_node(find(&tree, "button")).unwrap()).unwrap();
    assert!(matches!(&button.kind, BoxKind::Input { text, .. } if text == "Go"));
}

#[test]
fn test_hit_test_finds_the_word_under_the_point() {
    let mut state = StyleState::new();
    let tree = tree_from_json(
        r#"{ "tag": "html", "children": [ { "tag": "p", "children": ["hello"] } ] }"#,
    );
    let _ = compute_styles(&tree, &Stylesheet::new(), &mut state, false, 0.033);
    let layout = layout(
        &tree,
        state.styles(),
        &ApproximateFontMetrics,
        &Settings::default(),
        1.0,
    );

    let p = find(&tree, "p");
    let text = tree.children(p)[0];
    let line = layout.get(lines_of(&layout, p)[0]).unwrap();
    let word = layout.get(line.children[0]).unwrap();
    let hit = layout.hit_test(word.x + 1.0, word.y + 1.0, &tree, state.styles());
    assert_eq!(hit, Some(text));
    assert_eq!(layout.hit_test(-5.0, -5.0, &tree, state.styles()), None);
}
