//! Integration tests for display-list construction and replay.

use kestrel_common::Settings;
use kestrel_css::{
    ApproximateFontMetrics, BlendMode, CanvasCommand, ColorValue, DisplayList, ItemKind,
    LayoutTree, RecordingCanvas, StyleState, Stylesheet, compute_styles, default_stylesheet,
    layout, paint,
};
use kestrel_dom::{DomTree, Fragment, NodeId};

struct Rendered {
    tree: DomTree,
    layout: LayoutTree,
    list: DisplayList,
}

fn render_with(tree: DomTree, sheet: &Stylesheet) -> Rendered {
    let mut state = StyleState::new();
    let _ = compute_styles(&tree, sheet, &mut state, false, 0.033);
    let layout = layout(
        &tree,
        state.styles(),
        &ApproximateFontMetrics,
        &Settings::default(),
        1.0,
    );
    let list = paint(&layout, &tree, state.styles());
    Rendered { tree, layout, list }
}

fn render(json: &str) -> Rendered {
    let fragment: Fragment = serde_json::from_str(json).unwrap();
    render_with(DomTree::from_fragment(&fragment), &Stylesheet::new())
}

fn find(tree: &DomTree, tag: &str) -> NodeId {
    tree.iter_all()
        .find(|&id| tree.tag_name(id) == Some(tag))
        .unwrap()
}

fn replay(list: &DisplayList) -> Vec<CanvasCommand> {
    let mut canvas = RecordingCanvas::new();
    list.execute(&mut canvas);
    canvas.commands
}

#[test]
fn test_background_paints_below_text() {
    let r = render(
        r#"{ "tag": "html", "children": [
            { "tag": "div", "style": { "background-color": "red" }, "children": ["hi"] }
        ] }"#,
    );
    let commands = replay(&r.list);
    assert_eq!(commands.len(), 2, "{commands:?}");
    assert!(matches!(commands[0], CanvasCommand::Rect(_, c) if c == ColorValue::rgb(255, 0, 0)));
    assert!(matches!(&commands[1], CanvasCommand::Text { text, .. } if text == "hi"));
}

#[test]
fn test_rounded_background_keeps_its_radius() {
    let r = render(
        r#"{ "tag": "html", "children": [
            { "tag": "div", "style": { "background-color": "blue", "border-radius": "6px" },
              "children": ["hi"] }
        ] }"#,
    );
    let backgrounds: Vec<_> = r
        .list
        .items()
        .iter()
        .filter(|item| matches!(item.kind, ItemKind::DrawRect { .. } | ItemKind::DrawRRect { .. }))
        .collect();
    assert_eq!(backgrounds.len(), 1);
    assert!(matches!(
        backgrounds[0].kind,
        ItemKind::DrawRRect { radius, .. } if (radius - 6.0).abs() < 1e-3
    ));
}

#[test]
fn test_sibling_order_is_paint_order() {
    let r = render(
        r#"{ "tag": "html", "children": [
            { "tag": "p", "children": ["first"] },
            { "tag": "p", "children": ["second third"] }
        ] }"#,
    );
    let mut canvas = RecordingCanvas::new();
    r.list.execute(&mut canvas);
    assert_eq!(canvas.texts(), vec!["first", "second", "third"]);
}

#[test]
fn test_plain_document_needs_no_compositing() {
    let r = render(
        r#"{ "tag": "html", "children": [ { "tag": "p", "children": ["plain"] } ] }"#,
    );
    assert!(!r.list.is_empty());
    assert!(r.list.items().iter().all(|item| !item.needs_compositing));
    assert!(
        replay(&r.list)
            .iter()
            .all(|c| !matches!(c, CanvasCommand::Save | CanvasCommand::SaveLayer(..)))
    );
}

#[test]
fn test_opacity_forces_a_layer() {
    let r = render(
        r#"{ "tag": "html", "children": [
            { "tag": "div", "style": { "opacity": "0.5" }, "children": ["faded"] }
        ] }"#,
    );
    let div = find(&r.tree, "div");
    let layer = r.list.save_layer_for(div).unwrap();
    let item = r.list.get(layer).unwrap();
    assert!(item.needs_compositing);
    assert!(matches!(
        item.kind,
        ItemKind::SaveLayer { should_save: true, blend: BlendMode::Normal, .. }
    ));
    for &root in r.list.roots() {
        assert!(r.list.get(root).unwrap().needs_compositing);
    }

    let commands = replay(&r.list);
    let save = commands
        .iter()
        .position(|c| *c == CanvasCommand::SaveLayer(0.5, BlendMode::Normal))
        .unwrap();
    let text = commands
        .iter()
        .position(|c| matches!(c, CanvasCommand::Text { .. }))
        .unwrap();
    assert!(save < text);
    assert_eq!(commands.last(), Some(&CanvasCommand::Restore));
}

#[test]
fn test_translation_wraps_children_and_moves_bounds() {
    let r = render(
        r#"{ "tag": "html", "children": [
            { "tag": "div", "style": { "transform": "translate(10px, 5px)" }, "children": ["moved"] }
        ] }"#,
    );
    let commands = replay(&r.list);
    assert!(commands.contains(&CanvasCommand::Translate(10.0, 5.0)));

    let (text_id, text_item) = r
        .list
        .items()
        .iter()
        .enumerate()
        .find(|(_, item)| matches!(item.kind, ItemKind::DrawText { .. }))
        .unwrap();
    let absolute = r.list.absolute_bounds(text_id);
    assert!((absolute.x - (text_item.rect.x + 10.0)).abs() < 1e-3);
    assert!((absolute.y - (text_item.rect.y + 5.0)).abs() < 1e-3);
}

#[test]
fn test_overflow_clip_uses_border_radius() {
    let r = render(
        r#"{ "tag": "html", "children": [
            { "tag": "div", "style": { "overflow": "clip", "border-radius": "4px" }, "children": ["round"] }
        ] }"#,
    );
    let commands = replay(&r.list);
    assert!(commands.iter().any(
        |c| matches!(c, CanvasCommand::Clip(_, radius) if (*radius - 4.0).abs() < 1e-3)
    ));
    assert!(commands.contains(&CanvasCommand::SaveLayer(1.0, BlendMode::Normal)));
    let saves = commands
        .iter()
        .filter(|c| matches!(c, CanvasCommand::Save | CanvasCommand::SaveLayer(..)))
        .count();
    let restores = commands
        .iter()
        .filter(|c| matches!(c, CanvasCommand::Restore))
        .count();
    assert_eq!(saves, restores);
}

#[test]
fn test_focused_input_draws_caret_and_ring() {
    let fragment: Fragment = serde_json::from_str(
        r#"{ "tag": "html", "children": [
            { "tag": "p", "children": [ { "tag": "input", "attributes": { "value": "ab" } } ] }
        ] }"#,
    )
    .unwrap();
    let mut tree = DomTree::from_fragment(&fragment);
    let input = find(&tree, "input");
    tree.as_element_mut(input).unwrap().focused = true;
    let r = render_with(tree, default_stylesheet());

    let input_box = r.layout.get(r.layout.box_for_node(input).unwrap()).unwrap();
    let caret_x = input_box.x + 2.0 * 9.6;
    assert!(r.list.items().iter().any(|item| matches!(
        item.kind,
        ItemKind::DrawLine { from, .. } if (from.0 - caret_x).abs() < 1e-3
    )));
    assert!(r.list.items().iter().any(|item| matches!(
        item.kind,
        ItemKind::DrawOutline { .. }
    ) && item.rect == input_box.rect()));
    assert!(r.list.items().iter().any(|item| matches!(
        item.kind,
        ItemKind::DrawRect { color } if color == ColorValue::rgb(173, 216, 230)
    )));
}

#[test]
fn test_focused_link_is_outlined_on_its_line() {
    let fragment: Fragment = serde_json::from_str(
        r#"{ "tag": "html", "children": [
            { "tag": "p", "children": ["go", { "tag": "a", "children": ["over there"] }] }
        ] }"#,
    )
    .unwrap();
    let mut tree = DomTree::from_fragment(&fragment);
    let a = find(&tree, "a");
    tree.as_element_mut(a).unwrap().focused = true;
    let r = render_with(tree, &Stylesheet::new());

    let outlines: Vec<_> = r
        .list
        .items()
        .iter()
        .filter(|item| matches!(item.kind, ItemKind::DrawOutline { .. }))
        .collect();
    assert_eq!(outlines.len(), 1);

    // The ring spans both words of the link but not the word before it.
    let words: Vec<_> = r
        .list
        .items()
        .iter()
        .filter_map(|item| match &item.kind {
            ItemKind::DrawText { text, .. } => Some((text.as_str(), item.rect)),
            _ => None,
        })
        .collect();
    let ring = outlines[0].rect;
    let go = words.iter().find(|(t, _)| *t == "go").unwrap().1;
    let there = words.iter().find(|(t, _)| *t == "there").unwrap().1;
    assert!(ring.x > go.right());
    assert!((ring.right() - there.right()).abs() < 1e-3);
}
