use mindmap_core::{
    Command, CommandError, ExtensionOwner, ExtensionPayload, ExtensionType, IconPosition,
    LinkTarget, MapModel, MindIcon, ModelError, NodeChangeEvent, NodeId, NodeSnapshot, NodeText,
    UndoEngine, UndoOutcome,
};
use std::cell::RefCell;
use std::rc::Rc;

fn sample_map() -> (MapModel, NodeId, NodeId, NodeId) {
    let mut map = MapModel::new(NodeText::plain("R"));
    let root = map.root_id();
    let a = map.add_child(root, None, NodeText::plain("A")).unwrap();
    let b = map.add_child(root, None, NodeText::plain("B")).unwrap();
    let c = map.add_child(a, None, NodeText::plain("C")).unwrap();
    map.insert_icon(a, 0, MindIcon::new("X")).unwrap();
    map.insert_icon(a, 1, MindIcon::new("Y")).unwrap();
    map.set_extension(
        ExtensionOwner::Node(c),
        ExtensionType::note(),
        Some(ExtensionPayload::Text("note".to_string())),
    )
    .unwrap();
    (map, a, b, c)
}

/// Executes, undoes and redoes `command`, checking both directions.
fn assert_symmetric(map: &mut MapModel, command: Command) {
    let before = map.clone();
    let mut engine = UndoEngine::default();
    engine.execute(map, command).unwrap();
    let after = map.clone();
    assert_ne!(before, after);

    assert!(matches!(engine.undo(map).unwrap(), UndoOutcome::Applied { .. }));
    assert_eq!(*map, before);
    assert!(matches!(engine.redo(map).unwrap(), UndoOutcome::Applied { .. }));
    assert_eq!(*map, after);
}

#[test]
fn add_and_remove_icon_are_symmetric() {
    let (mut map, a, _, _) = sample_map();
    let command = Command::add_icon(&map, a, IconPosition::At(1), MindIcon::new("Z")).unwrap();
    assert_symmetric(&mut map, command);

    let command = Command::remove_icon(&map, a, IconPosition::Last).unwrap();
    assert_symmetric(&mut map, command);
}

#[test]
fn set_text_is_symmetric_across_text_kinds() {
    let (mut map, _, b, _) = sample_map();
    let command = Command::set_text(&map, b, NodeText::rich("<p>B</p>")).unwrap();
    assert_symmetric(&mut map, command);
}

#[test]
fn insert_and_delete_subtree_are_symmetric() {
    let (mut map, a, b, c) = sample_map();

    let mut subtree = NodeSnapshot::leaf(NodeText::plain("new"));
    subtree.children.push(NodeSnapshot::leaf(NodeText::plain("new child")));
    let command = Command::insert_node(&map, b, Some(0), subtree).unwrap();
    assert_symmetric(&mut map, command);

    let command = Command::delete_node(&map, a).unwrap();
    assert_symmetric(&mut map, command);
    assert!(!map.contains(c));
}

#[test]
fn move_node_is_symmetric() {
    let (mut map, a, b, c) = sample_map();
    let command = Command::move_node(&map, c, b, 0).unwrap();
    assert_symmetric(&mut map, command);

    let root = map.root_id();
    let command = Command::move_node(&map, b, root, 0).unwrap();
    assert_symmetric(&mut map, command);
    assert_eq!(map.root().children(), &[b, a]);
}

#[test]
fn set_and_remove_extension_are_symmetric() {
    let (mut map, a, _, c) = sample_map();
    let command = Command::set_extension(
        &map,
        ExtensionOwner::Node(a),
        ExtensionType::link(),
        ExtensionPayload::Link(LinkTarget::Node(c)),
    )
    .unwrap();
    assert_symmetric(&mut map, command);

    let command = Command::set_extension(
        &map,
        ExtensionOwner::Node(c),
        ExtensionType::note(),
        ExtensionPayload::Text("replaced".to_string()),
    )
    .unwrap();
    assert_symmetric(&mut map, command);

    let command =
        Command::remove_extension(&map, ExtensionOwner::Node(c), ExtensionType::note()).unwrap();
    assert_symmetric(&mut map, command);

    let command = Command::set_extension(
        &map,
        ExtensionOwner::Map,
        ExtensionType::attributes(),
        ExtensionPayload::Properties(vec![("k".to_string(), "v".to_string())]),
    )
    .unwrap();
    assert_symmetric(&mut map, command);
}

#[test]
fn compound_is_one_undo_step() {
    let (mut map, a, b, _) = sample_map();
    let rename = Command::set_text(&map, a, NodeText::plain("A2")).unwrap();
    let add = Command::add_icon(&map, b, IconPosition::Last, MindIcon::new("idea")).unwrap();
    let compound = Command::compound(&map, "rename and tag", vec![rename, add]).unwrap();
    assert_symmetric(&mut map, compound);
}

#[test]
fn compound_with_dependent_steps_is_rejected() {
    let (mut map, a, _, _) = sample_map();
    let rename = Command::set_text(&map, a, NodeText::plain("new")).unwrap();
    let delete = Command::delete_node(&map, a).unwrap();
    let before = map.clone();

    let err = Command::compound(&map, "rename and delete", vec![rename, delete]).unwrap_err();
    assert!(matches!(err, CommandError::StateMismatch { .. }));
    assert_eq!(map, before);

    let mut engine = UndoEngine::default();
    let delete = Command::delete_node(&map, a).unwrap();
    let compound = Command::compound(&map, "delete", vec![delete]).unwrap();
    engine.execute(&mut map, compound).unwrap();
    engine.undo(&mut map).unwrap();
    assert_eq!(map, before);
}

#[test]
fn stale_move_redo_fails_without_moving() {
    let (mut map, a, b, c) = sample_map();
    let mut engine = UndoEngine::default();

    let command = Command::move_node(&map, c, b, 0).unwrap();
    engine.execute(&mut map, command).unwrap();
    engine.undo(&mut map).unwrap();
    let root = map.root_id();
    map.move_node(c, root, 0).unwrap();
    let before = map.clone();

    let err = engine.redo(&mut map).unwrap_err();
    assert!(matches!(err, CommandError::StateMismatch { .. }));
    assert_eq!(map, before);
    assert!(engine.can_redo());
    assert!(map.node(a).unwrap().children().is_empty());
}

#[test]
fn stale_extension_redo_keeps_current_payload() {
    let (mut map, _, _, c) = sample_map();
    let mut engine = UndoEngine::default();

    let command = Command::set_extension(
        &map,
        ExtensionOwner::Node(c),
        ExtensionType::note(),
        ExtensionPayload::Text("replaced".to_string()),
    )
    .unwrap();
    engine.execute(&mut map, command).unwrap();
    engine.undo(&mut map).unwrap();
    map.set_extension(
        ExtensionOwner::Node(c),
        ExtensionType::note(),
        Some(ExtensionPayload::Text("edited elsewhere".to_string())),
    )
    .unwrap();

    let err = engine.redo(&mut map).unwrap_err();
    assert!(matches!(err, CommandError::StateMismatch { .. }));
    assert_eq!(
        map.node(c).unwrap().extensions().get(&ExtensionType::note()),
        Some(&ExtensionPayload::Text("edited elsewhere".to_string()))
    );
}

#[test]
fn empty_attribute_table_is_rejected() {
    let (mut map, _, _, _) = sample_map();
    let err = Command::set_extension(
        &map,
        ExtensionOwner::Map,
        ExtensionType::attributes(),
        ExtensionPayload::Properties(Vec::new()),
    )
    .unwrap_err();
    assert_eq!(
        err,
        CommandError::Precondition(ModelError::EmptyAttributeTable(ExtensionOwner::Map))
    );

    let err = map
        .set_extension(
            ExtensionOwner::Map,
            ExtensionType::attributes(),
            Some(ExtensionPayload::Properties(Vec::new())),
        )
        .unwrap_err();
    assert_eq!(err, ModelError::EmptyAttributeTable(ExtensionOwner::Map));
    assert!(map.extensions().is_empty());
}

#[test]
fn remove_icon_at_zero_undo_restores_original_order() {
    let (mut map, a, _, _) = sample_map();
    let mut engine = UndoEngine::default();

    let command = Command::remove_icon(&map, a, IconPosition::At(0)).unwrap();
    engine.execute(&mut map, command).unwrap();
    assert_eq!(map.node(a).unwrap().icons(), &[MindIcon::new("Y")]);

    engine.undo(&mut map).unwrap();
    assert_eq!(
        map.node(a).unwrap().icons(),
        &[MindIcon::new("X"), MindIcon::new("Y")]
    );
}

#[test]
fn new_command_after_undo_clears_redo() {
    let (mut map, a, b, _) = sample_map();
    let mut engine = UndoEngine::default();

    let command = Command::set_text(&map, a, NodeText::plain("A2")).unwrap();
    engine.execute(&mut map, command).unwrap();
    engine.undo(&mut map).unwrap();
    assert!(engine.can_redo());
    assert_eq!(engine.redo_description(), Some("edit node text"));

    let command = Command::set_text(&map, b, NodeText::plain("B2")).unwrap();
    engine.execute(&mut map, command).unwrap();
    assert!(!engine.can_redo());
    assert_eq!(engine.redo(&mut map).unwrap(), UndoOutcome::NothingToRedo);
    assert_eq!(map.node(a).unwrap().text(), &NodeText::plain("A"));
}

#[test]
fn empty_stacks_are_idempotent_noops() {
    let (mut map, _, _, _) = sample_map();
    let before = map.clone();
    let mut engine = UndoEngine::default();

    for _ in 0..3 {
        assert_eq!(engine.undo(&mut map).unwrap(), UndoOutcome::NothingToUndo);
        assert_eq!(engine.redo(&mut map).unwrap(), UndoOutcome::NothingToRedo);
    }
    assert_eq!(map, before);
    assert!(!engine.can_undo());
    assert_eq!(engine.undo_description(), None);
}

#[test]
fn failed_execute_is_not_recorded() {
    let (mut map, a, _, _) = sample_map();
    let mut engine = UndoEngine::default();

    let stale = Command::remove_icon(&map, a, IconPosition::At(1)).unwrap();
    map.remove_icon(a, 1).unwrap();
    let before = map.clone();

    let err = engine.execute(&mut map, stale).unwrap_err();
    assert!(matches!(err, CommandError::StateMismatch { .. }));
    assert_eq!(map, before);
    assert!(!engine.can_undo());
}

#[test]
fn failed_undo_keeps_command_on_undo_stack() {
    let (mut map, a, _, _) = sample_map();
    let mut engine = UndoEngine::default();

    let command = Command::set_text(&map, a, NodeText::plain("A2")).unwrap();
    engine.execute(&mut map, command).unwrap();
    map.set_text(a, NodeText::plain("edited elsewhere")).unwrap();

    assert!(engine.undo(&mut map).is_err());
    assert!(engine.can_undo());
    assert!(!engine.can_redo());
    assert_eq!(
        map.node(a).unwrap().text(),
        &NodeText::plain("edited elsewhere")
    );
}

#[test]
fn actions_raise_change_notifications_both_ways() {
    let (mut map, a, _, _) = sample_map();
    let events: Rc<RefCell<Vec<NodeChangeEvent>>> = Rc::new(RefCell::new(Vec::new()));
    let mut engine = UndoEngine::default();
    let sink = Rc::clone(&events);
    engine.add_listener(Box::new(move |event: &NodeChangeEvent| {
        sink.borrow_mut().push(event.clone())
    }));

    let command = Command::remove_icon(&map, a, IconPosition::At(0)).unwrap();
    engine.execute(&mut map, command).unwrap();
    engine.undo(&mut map).unwrap();

    let events = events.borrow();
    assert_eq!(events.len(), 2);
    assert_eq!(
        events[0],
        NodeChangeEvent::new(Some(a), "icon", Some("X".to_string()), None)
    );
    assert_eq!(
        events[1],
        NodeChangeEvent::new(Some(a), "icon", None, Some("X".to_string()))
    );
}
