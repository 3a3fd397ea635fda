//! Reversible document commands.
//!
//! # Responsibility
//! - Capture, at construction, every value needed to reverse one mutation.
//! - Apply (`act`) and reverse (`undo`) that mutation against a map and
//!   raise change notifications for both directions.
//!
//! # Invariants
//! - Captured state is immutable after construction; commands only hold ids
//!   and value snapshots, never references into the map.
//! - Factories validate preconditions against the current map; a returned
//!   command is applicable to that state.
//! - Every kind checks the captured state before it mutates, in both
//!   directions, so a stale command fails with `StateMismatch`.
//! - A compound is only built when its steps apply and reverse in sequence
//!   against the map it was built for.
//! - `act` followed by `undo` leaves ids, text, icons, extensions and child
//!   order exactly as before.
//! - A failing action leaves the map unchanged.

use crate::model::extension::{ExtensionOwner, ExtensionPayload, ExtensionType};
use crate::model::map::{MapModel, ModelError};
use crate::model::node::{IconPosition, MindIcon, NodeId, NodeText};
use crate::model::snapshot::NodeSnapshot;
use crate::undo::notify::{
    ChangeNotifier, NodeChangeEvent, PROPERTY_CHILDREN, PROPERTY_ICON, PROPERTY_PARENT,
    PROPERTY_TEXT,
};
use log::error;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Result type for command construction and execution.
pub type CommandResult<T> = Result<T, CommandError>;

/// Reasons a command refuses to build or to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// The map rejected the mutation; nothing changed.
    Precondition(ModelError),
    /// Removing an extension slot that is not set.
    MissingExtension {
        owner: ExtensionOwner,
        extension_type: ExtensionType,
    },
    /// The map no longer matches the state captured by the command.
    StateMismatch { command: String, detail: String },
}

impl Display for CommandError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Precondition(err) => write!(f, "command precondition failed: {err}"),
            Self::MissingExtension {
                owner,
                extension_type,
            } => write!(f, "extension `{extension_type}` is not set on {owner}"),
            Self::StateMismatch { command, detail } => {
                write!(f, "map state does not match command `{command}`: {detail}")
            }
        }
    }
}

impl Error for CommandError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Precondition(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ModelError> for CommandError {
    fn from(value: ModelError) -> Self {
        Self::Precondition(value)
    }
}

/// Captured payload of one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandKind {
    AddIcon {
        node: NodeId,
        index: usize,
        icon: MindIcon,
    },
    RemoveIcon {
        node: NodeId,
        index: usize,
        icon: MindIcon,
    },
    SetText {
        node: NodeId,
        old: NodeText,
        new: NodeText,
    },
    InsertNode {
        parent: NodeId,
        index: usize,
        subtree: NodeSnapshot,
    },
    DeleteNode {
        parent: NodeId,
        index: usize,
        subtree: NodeSnapshot,
    },
    /// `to_index` and `from_index` address the child list after detaching.
    MoveNode {
        node: NodeId,
        from_parent: NodeId,
        from_index: usize,
        to_parent: NodeId,
        to_index: usize,
    },
    /// `None` means the slot is absent on that side.
    SetExtension {
        owner: ExtensionOwner,
        extension_type: ExtensionType,
        old: Option<ExtensionPayload>,
        new: Option<ExtensionPayload>,
    },
    /// Steps applied in order and reversed in reverse order as one undo step.
    Compound(Vec<Command>),
}

/// One undoable mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    description: String,
    kind: CommandKind,
}

impl Command {
    /// Adds `icon` at `position` (`Last` appends).
    pub fn add_icon(
        map: &MapModel,
        node: NodeId,
        position: IconPosition,
        icon: MindIcon,
    ) -> CommandResult<Self> {
        let len = map.require(node)?.icons().len();
        let index = match position {
            IconPosition::At(index) => index,
            IconPosition::Last => len,
        };
        if index > len {
            return Err(ModelError::IconIndexOutOfRange { node, index, len }.into());
        }
        Ok(Self {
            description: format!("add icon {icon}"),
            kind: CommandKind::AddIcon { node, index, icon },
        })
    }

    /// Removes the icon at `position`, capturing it and its index for undo.
    pub fn remove_icon(
        map: &MapModel,
        node: NodeId,
        position: IconPosition,
    ) -> CommandResult<Self> {
        let target = map.require(node)?;
        let len = target.icons().len();
        let out_of_range = ModelError::IconIndexOutOfRange {
            node,
            index: match position {
                IconPosition::At(index) => index,
                IconPosition::Last => len,
            },
            len,
        };
        let index = target
            .resolve_icon_index(position)
            .ok_or_else(|| out_of_range.clone())?;
        let icon = target.icon(index).cloned().ok_or(out_of_range)?;
        Ok(Self {
            description: format!("remove icon {icon}"),
            kind: CommandKind::RemoveIcon { node, index, icon },
        })
    }

    pub fn set_text(map: &MapModel, node: NodeId, text: NodeText) -> CommandResult<Self> {
        let old = map.require(node)?.text().clone();
        Ok(Self {
            description: "edit node text".to_string(),
            kind: CommandKind::SetText {
                node,
                old,
                new: text,
            },
        })
    }

    /// Inserts a detached subtree under `parent` (`None` appends).
    pub fn insert_node(
        map: &MapModel,
        parent: NodeId,
        index: Option<usize>,
        subtree: NodeSnapshot,
    ) -> CommandResult<Self> {
        let len = map.require(parent)?.children().len();
        let index = index.unwrap_or(len);
        if index > len {
            return Err(ModelError::ChildIndexOutOfRange { parent, index, len }.into());
        }
        if let Some(taken) = subtree.ids().into_iter().find(|id| map.contains(*id)) {
            return Err(ModelError::DuplicateNodeId(taken).into());
        }
        Ok(Self {
            description: format!("insert {} node(s)", subtree.node_count()),
            kind: CommandKind::InsertNode {
                parent,
                index,
                subtree,
            },
        })
    }

    /// Inserts a new leaf node with a fresh id.
    pub fn add_node(
        map: &MapModel,
        parent: NodeId,
        index: Option<usize>,
        text: NodeText,
    ) -> CommandResult<Self> {
        Self::insert_node(map, parent, index, NodeSnapshot::leaf(text))
    }

    /// Deletes a non-root subtree, keeping a snapshot to restore its ids.
    pub fn delete_node(map: &MapModel, node: NodeId) -> CommandResult<Self> {
        if map.require(node)?.is_root() {
            return Err(ModelError::RootImmutable(node).into());
        }
        let (parent, index) = map
            .position_of(node)
            .ok_or(ModelError::NodeNotFound(node))?;
        let subtree = map.snapshot(node)?;
        Ok(Self {
            description: format!("delete {} node(s)", subtree.node_count()),
            kind: CommandKind::DeleteNode {
                parent,
                index,
                subtree,
            },
        })
    }

    /// Moves a non-root node to `index` of `new_parent`'s child list, counted
    /// after the node is detached from its current position.
    pub fn move_node(
        map: &MapModel,
        node: NodeId,
        new_parent: NodeId,
        index: usize,
    ) -> CommandResult<Self> {
        if map.require(node)?.is_root() {
            return Err(ModelError::RootImmutable(node).into());
        }
        let target_len = map.require(new_parent)?.children().len();
        if map.is_ancestor_or_self(node, new_parent) {
            return Err(ModelError::CycleDetected {
                node,
                parent: new_parent,
            }
            .into());
        }
        let (from_parent, from_index) = map
            .position_of(node)
            .ok_or(ModelError::NodeNotFound(node))?;
        let len = if from_parent == new_parent {
            target_len - 1
        } else {
            target_len
        };
        if index > len {
            return Err(ModelError::ChildIndexOutOfRange {
                parent: new_parent,
                index,
                len,
            }
            .into());
        }
        Ok(Self {
            description: "move node".to_string(),
            kind: CommandKind::MoveNode {
                node,
                from_parent,
                from_index,
                to_parent: new_parent,
                to_index: index,
            },
        })
    }

    /// Sets one extension slot, replacing any previous payload.
    pub fn set_extension(
        map: &MapModel,
        owner: ExtensionOwner,
        extension_type: ExtensionType,
        payload: ExtensionPayload,
    ) -> CommandResult<Self> {
        let old = map.extensions_of(owner)?.get(&extension_type).cloned();
        if matches!(&payload, ExtensionPayload::Properties(entries) if entries.is_empty()) {
            return Err(ModelError::EmptyAttributeTable(owner).into());
        }
        Ok(Self {
            description: format!("set {extension_type}"),
            kind: CommandKind::SetExtension {
                owner,
                extension_type,
                old,
                new: Some(payload),
            },
        })
    }

    /// Clears one extension slot; the slot must be set.
    pub fn remove_extension(
        map: &MapModel,
        owner: ExtensionOwner,
        extension_type: ExtensionType,
    ) -> CommandResult<Self> {
        let Some(old) = map.extensions_of(owner)?.get(&extension_type).cloned() else {
            return Err(CommandError::MissingExtension {
                owner,
                extension_type,
            });
        };
        Ok(Self {
            description: format!("remove {extension_type}"),
            kind: CommandKind::SetExtension {
                owner,
                extension_type,
                old: Some(old),
                new: None,
            },
        })
    }

    /// Groups `steps` into a single undo step.
    ///
    /// Steps capture their state before the compound runs, so a step that
    /// depends on an earlier one (renaming a node and then deleting it) would
    /// apply but never reverse. The compound is trial-run forward and back on
    /// a copy of `map` and rejected unless the copy comes back unchanged.
    pub fn compound(
        map: &MapModel,
        description: impl Into<String>,
        steps: Vec<Command>,
    ) -> CommandResult<Self> {
        let command = Self {
            description: description.into(),
            kind: CommandKind::Compound(steps),
        };
        let mut trial = map.clone();
        let mut silent = ChangeNotifier::new();
        command.act(&mut trial, &mut silent)?;
        command.undo(&mut trial, &mut silent)?;
        if &trial != map {
            return Err(command.mismatch("steps do not reverse to the original map".to_string()));
        }
        Ok(command)
    }

    pub fn description(&self) -> &str {
        self.description.as_str()
    }

    pub fn kind(&self) -> &CommandKind {
        &self.kind
    }

    /// Runs the forward action.
    pub(crate) fn act(
        &self,
        map: &mut MapModel,
        notifier: &mut ChangeNotifier,
    ) -> CommandResult<()> {
        match &self.kind {
            CommandKind::AddIcon { node, index, icon } => {
                map.insert_icon(*node, *index, icon.clone())?;
                notifier.notify(icon_event(*node, None, Some(icon)));
            }
            CommandKind::RemoveIcon { node, index, icon } => {
                self.expect_icon(map, *node, *index, icon)?;
                map.remove_icon(*node, *index)?;
                notifier.notify(icon_event(*node, Some(icon), None));
            }
            CommandKind::SetText { node, old, new } => {
                self.expect_text(map, *node, old)?;
                map.set_text(*node, new.clone())?;
                notifier.notify(text_event(*node, old, new));
            }
            CommandKind::InsertNode {
                parent,
                index,
                subtree,
            } => {
                map.insert_subtree(*parent, *index, subtree)?;
                notifier.notify(children_event(*parent, None, Some(subtree.id)));
            }
            CommandKind::DeleteNode {
                parent,
                index,
                subtree,
            } => {
                self.expect_position(map, subtree.id, *parent, *index)?;
                map.remove_subtree(subtree.id)?;
                notifier.notify(children_event(*parent, Some(subtree.id), None));
            }
            CommandKind::MoveNode {
                node,
                from_parent,
                from_index,
                to_parent,
                to_index,
            } => {
                self.expect_position(map, *node, *from_parent, *from_index)?;
                map.move_node(*node, *to_parent, *to_index)?;
                notifier.notify(parent_event(*node, *from_parent, *to_parent));
            }
            CommandKind::SetExtension {
                owner,
                extension_type,
                old,
                new,
            } => {
                self.expect_extension(map, *owner, extension_type, old)?;
                map.set_extension(*owner, extension_type.clone(), new.clone())?;
                notifier.notify(extension_event(*owner, extension_type, old, new));
            }
            CommandKind::Compound(steps) => {
                for (applied, step) in steps.iter().enumerate() {
                    if let Err(err) = step.act(map, notifier) {
                        self.roll_back(&steps[..applied], map, notifier);
                        return Err(err);
                    }
                }
            }
        }
        Ok(())
    }

    /// Runs the reverse action.
    pub(crate) fn undo(
        &self,
        map: &mut MapModel,
        notifier: &mut ChangeNotifier,
    ) -> CommandResult<()> {
        match &self.kind {
            CommandKind::AddIcon { node, index, icon } => {
                self.expect_icon(map, *node, *index, icon)?;
                map.remove_icon(*node, *index)?;
                notifier.notify(icon_event(*node, Some(icon), None));
            }
            CommandKind::RemoveIcon { node, index, icon } => {
                map.insert_icon(*node, *index, icon.clone())?;
                notifier.notify(icon_event(*node, None, Some(icon)));
            }
            CommandKind::SetText { node, old, new } => {
                self.expect_text(map, *node, new)?;
                map.set_text(*node, old.clone())?;
                notifier.notify(text_event(*node, new, old));
            }
            CommandKind::InsertNode {
                parent,
                index,
                subtree,
            } => {
                self.expect_position(map, subtree.id, *parent, *index)?;
                map.remove_subtree(subtree.id)?;
                notifier.notify(children_event(*parent, Some(subtree.id), None));
            }
            CommandKind::DeleteNode {
                parent,
                index,
                subtree,
            } => {
                map.insert_subtree(*parent, *index, subtree)?;
                notifier.notify(children_event(*parent, None, Some(subtree.id)));
            }
            CommandKind::MoveNode {
                node,
                from_parent,
                from_index,
                to_parent,
                to_index,
            } => {
                self.expect_position(map, *node, *to_parent, *to_index)?;
                map.move_node(*node, *from_parent, *from_index)?;
                notifier.notify(parent_event(*node, *to_parent, *from_parent));
            }
            CommandKind::SetExtension {
                owner,
                extension_type,
                old,
                new,
            } => {
                self.expect_extension(map, *owner, extension_type, new)?;
                map.set_extension(*owner, extension_type.clone(), old.clone())?;
                notifier.notify(extension_event(*owner, extension_type, new, old));
            }
            CommandKind::Compound(steps) => {
                for (undone, step) in steps.iter().rev().enumerate() {
                    if let Err(err) = step.undo(map, notifier) {
                        self.replay(&steps[steps.len() - undone..], map, notifier);
                        return Err(err);
                    }
                }
            }
        }
        Ok(())
    }

    fn roll_back(&self, applied: &[Command], map: &mut MapModel, notifier: &mut ChangeNotifier) {
        for step in applied.iter().rev() {
            if let Err(err) = step.undo(map, notifier) {
                error!(
                    "event=compound_rollback module=undo status=error command={} step={} error={}",
                    self.description, step.description, err
                );
            }
        }
    }

    fn replay(&self, undone: &[Command], map: &mut MapModel, notifier: &mut ChangeNotifier) {
        for step in undone {
            if let Err(err) = step.act(map, notifier) {
                error!(
                    "event=compound_replay module=undo status=error command={} step={} error={}",
                    self.description, step.description, err
                );
            }
        }
    }

    fn expect_icon(
        &self,
        map: &MapModel,
        node: NodeId,
        index: usize,
        icon: &MindIcon,
    ) -> CommandResult<()> {
        match map.require(node)?.icon(index) {
            Some(current) if current == icon => Ok(()),
            Some(current) => Err(self.mismatch(format!(
                "icon at {index} of {node} is {current}, expected {icon}"
            ))),
            None => Err(self.mismatch(format!("no icon at {index} of {node}"))),
        }
    }

    fn expect_text(
        &self,
        map: &MapModel,
        node: NodeId,
        expected: &NodeText,
    ) -> CommandResult<()> {
        if map.require(node)?.text() == expected {
            Ok(())
        } else {
            Err(self.mismatch(format!("text of {node} changed")))
        }
    }

    fn expect_position(
        &self,
        map: &MapModel,
        node: NodeId,
        parent: NodeId,
        index: usize,
    ) -> CommandResult<()> {
        map.require(node)?;
        if map.position_of(node) == Some((parent, index)) {
            Ok(())
        } else {
            Err(self.mismatch(format!("{node} is no longer child {index} of {parent}")))
        }
    }

    fn expect_extension(
        &self,
        map: &MapModel,
        owner: ExtensionOwner,
        extension_type: &ExtensionType,
        expected: &Option<ExtensionPayload>,
    ) -> CommandResult<()> {
        if map.extensions_of(owner)?.get(extension_type) == expected.as_ref() {
            Ok(())
        } else {
            Err(self.mismatch(format!("`{extension_type}` on {owner} changed")))
        }
    }

    fn mismatch(&self, detail: String) -> CommandError {
        CommandError::StateMismatch {
            command: self.description.clone(),
            detail,
        }
    }
}

fn icon_event(node: NodeId, old: Option<&MindIcon>, new: Option<&MindIcon>) -> NodeChangeEvent {
    NodeChangeEvent::new(
        Some(node),
        PROPERTY_ICON,
        old.map(ToString::to_string),
        new.map(ToString::to_string),
    )
}

fn text_event(node: NodeId, old: &NodeText, new: &NodeText) -> NodeChangeEvent {
    NodeChangeEvent::new(
        Some(node),
        PROPERTY_TEXT,
        Some(old.as_str().to_string()),
        Some(new.as_str().to_string()),
    )
}

fn children_event(parent: NodeId, old: Option<NodeId>, new: Option<NodeId>) -> NodeChangeEvent {
    NodeChangeEvent::new(
        Some(parent),
        PROPERTY_CHILDREN,
        old.map(|id| id.to_string()),
        new.map(|id| id.to_string()),
    )
}

fn parent_event(node: NodeId, old: NodeId, new: NodeId) -> NodeChangeEvent {
    NodeChangeEvent::new(
        Some(node),
        PROPERTY_PARENT,
        Some(old.to_string()),
        Some(new.to_string()),
    )
}

fn extension_event(
    owner: ExtensionOwner,
    extension_type: &ExtensionType,
    old: &Option<ExtensionPayload>,
    new: &Option<ExtensionPayload>,
) -> NodeChangeEvent {
    let node = match owner {
        ExtensionOwner::Map => None,
        ExtensionOwner::Node(id) => Some(id),
    };
    NodeChangeEvent::new(
        node,
        extension_type.as_str(),
        old.as_ref().map(ExtensionPayload::summary),
        new.as_ref().map(ExtensionPayload::summary),
    )
}

#[cfg(test)]
mod tests {
    use super::{Command, CommandError, CommandKind};
    use crate::model::extension::{ExtensionOwner, ExtensionType};
    use crate::model::map::{MapModel, ModelError};
    use crate::model::node::{IconPosition, MindIcon, NodeText};
    use crate::undo::notify::ChangeNotifier;

    #[test]
    fn remove_icon_captures_icon_and_resolves_last() {
        let mut map = MapModel::new(NodeText::plain("R"));
        let root = map.root_id();
        map.insert_icon(root, 0, MindIcon::new("x")).unwrap();
        map.insert_icon(root, 1, MindIcon::new("y")).unwrap();

        let command = Command::remove_icon(&map, root, IconPosition::Last).unwrap();
        assert_eq!(
            command.kind(),
            &CommandKind::RemoveIcon {
                node: root,
                index: 1,
                icon: MindIcon::new("y"),
            }
        );
    }

    #[test]
    fn factories_reject_invalid_preconditions() {
        let map = MapModel::new(NodeText::plain("R"));
        let root = map.root_id();

        let err = Command::remove_icon(&map, root, IconPosition::At(0)).unwrap_err();
        assert!(matches!(
            err,
            CommandError::Precondition(ModelError::IconIndexOutOfRange { len: 0, .. })
        ));
        let err = Command::delete_node(&map, root).unwrap_err();
        assert_eq!(err, CommandError::Precondition(ModelError::RootImmutable(root)));
        let err = Command::remove_extension(&map, ExtensionOwner::Map, ExtensionType::note())
            .unwrap_err();
        assert!(matches!(err, CommandError::MissingExtension { .. }));
    }

    #[test]
    fn compound_rolls_back_applied_steps_on_failure() {
        let mut map = MapModel::new(NodeText::plain("R"));
        let root = map.root_id();
        let add = Command::add_icon(&map, root, IconPosition::Last, MindIcon::new("idea")).unwrap();
        let rename = Command::set_text(&map, root, NodeText::plain("renamed")).unwrap();
        let compound = Command::compound(&map, "batch", vec![add, rename]).unwrap();

        map.set_text(root, NodeText::plain("edited elsewhere")).unwrap();
        let before = map.clone();
        let mut notifier = ChangeNotifier::new();
        let err = compound.act(&mut map, &mut notifier).unwrap_err();
        assert!(matches!(err, CommandError::StateMismatch { .. }));
        assert_eq!(map, before);
    }
}
