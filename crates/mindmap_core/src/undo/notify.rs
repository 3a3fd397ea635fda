//! Node change notifications raised by command actions.

use crate::model::node::NodeId;

pub const PROPERTY_ICON: &str = "icon";
pub const PROPERTY_TEXT: &str = "text";
pub const PROPERTY_CHILDREN: &str = "children";
pub const PROPERTY_PARENT: &str = "parent";

/// One observed change: which node, which aspect, old and new rendering.
///
/// `node` is `None` for changes to the map itself (map-level extensions).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeChangeEvent {
    pub node: Option<NodeId>,
    pub property: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

impl NodeChangeEvent {
    pub fn new(
        node: Option<NodeId>,
        property: impl Into<String>,
        old_value: Option<String>,
        new_value: Option<String>,
    ) -> Self {
        Self {
            node,
            property: property.into(),
            old_value,
            new_value,
        }
    }
}

/// Receiver of node change events.
pub trait NodeChangeListener {
    fn node_changed(&mut self, event: &NodeChangeEvent);
}

impl<F> NodeChangeListener for F
where
    F: FnMut(&NodeChangeEvent),
{
    fn node_changed(&mut self, event: &NodeChangeEvent) {
        self(event)
    }
}

/// Fan-out to registered listeners, in registration order.
#[derive(Default)]
pub struct ChangeNotifier {
    listeners: Vec<Box<dyn NodeChangeListener>>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&mut self, listener: Box<dyn NodeChangeListener>) {
        self.listeners.push(listener);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn notify(&mut self, event: NodeChangeEvent) {
        for listener in &mut self.listeners {
            listener.node_changed(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ChangeNotifier, NodeChangeEvent, PROPERTY_TEXT};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn closures_receive_events_in_order() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut notifier = ChangeNotifier::new();
        for tag in ["first", "second"] {
            let seen = Rc::clone(&seen);
            notifier.add_listener(Box::new(move |event: &NodeChangeEvent| {
                seen.borrow_mut().push((tag, event.property.clone()));
            }));
        }

        notifier.notify(NodeChangeEvent::new(None, PROPERTY_TEXT, None, Some("x".into())));
        assert_eq!(
            *seen.borrow(),
            vec![("first", "text".to_string()), ("second", "text".to_string())]
        );
    }
}
