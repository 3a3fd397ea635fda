//! Writer registry: tag-scoped, reentrant writer bindings.
//!
//! # Responsibility
//! - Map element tags and extension types to ordered writer lists.
//! - Provide scoped acquisition (RAII guard) for temporary rebinding.
//!
//! # Invariants
//! - Writers bound to one key run in registration order.
//! - A `ScopedBinding` restores the exact list it saved when dropped, on
//!   every exit path including error returns and unwinding.
//! - Keys with an empty list are not stored, so "never bound" and "bound then
//!   fully unbound" resolve identically.
//! - The registry is thread-confined (`Rc`/`RefCell`); each thread that
//!   serializes owns its own instance.

use crate::io::tree_writer::{Element, TreeWriter, WriteResult};
use crate::model::extension::ExtensionType;
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::rc::Rc;

static TAG_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_.:\-]*$").expect("valid tag name regex"));

/// Which emission phases a writer participates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterCapability {
    /// Contributes attributes of the element start only.
    Attributes,
    /// Contributes element content (text, nested elements) only.
    Content,
    Both,
}

impl WriterCapability {
    pub fn emits_attributes(self) -> bool {
        matches!(self, Self::Attributes | Self::Both)
    }

    pub fn emits_content(self) -> bool {
        matches!(self, Self::Content | Self::Both)
    }
}

/// Polymorphic element writer.
///
/// The serializer calls `write_attributes` only when `capability()` emits
/// attributes, and `write_content` only when it emits content.
pub trait ElementWriter {
    fn capability(&self) -> WriterCapability;

    fn write_attributes(
        &self,
        _writer: &mut TreeWriter<'_>,
        _element: &Element<'_>,
    ) -> WriteResult<()> {
        Ok(())
    }

    fn write_content(
        &self,
        _writer: &mut TreeWriter<'_>,
        _element: &Element<'_>,
    ) -> WriteResult<()> {
        Ok(())
    }
}

/// Shared handle to a registered writer. Identity is pointer identity.
pub type SharedWriter = Rc<dyn ElementWriter>;

/// Registration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    InvalidTag(String),
    InvalidExtensionType(String),
}

impl Display for RegistryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidTag(value) => write!(f, "element tag is invalid: `{value}`"),
            Self::InvalidExtensionType(value) => {
                write!(f, "extension type is invalid: `{value}`")
            }
        }
    }
}

impl Error for RegistryError {}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum BindingKey {
    Tag(String),
    Extension(ExtensionType),
}

impl Display for BindingKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tag(tag) => write!(f, "tag:{tag}"),
            Self::Extension(kind) => write!(f, "extension:{kind}"),
        }
    }
}

/// Point-in-time view of every binding, comparable by writer identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingSnapshot(BTreeMap<String, Vec<usize>>);

impl BindingSnapshot {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of writers bound under the rendered key (`tag:icon`,
    /// `extension:note`).
    pub fn count(&self, key: &str) -> usize {
        self.0.get(key).map_or(0, Vec::len)
    }
}

/// Tag and extension-type writer bindings for one session.
#[derive(Default)]
pub struct WriterRegistry {
    bindings: RefCell<HashMap<BindingKey, Vec<SharedWriter>>>,
}

impl WriterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `writer` to the list bound to `tag`.
    pub fn register(&self, tag: &str, writer: SharedWriter) -> Result<(), RegistryError> {
        let key = tag_key(tag)?;
        self.bind(key, writer);
        Ok(())
    }

    /// Removes the most recent binding of `writer` under `tag`.
    ///
    /// Returns `false` (and changes nothing) when no such binding exists.
    pub fn unregister(&self, tag: &str, writer: &SharedWriter) -> bool {
        self.unbind(BindingKey::Tag(tag.to_string()), writer)
    }

    /// Current writers bound to `tag`, in registration order.
    pub fn resolve(&self, tag: &str) -> Vec<SharedWriter> {
        self.lookup(&BindingKey::Tag(tag.to_string()))
    }

    /// Appends an extension writer for `extension_type`.
    pub fn register_extension(
        &self,
        extension_type: &ExtensionType,
        writer: SharedWriter,
    ) -> Result<(), RegistryError> {
        let key = extension_key(extension_type)?;
        self.bind(key, writer);
        Ok(())
    }

    pub fn unregister_extension(
        &self,
        extension_type: &ExtensionType,
        writer: &SharedWriter,
    ) -> bool {
        self.unbind(BindingKey::Extension(extension_type.clone()), writer)
    }

    pub fn resolve_extension(&self, extension_type: &ExtensionType) -> Vec<SharedWriter> {
        self.lookup(&BindingKey::Extension(extension_type.clone()))
    }

    /// Replaces the whole list bound to `tag` until the guard drops.
    pub fn override_tag(
        &self,
        tag: &str,
        writers: Vec<SharedWriter>,
    ) -> Result<ScopedBinding<'_>, RegistryError> {
        let key = tag_key(tag)?;
        let saved = self.store(&key, writers);
        Ok(ScopedBinding {
            registry: self,
            key,
            saved,
        })
    }

    /// Swaps `previous` (if bound) for `next` under `tag` until the guard
    /// drops. Other writers bound to `tag` stay in place.
    pub fn scoped_replace(
        &self,
        tag: &str,
        previous: Option<&SharedWriter>,
        next: SharedWriter,
    ) -> Result<ScopedBinding<'_>, RegistryError> {
        let key = tag_key(tag)?;
        let mut writers = self.lookup(&key);
        if let Some(previous) = previous {
            if let Some(index) = writers.iter().rposition(|bound| same_writer(bound, previous)) {
                writers.remove(index);
            }
        }
        writers.push(next);
        let saved = self.store(&key, writers);
        Ok(ScopedBinding {
            registry: self,
            key,
            saved,
        })
    }

    /// Captures all bindings for later comparison.
    pub fn snapshot(&self) -> BindingSnapshot {
        let bindings = self.bindings.borrow();
        BindingSnapshot(
            bindings
                .iter()
                .map(|(key, writers)| {
                    (
                        key.to_string(),
                        writers.iter().map(writer_address).collect(),
                    )
                })
                .collect(),
        )
    }

    fn bind(&self, key: BindingKey, writer: SharedWriter) {
        self.bindings.borrow_mut().entry(key).or_default().push(writer);
    }

    pub(crate) fn bind_tag(&self, tag: &'static str, writer: SharedWriter) {
        self.bind(BindingKey::Tag(tag.to_string()), writer);
    }

    pub(crate) fn bind_extension(&self, extension_type: ExtensionType, writer: SharedWriter) {
        self.bind(BindingKey::Extension(extension_type), writer);
    }

    fn unbind(&self, key: BindingKey, writer: &SharedWriter) -> bool {
        let mut bindings = self.bindings.borrow_mut();
        let removed = match bindings.get_mut(&key) {
            Some(writers) => match writers.iter().rposition(|bound| same_writer(bound, writer)) {
                Some(index) => {
                    writers.remove(index);
                    true
                }
                None => false,
            },
            None => false,
        };
        if bindings.get(&key).is_some_and(Vec::is_empty) {
            bindings.remove(&key);
        }
        if !removed {
            debug!(
                "event=writer_unregister_noop module=io status=skipped key={}",
                key
            );
        }
        removed
    }

    fn lookup(&self, key: &BindingKey) -> Vec<SharedWriter> {
        self.bindings
            .borrow()
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    /// Installs `writers` under `key` and returns the previous list.
    fn store(&self, key: &BindingKey, writers: Vec<SharedWriter>) -> Option<Vec<SharedWriter>> {
        let mut bindings = self.bindings.borrow_mut();
        if writers.is_empty() {
            bindings.remove(key)
        } else {
            bindings.insert(key.clone(), writers)
        }
    }
}

/// Guard returned by scoped registry operations.
///
/// Dropping the guard restores the binding that was active when it was
/// created. Guards must be dropped in reverse creation order, which lexical
/// scoping guarantees.
#[must_use = "the previous binding is restored as soon as the guard is dropped"]
pub struct ScopedBinding<'r> {
    registry: &'r WriterRegistry,
    key: BindingKey,
    saved: Option<Vec<SharedWriter>>,
}

impl Drop for ScopedBinding<'_> {
    fn drop(&mut self) {
        let saved = self.saved.take().unwrap_or_default();
        self.registry.store(&self.key, saved);
    }
}

fn tag_key(tag: &str) -> Result<BindingKey, RegistryError> {
    if !TAG_NAME_RE.is_match(tag) {
        return Err(RegistryError::InvalidTag(tag.to_string()));
    }
    Ok(BindingKey::Tag(tag.to_string()))
}

fn extension_key(extension_type: &ExtensionType) -> Result<BindingKey, RegistryError> {
    if !TAG_NAME_RE.is_match(extension_type.as_str()) {
        return Err(RegistryError::InvalidExtensionType(
            extension_type.as_str().to_string(),
        ));
    }
    Ok(BindingKey::Extension(extension_type.clone()))
}

fn writer_address(writer: &SharedWriter) -> usize {
    Rc::as_ptr(writer) as *const () as usize
}

fn same_writer(left: &SharedWriter, right: &SharedWriter) -> bool {
    writer_address(left) == writer_address(right)
}

#[cfg(test)]
mod tests {
    use super::{ElementWriter, RegistryError, SharedWriter, WriterCapability, WriterRegistry};
    use crate::model::extension::ExtensionType;
    use std::rc::Rc;

    struct Marker;

    impl ElementWriter for Marker {
        fn capability(&self) -> WriterCapability {
            WriterCapability::Attributes
        }
    }

    fn marker() -> SharedWriter {
        Rc::new(Marker)
    }

    fn same(left: &[SharedWriter], right: &[SharedWriter]) -> bool {
        left.len() == right.len()
            && left
                .iter()
                .zip(right)
                .all(|(a, b)| super::same_writer(a, b))
    }

    #[test]
    fn register_appends_and_unregister_removes_most_recent() {
        let registry = WriterRegistry::new();
        let first = marker();
        let second = marker();
        registry.register("icon", first.clone()).unwrap();
        registry.register("icon", second.clone()).unwrap();
        registry.register("icon", first.clone()).unwrap();
        assert_eq!(registry.resolve("icon").len(), 3);

        assert!(registry.unregister("icon", &first));
        assert!(same(&registry.resolve("icon"), &[first.clone(), second.clone()]));

        assert!(registry.unregister("icon", &first));
        assert!(registry.unregister("icon", &second));
        assert!(registry.resolve("icon").is_empty());
        assert!(registry.snapshot().is_empty());
    }

    #[test]
    fn unregister_missing_writer_is_noop() {
        let registry = WriterRegistry::new();
        let bound = marker();
        registry.register("node", bound.clone()).unwrap();
        let before = registry.snapshot();

        assert!(!registry.unregister("node", &marker()));
        assert!(!registry.unregister("map", &bound));
        assert_eq!(registry.snapshot(), before);
    }

    #[test]
    fn rejects_invalid_tags() {
        let registry = WriterRegistry::new();
        let err = registry.register("bad tag", marker()).unwrap_err();
        assert_eq!(err, RegistryError::InvalidTag("bad tag".to_string()));
        let err = registry
            .register_extension(&ExtensionType::new(""), marker())
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidExtensionType(_)));
    }

    #[test]
    fn nested_scopes_restore_in_order() {
        let registry = WriterRegistry::new();
        let feature = marker();
        let outer = marker();
        let inner = marker();
        registry.register("node", feature.clone()).unwrap();
        let before = registry.snapshot();

        {
            let _outer = registry
                .scoped_replace("node", None, outer.clone())
                .unwrap();
            assert!(same(&registry.resolve("node"), &[feature.clone(), outer.clone()]));
            {
                let _inner = registry
                    .scoped_replace("node", Some(&outer), inner.clone())
                    .unwrap();
                assert!(same(&registry.resolve("node"), &[feature.clone(), inner.clone()]));
            }
            assert!(same(&registry.resolve("node"), &[feature.clone(), outer.clone()]));
        }
        assert_eq!(registry.snapshot(), before);
    }

    #[test]
    fn scoped_override_restores_after_panic() {
        let registry = WriterRegistry::new();
        let original = marker();
        registry.register("icon", original.clone()).unwrap();
        let before = registry.snapshot();

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _scope = registry.override_tag("icon", vec![marker()]).unwrap();
            panic!("writer blew up");
        }));
        assert!(outcome.is_err());
        assert_eq!(registry.snapshot(), before);
    }

    #[test]
    fn override_with_empty_list_unbinds_temporarily() {
        let registry = WriterRegistry::new();
        registry.register("icon", marker()).unwrap();
        {
            let _scope = registry.override_tag("icon", Vec::new()).unwrap();
            assert!(registry.resolve("icon").is_empty());
        }
        assert_eq!(registry.resolve("icon").len(), 1);
    }
}
