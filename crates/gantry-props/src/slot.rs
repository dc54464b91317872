//! Typed property containers.
//!
//! Rust has no runtime reflection, so a container describes itself: it
//! reports an ordered field list ([`FieldSpec`]) and hands out typed
//! mutable views ([`FieldSlot`]) by index. The unpacker consumes only this
//! descriptor surface and never sees the concrete container type.

/// Static description of one container field: the property name it binds
/// to and its tag pairs.
///
/// Tags drive unpacker policy:
/// - `("mutated", "")`: host-only field; setting it from a build file is
///   an error.
/// - `("filter", "key:\"value\"")`: when descending into this (struct)
///   field, only sub-fields tagged with the matching `key`/`value` pair
///   are eligible.
/// - any other pair: inert metadata, matched by `filter` tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub tags: &'static [(&'static str, &'static str)],
}

impl FieldSpec {
    pub const fn new(name: &'static str) -> Self {
        Self { name, tags: &[] }
    }

    pub const fn with_tags(
        name: &'static str,
        tags: &'static [(&'static str, &'static str)],
    ) -> Self {
        Self { name, tags }
    }

    /// Whether this field carries a tag with the given key and value.
    pub fn has_tag(&self, key: &str, value: &str) -> bool {
        self.tags.iter().any(|(k, v)| *k == key && *v == value)
    }

    /// Whether this field carries a tag with the given key, any value.
    pub fn has_tag_key(&self, key: &str) -> bool {
        self.tags.iter().any(|(k, _)| *k == key)
    }
}

/// A typed mutable view of one container field.
pub enum FieldSlot<'a> {
    Bool(&'a mut bool),
    OptBool(&'a mut Option<bool>),
    String(&'a mut String),
    OptString(&'a mut Option<String>),
    Int(&'a mut i64),
    OptInt(&'a mut Option<i64>),
    Uint(&'a mut u64),
    OptUint(&'a mut Option<u64>),
    StringList(&'a mut Vec<String>),
    /// A nested container, always present.
    Struct(&'a mut dyn PropertyStruct),
    /// A nested container allocated on first assignment within it.
    OptStruct(&'a mut dyn LazyStruct),
    /// A polymorphic nested container. `None` means the host supplied
    /// nothing; properties aimed at it are ignored, not errors.
    Interface(Option<&'a mut dyn PropertyStruct>),
    /// An anonymous sub-container whose fields are exposed at this level.
    Embedded(&'a mut dyn PropertyStruct),
}

impl FieldSlot<'_> {
    /// Kind name for error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            FieldSlot::Bool(_) | FieldSlot::OptBool(_) => "bool",
            FieldSlot::String(_) | FieldSlot::OptString(_) => "string",
            FieldSlot::Int(_) | FieldSlot::OptInt(_) => "int",
            FieldSlot::Uint(_) | FieldSlot::OptUint(_) => "uint",
            FieldSlot::StringList(_) => "list of strings",
            FieldSlot::Struct(_) | FieldSlot::OptStruct(_) => "map",
            FieldSlot::Interface(_) => "map",
            FieldSlot::Embedded(_) => "embedded",
        }
    }
}

/// A property container: an ordered field list plus slot access.
///
/// Implementations are written by the host, one per property struct; the
/// two methods must agree on indices. `field_slot` may panic on an
/// out-of-range index, since the unpacker only passes indices from
/// `fields`.
pub trait PropertyStruct: Send {
    fn fields(&self) -> &'static [FieldSpec];
    fn field_slot(&mut self, index: usize) -> FieldSlot<'_>;
}

impl<T: PropertyStruct + ?Sized> PropertyStruct for Box<T> {
    fn fields(&self) -> &'static [FieldSpec] {
        (**self).fields()
    }

    fn field_slot(&mut self, index: usize) -> FieldSlot<'_> {
        (**self).field_slot(index)
    }
}

/// An optional nested container that can be allocated on demand.
pub trait LazyStruct: Send {
    /// The container, allocating a default one if unset.
    fn ensure(&mut self) -> &mut dyn PropertyStruct;
    /// The container if it has been allocated.
    fn get_mut(&mut self) -> Option<&mut dyn PropertyStruct>;
}

impl<T: PropertyStruct + Default> LazyStruct for Option<T> {
    fn ensure(&mut self) -> &mut dyn PropertyStruct {
        self.get_or_insert_with(T::default)
    }

    fn get_mut(&mut self) -> Option<&mut dyn PropertyStruct> {
        self.as_mut().map(|t| t as &mut dyn PropertyStruct)
    }
}

/// Case-insensitive, underscore-insensitive property name normalization.
///
/// `foo_bar`, `FooBar` and `Foo_bar` all address the same field.
pub fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Parse a `filter` tag payload of the form `key:"value"`.
///
/// Returns `None` when the field has no filter tag; a malformed payload is
/// treated the same as no filter.
pub fn filter_tag(spec: &FieldSpec) -> Option<(String, String)> {
    let payload = spec
        .tags
        .iter()
        .find(|(k, _)| *k == "filter")
        .map(|(_, v)| *v)?;
    let (key, rest) = payload.split_once(':')?;
    let value = rest.strip_prefix('"')?.strip_suffix('"')?;
    Some((key.to_string(), value.to_string()))
}
