//! Global typed property store.
//!
//! Properties are `(name, type, value, default, locked)` tuples read on hot
//! paths, so scalar values live in atomic cells and strings behind a mutex
//! with copy-on-read. Handles are `Arc`s; a consumer that resolves a
//! property once may keep the handle and skip the map lookup thereafter.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PropertyError {
    #[error("property {0:?} holds a different type")]
    WrongType(String),
    #[error("property name {0:?} has already been used")]
    NameAlreadyUsed(String),
    #[error("property {0:?} does not exist")]
    Missing(String),
    #[error("property {0:?} is locked")]
    Locked(String),
    #[error("property provider not available")]
    ProviderUnavailable,
}

/// Storage strategy for a property value type.
pub trait PropertyValue: Clone + PartialEq + Send + Sync + 'static {
    type Cell: Send + Sync;

    const TYPE_NAME: &'static str;

    fn new_cell(value: &Self) -> Self::Cell;
    fn load(cell: &Self::Cell) -> Self;
    fn store(cell: &Self::Cell, value: Self);
}

impl PropertyValue for i32 {
    type Cell = AtomicI32;
    const TYPE_NAME: &'static str = "int";

    fn new_cell(value: &Self) -> Self::Cell {
        AtomicI32::new(*value)
    }
    fn load(cell: &Self::Cell) -> Self {
        cell.load(Ordering::Relaxed)
    }
    fn store(cell: &Self::Cell, value: Self) {
        cell.store(value, Ordering::Release);
    }
}

impl PropertyValue for f32 {
    // stored as raw bits
    type Cell = AtomicU32;
    const TYPE_NAME: &'static str = "float";

    fn new_cell(value: &Self) -> Self::Cell {
        AtomicU32::new(value.to_bits())
    }
    fn load(cell: &Self::Cell) -> Self {
        f32::from_bits(cell.load(Ordering::Relaxed))
    }
    fn store(cell: &Self::Cell, value: Self) {
        cell.store(value.to_bits(), Ordering::Release);
    }
}

impl PropertyValue for bool {
    type Cell = AtomicBool;
    const TYPE_NAME: &'static str = "bool";

    fn new_cell(value: &Self) -> Self::Cell {
        AtomicBool::new(*value)
    }
    fn load(cell: &Self::Cell) -> Self {
        cell.load(Ordering::Relaxed)
    }
    fn store(cell: &Self::Cell, value: Self) {
        cell.store(value, Ordering::Release);
    }
}

impl PropertyValue for String {
    type Cell = Mutex<String>;
    const TYPE_NAME: &'static str = "string";

    fn new_cell(value: &Self) -> Self::Cell {
        Mutex::new(value.clone())
    }
    fn load(cell: &Self::Cell) -> Self {
        cell.lock().clone()
    }
    fn store(cell: &Self::Cell, value: Self) {
        *cell.lock() = value;
    }
}

/// A single property cell.
pub struct Property<T: PropertyValue> {
    cell: T::Cell,
    default: T,
    locked: AtomicBool,
}

impl<T: PropertyValue> Property<T> {
    fn new(default: T, locked: bool) -> Self {
        Property {
            cell: T::new_cell(&default),
            default,
            locked: AtomicBool::new(locked),
        }
    }

    pub fn load(&self) -> T {
        T::load(&self.cell)
    }

    pub fn load_default(&self) -> T {
        self.default.clone()
    }

    /// Code-level write; ignores the lock flag.
    pub fn store(&self, value: T) {
        T::store(&self.cell, value);
    }

    pub fn lock(&self, locked: bool) {
        self.locked.store(locked, Ordering::Relaxed);
    }

    pub fn locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }
}

pub type PropertyInt = Arc<Property<i32>>;
pub type PropertyFloat = Arc<Property<f32>>;
pub type PropertyBool = Arc<Property<bool>>;
pub type PropertyStr = Arc<Property<String>>;

/// A property handle of any of the four supported types.
pub enum AnyProperty {
    Int(PropertyInt),
    Float(PropertyFloat),
    Bool(PropertyBool),
    Str(PropertyStr),
}

impl AnyProperty {
    fn lock(&self, locked: bool) {
        match self {
            AnyProperty::Int(p) => p.lock(locked),
            AnyProperty::Float(p) => p.lock(locked),
            AnyProperty::Bool(p) => p.lock(locked),
            AnyProperty::Str(p) => p.lock(locked),
        }
    }

    fn locked(&self) -> bool {
        match self {
            AnyProperty::Int(p) => p.locked(),
            AnyProperty::Float(p) => p.locked(),
            AnyProperty::Bool(p) => p.locked(),
            AnyProperty::Str(p) => p.locked(),
        }
    }

    fn value_string(&self) -> String {
        match self {
            AnyProperty::Int(p) => p.load().to_string(),
            AnyProperty::Float(p) => p.load().to_string(),
            AnyProperty::Bool(p) => p.load().to_string(),
            AnyProperty::Str(p) => p.load(),
        }
    }
}

/// Dispatch between a typed handle and [`AnyProperty`].
pub trait PropertyKind: PropertyValue {
    fn from_any(any: &AnyProperty) -> Option<Arc<Property<Self>>>;
    fn into_any(handle: Arc<Property<Self>>) -> AnyProperty;
}

impl PropertyKind for i32 {
    fn from_any(any: &AnyProperty) -> Option<PropertyInt> {
        match any {
            AnyProperty::Int(p) => Some(p.clone()),
            _ => None,
        }
    }
    fn into_any(handle: PropertyInt) -> AnyProperty {
        AnyProperty::Int(handle)
    }
}

impl PropertyKind for f32 {
    fn from_any(any: &AnyProperty) -> Option<PropertyFloat> {
        match any {
            AnyProperty::Float(p) => Some(p.clone()),
            _ => None,
        }
    }
    fn into_any(handle: PropertyFloat) -> AnyProperty {
        AnyProperty::Float(handle)
    }
}

impl PropertyKind for bool {
    fn from_any(any: &AnyProperty) -> Option<PropertyBool> {
        match any {
            AnyProperty::Bool(p) => Some(p.clone()),
            _ => None,
        }
    }
    fn into_any(handle: PropertyBool) -> AnyProperty {
        AnyProperty::Bool(handle)
    }
}

impl PropertyKind for String {
    fn from_any(any: &AnyProperty) -> Option<PropertyStr> {
        match any {
            AnyProperty::Str(p) => Some(p.clone()),
            _ => None,
        }
    }
    fn into_any(handle: PropertyStr) -> AnyProperty {
        AnyProperty::Str(handle)
    }
}

/// The property table.
#[derive(Default)]
pub struct Properties {
    map: Mutex<FxHashMap<String, AnyProperty>>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create `name` with `default`. Re-creating with the same type and
    /// current value is a no-op; anything else is
    /// [`PropertyError::NameAlreadyUsed`].
    pub fn create<T: PropertyKind>(
        &self,
        name: &str,
        default: T,
        locked: bool,
    ) -> Result<(), PropertyError> {
        let mut map = self.map.lock();
        if let Some(existing) = map.get(name) {
            if let Some(handle) = T::from_any(existing) {
                if handle.load() == default {
                    return Ok(());
                }
            }
            return Err(PropertyError::NameAlreadyUsed(name.to_owned()));
        }
        map.insert(
            name.to_owned(),
            T::into_any(Arc::new(Property::new(default, locked))),
        );
        Ok(())
    }

    /// Typed handle for `name`.
    pub fn get<T: PropertyKind>(&self, name: &str) -> Result<Arc<Property<T>>, PropertyError> {
        let map = self.map.lock();
        let any = map
            .get(name)
            .ok_or_else(|| PropertyError::Missing(name.to_owned()))?;
        T::from_any(any).ok_or_else(|| PropertyError::WrongType(name.to_owned()))
    }

    /// Code-level write; ignores the lock flag.
    pub fn set<T: PropertyKind>(&self, name: &str, value: T) -> Result<(), PropertyError> {
        self.get::<T>(name)?.store(value);
        Ok(())
    }

    pub fn lock_property(&self, name: &str) {
        if let Some(any) = self.map.lock().get(name) {
            any.lock(true);
        }
    }

    pub fn property_names(&self) -> Vec<String> {
        self.map.lock().keys().cloned().collect()
    }

    /// Current value rendered as a string, for console echo.
    pub fn get_as_string(&self, name: &str) -> Result<String, PropertyError> {
        self.map
            .lock()
            .get(name)
            .map(AnyProperty::value_string)
            .ok_or_else(|| PropertyError::Missing(name.to_owned()))
    }

    /// Console-originated `set name value`.
    ///
    /// Locked properties reject the write. The raw value is parsed against
    /// the property's stored type; an unknown name creates a new property
    /// with the type guessed from the literal.
    pub fn set_parsed(&self, name: &str, raw: &str) -> Result<(), PropertyError> {
        let mut map = self.map.lock();
        match map.get(name) {
            Some(any) if any.locked() => Err(PropertyError::Locked(name.to_owned())),
            Some(AnyProperty::Int(p)) => match raw.parse::<i32>() {
                Ok(v) => {
                    p.store(v);
                    Ok(())
                }
                Err(_) => Err(PropertyError::WrongType(name.to_owned())),
            },
            Some(AnyProperty::Float(p)) => match raw.parse::<f32>() {
                Ok(v) => {
                    p.store(v);
                    Ok(())
                }
                Err(_) => Err(PropertyError::WrongType(name.to_owned())),
            },
            Some(AnyProperty::Bool(p)) => match parse_bool(raw) {
                Some(v) => {
                    p.store(v);
                    Ok(())
                }
                None => Err(PropertyError::WrongType(name.to_owned())),
            },
            Some(AnyProperty::Str(p)) => {
                p.store(raw.to_owned());
                Ok(())
            }
            None => {
                map.insert(name.to_owned(), guess_property(raw));
                Ok(())
            }
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

fn guess_property(raw: &str) -> AnyProperty {
    if let Ok(v) = raw.parse::<i32>() {
        AnyProperty::Int(Arc::new(Property::new(v, false)))
    } else if let Ok(v) = raw.parse::<f32>() {
        AnyProperty::Float(Arc::new(Property::new(v, false)))
    } else if let Some(v) = parse_bool(raw) {
        AnyProperty::Bool(Arc::new(Property::new(v, false)))
    } else {
        AnyProperty::Str(Arc::new(Property::new(raw.to_owned(), false)))
    }
}

static PROVIDER: RwLock<Option<Arc<Properties>>> = RwLock::new(None);

/// Install or clear the process property provider.
pub fn set_property_provider(provider: Option<Arc<Properties>>) {
    *PROVIDER.write() = provider;
}

/// The installed provider, if any.
pub fn property_provider() -> Option<Arc<Properties>> {
    PROVIDER.read().clone()
}

/// Create a property through the installed provider.
pub fn create_property<T: PropertyKind>(
    name: &str,
    default: T,
    locked: bool,
) -> Result<(), PropertyError> {
    property_provider()
        .ok_or(PropertyError::ProviderUnavailable)?
        .create(name, default, locked)
}

/// Set a property through the installed provider. Without a provider this
/// is a silent no-op; with one, type mismatches surface to the caller.
pub fn set_property<T: PropertyKind>(name: &str, value: T) -> Result<(), PropertyError> {
    match property_provider() {
        Some(p) => p.set(name, value),
        None => Ok(()),
    }
}

/// Lock a property through the installed provider.
pub fn lock_property(name: &str) {
    if let Some(p) = property_provider() {
        p.lock_property(name);
    }
}

/// Typed handle; errors when the provider or property is absent.
pub fn get_property<T: PropertyKind>(name: &str) -> Result<Arc<Property<T>>, PropertyError> {
    property_provider()
        .ok_or(PropertyError::ProviderUnavailable)?
        .get(name)
}

/// Typed handle that always succeeds: a missing provider or property yields
/// a fresh private cell holding `default`, so callers can read and write
/// without crashing. A present property of the wrong type still errors.
pub fn get_property_or<T: PropertyKind>(
    name: &str,
    default: T,
) -> Result<Arc<Property<T>>, PropertyError> {
    match property_provider() {
        None => Ok(Arc::new(Property::new(default, false))),
        Some(p) => match p.get::<T>(name) {
            Ok(handle) => Ok(handle),
            Err(PropertyError::Missing(_)) => Ok(Arc::new(Property::new(default, false))),
            Err(e) => Err(e),
        },
    }
}

pub fn get_int(name: &str) -> Result<PropertyInt, PropertyError> {
    get_property::<i32>(name)
}

pub fn get_float(name: &str) -> Result<PropertyFloat, PropertyError> {
    get_property::<f32>(name)
}

pub fn get_bool(name: &str) -> Result<PropertyBool, PropertyError> {
    get_property::<bool>(name)
}

pub fn get_string(name: &str) -> Result<PropertyStr, PropertyError> {
    get_property::<String>(name)
}

pub fn get_int_or(name: &str, default: i32) -> Result<PropertyInt, PropertyError> {
    get_property_or(name, default)
}

pub fn get_float_or(name: &str, default: f32) -> Result<PropertyFloat, PropertyError> {
    get_property_or(name, default)
}

pub fn get_bool_or(name: &str, default: bool) -> Result<PropertyBool, PropertyError> {
    get_property_or(name, default)
}

pub fn get_string_or(name: &str, default: &str) -> Result<PropertyStr, PropertyError> {
    get_property_or(name, default.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_get() {
        let props = Properties::new();
        props.create("a", 3i32, false).unwrap();
        assert_eq!(props.get::<i32>("a").unwrap().load(), 3);
        // same type and value: no-op
        props.create("a", 3i32, false).unwrap();
        // different value
        assert!(matches!(
            props.create("a", 4i32, false),
            Err(PropertyError::NameAlreadyUsed(_))
        ));
        // different type
        assert!(matches!(
            props.create("a", 3.0f32, false),
            Err(PropertyError::NameAlreadyUsed(_))
        ));
    }

    #[test]
    fn set_checks_type() {
        let props = Properties::new();
        props.create("a", 3i32, false).unwrap();
        props.set("a", 7i32).unwrap();
        assert_eq!(props.get::<i32>("a").unwrap().load(), 7);
        assert!(matches!(
            props.set("a", "foo".to_owned()),
            Err(PropertyError::WrongType(_))
        ));
        assert_eq!(props.get::<i32>("a").unwrap().load(), 7);
    }

    #[test]
    fn locked_rejects_console_set_only() {
        let props = Properties::new();
        props.create("fixed", 1i32, false).unwrap();
        props.lock_property("fixed");
        assert!(matches!(
            props.set_parsed("fixed", "2"),
            Err(PropertyError::Locked(_))
        ));
        // code-level writes still pass
        props.set("fixed", 2i32).unwrap();
        assert_eq!(props.get::<i32>("fixed").unwrap().load(), 2);
    }

    #[test]
    fn parsed_set_infers_new_properties() {
        let props = Properties::new();
        props.set_parsed("speed", "1.5").unwrap();
        assert_eq!(props.get::<f32>("speed").unwrap().load(), 1.5);
        props.set_parsed("title", "hello").unwrap();
        assert_eq!(props.get::<String>("title").unwrap().load(), "hello");
    }

    #[test]
    fn defaulted_get_survives_missing_provider() {
        set_property_provider(None);
        let p = get_int_or("nonexistent", 9).unwrap();
        assert_eq!(p.load(), 9);
        assert!(matches!(
            get_int("nonexistent"),
            Err(PropertyError::ProviderUnavailable)
        ));
    }
}
