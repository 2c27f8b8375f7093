//! Mutation functions and their registry.
//!
//! Closures cannot cross the wire, so commands carry a [`FunctionRef`]: the
//! function itself plus the id it was registered under. Only the id is
//! marshalled; the receiving node resolves it through its own
//! [`FunctionRegistry`].

use super::entry_view::{ReadWriteEntryView, Returned, WriteEntryView};
use crate::core::error::{CommandError, FunctionError};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Function of the entry view only.
pub trait ReadWriteFunction<K, V, R>: Send + Sync {
    fn apply(&self, view: &mut ReadWriteEntryView<'_, K, V>) -> Result<Returned<R>, FunctionError>;
}

impl<K, V, R, F> ReadWriteFunction<K, V, R> for F
where
    F: for<'a> Fn(&mut ReadWriteEntryView<'a, K, V>) -> Result<Returned<R>, FunctionError>
        + Send
        + Sync,
{
    fn apply(&self, view: &mut ReadWriteEntryView<'_, K, V>) -> Result<Returned<R>, FunctionError> {
        self(view)
    }
}

/// Function of a supplied value and the entry view.
pub trait ReadWriteValueFunction<K, V, R>: Send + Sync {
    fn apply(
        &self,
        value: &V,
        view: &mut ReadWriteEntryView<'_, K, V>,
    ) -> Result<Returned<R>, FunctionError>;
}

impl<K, V, R, F> ReadWriteValueFunction<K, V, R> for F
where
    F: for<'a> Fn(&V, &mut ReadWriteEntryView<'a, K, V>) -> Result<Returned<R>, FunctionError>
        + Send
        + Sync,
{
    fn apply(
        &self,
        value: &V,
        view: &mut ReadWriteEntryView<'_, K, V>,
    ) -> Result<Returned<R>, FunctionError> {
        self(value, view)
    }
}

/// Consumer over a write-only view.
pub trait WriteOnlyFunction<K, V>: Send + Sync {
    fn accept(&self, view: &mut WriteEntryView<'_, K, V>) -> Result<(), FunctionError>;
}

impl<K, V, F> WriteOnlyFunction<K, V> for F
where
    F: for<'a> Fn(&mut WriteEntryView<'a, K, V>) -> Result<(), FunctionError> + Send + Sync,
{
    fn accept(&self, view: &mut WriteEntryView<'_, K, V>) -> Result<(), FunctionError> {
        self(view)
    }
}

/// A function together with its registered id.
pub struct FunctionRef<F: ?Sized> {
    id: String,
    function: Arc<F>,
}

impl<F: ?Sized> FunctionRef<F> {
    pub fn new(id: impl Into<String>, function: Arc<F>) -> Self {
        Self {
            id: id.into(),
            function,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn function(&self) -> &F {
        &self.function
    }
}

impl<F: ?Sized> Clone for FunctionRef<F> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            function: self.function.clone(),
        }
    }
}

impl<F: ?Sized> fmt::Debug for FunctionRef<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FunctionRef").field(&self.id).finish()
    }
}

pub type ReadWriteFn<K, V, R> = FunctionRef<dyn ReadWriteFunction<K, V, R>>;
pub type ReadWriteValueFn<K, V, R> = FunctionRef<dyn ReadWriteValueFunction<K, V, R>>;
pub type WriteOnlyFn<K, V> = FunctionRef<dyn WriteOnlyFunction<K, V>>;

/// Functions known to this node, by id.
pub struct FunctionRegistry<K, V, R> {
    read_write: HashMap<String, Arc<dyn ReadWriteFunction<K, V, R>>>,
    read_write_value: HashMap<String, Arc<dyn ReadWriteValueFunction<K, V, R>>>,
    write_only: HashMap<String, Arc<dyn WriteOnlyFunction<K, V>>>,
}

impl<K, V, R> Default for FunctionRegistry<K, V, R> {
    fn default() -> Self {
        Self {
            read_write: HashMap::new(),
            read_write_value: HashMap::new(),
            write_only: HashMap::new(),
        }
    }
}

impl<K, V, R> FunctionRegistry<K, V, R>
where
    K: 'static,
    V: 'static,
    R: 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a view-only function, returning a reference commands can carry.
    pub fn register_read_write<F>(&mut self, id: impl Into<String>, function: F) -> ReadWriteFn<K, V, R>
    where
        F: for<'a> Fn(&mut ReadWriteEntryView<'a, K, V>) -> Result<Returned<R>, FunctionError>
            + Send
            + Sync
            + 'static,
    {
        let id = id.into();
        let function: Arc<dyn ReadWriteFunction<K, V, R>> = Arc::new(function);
        self.read_write.insert(id.clone(), function.clone());
        FunctionRef::new(id, function)
    }

    /// Register a value-and-view function.
    pub fn register_read_write_value<F>(
        &mut self,
        id: impl Into<String>,
        function: F,
    ) -> ReadWriteValueFn<K, V, R>
    where
        F: for<'a> Fn(&V, &mut ReadWriteEntryView<'a, K, V>) -> Result<Returned<R>, FunctionError>
            + Send
            + Sync
            + 'static,
    {
        let id = id.into();
        let function: Arc<dyn ReadWriteValueFunction<K, V, R>> = Arc::new(function);
        self.read_write_value.insert(id.clone(), function.clone());
        FunctionRef::new(id, function)
    }

    /// Register a write-only consumer.
    pub fn register_write_only<F>(&mut self, id: impl Into<String>, function: F) -> WriteOnlyFn<K, V>
    where
        F: for<'a> Fn(&mut WriteEntryView<'a, K, V>) -> Result<(), FunctionError>
            + Send
            + Sync
            + 'static,
    {
        let id = id.into();
        let function: Arc<dyn WriteOnlyFunction<K, V>> = Arc::new(function);
        self.write_only.insert(id.clone(), function.clone());
        FunctionRef::new(id, function)
    }

    pub fn read_write(&self, id: &str) -> Result<ReadWriteFn<K, V, R>, CommandError> {
        resolve(&self.read_write, id)
    }

    pub fn read_write_value(&self, id: &str) -> Result<ReadWriteValueFn<K, V, R>, CommandError> {
        resolve(&self.read_write_value, id)
    }

    pub fn write_only(&self, id: &str) -> Result<WriteOnlyFn<K, V>, CommandError> {
        resolve(&self.write_only, id)
    }
}

fn resolve<F: ?Sized>(
    table: &HashMap<String, Arc<F>>,
    id: &str,
) -> Result<FunctionRef<F>, CommandError> {
    table
        .get(id)
        .map(|f| FunctionRef::new(id, f.clone()))
        .ok_or_else(|| CommandError::UnknownFunction { id: id.to_string() })
}
