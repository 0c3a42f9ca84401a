use crate::ecs::{Component, ComponentId};
use std::any::{type_name, Any};
use std::collections::BTreeMap;

/// An owned, type-erased component value.
pub type ComponentBox = Box<dyn Any + Send + Sync>;

/// One entity's component values keyed by bit, as moved between archetypes.
pub type ComponentRow = BTreeMap<ComponentId, ComponentBox>;

/// Dense, homogeneous storage for one component type inside an archetype.
///
/// Row `i` of every column in an archetype belongs to the same entity.
pub struct Column<T> {
    values: Vec<T>,
}

impl<T: Component> Column<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            values: Vec::with_capacity(capacity),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[inline]
    pub fn push(&mut self, value: T) {
        self.values.push(value);
    }

    /// Remove a row, moving the last row into its place.
    #[inline]
    pub fn swap_remove(&mut self, row: usize) -> T {
        self.values.swap_remove(row)
    }

    #[inline]
    pub fn get(&self, row: usize) -> Option<&T> {
        self.values.get(row)
    }

    #[inline]
    pub fn get_mut(&mut self, row: usize) -> Option<&mut T> {
        self.values.get_mut(row)
    }

    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.values
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.values
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.values.iter()
    }
}

/// Object-safe view of a `Column<T>` used by archetypes, which hold columns
/// of many types side by side.
pub trait ErasedColumn: Any + Send + Sync {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Name of the stored element type, for diagnostics.
    fn element_type_name(&self) -> &'static str;

    /// Whether `value` has this column's element type.
    fn accepts(&self, value: &(dyn Any + Send + Sync)) -> bool;

    /// Append a boxed value. A value of the wrong type is handed back.
    fn push_boxed(&mut self, value: ComponentBox) -> Result<(), ComponentBox>;

    /// Append a default-constructed value with its `init` hook applied.
    fn push_default(&mut self);

    /// Overwrite `row` in place and return the previous value. A value of
    /// the wrong type is handed back unchanged as the error.
    ///
    /// # Panics
    /// Panics if `row` is out of bounds.
    fn replace_boxed(&mut self, row: usize, value: ComponentBox) -> Result<ComponentBox, ComponentBox>;

    /// Swap-remove `row` and return its value boxed.
    ///
    /// # Panics
    /// Panics if `row` is out of bounds.
    fn swap_remove_boxed(&mut self, row: usize) -> ComponentBox;

    fn get_any(&self, row: usize) -> Option<&(dyn Any + Send + Sync)>;

    fn get_any_mut(&mut self, row: usize) -> Option<&mut (dyn Any + Send + Sync)>;

    fn reserve(&mut self, additional: usize);

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Component> ErasedColumn for Column<T> {
    fn len(&self) -> usize {
        self.values.len()
    }

    fn element_type_name(&self) -> &'static str {
        type_name::<T>()
    }

    fn accepts(&self, value: &(dyn Any + Send + Sync)) -> bool {
        value.is::<T>()
    }

    fn push_boxed(&mut self, value: ComponentBox) -> Result<(), ComponentBox> {
        let value = value.downcast::<T>()?;
        self.values.push(*value);
        Ok(())
    }

    fn push_default(&mut self) {
        let mut value = T::default();
        value.init();
        self.values.push(value);
    }

    fn replace_boxed(&mut self, row: usize, value: ComponentBox) -> Result<ComponentBox, ComponentBox> {
        let value = value.downcast::<T>()?;
        Ok(Box::new(std::mem::replace(&mut self.values[row], *value)))
    }

    fn swap_remove_boxed(&mut self, row: usize) -> ComponentBox {
        Box::new(self.values.swap_remove(row))
    }

    fn get_any(&self, row: usize) -> Option<&(dyn Any + Send + Sync)> {
        self.values
            .get(row)
            .map(|value| value as &(dyn Any + Send + Sync))
    }

    fn get_any_mut(&mut self, row: usize) -> Option<&mut (dyn Any + Send + Sync)> {
        self.values
            .get_mut(row)
            .map(|value| value as &mut (dyn Any + Send + Sync))
    }

    fn reserve(&mut self, additional: usize) {
        self.values.reserve(additional);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::define_component;

    #[derive(Clone, Copy, Debug, Default, PartialEq)]
    struct Health {
        value: i32,
    }
    define_component!(Health, "Health");

    #[test]
    fn push_boxed_rejects_foreign_values() {
        let mut column = Column::<Health>::with_capacity(2);
        assert!(column.push_boxed(Box::new(Health { value: 3 })).is_ok());
        let rejected = column.push_boxed(Box::new(5u8)).unwrap_err();
        assert_eq!(rejected.downcast_ref::<u8>(), Some(&5));
        assert_eq!(ErasedColumn::len(&column), 1);
    }

    #[test]
    fn swap_remove_boxed_moves_last_row_into_hole() {
        let mut column = Column::<Health>::with_capacity(0);
        for value in 0..3 {
            column.push(Health { value });
        }
        let removed = column.swap_remove_boxed(0);
        assert_eq!(removed.downcast_ref::<Health>(), Some(&Health { value: 0 }));
        assert_eq!(column.as_slice(), &[Health { value: 2 }, Health { value: 1 }]);
    }

    #[test]
    fn erased_access_downcasts_back() {
        let mut column = Column::<Health>::with_capacity(1);
        column.push_default();
        let erased: &mut dyn ErasedColumn = &mut column;
        assert!(erased.accepts(&Health { value: 1 }));
        assert!(!erased.accepts(&1.0f32));
        if let Some(value) = erased.get_any_mut(0).and_then(|v| v.downcast_mut::<Health>()) {
            value.value = 9;
        }
        let typed = erased.as_any().downcast_ref::<Column<Health>>().unwrap();
        assert_eq!(typed.get(0), Some(&Health { value: 9 }));
        assert!(erased.get_any(1).is_none());
    }
}
