use std::any::Any;
use std::fmt;
use std::rc::Rc;

/// The result of an operation.
///
/// A single task tree mixes operations of unrelated result types, so values
/// travel through the runtime type-erased. A `Value` is either empty (what
/// absent operations and bodies without a meaningful result produce) or
/// holds a shared payload that joiners downcast back to its concrete type.
///
/// Cloning a `Value` is cheap: every joiner of a task observes the same
/// payload.
///
/// # Examples
///
/// ```rust,ignore
/// let value = Value::new(42u32);
/// assert_eq!(value.get::<u32>(), Some(42));
/// assert!(Value::none().is_none());
/// ```
#[derive(Clone, Default)]
pub struct Value(Option<Rc<dyn Any>>);

impl Value {
    /// Returns an empty value.
    pub fn none() -> Self {
        Self(None)
    }

    /// Wraps `value`.
    pub fn new<T: Any>(value: T) -> Self {
        Self(Some(Rc::new(value)))
    }

    /// Returns `true` if no payload is present.
    pub fn is_none(&self) -> bool {
        self.0.is_none()
    }

    /// Returns `true` if the payload is a `T`.
    pub fn is<T: Any>(&self) -> bool {
        self.downcast_ref::<T>().is_some()
    }

    /// Borrows the payload as a `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.as_deref()?.downcast_ref()
    }

    /// Clones the payload out as a `T`.
    pub fn get<T: Any + Clone>(&self) -> Option<T> {
        self.downcast_ref::<T>().cloned()
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            None => f.write_str("Value(none)"),
            Some(_) => f.write_str("Value(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downcasts_to_the_stored_type_only() {
        let value = Value::new(String::from("conn"));
        assert!(value.is::<String>());
        assert_eq!(value.get::<String>().as_deref(), Some("conn"));
        assert_eq!(value.get::<u32>(), None);
    }

    #[test]
    fn empty_value_has_no_payload() {
        let value = Value::none();
        assert!(value.is_none());
        assert_eq!(value.get::<i32>(), None);
        assert_eq!(format!("{value:?}"), "Value(none)");
    }
}
