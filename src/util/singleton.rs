//! Lazily-initialized, thread-safe single instance holder.
//!
//! ```rust
//! use devtools::util::Singleton;
//!
//! struct Registry {
//!     name: String,
//! }
//!
//! static REGISTRY: Singleton<Registry> = Singleton::new();
//!
//! let first = REGISTRY.get_or_init(|| Registry { name: "primary".into() });
//! let second = REGISTRY.get_or_init(|| Registry { name: "ignored".into() });
//! assert_eq!(second.name, "primary");
//! assert!(std::ptr::eq(first, second));
//! ```

use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::Mutex;

/// Holds at most one instance of `T`, created by the first caller.
///
/// Reads after initialization take no lock. The lock serializes the
/// check-and-create step, so constructors never run concurrently and a
/// constructor that fails leaves the holder empty for the next caller.
pub struct Singleton<T> {
    instance: OnceCell<T>,
    create: Mutex<()>,
}

impl<T> Singleton<T> {
    pub const fn new() -> Self {
        Self {
            instance: OnceCell::new(),
            create: Mutex::new(()),
        }
    }

    /// The instance, if one has been created.
    pub fn get(&self) -> Option<&T> {
        self.instance.get()
    }

    pub fn is_initialized(&self) -> bool {
        self.instance.get().is_some()
    }

    /// Return the instance, creating it with `create` on first use.
    ///
    /// Later calls ignore `create` entirely, whatever it would have built.
    pub fn get_or_init<F>(&self, create: F) -> &T
    where
        F: FnOnce() -> T,
    {
        match self.get_or_try_init(|| Ok::<T, std::convert::Infallible>(create())) {
            Ok(instance) => instance,
            Err(never) => match never {},
        }
    }

    /// Fallible variant of [`get_or_init`](Self::get_or_init).
    pub fn get_or_try_init<F, E>(&self, create: F) -> Result<&T, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        if let Some(instance) = self.instance.get() {
            return Ok(instance);
        }

        let _lock = self
            .create
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(instance) = self.instance.get() {
            return Ok(instance);
        }

        let instance = create()?;
        tracing::debug!(
            target: "devtools::singleton",
            type_name = std::any::type_name::<T>(),
            "created singleton instance"
        );
        Ok(self.instance.get_or_init(|| instance))
    }
}

impl<T> Default for Singleton<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for Singleton<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Singleton")
            .field("instance", &self.instance.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_second_init_is_ignored() {
        let holder: Singleton<String> = Singleton::new();
        assert!(!holder.is_initialized());

        let first = holder.get_or_init(|| "first".to_string());
        let second = holder.get_or_init(|| "second".to_string());
        assert_eq!(second, "first");
        assert!(std::ptr::eq(first, second));
        assert_eq!(holder.get().map(String::as_str), Some("first"));
    }

    #[test]
    fn test_failed_init_leaves_holder_empty() {
        let holder: Singleton<u32> = Singleton::new();
        let failed: Result<&u32, &str> = holder.get_or_try_init(|| Err("not yet"));
        assert_eq!(failed.unwrap_err(), "not yet");
        assert!(!holder.is_initialized());

        let created: Result<&u32, &str> = holder.get_or_try_init(|| Ok(7));
        assert_eq!(*created.unwrap(), 7);
    }

    #[test]
    fn test_constructor_runs_once() {
        let calls = AtomicUsize::new(0);
        let holder: Singleton<usize> = Singleton::new();
        for _ in 0..5 {
            holder.get_or_init(|| calls.fetch_add(1, Ordering::SeqCst));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
