use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use super::error::{SubscriberError, SubscriberResult};

type Callback<T> = dyn Fn(&T) -> SubscriberResult + Send + Sync;

/// Callback handle registered with a [`TopicObserver`].
///
/// Clones share the callback, and equality is identity: two handles are
/// equal only when they come from the same [`Subscriber::new`] call. The
/// same handle may be registered several times and is then invoked once per
/// registration.
///
/// [`TopicObserver`]: super::TopicObserver
pub struct Subscriber<T> {
	callback: Arc<Callback<T>>,
	label: Option<&'static str>,
}

impl<T> Subscriber<T> {
	/// Wraps a fallible callback.
	pub fn new<F>(callback: F) -> Self
	where F: Fn(&T) -> SubscriberResult + Send + Sync + 'static {
		Self {
			callback: Arc::new(callback),
			label: None,
		}
	}

	/// Wraps a callback that cannot fail.
	pub fn from_fn<F>(callback: F) -> Self
	where F: Fn(&T) + Send + Sync + 'static {
		Self::new(move |data| {
			callback(data);
			Ok(())
		})
	}

	/// Attaches a name used in log records.
	pub fn with_label(mut self, label: &'static str) -> Self {
		self.label = Some(label);
		self
	}

	pub fn label(&self) -> Option<&'static str> {
		self.label
	}

	/// Runs the callback, turning a panic into [`SubscriberError::Panicked`].
	pub fn invoke(&self, data: &T) -> SubscriberResult {
		match panic::catch_unwind(AssertUnwindSafe(|| (self.callback)(data))) {
			| Ok(result) => result,
			| Err(panic) => Err(SubscriberError::Panicked {
				message: panic_message(panic.as_ref()),
			}),
		}
	}
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
	if let Some(message) = panic.downcast_ref::<&str>() {
		(*message).to_string()
	} else if let Some(message) = panic.downcast_ref::<String>() {
		message.clone()
	} else {
		"non-string panic payload".to_string()
	}
}

impl<T> Clone for Subscriber<T> {
	fn clone(&self) -> Self {
		Self {
			callback: Arc::clone(&self.callback),
			label: self.label,
		}
	}
}

impl<T> PartialEq for Subscriber<T> {
	fn eq(&self, other: &Self) -> bool {
		std::ptr::addr_eq(Arc::as_ptr(&self.callback), Arc::as_ptr(&other.callback))
	}
}

impl<T> Eq for Subscriber<T> {}

impl<T> fmt::Debug for Subscriber<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Subscriber")
			.field("label", &self.label)
			.field("callback", &Arc::as_ptr(&self.callback).cast::<()>())
			.finish()
	}
}
