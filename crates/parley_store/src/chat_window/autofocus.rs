#![forbid(unsafe_code)]

//! View-side bookkeeping that turns autofocus requests into at most one
//! focus per request.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutofocusDecision {
	/// Request already handled; nothing to do, nothing to acknowledge.
	Noop,
	Focus,
	/// Do not move focus, but acknowledge the request.
	AcknowledgeOnly,
}

impl AutofocusDecision {
	pub fn acknowledges(self) -> bool {
		!matches!(self, AutofocusDecision::Noop)
	}
}

/// Last `(item, counter)` pair this view acted upon.
#[derive(Debug, Clone)]
pub struct AutofocusTracker<T> {
	last_item: Option<T>,
	last_counter: u64,
}

impl<T> Default for AutofocusTracker<T> {
	fn default() -> Self {
		Self {
			last_item: None,
			last_counter: 0,
		}
	}
}

impl<T: Clone + PartialEq> AutofocusTracker<T> {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn last(&self) -> Option<(&T, u64)> {
		self.last_item.as_ref().map(|item| (item, self.last_counter))
	}

	/// First match wins: acknowledged at this counter, then handled locally,
	/// then no prior target, then same item with a newer counter, then a
	/// different item.
	pub fn resolve(&mut self, item: &T, counter: u64, acknowledged: u64) -> AutofocusDecision {
		if acknowledged == counter {
			return AutofocusDecision::Noop;
		}
		let decision = match &self.last_item {
			Some(last) if last == item && self.last_counter == counter => return AutofocusDecision::Noop,
			None => AutofocusDecision::Focus,
			Some(last) if last == item && counter > self.last_counter => AutofocusDecision::Focus,
			Some(last) if last != item => AutofocusDecision::Focus,
			Some(_) => AutofocusDecision::AcknowledgeOnly,
		};
		self.last_item = Some(item.clone());
		self.last_counter = counter;
		decision
	}
}
