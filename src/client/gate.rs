//! Refresh gate shared by every clone of an authenticated client.
//!
//! Deciding "is a refresh running" and "queue behind it" happens under one lock, so a
//! request either becomes the leader or lands in the FIFO queue; there is no third state.

// crates.io
use tokio::sync::oneshot;
// self
use crate::_prelude::*;

/// Receiver a queued request awaits while the leader refreshes; it carries the refresh
/// outcome, not a response.
pub(crate) type PendingReply = oneshot::Receiver<Result<()>>;

#[derive(Debug, Default)]
pub(crate) struct RefreshGate {
	refreshing: bool,
	pending: VecDeque<PendingRequest>,
}
impl RefreshGate {
	/// Takes the leader role or queues behind the running refresh.
	pub(crate) fn enter(gate: &Mutex<Self>) -> GateTicket<'_> {
		let mut state = gate.lock();

		if state.refreshing {
			let (reply, receiver) = oneshot::channel();

			state.pending.push_back(PendingRequest { reply });

			GateTicket::Follower(receiver)
		} else {
			state.refreshing = true;

			GateTicket::Leader(RefreshLease { gate, released: false })
		}
	}
}

/// Outcome of [`RefreshGate::enter`].
pub(crate) enum GateTicket<'a> {
	Leader(RefreshLease<'a>),
	Follower(PendingReply),
}

/// A request that hit 401 while a refresh was running.
#[derive(Debug)]
pub(crate) struct PendingRequest {
	reply: oneshot::Sender<Result<()>>,
}
impl PendingRequest {
	/// Wakes the waiting caller with the refresh outcome; a caller that gave up is ignored.
	pub(crate) fn resolve(self, refreshed: Result<()>) {
		let _ = self.reply.send(refreshed);
	}
}

/// Leader role over the gate.
///
/// Dropping the lease without [`RefreshLease::release`] (the leader was cancelled) reopens
/// the gate and drops every queued reply sender, so followers wake up and retry the
/// refresh path themselves.
#[derive(Debug)]
pub(crate) struct RefreshLease<'a> {
	gate: &'a Mutex<RefreshGate>,
	released: bool,
}
impl RefreshLease<'_> {
	/// Reopens the gate and hands back the queue in arrival order.
	pub(crate) fn release(mut self) -> VecDeque<PendingRequest> {
		self.released = true;

		let mut state = self.gate.lock();

		state.refreshing = false;

		std::mem::take(&mut state.pending)
	}
}
impl Drop for RefreshLease<'_> {
	fn drop(&mut self) {
		if self.released {
			return;
		}

		let abandoned = {
			let mut state = self.gate.lock();

			state.refreshing = false;

			std::mem::take(&mut state.pending)
		};

		drop(abandoned);
	}
}
